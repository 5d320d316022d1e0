//! Target blender: combines named model portfolios into a single target
//! allocation by configured mix weights, preserving a signed CASH entry
//! for intentional margin.
//!
//! Pure, no I/O — the tabular `portfolio, symbol, target_pct` source (§6 of
//! the design notes) is parsed one layer up, in [`crate::models`].

use std::collections::BTreeMap;

use rebalancer_core::{Key, Symbol};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// The three model portfolios the blender knows how to mix, plus their
/// relative weights. Weights must be non-negative and sum to `1 ± 1e-3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelMix {
    pub smurf: f64,
    pub badass: f64,
    pub gltr: f64,
}

impl ModelMix {
    pub const MODEL_NAMES: [&'static str; 3] = ["SMURF", "BADASS", "GLTR"];

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("SMURF", self.smurf),
            ("BADASS", self.badass),
            ("GLTR", self.gltr),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Config(format!(
                    "model weight {name} must be finite and >= 0, got {w}"
                )));
            }
        }
        let sum = self.smurf + self.badass + self.gltr;
        if (sum - 1.0).abs() > 1e-3 {
            return Err(Error::Config(format!(
                "model mix weights must sum to 1 (+/- 1e-3), got {sum}"
            )));
        }
        Ok(())
    }

    fn weight(&self, model: &str) -> f64 {
        match model {
            "SMURF" => self.smurf,
            "BADASS" => self.badass,
            "GLTR" => self.gltr,
            _ => 0.0,
        }
    }
}

/// The blended target allocation: a sorted symbol -> fraction map plus
/// CASH, with gross/net summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendResult {
    /// Ordered (sorted by `Key`, which places `Cash` last) fractions.
    pub weights: BTreeMap<Key, f64>,
    /// Sum of non-CASH fractions.
    pub gross: f64,
    /// `gross + cash_weight`; must equal `1 ± eps`.
    pub net: f64,
}

impl BlendResult {
    pub fn cash_weight(&self) -> f64 {
        self.weights.get(&Key::Cash).copied().unwrap_or(0.0)
    }

    /// Iterate non-CASH (symbol, fraction) pairs in sorted order.
    pub fn symbol_weights(&self) -> impl Iterator<Item = (Symbol, f64)> + '_ {
        self.weights.iter().filter_map(|(k, &w)| match k {
            Key::Symbol(s) => Some((*s, w)),
            Key::Cash => None,
        })
    }
}

/// Blend named model portfolios (`model -> key -> fraction`) by `mix`.
///
/// For each `(model, key)` contribute `mix[model] * portfolios[model][key]`
/// to an accumulator, then normalize the accumulator so its total equals 1.
/// `gross` is the sum of normalized non-CASH weights; `net` is `gross` plus
/// the normalized CASH weight (which is typically negative or zero).
pub fn blend(
    portfolios: &FxHashMap<&str, FxHashMap<Key, f64>>,
    mix: ModelMix,
) -> Result<BlendResult> {
    mix.validate()?;

    let mut accum: BTreeMap<Key, f64> = BTreeMap::new();
    for &model in ModelMix::MODEL_NAMES.iter() {
        let Some(rows) = portfolios.get(model) else {
            continue;
        };
        let w = mix.weight(model);
        if w == 0.0 {
            continue;
        }
        for (&key, &frac) in rows {
            *accum.entry(key).or_insert(0.0) += w * frac;
        }
    }

    let total: f64 = accum.values().sum();
    if total.abs() <= 0.0 {
        return Err(Error::Config("empty portfolio".into()));
    }

    let weights: BTreeMap<Key, f64> = accum.into_iter().map(|(k, v)| (k, v / total)).collect();
    let gross: f64 = weights
        .iter()
        .filter(|(k, _)| !k.is_cash())
        .map(|(_, &w)| w)
        .sum();
    let net = gross + weights.get(&Key::Cash).copied().unwrap_or(0.0);

    Ok(BlendResult { weights, gross, net })
}
