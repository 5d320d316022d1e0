//! Model-portfolio loader: parses the tabular `portfolio, symbol,
//! target_pct` source file (design notes §6) into the per-model
//! `key -> fraction` maps the [`crate::blender`] consumes.
//!
//! Validation happens here, not in the blender: `portfolio` must be one of
//! the three known model names, `target_pct` is a percent in `(0, 100]` for
//! ordinary symbols, at most one `CASH` row per portfolio with a strictly
//! negative percent (signals intentional margin), and each portfolio's rows
//! must sum to `100 ± 0.01`.

use std::path::Path;

use rebalancer_core::{Key, Symbol};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::blender::ModelMix;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct PortfolioRecord {
    portfolio: String,
    symbol: String,
    target_pct: f64,
}

const SUM_TOLERANCE_PCT: f64 = 0.01;

/// Load and validate the tabular model-portfolio file at `path`.
pub fn load_model_portfolios(path: &Path) -> Result<FxHashMap<&'static str, FxHashMap<Key, f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::Target(format!("failed to open portfolio file {path:?}: {e}")))?;

    let mut rows_by_portfolio: FxHashMap<&'static str, Vec<(Key, f64)>> = FxHashMap::default();

    for result in reader.deserialize() {
        let record: PortfolioRecord = result
            .map_err(|e| Error::Target(format!("failed to parse portfolio row: {e}")))?;

        let name = record.portfolio.to_ascii_uppercase();
        let canonical = ModelMix::MODEL_NAMES
            .iter()
            .find(|&&n| n == name)
            .ok_or_else(|| {
                Error::Target(format!(
                    "unknown portfolio '{}' — must be one of {:?}",
                    record.portfolio,
                    ModelMix::MODEL_NAMES
                ))
            })?;

        let key = if record.symbol.eq_ignore_ascii_case("CASH") {
            Key::Cash
        } else {
            let symbol = Symbol::try_new(&record.symbol.to_ascii_uppercase()).ok_or_else(|| {
                Error::Target(format!("invalid symbol '{}'", record.symbol))
            })?;
            Key::Symbol(symbol)
        };

        if key.is_cash() {
            if record.target_pct >= 0.0 {
                return Err(Error::Target(format!(
                    "CASH row in portfolio {canonical} must have a strictly negative target_pct, got {}",
                    record.target_pct
                )));
            }
        } else if !(record.target_pct > 0.0 && record.target_pct <= 100.0) {
            return Err(Error::Target(format!(
                "symbol {} in portfolio {canonical} has target_pct {} outside (0, 100]",
                record.symbol, record.target_pct
            )));
        }

        rows_by_portfolio
            .entry(canonical)
            .or_default()
            .push((key, record.target_pct));
    }

    let mut result: FxHashMap<&'static str, FxHashMap<Key, f64>> = FxHashMap::default();
    for (portfolio, rows) in rows_by_portfolio {
        let cash_rows = rows.iter().filter(|(k, _)| k.is_cash()).count();
        if cash_rows > 1 {
            return Err(Error::Target(format!(
                "portfolio {portfolio} has {cash_rows} CASH rows, expected at most 1"
            )));
        }

        let sum: f64 = rows.iter().map(|(_, pct)| pct).sum();
        if (sum - 100.0).abs() > SUM_TOLERANCE_PCT {
            return Err(Error::Target(format!(
                "portfolio {portfolio} rows sum to {sum} (expected 100 +/- {SUM_TOLERANCE_PCT})"
            )));
        }

        let fractions: FxHashMap<Key, f64> = rows
            .into_iter()
            .map(|(key, pct)| (key, pct / 100.0))
            .collect();
        result.insert(portfolio, fractions);
    }

    if result.is_empty() {
        return Err(Error::Target("portfolio file contained no rows".into()));
    }

    Ok(result)
}
