//! Post-execution reconciliation: compare actual account weights against
//! the blended target allocation.

use std::collections::BTreeMap;

use rebalancer_core::{Key, Symbol};
use serde::Serialize;

use crate::account::AccountSnapshot;
use crate::blender::BlendResult;

/// Reconciliation report comparing actual vs target.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<ReconcileEntry>,
    pub tracking_error_pct: f64,
}

/// One symbol's reconciliation entry.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub symbol: String,
    pub target_weight: f64,
    pub actual_weight: f64,
    pub diff_weight: f64,
    pub target_shares: i64,
    pub actual_shares: i64,
    pub diff_shares: i64,
}

/// Compare an actual account snapshot against a blended target allocation.
///
/// `prices` supplies the per-symbol dollar price used to translate target
/// weight into a target share count; symbols without a price are reported
/// with a zero target share count.
pub fn reconcile(
    snapshot: &AccountSnapshot,
    target: &BlendResult,
    prices: &BTreeMap<Symbol, f64>,
) -> ReconcileReport {
    let actual_qty: BTreeMap<Symbol, i64> = snapshot
        .market_values
        .iter()
        .map(|(&symbol, &value)| {
            let price = prices.get(&symbol).copied().unwrap_or(0.0);
            let qty = if price > 0.0 { (value / price).round() as i64 } else { 0 };
            (symbol, qty)
        })
        .collect();

    let mut all_symbols: Vec<Symbol> = target.symbol_weights().map(|(s, _)| s).collect();
    all_symbols.extend(actual_qty.keys().copied());
    all_symbols.sort();
    all_symbols.dedup();

    let mut entries = Vec::new();
    let mut sum_sq_diff = 0.0_f64;

    for &symbol in &all_symbols {
        let target_weight = target.weights.get(&Key::Symbol(symbol)).copied().unwrap_or(0.0);
        let actual_weight = snapshot.weight_of(&Key::Symbol(symbol));
        let price = prices.get(&symbol).copied().unwrap_or(0.0);

        let target_shares = if price > 0.0 {
            (snapshot.effective_equity * target_weight / price).round() as i64
        } else {
            0
        };
        let actual_shares = actual_qty.get(&symbol).copied().unwrap_or(0);

        let diff_weight = actual_weight - target_weight;
        sum_sq_diff += diff_weight * diff_weight;

        entries.push(ReconcileEntry {
            symbol: symbol.as_str().to_string(),
            target_weight,
            actual_weight,
            diff_weight,
            target_shares,
            actual_shares,
            diff_shares: actual_shares - target_shares,
        });
    }

    let tracking_error_pct = (sum_sq_diff / all_symbols.len().max(1) as f64).sqrt() * 100.0;

    ReconcileReport {
        entries,
        tracking_error_pct,
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RECONCILIATION:")?;
        writeln!(
            f,
            "  {:8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Symbol", "Target%", "Actual%", "Diff%", "TargetQty", "ActualQty"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:8} {:>9.2}% {:>9.2}% {:>+9.2}% {:>10} {:>10}",
                e.symbol,
                e.target_weight * 100.0,
                e.actual_weight * 100.0,
                e.diff_weight * 100.0,
                e.target_shares,
                e.actual_shares,
            )?;
        }
        writeln!(f, "\n  Tracking error: {:.3}%", self.tracking_error_pct)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::RawPosition;
    use rustc_hash::FxHashMap;

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }
    fn msft() -> Symbol {
        Symbol::new("MSFT")
    }

    fn target_of(rows: &[(Symbol, f64)]) -> BlendResult {
        let mut portfolio: FxHashMap<Key, f64> = FxHashMap::default();
        for &(symbol, weight) in rows {
            portfolio.insert(Key::Symbol(symbol), weight);
        }
        let cash_weight = 1.0 - rows.iter().map(|(_, w)| w).sum::<f64>();
        if cash_weight != 0.0 {
            portfolio.insert(Key::Cash, cash_weight);
        }
        let mut portfolios = FxHashMap::default();
        portfolios.insert("SMURF", portfolio);
        crate::blender::blend(
            &portfolios,
            crate::blender::ModelMix {
                smurf: 1.0,
                badass: 0.0,
                gltr: 0.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn perfect_match() {
        let positions = vec![RawPosition {
            symbol: aapl(),
            quantity: 2702,
            price: 185.0,
        }];
        let snapshot = crate::account::snapshot(&positions, 0.0, &[], 0.0).unwrap();
        let target = target_of(&[(aapl(), 1.0)]);
        let prices = BTreeMap::from([(aapl(), 185.0)]);

        let report = reconcile(&snapshot, &target, &prices);
        assert!(report.tracking_error_pct < 1.0);
    }

    #[test]
    fn missing_position_shows_up_as_full_drift() {
        let positions = vec![RawPosition {
            symbol: msft(),
            quantity: 100,
            price: 400.0,
        }];
        let snapshot = crate::account::snapshot(&positions, 0.0, &[], 0.0).unwrap();
        let target = target_of(&[(aapl(), 1.0)]);
        let prices = BTreeMap::from([(aapl(), 185.0), (msft(), 400.0)]);

        let report = reconcile(&snapshot, &target, &prices);
        let aapl_entry = report.entries.iter().find(|e| e.symbol == "AAPL").unwrap();
        assert_eq!(aapl_entry.actual_shares, 0);
        assert!(report.tracking_error_pct > 1.0);
    }

    #[test]
    fn extra_position_not_in_target() {
        let positions = vec![
            RawPosition {
                symbol: aapl(),
                quantity: 2702,
                price: 185.0,
            },
            RawPosition {
                symbol: msft(),
                quantity: 100,
                price: 400.0,
            },
        ];
        let snapshot = crate::account::snapshot(&positions, 0.0, &[], 0.0).unwrap();
        let target = target_of(&[(aapl(), 1.0)]);
        let prices = BTreeMap::from([(aapl(), 185.0), (msft(), 400.0)]);

        let report = reconcile(&snapshot, &target, &prices);
        let msft_entry = report.entries.iter().find(|e| e.symbol == "MSFT").unwrap();
        assert_eq!(msft_entry.target_weight, 0.0);
        assert!(msft_entry.actual_shares > 0);
    }

    #[test]
    fn display_format() {
        let report = ReconcileReport {
            entries: vec![ReconcileEntry {
                symbol: "AAPL".into(),
                target_weight: 0.5,
                actual_weight: 0.49,
                diff_weight: -0.01,
                target_shares: 2702,
                actual_shares: 2648,
                diff_shares: -54,
            }],
            tracking_error_pct: 1.0,
        };
        let s = format!("{report}");
        assert!(s.contains("AAPL"));
        assert!(s.contains("Tracking error"));
    }
}
