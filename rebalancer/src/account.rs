//! Account state reducer: turns raw positions, prices, and multi-currency
//! cash into a normalized [`AccountSnapshot`] with an exposure-aware equity
//! base.
//!
//! Pure — no I/O, no clock. `cash_buffer_pct` here is the internal
//! **fraction** form (`[0, 1]`); the percent-to-fraction conversion happens
//! once, at the configuration boundary (see `crate::config`).

use std::collections::BTreeMap;

use rebalancer_core::{Key, Symbol};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// A single position: symbol, signed quantity, and its current price in
/// dollars.
#[derive(Debug, Clone, Copy)]
pub struct RawPosition {
    pub symbol: Symbol,
    pub quantity: i64,
    pub price: f64,
}

/// Normalized account state: market values, weights (including the CASH
/// sentinel), and the exposure metrics downstream components consume.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    /// Market value per symbol, in dollars.
    pub market_values: BTreeMap<Symbol, f64>,
    /// Weight per key (symbol or CASH), sorted ascending with CASH last.
    pub weights: BTreeMap<Key, f64>,
    /// Cash balance per non-USD funding currency, in that currency's units.
    pub funding_cash: BTreeMap<[u8; 3], f64>,
    pub usd_cash: f64,
    pub total_equity: f64,
    pub effective_equity: f64,
    pub gross: f64,
    pub net: f64,
}

impl AccountSnapshot {
    pub fn weight_of(&self, key: &Key) -> f64 {
        self.weights.get(key).copied().unwrap_or(0.0)
    }
}

/// Reduce raw positions + prices + cash into an [`AccountSnapshot`].
///
/// `cash_buffer_pct` is a fraction in `[0, 1]`. Non-USD `funding_cash`
/// balances are carried through unchanged and excluded from weight
/// normalization (they are not tradable equity, only FX feedstock).
pub fn snapshot(
    positions: &[RawPosition],
    usd_cash: f64,
    funding_cash: &[([u8; 3], f64)],
    cash_buffer_pct: f64,
) -> Result<AccountSnapshot> {
    if !(0.0..=1.0).contains(&cash_buffer_pct) {
        return Err(Error::Config(format!(
            "cash_buffer_pct fraction must be in [0, 1], got {cash_buffer_pct}"
        )));
    }

    for p in positions {
        if p.quantity == 0 {
            return Err(Error::Runtime(format!(
                "position {} has zero quantity",
                p.symbol
            )));
        }
        if !(p.price.is_finite() && p.price > 0.0) {
            return Err(Error::Runtime(format!(
                "position {} has non-positive or non-finite price {}",
                p.symbol, p.price
            )));
        }
    }

    let mut market_values = BTreeMap::new();
    for p in positions {
        let mv = p.quantity as f64 * p.price;
        *market_values.entry(p.symbol).or_insert(0.0) += mv;
    }

    let net_pos_val: f64 = market_values.values().sum();
    let gross_pos_val: f64 = market_values.values().map(|v| v.abs()).sum();
    let effective_usd_cash = usd_cash * (1.0 - cash_buffer_pct);
    let effective_equity = net_pos_val + effective_usd_cash;

    if !(effective_equity.is_finite() && effective_equity > 0.0) {
        return Err(Error::Runtime(format!(
            "effective_equity must be > 0, got {effective_equity}"
        )));
    }

    let mut weights: BTreeMap<Key, f64> = market_values
        .iter()
        .map(|(&sym, &mv)| (Key::Symbol(sym), mv / effective_equity))
        .collect();
    weights.insert(Key::Cash, effective_usd_cash / effective_equity);

    let gross = gross_pos_val / effective_equity;
    let net: f64 = weights.values().sum();

    if (net - 1.0).abs() > 1e-6 {
        return Err(Error::Runtime(format!(
            "account snapshot net exposure must equal 1 (+/- 1e-6), got {net}"
        )));
    }

    let funding_cash: BTreeMap<[u8; 3], f64> = funding_cash.iter().copied().collect();

    Ok(AccountSnapshot {
        market_values,
        weights,
        funding_cash,
        usd_cash,
        total_equity: net_pos_val + usd_cash,
        effective_equity,
        gross,
        net,
    })
}

/// Convert an adapter's `Position`/`Account`/`CashBalance` DTOs (cents-based)
/// into the dollar-denominated [`RawPosition`]s + balances this reducer
/// expects. Kept separate from `snapshot` so the reducer itself stays
/// broker-agnostic.
pub fn from_broker_positions(
    positions: &[rebalancer_broker::Position],
    prices: &FxHashMap<Symbol, i64>,
) -> Result<Vec<RawPosition>> {
    positions
        .iter()
        .filter(|p| p.quantity != 0)
        .map(|p| {
            let price_cents = *prices.get(&p.symbol).ok_or_else(|| {
                Error::Runtime(format!("missing price for position {}", p.symbol))
            })?;
            Ok(RawPosition {
                symbol: p.symbol,
                quantity: p.quantity,
                price: price_cents as f64 / 100.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aaa() -> Symbol {
        Symbol::new("AAA")
    }
    fn bbb() -> Symbol {
        Symbol::new("BBB")
    }

    #[test]
    fn basic_snapshot_no_cash_buffer() {
        let positions = vec![
            RawPosition {
                symbol: aaa(),
                quantity: 100,
                price: 100.0,
            },
            RawPosition {
                symbol: bbb(),
                quantity: 100,
                price: 100.0,
            },
        ];
        let snap = snapshot(&positions, 0.0, &[], 0.0).unwrap();
        assert!((snap.effective_equity - 20_000.0).abs() < 1e-6);
        assert!((snap.weight_of(&Key::Symbol(aaa())) - 0.5).abs() < 1e-9);
        assert!((snap.net - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cash_buffer_reduces_effective_equity() {
        let positions = vec![RawPosition {
            symbol: aaa(),
            quantity: 100,
            price: 100.0,
        }];
        // 10,000 position + 10,000 cash, 10% buffer -> effective cash 9,000
        let snap = snapshot(&positions, 10_000.0, &[], 0.10).unwrap();
        assert!((snap.effective_equity - 19_000.0).abs() < 1e-6);
        assert!((snap.weight_of(&Key::Cash) - 9_000.0 / 19_000.0).abs() < 1e-9);
    }

    #[test]
    fn funding_cash_excluded_from_weights() {
        let positions = vec![RawPosition {
            symbol: aaa(),
            quantity: 100,
            price: 100.0,
        }];
        let snap = snapshot(&positions, 1_000.0, &[(*b"CAD", 5_000.0)], 0.0).unwrap();
        assert_eq!(snap.funding_cash.get(b"CAD"), Some(&5_000.0));
        // Weights still sum to 1 regardless of funding cash presence.
        assert!((snap.net - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_zero_quantity_position() {
        let positions = vec![RawPosition {
            symbol: aaa(),
            quantity: 0,
            price: 100.0,
        }];
        assert!(snapshot(&positions, 1_000.0, &[], 0.0).is_err());
    }

    #[test]
    fn rejects_non_positive_price() {
        let positions = vec![RawPosition {
            symbol: aaa(),
            quantity: 10,
            price: 0.0,
        }];
        assert!(snapshot(&positions, 1_000.0, &[], 0.0).is_err());
    }

    #[test]
    fn rejects_non_positive_effective_equity() {
        let positions = vec![RawPosition {
            symbol: aaa(),
            quantity: -100,
            price: 100.0,
        }];
        assert!(snapshot(&positions, 0.0, &[], 0.0).is_err());
    }

    #[test]
    fn rejects_out_of_range_buffer() {
        let positions = vec![RawPosition {
            symbol: aaa(),
            quantity: 100,
            price: 100.0,
        }];
        assert!(snapshot(&positions, 1_000.0, &[], 1.5).is_err());
    }

    #[test]
    fn gross_counts_absolute_value_of_shorts() {
        let positions = vec![
            RawPosition {
                symbol: aaa(),
                quantity: 100,
                price: 100.0,
            },
            RawPosition {
                symbol: bbb(),
                quantity: -50,
                price: 100.0,
            },
        ];
        // net pos val = 10,000 - 5,000 = 5,000; + 5,000 cash => equity 10,000
        let snap = snapshot(&positions, 5_000.0, &[], 0.0).unwrap();
        assert!((snap.gross - 1.5).abs() < 1e-9); // (10000+5000)/10000
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const SYMBOLS: [&str; 3] = ["AAA", "BBB", "CCC"];

    fn arb_positions() -> impl Strategy<Value = Vec<RawPosition>> {
        proptest::collection::vec((-500i64..500, 1.0f64..500.0), SYMBOLS.len()).prop_map(|rows| {
            SYMBOLS
                .iter()
                .zip(rows)
                .filter(|(_, (qty, _))| *qty != 0)
                .map(|(&s, (qty, price))| RawPosition {
                    symbol: Symbol::new(s),
                    quantity: qty,
                    price,
                })
                .collect()
        })
    }

    proptest! {
        /// §8: whenever a snapshot is produced, its weights (including CASH)
        /// sum to 1 within 1e-6, matching `net`.
        #[test]
        fn snapshot_net_exposure_is_one(
            positions in arb_positions(),
            usd_cash in 0.0f64..1_000_000.0,
            cash_buffer_pct in 0.0f64..1.0,
        ) {
            if let Ok(snap) = snapshot(&positions, usd_cash, &[], cash_buffer_pct) {
                let total: f64 = snap.weights.values().sum();
                prop_assert!((total - 1.0).abs() < 1e-6);
                prop_assert!((snap.net - 1.0).abs() < 1e-6);
            }
        }
    }
}
