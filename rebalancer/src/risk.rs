//! Pre-trade risk checks: an independent second opinion on a planner
//! [`crate::planner::OrderPlan`], run through `rebalancer_risk`'s engine
//! before any order is submitted.

use std::collections::BTreeMap;

use rebalancer_broker::{Account, BrokerSide};
use rebalancer_core::Symbol;
use rustc_hash::{FxHashMap, FxHashSet};

use rebalancer_risk::{RiskEngine as RiskEngineImpl, config::RiskConfig as SharedRiskConfig};

use crate::config::RiskConfig;
use crate::planner::OrderPlan;

pub use rebalancer_risk::report::{RiskCheck, RiskReport, RiskStatus};

/// Convert the rebalancer's risk config into `rebalancer_risk`'s own.
fn adapt_config(config: &RiskConfig) -> SharedRiskConfig {
    SharedRiskConfig {
        max_position_pct: config.max_position_pct,
        max_leverage: config.max_leverage,
        min_trade_usd: config.min_trade_usd,
        max_trade_usd: config.max_trade_usd,
        allow_short: config.allow_short,
        max_short_pct: config.max_short_pct,
        // The rebalancer config doesn't expose per-order / per-batch USD
        // caps yet; 0 disables those checks in the shared engine.
        max_order_value_cents: 0,
        max_batch_value_cents: 0,
        ..SharedRiskConfig::default()
    }
}

/// Run all pre-trade risk checks against a planned order batch.
///
/// - `plan`: signed share counts from the rebalance planner
/// - `equity_cents`: total account equity
/// - `target_weights`: blended target (symbol, fraction) pairs
/// - `prices`: current market prices in cents
/// - `current_qty`: current holdings (symbol -> quantity)
pub fn check_risk(
    plan: &OrderPlan,
    equity_cents: i64,
    target_weights: &[(Symbol, f64)],
    prices: &BTreeMap<Symbol, i64>,
    current_qty: &FxHashMap<Symbol, i64>,
    config: &RiskConfig,
) -> RiskReport {
    let engine = RiskEngineImpl::new(adapt_config(config));
    let account = Account {
        equity_cents,
        buying_power_cents: equity_cents,
        cash_cents: equity_cents,
        gross_position_value_cents: 0,
    };

    let mut broker_orders: Vec<(Symbol, BrokerSide, u64, i64)> =
        Vec::with_capacity(plan.orders.len() + current_qty.len());
    let mut symbols_with_orders: FxHashSet<Symbol> = FxHashSet::default();

    for (&symbol, &shares) in &plan.orders {
        let side = if shares > 0 {
            BrokerSide::Buy
        } else {
            BrokerSide::Sell
        };
        let price = prices.get(&symbol).copied().unwrap_or(0);
        broker_orders.push((symbol, side, shares.unsigned_abs(), price));
        symbols_with_orders.insert(symbol);
    }

    // Carry unchanged current positions through as zero-quantity entries so
    // leverage/short-exposure checks see the full post-trade book, not just
    // the symbols this batch touches.
    for (&symbol, &qty) in current_qty.iter().filter(|(_, &qty)| qty != 0) {
        if symbols_with_orders.contains(&symbol) {
            continue;
        }
        let price = prices.get(&symbol).copied().unwrap_or(0);
        let side = if qty >= 0 { BrokerSide::Buy } else { BrokerSide::Sell };
        broker_orders.push((symbol, side, 0, price));
    }

    let current_positions: Vec<(Symbol, i64)> =
        current_qty.iter().map(|(&sym, &qty)| (sym, qty)).collect();

    engine.check_batch(&broker_orders, &account, &current_positions, target_weights)
}
