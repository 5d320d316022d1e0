//! Order builder: turns a planner `OrderPlan` (signed share counts) plus
//! per-symbol limit-pricer decisions into wire-level `BrokerOrder`s, and
//! turns an `FxPlan` into the matching FX-leg `BrokerOrder`.
//!
//! This is the one place domain-level `f64` dollars/rates get converted to
//! the fixed-point `Price` cents the broker adapter speaks.

use std::collections::BTreeMap;

use rebalancer_broker::types::{BrokerOrder, BrokerOrderType, BrokerSide, Route, TimeInForce};
use rebalancer_core::{Price, Symbol};

use crate::fx::{FxPlan, OrderType as FxOrderType};
use crate::pricer::OrderType as PricerOrderType;

/// One priced equity order, ready for submission.
#[derive(Debug, Clone)]
pub struct PricedOrder {
    pub symbol: Symbol,
    pub shares: i64,
    pub broker_order: BrokerOrder,
}

/// Build equity-leg broker orders from a planner output and a per-symbol
/// limit price decision. Symbols missing a price decision are skipped; the
/// caller is expected to have priced every planned symbol first.
pub fn build_equity_orders(
    orders: &BTreeMap<Symbol, i64>,
    prices: &BTreeMap<Symbol, (Option<f64>, PricerOrderType)>,
    rth_only: bool,
    tif: TimeInForce,
) -> Vec<PricedOrder> {
    let mut out = Vec::new();
    for (&symbol, &shares) in orders {
        if shares == 0 {
            continue;
        }
        let Some(&(limit_price, order_type)) = prices.get(&symbol) else {
            continue;
        };
        let side = if shares > 0 {
            BrokerSide::Buy
        } else {
            BrokerSide::Sell
        };
        let broker_order_type = match order_type {
            PricerOrderType::Market => BrokerOrderType::Market,
            PricerOrderType::Limit => match limit_price {
                Some(p) => BrokerOrderType::Limit(Price::from_dollars(p)),
                None => BrokerOrderType::Market,
            },
        };
        out.push(PricedOrder {
            symbol,
            shares,
            broker_order: BrokerOrder {
                symbol,
                side,
                quantity: shares.unsigned_abs(),
                order_type: broker_order_type,
                tif,
                route: Route::Smart,
                rth_only,
            },
        });
    }
    out
}

/// Build the FX-leg broker order from an `FxPlan`, if one is needed. The FX
/// "symbol" is the currency pair itself (e.g. `USDCAD`); quantity is the
/// base-currency notional rounded to whole units since IDEALPRO sizes FX
/// orders in the base currency.
pub fn build_fx_order(plan: &FxPlan, tif: TimeInForce) -> Option<BrokerOrder> {
    if !plan.need_fx {
        return None;
    }
    let pair_symbol = Symbol::new(&plan.pair.replace('.', ""));
    let order_type = match plan.order_type {
        FxOrderType::Market => BrokerOrderType::Market,
        FxOrderType::Limit => match plan.limit_price {
            Some(p) => BrokerOrderType::Limit(Price::from_dollars(p)),
            None => BrokerOrderType::Market,
        },
    };
    Some(BrokerOrder {
        symbol: pair_symbol,
        side: BrokerSide::Buy,
        quantity: plan.qty.round().max(0.0) as u64,
        order_type,
        tif,
        route: Route::Idealpro,
        rth_only: false,
    })
}
