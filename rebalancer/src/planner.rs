//! Rebalance planner: decides which symbols to trade, at what notional,
//! subject to per-holding or total-drift triggers, leverage caps, cash
//! buffer, maintenance buffer, minimum-order filter, and whole-share
//! rounding.
//!
//! Pure — a function of targets, current weights, prices, and `opts`. The
//! FX-aware two-pass entry point additionally calls the FX sizing engine
//! (`crate::fx`) to discover how much funding-currency cash to convert
//! before a final planning pass.

use std::collections::BTreeMap;

use rebalancer_core::{bps, Key, Symbol};

use crate::error::{Error, Result};
use crate::fx::{self, FxConfig, FxPlan};

/// How the planner decides which symbols are actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Only symbols whose own drift exceeds their band trade.
    PerHolding,
    /// If no per-holding band is breached, fall back to trading every
    /// nonzero-drift symbol once the portfolio-wide drift exceeds a bps
    /// threshold.
    TotalDrift,
}

/// Per-symbol or scalar drift tolerance.
#[derive(Debug, Clone)]
pub enum Bands {
    Scalar(f64),
    PerSymbol(BTreeMap<Symbol, f64>),
}

impl Bands {
    fn band_for(&self, symbol: Symbol) -> f64 {
        match self {
            Bands::Scalar(b) => *b,
            Bands::PerSymbol(map) => map.get(&symbol).copied().unwrap_or(0.0),
        }
    }
}

/// Planner options (design notes §4.3).
#[derive(Debug, Clone)]
pub struct PlannerOpts {
    pub bands: Bands,
    pub min_order: f64,
    pub max_leverage: f64,
    /// Fraction in `[0, 1]`.
    pub cash_buffer_pct: f64,
    /// Fraction in `[0, 1]`.
    pub maintenance_buffer_pct: f64,
    pub allow_fractional: bool,
    pub trigger_mode: TriggerMode,
    pub portfolio_total_band_bps: f64,
}

/// Reason a symbol's would-be order was dropped instead of emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    BelowMinOrder { notional: f64, min_order: f64 },
    ZeroSharesAfterRounding,
    ScaledBelowMinOrder { scaled_notional: f64, min_order: f64 },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::BelowMinOrder { notional, min_order } => write!(
                f,
                "notional {notional:.2} below min_order {min_order:.2}"
            ),
            DropReason::ZeroSharesAfterRounding => {
                write!(f, "rounds to zero shares")
            }
            DropReason::ScaledBelowMinOrder {
                scaled_notional,
                min_order,
            } => write!(
                f,
                "scaled notional {scaled_notional:.2} below min_order {min_order:.2} after leverage/cash scaling"
            ),
        }
    }
}

/// Planner output: signed share counts per symbol, plus a record of
/// anything dropped and why.
#[derive(Debug, Clone, Default)]
pub struct OrderPlan {
    /// Positive = buy, negative = sell.
    pub orders: BTreeMap<Symbol, i64>,
    pub dropped: BTreeMap<Symbol, DropReason>,
}

struct Actionable {
    symbol: Symbol,
    diff: f64,
}

fn actionable_set(
    targets: &BTreeMap<Key, f64>,
    current: &BTreeMap<Key, f64>,
    opts: &PlannerOpts,
) -> Vec<Actionable> {
    let mut symbols: Vec<Symbol> = targets
        .keys()
        .chain(current.keys())
        .filter_map(|k| k.symbol())
        .collect();
    symbols.sort();
    symbols.dedup();

    let diff_of = |s: Symbol| -> f64 {
        let t = targets.get(&Key::Symbol(s)).copied().unwrap_or(0.0);
        let c = current.get(&Key::Symbol(s)).copied().unwrap_or(0.0);
        t - c
    };

    let per_holding: Vec<Actionable> = symbols
        .iter()
        .map(|&s| Actionable { symbol: s, diff: diff_of(s) })
        .filter(|a| a.diff.abs() > opts.bands.band_for(a.symbol))
        .collect();

    if !per_holding.is_empty() || !matches!(opts.trigger_mode, TriggerMode::TotalDrift) {
        return per_holding;
    }

    let total_drift_bps: f64 =
        bps::from_fraction(symbols.iter().map(|&s| diff_of(s).abs()).sum::<f64>());
    if total_drift_bps > opts.portfolio_total_band_bps {
        symbols
            .iter()
            .map(|&s| Actionable { symbol: s, diff: diff_of(s) })
            .filter(|a| a.diff != 0.0)
            .collect()
    } else {
        Vec::new()
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Core single-pass planning algorithm (design notes §4.3, steps 1-6).
pub fn plan(
    targets: &BTreeMap<Key, f64>,
    current: &BTreeMap<Key, f64>,
    prices: &BTreeMap<Symbol, f64>,
    total_equity: f64,
    opts: &PlannerOpts,
) -> Result<OrderPlan> {
    if !(total_equity.is_finite() && total_equity > 0.0) {
        return Err(Error::Runtime(format!(
            "total_equity must be finite and > 0, got {total_equity}"
        )));
    }

    let actionable = actionable_set(targets, current, opts);

    let mut values: BTreeMap<Symbol, f64> = BTreeMap::new();
    let mut dropped: BTreeMap<Symbol, DropReason> = BTreeMap::new();

    for a in &actionable {
        let notional = round_cents(a.diff * total_equity);
        if notional.abs() < opts.min_order {
            dropped.insert(
                a.symbol,
                DropReason::BelowMinOrder {
                    notional,
                    min_order: opts.min_order,
                },
            );
            continue;
        }
        values.insert(a.symbol, notional);
    }

    let sells: Vec<(Symbol, f64)> = values
        .iter()
        .filter(|(_, &v)| v < 0.0)
        .map(|(&s, &v)| (s, v))
        .collect();
    let buys: Vec<(Symbol, f64)> = values
        .iter()
        .filter(|(_, &v)| v > 0.0)
        .map(|(&s, &v)| (s, v))
        .collect();

    let current_gross: f64 = current
        .iter()
        .filter(|(k, _)| !k.is_cash())
        .map(|(_, &w)| w.abs())
        .sum::<f64>()
        * total_equity;
    let current_cash: f64 = current.get(&Key::Cash).copied().unwrap_or(0.0) * total_equity;

    let sell_proceeds: f64 = sells.iter().map(|(_, v)| v.abs()).sum();
    let gross_after_sells = current_gross - sell_proceeds;
    let cash_after_sells = current_cash + sell_proceeds;

    let cash_buffer = opts.cash_buffer_pct * total_equity;
    let maint_buffer = opts.maintenance_buffer_pct * total_equity;

    let available_leverage =
        opts.max_leverage * total_equity - gross_after_sells - maint_buffer;
    let available_cash = if opts.cash_buffer_pct > 0.0 {
        cash_after_sells - cash_buffer
    } else {
        f64::INFINITY
    };
    let available = available_leverage.min(available_cash);

    let buy_total: f64 = buys.iter().map(|(_, v)| *v).sum();
    let scale = if buy_total > available && buy_total > 0.0 {
        (available.max(0.0)) / buy_total
    } else {
        1.0
    };

    let mut final_values: BTreeMap<Symbol, f64> = BTreeMap::new();
    for (s, v) in &sells {
        final_values.insert(*s, *v);
    }
    for (s, v) in &buys {
        let scaled = v * scale;
        if scale < 1.0 && scaled.abs() < opts.min_order {
            dropped.insert(
                *s,
                DropReason::ScaledBelowMinOrder {
                    scaled_notional: scaled,
                    min_order: opts.min_order,
                },
            );
            continue;
        }
        final_values.insert(*s, scaled);
    }

    let mut orders = BTreeMap::new();
    for (symbol, notional) in final_values {
        let price = *prices.get(&symbol).ok_or_else(|| {
            Error::Runtime(format!("missing price for actionable symbol {symbol}"))
        })?;
        if !(price.is_finite() && price > 0.0) {
            return Err(Error::Runtime(format!(
                "non-positive price for {symbol}: {price}"
            )));
        }

        let raw_shares = notional / price;
        let shares = if opts.allow_fractional {
            raw_shares
        } else if raw_shares > 0.0 {
            raw_shares.ceil()
        } else {
            raw_shares.floor()
        };

        let current_held = current.get(&Key::Symbol(symbol)).copied().unwrap_or(0.0) * total_equity
            / price;
        let shares = if shares < 0.0 {
            let held_whole = if opts.allow_fractional {
                current_held
            } else {
                current_held.floor().max(0.0)
            };
            shares.max(-held_whole)
        } else {
            shares
        };

        // `OrderPlan.orders` carries whole share counts regardless of
        // `allow_fractional` (the broker adapter trades in integer
        // quantities); fractional mode rounds to the nearest share instead
        // of the outward ceil/floor already applied above, so a sub-share
        // notional that passed `min_order` doesn't silently truncate to a
        // zero-quantity order.
        let shares_int = if opts.allow_fractional {
            shares.round()
        } else {
            shares.trunc()
        };

        if shares_int == 0.0 {
            dropped.insert(symbol, DropReason::ZeroSharesAfterRounding);
            continue;
        }

        orders.insert(symbol, shares_int as i64);
    }

    Ok(OrderPlan { orders, dropped })
}

/// FX-aware two-pass planner (design notes §4.3): a hypothetical pass
/// assuming all funding cash converts, an FX sizing call, then a final
/// pass with the FX proceeds folded into cash.
pub fn plan_with_fx(
    targets: &BTreeMap<Key, f64>,
    current: &BTreeMap<Key, f64>,
    prices: &BTreeMap<Symbol, f64>,
    total_equity: f64,
    opts: &PlannerOpts,
    fx_cfg: &FxConfig,
    funding_cash: f64,
    funding_currency: &str,
    fx_quote: Option<rebalancer_core::Quote>,
    fx_price: Option<f64>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(OrderPlan, FxPlan)> {
    if !fx_cfg
        .funding_currencies
        .iter()
        .any(|c| c.eq_ignore_ascii_case(funding_currency))
    {
        return Err(Error::Config("unsupported funding currency".into()));
    }

    // Spec §4.3 step (1): the hypothetical pass assumes all funding cash
    // converts to USD, so it folds an estimated conversion into CASH before
    // planning — otherwise, with a cash buffer active and little starting
    // USD, the hypothetical buys (and therefore the discovered shortfall)
    // stay capped by existing USD and the FX top-up never fires.
    let est_fx_rate = fx_price.or_else(|| fx_quote.and_then(|q| q.mid()));
    let mut hypothetical_current = current.clone();
    if let Some(rate) = est_fx_rate {
        if rate.is_finite() && rate > 0.0 {
            let funding_usd = funding_cash / rate;
            *hypothetical_current.entry(Key::Cash).or_insert(0.0) += funding_usd / total_equity;
        }
    }

    let hypothetical = plan(targets, &hypothetical_current, prices, total_equity, opts)?;
    let hypothetical_buy_usd: f64 = hypothetical
        .orders
        .iter()
        .filter(|(_, &qty)| qty > 0)
        .map(|(s, &qty)| prices.get(s).copied().unwrap_or(0.0) * qty as f64)
        .sum();

    let usd_cash = current.get(&Key::Cash).copied().unwrap_or(0.0) * total_equity;

    let fx_plan = fx::plan_fx_if_needed(
        hypothetical_buy_usd,
        usd_cash,
        funding_cash,
        fx_quote,
        fx_cfg,
        fx_price,
        now,
    );

    let mut final_current = current.clone();
    if fx_plan.need_fx {
        let entry = final_current.entry(Key::Cash).or_insert(0.0);
        *entry += fx_plan.usd_notional / total_equity;
    }

    let final_plan = plan(targets, &final_current, prices, total_equity, opts)?;
    Ok((final_plan, fx_plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }
    fn key(s: &str) -> Key {
        Key::Symbol(sym(s))
    }

    fn base_opts() -> PlannerOpts {
        PlannerOpts {
            bands: Bands::Scalar(0.0),
            min_order: 0.0,
            max_leverage: 1.0,
            cash_buffer_pct: 0.0,
            maintenance_buffer_pct: 0.0,
            allow_fractional: false,
            trigger_mode: TriggerMode::PerHolding,
            portfolio_total_band_bps: 0.0,
        }
    }

    #[test]
    fn s1_no_trade_within_band() {
        let targets = BTreeMap::from([(key("AAA"), 0.6), (key("BBB"), 0.4)]);
        let current = targets.clone();
        let prices = BTreeMap::from([(sym("AAA"), 100.0), (sym("BBB"), 100.0)]);
        let mut opts = base_opts();
        opts.bands = Bands::Scalar(0.05);
        let plan_result = plan(&targets, &current, &prices, 100_000.0, &opts).unwrap();
        assert!(plan_result.orders.is_empty());
    }

    #[test]
    fn s2_overweight_sells() {
        let targets = BTreeMap::from([(key("AAA"), 0.5), (key("BBB"), 0.5)]);
        let current = BTreeMap::from([(key("AAA"), 0.6), (key("BBB"), 0.4)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0), (sym("BBB"), 100.0)]);
        let opts = base_opts();
        let plan_result = plan(&targets, &current, &prices, 100_000.0, &opts).unwrap();
        assert_eq!(plan_result.orders.get(&sym("AAA")), Some(&-100));
        assert_eq!(plan_result.orders.get(&sym("BBB")), Some(&100));
    }

    #[test]
    fn s3_margin_scaling() {
        let targets = BTreeMap::from([
            (key("AAA"), 1.3),
            (key("BBB"), 0.3),
            (Key::Cash, -0.6),
        ]);
        let current = BTreeMap::from([(key("AAA"), 0.5), (key("BBB"), 0.5)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0), (sym("BBB"), 100.0)]);
        let mut opts = base_opts();
        opts.max_leverage = 1.5;
        let plan_result = plan(&targets, &current, &prices, 100_000.0, &opts).unwrap();
        assert_eq!(plan_result.orders.get(&sym("AAA")), Some(&700));
        assert_eq!(plan_result.orders.get(&sym("BBB")), Some(&-200));
    }

    #[test]
    fn min_order_drops_small_notional() {
        let targets = BTreeMap::from([(key("AAA"), 0.501), (key("BBB"), 0.499)]);
        let current = BTreeMap::from([(key("AAA"), 0.5), (key("BBB"), 0.5)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0), (sym("BBB"), 100.0)]);
        let mut opts = base_opts();
        opts.min_order = 500.0;
        let plan_result = plan(&targets, &current, &prices, 100_000.0, &opts).unwrap();
        assert!(plan_result.orders.is_empty());
        assert_eq!(plan_result.dropped.len(), 2);
    }

    #[test]
    fn total_drift_mode_triggers_when_per_holding_does_not() {
        let targets = BTreeMap::from([(key("AAA"), 0.52), (key("BBB"), 0.48)]);
        let current = BTreeMap::from([(key("AAA"), 0.5), (key("BBB"), 0.5)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0), (sym("BBB"), 100.0)]);
        let mut opts = base_opts();
        opts.bands = Bands::Scalar(0.05); // per-holding drift (0.02) is within band
        opts.trigger_mode = TriggerMode::TotalDrift;
        opts.portfolio_total_band_bps = 100.0; // 0.04 total drift * 10_000 = 400bps > 100
        let plan_result = plan(&targets, &current, &prices, 100_000.0, &opts).unwrap();
        assert!(!plan_result.orders.is_empty());
    }

    #[test]
    fn total_drift_mode_stays_quiet_under_threshold() {
        let targets = BTreeMap::from([(key("AAA"), 0.52), (key("BBB"), 0.48)]);
        let current = BTreeMap::from([(key("AAA"), 0.5), (key("BBB"), 0.5)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0), (sym("BBB"), 100.0)]);
        let mut opts = base_opts();
        opts.bands = Bands::Scalar(0.05);
        opts.trigger_mode = TriggerMode::TotalDrift;
        opts.portfolio_total_band_bps = 1_000.0;
        let plan_result = plan(&targets, &current, &prices, 100_000.0, &opts).unwrap();
        assert!(plan_result.orders.is_empty());
    }

    #[test]
    fn sells_capped_at_held_shares() {
        let targets = BTreeMap::from([(key("AAA"), 0.0)]);
        let current = BTreeMap::from([(key("AAA"), 0.2)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0)]);
        let opts = base_opts();
        let plan_result = plan(&targets, &current, &prices, 100_000.0, &opts).unwrap();
        // 20% of 100,000 = 20,000 / 100 = 200 shares held; selling to zero target.
        assert_eq!(plan_result.orders.get(&sym("AAA")), Some(&-200));
    }

    #[test]
    fn fractional_disabled_rounds_outward_and_drops_zero() {
        let targets = BTreeMap::from([(key("AAA"), 0.00001)]);
        let current = BTreeMap::from([(key("AAA"), 0.0)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0)]);
        let mut opts = base_opts();
        opts.min_order = 0.0;
        let plan_result = plan(&targets, &current, &prices, 1_000.0, &opts).unwrap();
        // notional = 0.01 -> shares = 0.0001 -> ceil to 1 (rounds outward for buys)
        assert_eq!(plan_result.orders.get(&sym("AAA")), Some(&1));
    }

    #[test]
    fn fractional_allowed_rounds_to_nearest_share_never_emits_zero() {
        let targets = BTreeMap::from([(key("AAA"), 0.0049)]);
        let current = BTreeMap::from([(key("AAA"), 0.0)]);
        let prices = BTreeMap::from([(sym("AAA"), 100.0)]);
        let mut opts = base_opts();
        opts.allow_fractional = true;
        opts.min_order = 0.0;
        // notional = 0.49 -> raw shares = 0.0049 -> rounds to nearest share (0),
        // which must be dropped rather than silently inserted as a zero order.
        let plan_result = plan(&targets, &current, &prices, 10_000.0, &opts).unwrap();
        assert!(!plan_result.orders.contains_key(&sym("AAA")));
        assert!(plan_result.dropped.contains_key(&sym("AAA")));
    }

    #[test]
    fn rejects_non_positive_equity() {
        let targets = BTreeMap::from([(key("AAA"), 1.0)]);
        let current = BTreeMap::new();
        let prices = BTreeMap::from([(sym("AAA"), 100.0)]);
        let opts = base_opts();
        assert!(plan(&targets, &current, &prices, 0.0, &opts).is_err());
    }

    #[test]
    fn plan_with_fx_rejects_unsupported_currency() {
        let targets = BTreeMap::from([(key("AAA"), 0.5)]);
        let current = BTreeMap::new();
        let prices = BTreeMap::from([(sym("AAA"), 100.0)]);
        let opts = base_opts();
        let fx_cfg = FxConfig {
            enabled: true,
            base_currency: "USD".into(),
            funding_currencies: vec!["CAD".into()],
            use_mid_for_planning: true,
            min_fx_order_usd: 1_000.0,
            max_fx_order_usd: None,
            fx_buffer_bps: 20.0,
            order_type: crate::fx::OrderType::Market,
            limit_slippage_bps: 10.0,
            route: "IDEALPRO".into(),
            wait_for_fill_seconds: 30,
            prefer_market_hours: false,
            stale_quote_seconds: 60,
            market_holidays: Vec::new(),
        };
        let result = plan_with_fx(
            &targets,
            &current,
            &prices,
            100_000.0,
            &opts,
            &fx_cfg,
            10_000.0,
            "EUR",
            None,
            Some(1.0),
            chrono::Utc::now(),
        );
        assert!(result.is_err());
    }
}
