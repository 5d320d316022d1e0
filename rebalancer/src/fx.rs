//! FX sizing engine: decides whether a funding-currency -> base-currency
//! conversion is required to cover a USD shortfall, and sizes it with
//! buffer, cap, quote-freshness, and market-hours rules.
//!
//! Pure function of config + snapshot + quote + `now`. Market-hours and
//! staleness checks never read the system clock directly — `now` is always
//! threaded in by the caller.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use rebalancer_core::{bps, Quote};

/// How orders are routed once sized (design notes §6 `fx` config group).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

/// FX engine configuration (design notes §6).
#[derive(Debug, Clone)]
pub struct FxConfig {
    pub enabled: bool,
    pub base_currency: String,
    pub funding_currencies: Vec<String>,
    pub use_mid_for_planning: bool,
    pub min_fx_order_usd: f64,
    pub max_fx_order_usd: Option<f64>,
    pub fx_buffer_bps: f64,
    pub order_type: OrderType,
    pub limit_slippage_bps: f64,
    pub route: String,
    pub wait_for_fill_seconds: u64,
    pub prefer_market_hours: bool,
    pub stale_quote_seconds: i64,
    /// Local calendar dates (`America/New_York`) the FX market is fully
    /// closed regardless of weekday.
    pub market_holidays: Vec<chrono::NaiveDate>,
}

/// Sizing decision for an FX conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct FxPlan {
    pub need_fx: bool,
    pub pair: String,
    pub side: Side,
    pub usd_notional: f64,
    pub est_rate: f64,
    pub qty: f64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub route: String,
    pub wait_seconds: u64,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
}

fn no_fx(reason: &'static str, cfg: &FxConfig, pair: String) -> FxPlan {
    FxPlan {
        need_fx: false,
        pair,
        side: Side::Buy,
        usd_notional: 0.0,
        est_rate: 0.0,
        qty: 0.0,
        order_type: cfg.order_type,
        limit_price: None,
        route: cfg.route.clone(),
        wait_seconds: cfg.wait_for_fill_seconds,
        reason,
    }
}

/// `true` iff the FX market is open at `now` (America/New_York local time),
/// per design notes §4.4: continuously open Monday-Thursday, open Sunday
/// 17:00 local through Friday 17:00 local, closed Saturday, and closed on
/// configured holiday dates regardless of weekday.
pub fn is_market_open(now: DateTime<Utc>, holidays: &[chrono::NaiveDate]) -> bool {
    let local = now.with_timezone(&New_York);
    if holidays.contains(&local.date_naive()) {
        return false;
    }
    match local.weekday() {
        Weekday::Sat => false,
        Weekday::Sun => local.hour() >= 17 || (local.hour() == 17 && local.minute() >= 0),
        Weekday::Fri => local.hour() < 17,
        _ => true,
    }
}

/// Decide whether an FX conversion is needed and size it (design notes §4.4).
#[allow(clippy::too_many_arguments)]
pub fn plan_fx_if_needed(
    usd_needed: f64,
    usd_cash: f64,
    funding_cash: f64,
    fx_quote: Option<Quote>,
    cfg: &FxConfig,
    fx_price: Option<f64>,
    now: DateTime<Utc>,
) -> FxPlan {
    let funding_ccy = cfg
        .funding_currencies
        .first()
        .cloned()
        .unwrap_or_else(|| "???".to_string());
    let pair = format!("{}.{}", cfg.base_currency, funding_ccy);

    if !cfg.enabled {
        return no_fx("fx disabled", cfg, pair);
    }

    if cfg.prefer_market_hours && !is_market_open(now, &cfg.market_holidays) {
        return no_fx("outside market hours", cfg, pair);
    }

    let shortfall = (usd_needed - usd_cash).max(0.0);
    if shortfall <= 0.0 {
        return no_fx("no shortfall", cfg, pair);
    }

    if funding_cash <= 0.0 {
        return no_fx("no funding cash available", cfg, pair);
    }

    let mut buffered = shortfall * (1.0 + bps::to_fraction(cfg.fx_buffer_bps));
    if buffered < cfg.min_fx_order_usd {
        return no_fx("shortfall below minimum FX order", cfg, pair);
    }
    if let Some(cap) = cfg.max_fx_order_usd {
        buffered = buffered.min(cap);
    }

    let mid_from_quote = fx_quote.and_then(|q| q.mid());
    let est_rate = if let Some(price) = fx_price {
        price
    } else {
        let Some(quote) = fx_quote else {
            return no_fx("missing FX quote", cfg, pair);
        };
        if quote.is_stale(cfg.stale_quote_seconds, now) {
            return no_fx("stale FX quote", cfg, pair);
        }
        if cfg.use_mid_for_planning {
            match quote.mid() {
                Some(m) => m,
                None => return no_fx("incomplete FX quote", cfg, pair),
            }
        } else {
            match quote.ask {
                Some(a) => a,
                None => return no_fx("incomplete FX quote", cfg, pair),
            }
        }
    };

    if !(est_rate.is_finite() && est_rate > 0.0) {
        return no_fx("incomplete FX quote", cfg, pair);
    }

    let max_purchasable = funding_cash / est_rate;
    if max_purchasable < cfg.min_fx_order_usd {
        return no_fx("insufficient funding", cfg, pair);
    }

    let usd_notional = round_to(buffered.min(max_purchasable), 0.01);
    let est_rate = round_to(est_rate, 0.0001);
    let qty = round_to(usd_notional, 0.01);

    let limit_price = if cfg.order_type == OrderType::Limit {
        let mid = fx_price.or(mid_from_quote).unwrap_or(est_rate);
        Some(round_to(
            mid * (1.0 + bps::to_fraction(cfg.limit_slippage_bps)),
            0.0001,
        ))
    } else {
        None
    };

    FxPlan {
        need_fx: true,
        pair,
        side: Side::Buy,
        usd_notional,
        est_rate,
        qty,
        order_type: cfg.order_type,
        limit_price,
        route: cfg.route.clone(),
        wait_seconds: cfg.wait_for_fill_seconds,
        reason: "conversion required",
    }
}

fn round_to(value: f64, increment: f64) -> f64 {
    (value / increment).round() * increment
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_cfg() -> FxConfig {
        FxConfig {
            enabled: true,
            base_currency: "USD".into(),
            funding_currencies: vec!["CAD".into()],
            use_mid_for_planning: true,
            min_fx_order_usd: 1_000.0,
            max_fx_order_usd: None,
            fx_buffer_bps: 20.0,
            order_type: OrderType::Market,
            limit_slippage_bps: 10.0,
            route: "IDEALPRO".into(),
            wait_for_fill_seconds: 30,
            prefer_market_hours: false,
            stale_quote_seconds: 60,
            market_holidays: Vec::new(),
        }
    }

    fn cad_quote(mid: f64, ts: DateTime<Utc>) -> Quote {
        Quote::new(
            rebalancer_core::Symbol::new("USDCAD"),
            Some(mid - 0.001),
            Some(mid + 0.001),
            Some(mid),
            ts,
        )
    }

    #[test]
    fn s4_fx_top_up_sizes_conversion() {
        let cfg = base_cfg();
        let now = Utc::now();
        let quote = cad_quote(1.255, now);
        let plan = plan_fx_if_needed(50_000.0, 0.0, 150_000.0, Some(quote), &cfg, None, now);
        assert!(plan.need_fx);
        let expected = (50_000.0 * 1.002).min(150_000.0 / 1.255);
        assert!((plan.usd_notional - expected).abs() < 1.0);
        assert!(plan.usd_notional >= cfg.min_fx_order_usd);
    }

    #[test]
    fn no_shortfall_skips_fx() {
        let cfg = base_cfg();
        let now = Utc::now();
        let quote = cad_quote(1.255, now);
        let plan = plan_fx_if_needed(10_000.0, 20_000.0, 100_000.0, Some(quote), &cfg, None, now);
        assert!(!plan.need_fx);
        assert_eq!(plan.reason, "no shortfall");
    }

    #[test]
    fn no_funding_cash_skips_fx() {
        let cfg = base_cfg();
        let now = Utc::now();
        let quote = cad_quote(1.255, now);
        let plan = plan_fx_if_needed(50_000.0, 0.0, 0.0, Some(quote), &cfg, None, now);
        assert!(!plan.need_fx);
        assert_eq!(plan.reason, "no funding cash available");
    }

    #[test]
    fn stale_quote_skips_fx() {
        let cfg = base_cfg();
        let now = Utc::now();
        let stale = cad_quote(1.255, now - chrono::Duration::seconds(120));
        let plan = plan_fx_if_needed(50_000.0, 0.0, 150_000.0, Some(stale), &cfg, None, now);
        assert!(!plan.need_fx);
        assert_eq!(plan.reason, "stale FX quote");
    }

    #[test]
    fn below_min_order_skips_fx() {
        let mut cfg = base_cfg();
        cfg.min_fx_order_usd = 100_000.0;
        let now = Utc::now();
        let quote = cad_quote(1.255, now);
        let plan = plan_fx_if_needed(1_000.0, 0.0, 150_000.0, Some(quote), &cfg, None, now);
        assert!(!plan.need_fx);
    }

    #[test]
    fn insufficient_funding_skips_fx() {
        let cfg = base_cfg();
        let now = Utc::now();
        let quote = cad_quote(1.255, now);
        let plan = plan_fx_if_needed(50_000.0, 0.0, 500.0, Some(quote), &cfg, None, now);
        assert!(!plan.need_fx);
        assert_eq!(plan.reason, "insufficient funding");
    }

    #[test]
    fn max_fx_order_caps_notional() {
        let mut cfg = base_cfg();
        cfg.max_fx_order_usd = Some(10_000.0);
        let now = Utc::now();
        let quote = cad_quote(1.255, now);
        let plan = plan_fx_if_needed(50_000.0, 0.0, 150_000.0, Some(quote), &cfg, None, now);
        assert!(plan.need_fx);
        assert!(plan.usd_notional <= 10_000.0 + 1e-6);
    }

    #[test]
    fn limit_order_sets_slippage_price() {
        let mut cfg = base_cfg();
        cfg.order_type = OrderType::Limit;
        let now = Utc::now();
        let quote = cad_quote(1.255, now);
        let plan = plan_fx_if_needed(50_000.0, 0.0, 150_000.0, Some(quote), &cfg, None, now);
        assert!(plan.limit_price.is_some());
        assert!(plan.limit_price.unwrap() > 1.255);
    }

    #[test]
    fn fx_price_override_skips_quote_requirement() {
        let cfg = base_cfg();
        let now = Utc::now();
        let plan = plan_fx_if_needed(50_000.0, 0.0, 150_000.0, None, &cfg, Some(1.3), now);
        assert!(plan.need_fx);
        assert_eq!(plan.est_rate, 1.3);
    }

    #[test]
    fn missing_quote_and_price_skips_fx() {
        let cfg = base_cfg();
        let now = Utc::now();
        let plan = plan_fx_if_needed(50_000.0, 0.0, 150_000.0, None, &cfg, None, now);
        assert!(!plan.need_fx);
        assert_eq!(plan.reason, "missing FX quote");
    }

    #[test]
    fn market_hours_closed_on_saturday() {
        // 2026-01-03 is a Saturday.
        let now = New_York
            .with_ymd_and_hms(2026, 1, 3, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!is_market_open(now, &[]));
    }

    #[test]
    fn market_hours_open_thursday_midday() {
        let now = New_York
            .with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(is_market_open(now, &[]));
    }

    #[test]
    fn market_hours_closed_friday_after_17() {
        let now = New_York
            .with_ymd_and_hms(2026, 1, 2, 18, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!is_market_open(now, &[]));
    }

    #[test]
    fn market_hours_opens_sunday_at_17() {
        let before = New_York
            .with_ymd_and_hms(2026, 1, 4, 16, 59, 0)
            .unwrap()
            .with_timezone(&Utc);
        let after = New_York
            .with_ymd_and_hms(2026, 1, 4, 17, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!is_market_open(before, &[]));
        assert!(is_market_open(after, &[]));
    }

    #[test]
    fn holiday_closes_market_on_weekday() {
        let holiday = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let now = New_York
            .with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!is_market_open(now, &[holiday]));
    }

    #[test]
    fn prefer_market_hours_blocks_outside_window() {
        let mut cfg = base_cfg();
        cfg.prefer_market_hours = true;
        let saturday = New_York
            .with_ymd_and_hms(2026, 1, 3, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let quote = cad_quote(1.255, saturday);
        let plan = plan_fx_if_needed(50_000.0, 0.0, 150_000.0, Some(quote), &cfg, None, saturday);
        assert!(!plan.need_fx);
        assert_eq!(plan.reason, "outside market hours");
    }
}
