//! Spread-aware limit pricer: converts intent-to-trade into a concrete
//! limit price (or a market escalation), constrained by the NBBO, tick
//! grid, spread width, and quote staleness.
//!
//! Pure function of a quote, config, and `now`.

use chrono::{DateTime, Utc};
use rebalancer_core::{bps, Quote};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    SpreadAware,
    StaticBps,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalateAction {
    Cross,
    Market,
    Keep,
}

/// Limit pricer configuration (design notes §6 `limits` config group).
#[derive(Debug, Clone, Copy)]
pub struct LimitsConfig {
    pub smart_limit: bool,
    pub style: Style,
    pub buy_offset_frac: f64,
    pub sell_offset_frac: f64,
    pub max_offset_bps: f64,
    pub wide_spread_bps: f64,
    pub stale_quote_seconds: i64,
    pub escalate_action: EscalateAction,
    pub use_ask_bid_cap: bool,
}

fn offset_frac_for(side: Side, cfg: &LimitsConfig) -> f64 {
    match side {
        Side::Buy => cfg.buy_offset_frac,
        Side::Sell => cfg.sell_offset_frac,
    }
}

fn effective_tick(tick: f64) -> f64 {
    if tick.is_finite() && tick > 0.0 {
        tick
    } else {
        0.01
    }
}

fn round_to_tick(price: f64, tick: f64) -> f64 {
    (price / tick).round() * tick
}

fn round_up_to_tick(price: f64, tick: f64) -> f64 {
    (price / tick).ceil() * tick
}

fn round_down_to_tick(price: f64, tick: f64) -> f64 {
    (price / tick).floor() * tick
}

/// Compute a limit price (or a market escalation) for `side` against `quote`.
pub fn price_limit(
    side: Side,
    quote: &Quote,
    tick: f64,
    cfg: &LimitsConfig,
    now: DateTime<Utc>,
) -> Result<(Option<f64>, OrderType)> {
    let tick = effective_tick(tick);

    if !cfg.smart_limit || cfg.style == Style::Off {
        let naive = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };
        return Ok((naive, OrderType::Limit));
    }

    match cfg.style {
        Style::SpreadAware => price_limit_spread_aware(side, quote, tick, cfg, now),
        Style::StaticBps => price_limit_static_bps(side, quote, tick, cfg),
        Style::Off => unreachable!(),
    }
}

fn price_limit_static_bps(
    side: Side,
    quote: &Quote,
    tick: f64,
    cfg: &LimitsConfig,
) -> Result<(Option<f64>, OrderType)> {
    let Some(mid) = quote.mid() else {
        return Err(Error::Runtime("static_bps pricer requires a mid".into()));
    };
    let offset_frac = offset_frac_for(side, cfg);
    let offset = mid * offset_frac;
    let candidate = match side {
        Side::Buy => mid + offset,
        Side::Sell => mid - offset,
    };
    let capped = cap_to_max_offset(candidate, mid, side, cfg.max_offset_bps);
    Ok((Some(round_to_tick(capped, tick)), OrderType::Limit))
}

fn cap_to_max_offset(candidate: f64, mid: f64, side: Side, max_offset_bps: f64) -> f64 {
    let max_offset = mid * bps::to_fraction(max_offset_bps);
    match side {
        Side::Buy => candidate.min(mid + max_offset),
        Side::Sell => candidate.max(mid - max_offset),
    }
}

fn price_limit_spread_aware(
    side: Side,
    quote: &Quote,
    tick: f64,
    cfg: &LimitsConfig,
    now: DateTime<Utc>,
) -> Result<(Option<f64>, OrderType)> {
    let (Some(bid), Some(ask)) = (quote.bid, quote.ask) else {
        return Err(Error::Runtime(
            "spread_aware pricer requires both bid and ask".into(),
        ));
    };
    if ask <= bid {
        return Err(Error::Runtime(format!(
            "spread_aware pricer requires ask > bid, got bid={bid} ask={ask}"
        )));
    }
    let mid = (bid + ask) / 2.0;
    let spread_bps = bps::from_fraction((ask - bid) / mid);
    let is_stale = quote.is_stale(cfg.stale_quote_seconds, now);

    let capped = match side {
        Side::Buy => {
            let candidate = mid + cfg.buy_offset_frac * (ask - bid);
            let capped = cap_to_max_offset(candidate, mid, side, cfg.max_offset_bps);
            let capped = if cfg.use_ask_bid_cap {
                capped.min(ask)
            } else {
                capped
            };
            let mut rounded = round_to_tick(capped, tick);
            if cfg.use_ask_bid_cap && rounded > ask {
                rounded = round_down_to_tick(ask, tick);
            }
            rounded
        }
        Side::Sell => {
            let candidate = mid - cfg.sell_offset_frac * (ask - bid);
            let capped = cap_to_max_offset(candidate, mid, side, cfg.max_offset_bps);
            let capped = if cfg.use_ask_bid_cap {
                capped.max(bid)
            } else {
                capped
            };
            let mut rounded = round_to_tick(capped, tick);
            if cfg.use_ask_bid_cap && rounded < bid {
                rounded = round_up_to_tick(bid, tick);
            }
            rounded
        }
    };

    if spread_bps > cfg.wide_spread_bps || is_stale {
        return Ok(escalate(side, bid, ask, tick, capped, cfg));
    }

    Ok((Some(capped), OrderType::Limit))
}

fn escalate(
    side: Side,
    bid: f64,
    ask: f64,
    tick: f64,
    kept_price: f64,
    cfg: &LimitsConfig,
) -> (Option<f64>, OrderType) {
    match cfg.escalate_action {
        EscalateAction::Market => (None, OrderType::Market),
        EscalateAction::Keep => (Some(kept_price), OrderType::Limit),
        EscalateAction::Cross => {
            let price = match side {
                Side::Buy => {
                    let mut p = round_up_to_tick(ask, tick);
                    if cfg.use_ask_bid_cap && p > ask {
                        p = round_down_to_tick(ask, tick);
                    }
                    p
                }
                Side::Sell => {
                    let mut p = round_down_to_tick(bid, tick);
                    if cfg.use_ask_bid_cap && p < bid {
                        p = round_up_to_tick(bid, tick);
                    }
                    p
                }
            };
            (Some(price), OrderType::Limit)
        }
    }
}
