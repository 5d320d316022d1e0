//! Sequenced order executor: the only stateful, time-sensitive component in
//! the engine. Orchestrates a [`rebalancer_broker::Broker`] adapter through
//! the strict FX → SELL → BUY submission order, honoring concurrency caps,
//! pacing, partial-fill cancellation, batch timeouts, and the post-FX wait.
//!
//! Everything upstream (blend, snapshot, plan, price, build) is pure; this
//! module is where the engine actually touches the outside world.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use log::{info, warn};

use rebalancer_broker::{Account, Broker, BrokerError, BrokerOrder, BrokerOrderType, BrokerSide, Fill, OrderId};
use rebalancer_core::Symbol;

use crate::error::{Error, Result};
use crate::fx::FxPlan;

/// Safety and scheduling preconditions checked, in order, before the first
/// order is ever submitted (design notes §4.7).
#[derive(Debug, Clone)]
pub struct SafetyGate {
    /// A filesystem path whose mere existence aborts the run.
    pub kill_switch_file: Option<std::path::PathBuf>,
    /// Live trading requires both `!paper_only` *and* this explicit flag.
    pub paper_only: bool,
    pub live_authorized: bool,
    /// If set, the run must occur within 09:30-16:00 America/New_York on a
    /// weekday.
    pub prefer_rth: bool,
    /// Confirmation was accepted (a `yes=true`/`--force` flag bypasses the
    /// interactive prompt upstream; the gate only checks the outcome).
    pub confirmed: bool,
}

/// `true` iff `now` (interpreted in America/New_York) falls within Regular
/// Trading Hours, 09:30-16:00, Monday-Friday.
pub fn is_regular_trading_hours(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&New_York);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let t = local.time();
    t >= open && t <= close
}

/// Checked in order; the first failing precondition aborts the run with a
/// `SafetyError` before any adapter call is made.
pub fn check_safety_gate(gate: &SafetyGate, now: DateTime<Utc>) -> Result<()> {
    if let Some(path) = &gate.kill_switch_file {
        if path.exists() {
            return Err(Error::Safety(format!(
                "kill switch present at {}",
                path.display()
            )));
        }
    }
    if !gate.paper_only && !gate.live_authorized {
        return Err(Error::Safety(
            "live trading requires explicit authorization".into(),
        ));
    }
    if gate.prefer_rth && !is_regular_trading_hours(now) {
        return Err(Error::Safety(
            "prefer_rth is set and now is outside 09:30-16:00 America/New_York".into(),
        ));
    }
    if !gate.confirmed {
        return Err(Error::Safety("execution not confirmed".into()));
    }
    Ok(())
}

/// Runtime options for a single `execute` call (design notes §4.7, §5).
#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub safety: SafetyGate,
    /// If true (or if `--dry-run`/`--report-only` was passed upstream), no
    /// orders are submitted; the concatenated planned order list is
    /// returned instead.
    pub report_only: bool,
    /// `0` means unbounded — submit every order in a group at once.
    pub concurrency_cap: usize,
    pub batch_timeout: Duration,
}

/// Outcome of a single `execute` call.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    /// `report_only`/`dry_run`: the orders that would have been submitted,
    /// FX first, then sells, then buys, with no side effects.
    Planned(Vec<BrokerOrder>),
    Executed(ExecutionResult),
}

/// What actually happened during a live (or paper) run.
///
/// `timed_out` holds only the order ids the adapter explicitly reported as
/// timed out via `BrokerError::Timeout`; `canceled` holds every order still
/// outstanding at the end of its batch's wait, whether or not the adapter
/// raised a timeout for it.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub submitted: Vec<(Symbol, BrokerSide, u64, OrderId)>,
    pub fills: Vec<Fill>,
    pub canceled: Vec<OrderId>,
    pub timed_out: Vec<OrderId>,
    pub sell_proceeds: f64,
}

impl ExecutionResult {
    fn extend(&mut self, other: BatchOutcome) {
        self.submitted.extend(other.submitted);
        self.fills.extend(other.fills);
        self.canceled.extend(other.canceled);
        self.timed_out.extend(other.timed_out);
    }
}

struct BatchOutcome {
    submitted: Vec<(Symbol, BrokerSide, u64, OrderId)>,
    fills: Vec<Fill>,
    canceled: Vec<OrderId>,
    timed_out: Vec<OrderId>,
}

pub(crate) fn translate_broker_error(e: BrokerError) -> Error {
    match e {
        BrokerError::Pacing => Error::Pacing(e.to_string()),
        BrokerError::Resolution(sym) => Error::Resolution(sym),
        BrokerError::Connection(msg) | BrokerError::Auth(msg) => Error::Connection(msg),
        BrokerError::NotConnected => Error::Connection("not connected".into()),
        BrokerError::Timeout(ids) => {
            Error::Execution(format!("timed out waiting for fills on {ids:?}"))
        }
        BrokerError::Order(msg) | BrokerError::Other(msg) => Error::Execution(msg),
    }
}

/// Already covered by a previously-observed fill (retry/resumption):
/// identity is the fill's order id when present, else `(symbol, side, qty)`.
fn already_filled(order: &BrokerOrder, previous: &[Fill]) -> bool {
    let filled_qty: u64 = previous
        .iter()
        .filter(|f| f.symbol == order.symbol && f.side == order.side)
        .map(|f| f.quantity)
        .sum();
    filled_qty >= order.quantity
}

/// Submit one batch of orders (size <= `concurrency_cap`, or the whole
/// group when uncapped), wait for fills, and cancel whatever is left
/// outstanding at the end of the wait.
fn run_batch(
    adapter: &dyn Broker,
    batch: &[BrokerOrder],
    timeout: Duration,
) -> Result<BatchOutcome> {
    let mut submitted = Vec::with_capacity(batch.len());
    let mut ids = Vec::with_capacity(batch.len());
    let mut remaining: BTreeMap<u64, u64> = BTreeMap::new();

    for order in batch {
        let id = adapter
            .submit_order(order)
            .map_err(translate_broker_error)?;
        submitted.push((order.symbol, order.side, order.quantity, id));
        remaining.insert(id.0, order.quantity);
        ids.push(id);
    }

    let (fills, timed_out) = match adapter.wait_for_fills(&ids, timeout) {
        Ok(fills) => (fills, Vec::new()),
        Err(BrokerError::Timeout(ids)) => (Vec::new(), ids.into_iter().map(OrderId).collect()),
        Err(e) => return Err(translate_broker_error(e)),
    };

    for fill in &fills {
        if let Some(rem) = remaining.get_mut(&fill.order_id.0) {
            *rem = rem.saturating_sub(fill.quantity);
        }
    }

    let mut canceled = Vec::new();
    for id in &ids {
        if remaining.get(&id.0).copied().unwrap_or(0) > 0 {
            adapter.cancel_order(*id).map_err(translate_broker_error)?;
            canceled.push(*id);
        }
    }

    Ok(BatchOutcome {
        submitted,
        fills,
        canceled,
        timed_out,
    })
}

/// Submit `orders` (already filtered of anything covered by
/// `previously_observed`) in `concurrency_cap`-sized slices, sequentially.
fn run_group(
    adapter: &dyn Broker,
    orders: &[BrokerOrder],
    concurrency_cap: usize,
    timeout: Duration,
) -> Result<ExecutionResult> {
    let mut result = ExecutionResult::default();
    if orders.is_empty() {
        return Ok(result);
    }
    let slice_size = if concurrency_cap == 0 {
        orders.len()
    } else {
        concurrency_cap
    };
    for batch in orders.chunks(slice_size) {
        let outcome = run_batch(adapter, batch, timeout)?;
        result.extend(outcome);
    }
    Ok(result)
}

/// Estimate a BUY order's notional from its own limit price, falling back
/// to the adapter's current quote (ask, then last) when the order is a
/// market order.
fn estimate_buy_notional(adapter: &dyn Broker, order: &BrokerOrder) -> f64 {
    let price = match order.order_type {
        BrokerOrderType::Limit(p) => p.as_dollars(),
        BrokerOrderType::Market => adapter
            .quote(&order.symbol)
            .ok()
            .and_then(|q| q.ask.or(q.last))
            .unwrap_or(0.0),
    };
    price * order.quantity as f64
}

/// Scale every BUY order's quantity down (never up) so total notional fits
/// `buying_power = available_cash * max_leverage + sell_proceeds` (design
/// notes §4.7).
fn scale_buys_to_buying_power(
    adapter: &dyn Broker,
    buys: &[BrokerOrder],
    available_cash: Option<f64>,
    max_leverage: f64,
    sell_proceeds: f64,
) -> Vec<BrokerOrder> {
    let Some(available_cash) = available_cash else {
        return buys.to_vec();
    };
    let buying_power = available_cash * max_leverage + sell_proceeds;
    let total: f64 = buys.iter().map(|o| estimate_buy_notional(adapter, o)).sum();
    if total <= buying_power || total <= 0.0 {
        return buys.to_vec();
    }
    let scale = (buying_power.max(0.0)) / total;
    buys.iter()
        .map(|o| {
            let mut scaled = o.clone();
            scaled.quantity = ((o.quantity as f64) * scale).floor() as u64;
            scaled
        })
        .filter(|o| o.quantity > 0)
        .collect()
}

/// Run the full FX → SELL → BUY sequence against `adapter`.
///
/// `previously_observed_fills` lets a retry skip orders a prior, interrupted
/// run already filled, so resumption never double-submits or double-counts
/// fills against buying power.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    adapter: &dyn Broker,
    fx_orders: &[BrokerOrder],
    sell_orders: &[BrokerOrder],
    buy_orders: &[BrokerOrder],
    fx_plan: Option<&FxPlan>,
    opts: &ExecOpts,
    available_cash: Option<f64>,
    max_leverage: f64,
    now: DateTime<Utc>,
    previously_observed_fills: &[Fill],
) -> Result<ExecOutcome> {
    check_safety_gate(&opts.safety, now)?;

    if opts.report_only {
        let planned: Vec<BrokerOrder> = fx_orders
            .iter()
            .chain(sell_orders.iter())
            .chain(buy_orders.iter())
            .cloned()
            .collect();
        return Ok(ExecOutcome::Planned(planned));
    }

    let fx_to_submit: Vec<BrokerOrder> = fx_orders
        .iter()
        .filter(|o| !already_filled(o, previously_observed_fills))
        .cloned()
        .collect();
    let sells_to_submit: Vec<BrokerOrder> = sell_orders
        .iter()
        .filter(|o| !already_filled(o, previously_observed_fills))
        .cloned()
        .collect();

    let mut result = ExecutionResult::default();

    if !fx_to_submit.is_empty() {
        let fx_result = run_group(adapter, &fx_to_submit, opts.concurrency_cap, opts.batch_timeout)?;
        result.extend(BatchOutcome {
            submitted: fx_result.submitted,
            fills: fx_result.fills,
            canceled: fx_result.canceled,
            timed_out: fx_result.timed_out,
        });
        if let Some(plan) = fx_plan {
            if plan.wait_seconds > 0 {
                info!("waiting {}s for FX fill to settle", plan.wait_seconds);
                std::thread::sleep(Duration::from_secs(plan.wait_seconds));
            }
        }
    }

    let sell_result = run_group(adapter, &sells_to_submit, opts.concurrency_cap, opts.batch_timeout)?;
    result.extend(BatchOutcome {
        submitted: sell_result.submitted,
        fills: sell_result.fills.clone(),
        canceled: sell_result.canceled,
        timed_out: sell_result.timed_out,
    });

    let sell_proceeds: f64 = previously_observed_fills
        .iter()
        .chain(sell_result.fills.iter())
        .filter(|f| f.side == BrokerSide::Sell)
        .map(|f| f.quantity as f64 * f.price_cents as f64 / 100.0)
        .sum();
    result.sell_proceeds = sell_proceeds;

    let buys_to_submit: Vec<BrokerOrder> = buy_orders
        .iter()
        .filter(|o| !already_filled(o, previously_observed_fills))
        .cloned()
        .collect();
    let scaled_buys = scale_buys_to_buying_power(
        adapter,
        &buys_to_submit,
        available_cash,
        max_leverage,
        sell_proceeds,
    );
    if scaled_buys.len() < buys_to_submit.len() {
        warn!(
            "buying power scaling dropped {} zero-quantity buy orders",
            buys_to_submit.len() - scaled_buys.len()
        );
    }

    let buy_result = run_group(adapter, &scaled_buys, opts.concurrency_cap, opts.batch_timeout)?;
    result.extend(BatchOutcome {
        submitted: buy_result.submitted,
        fills: buy_result.fills,
        canceled: buy_result.canceled,
        timed_out: buy_result.timed_out,
    });

    Ok(ExecOutcome::Executed(result))
}

/// Unused by `execute` itself but kept alongside it: the account values an
/// orchestration layer typically reads right before sizing `available_cash`
/// (kept here so callers don't need a second import for one field).
pub fn buying_power(account: &Account, max_leverage: f64) -> f64 {
    account.cash_cents as f64 / 100.0 * max_leverage
}
