//! Run orchestration: the only place that wires configuration, model
//! portfolios, a live [`Broker`] adapter, and every pure CORE component
//! (blend, snapshot, plan, price, build, execute, reconcile) into the
//! `run`/`positions`/`status`/`reconcile` flows the CLI exposes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;
use rustc_hash::FxHashMap;

use rebalancer_broker::types::{BrokerSide, TimeInForce};
use rebalancer_broker::Broker;
use rebalancer_core::Symbol;

use crate::account::{self, AccountSnapshot};
use crate::audit::{self, AuditLog};
use crate::blender::{self, BlendResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{self, ExecOutcome, SafetyGate};
use crate::models;
use crate::order_builder;
use crate::pricer;
use crate::reconcile::{self, ReconcileReport};
use crate::risk;

/// Options collected from the CLI for a `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub portfolios_file: PathBuf,
    /// `--dry-run`/`--report-only`: plan and price but never submit.
    pub dry_run: bool,
    /// `--yes`: bypass the interactive confirmation prompt.
    pub yes: bool,
    /// `--live`: explicit authorization to trade outside paper mode.
    pub live: bool,
}

fn translate(e: rebalancer_broker::BrokerError) -> Error {
    executor::translate_broker_error(e)
}

/// Prompt the operator to confirm the plan before anything is submitted.
/// Always returns `true` when `opts.yes` is set, without prompting.
fn confirm(opts: &RunOptions, plan_summary: &str) -> Result<bool> {
    if opts.yes {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(format!("{plan_summary}\nProceed?"))
        .default(false)
        .interact()
        .map_err(|e| Error::Runtime(format!("confirmation prompt failed: {e}")))
}

/// Resolve every target and currently-held symbol the run will need a quote
/// for, then fetch their mid prices from the adapter (in cents).
fn fetch_prices(
    adapter: &dyn Broker,
    symbols: impl Iterator<Item = Symbol>,
) -> Result<FxHashMap<Symbol, i64>> {
    let mut prices = FxHashMap::default();
    for symbol in symbols {
        if prices.contains_key(&symbol) {
            continue;
        }
        let quote = adapter.quote(&symbol).map_err(translate)?;
        let mid = quote
            .mid()
            .ok_or_else(|| Error::Runtime(format!("no usable quote for {symbol}")))?;
        prices.insert(symbol, (mid * 100.0).round() as i64);
    }
    Ok(prices)
}

/// Build the normalized [`AccountSnapshot`] from live adapter state.
fn fetch_snapshot(
    config: &Config,
    adapter: &dyn Broker,
    prices: &FxHashMap<Symbol, i64>,
) -> Result<AccountSnapshot> {
    let positions = adapter.positions().map_err(translate)?;
    let account = adapter.account().map_err(translate)?;
    let cash_balances = adapter.cash_balances().map_err(translate)?;

    let raw_positions = account::from_broker_positions(&positions, prices)?;

    let usd_cash = cash_balances
        .iter()
        .find(|c| c.currency_str() == "USD")
        .map(|c| c.amount_cents as f64 / 100.0)
        .unwrap_or(account.cash_cents as f64 / 100.0);
    let funding_cash: Vec<([u8; 3], f64)> = cash_balances
        .iter()
        .filter(|c| c.currency_str() != "USD")
        .map(|c| (c.currency, c.amount_cents as f64 / 100.0))
        .collect();

    account::snapshot(
        &raw_positions,
        usd_cash,
        &funding_cash,
        config.rebalance.cash_buffer_fraction(),
    )
}

/// Load the blended target allocation from the model-portfolio file.
fn load_target(config: &Config, portfolios_file: &std::path::Path) -> Result<BlendResult> {
    let portfolios = models::load_model_portfolios(portfolios_file)?;
    let mix = config.models.to_mix()?;
    blender::blend(&portfolios, mix)
}

/// Run the full blend -> snapshot -> plan -> price -> risk -> execute ->
/// reconcile pipeline against a live (or paper) adapter.
pub fn run(
    config: &Config,
    adapter: &mut dyn Broker,
    opts: &RunOptions,
    now: DateTime<Utc>,
) -> Result<ExecOutcome> {
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(
        &mut audit,
        &opts.portfolios_file.display().to_string(),
        &config.account.id,
    )?;

    adapter.connect().map_err(translate)?;

    let target = load_target(config, &opts.portfolios_file)?;
    for (symbol, _) in target.symbol_weights() {
        adapter.resolve(&symbol).map_err(translate)?;
    }

    let positions = adapter.positions().map_err(translate)?;
    let symbols_needed = positions
        .iter()
        .map(|p| p.symbol)
        .chain(target.symbol_weights().map(|(s, _)| s));
    let prices = fetch_prices(&*adapter, symbols_needed)?;

    let snapshot = fetch_snapshot(config, &*adapter, &prices)?;
    audit::log_positions(&mut audit, &snapshot)?;

    let dollar_prices: BTreeMap<Symbol, f64> =
        prices.iter().map(|(&s, &c)| (s, c as f64 / 100.0)).collect();
    let planner_opts = config.rebalance.to_planner_opts();
    let fx_cfg = config.fx.to_fx_config()?;

    let funding_currency = fx_cfg.funding_currencies.first().cloned().unwrap_or_default();
    let funding_cash_amount = snapshot
        .funding_cash
        .iter()
        .find(|(cur, _)| std::str::from_utf8(cur.as_slice()).unwrap_or("") == funding_currency)
        .map(|(_, &amt)| amt)
        .unwrap_or(0.0);

    let fx_quote = if fx_cfg.enabled && !funding_currency.is_empty() {
        let pair = Symbol::new(&format!("USD{funding_currency}"));
        adapter.quote(&pair).ok()
    } else {
        None
    };
    let fx_price = fx_quote.as_ref().and_then(|q| q.mid());

    let (plan, fx_plan) = crate::planner::plan_with_fx(
        &target.weights,
        &snapshot.weights,
        &dollar_prices,
        snapshot.effective_equity,
        &planner_opts,
        &fx_cfg,
        funding_cash_amount,
        &funding_currency,
        fx_quote,
        fx_price,
        now,
    )?;
    audit::log_plan(&mut audit, &plan, &fx_plan)?;

    let current_qty: FxHashMap<Symbol, i64> = positions.iter().map(|p| (p.symbol, p.quantity)).collect();
    let target_weights: Vec<(Symbol, f64)> = target.symbol_weights().collect();
    let equity_cents = (snapshot.effective_equity * 100.0).round() as i64;
    let prices_btree: BTreeMap<Symbol, i64> = prices.iter().map(|(&s, &c)| (s, c)).collect();
    let risk_report = risk::check_risk(
        &plan,
        equity_cents,
        &target_weights,
        &prices_btree,
        &current_qty,
        &config.risk,
    );
    audit::log_risk_check(&mut audit, &risk_report)?;
    if risk_report.has_failures() {
        return Err(Error::Safety(format!(
            "risk checks failed, aborting before submission:\n{risk_report}"
        )));
    }

    let limits_cfg = config.limits.to_limits_config();
    let mut priced: BTreeMap<Symbol, (Option<f64>, pricer::OrderType)> = BTreeMap::new();
    for &symbol in plan.orders.keys() {
        let shares = plan.orders[&symbol];
        let side = if shares > 0 { pricer::Side::Buy } else { pricer::Side::Sell };
        let quote = adapter.quote(&symbol).map_err(translate)?;
        let (price, order_type) = pricer::price_limit(side, &quote, 0.01, &limits_cfg, now)?;
        priced.insert(symbol, (price, order_type));
    }

    let priced_orders = order_builder::build_equity_orders(
        &plan.orders,
        &priced,
        config.rebalance.prefer_rth,
        TimeInForce::Day,
    );
    let sell_orders: Vec<_> = priced_orders
        .iter()
        .filter(|o| o.broker_order.side == BrokerSide::Sell)
        .map(|o| o.broker_order.clone())
        .collect();
    let buy_orders: Vec<_> = priced_orders
        .iter()
        .filter(|o| o.broker_order.side == BrokerSide::Buy)
        .map(|o| o.broker_order.clone())
        .collect();
    let fx_orders: Vec<_> = order_builder::build_fx_order(&fx_plan, TimeInForce::ImmediateOrCancel)
        .into_iter()
        .collect();

    let summary = format!(
        "{} equity order(s), {} FX order(s), {} dropped",
        sell_orders.len() + buy_orders.len(),
        fx_orders.len(),
        plan.dropped.len()
    );
    let confirmed = confirm(opts, &summary)?;

    let safety = SafetyGate {
        live_authorized: config.safety.live_authorized || opts.live,
        ..config.safety.to_safety_gate(config.rebalance.prefer_rth, confirmed)
    };
    let exec_opts = executor::ExecOpts {
        safety,
        report_only: opts.dry_run,
        concurrency_cap: config.execution.concurrency_cap,
        batch_timeout: Duration::from_secs(config.execution.order_timeout_secs),
    };

    // The planner already sized `buy_orders` against post-FX cash (its final
    // pass adds `fx_plan.usd_notional / total_equity` to CASH before
    // replanning); hand the executor that same post-FX figure so it doesn't
    // re-constrain buys the planner already fit to the FX-topped-up balance.
    let post_fx_usd_cash = snapshot.usd_cash
        + if fx_plan.need_fx {
            fx_plan.usd_notional
        } else {
            0.0
        };

    info!("submitting rebalance: {summary}");
    let outcome = executor::execute(
        &*adapter,
        &fx_orders,
        &sell_orders,
        &buy_orders,
        Some(&fx_plan),
        &exec_opts,
        Some(post_fx_usd_cash),
        planner_opts.max_leverage,
        now,
        &[],
    )?;

    if let ExecOutcome::Executed(ref result) = outcome {
        audit::log_run_completed(&mut audit, result)?;
    }

    adapter.disconnect().map_err(translate)?;
    Ok(outcome)
}

/// `positions` subcommand: connect, fetch, snapshot, disconnect.
pub fn show_positions(config: &Config, adapter: &mut dyn Broker) -> Result<AccountSnapshot> {
    adapter.connect().map_err(translate)?;
    let positions = adapter.positions().map_err(translate)?;
    let prices = fetch_prices(&*adapter, positions.iter().map(|p| p.symbol))?;
    let snapshot = fetch_snapshot(config, &*adapter, &prices)?;
    adapter.disconnect().map_err(translate)?;
    Ok(snapshot)
}

/// `status` subcommand: confirm connectivity and report the account summary
/// without touching the model portfolios or planner.
pub fn check_status(adapter: &mut dyn Broker) -> Result<rebalancer_broker::Account> {
    adapter.connect().map_err(translate)?;
    let account = adapter.account().map_err(translate)?;
    adapter.disconnect().map_err(translate)?;
    Ok(account)
}

/// `reconcile` subcommand: compare current holdings against the blended
/// target without planning or submitting anything.
pub fn run_reconcile(
    config: &Config,
    adapter: &mut dyn Broker,
    portfolios_file: &std::path::Path,
) -> Result<ReconcileReport> {
    adapter.connect().map_err(translate)?;
    let target = load_target(config, portfolios_file)?;
    let positions = adapter.positions().map_err(translate)?;
    let symbols_needed = positions
        .iter()
        .map(|p| p.symbol)
        .chain(target.symbol_weights().map(|(s, _)| s));
    let prices = fetch_prices(&*adapter, symbols_needed)?;
    let snapshot = fetch_snapshot(config, &*adapter, &prices)?;
    adapter.disconnect().map_err(translate)?;

    let dollar_prices: BTreeMap<Symbol, f64> =
        prices.iter().map(|(&s, &c)| (s, c as f64 / 100.0)).collect();
    Ok(reconcile::reconcile(&snapshot, &target, &dollar_prices))
}
