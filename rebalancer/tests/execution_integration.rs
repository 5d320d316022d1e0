//! End-to-end integration tests driving the full blend -> snapshot -> plan ->
//! price -> risk -> execute pipeline through the public `execution::run` API
//! against a `MockBroker`.

use std::io::Write;

use rebalancer::config::Config;
use rebalancer::executor::ExecOutcome;
use rebalancer::execution::{self, RunOptions};
use rebalancer_broker::mock::{FillMode, MockBroker};
use rebalancer_core::Symbol;

fn aaa() -> Symbol {
    Symbol::new("AAA")
}
fn bbb() -> Symbol {
    Symbol::new("BBB")
}

fn write_portfolio(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

fn base_config(audit_dir: &std::path::Path) -> Config {
    let toml = format!(
        r#"
[connection]
host = "127.0.0.1"
port = 4002
client_id = 100

[account]
id = "DU1"
type = "margin"

[execution]
order_interval_ms = 10
limit_offset_bps = 5
order_timeout_secs = 1
max_orders_per_run = 50
concurrency_cap = 0

[risk]
max_position_pct = 0.9
max_leverage = 1.5
min_trade_usd = 1.0
max_trade_usd = 1000000.0
allow_short = true
max_short_pct = 0.5

[cost]
commission_per_share = 0.0
commission_min = 0.0
slippage_bps = 0

[logging]
dir = "{}"
audit_file = "audit.jsonl"

[models]
smurf = 1.0
badass = 0.0
gltr = 0.0

[rebalance]
trigger_mode = "per_holding"
per_holding_band_bps = 500.0
portfolio_total_band_bps = 500.0
min_order_usd = 1.0
cash_buffer_pct = 0.0
maintenance_buffer_pct = 0.0
allow_fractional = false
allow_margin = true
max_leverage = 1.5
prefer_rth = false
order_type = "limit"

[fx]
enabled = false
base_currency = "USD"
funding_currencies = []
convert_mode = "just_in_time"
use_mid_for_planning = true
min_fx_order_usd = 1000.0
fx_buffer_bps = 20.0
order_type = "market"
limit_slippage_bps = 10.0
route = "IDEALPRO"
wait_for_fill_seconds = 0
prefer_market_hours = true
stale_quote_seconds = 60
market_holidays = []

[pricing]
price_source = "midpoint"
fallback_to_snapshot = true

[limits]
smart_limit = true
style = "spread_aware"
buy_offset_frac = 0.5
sell_offset_frac = 0.5
max_offset_bps = 100.0
wide_spread_bps = 50.0
escalate_action = "keep"
stale_quote_seconds = 30
use_ask_bid_cap = true

[safety]
paper_only = true
require_confirm = false
live_authorized = false
"#,
        audit_dir.display()
    );
    toml::from_str(&toml).unwrap()
}

/// (S1) Holdings already within band: no orders should be submitted.
#[test]
fn no_trade_within_band() {
    let audit_dir = tempfile::tempdir().unwrap();
    let config = base_config(audit_dir.path());
    let portfolio = write_portfolio(
        "portfolio,symbol,target_pct\n\
         SMURF,AAA,60\n\
         SMURF,BBB,40\n",
    );

    // 60/40 split at equal prices already matches the target; with a 500bps
    // band nothing should cross the drift threshold.
    let mut broker = MockBroker::builder()
        .with_resolvable(aaa())
        .with_resolvable(bbb())
        .with_position(aaa(), 600, 100_00)
        .with_position(bbb(), 400, 100_00)
        .with_quote(aaa(), 99.0, 101.0)
        .with_quote(bbb(), 99.0, 101.0)
        .with_account(100_000_00, 0)
        .with_cash("USD", 0)
        .build();

    let opts = RunOptions {
        portfolios_file: portfolio.path().to_path_buf(),
        dry_run: true,
        yes: true,
        live: false,
    };

    let outcome = execution::run(&config, &mut broker, &opts, chrono::Utc::now()).unwrap();
    match outcome {
        ExecOutcome::Planned(orders) => assert!(orders.is_empty()),
        ExecOutcome::Executed(_) => panic!("dry run must never execute"),
    }
}

/// (S2) Overweight AAA relative to target sells AAA and buys BBB.
#[test]
fn overweight_position_sells_down() {
    let audit_dir = tempfile::tempdir().unwrap();
    let config = base_config(audit_dir.path());
    let portfolio = write_portfolio(
        "portfolio,symbol,target_pct\n\
         SMURF,AAA,50\n\
         SMURF,BBB,50\n",
    );

    let mut broker = MockBroker::builder()
        .fill_mode(FillMode::ImmediateFull)
        .with_resolvable(aaa())
        .with_resolvable(bbb())
        .with_position(aaa(), 600, 100_00)
        .with_position(bbb(), 400, 100_00)
        .with_quote(aaa(), 99.0, 101.0)
        .with_quote(bbb(), 99.0, 101.0)
        .with_account(100_000_00, 0)
        .with_cash("USD", 0)
        .build();

    let opts = RunOptions {
        portfolios_file: portfolio.path().to_path_buf(),
        dry_run: false,
        yes: true,
        live: false,
    };

    let outcome = execution::run(&config, &mut broker, &opts, chrono::Utc::now()).unwrap();
    let ExecOutcome::Executed(result) = outcome else {
        panic!("expected a live execution");
    };
    let sold_aaa = result
        .submitted
        .iter()
        .any(|(s, side, _, _)| *s == aaa() && *side == rebalancer_broker::BrokerSide::Sell);
    assert!(sold_aaa, "expected AAA to be sold down toward the 50/50 target");
}

/// (S6) One sell fills, the other's limit sits far from the quote and times
/// out: the run still completes, reporting the unfilled order as canceled.
#[test]
fn partial_group_fill_cancels_remainder() {
    let audit_dir = tempfile::tempdir().unwrap();
    let config = base_config(audit_dir.path());
    let portfolio = write_portfolio("portfolio,symbol,target_pct\nSMURF,AAA,0\nSMURF,BBB,0\n");

    let mut broker = MockBroker::builder()
        .fill_mode(FillMode::NeverFills)
        .with_resolvable(aaa())
        .with_resolvable(bbb())
        .with_position(aaa(), 600, 100_00)
        .with_position(bbb(), 400, 100_00)
        .with_quote(aaa(), 99.0, 101.0)
        .with_quote(bbb(), 99.0, 101.0)
        .with_account(100_000_00, 0)
        .with_cash("USD", 0)
        .build();

    let opts = RunOptions {
        portfolios_file: portfolio.path().to_path_buf(),
        dry_run: false,
        yes: true,
        live: false,
    };

    let outcome = execution::run(&config, &mut broker, &opts, chrono::Utc::now()).unwrap();
    let ExecOutcome::Executed(result) = outcome else {
        panic!("expected a live execution");
    };
    assert!(!result.canceled.is_empty());
    assert!(result.fills.is_empty());
}

/// Running the same scenario with the same mock inputs twice submits the
/// same order set: the only state threaded between runs is the scenario's
/// own fixtures, never wall-clock or adapter-side memory.
#[test]
fn rerun_with_same_inputs_is_deterministic() {
    let audit_dir = tempfile::tempdir().unwrap();
    let config = base_config(audit_dir.path());
    let portfolio = write_portfolio(
        "portfolio,symbol,target_pct\n\
         SMURF,AAA,50\n\
         SMURF,BBB,50\n",
    );
    let now = chrono::Utc::now();

    let build_broker = || {
        MockBroker::builder()
            .with_resolvable(aaa())
            .with_resolvable(bbb())
            .with_position(aaa(), 600, 100_00)
            .with_position(bbb(), 400, 100_00)
            .with_quote(aaa(), 99.0, 101.0)
            .with_quote(bbb(), 99.0, 101.0)
            .with_account(100_000_00, 0)
            .with_cash("USD", 0)
            .build()
    };

    let opts = RunOptions {
        portfolios_file: portfolio.path().to_path_buf(),
        dry_run: true,
        yes: true,
        live: false,
    };

    let mut first_broker = build_broker();
    let first = execution::run(&config, &mut first_broker, &opts, now).unwrap();
    let mut second_broker = build_broker();
    let second = execution::run(&config, &mut second_broker, &opts, now).unwrap();

    let (ExecOutcome::Planned(a), ExecOutcome::Planned(b)) = (first, second) else {
        panic!("expected planned outcomes");
    };
    assert_eq!(a.len(), b.len());
}

/// The kill switch file blocks execution before any order reaches the
/// adapter, regardless of how favorable the plan is.
#[test]
fn kill_switch_blocks_before_submission() {
    let audit_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(audit_dir.path());
    let kill_switch = audit_dir.path().join("KILL");
    std::fs::write(&kill_switch, b"").unwrap();
    config.safety.kill_switch_file = Some(kill_switch.display().to_string());

    let portfolio = write_portfolio("portfolio,symbol,target_pct\nSMURF,AAA,100\n");
    let mut broker = MockBroker::builder()
        .with_resolvable(aaa())
        .with_quote(aaa(), 99.0, 101.0)
        .with_account(100_000_00, 100_000_00)
        .with_cash("USD", 100_000_00)
        .build();

    let opts = RunOptions {
        portfolios_file: portfolio.path().to_path_buf(),
        dry_run: false,
        yes: true,
        live: false,
    };

    let err = execution::run(&config, &mut broker, &opts, chrono::Utc::now()).unwrap_err();
    assert!(matches!(err, rebalancer::error::Error::Safety(_)));
    assert!(broker.submitted_orders().is_empty());
}

/// `status` works against a freshly connected adapter without needing a
/// model portfolio file at all.
#[test]
fn status_subcommand_round_trips_account() {
    let mut broker = MockBroker::builder().with_account(250_000_00, 50_000_00).build();
    let account = execution::check_status(&mut broker).unwrap();
    assert_eq!(account.equity_cents, 250_000_00);
    assert_eq!(account.cash_cents, 50_000_00);
}
