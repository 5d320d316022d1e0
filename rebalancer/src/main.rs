//! CLI entry point: blend model portfolios, plan, price, and execute a
//! rebalance against a `Broker` adapter (paper `MockBroker` by default,
//! live IBKR with `--live`).

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use rebalancer::config::Config;
use rebalancer::execution::{self, RunOptions};
use rebalancer_broker::mock::MockBroker;
use rebalancer_broker::Broker;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Multi-portfolio, multi-currency rebalancing engine")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Connect to the live IBKR adapter instead of the paper mock broker.
    #[arg(long, global = true)]
    live: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Blend, plan, price, and execute a rebalance
    Run {
        /// Path to the `portfolio,symbol,target_pct` model-portfolio file
        portfolios: PathBuf,

        /// Plan and price but never submit orders
        #[arg(long)]
        dry_run: bool,

        /// Skip the interactive confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show current account positions and weights
    Positions,

    /// Check broker connectivity and report the account summary
    Status,

    /// Compare current holdings against the blended target
    Reconcile {
        /// Path to the `portfolio,symbol,target_pct` model-portfolio file
        portfolios: PathBuf,
    },
}

fn build_adapter(config: &Config, live: bool) -> Box<dyn Broker> {
    if live {
        Box::new(rebalancer_broker::ibkr::IbkrBroker::new(
            &config.connection.host,
            config.connection.port,
            config.connection.client_id,
        ))
    } else {
        Box::new(MockBroker::builder().build())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let mut adapter = build_adapter(&config, cli.live);

    let result = match cli.command {
        Command::Run {
            portfolios,
            dry_run,
            yes,
        } => {
            let opts = RunOptions {
                portfolios_file: portfolios,
                dry_run,
                yes,
                live: cli.live,
            };
            execution::run(&config, adapter.as_mut(), &opts, chrono::Utc::now()).map(|outcome| {
                println!("{outcome:?}");
            })
        }
        Command::Positions => execution::show_positions(&config, adapter.as_mut()).map(|snapshot| {
            for (symbol, value) in &snapshot.market_values {
                println!("{symbol}\t{value:.2}");
            }
            println!("cash\t{:.2}", snapshot.usd_cash);
        }),
        Command::Status => execution::check_status(adapter.as_mut()).map(|account| {
            println!(
                "equity={:.2} buying_power={:.2} cash={:.2}",
                account.equity_cents as f64 / 100.0,
                account.buying_power_cents as f64 / 100.0,
                account.cash_cents as f64 / 100.0,
            );
        }),
        Command::Reconcile { portfolios } => {
            execution::run_reconcile(&config, adapter.as_mut(), &portfolios).map(|report| {
                println!("{report}");
            })
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", e.kind_name());
        process::exit(e.exit_code() as i32);
    }
}
