//! JSONL audit trail logging.
//!
//! Each rebalancer run appends events to an audit.jsonl file,
//! one JSON object per line (following rebalancer_core's persistence pattern).

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::account::AccountSnapshot;
use crate::error::Result;
use crate::executor::ExecutionResult;
use crate::fx::FxPlan;
use crate::planner::OrderPlan;
use crate::risk::RiskReport;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log a run start event.
pub fn log_run_started(audit: &mut AuditLog, portfolios_file: &str, account_id: &str) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "portfolios_file": portfolios_file,
            "account": account_id,
        }),
    )
}

/// Convenience: log the reduced account snapshot.
pub fn log_positions(audit: &mut AuditLog, snapshot: &AccountSnapshot) -> Result<()> {
    let positions: Vec<_> = snapshot
        .market_values
        .iter()
        .map(|(symbol, &value)| {
            serde_json::json!({
                "symbol": symbol.as_str(),
                "market_value": value,
                "weight": snapshot.weight_of(&rebalancer_core::Key::Symbol(*symbol)),
            })
        })
        .collect();

    audit.log(
        "positions_fetched",
        serde_json::json!({
            "positions": positions,
            "usd_cash": snapshot.usd_cash,
            "effective_equity": snapshot.effective_equity,
            "gross": snapshot.gross,
            "net": snapshot.net,
        }),
    )
}

/// Convenience: log the planner's order batch and FX sizing decision.
pub fn log_plan(audit: &mut AuditLog, plan: &OrderPlan, fx_plan: &FxPlan) -> Result<()> {
    let orders: Vec<_> = plan
        .orders
        .iter()
        .map(|(symbol, &shares)| {
            serde_json::json!({
                "symbol": symbol.as_str(),
                "shares": shares,
            })
        })
        .collect();
    let dropped: Vec<_> = plan
        .dropped
        .iter()
        .map(|(symbol, reason)| {
            serde_json::json!({
                "symbol": symbol.as_str(),
                "reason": reason.to_string(),
            })
        })
        .collect();

    audit.log(
        "plan_computed",
        serde_json::json!({
            "orders": orders,
            "dropped": dropped,
            "fx_need_fx": fx_plan.need_fx,
            "fx_pair": fx_plan.pair,
            "fx_usd_notional": fx_plan.usd_notional,
            "fx_reason": fx_plan.reason,
        }),
    )
}

/// Convenience: log risk check results.
pub fn log_risk_check(audit: &mut AuditLog, report: &RiskReport) -> Result<()> {
    let check_data: Vec<_> = report
        .checks
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name,
                "status": format!("{}", c.status),
                "detail": c.detail,
            })
        })
        .collect();

    audit.log(
        "risk_check",
        serde_json::json!({
            "passed": !report.has_failures(),
            "checks": check_data,
        }),
    )
}

/// Convenience: log run completion, including every submission, fill,
/// cancellation, and timeout the executor observed.
pub fn log_run_completed(audit: &mut AuditLog, result: &ExecutionResult) -> Result<()> {
    let submitted: Vec<_> = result
        .submitted
        .iter()
        .map(|(symbol, side, quantity, id)| {
            serde_json::json!({
                "symbol": symbol.as_str(),
                "side": format!("{side:?}"),
                "quantity": quantity,
                "order_id": id.0,
            })
        })
        .collect();
    let fills: Vec<_> = result
        .fills
        .iter()
        .map(|f| {
            serde_json::json!({
                "symbol": f.symbol.as_str(),
                "side": format!("{:?}", f.side),
                "quantity": f.quantity,
                "price": f.price_cents as f64 / 100.0,
                "timestamp": f.timestamp,
            })
        })
        .collect();

    audit.log(
        "run_completed",
        serde_json::json!({
            "submitted": submitted,
            "fills": fills,
            "canceled": result.canceled.iter().map(|id| id.0).collect::<Vec<_>>(),
            "timed_out": result.timed_out.iter().map(|id| id.0).collect::<Vec<_>>(),
        }),
    )
}
