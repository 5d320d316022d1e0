//! Broker Adapter contract and implementations.
//!
//! Provides the `Broker` trait the rebalancing engine's executor drives.
//! Implementations:
//!
//! - **Mock** (always available): a deterministic in-memory fake for tests
//!   and scenario replay.
//! - **IBKR** (feature `ibkr`): Interactive Brokers via TWS/Gateway.

pub mod error;
pub mod mock;
pub mod types;

#[cfg(feature = "ibkr")]
pub mod ibkr;

pub use error::BrokerError;
pub use types::*;

use std::time::Duration;

use rebalancer_core::{Quote as DomainQuote, Symbol};

/// The Broker Adapter contract required by the rebalancing engine.
///
/// Every pure CORE component is broker-agnostic; only the executor and CLI
/// glue code touch this trait. `resolve` lets an adapter reject unknown
/// symbols before any order referencing them is built.
pub trait Broker {
    /// Connect to the broker.
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Disconnect gracefully.
    fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Confirm a symbol is tradable, returning a resolution error otherwise.
    fn resolve(&self, symbol: &Symbol) -> Result<(), BrokerError>;

    /// Get all current positions.
    fn positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Get account summary (equity, buying power, etc.) in the base currency.
    fn account(&self) -> Result<Account, BrokerError>;

    /// Get the per-currency cash breakdown (base currency plus any funding
    /// currencies held).
    fn cash_balances(&self) -> Result<Vec<CashBalance>, BrokerError>;

    /// Submit an order. Returns the broker-assigned order id.
    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError>;

    /// Get status of a submitted order.
    fn order_status(&self, id: OrderId) -> Result<BrokerOrderStatus, BrokerError>;

    /// Cancel a pending order.
    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError>;

    /// Get current quote for a symbol (domain `Quote`, not the cents-based
    /// wire `Quote`, so it can be fed directly to the FX engine and pricer).
    fn quote(&self, symbol: &Symbol) -> Result<DomainQuote, BrokerError>;

    /// Block until every listed order id has a terminal outcome (filled or
    /// canceled) or `timeout` elapses, returning the fills observed. A
    /// timeout is not itself an error at this layer — the executor decides
    /// whether to cancel the remainder; implementations return whatever
    /// fills were observed up to the deadline via `Ok`, and the caller
    /// checks which ids are still outstanding.
    fn wait_for_fills(
        &self,
        order_ids: &[OrderId],
        timeout: Duration,
    ) -> Result<Vec<Fill>, BrokerError>;

    /// The adapter's append-only event log, read once at the end of a run
    /// for persistence. Implementations must keep entries in non-decreasing
    /// timestamp order.
    fn event_log(&self) -> Vec<BrokerEvent>;
}
