//! Shared broker types: positions, accounts, orders, fills, quotes.
//!
//! Prices here are fixed-point cents (`rebalancer_core::Price`) since these
//! are wire-level DTOs exchanged with a broker; the domain-level planner and
//! pricer work in `f64` fractions and basis points and convert at the
//! boundary (see `rebalancer::order_builder`).

use chrono::{DateTime, Utc};
use rebalancer_core::{Price, Symbol};

/// Broker-level position (the real-world counterpart, not a book position).
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: Symbol,
    /// Positive = long, negative = short.
    pub quantity: i64,
    pub avg_cost_cents: i64,
    pub market_value_cents: i64,
    pub unrealized_pnl_cents: i64,
}

/// Account summary from the broker, in the base currency.
#[derive(Debug, Clone)]
pub struct Account {
    pub equity_cents: i64,
    pub buying_power_cents: i64,
    pub cash_cents: i64,
    pub gross_position_value_cents: i64,
}

/// Cash balance in a single currency, distinct from the base-currency
/// `Account::cash_cents` summary. The rebalancer's account state reducer
/// consumes a per-currency breakdown to size FX conversions.
#[derive(Debug, Clone, Copy)]
pub struct CashBalance {
    pub currency: [u8; 3],
    pub amount_cents: i64,
}

impl CashBalance {
    pub fn currency_str(&self) -> &str {
        std::str::from_utf8(&self.currency).unwrap_or("???")
    }
}

/// Order to submit to a broker.
#[derive(Debug, Clone)]
pub struct BrokerOrder {
    pub symbol: Symbol,
    pub side: BrokerSide,
    pub quantity: u64,
    pub order_type: BrokerOrderType,
    pub tif: TimeInForce,
    pub route: Route,
    pub rth_only: bool,
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerSide {
    Buy,
    Sell,
}

/// Market or limit order.
#[derive(Debug, Clone, Copy)]
pub enum BrokerOrderType {
    Market,
    Limit(Price),
}

/// Time-in-force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeInForce {
    #[default]
    Day,
    GoodTillCancel,
    ImmediateOrCancel,
}

/// Execution venue/route. `Smart` covers ordinary equity routing; `Idealpro`
/// is IBKR's FX venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Smart,
    Idealpro,
}

/// Live quote from the broker.
#[derive(Debug, Clone)]
pub struct Quote {
    pub symbol: Symbol,
    pub bid_cents: i64,
    pub ask_cents: i64,
    pub last_cents: i64,
    pub volume: u64,
}

/// Opaque order ID returned by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId(pub u64);

/// Status of a submitted order.
#[derive(Debug, Clone)]
pub struct BrokerOrderStatus {
    pub id: OrderId,
    pub status: OrderState,
    pub filled_quantity: u64,
    pub remaining_quantity: u64,
    pub avg_fill_price_cents: i64,
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// A fill reported by the broker: quantity is always positive, side carries
/// the direction.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: BrokerSide,
    pub quantity: u64,
    pub price_cents: i64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    pub fn notional_cents(&self) -> i64 {
        self.quantity as i64 * self.price_cents
    }
}

/// One entry in the broker adapter's event log, persisted at the end of a
/// run for audit purposes. Timestamps are strictly monotone within a run.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    Placed {
        order_id: OrderId,
        symbol: Symbol,
        side: BrokerSide,
        quantity: u64,
        ts: DateTime<Utc>,
    },
    Filled {
        fill: Fill,
    },
    Cancelled {
        order_id: OrderId,
        ts: DateTime<Utc>,
    },
}

impl BrokerEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BrokerEvent::Placed { ts, .. } => *ts,
            BrokerEvent::Filled { fill } => fill.timestamp,
            BrokerEvent::Cancelled { ts, .. } => *ts,
        }
    }
}
