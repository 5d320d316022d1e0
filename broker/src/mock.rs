//! Deterministic in-memory broker fake — implements the `Broker` trait with
//! configurable, non-random fill behavior.
//!
//! Used in tests and scenario replay so a run's outcome depends only on its
//! declared inputs, never on wall-clock timing or network state. Grounded in
//! the reference implementation's `FakeQuoteProvider`/in-memory IB stub: a
//! quote table keyed by symbol, resolvable symbols declared up front, and
//! fills produced synchronously according to a configured `FillMode`.
//!
//! ```ignore
//! use rebalancer_broker::mock::{MockBroker, FillMode};
//! use rebalancer_core::Symbol;
//!
//! let broker = MockBroker::builder()
//!     .fill_mode(FillMode::ImmediateFull)
//!     .with_position(Symbol::new("AAPL"), 100, 150_00)
//!     .with_account(1_000_000_00, 500_000_00)
//!     .build();
//! ```

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rebalancer_core::{Quote as DomainQuote, Symbol};

use crate::error::BrokerError;
use crate::types::*;
use crate::Broker;

/// How the mock broker handles submitted orders.
#[derive(Clone, Debug)]
pub enum FillMode {
    /// Orders are immediately fully filled at the limit price (or mid for market).
    ImmediateFull,
    /// Orders are partially filled (the given fraction, e.g., 0.5 = 50%).
    ImmediatePartial(f64),
    /// Orders never fill; `wait_for_fills` always times out on them.
    NeverFills,
    /// All orders are rejected at submission time.
    Reject,
}

/// A recorded order submission for assertion in tests.
#[derive(Clone, Debug)]
pub struct RecordedOrder {
    pub symbol: Symbol,
    pub side: BrokerSide,
    pub quantity: u64,
    pub order_type: String,
}

struct PendingOrder {
    id: OrderId,
    symbol: Symbol,
    side: BrokerSide,
    quantity: u64,
    price_cents: i64,
    canceled: bool,
}

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    fill_mode: FillMode,
    positions: Vec<Position>,
    quotes: Vec<(Symbol, DomainQuote)>,
    resolvable: Vec<Symbol>,
    cash_balances: Vec<CashBalance>,
    equity_cents: i64,
    cash_cents: i64,
}

impl MockBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    pub fn with_position(mut self, symbol: Symbol, quantity: i64, avg_cost_cents: i64) -> Self {
        let market_value = quantity * avg_cost_cents;
        self.resolvable.push(symbol);
        self.positions.push(Position {
            symbol,
            quantity,
            avg_cost_cents,
            market_value_cents: market_value,
            unrealized_pnl_cents: 0,
        });
        self
    }

    /// Register a quote in dollars (bid/ask), timestamped `now`.
    pub fn with_quote(mut self, symbol: Symbol, bid: f64, ask: f64) -> Self {
        self.resolvable.push(symbol);
        self.quotes.push((
            symbol,
            DomainQuote::new(symbol, Some(bid), Some(ask), Some((bid + ask) / 2.0), Utc::now()),
        ));
        self
    }

    /// Register a fully-specified domain quote (useful for staleness tests).
    pub fn with_domain_quote(mut self, quote: DomainQuote) -> Self {
        self.resolvable.push(quote.symbol);
        self.quotes.push((quote.symbol, quote));
        self
    }

    pub fn with_cash(mut self, currency: &str, amount_cents: i64) -> Self {
        let mut bytes = [0u8; 3];
        let src = currency.as_bytes();
        let n = src.len().min(3);
        bytes[..n].copy_from_slice(&src[..n]);
        self.cash_balances.push(CashBalance {
            currency: bytes,
            amount_cents,
        });
        self
    }

    pub fn with_account(mut self, equity_cents: i64, cash_cents: i64) -> Self {
        self.equity_cents = equity_cents;
        self.cash_cents = cash_cents;
        self
    }

    /// Declare a symbol tradable without attaching a position or quote.
    pub fn with_resolvable(mut self, symbol: Symbol) -> Self {
        self.resolvable.push(symbol);
        self
    }

    pub fn build(self) -> MockBroker {
        MockBroker {
            connected: false,
            fill_mode: self.fill_mode,
            positions: self.positions,
            quotes: self.quotes,
            resolvable: self.resolvable,
            cash_balances: self.cash_balances,
            equity_cents: self.equity_cents,
            cash_cents: self.cash_cents,
            next_order_id: Mutex::new(1),
            submitted_orders: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }
}

/// A deterministic broker fake that records submissions and returns
/// configurable, non-random responses.
pub struct MockBroker {
    connected: bool,
    fill_mode: FillMode,
    positions: Vec<Position>,
    quotes: Vec<(Symbol, DomainQuote)>,
    resolvable: Vec<Symbol>,
    cash_balances: Vec<CashBalance>,
    equity_cents: i64,
    cash_cents: i64,
    next_order_id: Mutex<u64>,
    submitted_orders: Mutex<Vec<RecordedOrder>>,
    pending: Mutex<Vec<PendingOrder>>,
    fills: Mutex<Vec<Fill>>,
    events: Mutex<Vec<BrokerEvent>>,
}

impl MockBroker {
    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder {
            fill_mode: FillMode::ImmediateFull,
            positions: Vec::new(),
            quotes: Vec::new(),
            resolvable: Vec::new(),
            cash_balances: Vec::new(),
            equity_cents: 1_000_000_00,
            cash_cents: 1_000_000_00,
        }
    }

    /// Get all orders that were submitted (for assertion in tests).
    pub fn submitted_orders(&self) -> Vec<RecordedOrder> {
        self.submitted_orders.lock().unwrap().clone()
    }

    fn limit_price_cents(order: &BrokerOrder, fallback_mid_cents: i64) -> i64 {
        match order.order_type {
            BrokerOrderType::Limit(p) => p.0,
            BrokerOrderType::Market => fallback_mid_cents,
        }
    }
}

impl Broker for MockBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }

    fn resolve(&self, symbol: &Symbol) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if self.resolvable.iter().any(|s| s == symbol) {
            Ok(())
        } else {
            Err(BrokerError::Resolution(symbol.as_str().to_string()))
        }
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        Ok(self.positions.clone())
    }

    fn account(&self) -> Result<Account, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        let gross = self
            .positions
            .iter()
            .map(|p| p.market_value_cents.abs())
            .sum();
        Ok(Account {
            equity_cents: self.equity_cents,
            buying_power_cents: self.cash_cents,
            cash_cents: self.cash_cents,
            gross_position_value_cents: gross,
        })
    }

    fn cash_balances(&self) -> Result<Vec<CashBalance>, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        Ok(self.cash_balances.clone())
    }

    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        self.submitted_orders.lock().unwrap().push(RecordedOrder {
            symbol: order.symbol,
            side: order.side,
            quantity: order.quantity,
            order_type: format!("{:?}", order.order_type),
        });

        if matches!(self.fill_mode, FillMode::Reject) {
            return Err(BrokerError::Order("mock: order rejected".into()));
        }

        let mut next_id = self.next_order_id.lock().unwrap();
        let id = OrderId(*next_id);
        *next_id += 1;
        drop(next_id);

        let mid_cents = self
            .quotes
            .iter()
            .find(|(s, _)| *s == order.symbol)
            .and_then(|(_, q)| q.mid())
            .map(|m| (m * 100.0).round() as i64)
            .unwrap_or(0);
        let price_cents = Self::limit_price_cents(order, mid_cents);

        let now = Utc::now();
        self.events.lock().unwrap().push(BrokerEvent::Placed {
            order_id: id,
            symbol: order.symbol,
            side: order.side,
            quantity: order.quantity,
            ts: now,
        });

        self.pending.lock().unwrap().push(PendingOrder {
            id,
            symbol: order.symbol,
            side: order.side,
            quantity: order.quantity,
            price_cents,
            canceled: false,
        });

        Ok(id)
    }

    fn order_status(&self, id: OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        let (status, filled, remaining) = match &self.fill_mode {
            FillMode::ImmediateFull => (OrderState::Filled, 100, 0),
            FillMode::ImmediatePartial(frac) => {
                let filled = (100.0 * frac) as u64;
                (OrderState::PartiallyFilled, filled, 100 - filled)
            }
            FillMode::NeverFills => (OrderState::Submitted, 0, 100),
            FillMode::Reject => (OrderState::Rejected, 0, 0),
        };
        Ok(BrokerOrderStatus {
            id,
            status,
            filled_quantity: filled,
            remaining_quantity: remaining,
            avg_fill_price_cents: 0,
        })
    }

    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if let Some(p) = self.pending.lock().unwrap().iter_mut().find(|p| p.id == id) {
            p.canceled = true;
        }
        self.events.lock().unwrap().push(BrokerEvent::Cancelled {
            order_id: id,
            ts: Utc::now(),
        });
        Ok(())
    }

    fn quote(&self, symbol: &Symbol) -> Result<DomainQuote, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        self.quotes
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, q)| *q)
            .ok_or_else(|| BrokerError::Resolution(symbol.as_str().to_string()))
    }

    fn wait_for_fills(
        &self,
        order_ids: &[OrderId],
        _timeout: Duration,
    ) -> Result<Vec<Fill>, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        let mut produced = Vec::new();
        let mut pending = self.pending.lock().unwrap();

        for id in order_ids {
            let Some(p) = pending.iter().find(|p| p.id == *id && !p.canceled) else {
                continue;
            };

            let fill_qty = match &self.fill_mode {
                FillMode::ImmediateFull => p.quantity,
                FillMode::ImmediatePartial(frac) => ((p.quantity as f64) * frac).floor() as u64,
                FillMode::NeverFills | FillMode::Reject => 0,
            };

            if fill_qty == 0 {
                continue;
            }

            let fill = Fill {
                order_id: p.id,
                symbol: p.symbol,
                side: p.side,
                quantity: fill_qty,
                price_cents: p.price_cents,
                timestamp: Utc::now(),
            };
            produced.push(fill);
        }

        for fill in &produced {
            self.fills.lock().unwrap().push(*fill);
            self.events
                .lock()
                .unwrap()
                .push(BrokerEvent::Filled { fill: *fill });
        }

        // Fully-filled orders leave the pending set; partial fills remain so
        // a second wait (after a retry) does not double-count them.
        pending.retain(|p| {
            !produced
                .iter()
                .any(|f| f.order_id == p.id && f.quantity == p.quantity)
        });

        Ok(produced)
    }

    fn event_log(&self) -> Vec<BrokerEvent> {
        self.events.lock().unwrap().clone()
    }
}
