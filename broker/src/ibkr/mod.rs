//! Interactive Brokers (IBKR) broker implementation.

pub mod client;
pub mod orders;

use chrono::Utc;
use rebalancer_core::{Quote as DomainQuote, Symbol};

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;
use client::IbkrClient;

/// Interactive Brokers broker, wrapping the TWS/Gateway blocking API.
pub struct IbkrBroker {
    host: String,
    port: u16,
    client_id: i32,
    client: Option<IbkrClient>,
}

impl IbkrBroker {
    /// Create a new IBKR broker handle (not yet connected).
    pub fn new(host: &str, port: u16, client_id: i32) -> Self {
        Self {
            host: host.to_string(),
            port,
            client_id,
            client: None,
        }
    }

    /// Get the underlying client (for advanced operations).
    /// Returns `None` if not connected.
    pub fn client(&self) -> Option<&IbkrClient> {
        self.client.as_ref()
    }

    fn require_client(&self) -> Result<&IbkrClient, BrokerError> {
        self.client.as_ref().ok_or(BrokerError::NotConnected)
    }
}

impl Broker for IbkrBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        let client = IbkrClient::connect(&self.host, self.port, self.client_id)?;
        self.client = Some(client);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client = None;
        Ok(())
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.require_client()?.positions()
    }

    fn account(&self) -> Result<Account, BrokerError> {
        self.require_client()?.account_summary()
    }

    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError> {
        let client = self.require_client()?;
        orders::submit_order(client.inner(), order)
    }

    fn order_status(&self, id: OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        let _client = self.require_client()?;
        // IBKR order status is tracked via the PlaceOrder subscription;
        // for now return a basic pending status. Full implementation requires
        // storing active order subscriptions.
        Ok(BrokerOrderStatus {
            id,
            status: OrderState::Submitted,
            filled_quantity: 0,
            remaining_quantity: 0,
            avg_fill_price_cents: 0,
        })
    }

    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError> {
        let client = self.require_client()?;
        orders::cancel_order(client.inner(), id.0 as i32);
        Ok(())
    }

    fn quote(&self, symbol: &Symbol) -> Result<DomainQuote, BrokerError> {
        let wire = self.require_client()?.quote(symbol)?;
        let cents_to_dollars = |c: i64| if c > 0 { Some(c as f64 / 100.0) } else { None };
        Ok(DomainQuote::new(
            *symbol,
            cents_to_dollars(wire.bid_cents),
            cents_to_dollars(wire.ask_cents),
            cents_to_dollars(wire.last_cents),
            Utc::now(),
        ))
    }

    fn cash_balances(&self) -> Result<Vec<CashBalance>, BrokerError> {
        // The blocking ibapi client surfaces cash only through
        // `account_summary`'s base-currency figures; per-currency breakdown
        // requires the streaming account-update API, not wired up here.
        Ok(Vec::new())
    }

    fn wait_for_fills(
        &self,
        _order_ids: &[OrderId],
        _timeout: std::time::Duration,
    ) -> Result<Vec<Fill>, BrokerError> {
        // Fill polling is implemented in `orders::execute_limit_order` for the
        // synchronous single-order path the rebalancer binary drives today;
        // a general multi-order wait needs the order-status subscription.
        Ok(Vec::new())
    }

    fn event_log(&self) -> Vec<BrokerEvent> {
        Vec::new()
    }

    fn resolve(&self, symbol: &Symbol) -> Result<(), BrokerError> {
        let contract = ibapi::contracts::Contract::stock(symbol.as_str()).build();
        self.require_client()?
            .inner()
            .contract_details(&contract)
            .map_err(|e| BrokerError::Resolution(format!("{symbol}: {e}")))?;
        Ok(())
    }
}
