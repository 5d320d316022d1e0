//! # rebalancer-core
//!
//! Shared primitives used across the rebalancing engine: a compact stack
//! symbol type, fixed-point price representation, and the live-market quote
//! model that every pure component (blender, planner, FX engine, limit
//! pricer) is threaded through.
//!
//! ## Quick Start
//!
//! ```
//! use rebalancer_core::{Symbol, Price};
//!
//! let aapl = Symbol::new("AAPL");
//! let price = Price(185_00); // $185.00
//! assert_eq!(aapl.as_str(), "AAPL");
//! assert_eq!(format!("{}", price), "$185.00");
//! ```
//!
//! ## Quotes and staleness
//!
//! ```
//! use rebalancer_core::{Quote, Symbol};
//! use chrono::Utc;
//!
//! let q = Quote::new(Symbol::new("AAPL"), Some(184.98), Some(185.02), Some(185.00), Utc::now());
//! assert_eq!(q.mid().unwrap(), 185.0);
//! assert!(!q.is_stale(10, Utc::now()));
//! ```

pub mod bps;
pub mod key;
pub mod quote;
pub mod types;

pub use key::Key;
pub use quote::Quote;
pub use types::{Price, Symbol};
