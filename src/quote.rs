//! Market quote model: bid/ask/last with a timestamp, mid derivation, and
//! a staleness predicate.
//!
//! Every pure, time-sensitive component (FX engine, limit pricer) is handed
//! a `Quote` plus an explicit `now` rather than reading the system clock, so
//! the same inputs always produce the same output.

use chrono::{DateTime, Utc};

use crate::types::Symbol;

/// A market quote: up to three optional prices and the time they were observed.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quote {
    pub symbol: Symbol,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        symbol: Symbol,
        bid: Option<f64>,
        ask: Option<f64>,
        last: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            bid,
            ask,
            last,
            timestamp,
        }
    }

    /// `true` iff both sides are present and `ask >= bid`.
    pub fn is_two_sided(&self) -> bool {
        matches!((self.bid, self.ask), (Some(b), Some(a)) if a >= b)
    }

    /// Mid price with single-side fallback.
    ///
    /// Returns the arithmetic mean when both sides are present, falls back
    /// to whichever side is available, and returns `None` when both bid and
    /// ask are missing (callers treat this as "incomplete quote").
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }

    /// Spread in basis points of mid: `(ask - bid) / mid * 10_000`.
    pub fn spread_bps(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b > 0.0 && a > 0.0 => {
                let mid = (b + a) / 2.0;
                Some(crate::bps::from_fraction((a - b) / mid))
            }
            _ => None,
        }
    }

    /// `true` when this quote is older than `stale_after_seconds` as of `now`.
    pub fn is_stale(&self, stale_after_seconds: i64, now: DateTime<Utc>) -> bool {
        (now - self.timestamp).num_milliseconds() > stale_after_seconds * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }

    #[test]
    fn mid_both_sides() {
        let q = Quote::new(aapl(), Some(99.0), Some(101.0), Some(100.0), Utc::now());
        assert_eq!(q.mid(), Some(100.0));
    }

    #[test]
    fn mid_bid_only() {
        let q = Quote::new(aapl(), Some(99.0), None, None, Utc::now());
        assert_eq!(q.mid(), Some(99.0));
    }

    #[test]
    fn mid_ask_only() {
        let q = Quote::new(aapl(), None, Some(101.0), None, Utc::now());
        assert_eq!(q.mid(), Some(101.0));
    }

    #[test]
    fn mid_missing_both() {
        let q = Quote::new(aapl(), None, None, None, Utc::now());
        assert_eq!(q.mid(), None);
    }

    #[test]
    fn spread_bps_basic() {
        let q = Quote::new(aapl(), Some(99.0), Some(101.0), None, Utc::now());
        let bps = q.spread_bps().unwrap();
        assert!((bps - 200.0).abs() < 1e-6);
    }

    #[test]
    fn is_stale_true_past_threshold() {
        let now = Utc::now();
        let q = Quote::new(aapl(), Some(99.0), Some(101.0), None, now - Duration::seconds(20));
        assert!(q.is_stale(10, now));
    }

    #[test]
    fn is_stale_false_within_threshold() {
        let now = Utc::now();
        let q = Quote::new(aapl(), Some(99.0), Some(101.0), None, now - Duration::seconds(5));
        assert!(!q.is_stale(10, now));
    }

    #[test]
    fn is_two_sided() {
        let q = Quote::new(aapl(), Some(99.0), Some(101.0), None, Utc::now());
        assert!(q.is_two_sided());
        let inverted = Quote::new(aapl(), Some(101.0), Some(99.0), None, Utc::now());
        assert!(!inverted.is_two_sided());
    }
}
