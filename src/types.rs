//! Core value types: ticker `Symbol` and fixed-point `Price`.

use std::fmt;

/// A stack-allocated ticker symbol, up to 8 ASCII bytes.
///
/// Tickers are small and bounded (NYSE/NASDAQ symbols rarely exceed 5
/// characters; IBKR contract symbols cap well below 8), so a `Copy` inline
/// representation avoids heap allocation and lets `Symbol` be used freely as
/// a `HashMap`/`FxHashMap` key across the rebalancing pipeline.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Symbol {
    bytes: [u8; 8],
    len: u8,
}

impl Symbol {
    /// Build a symbol from a string slice.
    ///
    /// # Panics
    ///
    /// Panics if `s` is longer than 8 bytes. Use [`Symbol::try_new`] at
    /// untrusted boundaries (config/target files).
    pub fn new(s: &str) -> Self {
        Self::try_new(s).unwrap_or_else(|| panic!("symbol '{s}' exceeds 8 bytes"))
    }

    /// Build a symbol, returning `None` if `s` is empty or longer than 8 bytes.
    pub fn try_new(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.is_empty() || b.len() > 8 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes[..b.len()].copy_from_slice(b);
        Some(Self {
            bytes,
            len: b.len() as u8,
        })
    }

    /// Build a symbol from a string slice, truncating to 8 bytes (non-panicking).
    ///
    /// Truncation happens on the byte boundary; a multi-byte UTF-8 character
    /// straddling the cut is dropped whole rather than split.
    pub fn from_str_truncated(s: &str) -> Self {
        let mut end = s.len().min(8);
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        let b = &s.as_bytes()[..end];
        let mut bytes = [0u8; 8];
        bytes[..b.len()].copy_from_slice(b);
        Self {
            bytes,
            len: b.len() as u8,
        }
    }

    /// View the symbol as a `&str`.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl std::str::FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::try_new(s).ok_or(SymbolError::TooLong)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Symbol::try_new(&s).ok_or(SymbolError::TooLong)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> String {
        s.as_str().to_string()
    }
}

/// Error constructing a [`Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol exceeds 8 bytes or is empty")]
    TooLong,
}

/// Price (or any dollar amount) in fixed-point cents.
///
/// `Price(10050)` represents $100.50. Fixed-point avoids the rounding drift
/// that floating point introduces in repeated additive price math; the
/// planner and FX engine, which work in fractional weights and basis
/// points, use `f64` instead and round explicitly at their boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Price(pub i64);

impl Price {
    pub const ZERO: Price = Price(0);

    /// Construct from a dollar-denominated float, rounding to the nearest cent.
    pub fn from_dollars(dollars: f64) -> Self {
        Price((dollars * 100.0).round() as i64)
    }

    /// Value in dollars.
    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.0 / 100;
        let cents = (self.0 % 100).abs();
        if self.0 < 0 {
            write!(f, "-${}.{:02}", dollars.abs(), cents)
        } else {
            write!(f, "${}.{:02}", dollars, cents)
        }
    }
}
