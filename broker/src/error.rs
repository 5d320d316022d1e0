//! Broker error types.
//!
//! Variants map onto the executor's translation table (`PacingError`,
//! `ResolutionError`, `ConnectionError`, generic) rather than the adapter's
//! own wire-level failure modes, so a caller can match on them without
//! knowing which concrete adapter produced them.

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("not connected")]
    NotConnected,

    #[error("unable to resolve contract for symbol: {0}")]
    Resolution(String),

    #[error("broker pacing limit exceeded")]
    Pacing,

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("timed out waiting for fills on order(s): {0:?}")]
    Timeout(Vec<u64>),

    #[error("{0}")]
    Other(String),
}
