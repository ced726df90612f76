//! Error handling - Hierarchical errors shared across the crate

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error hierarchy for the trade execution core
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing request fields, rejected at the boundary
    #[error("validation: {0}")]
    Validation(String),

    /// SELL or transfer exceeds current holdings
    #[error("insufficient holdings: have {have}, want {want}")]
    InsufficientHoldings { have: Decimal, want: Decimal },

    /// BUY exceeds credit balance, fee included
    #[error("insufficient credits: available {available}, required {required}")]
    InsufficientCredits {
        available: Decimal,
        required: Decimal,
    },

    /// Remote execution call failed or returned unusable data
    #[error("adapter: {0}")]
    Adapter(String),

    /// User no longer exists; fatal for the task, never retried
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Persistence failure
    #[error("storage: {0}")]
    Storage(String),

    /// Dispatch queue full or shut down
    #[error("queue: {0}")]
    Queue(String),

    /// Configuration errors
    #[error("config: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization errors
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
