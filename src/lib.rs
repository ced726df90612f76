//! helix-tx - Trade execution core for a simulated crypto brokerage.
//!
//! Accepts buy/sell intents at the gateway, routes them through an async
//! dispatch queue to an exchange, and reconciles fills into portfolio,
//! transaction ledger, and credit balance.

pub mod adapter;
pub mod api;
pub mod core;
pub mod exchange;
pub mod ledger;
pub mod portfolio;
pub mod queue;
pub mod settlement;
pub mod storage;

// Re-exports
pub use core::{Config, Error, Result};
