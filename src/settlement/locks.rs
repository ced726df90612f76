//! Per-key serialization for ledger writes.
//!
//! Two concurrently dequeued trades for the same (user, symbol) must not
//! interleave their read-modify-write steps, so each settlement run holds
//! the key's async mutex across its suspension points.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the mutex for a key. The caller holds the returned
    /// Arc for as long as it holds the guard.
    pub fn for_key(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Lock key for one (user, symbol) pair.
pub fn holding_key(user_id: &str, symbol: &crate::core::Symbol) -> String {
    format!("{}:{}", user_id, symbol)
}
