//! Storage seam - the document store behind the ledger.
//!
//! The pipeline only assumes per-document atomicity for each operation
//! here; cross-document consistency is the settlement saga's job.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{
    CreditsHistory, Order, Portfolio, Result, Symbol, Transaction, Transfer, User,
};

pub use memory::MemoryStore;

/// Async document-store operations used by the execution core.
#[async_trait]
pub trait Storage: Send + Sync {
    // Users
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn save_user(&self, user: &User) -> Result<()>;

    // Portfolios, keyed by (user, symbol)
    async fn find_portfolio(&self, user_id: &str, symbol: &Symbol) -> Result<Option<Portfolio>>;
    async fn upsert_portfolio(&self, row: &Portfolio) -> Result<()>;
    async fn delete_portfolio(&self, user_id: &str, symbol: &Symbol) -> Result<()>;

    // Orders
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn update_order(&self, order: &Order) -> Result<()>;
    /// Orders still New that carry a remote id, i.e. resting on the book.
    async fn find_resting_orders(&self) -> Result<Vec<Order>>;

    // Transactions
    async fn insert_transaction(&self, txn: &Transaction) -> Result<()>;
    /// Compensation path only; transactions are otherwise immutable.
    async fn delete_transaction(&self, id: Uuid) -> Result<()>;

    // Credits history
    async fn insert_credits_history(&self, entry: &CreditsHistory) -> Result<()>;

    // Transfers
    async fn insert_transfer(&self, transfer: &Transfer) -> Result<()>;

    /// Check-and-set an intent id. Returns false if the intent was
    /// already claimed, which marks a duplicate queue delivery.
    async fn claim_intent(&self, intent_id: Uuid) -> Result<bool>;
}
