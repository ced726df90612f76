//! In-memory document store - backs paper mode and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::core::{
    CreditsHistory, Order, OrderStatus, Portfolio, Result, Symbol, Transaction, Transfer, User,
};
use crate::storage::Storage;

/// HashMap-per-collection store. Each method takes one lock for the
/// duration of one document operation, mirroring the per-document
/// atomicity the real store provides.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    portfolios: RwLock<HashMap<(String, Symbol), Portfolio>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    credits_history: RwLock<Vec<CreditsHistory>>,
    transfers: RwLock<Vec<Transfer>>,
    claimed_intents: RwLock<HashSet<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/diagnostic helpers below; the trait is the real surface.
    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.orders.read().get(&id).cloned()
    }

    pub fn transactions_for(&self, user_id: &str) -> Vec<Transaction> {
        self.transactions
            .read()
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn credits_history_for(&self, user_id: &str) -> Vec<CreditsHistory> {
        self.credits_history
            .read()
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn transfers_for(&self, user_id: &str) -> Vec<Transfer> {
        self.transfers
            .read()
            .iter()
            .filter(|t| t.from_user == user_id || t.to_user == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        self.users.write().insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_portfolio(&self, user_id: &str, symbol: &Symbol) -> Result<Option<Portfolio>> {
        Ok(self
            .portfolios
            .read()
            .get(&(user_id.to_string(), symbol.clone()))
            .cloned())
    }

    async fn upsert_portfolio(&self, row: &Portfolio) -> Result<()> {
        self.portfolios
            .write()
            .insert((row.user_id.clone(), row.symbol.clone()), row.clone());
        Ok(())
    }

    async fn delete_portfolio(&self, user_id: &str, symbol: &Symbol) -> Result<()> {
        self.portfolios
            .write()
            .remove(&(user_id.to_string(), symbol.clone()));
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.orders.write().insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.orders.write().insert(order.id, order.clone());
        Ok(())
    }

    async fn find_resting_orders(&self) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .values()
            .filter(|o| o.status == OrderStatus::New && o.remote_order_id.is_some())
            .cloned()
            .collect())
    }

    async fn insert_transaction(&self, txn: &Transaction) -> Result<()> {
        self.transactions.write().insert(txn.id, txn.clone());
        Ok(())
    }

    async fn delete_transaction(&self, id: Uuid) -> Result<()> {
        self.transactions.write().remove(&id);
        Ok(())
    }

    async fn insert_credits_history(&self, entry: &CreditsHistory) -> Result<()> {
        self.credits_history.write().push(entry.clone());
        Ok(())
    }

    async fn insert_transfer(&self, transfer: &Transfer) -> Result<()> {
        self.transfers.write().push(transfer.clone());
        Ok(())
    }

    async fn claim_intent(&self, intent_id: Uuid) -> Result<bool> {
        Ok(self.claimed_intents.write().insert(intent_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_claim_intent_is_once() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(store.claim_intent(id).await.unwrap());
        assert!(!store.claim_intent(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_portfolio_roundtrip_and_delete() {
        let store = MemoryStore::new();
        let row = Portfolio {
            user_id: "u1".to_string(),
            symbol: Symbol::new("BTCUSDT"),
            quantity: Decimal::ONE,
            avg_buy_price: Decimal::from(100),
        };
        store.upsert_portfolio(&row).await.unwrap();
        assert!(store
            .find_portfolio("u1", &Symbol::new("BTCUSDT"))
            .await
            .unwrap()
            .is_some());

        store
            .delete_portfolio("u1", &Symbol::new("BTCUSDT"))
            .await
            .unwrap();
        assert!(store
            .find_portfolio("u1", &Symbol::new("BTCUSDT"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_user_by_username() {
        let store = MemoryStore::new();
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            credits: Decimal::from(1000),
            updated_at: Utc::now(),
        };
        store.save_user(&user).await.unwrap();
        let found = store.find_user_by_username("alice").await.unwrap();
        assert_eq!(found.unwrap().id, "u1");
    }
}
