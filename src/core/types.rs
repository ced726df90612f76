//! Core types - Strong typing for safety

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Tradeable symbol (e.g., "BTCUSDT"). Always stored uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::new(s)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Order status as persisted. Remote statuses outside this set
/// (CANCELED, EXPIRED) collapse to Rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Rejected,
}

impl OrderStatus {
    /// Map a remote exchange status string onto the local enum.
    pub fn from_remote(s: &str) -> Self {
        match s {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            _ => OrderStatus::Rejected,
        }
    }
}

/// One user's trade instruction and its outcome.
/// Immutable once Filled, except executed_at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub remote_order_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl From<Side> for TransactionType {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => TransactionType::Buy,
            Side::Sell => TransactionType::Sell,
        }
    }
}

/// Immutable record of one executed fill.
/// total_amount is recomputed as quantity * price, never trusted from upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub order_id: Uuid,
    pub symbol: Symbol,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One (user, symbol) holding. quantity >= 0 at all times; the row is
/// deleted, not zeroed, when quantity reaches exactly 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: String,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub avg_buy_price: Decimal,
}

/// Reason a credit balance changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditReason {
    Trade,
    Fee,
    Deposit,
    Reward,
}

/// Immutable audit entry for every balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsHistory {
    pub id: Uuid,
    pub user_id: String,
    pub change_amount: Decimal,
    pub reason: CreditReason,
    pub balance_after: Decimal,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Audit record of a portfolio-to-portfolio transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub from_user: String,
    pub to_user: String,
    pub symbol: Symbol,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Account holder. credits is the authoritative balance, mutated only by
/// the settlement pipeline and the transfer flow; never negative as the
/// result of a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub credits: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Queued order intent, produced by the request boundary and consumed by
/// the settlement pipeline. Decimal fields travel as strings on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Idempotency token; claimed once before any ledger mutation.
    pub intent_id: Uuid,
    pub user_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_uppercases() {
        assert_eq!(Symbol::new(" btcusdt ").as_str(), "BTCUSDT");
    }

    #[test]
    fn test_status_from_remote() {
        assert_eq!(OrderStatus::from_remote("FILLED"), OrderStatus::Filled);
        assert_eq!(OrderStatus::from_remote("NEW"), OrderStatus::New);
        assert_eq!(
            OrderStatus::from_remote("PARTIALLY_FILLED"),
            OrderStatus::PartiallyFilled
        );
        assert_eq!(OrderStatus::from_remote("CANCELED"), OrderStatus::Rejected);
    }

    #[test]
    fn test_intent_wire_format() {
        let intent = OrderIntent {
            intent_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            symbol: Symbol::new("ethusdt"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: "0.50000000".parse().unwrap(),
            price: Some("1900".parse().unwrap()),
        };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["side"], "BUY");
        assert_eq!(json["order_type"], "LIMIT");
        assert!(json["quantity"].is_string());
        assert!(json["price"].is_string());
    }
}
