//! Request boundary - validates trade intents before they enter the
//! queue and runs the synchronous transfer flow. HTTP framing, auth, and
//! session lookup live in the host layer; this is the contract it calls.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::core::{
    CreditReason, CreditsHistory, Error, OrderIntent, OrderType, Portfolio, Result, Side, Symbol,
    Transfer, User,
};
use crate::ledger::{quantize, transfer_fee};
use crate::queue::TaskQueue;
use crate::settlement::locks::holding_key;
use crate::settlement::KeyedLocks;
use crate::storage::Storage;

/// Inbound trade request, fields as the host layer decodes them.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

/// Accepted-and-queued response; `order` echoes the normalized payload.
#[derive(Debug, Clone, Serialize)]
pub struct TradeAccepted {
    pub status: &'static str,
    pub message: String,
    pub order: OrderIntent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub to_username: String,
    pub symbol: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub message: String,
    pub transfer_id: Uuid,
    pub to: String,
    pub symbol: Symbol,
    pub amount: Decimal,
}

pub struct TradeGateway {
    storage: Arc<dyn Storage>,
    queue: TaskQueue,
    locks: Arc<KeyedLocks>,
}

impl TradeGateway {
    pub fn new(storage: Arc<dyn Storage>, queue: TaskQueue, locks: Arc<KeyedLocks>) -> Self {
        Self {
            storage,
            queue,
            locks,
        }
    }

    /// Validate and enqueue a trade. Returns as soon as the intent is in
    /// the queue; settlement happens on the worker pool.
    pub async fn place_trade(&self, user: &User, req: TradeRequest) -> Result<TradeAccepted> {
        let symbol = Symbol::new(req.symbol);
        let quantity = quantize(req.quantity);

        if quantity <= Decimal::ZERO {
            return Err(Error::Validation("quantity must be positive".to_string()));
        }
        if req.order_type == OrderType::Limit && req.price.is_none() {
            return Err(Error::Validation("LIMIT orders require a price".to_string()));
        }
        if let Some(price) = req.price {
            if price <= Decimal::ZERO {
                return Err(Error::Validation("price must be positive".to_string()));
            }
        }

        // SELL is rejected synchronously when holdings cannot cover it.
        if req.side == Side::Sell {
            let holding = self
                .storage
                .find_portfolio(&user.id, &symbol)
                .await?
                .ok_or(Error::InsufficientHoldings {
                    have: Decimal::ZERO,
                    want: quantity,
                })?;
            if holding.quantity < quantity {
                return Err(Error::InsufficientHoldings {
                    have: holding.quantity,
                    want: quantity,
                });
            }
        }

        let intent = OrderIntent {
            intent_id: Uuid::new_v4(),
            user_id: user.id.clone(),
            symbol: symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            quantity,
            price: req.price.map(quantize),
        };
        self.queue.enqueue(intent.clone())?;
        info!("queued {} {} {} for {}", req.side, quantity, symbol, user.id);

        Ok(TradeAccepted {
            status: "success",
            message: format!("{} order for {} accepted and queued", req.side, symbol),
            order: intent,
        })
    }

    /// Move holdings between two users, synchronously. Debits the sender
    /// a flat 1-credit fee and writes one CreditsHistory entry per party.
    pub async fn transfer(&self, sender: &User, req: TransferRequest) -> Result<TransferReceipt> {
        let receiver = self
            .storage
            .find_user_by_username(&req.to_username)
            .await?
            .ok_or_else(|| Error::UserNotFound(req.to_username.clone()))?;

        if receiver.id == sender.id {
            return Err(Error::Validation("cannot transfer to self".to_string()));
        }

        let symbol = Symbol::new(req.symbol);
        let amount = quantize(req.amount);
        if amount <= Decimal::ZERO {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        // Both holdings change; take both keys in sorted order so two
        // opposite-direction transfers cannot deadlock.
        let mut keys = [
            holding_key(&sender.id, &symbol),
            holding_key(&receiver.id, &symbol),
        ];
        keys.sort();
        let first = self.locks.for_key(&keys[0]);
        let _first_guard = first.lock().await;
        let second = self.locks.for_key(&keys[1]);
        let _second_guard = second.lock().await;

        let sender_row = self
            .storage
            .find_portfolio(&sender.id, &symbol)
            .await?
            .ok_or(Error::InsufficientHoldings {
                have: Decimal::ZERO,
                want: amount,
            })?;
        if sender_row.quantity < amount {
            return Err(Error::InsufficientHoldings {
                have: sender_row.quantity,
                want: amount,
            });
        }

        let now = Utc::now();

        // Sender side: decrement, delete at exactly zero.
        let remaining = quantize(sender_row.quantity - amount);
        if remaining.is_zero() {
            self.storage.delete_portfolio(&sender.id, &symbol).await?;
        } else {
            self.storage
                .upsert_portfolio(&Portfolio {
                    quantity: remaining,
                    ..sender_row.clone()
                })
                .await?;
        }

        // Receiver side: add to the row, or create one with no cost basis.
        match self.storage.find_portfolio(&receiver.id, &symbol).await? {
            Some(row) => {
                self.storage
                    .upsert_portfolio(&Portfolio {
                        quantity: quantize(row.quantity + amount),
                        ..row
                    })
                    .await?;
            }
            None => {
                self.storage
                    .upsert_portfolio(&Portfolio {
                        user_id: receiver.id.clone(),
                        symbol: symbol.clone(),
                        quantity: amount,
                        avg_buy_price: Decimal::ZERO,
                    })
                    .await?;
            }
        }

        let transfer = Transfer {
            id: Uuid::new_v4(),
            from_user: sender.id.clone(),
            to_user: receiver.id.clone(),
            symbol: symbol.clone(),
            amount,
            created_at: now,
        };
        self.storage.insert_transfer(&transfer).await?;

        // Flat fee comes off the sender's balance.
        let mut updated_sender = sender.clone();
        updated_sender.credits = quantize(sender.credits - transfer_fee());
        updated_sender.updated_at = now;
        self.storage.save_user(&updated_sender).await?;

        let mut updated_receiver = receiver.clone();
        updated_receiver.updated_at = now;
        self.storage.save_user(&updated_receiver).await?;

        let mut sender_meta = BTreeMap::new();
        sender_meta.insert("type".to_string(), "transfer_sent".to_string());
        sender_meta.insert("symbol".to_string(), symbol.to_string());
        sender_meta.insert("to".to_string(), receiver.username.clone());
        self.storage
            .insert_credits_history(&CreditsHistory {
                id: Uuid::new_v4(),
                user_id: sender.id.clone(),
                change_amount: -transfer_fee(),
                reason: CreditReason::Fee,
                balance_after: updated_sender.credits,
                metadata: sender_meta,
                created_at: now,
            })
            .await?;

        let mut receiver_meta = BTreeMap::new();
        receiver_meta.insert("type".to_string(), "transfer_received".to_string());
        receiver_meta.insert("symbol".to_string(), symbol.to_string());
        receiver_meta.insert("from".to_string(), sender.username.clone());
        self.storage
            .insert_credits_history(&CreditsHistory {
                id: Uuid::new_v4(),
                user_id: receiver.id.clone(),
                change_amount: Decimal::ZERO,
                reason: CreditReason::Reward,
                balance_after: updated_receiver.credits,
                metadata: receiver_meta,
                created_at: now,
            })
            .await?;

        info!(
            "transferred {} {} from {} to {}",
            amount, symbol, sender.id, receiver.id
        );

        Ok(TransferReceipt {
            message: "transfer successful".to_string(),
            transfer_id: transfer.id,
            to: receiver.username,
            symbol,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::apply_buy;
    use crate::storage::MemoryStore;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn user(id: &str, name: &str, credits: &str) -> User {
        User {
            id: id.to_string(),
            username: name.to_string(),
            credits: d(credits),
            updated_at: Utc::now(),
        }
    }

    async fn gateway() -> (Arc<MemoryStore>, TradeGateway, flume::Receiver<OrderIntent>) {
        let storage = Arc::new(MemoryStore::new());
        let (queue, rx) = TaskQueue::new(16);
        let gateway = TradeGateway::new(storage.clone(), queue, Arc::new(KeyedLocks::new()));
        (storage, gateway, rx)
    }

    #[tokio::test]
    async fn test_place_trade_normalizes_and_enqueues() {
        let (storage, gateway, rx) = gateway().await;
        let alice = user("u1", "alice", "1000");
        storage.save_user(&alice).await.unwrap();

        let accepted = gateway
            .place_trade(
                &alice,
                TradeRequest {
                    symbol: "abcusd".to_string(),
                    side: Side::Buy,
                    order_type: OrderType::Market,
                    quantity: d("1.123456789"),
                    price: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(accepted.status, "success");
        assert_eq!(accepted.order.symbol.as_str(), "ABCUSD");
        // quantity quantized before it hits the wire
        assert_eq!(accepted.order.quantity, d("1.12345678"));

        let queued = rx.recv_async().await.unwrap();
        assert_eq!(queued.intent_id, accepted.order.intent_id);
    }

    #[tokio::test]
    async fn test_sell_beyond_holdings_rejected_before_enqueue() {
        let (storage, gateway, rx) = gateway().await;
        let alice = user("u1", "alice", "1000");
        storage.save_user(&alice).await.unwrap();
        apply_buy(storage.as_ref(), "u1", &Symbol::new("ABCUSD"), d("2"), d("10"))
            .await
            .unwrap();

        let err = gateway
            .place_trade(
                &alice,
                TradeRequest {
                    symbol: "ABCUSD".to_string(),
                    side: Side::Sell,
                    order_type: OrderType::Market,
                    quantity: d("3"),
                    price: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientHoldings { .. }));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_limit_without_price_rejected() {
        let (storage, gateway, rx) = gateway().await;
        let alice = user("u1", "alice", "1000");
        storage.save_user(&alice).await.unwrap();

        let err = gateway
            .place_trade(
                &alice,
                TradeRequest {
                    symbol: "ABCUSD".to_string(),
                    side: Side::Buy,
                    order_type: OrderType::Limit,
                    quantity: d("1"),
                    price: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (storage, gateway, rx) = gateway().await;
        let alice = user("u1", "alice", "1000");
        storage.save_user(&alice).await.unwrap();

        let err = gateway
            .place_trade(
                &alice,
                TradeRequest {
                    symbol: "ABCUSD".to_string(),
                    side: Side::Buy,
                    order_type: OrderType::Market,
                    quantity: d("0"),
                    price: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_moves_holdings_and_fees() {
        let (storage, gateway, _rx) = gateway().await;
        let alice = user("u1", "alice", "100");
        let bob = user("u2", "bob", "0");
        storage.save_user(&alice).await.unwrap();
        storage.save_user(&bob).await.unwrap();
        apply_buy(storage.as_ref(), "u1", &Symbol::new("XYZ"), d("10"), d("3"))
            .await
            .unwrap();

        let receipt = gateway
            .transfer(
                &alice,
                TransferRequest {
                    to_username: "bob".to_string(),
                    symbol: "xyz".to_string(),
                    amount: d("5"),
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.to, "bob");
        assert_eq!(receipt.amount, d("5"));

        let sender_row = storage
            .find_portfolio("u1", &Symbol::new("XYZ"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sender_row.quantity, d("5"));

        let receiver_row = storage
            .find_portfolio("u2", &Symbol::new("XYZ"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(receiver_row.quantity, d("5"));
        assert_eq!(receiver_row.avg_buy_price, d("0"));

        assert_eq!(storage.transfers_for("u1").len(), 1);

        // sender paid the flat fee; both parties got an audit entry
        let sender = storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(sender.credits, d("99"));
        assert_eq!(storage.credits_history_for("u1").len(), 1);
        assert_eq!(storage.credits_history_for("u1")[0].change_amount, d("-1"));
        assert_eq!(storage.credits_history_for("u2").len(), 1);
        assert_eq!(storage.credits_history_for("u2")[0].change_amount, d("0"));
    }

    #[tokio::test]
    async fn test_transfer_of_full_holding_deletes_sender_row() {
        let (storage, gateway, _rx) = gateway().await;
        let alice = user("u1", "alice", "100");
        let bob = user("u2", "bob", "0");
        storage.save_user(&alice).await.unwrap();
        storage.save_user(&bob).await.unwrap();
        apply_buy(storage.as_ref(), "u1", &Symbol::new("XYZ"), d("5"), d("3"))
            .await
            .unwrap();

        gateway
            .transfer(
                &alice,
                TransferRequest {
                    to_username: "bob".to_string(),
                    symbol: "XYZ".to_string(),
                    amount: d("5"),
                },
            )
            .await
            .unwrap();

        assert!(storage
            .find_portfolio("u1", &Symbol::new("XYZ"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_transfer_to_self_rejected() {
        let (storage, gateway, _rx) = gateway().await;
        let alice = user("u1", "alice", "100");
        storage.save_user(&alice).await.unwrap();

        let err = gateway
            .transfer(
                &alice,
                TransferRequest {
                    to_username: "alice".to_string(),
                    symbol: "XYZ".to_string(),
                    amount: d("1"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_holdings_rejected() {
        let (storage, gateway, _rx) = gateway().await;
        let alice = user("u1", "alice", "100");
        let bob = user("u2", "bob", "0");
        storage.save_user(&alice).await.unwrap();
        storage.save_user(&bob).await.unwrap();
        apply_buy(storage.as_ref(), "u1", &Symbol::new("XYZ"), d("2"), d("3"))
            .await
            .unwrap();

        let err = gateway
            .transfer(
                &alice,
                TransferRequest {
                    to_username: "bob".to_string(),
                    symbol: "XYZ".to_string(),
                    amount: d("5"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientHoldings { .. }));

        // nothing moved
        let row = storage
            .find_portfolio("u1", &Symbol::new("XYZ"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.quantity, d("2"));
    }
}
