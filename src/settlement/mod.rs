//! Trade settlement pipeline - drives a dequeued order intent through
//! validation, exchange submission, and the multi-entity ledger commit.
//!
//! Stages: RECEIVED -> VALIDATED -> SUBMITTED -> FILLED | REJECTED |
//! PENDING. Orders that rest on the book leave the pipeline in PENDING
//! and are picked up later by the reconciler.

pub mod locks;
pub mod reconcile;
pub mod saga;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::OrderAdapter;
use crate::core::{
    CreditReason, CreditsHistory, Error, Order, OrderIntent, OrderStatus, OrderType, Result, Side,
    Transaction, User,
};
use crate::exchange::{ExchangeClient, ExchangeOrder, Fill};
use crate::ledger::{fee, quantize};
use crate::portfolio::{apply_buy, apply_sell};
use crate::storage::Storage;

pub use locks::KeyedLocks;
pub use reconcile::Reconciler;
pub use saga::{Compensation, Saga};

pub struct SettlementPipeline {
    storage: Arc<dyn Storage>,
    exchange: Arc<dyn ExchangeClient>,
    adapter: OrderAdapter,
    locks: Arc<KeyedLocks>,
}

impl SettlementPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        exchange: Arc<dyn ExchangeClient>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        let adapter = OrderAdapter::new(exchange.clone());
        Self {
            storage,
            exchange,
            adapter,
            locks,
        }
    }

    /// Drive one dequeued intent through the full state machine.
    pub async fn process(&self, intent: OrderIntent) -> Result<()> {
        // Duplicate queue deliveries must not settle twice.
        if !self.storage.claim_intent(intent.intent_id).await? {
            warn!(
                "intent {} already claimed, dropping duplicate delivery",
                intent.intent_id
            );
            return Ok(());
        }

        // Single writer per (user, symbol) for the whole run, exchange
        // calls included.
        let lock = self
            .locks
            .for_key(&locks::holding_key(&intent.user_id, &intent.symbol));
        let _guard = lock.lock().await;

        let user = self
            .storage
            .get_user(&intent.user_id)
            .await?
            .ok_or_else(|| Error::UserNotFound(intent.user_id.clone()))?;

        // Funds are verified before the exchange sees the order.
        match intent.side {
            Side::Buy => self.check_credits_estimate(&user, &intent).await?,
            Side::Sell => self.check_holdings(&intent).await?,
        }

        let placed = self
            .adapter
            .place_order(
                &intent.symbol,
                intent.side,
                intent.order_type,
                intent.quantity,
                intent.price,
            )
            .await?;

        let now = Utc::now();
        let filled = placed.remote.status == OrderStatus::Filled;
        let order = Order {
            id: Uuid::new_v4(),
            user_id: intent.user_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            order_type: intent.order_type,
            quantity: quantize(intent.quantity),
            price: Some(quantize(placed.fill_price)),
            remote_order_id: placed.remote.remote_order_id.clone(),
            status: placed.remote.status,
            created_at: now,
            executed_at: filled.then_some(now),
        };
        // The order is recorded whatever the outcome, for audit.
        self.storage.insert_order(&order).await?;
        info!(
            "order {} recorded: {:?}, submitted as {}",
            order.id, order.status, placed.submitted_type
        );

        if !filled {
            warn!("order {} not filled immediately, leaving to reconciler", order.id);
            return Ok(());
        }

        let mut saga = Saga::new(self.storage.as_ref());
        match self
            .apply_ledger(
                &mut saga,
                &user,
                &order,
                &placed.remote.fills,
                placed.fill_price,
                now,
            )
            .await
        {
            Ok(()) => {
                saga.commit();
                Ok(())
            }
            Err(e) => {
                saga.compensate().await;
                Err(e)
            }
        }
    }

    /// Settle a resting LIMIT order the exchange now reports filled.
    /// Called by the reconciler; settles at the requested quantity and
    /// price. The status flip participates in the saga, so a ledger
    /// failure puts the order back to New for a later pass.
    pub async fn settle_resting(&self, order: &Order, remote: &ExchangeOrder) -> Result<()> {
        let price = order
            .price
            .ok_or_else(|| Error::Validation("resting order without a price".to_string()))?;

        let lock = self
            .locks
            .for_key(&locks::holding_key(&order.user_id, &order.symbol));
        let _guard = lock.lock().await;

        let user = self
            .storage
            .get_user(&order.user_id)
            .await?
            .ok_or_else(|| Error::UserNotFound(order.user_id.clone()))?;

        let now = Utc::now();
        let mut filled = order.clone();
        filled.status = OrderStatus::Filled;
        filled.executed_at = Some(now);

        let mut saga = Saga::new(self.storage.as_ref());
        self.storage.update_order(&filled).await?;
        saga.record(Compensation::RestoreOrder(order.clone()));

        match self
            .apply_ledger(&mut saga, &user, &filled, &remote.fills, price, now)
            .await
        {
            Ok(()) => {
                saga.commit();
                Ok(())
            }
            Err(e) => {
                saga.compensate().await;
                Err(e)
            }
        }
    }

    /// Estimate the BUY cost (live price for MARKET, requested price for
    /// LIMIT), fee included, and reject before any order is placed.
    async fn check_credits_estimate(&self, user: &User, intent: &OrderIntent) -> Result<()> {
        let est_price = match intent.order_type {
            OrderType::Market => self.exchange.get_symbol_ticker(&intent.symbol).await?.price,
            OrderType::Limit => intent
                .price
                .ok_or_else(|| Error::Validation("LIMIT orders require a price".to_string()))?,
        };

        let total = quantize(intent.quantity * est_price);
        let required = total + fee(total);
        if user.credits < required {
            return Err(Error::InsufficientCredits {
                available: user.credits,
                required,
            });
        }
        Ok(())
    }

    /// Re-validate SELL holdings against current state. The boundary
    /// already checked once, but another trade may have drained the row
    /// while the intent sat in the queue.
    async fn check_holdings(&self, intent: &OrderIntent) -> Result<()> {
        let holding = self
            .storage
            .find_portfolio(&intent.user_id, &intent.symbol)
            .await?
            .ok_or(Error::InsufficientHoldings {
                have: Decimal::ZERO,
                want: intent.quantity,
            })?;

        if holding.quantity < intent.quantity {
            return Err(Error::InsufficientHoldings {
                have: holding.quantity,
                want: intent.quantity,
            });
        }
        Ok(())
    }

    /// Commit the fill across Transaction, Portfolio, User.credits, and
    /// CreditsHistory, in that order, recording an undo per step.
    async fn apply_ledger(
        &self,
        saga: &mut Saga<'_>,
        user: &User,
        order: &Order,
        fills: &[Fill],
        fill_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        // MARKET quantity always comes from the exchange's reported
        // fill, never the request, to tolerate exchange-level partials.
        let (qty, price) = match order.order_type {
            OrderType::Market => {
                let fill = fills
                    .first()
                    .ok_or_else(|| Error::Adapter("filled order carried no fills".to_string()))?;
                (fill.qty, fill.price)
            }
            OrderType::Limit => (order.quantity, fill_price),
        };
        let qty = quantize(qty);
        let price = quantize(price);
        let total = quantize(qty * price);
        let trading_fee = fee(total);
        let total_with_fee = match order.side {
            Side::Buy => total + trading_fee,
            Side::Sell => total - trading_fee,
        };

        let txn = Transaction {
            id: Uuid::new_v4(),
            user_id: order.user_id.clone(),
            order_id: order.id,
            symbol: order.symbol.clone(),
            transaction_type: order.side.into(),
            quantity: qty,
            price,
            total_amount: total,
            created_at: now,
        };
        self.storage.insert_transaction(&txn).await?;
        saga.record(Compensation::RemoveTransaction(txn.id));

        let new_credits = match order.side {
            Side::Buy => {
                // Authoritative check against the actual fill price.
                if user.credits < total_with_fee {
                    return Err(Error::InsufficientCredits {
                        available: user.credits,
                        required: total_with_fee,
                    });
                }
                let prior =
                    apply_buy(self.storage.as_ref(), &order.user_id, &order.symbol, qty, price)
                        .await?;
                saga.record(Compensation::RestoreHolding {
                    user_id: order.user_id.clone(),
                    symbol: order.symbol.clone(),
                    prior,
                });
                quantize(user.credits - total_with_fee)
            }
            Side::Sell => {
                let prior =
                    apply_sell(self.storage.as_ref(), &order.user_id, &order.symbol, qty).await?;
                saga.record(Compensation::RestoreHolding {
                    user_id: order.user_id.clone(),
                    symbol: order.symbol.clone(),
                    prior,
                });
                quantize(user.credits + total_with_fee)
            }
        };

        let mut updated = user.clone();
        updated.credits = new_credits;
        updated.updated_at = now;
        self.storage.save_user(&updated).await?;
        saga.record(Compensation::RestoreUser(user.clone()));

        let mut metadata = BTreeMap::new();
        metadata.insert("symbol".to_string(), order.symbol.to_string());
        metadata.insert("qty".to_string(), qty.to_string());
        metadata.insert("price".to_string(), price.to_string());
        metadata.insert("trading_fee".to_string(), trading_fee.to_string());

        let history = CreditsHistory {
            id: Uuid::new_v4(),
            user_id: order.user_id.clone(),
            change_amount: match order.side {
                Side::Buy => -total_with_fee,
                Side::Sell => total_with_fee,
            },
            reason: CreditReason::Trade,
            balance_after: updated.credits,
            metadata,
            created_at: now,
        };
        self.storage.insert_credits_history(&history).await?;

        info!(
            "settled order {}: {} {} {} @ {} (fee {})",
            order.id, order.side, qty, order.symbol, price, trading_fee
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;
    use crate::storage::MemoryStore;
    use crate::core::Symbol;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    struct Fixture {
        storage: Arc<MemoryStore>,
        exchange: Arc<PaperExchange>,
        pipeline: SettlementPipeline,
    }

    async fn fixture_with_user(credits: &str) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let exchange = Arc::new(PaperExchange::new());
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            credits: d(credits),
            updated_at: Utc::now(),
        };
        storage.save_user(&user).await.unwrap();

        let pipeline = SettlementPipeline::new(
            storage.clone(),
            exchange.clone(),
            Arc::new(KeyedLocks::new()),
        );
        Fixture {
            storage,
            exchange,
            pipeline,
        }
    }

    fn intent(side: Side, order_type: OrderType, qty: &str, price: Option<&str>) -> OrderIntent {
        OrderIntent {
            intent_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            symbol: Symbol::new("ABCUSD"),
            side,
            order_type,
            quantity: d(qty),
            price: price.map(d),
        }
    }

    #[tokio::test]
    async fn test_market_buy_settles_everything() {
        let fx = fixture_with_user("1000").await;
        fx.exchange.set_price("ABCUSD", d("100"));

        fx.pipeline
            .process(intent(Side::Buy, OrderType::Market, "1", None))
            .await
            .unwrap();

        let user = fx.storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.credits, d("899.9"));

        let row = fx
            .storage
            .find_portfolio("u1", &Symbol::new("ABCUSD"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.quantity, d("1"));
        assert_eq!(row.avg_buy_price, d("100"));

        let txns = fx.storage.transactions_for("u1");
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].total_amount, d("100"));
        assert_eq!(txns[0].transaction_type, crate::core::TransactionType::Buy);

        let history = fx.storage.credits_history_for("u1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].change_amount, d("-100.1"));
        assert_eq!(history[0].balance_after, d("899.9"));
        assert_eq!(history[0].reason, CreditReason::Trade);
    }

    #[tokio::test]
    async fn test_market_sell_credits_proceeds_minus_fee() {
        let fx = fixture_with_user("0").await;
        fx.exchange.set_price("ABCUSD", d("100"));
        apply_buy(fx.storage.as_ref(), "u1", &Symbol::new("ABCUSD"), d("2"), d("50"))
            .await
            .unwrap();

        fx.pipeline
            .process(intent(Side::Sell, OrderType::Market, "1", None))
            .await
            .unwrap();

        // proceeds 100 minus 0.1 fee
        let user = fx.storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.credits, d("99.9"));

        let row = fx
            .storage
            .find_portfolio("u1", &Symbol::new("ABCUSD"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.quantity, d("1"));
        // untouched by the sell
        assert_eq!(row.avg_buy_price, d("50"));
    }

    #[tokio::test]
    async fn test_buy_insufficient_credits_rejected_before_exchange() {
        let fx = fixture_with_user("50").await;
        fx.exchange.set_price("ABCUSD", d("100"));

        let err = fx
            .pipeline
            .process(intent(Side::Buy, OrderType::Market, "1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientCredits { .. }));

        // nothing was placed or recorded
        assert!(fx.storage.transactions_for("u1").is_empty());
        assert!(fx.storage.credits_history_for("u1").is_empty());
        let user = fx.storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.credits, d("50"));
    }

    #[tokio::test]
    async fn test_duplicate_intent_settles_once() {
        let fx = fixture_with_user("1000").await;
        fx.exchange.set_price("ABCUSD", d("100"));

        let one = intent(Side::Buy, OrderType::Market, "1", None);
        fx.pipeline.process(one.clone()).await.unwrap();
        // at-least-once delivery: the same intent arrives again
        fx.pipeline.process(one).await.unwrap();

        let user = fx.storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.credits, d("899.9"));
        assert_eq!(fx.storage.transactions_for("u1").len(), 1);
    }

    #[tokio::test]
    async fn test_resting_limit_leaves_no_ledger_state() {
        let fx = fixture_with_user("1000").await;
        fx.exchange.set_price("ABCUSD", d("95"));

        // BUY below the market rests on the book
        fx.pipeline
            .process(intent(Side::Buy, OrderType::Limit, "1", Some("90")))
            .await
            .unwrap();

        let user = fx.storage.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.credits, d("1000"));
        assert!(fx.storage.transactions_for("u1").is_empty());

        let resting = fx.storage.find_resting_orders().await.unwrap();
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].status, OrderStatus::New);
        assert_eq!(resting[0].price, Some(d("90")));
    }

    #[tokio::test]
    async fn test_limit_converted_to_market_settles_at_live_price() {
        let fx = fixture_with_user("1000").await;
        fx.exchange.set_price("ABCUSD", d("95"));

        // BUY at 100 with live 95 converts and fills immediately
        fx.pipeline
            .process(intent(Side::Buy, OrderType::Limit, "1", Some("100")))
            .await
            .unwrap();

        let txns = fx.storage.transactions_for("u1");
        assert_eq!(txns.len(), 1);
        // LIMIT path settles requested quantity at the adapter fill price
        assert_eq!(txns[0].price, d("95"));
        assert_eq!(txns[0].quantity, d("1"));
    }

    #[tokio::test]
    async fn test_unknown_user_is_fatal() {
        let fx = fixture_with_user("1000").await;
        fx.exchange.set_price("ABCUSD", d("100"));

        let mut bad = intent(Side::Buy, OrderType::Market, "1", None);
        bad.user_id = "ghost".to_string();
        let err = fx.pipeline.process(bad).await.unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_sell_revalidates_holdings_in_pipeline() {
        let fx = fixture_with_user("0").await;
        fx.exchange.set_price("ABCUSD", d("100"));

        // no holdings at all: the pre-queue check was bypassed
        let err = fx
            .pipeline
            .process(intent(Side::Sell, OrderType::Market, "1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientHoldings { .. }));
    }
}
