//! Paper exchange - deterministic in-process execution venue.
//!
//! Fills MARKET orders at the posted ticker price and parks LIMIT orders
//! until `fill_resting` is called. Used in paper mode and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{Error, OrderStatus, OrderType, Result, Symbol};
use crate::exchange::{CreateOrderRequest, ExchangeClient, ExchangeOrder, Fill, Ticker};

struct RestingOrder {
    quantity: Decimal,
    price: Decimal,
    filled: bool,
}

#[derive(Default)]
pub struct PaperExchange {
    tickers: RwLock<HashMap<Symbol, Decimal>>,
    resting: RwLock<HashMap<String, RestingOrder>>,
    seq: AtomicU64,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post the current market price for a symbol.
    pub fn set_price(&self, symbol: impl Into<Symbol>, price: Decimal) {
        self.tickers.write().insert(symbol.into(), price);
    }

    /// Mark a resting LIMIT order as filled at its limit price.
    pub fn fill_resting(&self, remote_order_id: &str) {
        if let Some(order) = self.resting.write().get_mut(remote_order_id) {
            order.filled = true;
        }
    }

    fn next_order_id(&self) -> String {
        format!("paper-{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn live_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.tickers
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Adapter(format!("no ticker for {}", symbol)))
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn create_order(&self, req: &CreateOrderRequest) -> Result<ExchangeOrder> {
        match req.order_type {
            OrderType::Market => {
                let price = self.live_price(&req.symbol)?;
                Ok(ExchangeOrder {
                    remote_order_id: Some(self.next_order_id()),
                    status: OrderStatus::Filled,
                    fills: vec![Fill {
                        qty: req.quantity,
                        price,
                    }],
                })
            }
            OrderType::Limit => {
                let price = req
                    .price
                    .ok_or_else(|| Error::Validation("LIMIT order without price".to_string()))?;
                let id = self.next_order_id();
                self.resting.write().insert(
                    id.clone(),
                    RestingOrder {
                        quantity: req.quantity,
                        price,
                        filled: false,
                    },
                );
                Ok(ExchangeOrder {
                    remote_order_id: Some(id),
                    status: OrderStatus::New,
                    fills: vec![],
                })
            }
        }
    }

    async fn get_symbol_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
        Ok(Ticker {
            symbol: symbol.clone(),
            price: self.live_price(symbol)?,
        })
    }

    async fn get_order(&self, _symbol: &Symbol, remote_order_id: &str) -> Result<ExchangeOrder> {
        let resting = self.resting.read();
        let order = resting
            .get(remote_order_id)
            .ok_or_else(|| Error::Adapter(format!("unknown order {}", remote_order_id)))?;

        if order.filled {
            Ok(ExchangeOrder {
                remote_order_id: Some(remote_order_id.to_string()),
                status: OrderStatus::Filled,
                fills: vec![Fill {
                    qty: order.quantity,
                    price: order.price,
                }],
            })
        } else {
            Ok(ExchangeOrder {
                remote_order_id: Some(remote_order_id.to_string()),
                status: OrderStatus::New,
                fills: vec![],
            })
        }
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_market_fills_at_live_price() {
        let exch = PaperExchange::new();
        exch.set_price("BTCUSDT", d("50000"));

        let order = exch
            .create_order(&CreateOrderRequest {
                symbol: Symbol::new("BTCUSDT"),
                side: Side::Buy,
                order_type: OrderType::Market,
                quantity: d("0.5"),
                price: None,
                time_in_force: None,
            })
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.fills[0].price, d("50000"));
        assert_eq!(order.fills[0].qty, d("0.5"));
    }

    #[tokio::test]
    async fn test_limit_rests_until_filled() {
        let exch = PaperExchange::new();
        exch.set_price("BTCUSDT", d("50000"));

        let order = exch
            .create_order(&CreateOrderRequest {
                symbol: Symbol::new("BTCUSDT"),
                side: Side::Buy,
                order_type: OrderType::Limit,
                quantity: d("1"),
                price: Some(d("45000")),
                time_in_force: Some(crate::exchange::TimeInForce::Gtc),
            })
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::New);
        let id = order.remote_order_id.unwrap();

        let polled = exch
            .get_order(&Symbol::new("BTCUSDT"), &id)
            .await
            .unwrap();
        assert_eq!(polled.status, OrderStatus::New);

        exch.fill_resting(&id);
        let polled = exch
            .get_order(&Symbol::new("BTCUSDT"), &id)
            .await
            .unwrap();
        assert_eq!(polled.status, OrderStatus::Filled);
        assert_eq!(polled.fills[0].price, d("45000"));
    }

    #[tokio::test]
    async fn test_missing_ticker_is_adapter_error() {
        let exch = PaperExchange::new();
        let err = exch
            .get_symbol_ticker(&Symbol::new("NOPEUSD"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Adapter(_)));
    }
}
