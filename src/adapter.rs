//! Exchange order adapter - turns an internal order intent into remote
//! execution calls and normalizes the outcome into a fill price.
//!
//! LIMIT intents whose limit condition is already satisfiable against the
//! live ticker are submitted as immediate MARKET orders. A LIMIT that is
//! not satisfiable rests on the book as GTC and settles later through the
//! reconciler.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::core::{Error, OrderType, Result, Side, Symbol};
use crate::exchange::{CreateOrderRequest, ExchangeClient, ExchangeOrder, TimeInForce};

/// Outcome of placing one order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub remote: ExchangeOrder,
    /// Price the settlement pipeline should account at: first fill price
    /// for anything submitted as MARKET, the requested price for a
    /// resting LIMIT.
    pub fill_price: Decimal,
    /// What actually went to the exchange (LIMIT intents can convert).
    pub submitted_type: OrderType,
}

pub struct OrderAdapter {
    exchange: Arc<dyn ExchangeClient>,
}

impl OrderAdapter {
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self { exchange }
    }

    pub async fn place_order(
        &self,
        symbol: &Symbol,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<PlacedOrder> {
        match order_type {
            OrderType::Market => self.place_market(symbol, side, quantity).await,
            OrderType::Limit => {
                let price = price
                    .ok_or_else(|| Error::Validation("LIMIT orders require a price".to_string()))?;
                self.place_limit(symbol, side, quantity, price).await
            }
        }
    }

    async fn place_market(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Decimal,
    ) -> Result<PlacedOrder> {
        let remote = self
            .exchange
            .create_order(&CreateOrderRequest {
                symbol: symbol.clone(),
                side,
                order_type: OrderType::Market,
                quantity,
                price: None,
                time_in_force: None,
            })
            .await?;

        let fill_price = first_fill_price(&remote)?;
        Ok(PlacedOrder {
            remote,
            fill_price,
            submitted_type: OrderType::Market,
        })
    }

    async fn place_limit(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<PlacedOrder> {
        let ticker = self.exchange.get_symbol_ticker(symbol).await?;
        let live = ticker.price;

        let fillable = match side {
            Side::Buy => live <= price,
            Side::Sell => live >= price,
        };

        if fillable {
            info!(
                "LIMIT condition met (live {}, target {}), placing MARKET",
                live, price
            );
            self.place_market(symbol, side, quantity).await
        } else {
            info!(
                "LIMIT condition not met (live {}, target {}), placing LIMIT GTC",
                live, price
            );
            let remote = self
                .exchange
                .create_order(&CreateOrderRequest {
                    symbol: symbol.clone(),
                    side,
                    order_type: OrderType::Limit,
                    quantity,
                    price: Some(price),
                    time_in_force: Some(TimeInForce::Gtc),
                })
                .await?;

            Ok(PlacedOrder {
                remote,
                // to be reconciled once the resting order fills
                fill_price: price,
                submitted_type: OrderType::Limit,
            })
        }
    }
}

fn first_fill_price(remote: &ExchangeOrder) -> Result<Decimal> {
    remote
        .fills
        .first()
        .map(|f| f.price)
        .ok_or_else(|| Error::Adapter("remote response carried no fills".to_string()))
}
