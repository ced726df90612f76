//! Exchange connectivity - the remote order-execution service seam.

pub mod binance;
pub mod paper;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::{OrderStatus, OrderType, Result, Side, Symbol};

pub use binance::BinanceClient;
pub use paper::PaperExchange;

/// Time-in-force for resting orders. Only GTC is used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Gtc,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
        }
    }
}

/// Outbound order request.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
}

/// One fill entry from the remote response.
#[derive(Debug, Clone)]
pub struct Fill {
    pub qty: Decimal,
    pub price: Decimal,
}

/// Normalized remote order state. Consumed fields: status, orderId,
/// fills[].qty, fills[].price.
#[derive(Debug, Clone)]
pub struct ExchangeOrder {
    pub remote_order_id: Option<String>,
    pub status: OrderStatus,
    pub fills: Vec<Fill>,
}

/// Live ticker price.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub symbol: Symbol,
    pub price: Decimal,
}

/// Remote order-execution service.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order.
    async fn create_order(&self, req: &CreateOrderRequest) -> Result<ExchangeOrder>;

    /// Fetch the current ticker price for a symbol.
    async fn get_symbol_ticker(&self, symbol: &Symbol) -> Result<Ticker>;

    /// Fetch the current state of a previously placed order.
    async fn get_order(&self, symbol: &Symbol, remote_order_id: &str) -> Result<ExchangeOrder>;

    /// Exchange name.
    fn name(&self) -> &str;
}
