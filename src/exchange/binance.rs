//! Binance spot REST client - signed order placement and ticker queries.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::core::{Error, OrderStatus, Result, Symbol};
use crate::exchange::{CreateOrderRequest, ExchangeClient, ExchangeOrder, Fill, Ticker};

/// Binance spot client. Signs private endpoints with HMAC-SHA256 over the
/// query string, per the exchange's v3 API.
pub struct BinanceClient {
    name: String,
    api_key: String,
    api_secret: String,
    rest_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FillWire {
    qty: Decimal,
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderWire {
    #[serde(rename = "orderId")]
    order_id: Option<u64>,
    status: String,
    #[serde(default)]
    fills: Vec<FillWire>,
}

#[derive(Debug, Deserialize)]
struct TickerWire {
    price: Decimal,
}

impl BinanceClient {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, testnet: bool) -> Self {
        let rest_url = if testnet {
            "https://testnet.binance.vision/api"
        } else {
            "https://api.binance.com/api"
        };

        Self {
            name: "binance".to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            rest_url: rest_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Sign a query string with HMAC SHA256.
    fn sign(&self, query_string: &str) -> String {
        use hmac::{Hmac, Mac};
        type HmacSha256 = Hmac<sha2::Sha256>;

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Adapter(format!("bad api key: {}", e)))?,
        );
        Ok(headers)
    }

    /// Build a signed query: params + timestamp + signature.
    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before unix epoch")
            .as_millis()
            .to_string();

        let mut query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        query.push_str(&format!("&timestamp={}", timestamp));

        let signature = self.sign(&query);
        query.push_str(&format!("&signature={}", signature));
        query
    }

    fn normalize(wire: OrderWire) -> ExchangeOrder {
        ExchangeOrder {
            remote_order_id: wire.order_id.map(|id| id.to_string()),
            status: OrderStatus::from_remote(&wire.status),
            fills: wire
                .fills
                .into_iter()
                .map(|f| Fill {
                    qty: f.qty,
                    price: f.price,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn create_order(&self, req: &CreateOrderRequest) -> Result<ExchangeOrder> {
        let mut params: Vec<(&str, String)> = vec![
            ("symbol", req.symbol.to_string()),
            ("side", req.side.to_string()),
            ("type", req.order_type.to_string()),
            ("quantity", req.quantity.to_string()),
        ];
        if let Some(price) = req.price {
            params.push(("price", price.to_string()));
        }
        if let Some(tif) = req.time_in_force {
            params.push(("timeInForce", tif.to_string()));
        }

        info!(
            "placing order: {} {} {} @ {:?}",
            req.side, req.quantity, req.symbol, req.price
        );

        let url = format!(
            "{}/v3/order?{}",
            self.rest_url,
            self.signed_query(&params)
        );
        let res = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await?;
            return Err(Error::Adapter(format!(
                "create_order status {}: {}",
                status, text
            )));
        }

        let wire: OrderWire = res.json().await?;
        debug!("order response: {:?}", wire);
        Ok(Self::normalize(wire))
    }

    async fn get_symbol_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
        let url = format!("{}/v3/ticker/price?symbol={}", self.rest_url, symbol);

        let res = self.client.get(&url).send().await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await?;
            return Err(Error::Adapter(format!(
                "ticker status {}: {}",
                status, text
            )));
        }

        let wire: TickerWire = res.json().await?;
        Ok(Ticker {
            symbol: symbol.clone(),
            price: wire.price,
        })
    }

    async fn get_order(&self, symbol: &Symbol, remote_order_id: &str) -> Result<ExchangeOrder> {
        let params: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_string()),
            ("orderId", remote_order_id.to_string()),
        ];
        let url = format!(
            "{}/v3/order?{}",
            self.rest_url,
            self.signed_query(&params)
        );

        let res = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await?;
            return Err(Error::Adapter(format!(
                "get_order status {}: {}",
                status, text
            )));
        }

        let wire: OrderWire = res.json().await?;
        Ok(Self::normalize(wire))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
