use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::TradingVenue;
use crate::error::BotError;
use crate::models::{
    Candle, ExchangePosition, Interval, OpenOrder, OrderId, OrderRequest, OrderSide, OrderType,
    SymbolFilters,
};
use crate::Result;

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

const REQUESTS_PER_SECOND: u32 = 20;
const RECV_WINDOW_MS: u64 = 5_000;
const QUOTE_ASSET: &str = "USDT";

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    mark_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountAsset {
    asset: String,
    wallet_balance: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    assets: Vec<AccountAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    position_amt: String,
    entry_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestingOrder {
    order_id: i64,
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    stop_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<Value>,
}

/// Binance USDT-M futures REST client
///
/// Cloneable; all clones share the rate limiter and the symbol filter cache.
/// Public market data works without credentials, signed endpoints need them.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    filters: Arc<RwLock<HashMap<String, SymbolFilters>>>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceFuturesClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let quota = Quota::per_second(NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            api_secret: None,
            filters: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn with_credentials(mut self, api_key: &str, api_secret: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self.api_secret = Some(api_secret.to_string());
        self
    }

    /// Sign a query string with HMAC-SHA256
    fn sign(&self, query: &str) -> Result<String> {
        let secret = self
            .api_secret
            .as_deref()
            .ok_or_else(|| BotError::Configuration("BINANCE_API_SECRET is not set".to_string()))?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BotError::Configuration(format!("invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get(&self, path: &str, query: &str) -> Result<String> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}?{}", self.base_url, path, query);
        let resp = self.client.get(&url).send().await?;
        Self::read_body(path, resp).await
    }

    async fn signed(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BotError::Configuration("BINANCE_API_KEY is not set".to_string()))?;

        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        query.push(format!("recvWindow={}", RECV_WINDOW_MS));
        query.push(format!("timestamp={}", Utc::now().timestamp_millis()));
        let query = query.join("&");
        let signature = self.sign(&query)?;
        let signed_query = format!("{}&signature={}", query, signature);

        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        let request = if method == Method::POST {
            self.client
                .post(&url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(signed_query)
        } else {
            self.client.request(method, format!("{}?{}", url, signed_query))
        };

        let resp = request.header("X-MBX-APIKEY", api_key).send().await?;
        Self::read_body(path, resp).await
    }

    /// 2xx → body; 4xx → rejection; anything else → transient
    async fn read_body(path: &str, resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        let detail = match serde_json::from_str::<BinanceError>(&body) {
            Ok(e) => format!("{} code {}: {}", path, e.code, e.msg),
            Err(_) => format!("{} HTTP {}: {}", path, status, body),
        };
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            tracing::error!("Binance rejected request: {}", detail);
            Err(BotError::ExchangeRejection(detail))
        } else {
            tracing::warn!("Binance request failed: {}", detail);
            Err(BotError::TransientNetwork(detail))
        }
    }

    async fn account(&self) -> Result<AccountAsset> {
        let body = self.signed(Method::GET, "/fapi/v2/account", &[]).await?;
        let account: Account = serde_json::from_str(&body)?;
        account
            .assets
            .into_iter()
            .find(|a| a.asset == QUOTE_ASSET)
            .ok_or_else(|| BotError::TransientNetwork(format!("no {} asset in account", QUOTE_ASSET)))
    }

    async fn fetch_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        let body = self
            .public_get("/fapi/v1/exchangeInfo", &format!("symbol={}", symbol))
            .await?;
        let info: ExchangeInfo = serde_json::from_str(&body)?;
        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| BotError::ExchangeRejection(format!("unknown symbol {}", symbol)))?;
        Ok(parse_filters(&symbol_info.filters))
    }
}

/// LOT_SIZE.minQty and PRICE_FILTER.tickSize, defaults where absent
fn parse_filters(filters: &[Value]) -> SymbolFilters {
    let mut parsed = SymbolFilters::default();
    for filter in filters {
        let field = |name: &str| filter.get(name).and_then(|v| parse_number(v).ok());
        match filter.get("filterType").and_then(Value::as_str) {
            Some("LOT_SIZE") => {
                if let Some(min_qty) = field("minQty").filter(|q| *q > 0.0) {
                    parsed.min_lot_size = min_qty;
                }
            }
            Some("PRICE_FILTER") => {
                if let Some(tick) = field("tickSize").filter(|t| *t > 0.0) {
                    parsed.price_tick_size = tick;
                }
            }
            _ => {}
        }
    }
    parsed
}

/// Binance sends most decimals as strings
fn parse_number(value: &Value) -> Result<f64> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| BotError::TransientNetwork(format!("bad number '{}': {}", s, e))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| BotError::TransientNetwork(format!("bad number {}", n))),
        other => Err(BotError::TransientNetwork(format!("expected number, got {}", other))),
    }
}

fn parse_decimal_str(s: &str) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|e| BotError::TransientNetwork(format!("bad number '{}': {}", s, e)))
}

fn parse_kline(row: &[Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(BotError::TransientNetwork(format!(
            "kline row has {} fields",
            row.len()
        )));
    }
    let open_time = row[0]
        .as_i64()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| BotError::TransientNetwork("bad kline open time".to_string()))?;
    Ok(Candle {
        timestamp: open_time,
        open: parse_number(&row[1])?,
        high: parse_number(&row[2])?,
        low: parse_number(&row[3])?,
        close: parse_number(&row[4])?,
        volume: parse_number(&row[5])?,
    })
}

fn order_type_code(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Stop => "STOP_MARKET",
        OrderType::TakeProfit => "TAKE_PROFIT_MARKET",
    }
}

fn parse_order_type(code: &str) -> Option<OrderType> {
    match code {
        "MARKET" => Some(OrderType::Market),
        "STOP_MARKET" | "STOP" => Some(OrderType::Stop),
        "TAKE_PROFIT_MARKET" | "TAKE_PROFIT" => Some(OrderType::TakeProfit),
        _ => None,
    }
}

#[async_trait]
impl TradingVenue for BinanceFuturesClient {
    async fn get_candles(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        let query = format!("symbol={}&interval={}&limit={}", symbol, interval.as_str(), limit);
        let body = self.public_get("/fapi/v1/klines", &query).await?;
        let rows: Vec<Vec<Value>> = serde_json::from_str(&body)?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn get_available_margin(&self) -> Result<f64> {
        parse_decimal_str(&self.account().await?.available_balance)
    }

    async fn get_total_balance(&self) -> Result<f64> {
        parse_decimal_str(&self.account().await?.wallet_balance)
    }

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        if let Some(cached) = self.filters.read().await.get(symbol) {
            return Ok(*cached);
        }
        let filters = self.fetch_filters(symbol).await?;
        tracing::debug!(
            symbol = %symbol,
            "Filters: lot {} tick {}",
            filters.min_lot_size,
            filters.price_tick_size
        );
        self.filters.write().await.insert(symbol.to_string(), filters);
        Ok(filters)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.signed(
            Method::POST,
            "/fapi/v1/leverage",
            &[("symbol", symbol.to_string()), ("leverage", leverage.to_string())],
        )
        .await?;
        tracing::info!(symbol = %symbol, "Set leverage {}x", leverage);
        Ok(())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .public_get("/fapi/v1/premiumIndex", &format!("symbol={}", symbol))
            .await?;
        let index: PremiumIndex = serde_json::from_str(&body)?;
        parse_decimal_str(&index.mark_price)
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        let mut params: Vec<(&str, String)> = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order_type_code(order.order_type).to_string()),
            ("newClientOrderId", format!("mb-{}", Uuid::new_v4().simple())),
        ];
        if let Some(quantity) = order.quantity {
            params.push(("quantity", quantity.to_string()));
        }
        if let Some(stop_price) = order.stop_price {
            params.push(("stopPrice", stop_price.to_string()));
            params.push(("workingType", "MARK_PRICE".to_string()));
        }
        if order.close_position {
            params.push(("closePosition", "true".to_string()));
        }

        let body = self.signed(Method::POST, "/fapi/v1/order", &params).await?;
        let ack: OrderAck = serde_json::from_str(&body)?;
        let order_id = ack.order_id.ok_or_else(|| {
            BotError::ExchangeRejection(format!("order response without orderId: {}", body))
        })?;
        tracing::info!(
            symbol = %order.symbol,
            "Order {} accepted: {} {}",
            order_id,
            order.side.as_str(),
            order_type_code(order.order_type)
        );
        Ok(order_id)
    }

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let body = self
            .signed(Method::GET, "/fapi/v1/openOrders", &[("symbol", symbol.to_string())])
            .await?;
        let resting: Vec<RestingOrder> = serde_json::from_str(&body)?;

        let mut orders = Vec::with_capacity(resting.len());
        for order in resting {
            let Some(order_type) = parse_order_type(&order.order_type) else {
                tracing::debug!(symbol = %symbol, "Ignoring resting {} order {}", order.order_type, order.order_id);
                continue;
            };
            let side = if order.side == "BUY" { OrderSide::Buy } else { OrderSide::Sell };
            let stop_price = order
                .stop_price
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|p| *p > 0.0);
            orders.push(OpenOrder {
                order_id: order.order_id,
                symbol: order.symbol,
                side,
                order_type,
                stop_price,
            });
        }
        Ok(orders)
    }

    async fn cancel_order(&self, symbol: &str, order_id: OrderId) -> Result<()> {
        self.signed(
            Method::DELETE,
            "/fapi/v1/order",
            &[("symbol", symbol.to_string()), ("orderId", order_id.to_string())],
        )
        .await?;
        tracing::debug!(symbol = %symbol, "Cancelled order {}", order_id);
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<ExchangePosition> {
        let body = self
            .signed(Method::GET, "/fapi/v2/positionRisk", &[("symbol", symbol.to_string())])
            .await?;
        let risks: Vec<PositionRisk> = serde_json::from_str(&body)?;

        for risk in &risks {
            let amount = parse_decimal_str(&risk.position_amt)?;
            if amount != 0.0 {
                return Ok(ExchangePosition {
                    amount,
                    entry_price: parse_decimal_str(&risk.entry_price)?,
                });
            }
        }
        Ok(ExchangePosition {
            amount: 0.0,
            entry_price: 0.0,
        })
    }
}
