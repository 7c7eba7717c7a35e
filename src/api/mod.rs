pub mod binance;
pub mod paper;

#[cfg(test)]
pub(crate) mod mock;

pub use binance::BinanceFuturesClient;
pub use paper::PaperVenue;

use async_trait::async_trait;

use crate::models::{
    Candle, ExchangePosition, Interval, OpenOrder, OrderId, OrderRequest, SymbolFilters,
};
use crate::Result;

/// Capabilities the engine consumes from a derivatives venue
///
/// Every call is a network round trip bounded by the client's timeout.
/// Implementations map transport failures to `TransientNetwork` and
/// refusals to `ExchangeRejection`.
#[async_trait]
pub trait TradingVenue: Send + Sync {
    /// Candles for a symbol, oldest first, newest last
    async fn get_candles(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>>;

    /// Quote-currency margin available for new positions
    async fn get_available_margin(&self) -> Result<f64>;

    /// Quote-currency wallet balance
    async fn get_total_balance(&self) -> Result<f64>;

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    async fn get_mark_price(&self, symbol: &str) -> Result<f64>;

    /// Submit an order; the venue must answer with an order id
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId>;

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;

    async fn cancel_order(&self, symbol: &str, order_id: OrderId) -> Result<()>;

    /// Signed position amount and entry price
    async fn get_position(&self, symbol: &str) -> Result<ExchangePosition>;
}
