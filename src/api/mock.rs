//! Scripted in-memory venue for unit tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::TradingVenue;
use crate::error::BotError;
use crate::models::{
    Candle, ExchangePosition, Interval, OpenOrder, OrderId, OrderRequest, OrderSide, OrderType,
    SymbolFilters,
};
use crate::Result;

#[derive(Default)]
struct MockState {
    candles: HashMap<(String, Interval), Vec<Candle>>,
    mark_prices: HashMap<String, f64>,
    available_margin: f64,
    total_balance: f64,
    filters: HashMap<String, SymbolFilters>,
    positions: HashMap<String, ExchangePosition>,
    open_orders: HashMap<String, Vec<OpenOrder>>,
    submitted: Vec<OrderRequest>,
    cancelled: Vec<(String, OrderId)>,
    leverage_calls: Vec<(String, u32)>,
    rejected_types: HashSet<OrderType>,
    fail_leverage: bool,
    fail_positions: bool,
    next_id: OrderId,
}

pub(crate) struct MockVenue {
    state: Mutex<MockState>,
}

/// Candles with explicit (high, low, close), one minute apart
pub(crate) fn candles_hlc(bars: &[(f64, f64, f64)]) -> Vec<Candle> {
    let start = Utc::now() - Duration::minutes(bars.len() as i64);
    bars.iter()
        .enumerate()
        .map(|(i, &(high, low, close))| Candle {
            timestamp: start + Duration::minutes(i as i64),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        })
        .collect()
}

/// Flat candles at the given closes
pub(crate) fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let bars: Vec<(f64, f64, f64)> = closes.iter().map(|&c| (c, c, c)).collect();
    candles_hlc(&bars)
}

impl MockVenue {
    pub(crate) fn new() -> Self {
        let state = MockState {
            available_margin: 1000.0,
            total_balance: 1000.0,
            next_id: 1,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn set_candles(&self, symbol: &str, interval: Interval, candles: Vec<Candle>) {
        self.state
            .lock()
            .unwrap()
            .candles
            .insert((symbol.to_string(), interval), candles);
    }

    pub(crate) fn set_mark_price(&self, symbol: &str, price: f64) {
        self.state.lock().unwrap().mark_prices.insert(symbol.to_string(), price);
    }

    pub(crate) fn set_margin(&self, available: f64, total: f64) {
        let mut state = self.state.lock().unwrap();
        state.available_margin = available;
        state.total_balance = total;
    }

    pub(crate) fn set_filters(&self, symbol: &str, filters: SymbolFilters) {
        self.state.lock().unwrap().filters.insert(symbol.to_string(), filters);
    }

    pub(crate) fn set_position(&self, symbol: &str, amount: f64, entry_price: f64) {
        self.state
            .lock()
            .unwrap()
            .positions
            .insert(symbol.to_string(), ExchangePosition { amount, entry_price });
    }

    pub(crate) fn add_open_order(&self, symbol: &str, order_type: OrderType) -> OrderId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.open_orders.entry(symbol.to_string()).or_default().push(OpenOrder {
            order_id: id,
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            order_type,
            stop_price: None,
        });
        id
    }

    pub(crate) fn reject(&self, order_type: OrderType) {
        self.state.lock().unwrap().rejected_types.insert(order_type);
    }

    pub(crate) fn fail_leverage(&self) {
        self.state.lock().unwrap().fail_leverage = true;
    }

    pub(crate) fn fail_positions(&self) {
        self.state.lock().unwrap().fail_positions = true;
    }

    pub(crate) fn submitted(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub(crate) fn cancelled(&self) -> Vec<(String, OrderId)> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub(crate) fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().leverage_calls.clone()
    }

    pub(crate) fn resting_orders(&self, symbol: &str) -> Vec<OpenOrder> {
        self.state
            .lock()
            .unwrap()
            .open_orders
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TradingVenue for MockVenue {
    async fn get_candles(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        let state = self.state.lock().unwrap();
        let candles = state
            .candles
            .get(&(symbol.to_string(), interval))
            .cloned()
            .unwrap_or_default();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn get_available_margin(&self) -> Result<f64> {
        Ok(self.state.lock().unwrap().available_margin)
    }

    async fn get_total_balance(&self) -> Result<f64> {
        Ok(self.state.lock().unwrap().total_balance)
    }

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .filters
            .get(symbol)
            .copied()
            .unwrap_or_default())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.leverage_calls.push((symbol.to_string(), leverage));
        if state.fail_leverage {
            return Err(BotError::ExchangeRejection("leverage not modified".to_string()));
        }
        Ok(())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<f64> {
        self.state
            .lock()
            .unwrap()
            .mark_prices
            .get(symbol)
            .copied()
            .ok_or_else(|| BotError::TransientNetwork(format!("no price for {}", symbol)))
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        let mut state = self.state.lock().unwrap();
        if state.rejected_types.contains(&order.order_type) {
            return Err(BotError::ExchangeRejection(format!(
                "{:?} order rejected",
                order.order_type
            )));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.submitted.push(order.clone());

        if order.order_type == OrderType::Market {
            let price = state.mark_prices.get(&order.symbol).copied().unwrap_or(0.0);
            let qty = order.quantity.unwrap_or(0.0);
            let signed = match order.side {
                OrderSide::Buy => qty,
                OrderSide::Sell => -qty,
            };
            let position = state
                .positions
                .entry(order.symbol.clone())
                .or_insert(ExchangePosition {
                    amount: 0.0,
                    entry_price: 0.0,
                });
            position.amount += signed;
            position.entry_price = price;
        } else {
            state
                .open_orders
                .entry(order.symbol.clone())
                .or_default()
                .push(OpenOrder {
                    order_id: id,
                    symbol: order.symbol.clone(),
                    side: order.side,
                    order_type: order.order_type,
                    stop_price: order.stop_price,
                });
        }
        Ok(id)
    }

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .open_orders
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn cancel_order(&self, symbol: &str, order_id: OrderId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(orders) = state.open_orders.get_mut(symbol) {
            orders.retain(|o| o.order_id != order_id);
        }
        state.cancelled.push((symbol.to_string(), order_id));
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<ExchangePosition> {
        let state = self.state.lock().unwrap();
        if state.fail_positions {
            return Err(BotError::TransientNetwork("positionRisk timed out".to_string()));
        }
        Ok(state
            .positions
            .get(symbol)
            .copied()
            .unwrap_or(ExchangePosition {
                amount: 0.0,
                entry_price: 0.0,
            }))
    }
}
