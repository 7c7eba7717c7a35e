//! Paper trading venue.
//!
//! Market data comes from a real venue; account, positions and resting
//! orders are simulated locally. Market orders fill at the mark price,
//! close-position stop and take-profit orders trigger against the mark
//! price whenever position truth is queried.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::TradingVenue;
use crate::error::BotError;
use crate::models::{
    Candle, ExchangePosition, Interval, OpenOrder, OrderId, OrderRequest, OrderSide, OrderType,
    Side, SymbolFilters,
};
use crate::Result;

const DEFAULT_LEVERAGE: u32 = 1;

#[derive(Debug, Default)]
struct PaperBook {
    /// Realized wallet balance
    balance: f64,
    positions: HashMap<String, ExchangePosition>,
    orders: HashMap<String, Vec<OpenOrder>>,
    leverage: HashMap<String, u32>,
    next_id: OrderId,
}

impl PaperBook {
    fn margin_in_use(&self) -> f64 {
        self.positions
            .iter()
            .map(|(symbol, p)| {
                let leverage = self.leverage.get(symbol).copied().unwrap_or(DEFAULT_LEVERAGE);
                p.amount.abs() * p.entry_price / leverage.max(1) as f64
            })
            .sum()
    }

    /// Apply a fill of `signed_qty` at `price`, realizing PnL on any reduction
    fn fill(&mut self, symbol: &str, signed_qty: f64, price: f64) {
        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert(ExchangePosition {
                amount: 0.0,
                entry_price: 0.0,
            });

        if position.amount == 0.0 {
            position.amount = signed_qty;
            position.entry_price = price;
            return;
        }
        if position.amount.signum() == signed_qty.signum() {
            let new_amount = position.amount + signed_qty;
            position.entry_price = (position.amount.abs() * position.entry_price
                + signed_qty.abs() * price)
                / new_amount.abs();
            position.amount = new_amount;
            return;
        }

        let closed = signed_qty.abs().min(position.amount.abs());
        let pnl = (price - position.entry_price) * closed * position.amount.signum();
        self.balance += pnl;

        let remaining = position.amount + signed_qty;
        if remaining.abs() < 1e-12 {
            self.positions.remove(symbol);
        } else if remaining.signum() == position.amount.signum() {
            position.amount = remaining;
        } else {
            // Flipped through zero
            position.amount = remaining;
            position.entry_price = price;
        }
    }

    /// Trigger resting close-position orders crossed by `mark`
    fn trigger(&mut self, symbol: &str, mark: f64) {
        let Some(position) = self.positions.get(symbol).copied() else {
            return;
        };
        let Some(side) = Side::from_signed_amount(position.amount) else {
            return;
        };

        let triggered = self.orders.get(symbol).and_then(|orders| {
            orders.iter().find_map(|o| {
                let level = o.stop_price?;
                let hit = match (o.order_type, side) {
                    (OrderType::Stop, Side::Long) | (OrderType::TakeProfit, Side::Short) => mark <= level,
                    (OrderType::Stop, Side::Short) | (OrderType::TakeProfit, Side::Long) => mark >= level,
                    (OrderType::Market, _) => false,
                };
                hit.then_some((o.order_id, o.order_type, level))
            })
        });

        if let Some((order_id, order_type, level)) = triggered {
            tracing::info!(
                symbol = %symbol,
                "📄 Paper {:?} {} triggered at mark {}",
                order_type,
                order_id,
                mark
            );
            self.fill(symbol, -position.amount, level);
            if let Some(orders) = self.orders.get_mut(symbol) {
                orders.retain(|o| o.order_id != order_id);
            }
        }
    }
}

/// Simulated account on top of real market data
pub struct PaperVenue {
    market: Arc<dyn TradingVenue>,
    book: Mutex<PaperBook>,
}

impl PaperVenue {
    pub fn new(market: Arc<dyn TradingVenue>, starting_balance: f64) -> Self {
        tracing::info!("📄 Paper trading with {:.2} USDT", starting_balance);
        Self {
            market,
            book: Mutex::new(PaperBook {
                balance: starting_balance,
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn book(&self) -> Result<MutexGuard<'_, PaperBook>> {
        self.book
            .lock()
            .map_err(|_| BotError::InconsistentState("paper book lock poisoned".to_string()))
    }
}

#[async_trait]
impl TradingVenue for PaperVenue {
    async fn get_candles(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        self.market.get_candles(symbol, interval, limit).await
    }

    async fn get_available_margin(&self) -> Result<f64> {
        let book = self.book()?;
        Ok((book.balance - book.margin_in_use()).max(0.0))
    }

    async fn get_total_balance(&self) -> Result<f64> {
        Ok(self.book()?.balance)
    }

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        self.market.get_symbol_filters(symbol).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.book()?.leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<f64> {
        self.market.get_mark_price(symbol).await
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        match order.order_type {
            OrderType::Market => {
                let quantity = order
                    .quantity
                    .filter(|q| *q > 0.0)
                    .ok_or_else(|| BotError::ExchangeRejection("market order without quantity".into()))?;
                let price = self.market.get_mark_price(&order.symbol).await?;
                let signed = match order.side {
                    OrderSide::Buy => quantity,
                    OrderSide::Sell => -quantity,
                };

                let mut book = self.book()?;
                let id = book.next_id;
                book.next_id += 1;
                book.fill(&order.symbol, signed, price);
                tracing::info!(
                    symbol = %order.symbol,
                    "📄 Paper fill {} {} @ {}",
                    order.side.as_str(),
                    quantity,
                    price
                );
                Ok(id)
            }
            OrderType::Stop | OrderType::TakeProfit => {
                let stop_price = order
                    .stop_price
                    .filter(|p| *p > 0.0)
                    .ok_or_else(|| BotError::ExchangeRejection("trigger order without stopPrice".into()))?;
                if !order.close_position {
                    return Err(BotError::ExchangeRejection(
                        "paper venue only supports closePosition triggers".into(),
                    ));
                }

                let mut book = self.book()?;
                let id = book.next_id;
                book.next_id += 1;
                book.orders.entry(order.symbol.clone()).or_default().push(OpenOrder {
                    order_id: id,
                    symbol: order.symbol.clone(),
                    side: order.side,
                    order_type: order.order_type,
                    stop_price: Some(stop_price),
                });
                Ok(id)
            }
        }
    }

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        Ok(self.book()?.orders.get(symbol).cloned().unwrap_or_default())
    }

    async fn cancel_order(&self, symbol: &str, order_id: OrderId) -> Result<()> {
        let mut book = self.book()?;
        let orders = book.orders.entry(symbol.to_string()).or_default();
        let before = orders.len();
        orders.retain(|o| o.order_id != order_id);
        if orders.len() == before {
            return Err(BotError::ExchangeRejection(format!("unknown order {}", order_id)));
        }
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<ExchangePosition> {
        let mark = self.market.get_mark_price(symbol).await?;
        let mut book = self.book()?;
        book.trigger(symbol, mark);
        Ok(book.positions.get(symbol).copied().unwrap_or(ExchangePosition {
            amount: 0.0,
            entry_price: 0.0,
        }))
    }
}
