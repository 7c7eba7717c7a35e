use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick, newest last in every series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle interval requested from the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    ThreeMinutes,
    FiveMinutes,
    OneHour,
}

impl Interval {
    /// Venue wire code ("3m", "5m", "1h")
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::OneHour => "1h",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens a position in this direction
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position in this direction
    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// Side implied by a signed venue position amount
    pub fn from_signed_amount(amount: f64) -> Option<Side> {
        if amount > 0.0 {
            Some(Side::Long)
        } else if amount < 0.0 {
            Some(Side::Short)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

/// Which entry directions a symbol is allowed to trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
    Both,
}

impl Direction {
    pub fn allows(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (Direction::Both, _) | (Direction::Long, Side::Long) | (Direction::Short, Side::Short)
        )
    }
}

/// Signal policy configured for a symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrategyKind {
    Scalper,
    Turtle,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Scalper => f.write_str("scalper"),
            StrategyKind::Turtle => f.write_str("turtle"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderType {
    Market,
    Stop,
    TakeProfit,
}

/// Venue-assigned order identifier
pub type OrderId = i64;

/// Order submission request
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Set for market entries
    pub quantity: Option<f64>,
    /// Trigger price for stop / take-profit orders
    pub stop_price: Option<f64>,
    /// Close the whole position on trigger regardless of its size
    pub close_position: bool,
}

impl OrderRequest {
    pub fn market_entry(symbol: &str, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.entry_order_side(),
            order_type: OrderType::Market,
            quantity: Some(quantity),
            stop_price: None,
            close_position: false,
        }
    }

    pub fn protective_stop(symbol: &str, position_side: Side, stop_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: position_side.exit_order_side(),
            order_type: OrderType::Stop,
            quantity: None,
            stop_price: Some(stop_price),
            close_position: true,
        }
    }

    pub fn take_profit(symbol: &str, position_side: Side, trigger_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: position_side.exit_order_side(),
            order_type: OrderType::TakeProfit,
            quantity: None,
            stop_price: Some(trigger_price),
            close_position: true,
        }
    }
}

/// Resting order as listed by the venue
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub stop_price: Option<f64>,
}

/// Venue truth about a symbol's position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangePosition {
    /// Positive = long, negative = short, zero = flat
    pub amount: f64,
    pub entry_price: f64,
}

impl ExchangePosition {
    pub fn is_flat(&self) -> bool {
        self.amount == 0.0
    }
}

/// Venue-imposed increments for a symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolFilters {
    pub min_lot_size: f64,
    pub price_tick_size: f64,
}

impl Default for SymbolFilters {
    fn default() -> Self {
        Self {
            min_lot_size: 0.001,
            price_tick_size: 0.01,
        }
    }
}
