// Technical indicators module
// RSI and simple moving averages over closing prices

pub mod moving_average;
pub mod rsi;

pub use moving_average::{calculate_sma, sma_pair};
pub use rsi::calculate_rsi;

use crate::models::Candle;

/// Closing prices of a candle series, oldest first
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
