use super::Strategy;
use crate::error::BotError;
use crate::models::{Candle, Interval, Side};
use crate::Result;

/// N-candle channel breakout on the hourly chart
///
/// The channel is the high/low range of the `channel` candles preceding the
/// newest one. A close above the channel high is a LONG setup, a close
/// below the channel low is a SHORT setup.
#[derive(Debug, Clone)]
pub struct TurtleStrategy {
    channel: usize,
}

impl TurtleStrategy {
    pub fn new(channel: usize) -> Self {
        Self { channel }
    }

    /// (high, low) of the channel window, excluding the newest candle
    pub fn channel_bounds(&self, candles: &[Candle]) -> Option<(f64, f64)> {
        if candles.len() < self.channel + 1 {
            return None;
        }
        let window = &candles[candles.len() - self.channel - 1..candles.len() - 1];
        let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        Some((high, low))
    }
}

impl Default for TurtleStrategy {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Strategy for TurtleStrategy {
    fn name(&self) -> &str {
        "turtle"
    }

    fn interval(&self) -> Interval {
        Interval::OneHour
    }

    fn candles_requested(&self) -> usize {
        self.channel + 1
    }

    fn min_candles_required(&self) -> usize {
        self.channel + 1
    }

    fn detect_setup(&self, candles: &[Candle]) -> Result<Option<Side>> {
        let (high, low) = self.channel_bounds(candles).ok_or_else(|| {
            BotError::DataInsufficient(format!(
                "{} candles for breakout channel, need {}",
                candles.len(),
                self.min_candles_required()
            ))
        })?;

        let Some(last) = candles.last() else {
            return Ok(None);
        };

        if last.close > high {
            Ok(Some(Side::Long))
        } else if last.close < low {
            Ok(Some(Side::Short))
        } else {
            Ok(None)
        }
    }
}
