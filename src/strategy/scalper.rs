use super::Strategy;
use crate::error::BotError;
use crate::indicators::{closes, sma_pair};
use crate::models::{Candle, Interval, Side};
use crate::Result;

/// Fast/slow moving-average crossover on the 3-minute chart
///
/// A LONG setup is the fast MA moving from strictly below the slow MA on the
/// previous bar to strictly above it on the current bar; SHORT is the mirror.
#[derive(Debug, Clone)]
pub struct ScalperStrategy {
    fast_period: usize,
    slow_period: usize,
    candles_requested: usize,
}

impl ScalperStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            candles_requested: 100,
        }
    }
}

impl Default for ScalperStrategy {
    fn default() -> Self {
        Self::new(9, 21)
    }
}

impl Strategy for ScalperStrategy {
    fn name(&self) -> &str {
        "scalper"
    }

    fn interval(&self) -> Interval {
        Interval::ThreeMinutes
    }

    fn candles_requested(&self) -> usize {
        self.candles_requested
    }

    fn min_candles_required(&self) -> usize {
        // Slow MA at both the previous and the current bar
        self.slow_period + 1
    }

    fn detect_setup(&self, candles: &[Candle]) -> Result<Option<Side>> {
        if candles.len() < self.min_candles_required() {
            return Err(BotError::DataInsufficient(format!(
                "{} candles for MA crossover, need {}",
                candles.len(),
                self.min_candles_required()
            )));
        }

        let prices = closes(candles);
        let insufficient = || BotError::DataInsufficient("moving averages unavailable".to_string());
        let (fast_prev, fast_curr) = sma_pair(&prices, self.fast_period).ok_or_else(insufficient)?;
        let (slow_prev, slow_curr) = sma_pair(&prices, self.slow_period).ok_or_else(insufficient)?;

        if fast_prev < slow_prev && fast_curr > slow_curr {
            return Ok(Some(Side::Long));
        }
        if fast_prev > slow_prev && fast_curr < slow_curr {
            return Ok(Some(Side::Short));
        }
        Ok(None)
    }
}
