// Trading strategy module
pub mod evaluator;
pub mod latch;
pub mod scalper;
pub mod turtle;

pub use evaluator::{SignalEvaluator, SignalOutcome};
pub use latch::{LatchState, RsiLatch};
pub use scalper::ScalperStrategy;
pub use turtle::TurtleStrategy;

use crate::models::{Candle, Interval, Side, StrategyKind};
use crate::Result;

/// RSI trigger is read on the hourly chart
pub const RSI_INTERVAL: Interval = Interval::OneHour;
pub const RSI_PERIOD: usize = 14;
pub const RSI_CANDLES: usize = 100;

/// Base trait for entry setups
///
/// A strategy only looks at price structure. RSI latches and the configured
/// direction are applied by the evaluator on top of `detect_setup`.
pub trait Strategy: Send + Sync {
    /// Get strategy name
    fn name(&self) -> &str;

    /// Interval of the series `detect_setup` expects
    fn interval(&self) -> Interval;

    /// How many candles to request from the venue
    fn candles_requested(&self) -> usize;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;

    /// Side of the setup present at the newest bar, if any
    ///
    /// Fails with `DataInsufficient` when the series is too short.
    fn detect_setup(&self, candles: &[Candle]) -> Result<Option<Side>>;
}

/// Strategy implementation for a configured kind
pub fn for_kind(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Scalper => Box::new(ScalperStrategy::default()),
        StrategyKind::Turtle => Box::new(TurtleStrategy::default()),
    }
}
