use crate::models::Side;

/// RSI level at or below which the LONG latch is set
pub const RSI_OVERSOLD: f64 = 30.0;
/// RSI level at or above which the SHORT latch is set
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// State of one direction's RSI trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatchState {
    #[default]
    NotTriggered,
    /// RSI crossed the threshold; holds until a successful entry consumes it
    Triggered,
    /// Consumed by an entry; behaves as not triggered until RSI re-arms it
    Consumed,
}

/// Per-symbol pair of independent RSI latches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RsiLatch {
    long: LatchState,
    short: LatchState,
}

impl RsiLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fresh RSI reading in
    ///
    /// Only ever arms a latch. An opposite reading never clears the other
    /// direction. Returns the side that was newly armed, if any.
    pub fn observe(&mut self, rsi: f64) -> Option<Side> {
        if rsi <= RSI_OVERSOLD {
            let newly = self.long != LatchState::Triggered;
            self.long = LatchState::Triggered;
            return newly.then_some(Side::Long);
        }
        if rsi >= RSI_OVERBOUGHT {
            let newly = self.short != LatchState::Triggered;
            self.short = LatchState::Triggered;
            return newly.then_some(Side::Short);
        }
        None
    }

    pub fn is_armed(&self, side: Side) -> bool {
        self.state(side) == LatchState::Triggered
    }

    pub fn state(&self, side: Side) -> LatchState {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    /// Clear one direction after a successful entry in that direction
    pub fn consume(&mut self, side: Side) {
        match side {
            Side::Long => self.long = LatchState::Consumed,
            Side::Short => self.short = LatchState::Consumed,
        }
    }
}
