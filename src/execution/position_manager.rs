use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::BotError;
use crate::models::Side;
use crate::strategy::RsiLatch;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Flat,
    Open,
}

/// Local belief about one symbol's position
///
/// OPEN always carries a side and a positive quantity; FLAT carries neither.
/// The only way in or out of OPEN is through the transition methods below.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    status: PositionStatus,
    side: Option<Side>,
    quantity: f64,
    stop_loss: Option<f64>,
    entry_price: Option<f64>,
    opened_at: Option<DateTime<Utc>>,
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

impl Position {
    pub fn flat() -> Self {
        Self {
            status: PositionStatus::Flat,
            side: None,
            quantity: 0.0,
            stop_loss: None,
            entry_price: None,
            opened_at: None,
        }
    }

    /// Position that is already OPEN (startup adoption, tests)
    pub fn opened(side: Side, quantity: f64, entry_price: f64, stop_loss: Option<f64>) -> Result<Self> {
        let mut position = Self::flat();
        position.open(side, quantity, entry_price, stop_loss)?;
        Ok(position)
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Unadjusted protective level; `None` while no stop is known
    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.entry_price
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// FLAT → OPEN
    pub fn open(
        &mut self,
        side: Side,
        quantity: f64,
        entry_price: f64,
        stop_loss: Option<f64>,
    ) -> Result<()> {
        if quantity <= 0.0 || !quantity.is_finite() {
            return Err(BotError::InconsistentState(format!(
                "cannot open position with quantity {}",
                quantity
            )));
        }
        self.status = PositionStatus::Open;
        self.side = Some(side);
        self.quantity = quantity;
        self.stop_loss = stop_loss;
        self.entry_price = (entry_price > 0.0).then_some(entry_price);
        self.opened_at = Some(Utc::now());
        Ok(())
    }

    /// Venue quantity differs from ours; side unchanged
    pub fn update_quantity(&mut self, quantity: f64) -> Result<()> {
        if !self.is_open() || quantity <= 0.0 {
            return Err(BotError::InconsistentState(format!(
                "cannot set quantity {} on {:?} position",
                quantity, self.status
            )));
        }
        self.quantity = quantity;
        Ok(())
    }

    /// Record a new protective level; only meaningful while OPEN
    pub fn set_stop_loss(&mut self, stop: f64) -> Result<()> {
        if !self.is_open() {
            return Err(BotError::InconsistentState(
                "stop loss update on a FLAT position".to_string(),
            ));
        }
        self.stop_loss = Some(stop);
        Ok(())
    }

    /// OPEN → FLAT, clearing everything
    pub fn reset(&mut self) {
        *self = Self::flat();
    }
}

/// Everything the engine remembers about one symbol
#[derive(Debug, Clone, Default)]
pub struct SymbolState {
    pub position: Position,
    pub latch: RsiLatch,
}

/// Per-symbol state behind one async mutex per symbol
///
/// Every unit of work holds its symbol's lock for its whole duration,
/// including network calls, so units for the same symbol are serialized
/// while different symbols proceed independently.
#[derive(Debug, Default)]
pub struct PositionStore {
    slots: HashMap<String, Arc<Mutex<SymbolState>>>,
}

impl PositionStore {
    /// One FLAT slot per configured symbol
    pub fn new<'a>(symbols: impl IntoIterator<Item = &'a str>) -> Self {
        let slots = symbols
            .into_iter()
            .map(|s| (s.to_string(), Arc::new(Mutex::new(SymbolState::default()))))
            .collect();
        Self { slots }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.slots.contains_key(symbol)
    }

    /// Acquire the symbol's lock; the guard can move into a spawned task
    pub async fn lock(&self, symbol: &str) -> Result<OwnedMutexGuard<SymbolState>> {
        let slot = self.slots.get(symbol).ok_or_else(|| {
            BotError::Configuration(format!("{} is not a configured symbol", symbol))
        })?;
        Ok(Arc::clone(slot).lock_owned().await)
    }

    /// Copy of the symbol's current state
    pub async fn snapshot(&self, symbol: &str) -> Option<SymbolState> {
        let slot = self.slots.get(symbol)?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    /// Symbols currently believed OPEN, sorted
    pub async fn open_positions(&self) -> Vec<(String, Position)> {
        let mut open = Vec::new();
        for (symbol, slot) in &self.slots {
            let state = slot.lock().await;
            if state.position.is_open() {
                open.push((symbol.clone(), state.position.clone()));
            }
        }
        open.sort_by(|a, b| a.0.cmp(&b.0));
        open
    }
}
