// Position state, entry saga, trailing stops and venue reconciliation
pub mod executor;
pub mod position_manager;
pub mod reconciler;
pub mod trailing_stop;

pub use executor::{EntryOutcome, EntryReport, OrderExecutor, SagaStep, StepStatus};
pub use position_manager::{Position, PositionStatus, PositionStore, SymbolState};
pub use reconciler::{ClosureOutcome, PositionReconciler, ResyncOutcome};
pub use trailing_stop::{RatchetOutcome, TrailingStopEngine};
