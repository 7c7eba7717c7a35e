use std::sync::Arc;

use crate::api::TradingVenue;
use crate::config::{ConfigStore, SymbolConfig};
use crate::error::BotError;
use crate::execution::{
    ClosureOutcome, OrderExecutor, PositionReconciler, PositionStore, RatchetOutcome,
    ResyncOutcome, TrailingStopEngine,
};
use crate::notify::{Notification, Notifier, SymbolRisk};
use crate::scheduler::TaskKind;
use crate::strategy::{SignalEvaluator, SignalOutcome};
use crate::Result;

/// Per-symbol units of work
///
/// Each unit takes the symbol's lock, runs one component against the venue
/// and releases the lock. Units for different symbols share nothing but the
/// venue client and the notifier.
pub struct Engine {
    venue: Arc<dyn TradingVenue>,
    notifier: Arc<dyn Notifier>,
    configs: ConfigStore,
    store: PositionStore,
    evaluator: SignalEvaluator,
    trailing: TrailingStopEngine,
    reconciler: PositionReconciler,
}

impl Engine {
    pub fn new(venue: Arc<dyn TradingVenue>, notifier: Arc<dyn Notifier>, configs: ConfigStore) -> Self {
        let store = PositionStore::new(configs.symbols());
        let executor = OrderExecutor::new(venue.clone(), notifier.clone());
        Self {
            evaluator: SignalEvaluator::new(venue.clone(), executor),
            trailing: TrailingStopEngine::new(venue.clone(), notifier.clone()),
            reconciler: PositionReconciler::new(venue.clone(), notifier.clone()),
            venue,
            notifier,
            configs,
            store,
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.configs.symbols().map(str::to_string).collect()
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    fn config(&self, symbol: &str) -> Result<&SymbolConfig> {
        self.configs
            .get(symbol)
            .ok_or_else(|| BotError::Configuration(format!("{} is not a configured symbol", symbol)))
    }

    /// Dispatch one scheduled unit of work
    pub async fn run_unit(&self, kind: TaskKind, symbol: &str) -> Result<()> {
        match kind {
            TaskKind::SignalCheck => self.check_signals(symbol).await.map(drop),
            TaskKind::TrailingStop => self.update_trailing_stop(symbol).await.map(drop),
            TaskKind::PositionMonitor => self.monitor_position(symbol).await.map(drop),
            TaskKind::FullResync => self.resync_position(symbol).await.map(drop),
            TaskKind::OrphanCleanup => self.cleanup_orphans(symbol).await.map(drop),
        }
    }

    pub async fn check_signals(&self, symbol: &str) -> Result<SignalOutcome> {
        let config = self.config(symbol)?;
        let mut state = self.store.lock(symbol).await?;
        if state.position.is_open() {
            tracing::debug!(symbol = %symbol, "Position open, signal check skipped");
            return Ok(SignalOutcome::PositionOpen);
        }

        let outcome = self.evaluator.evaluate(symbol, config, &mut state).await?;
        match &outcome {
            SignalOutcome::Blocked { side, reason } => {
                tracing::info!(symbol = %symbol, "⏸️  {} setup ignored: {}", side, reason)
            }
            SignalOutcome::EntryFailed(report) => {
                tracing::warn!(symbol = %symbol, "Entry failed: {:?}", report.outcome)
            }
            _ => {}
        }
        Ok(outcome)
    }

    pub async fn update_trailing_stop(&self, symbol: &str) -> Result<RatchetOutcome> {
        let config = self.config(symbol)?;
        let mut state = self.store.lock(symbol).await?;
        if !state.position.is_open() {
            return Ok(RatchetOutcome::NotOpen);
        }
        self.trailing.update(symbol, config, &mut state.position).await
    }

    pub async fn monitor_position(&self, symbol: &str) -> Result<ClosureOutcome> {
        let mut state = self.store.lock(symbol).await?;
        self.reconciler.detect_closure(symbol, &mut state.position).await
    }

    pub async fn resync_position(&self, symbol: &str) -> Result<ResyncOutcome> {
        let mut state = self.store.lock(symbol).await?;
        self.reconciler.resync(symbol, &mut state.position).await
    }

    pub async fn cleanup_orphans(&self, symbol: &str) -> Result<usize> {
        let state = self.store.lock(symbol).await?;
        self.reconciler.cleanup_orphans(symbol, &state.position).await
    }

    /// Resync every symbol once, sequentially; returns adopted count
    pub async fn resync_all(&self) -> usize {
        let mut adopted = 0;
        for symbol in self.symbols() {
            match self.resync_position(&symbol).await {
                Ok(ResyncOutcome::Adopted { .. }) => adopted += 1,
                Ok(_) => {}
                Err(e) => self.report_error(TaskKind::FullResync, &symbol, &e).await,
            }
        }
        adopted
    }

    /// Balance and per-symbol risk overview, logged and sent to the operator
    pub async fn startup_summary(&self) -> Result<Notification> {
        let total_balance = self.venue.get_total_balance().await?;
        let available_margin = self.venue.get_available_margin().await?;
        let symbols: Vec<SymbolRisk> = self
            .configs
            .iter()
            .map(|(symbol, config)| SymbolRisk::new(symbol, config))
            .collect();

        let summary = Notification::StartupSummary {
            total_balance,
            available_margin,
            symbols,
        };
        for line in summary.to_string().lines() {
            tracing::info!("{}", line);
        }
        self.notifier.send(&summary.to_string()).await;
        Ok(summary)
    }

    /// Task-boundary error handling: log always, alert on dangerous classes
    pub async fn report_error(&self, kind: TaskKind, symbol: &str, error: &BotError) {
        match error {
            BotError::DataInsufficient(_) => {
                tracing::debug!(symbol = %symbol, "[{}] {}", kind, error)
            }
            BotError::TransientNetwork(_) => {
                tracing::warn!(symbol = %symbol, "⚠️  [{}] {}", kind, error)
            }
            _ => tracing::error!(symbol = %symbol, "❌ [{}] {}", kind, error),
        }
        if error.should_alert() {
            self.notifier
                .notify(&Notification::alert(symbol, format!("[{}] {}", kind, error)))
                .await;
        }
    }
}
