use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::ScheduleConfig;
use crate::engine::Engine;
use crate::Result;

/// The five periodic task kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    SignalCheck,
    TrailingStop,
    PositionMonitor,
    FullResync,
    OrphanCleanup,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::SignalCheck,
        TaskKind::TrailingStop,
        TaskKind::PositionMonitor,
        TaskKind::FullResync,
        TaskKind::OrphanCleanup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::SignalCheck => "signal-check",
            TaskKind::TrailingStop => "trailing-stop",
            TaskKind::PositionMonitor => "position-monitor",
            TaskKind::FullResync => "full-resync",
            TaskKind::OrphanCleanup => "orphan-cleanup",
        }
    }

    pub fn period(&self, schedule: &ScheduleConfig) -> Duration {
        let secs = match self {
            TaskKind::SignalCheck => schedule.signal_check_secs,
            TaskKind::TrailingStop => schedule.trailing_stop_secs,
            TaskKind::PositionMonitor => schedule.position_monitor_secs,
            TaskKind::FullResync => schedule.full_resync_secs,
            TaskKind::OrphanCleanup => schedule.orphan_cleanup_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts for one tick across all symbols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Run one tick of `kind`: every symbol concurrently, each bounded by `deadline`
///
/// Units for the same symbol still serialize on the symbol lock inside the
/// engine. Each unit runs on its own task, so a deadline only stops the wait:
/// an entry saga or stop replacement already in flight runs to completion,
/// still holding the symbol lock, and its result is reported when it lands.
pub async fn run_tick(engine: &Arc<Engine>, kind: TaskKind, deadline: Duration) -> TickSummary {
    let mut units = JoinSet::new();
    for symbol in engine.symbols() {
        let engine = Arc::clone(engine);
        units.spawn(async move {
            let mut worker = tokio::spawn({
                let engine = Arc::clone(&engine);
                let symbol = symbol.clone();
                async move { engine.run_unit(kind, &symbol).await }
            });
            match tokio::time::timeout(deadline, &mut worker).await {
                Ok(joined) => (symbol, Some(joined)),
                Err(_) => {
                    tokio::spawn(finish_late(engine, kind, symbol.clone(), worker));
                    (symbol, None)
                }
            }
        });
    }

    let mut summary = TickSummary::default();
    while let Some(joined) = units.join_next().await {
        match joined {
            Ok((_, Some(Ok(Ok(()))))) => summary.succeeded += 1,
            Ok((symbol, Some(Ok(Err(e))))) => {
                summary.failed += 1;
                engine.report_error(kind, &symbol, &e).await;
            }
            Ok((symbol, Some(Err(e)))) => {
                summary.failed += 1;
                tracing::error!(symbol = %symbol, "❌ [{}] unit panicked: {}", kind, e);
            }
            Ok((symbol, None)) => {
                summary.timed_out += 1;
                tracing::warn!(
                    symbol = %symbol,
                    "⏱️  [{}] unit exceeded {:?}, finishing in background",
                    kind,
                    deadline
                );
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!("❌ [{}] unit task failed: {}", kind, e);
            }
        }
    }
    summary
}

/// Await a unit that outlived its deadline and report its result
async fn finish_late(engine: Arc<Engine>, kind: TaskKind, symbol: String, worker: JoinHandle<Result<()>>) {
    match worker.await {
        Ok(Ok(())) => tracing::info!(symbol = %symbol, "[{}] late unit completed", kind),
        Ok(Err(e)) => engine.report_error(kind, &symbol, &e).await,
        Err(e) => tracing::error!(symbol = %symbol, "❌ [{}] late unit panicked: {}", kind, e),
    }
}

/// One independent timer per task kind
pub struct Scheduler {
    engine: Arc<Engine>,
    schedule: ScheduleConfig,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, schedule: ScheduleConfig) -> Self {
        Self { engine, schedule }
    }

    /// Spawn all five loops; a loop only finishes if it panics
    pub fn spawn(self) -> JoinSet<TaskKind> {
        let mut loops = JoinSet::new();
        for kind in TaskKind::ALL {
            let engine = Arc::clone(&self.engine);
            let period = kind.period(&self.schedule);
            let deadline = self.schedule.tick_deadline();
            tracing::info!("  🔄 {}: every {:?}", kind, period);
            loops.spawn(async move {
                task_loop(engine, kind, period, deadline).await;
                kind
            });
        }
        loops
    }
}

async fn task_loop(engine: Arc<Engine>, kind: TaskKind, period: Duration, deadline: Duration) {
    // Startup already ran a full resync
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let summary = run_tick(&engine, kind, deadline).await;
        if summary.failed > 0 || summary.timed_out > 0 {
            tracing::info!(
                "[{}] tick done: {} ok, {} failed, {} timed out",
                kind,
                summary.succeeded,
                summary.failed,
                summary.timed_out
            );
        } else {
            tracing::debug!("[{}] tick done: {} ok", kind, summary.succeeded);
        }
    }
}
