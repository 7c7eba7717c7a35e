use std::sync::Arc;

use crate::api::TradingVenue;
use crate::config::SymbolConfig;
use crate::error::BotError;
use crate::execution::Position;
use crate::models::{Candle, Interval, OrderRequest, Side, StrategyKind};
use crate::notify::{Notification, Notifier};
use crate::risk::{position_quantity, stop_order_price, take_profit_price};

/// Candles used to derive the initial reference stop
pub const STOP_LOOKBACK: usize = 20;
pub const STOP_LOOKBACK_INTERVAL: Interval = Interval::ThreeMinutes;

/// Steps of the entry saga, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    SetLeverage,
    FetchPrice,
    ReferenceStop,
    Sizing,
    MarketEntry,
    ProtectiveStop,
    TakeProfit,
    Commit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Succeeded,
    Skipped,
    /// Logged, saga continues
    FailedNonAborting(String),
    /// Saga stops here
    FailedAborting(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Entry filled, stop resting, position recorded OPEN
    Opened,
    /// Entry filled but the stop was refused; position recorded OPEN with
    /// no stop and the operator alerted
    OpenedUnprotected,
    /// Nothing filled
    Aborted(SagaStep),
}

/// Per-step record of one entry attempt
#[derive(Debug, Clone)]
pub struct EntryReport {
    pub symbol: String,
    pub side: Side,
    pub steps: Vec<(SagaStep, StepStatus)>,
    pub outcome: EntryOutcome,
    pub quantity: Option<f64>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl EntryReport {
    fn new(symbol: &str, side: Side) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            steps: Vec::new(),
            outcome: EntryOutcome::Aborted(SagaStep::SetLeverage),
            quantity: None,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    /// Only a fully protected entry counts; the latch is consumed on this
    pub fn is_success(&self) -> bool {
        self.outcome == EntryOutcome::Opened
    }

    pub fn status_of(&self, step: SagaStep) -> Option<&StepStatus> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, status)| status)
    }

    fn record(&mut self, step: SagaStep, status: StepStatus) {
        self.steps.push((step, status));
    }

    fn abort(mut self, step: SagaStep, error: &BotError) -> Self {
        self.record(step, StepStatus::FailedAborting(error.to_string()));
        self.outcome = EntryOutcome::Aborted(step);
        self
    }
}

/// Lowest low (LONG) or highest high (SHORT) of a candle window
pub fn reference_stop(side: Side, candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let level = match side {
        Side::Long => candles.iter().map(|c| c.low).fold(f64::MAX, f64::min),
        Side::Short => candles.iter().map(|c| c.high).fold(f64::MIN, f64::max),
    };
    (level.is_finite() && level > 0.0).then_some(level)
}

/// Runs the entry saga against the venue
///
/// Steps run in order; the first aborting failure ends the saga. Nothing is
/// rolled back: once the market entry has filled, later failures leave a
/// live position that is recorded and alerted rather than unwound.
pub struct OrderExecutor {
    venue: Arc<dyn TradingVenue>,
    notifier: Arc<dyn Notifier>,
}

impl OrderExecutor {
    pub fn new(venue: Arc<dyn TradingVenue>, notifier: Arc<dyn Notifier>) -> Self {
        Self { venue, notifier }
    }

    /// Open a position; `position` must be the caller's locked FLAT slot
    pub async fn open_position(
        &self,
        symbol: &str,
        config: &SymbolConfig,
        side: Side,
        risk_budget: f64,
        position: &mut Position,
    ) -> EntryReport {
        let mut report = EntryReport::new(symbol, side);

        if position.is_open() {
            let err = BotError::InconsistentState("entry attempted while a position is open".into());
            return report.abort(SagaStep::SetLeverage, &err);
        }

        // 1. Leverage (a venue that already has it set may refuse the change)
        match self.venue.set_leverage(symbol, config.leverage).await {
            Ok(()) => report.record(SagaStep::SetLeverage, StepStatus::Succeeded),
            Err(e) => {
                tracing::warn!(symbol = %symbol, "⚠️  Could not set leverage {}x: {}", config.leverage, e);
                report.record(SagaStep::SetLeverage, StepStatus::FailedNonAborting(e.to_string()));
            }
        }

        // 2. Reference price
        let price = match self.venue.get_mark_price(symbol).await {
            Ok(p) if p > 0.0 => p,
            Ok(p) => {
                let err = BotError::TransientNetwork(format!("venue returned price {}", p));
                return self.aborted(report, SagaStep::FetchPrice, err).await;
            }
            Err(e) => return self.aborted(report, SagaStep::FetchPrice, e).await,
        };
        report.record(SagaStep::FetchPrice, StepStatus::Succeeded);

        // 3. Reference stop from recent structure
        let candles = match self
            .venue
            .get_candles(symbol, STOP_LOOKBACK_INTERVAL, STOP_LOOKBACK)
            .await
        {
            Ok(c) => c,
            Err(e) => return self.aborted(report, SagaStep::ReferenceStop, e).await,
        };
        if candles.len() < STOP_LOOKBACK {
            let err = BotError::DataInsufficient(format!(
                "{} candles for reference stop, need {}",
                candles.len(),
                STOP_LOOKBACK
            ));
            return self.aborted(report, SagaStep::ReferenceStop, err).await;
        }
        let Some(stop_reference) = reference_stop(side, &candles) else {
            let err = BotError::DataInsufficient("no usable candle range for stop".into());
            return self.aborted(report, SagaStep::ReferenceStop, err).await;
        };
        report.record(SagaStep::ReferenceStop, StepStatus::Succeeded);

        // 4. Sizing
        let filters = match self.venue.get_symbol_filters(symbol).await {
            Ok(f) => f,
            Err(e) => return self.aborted(report, SagaStep::Sizing, e).await,
        };
        let Some(quantity) =
            position_quantity(risk_budget, config.leverage, price, filters.min_lot_size)
        else {
            let err = BotError::DataInsufficient(format!(
                "risk budget {:.2} at {}x does not size a position at {}",
                risk_budget, config.leverage, price
            ));
            return self.aborted(report, SagaStep::Sizing, err).await;
        };
        report.quantity = Some(quantity);
        report.record(SagaStep::Sizing, StepStatus::Succeeded);

        // 5. Market entry
        let entry = OrderRequest::market_entry(symbol, side, quantity);
        if let Err(e) = self.venue.submit_order(&entry).await {
            return self.aborted(report, SagaStep::MarketEntry, e).await;
        }
        report.entry_price = Some(price);
        report.record(SagaStep::MarketEntry, StepStatus::Succeeded);
        tracing::info!(
            symbol = %symbol,
            "📈 Entered {} {} @ ~{} (risk {:.2} USDT, {}x)",
            side,
            quantity,
            price,
            risk_budget,
            config.leverage
        );

        // 6. Protective stop; from here on the position is live
        let stop_price = stop_order_price(stop_reference, side, filters.price_tick_size);
        let stop = OrderRequest::protective_stop(symbol, side, stop_price);
        if let Err(e) = self.venue.submit_order(&stop).await {
            report.record(SagaStep::ProtectiveStop, StepStatus::FailedAborting(e.to_string()));
            report.outcome = EntryOutcome::OpenedUnprotected;

            if let Err(state_err) = position.open(side, quantity, price, None) {
                tracing::error!(symbol = %symbol, "❌ Could not record unprotected position: {}", state_err);
            }
            let err = BotError::InconsistentState(format!(
                "{} {} filled but stop at {} was refused ({}); position is UNPROTECTED",
                side, quantity, stop_price, e
            ));
            tracing::error!(symbol = %symbol, "🚨 {}", err);
            self.notifier.notify(&Notification::alert(symbol, err.to_string())).await;
            return report;
        }
        report.record(SagaStep::ProtectiveStop, StepStatus::Succeeded);
        tracing::info!(symbol = %symbol, "🛡️  Stop placed at {} (reference {})", stop_price, stop_reference);

        // 7. Take profit (scalper only)
        if config.strategy == StrategyKind::Turtle {
            report.record(SagaStep::TakeProfit, StepStatus::Skipped);
        } else {
            let tp_price =
                take_profit_price(price, side, config.take_profit_percent, filters.price_tick_size);
            let tp = OrderRequest::take_profit(symbol, side, tp_price);
            match self.venue.submit_order(&tp).await {
                Ok(_) => {
                    report.take_profit = Some(tp_price);
                    report.record(SagaStep::TakeProfit, StepStatus::Succeeded);
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "⚠️  Take profit at {} refused: {}", tp_price, e);
                    report.record(SagaStep::TakeProfit, StepStatus::FailedNonAborting(e.to_string()));
                    self.notifier
                        .notify(&Notification::alert(
                            symbol,
                            format!("take profit at {} refused: {}", tp_price, e),
                        ))
                        .await;
                }
            }
        }

        // 8. Commit
        if let Err(e) = position.open(side, quantity, price, Some(stop_reference)) {
            report.record(SagaStep::Commit, StepStatus::FailedAborting(e.to_string()));
            report.outcome = EntryOutcome::OpenedUnprotected;
            return report;
        }
        report.stop_loss = Some(stop_reference);
        report.record(SagaStep::Commit, StepStatus::Succeeded);
        report.outcome = EntryOutcome::Opened;

        self.notifier
            .notify(&Notification::PositionOpened {
                symbol: symbol.to_string(),
                side,
                quantity,
                entry_price: price,
                stop_loss: stop_reference,
                take_profit: report.take_profit,
            })
            .await;

        report
    }

    async fn aborted(&self, report: EntryReport, step: SagaStep, error: BotError) -> EntryReport {
        if error.should_alert() {
            tracing::error!(symbol = %report.symbol, "❌ Entry aborted at {:?}: {}", step, error);
            self.notifier
                .notify(&Notification::alert(
                    &report.symbol,
                    format!("{} entry aborted at {:?}: {}", report.side, step, error),
                ))
                .await;
        } else {
            tracing::warn!(symbol = %report.symbol, "Entry aborted at {:?}: {}", step, error);
        }
        report.abort(step, &error)
    }
}
