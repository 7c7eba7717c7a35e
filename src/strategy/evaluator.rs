use std::sync::Arc;

use super::{for_kind, RSI_CANDLES, RSI_INTERVAL, RSI_PERIOD};
use crate::api::TradingVenue;
use crate::config::SymbolConfig;
use crate::execution::{EntryReport, OrderExecutor, SymbolState};
use crate::indicators::{calculate_rsi, closes};
use crate::models::Side;
use crate::Result;

/// What a signal check concluded for one symbol
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    /// Evaluators never run on an OPEN position
    PositionOpen,
    /// Not enough candles for the setup; no signal this cycle
    NoData,
    NoSetup,
    /// A setup was present but gated off
    Blocked { side: Side, reason: String },
    Entered(EntryReport),
    EntryFailed(EntryReport),
}

/// Latch update, setup detection, gating and entry for one symbol
pub struct SignalEvaluator {
    venue: Arc<dyn TradingVenue>,
    executor: OrderExecutor,
}

impl SignalEvaluator {
    pub fn new(venue: Arc<dyn TradingVenue>, executor: OrderExecutor) -> Self {
        Self { venue, executor }
    }

    pub async fn evaluate(
        &self,
        symbol: &str,
        config: &SymbolConfig,
        state: &mut SymbolState,
    ) -> Result<SignalOutcome> {
        if state.position.is_open() {
            return Ok(SignalOutcome::PositionOpen);
        }

        // Latch update on the hourly RSI
        let rsi_candles = self.venue.get_candles(symbol, RSI_INTERVAL, RSI_CANDLES).await?;
        match calculate_rsi(&closes(&rsi_candles), RSI_PERIOD) {
            Some(rsi) => {
                if let Some(side) = state.latch.observe(rsi) {
                    tracing::info!(symbol = %symbol, "🎯 RSI {:.2} armed the {} trigger", rsi, side);
                } else {
                    tracing::debug!(symbol = %symbol, "RSI {:.2}", rsi);
                }
            }
            None => tracing::debug!(
                symbol = %symbol,
                "RSI unavailable ({} candles), latch unchanged",
                rsi_candles.len()
            ),
        }

        let strategy = for_kind(config.strategy);
        let candles = self
            .venue
            .get_candles(symbol, strategy.interval(), strategy.candles_requested())
            .await?;
        let setup = match strategy.detect_setup(&candles) {
            Ok(setup) => setup,
            Err(e) if e.is_data_insufficient() => {
                tracing::debug!(symbol = %symbol, "No signal: {}", e);
                return Ok(SignalOutcome::NoData);
            }
            Err(e) => return Err(e),
        };
        let Some(side) = setup else {
            return Ok(SignalOutcome::NoSetup);
        };

        if !state.latch.is_armed(side) {
            return Ok(SignalOutcome::Blocked {
                side,
                reason: format!("{} RSI trigger not armed", side),
            });
        }
        if !config.direction.allows(side) {
            return Ok(SignalOutcome::Blocked {
                side,
                reason: format!("direction {:?} excludes {}", config.direction, side),
            });
        }

        let margin = self.venue.get_available_margin().await?;
        let budget = margin * config.risk_percent;
        tracing::info!(
            symbol = %symbol,
            "⚡ {} {} setup confirmed (margin {:.2}, budget {:.2})",
            strategy.name(),
            side,
            margin,
            budget
        );

        let report = self
            .executor
            .open_position(symbol, config, side, budget, &mut state.position)
            .await;

        if report.is_success() {
            state.latch.consume(side);
            Ok(SignalOutcome::Entered(report))
        } else {
            Ok(SignalOutcome::EntryFailed(report))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{candles_from_closes, candles_hlc, MockVenue};
    use crate::execution::Position;
    use crate::models::{Direction, Interval, OrderType, StrategyKind};
    use crate::notify::recording::RecordingNotifier;
    use crate::strategy::LatchState;

    /// Steady decline ending in a bullish 9/21 crossover on the 3m chart,
    /// with a falling hourly series driving RSI to 0
    fn bullish_market(venue: &MockVenue, symbol: &str) {
        let hourly: Vec<f64> = (0..100).map(|i| 60_000.0 - i as f64 * 50.0).collect();
        venue.set_candles(symbol, Interval::OneHour, candles_from_closes(&hourly));

        let mut closes = vec![100.0; 30];
        closes.extend([99.0, 99.0, 120.0]);
        let mut candles = candles_from_closes(&closes);
        // Stop window lows between 90 and 94
        for (i, candle) in candles.iter_mut().enumerate() {
            candle.low = 90.0 + (i % 5) as f64;
        }
        venue.set_candles(symbol, Interval::ThreeMinutes, candles);
        venue.set_mark_price(symbol, 120.0);
    }

    fn setup() -> (Arc<MockVenue>, SignalEvaluator) {
        let venue = Arc::new(MockVenue::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = OrderExecutor::new(venue.clone(), notifier);
        let evaluator = SignalEvaluator::new(venue.clone(), executor);
        (venue, evaluator)
    }

    #[tokio::test]
    async fn test_armed_crossover_enters_and_consumes_latch() {
        let (venue, evaluator) = setup();
        bullish_market(&venue, "BTCUSDT");
        let mut state = SymbolState::default();

        let outcome = evaluator
            .evaluate("BTCUSDT", &SymbolConfig::default(), &mut state)
            .await
            .unwrap();

        let SignalOutcome::Entered(report) = outcome else {
            panic!("expected entry, got {:?}", outcome);
        };
        assert_eq!(report.side, Side::Long);
        // 1000 * 5% * 10 / 120 = 4.1666 → 4.166
        assert_eq!(report.quantity, Some(4.166));
        assert!(state.position.is_open());
        assert_eq!(state.position.stop_loss(), Some(90.0));
        assert_eq!(state.latch.state(Side::Long), LatchState::Consumed);
        assert_eq!(venue.submitted()[0].order_type, OrderType::Market);
    }

    #[tokio::test]
    async fn test_unarmed_latch_blocks_entry() {
        let (venue, evaluator) = setup();
        bullish_market(&venue, "BTCUSDT");
        // Rising hourly series: RSI 100 arms SHORT only
        let hourly: Vec<f64> = (0..100).map(|i| 50_000.0 + i as f64 * 50.0).collect();
        venue.set_candles("BTCUSDT", Interval::OneHour, candles_from_closes(&hourly));
        let mut state = SymbolState::default();

        let outcome = evaluator
            .evaluate("BTCUSDT", &SymbolConfig::default(), &mut state)
            .await
            .unwrap();

        assert!(matches!(outcome, SignalOutcome::Blocked { side: Side::Long, .. }));
        assert!(state.latch.is_armed(Side::Short));
        assert!(venue.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_direction_filter_blocks_entry() {
        let (venue, evaluator) = setup();
        bullish_market(&venue, "BTCUSDT");
        let config = SymbolConfig {
            direction: Direction::Short,
            ..SymbolConfig::default()
        };
        let mut state = SymbolState::default();

        let outcome = evaluator.evaluate("BTCUSDT", &config, &mut state).await.unwrap();

        assert!(matches!(outcome, SignalOutcome::Blocked { side: Side::Long, .. }));
        // Latch survives a blocked setup
        assert!(state.latch.is_armed(Side::Long));
        assert!(venue.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_failed_entry_keeps_latch() {
        let (venue, evaluator) = setup();
        bullish_market(&venue, "BTCUSDT");
        venue.reject(OrderType::Market);
        let mut state = SymbolState::default();

        let outcome = evaluator
            .evaluate("BTCUSDT", &SymbolConfig::default(), &mut state)
            .await
            .unwrap();

        assert!(matches!(outcome, SignalOutcome::EntryFailed(_)));
        assert!(state.latch.is_armed(Side::Long));
        assert!(!state.position.is_open());
    }

    #[tokio::test]
    async fn test_short_series_is_no_signal() {
        let (venue, evaluator) = setup();
        venue.set_candles(
            "BTCUSDT",
            Interval::ThreeMinutes,
            candles_from_closes(&[100.0; 10]),
        );
        let mut state = SymbolState::default();

        let outcome = evaluator
            .evaluate("BTCUSDT", &SymbolConfig::default(), &mut state)
            .await
            .unwrap();
        assert!(matches!(outcome, SignalOutcome::NoData));
        assert_eq!(state.latch.state(Side::Long), LatchState::NotTriggered);
    }

    #[tokio::test]
    async fn test_turtle_breakout_enters_without_take_profit() {
        let (venue, evaluator) = setup();
        let mut bars: Vec<(f64, f64, f64)> = (0..20)
            .map(|i| (51_000.0 + i as f64 * 50.0, 50_000.0 - i as f64 * 10.0, 50_500.0))
            .collect();
        bars[7].0 = 52_000.0;
        bars.push((52_600.0, 51_900.0, 52_500.0));
        venue.set_candles("BTCUSDT", Interval::OneHour, candles_hlc(&bars));
        venue.set_candles(
            "BTCUSDT",
            Interval::ThreeMinutes,
            candles_hlc(&[(52_600.0, 52_000.0, 52_500.0); 20]),
        );
        venue.set_mark_price("BTCUSDT", 52_500.0);

        let config = SymbolConfig {
            strategy: StrategyKind::Turtle,
            ..SymbolConfig::default()
        };
        let mut state = SymbolState::default();
        state.latch.observe(25.0);

        let outcome = evaluator.evaluate("BTCUSDT", &config, &mut state).await.unwrap();

        assert!(matches!(outcome, SignalOutcome::Entered(_)), "{:?}", outcome);
        let types: Vec<OrderType> = venue.submitted().iter().map(|o| o.order_type).collect();
        assert_eq!(types, vec![OrderType::Market, OrderType::Stop]);
    }

    #[tokio::test]
    async fn test_open_position_skips_evaluation() {
        let (venue, evaluator) = setup();
        let mut state = SymbolState {
            position: Position::opened(Side::Long, 1.0, 100.0, Some(95.0)).unwrap(),
            ..SymbolState::default()
        };
        let outcome = evaluator
            .evaluate("BTCUSDT", &SymbolConfig::default(), &mut state)
            .await
            .unwrap();
        assert!(matches!(outcome, SignalOutcome::PositionOpen));
        assert!(venue.submitted().is_empty());
    }
}
