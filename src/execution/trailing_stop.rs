use std::sync::Arc;

use crate::api::TradingVenue;
use crate::config::SymbolConfig;
use crate::error::BotError;
use crate::execution::executor::reference_stop;
use crate::execution::Position;
use crate::models::{Interval, OrderRequest, OrderType, Side, StrategyKind};
use crate::notify::{Notification, Notifier};
use crate::risk::stop_order_price;
use crate::Result;

pub const TRAILING_LOOKBACK: usize = 20;

/// Result of one trailing-stop evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum RatchetOutcome {
    NotOpen,
    InsufficientData,
    /// Candidate is not strictly better than the stored stop
    Held { candidate: f64, current: Option<f64> },
    Moved {
        previous: Option<f64>,
        stop_loss: f64,
        order_price: f64,
    },
}

/// Turtle trails on its breakout horizon, scalper on a short one
pub fn interval_for(strategy: StrategyKind) -> Interval {
    match strategy {
        StrategyKind::Turtle => Interval::OneHour,
        StrategyKind::Scalper => Interval::FiveMinutes,
    }
}

/// Ratchet rule: strictly tighter only; an unset stop accepts anything
pub fn is_more_favorable(side: Side, candidate: f64, current: Option<f64>) -> bool {
    match current {
        None => true,
        Some(current) => match side {
            Side::Long => candidate > current,
            Side::Short => candidate < current,
        },
    }
}

/// Moves protective stops toward price, never away from it
pub struct TrailingStopEngine {
    venue: Arc<dyn TradingVenue>,
    notifier: Arc<dyn Notifier>,
    lookback: usize,
}

impl TrailingStopEngine {
    pub fn new(venue: Arc<dyn TradingVenue>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            venue,
            notifier,
            lookback: TRAILING_LOOKBACK,
        }
    }

    pub async fn update(
        &self,
        symbol: &str,
        config: &SymbolConfig,
        position: &mut Position,
    ) -> Result<RatchetOutcome> {
        let Some(side) = position.side().filter(|_| position.is_open()) else {
            return Ok(RatchetOutcome::NotOpen);
        };

        let interval = interval_for(config.strategy);
        let candles = self.venue.get_candles(symbol, interval, self.lookback).await?;
        if candles.len() < self.lookback {
            tracing::debug!(
                symbol = %symbol,
                "Trailing stop skipped: {} of {} {} candles",
                candles.len(),
                self.lookback,
                interval
            );
            return Ok(RatchetOutcome::InsufficientData);
        }
        let Some(candidate) = reference_stop(side, &candles) else {
            return Ok(RatchetOutcome::InsufficientData);
        };

        let current = position.stop_loss();
        if !is_more_favorable(side, candidate, current) {
            tracing::debug!(symbol = %symbol, "Stop held at {:?} (candidate {})", current, candidate);
            return Ok(RatchetOutcome::Held { candidate, current });
        }

        // Everything that can fail before touching orders goes first
        let filters = self.venue.get_symbol_filters(symbol).await?;
        let order_price = stop_order_price(candidate, side, filters.price_tick_size);
        let resting = self.venue.list_open_orders(symbol).await?;

        let mut cancelled = 0usize;
        for order in resting.iter().filter(|o| o.order_type == OrderType::Stop) {
            if let Err(e) = self.venue.cancel_order(symbol, order.order_id).await {
                if cancelled > 0 {
                    return Err(BotError::InconsistentState(format!(
                        "cancelled {} stop order(s) then failed on order {}: {}",
                        cancelled, order.order_id, e
                    )));
                }
                return Err(e);
            }
            cancelled += 1;
        }

        let stop = OrderRequest::protective_stop(symbol, side, order_price);
        if let Err(e) = self.venue.submit_order(&stop).await {
            if cancelled > 0 {
                // Stored stop stays as is so the next tick tries again
                return Err(BotError::InconsistentState(format!(
                    "previous stop cancelled but replacement at {} failed ({}); position is UNPROTECTED",
                    order_price, e
                )));
            }
            return Err(e);
        }

        position.set_stop_loss(candidate)?;
        tracing::info!(
            symbol = %symbol,
            "🔁 Stop {} moved {:?} → {} (order @ {})",
            side,
            current,
            candidate,
            order_price
        );
        self.notifier
            .notify(&Notification::StopUpdated {
                symbol: symbol.to_string(),
                side,
                previous: current,
                stop_loss: candidate,
            })
            .await;

        Ok(RatchetOutcome::Moved {
            previous: current,
            stop_loss: candidate,
            order_price,
        })
    }
}
