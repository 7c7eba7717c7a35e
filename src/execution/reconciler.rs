use std::sync::Arc;

use crate::api::TradingVenue;
use crate::execution::Position;
use crate::models::{ExchangePosition, Side};
use crate::notify::{Notification, Notifier};
use crate::risk::realized_pnl;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ClosureOutcome {
    NotOpen,
    StillOpen,
    /// Venue reports flat; local state reset
    Closed { pnl: Option<(f64, f64)> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResyncOutcome {
    InSync,
    /// Venue holds a position the engine did not know about
    Adopted { side: Side, quantity: f64 },
    /// Same side, venue quantity differs
    QuantityCorrected { from: f64, to: f64 },
    /// Venue is flat while we believed OPEN
    Closed { pnl: Option<(f64, f64)> },
}

/// Brings local position belief in line with venue truth
pub struct PositionReconciler {
    venue: Arc<dyn TradingVenue>,
    notifier: Arc<dyn Notifier>,
}

impl PositionReconciler {
    pub fn new(venue: Arc<dyn TradingVenue>, notifier: Arc<dyn Notifier>) -> Self {
        Self { venue, notifier }
    }

    /// Frequent check: has an OPEN position been closed on the venue
    /// (stop or take profit hit, manual close)?
    pub async fn detect_closure(&self, symbol: &str, position: &mut Position) -> Result<ClosureOutcome> {
        if !position.is_open() {
            return Ok(ClosureOutcome::NotOpen);
        }

        let truth = self.venue.get_position(symbol).await?;
        if !truth.is_flat() {
            return Ok(ClosureOutcome::StillOpen);
        }

        let pnl = self.close_locally(symbol, position, truth).await;
        Ok(ClosureOutcome::Closed { pnl })
    }

    /// Full resync of one symbol against the venue
    ///
    /// A position found on the venue while FLAT locally is adopted with no
    /// stop; the trailing-stop engine derives a fresh one on its next tick.
    pub async fn resync(&self, symbol: &str, position: &mut Position) -> Result<ResyncOutcome> {
        let truth = self.venue.get_position(symbol).await?;

        let Some(venue_side) = Side::from_signed_amount(truth.amount) else {
            if position.is_open() {
                let pnl = self.close_locally(symbol, position, truth).await;
                return Ok(ResyncOutcome::Closed { pnl });
            }
            return Ok(ResyncOutcome::InSync);
        };
        let venue_qty = truth.amount.abs();

        if position.is_open() && position.side() == Some(venue_side) {
            if (position.quantity() - venue_qty).abs() <= f64::EPSILON * venue_qty.max(1.0) {
                return Ok(ResyncOutcome::InSync);
            }
            let from = position.quantity();
            position.update_quantity(venue_qty)?;
            tracing::warn!(
                symbol = %symbol,
                "⚠️  Quantity corrected from venue: {} → {}",
                from,
                venue_qty
            );
            return Ok(ResyncOutcome::QuantityCorrected { from, to: venue_qty });
        }

        if position.is_open() {
            tracing::warn!(
                symbol = %symbol,
                "⚠️  Venue holds {} but local state says {:?}; re-adopting",
                venue_side,
                position.side()
            );
        }

        position.reset();
        position.open(venue_side, venue_qty, truth.entry_price, None)?;
        tracing::info!(
            symbol = %symbol,
            "📥 Adopted {} {} @ {} from venue",
            venue_side,
            venue_qty,
            truth.entry_price
        );
        self.notifier
            .notify(&Notification::PositionAdopted {
                symbol: symbol.to_string(),
                side: venue_side,
                quantity: venue_qty,
                entry_price: truth.entry_price,
            })
            .await;

        Ok(ResyncOutcome::Adopted {
            side: venue_side,
            quantity: venue_qty,
        })
    }

    /// Cancel every resting order for a symbol, returns how many
    pub async fn cancel_all_orders(&self, symbol: &str) -> Result<usize> {
        let orders = self.venue.list_open_orders(symbol).await?;
        for order in &orders {
            self.venue.cancel_order(symbol, order.order_id).await?;
        }
        Ok(orders.len())
    }

    /// Orphan cleanup: resting orders left behind while FLAT
    pub async fn cleanup_orphans(&self, symbol: &str, position: &Position) -> Result<usize> {
        if position.is_open() {
            return Ok(0);
        }
        let cancelled = self.cancel_all_orders(symbol).await?;
        if cancelled > 0 {
            tracing::info!(symbol = %symbol, "🧹 Cancelled {} orphaned order(s)", cancelled);
        }
        Ok(cancelled)
    }

    /// Record the closure, reset to FLAT and clear leftover orders
    async fn close_locally(
        &self,
        symbol: &str,
        position: &mut Position,
        truth: ExchangePosition,
    ) -> Option<(f64, f64)> {
        let side = position.side()?;
        let quantity = position.quantity();
        let entry = if truth.entry_price > 0.0 {
            Some(truth.entry_price)
        } else {
            position.entry_price()
        };

        let pnl = match (entry, self.venue.get_mark_price(symbol).await) {
            (Some(entry), Ok(exit)) => Some(realized_pnl(side, quantity, entry, exit)),
            (None, _) => {
                tracing::warn!(symbol = %symbol, "No entry price known, PnL not computed");
                None
            }
            (_, Err(e)) => {
                tracing::warn!(symbol = %symbol, "Exit price unavailable, PnL not computed: {}", e);
                None
            }
        };

        position.reset();
        match pnl {
            Some((value, pct)) => tracing::info!(
                symbol = %symbol,
                "🏁 {} closed: {:.2} USDT ({:.2}%)",
                side,
                value,
                pct
            ),
            None => tracing::info!(symbol = %symbol, "🏁 {} closed", side),
        }
        self.notifier
            .notify(&Notification::PositionClosed {
                symbol: symbol.to_string(),
                side,
                pnl,
            })
            .await;

        if let Err(e) = self.cancel_all_orders(symbol).await {
            tracing::warn!(
                symbol = %symbol,
                "⚠️  Leftover orders not cancelled, orphan cleanup will retry: {}",
                e
            );
        }
        pnl
    }
}
