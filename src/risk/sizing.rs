use rust_decimal::prelude::*;

use crate::models::Side;

/// Distance a protective stop order is pushed away from its reference price
/// so it does not trigger on noise (0.1%)
pub const STOP_SAFETY_OFFSET: f64 = 0.001;

fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    // Display gives the shortest round-tripping form, so 0.001 stays 0.001
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))
}

fn to_f64(value: Decimal) -> f64 {
    value.normalize().to_f64().unwrap_or(0.0)
}

/// Round a quantity down to a multiple of the minimum lot size
///
/// The result is never below the lot size itself, even when `quantity` is
/// smaller than one lot. A non-positive or non-finite lot size yields 0.
pub fn round_quantity(quantity: f64, min_lot_size: f64) -> f64 {
    let lot = match to_decimal(min_lot_size) {
        Some(lot) if lot > Decimal::ZERO => lot,
        _ => return 0.0,
    };
    let qty = match to_decimal(quantity) {
        Some(q) if q > Decimal::ZERO => q,
        _ => return to_f64(lot),
    };

    let lots = (qty / lot).floor();
    to_f64((lots * lot).max(lot))
}

/// Round a price to the nearest multiple of the venue tick size
pub fn round_price(price: f64, tick_size: f64) -> f64 {
    let (Some(p), Some(tick)) = (to_decimal(price), to_decimal(tick_size)) else {
        return price;
    };
    if tick <= Decimal::ZERO {
        return price;
    }
    let ticks = (p / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    to_f64(ticks * tick)
}

/// Order quantity for an entry
///
/// `risk_budget * leverage / entry_price`, rounded down to the lot size with
/// a floor at one lot. `None` when the raw quantity is not positive (no
/// margin, bad price) so the caller aborts instead of trading a minimum lot.
pub fn position_quantity(
    risk_budget: f64,
    leverage: u32,
    entry_price: f64,
    min_lot_size: f64,
) -> Option<f64> {
    let budget = to_decimal(risk_budget)?;
    let price = to_decimal(entry_price)?;
    if budget <= Decimal::ZERO || price <= Decimal::ZERO || leverage == 0 {
        return None;
    }

    let raw = budget * Decimal::from(leverage) / price;
    let quantity = round_quantity(to_f64(raw), min_lot_size);
    if quantity <= 0.0 {
        return None;
    }
    Some(quantity)
}

/// Stop order price for a reference stop, offset in the adverse direction
/// and rounded to the tick size
pub fn stop_order_price(reference: f64, side: Side, tick_size: f64) -> f64 {
    let (Some(r), Some(offset)) = (to_decimal(reference), to_decimal(STOP_SAFETY_OFFSET)) else {
        return reference;
    };
    let adjusted = match side {
        Side::Long => r * (Decimal::ONE - offset),
        Side::Short => r * (Decimal::ONE + offset),
    };
    round_price(to_f64(adjusted), tick_size)
}

/// Take-profit trigger price `entry * (1 ± take_profit_percent)`
pub fn take_profit_price(entry_price: f64, side: Side, take_profit_percent: f64, tick_size: f64) -> f64 {
    let (Some(e), Some(tp)) = (to_decimal(entry_price), to_decimal(take_profit_percent)) else {
        return entry_price;
    };
    let target = match side {
        Side::Long => e * (Decimal::ONE + tp),
        Side::Short => e * (Decimal::ONE - tp),
    };
    round_price(to_f64(target), tick_size)
}

/// Realized PnL in quote currency and percent, both rounded to 2 decimals
pub fn realized_pnl(side: Side, quantity: f64, entry_price: f64, exit_price: f64) -> (f64, f64) {
    let per_unit = match side {
        Side::Long => exit_price - entry_price,
        Side::Short => entry_price - exit_price,
    };
    let pnl = per_unit * quantity;
    let percent = if entry_price > 0.0 {
        per_unit / entry_price * 100.0
    } else {
        0.0
    };
    (round2(pnl), round2(percent))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
