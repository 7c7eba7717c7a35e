// Risk module: sizing, lot/tick rounding, stop offsets, PnL
pub mod sizing;

pub use sizing::{
    position_quantity, realized_pnl, round_price, round_quantity, stop_order_price,
    take_profit_price, STOP_SAFETY_OFFSET,
};
