/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// SMA at the previous bar and at the current bar
///
/// Needs `period + 1` prices so both windows are complete.
pub fn sma_pair(prices: &[f64], period: usize) -> Option<(f64, f64)> {
    if prices.len() < period + 1 {
        return None;
    }
    let prev = calculate_sma(&prices[..prices.len() - 1], period)?;
    let curr = calculate_sma(prices, period)?;
    Some((prev, curr))
}
