/// Calculate Relative Strength Index (RSI) with Wilder smoothing
///
/// The first average gain/loss is the simple mean of the first `period`
/// changes; every later change is folded in with `alpha = 1 / period`.
/// The value is taken at the last price.
///
/// Values:
/// - RSI >= 70: Overbought
/// - RSI <= 30: Oversold
///
/// Returns `None` when fewer than `period + 1` prices are available.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let (seed, rest) = changes.split_at(period);
    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / period as f64;

    let n = period as f64;
    for change in rest {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
    }

    if avg_loss == 0.0 {
        // Flat series has no momentum either way
        if avg_gain == 0.0 {
            return Some(50.0);
        }
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}
