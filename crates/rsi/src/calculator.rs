//! Pure RSI function (§4.5). No I/O, no bus, no state — a straightforward port of the
//! simple-rolling-mean formula: not Wilder's smoothed average.

/// Computes RSI over `prices` with the given lookback `period`.
///
/// Returns one `(index, value)` pair per valid position, where `index` is the position in
/// `prices` the value corresponds to. Leading positions without a full `period`-sized window
/// of deltas are dropped, matching `rsi.dropna()` in the source algorithm. Every returned
/// `value` is in `[0, 100]`.
#[must_use]
pub fn calculate(prices: &[f64], period: usize) -> Vec<(usize, f64)> {
    let n = prices.len();
    if period == 0 || n < period + 1 {
        return Vec::new();
    }

    let mut gains = Vec::with_capacity(n - 1);
    let mut losses = Vec::with_capacity(n - 1);
    for i in 1..n {
        let delta = prices[i] - prices[i - 1];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let mut result = Vec::with_capacity(gains.len() - period + 1);
    for k in (period - 1)..gains.len() {
        let window_start = k + 1 - period;
        let avg_gain: f64 = gains[window_start..=k].iter().sum::<f64>() / period as f64;
        let avg_loss: f64 = losses[window_start..=k].iter().sum::<f64>() / period as f64;
        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        // gains[k] is the delta prices[k+1]-prices[k], so it aligns with price index k+1.
        result.push((k + 1, rsi));
    }
    result
}
