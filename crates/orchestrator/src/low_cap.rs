//! Low-cap percentile threshold: `quantile(low_cap_percentile/100)` over positive market
//! caps among the coins retained for a session, `+Inf` when none are positive.

/// Linear-interpolated quantile, `q` in `[0, 1]`. Returns `+Inf` for an empty slice so that
/// `market_cap <= threshold` is vacuously false when there is nothing to compare against.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::INFINITY;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (n as f64 - 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_infinity() {
        assert_eq!(quantile(&[], 0.25), f64::INFINITY);
    }

    #[test]
    fn median_of_five_values() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile(&values, 0.5) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn quartile_interpolates() {
        let values = vec![10.0, 20.0, 30.0, 40.0];
        assert!((quantile(&values, 0.25) - 17.5).abs() < 1e-9);
    }
}
