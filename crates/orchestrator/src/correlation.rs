//! Pearson correlation over the common RSI index of a coin against BTC (§4.4).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rsi_correlator_core::RsiSeries;

/// Returns `None` if the common index is shorter than `min_index_len`. Otherwise returns the
/// Pearson correlation coefficient (which may be `NaN` if either series is constant over the
/// common index — callers must check for that before applying a threshold) together with the
/// latest timestamp in the common index, used as the result's data-derived "as-of" time.
///
/// Both series are invariant-sorted by strictly increasing timestamp, so the last entry in
/// `common` is the latest common timestamp.
pub fn correlate(
    btc_rsi: &RsiSeries,
    coin_rsi: &RsiSeries,
    min_index_len: usize,
) -> Option<(f64, DateTime<Utc>)> {
    let btc_by_ts: HashMap<DateTime<Utc>, f64> = btc_rsi.points.iter().map(|p| (p.timestamp, p.value)).collect();
    let common: Vec<(DateTime<Utc>, f64, f64)> = coin_rsi
        .points
        .iter()
        .filter_map(|p| btc_by_ts.get(&p.timestamp).map(|&btc_value| (p.timestamp, btc_value, p.value)))
        .collect();

    if common.len() < min_index_len {
        return None;
    }
    let run_timestamp = common.last()?.0;
    let pairs: Vec<(f64, f64)> = common.iter().map(|&(_, x, y)| (x, y)).collect();
    Some((pearson(&pairs), run_timestamp))
}

fn pearson(pairs: &[(f64, f64)]) -> f64 {
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for &(x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn series(values: &[f64]) -> RsiSeries {
        RsiSeries {
            coin_id: "x".to_string(),
            symbol: "X".to_string(),
            timeframe: "1d".to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &value)| rsi_correlator_core::RsiPoint {
                    timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 86_400, 0).single().unwrap(),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn identical_series_correlate_perfectly() {
        let a = series(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let b = series(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let (rho, run_timestamp) = correlate(&a, &b, 3).unwrap();
        assert!((rho - 1.0).abs() < 1e-9);
        assert_eq!(run_timestamp, a.points.last().unwrap().timestamp);
    }

    #[test]
    fn inverted_series_correlate_negatively() {
        let a = series(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let b = series(&[50.0, 40.0, 30.0, 20.0, 10.0]);
        let (rho, _) = correlate(&a, &b, 3).unwrap();
        assert!((rho + 1.0).abs() < 1e-9);
    }

    #[test]
    fn short_common_index_is_rejected() {
        let a = series(&[10.0, 20.0]);
        let b = series(&[10.0, 20.0]);
        assert!(correlate(&a, &b, 14).is_none());
    }

    #[test]
    fn constant_series_yields_nan() {
        let a = series(&[10.0, 10.0, 10.0, 10.0]);
        let b = series(&[5.0, 6.0, 7.0, 8.0]);
        let (rho, _) = correlate(&a, &b, 3).unwrap();
        assert!(rho.is_nan());
    }
}
