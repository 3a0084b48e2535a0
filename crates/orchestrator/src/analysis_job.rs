//! Per-timeframe state machine (C6): tracks outstanding coins, dedups decrements, and runs
//! the correlation pass exactly once when the counter reaches zero.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use rsi_correlator_core::{CoinIdSymbol, CorrelationResult, RsiSeries};

use crate::correlation;

const SEEN_CAPACITY: usize = 1000;

pub enum JobOutcome {
    Pending,
    Completed { correlations: Vec<CorrelationResult>, degraded: bool },
}

struct Inner {
    counter: i64,
    btc_rsi: Option<RsiSeries>,
    rsi_store: HashMap<CoinIdSymbol, RsiSeries>,
    seen_set: HashSet<CoinIdSymbol>,
    seen_order: VecDeque<CoinIdSymbol>,
    completed: bool,
}

/// Tracks one timeframe's worth of in-flight coins. `market_caps` carries the cached
/// market-cap lookup used to tag `low_cap_quartile` when a correlation result is produced.
pub struct AnalysisJob {
    pub timeframe: String,
    correlation_threshold: f64,
    rsi_period: u32,
    low_cap_threshold: f64,
    market_caps: HashMap<CoinIdSymbol, Option<f64>>,
    inner: Mutex<Inner>,
}

impl AnalysisJob {
    #[must_use]
    pub fn new(
        timeframe: String,
        coins_to_process: &[CoinIdSymbol],
        market_caps: HashMap<CoinIdSymbol, Option<f64>>,
        correlation_threshold: f64,
        rsi_period: u32,
        low_cap_threshold: f64,
    ) -> Self {
        let counter = i64::try_from(coins_to_process.len()).unwrap_or(i64::MAX) + 1;
        Self {
            timeframe,
            correlation_threshold,
            rsi_period,
            low_cap_threshold,
            market_caps,
            inner: Mutex::new(Inner {
                counter,
                btc_rsi: None,
                rsi_store: HashMap::new(),
                seen_set: HashSet::new(),
                seen_order: VecDeque::new(),
                completed: false,
            }),
        }
    }

    /// Records the outcome for BTC — the `+1` slot in the job's counter.
    #[must_use]
    pub fn record_btc_outcome(&self, btc_id: CoinIdSymbol, rsi: Option<RsiSeries>) -> JobOutcome {
        self.record(btc_id, rsi, true)
    }

    /// Records the terminal outcome for one non-BTC coin.
    #[must_use]
    pub fn record_coin_outcome(&self, coin_id_symbol: CoinIdSymbol, rsi: Option<RsiSeries>) -> JobOutcome {
        self.record(coin_id_symbol, rsi, false)
    }

    fn record(&self, key: CoinIdSymbol, rsi: Option<RsiSeries>, is_btc: bool) -> JobOutcome {
        let mut inner = self.inner.lock().unwrap();

        if inner.seen_set.contains(&key) {
            return JobOutcome::Pending;
        }
        inner.seen_set.insert(key.clone());
        inner.seen_order.push_back(key.clone());
        if inner.seen_order.len() > SEEN_CAPACITY {
            if let Some(evicted) = inner.seen_order.pop_front() {
                inner.seen_set.remove(&evicted);
            }
        }

        if is_btc {
            inner.btc_rsi = rsi;
        } else if let Some(series) = rsi {
            inner.rsi_store.insert(key, series);
        }

        inner.counter -= 1;
        if inner.counter > 0 || inner.completed {
            return JobOutcome::Pending;
        }
        inner.completed = true;

        let degraded = inner.btc_rsi.is_none();
        let correlations = match &inner.btc_rsi {
            None => Vec::new(),
            Some(btc_rsi) => inner
                .rsi_store
                .iter()
                .filter_map(|(coin_id_symbol, coin_rsi)| {
                    let (rho, run_timestamp) = correlation::correlate(btc_rsi, coin_rsi, self.rsi_period as usize)?;
                    if rho.is_nan() || rho.abs() < self.correlation_threshold {
                        return None;
                    }
                    let market_cap = self.market_caps.get(coin_id_symbol).copied().flatten();
                    Some(CorrelationResult {
                        coin_id: coin_id_symbol.0.clone(),
                        symbol: coin_id_symbol.1.clone(),
                        timeframe: self.timeframe.clone(),
                        correlation: rho,
                        market_cap,
                        low_cap_quartile: market_cap.is_some_and(|cap| cap <= self.low_cap_threshold),
                        run_timestamp,
                    })
                })
                .collect(),
        };

        JobOutcome::Completed { correlations, degraded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rsi_correlator_core::RsiPoint;

    fn rsi(values: &[f64]) -> RsiSeries {
        RsiSeries {
            coin_id: "c".to_string(),
            symbol: "C".to_string(),
            timeframe: "1d".to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &value)| RsiPoint {
                    timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 86_400, 0).single().unwrap(),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn stays_pending_until_counter_reaches_zero() {
        let coins = vec![("doge".to_string(), "DOGE".to_string())];
        let job = AnalysisJob::new("1d".to_string(), &coins, HashMap::new(), 0.7, 3, f64::INFINITY);
        let outcome = job.record_coin_outcome(coins[0].clone(), Some(rsi(&[10.0, 20.0, 30.0])));
        assert!(matches!(outcome, JobOutcome::Pending));
    }

    #[test]
    fn completes_with_correlation_when_btc_arrives_last() {
        let coins = vec![("doge".to_string(), "DOGE".to_string())];
        let job = AnalysisJob::new("1d".to_string(), &coins, HashMap::new(), 0.5, 3, f64::INFINITY);
        assert!(matches!(job.record_coin_outcome(coins[0].clone(), Some(rsi(&[10.0, 20.0, 30.0, 40.0]))), JobOutcome::Pending));
        let outcome = job.record_btc_outcome(("bitcoin".to_string(), "BTC".to_string()), Some(rsi(&[10.0, 20.0, 30.0, 40.0])));
        match outcome {
            JobOutcome::Completed { correlations, degraded } => {
                assert!(!degraded);
                assert_eq!(correlations.len(), 1);
                assert!((correlations[0].correlation - 1.0).abs() < 1e-9);
            }
            JobOutcome::Pending => panic!("expected completion"),
        }
    }

    #[test]
    fn duplicate_decrement_is_ignored() {
        let coins = vec![("doge".to_string(), "DOGE".to_string())];
        let job = AnalysisJob::new("1d".to_string(), &coins, HashMap::new(), 0.5, 3, f64::INFINITY);
        job.record_coin_outcome(coins[0].clone(), None);
        let second = job.record_coin_outcome(coins[0].clone(), None);
        assert!(matches!(second, JobOutcome::Pending));
        let outcome = job.record_btc_outcome(("bitcoin".to_string(), "BTC".to_string()), Some(rsi(&[10.0, 20.0, 30.0])));
        assert!(matches!(outcome, JobOutcome::Completed { .. }));
    }

    #[test]
    fn missing_btc_rsi_completes_degraded_with_no_correlations() {
        let coins = vec![("doge".to_string(), "DOGE".to_string())];
        let job = AnalysisJob::new("1d".to_string(), &coins, HashMap::new(), 0.5, 3, f64::INFINITY);
        job.record_coin_outcome(coins[0].clone(), Some(rsi(&[10.0, 20.0, 30.0])));
        let outcome = job.record_btc_outcome(("bitcoin".to_string(), "BTC".to_string()), None);
        match outcome {
            JobOutcome::Completed { correlations, degraded } => {
                assert!(degraded);
                assert!(correlations.is_empty());
            }
            JobOutcome::Pending => panic!("expected completion"),
        }
    }

    #[test]
    fn low_cap_quartile_flag_follows_threshold() {
        let coins = vec![("doge".to_string(), "DOGE".to_string())];
        let mut caps = HashMap::new();
        caps.insert(coins[0].clone(), Some(100.0));
        let job = AnalysisJob::new("1d".to_string(), &coins, caps, 0.5, 3, 500.0);
        job.record_coin_outcome(coins[0].clone(), Some(rsi(&[10.0, 20.0, 30.0, 40.0])));
        let outcome = job.record_btc_outcome(("bitcoin".to_string(), "BTC".to_string()), Some(rsi(&[10.0, 20.0, 30.0, 40.0])));
        match outcome {
            JobOutcome::Completed { correlations, .. } => assert!(correlations[0].low_cap_quartile),
            JobOutcome::Pending => panic!("expected completion"),
        }
    }
}
