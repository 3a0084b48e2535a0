use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rsi_correlator_bus::ServiceBus;
use rsi_correlator_core::{AnalysisConfig, Coin, CoinIdSymbol, CorrelationResult, Event, PrecisionEntry, RsiSeries, TabularPayload, Topic};
use rsi_correlator_worker::{Stoppable, WorkerHandler};
use tracing::{error, info, warn};

use crate::analysis_job::{AnalysisJob, JobOutcome};
use crate::low_cap;

const DB_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Name a registered worker must carry for `shutdown_all` to drain it first. Matches the
/// worker name the CLI binds the Database Manager under.
pub const DATABASE_WORKER_NAME: &str = "database-manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    FetchingSeeds,
    Dispatching,
    AwaitDisplay,
    Shutdown,
}

#[derive(Default)]
struct SeedAccumulator {
    top_coins: Option<Vec<Coin>>,
    precision_data: Option<Vec<PrecisionEntry>>,
}

struct Session {
    session_guid: String,
    config: AnalysisConfig,
    phase: Phase,
    seeds: SeedAccumulator,
    jobs: HashMap<String, Arc<AnalysisJob>>,
    pending_jobs: usize,
    results: Vec<CorrelationResult>,
}

/// Owns the session state machine (§4.3): seed join, filter, dispatch, correlation
/// aggregation, and shutdown sequencing. Registered as a bus subscriber like any other
/// worker — its `Task` is simply the subset of `Event` it reacts to.
pub struct OrchestratorHandler {
    bus: ServiceBus,
    /// Registration order; `shutdown_all` stops them in reverse.
    workers: Vec<(String, Box<dyn Stoppable>)>,
    session: Option<Session>,
}

impl OrchestratorHandler {
    #[must_use]
    pub fn new(bus: ServiceBus, workers: Vec<(String, Box<dyn Stoppable>)>) -> Self {
        Self { bus, workers, session: None }
    }

    async fn on_configuration_provided(&mut self, session_guid: String, config: AnalysisConfig) {
        self.session = Some(Session {
            session_guid,
            config,
            phase: Phase::Init,
            seeds: SeedAccumulator::default(),
            jobs: HashMap::new(),
            pending_jobs: 0,
            results: Vec::new(),
        });
    }

    async fn on_run_requested(&mut self, session_guid: String) {
        let Some(session) = self.session.as_mut() else {
            warn!(session_guid, "RunAnalysisRequested with no prior configuration, ignoring");
            return;
        };
        if session.session_guid != session_guid {
            warn!(session_guid, "RunAnalysisRequested for an unknown session, ignoring");
            return;
        }
        if session.phase != Phase::Init {
            warn!(session_guid, "duplicate RunAnalysisRequested ignored, session already started");
            return;
        }
        session.phase = Phase::FetchingSeeds;
        let n = session.config.top_n_coins;
        self.bus.publish(Event::FetchTopCoinsRequested { session_guid: session_guid.clone(), n }).await;
        self.bus.publish(Event::FetchPrecisionDataRequested { session_guid }).await;
    }

    async fn on_top_coins_fetched(&mut self, session_guid: String, coins: Vec<Coin>) {
        if let Some(session) = self.session.as_mut() {
            if session.session_guid == session_guid {
                session.seeds.top_coins = Some(coins);
            }
        }
        self.try_dispatch(&session_guid).await;
    }

    async fn on_precision_data_fetched(&mut self, session_guid: String, precision_data: Vec<PrecisionEntry>) {
        if let Some(session) = self.session.as_mut() {
            if session.session_guid == session_guid {
                session.seeds.precision_data = Some(precision_data);
            }
        }
        self.try_dispatch(&session_guid).await;
    }

    /// Idempotent: dispatches exactly once, when both seeds have arrived (order unspecified,
    /// see §5's no-cross-topic-ordering guarantee).
    async fn try_dispatch(&mut self, session_guid: &str) {
        let ready = matches!(
            &self.session,
            Some(s) if s.session_guid == session_guid
                && s.phase == Phase::FetchingSeeds
                && s.seeds.top_coins.is_some()
                && s.seeds.precision_data.is_some()
        );
        if !ready {
            return;
        }

        let (coins, precision_data, config) = {
            let session = self.session.as_ref().expect("checked above");
            (
                session.seeds.top_coins.clone().expect("checked above"),
                session.seeds.precision_data.clone().expect("checked above"),
                session.config.clone(),
            )
        };

        // Filter: USDC-quoted base assets only.
        let eligible: HashSet<String> = precision_data
            .iter()
            .filter(|entry| entry.status && entry.quote_asset.eq_ignore_ascii_case("USDC"))
            .map(|entry| entry.base_asset.to_uppercase())
            .collect();

        let btc_coin = coins.iter().find(|c| c.is_btc()).cloned();
        let retained: Vec<Coin> = coins
            .into_iter()
            .filter(|c| !c.is_btc() && eligible.contains(&c.symbol.to_uppercase()))
            .collect();

        let Some(btc_coin) = btc_coin else {
            error!(session_guid, "BTC absent from the fetched coin universe, aborting session");
            if let Some(session) = self.session.as_mut() {
                session.phase = Phase::Shutdown;
            }
            self.bus
                .publish(Event::WorkerFailed {
                    session_guid: session_guid.to_string(),
                    worker: "orchestrator".to_string(),
                    reason: "BTC absent from fetched coin universe".to_string(),
                })
                .await;
            self.shutdown_all().await;
            return;
        };

        let positive_caps: Vec<f64> = retained.iter().filter_map(|c| c.market_cap).filter(|cap| *cap > 0.0).collect();
        let low_cap_threshold = low_cap::quantile(&positive_caps, config.low_cap_percentile / 100.0);

        let market_caps: HashMap<CoinIdSymbol, Option<f64>> = retained.iter().map(|c| (c.id_symbol(), c.market_cap)).collect();
        let coins_to_process: Vec<CoinIdSymbol> = retained.iter().map(Coin::id_symbol).collect();

        let mut dispatch_order = vec![btc_coin.id_symbol()];
        dispatch_order.extend(retained.iter().map(Coin::id_symbol));

        for coin in std::iter::once(&btc_coin).chain(retained.iter()) {
            self.bus
                .publish(Event::SingleCoinFetched { session_guid: session_guid.to_string(), coin: coin.clone() })
                .await;
        }

        if let Some(session) = self.session.as_mut() {
            for timeframe in &config.timeframes {
                let job = Arc::new(AnalysisJob::new(
                    timeframe.clone(),
                    &coins_to_process,
                    market_caps.clone(),
                    config.correlation_threshold,
                    config.rsi_period,
                    low_cap_threshold,
                ));
                session.jobs.insert(timeframe.clone(), job);
            }
            session.pending_jobs = config.timeframes.len();
            session.phase = Phase::Dispatching;
        }

        info!(session_guid, coins = coins_to_process.len(), timeframes = config.timeframes.len(), "dispatching jobs");
        for timeframe in &config.timeframes {
            for coin_id_symbol in &dispatch_order {
                self.bus
                    .publish(Event::FetchHistoricalPricesRequested {
                        session_guid: session_guid.to_string(),
                        coin_id_symbol: coin_id_symbol.clone(),
                        weeks: config.weeks,
                        timeframe: timeframe.clone(),
                        quote_currencies_override: None,
                    })
                    .await;
            }
        }
    }

    async fn on_historical_prices_fetched(
        &mut self,
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        timeframe: String,
        prices: Option<TabularPayload>,
    ) {
        match prices {
            Some(payload) => {
                self.bus
                    .publish(Event::CalculateRSIRequested {
                        session_guid,
                        coin_id_symbol,
                        timeframe,
                        prices: Some(payload),
                    })
                    .await;
            }
            None => {
                self.bus
                    .publish(Event::CoinProcessingFailed {
                        session_guid: session_guid.clone(),
                        coin_id_symbol: coin_id_symbol.clone(),
                        timeframe: timeframe.clone(),
                        reason: "no price data returned by the Data Fetcher".to_string(),
                    })
                    .await;
                self.apply_job_outcome(&session_guid, &timeframe, coin_id_symbol, None).await;
            }
        }
    }

    async fn on_rsi_calculated(&mut self, session_guid: String, coin_id_symbol: CoinIdSymbol, timeframe: String, rsi: Option<TabularPayload>) {
        let rsi = rsi.and_then(|payload| {
            match payload.into_rsi_series(&coin_id_symbol.0, &coin_id_symbol.1, &timeframe) {
                Ok(series) => Some(series),
                Err(err) => {
                    warn!(%err, coin_id = %coin_id_symbol.0, "failed to decode RSI payload");
                    None
                }
            }
        });
        if rsi.is_none() {
            self.bus
                .publish(Event::CoinProcessingFailed {
                    session_guid: session_guid.clone(),
                    coin_id_symbol: coin_id_symbol.clone(),
                    timeframe: timeframe.clone(),
                    reason: "RSI could not be computed (insufficient price history)".to_string(),
                })
                .await;
        }
        self.apply_job_outcome(&session_guid, &timeframe, coin_id_symbol, rsi).await;
    }

    async fn apply_job_outcome(&mut self, session_guid: &str, timeframe: &str, coin_id_symbol: CoinIdSymbol, rsi: Option<RsiSeries>) {
        let is_btc = coin_id_symbol.1.eq_ignore_ascii_case("BTC");
        let job = match &self.session {
            Some(session) if session.session_guid == session_guid => session.jobs.get(timeframe).cloned(),
            _ => None,
        };
        let Some(job) = job else {
            return;
        };

        let outcome = if is_btc { job.record_btc_outcome(coin_id_symbol, rsi) } else { job.record_coin_outcome(coin_id_symbol, rsi) };

        let JobOutcome::Completed { correlations, degraded } = outcome else {
            return;
        };
        if degraded {
            warn!(session_guid, timeframe, "completing job without BTC RSI, no correlations computed");
        }
        for result in &correlations {
            self.bus
                .publish(Event::CorrelationAnalyzed {
                    session_guid: session_guid.to_string(),
                    timeframe: timeframe.to_string(),
                    result: Some(result.clone()),
                })
                .await;
        }
        if let Some(session) = self.session.as_mut() {
            session.results.extend(correlations);
            session.pending_jobs = session.pending_jobs.saturating_sub(1);
        }
        self.bus
            .publish(Event::AnalysisJobCompleted { session_guid: session_guid.to_string(), timeframe: timeframe.to_string() })
            .await;
        self.maybe_finalize(session_guid).await;
    }

    async fn maybe_finalize(&mut self, session_guid: &str) {
        let ready = matches!(
            &self.session,
            Some(session) if session.session_guid == session_guid
                && session.phase == Phase::Dispatching
                && session.pending_jobs == 0
        );
        if !ready {
            return;
        }
        let results = {
            let session = self.session.as_mut().expect("checked above");
            session.phase = Phase::AwaitDisplay;
            std::mem::take(&mut session.results)
        };
        self.bus.publish(Event::FinalResultsReady { session_guid: session_guid.to_string(), results }).await;
    }

    async fn on_display_completed(&mut self, session_guid: String) {
        if let Some(session) = self.session.as_mut() {
            session.phase = Phase::Shutdown;
        }
        self.bus.publish(Event::AllProcessingCompleted { session_guid }).await;
        self.shutdown_all().await;
    }

    async fn on_worker_failed(&mut self, session_guid: String, worker: String, reason: String) {
        error!(session_guid, worker, reason, "worker reported a fatal failure, shutting down the session");
        if let Some(session) = self.session.as_mut() {
            session.phase = Phase::Shutdown;
        }
        self.bus.publish(Event::AllProcessingCompleted { session_guid }).await;
        self.shutdown_all().await;
    }

    /// Drains the Database Manager first so in-flight writes are not lost, then requests
    /// every worker to stop in reverse registration order.
    async fn shutdown_all(&mut self) {
        if let Some((_, db)) = self.workers.iter().find(|(name, _)| name == DATABASE_WORKER_NAME) {
            if !db.wait_for_queue_completion(DB_DRAIN_TIMEOUT).await {
                warn!("database manager did not drain within the shutdown timeout");
            }
        }
        for (name, handle) in self.workers.iter().rev() {
            handle.request_stop().await;
            info!(worker = %name, "requested stop");
        }
    }
}

#[async_trait]
impl WorkerHandler for OrchestratorHandler {
    type Task = Event;

    async fn handle(&mut self, task: Event) -> anyhow::Result<()> {
        match task {
            Event::AnalysisConfigurationProvided { session_guid, config } => self.on_configuration_provided(session_guid, config).await,
            Event::RunAnalysisRequested { session_guid } => self.on_run_requested(session_guid).await,
            Event::TopCoinsFetched { session_guid, coins } => self.on_top_coins_fetched(session_guid, coins).await,
            Event::PrecisionDataFetched { session_guid, precision_data } => {
                self.on_precision_data_fetched(session_guid, precision_data).await;
            }
            Event::HistoricalPricesFetched { session_guid, coin_id_symbol, timeframe, prices, .. } => {
                self.on_historical_prices_fetched(session_guid, coin_id_symbol, timeframe, prices).await;
            }
            Event::RSICalculated { session_guid, coin_id_symbol, timeframe, rsi } => {
                self.on_rsi_calculated(session_guid, coin_id_symbol, timeframe, rsi).await;
            }
            Event::DisplayCompleted { session_guid } => self.on_display_completed(session_guid).await,
            Event::WorkerFailed { session_guid, worker, reason } => self.on_worker_failed(session_guid, worker, reason).await,
            other => {
                warn!(topic = ?other.topic(), "Orchestrator received an event it does not handle, ignoring");
            }
        }
        Ok(())
    }
}

/// Topics the Orchestrator declares at construction.
pub const SUBSCRIBED_TOPICS: [Topic; 8] = [
    Topic::AnalysisConfigurationProvided,
    Topic::RunAnalysisRequested,
    Topic::TopCoinsFetched,
    Topic::PrecisionDataFetched,
    Topic::HistoricalPricesFetched,
    Topic::RSICalculated,
    Topic::DisplayCompleted,
    Topic::WorkerFailed,
];

/// The Orchestrator's task type is `Event` itself, so binding it to the bus is the identity
/// translation.
#[must_use]
pub const fn into_task(event: Event) -> Option<Event> {
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsi_correlator_worker::spawn;
    use std::time::Duration;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            weeks: 4,
            top_n_coins: 10,
            correlation_threshold: 0.5,
            rsi_period: 3,
            timeframes: vec!["1d".to_string()],
            low_cap_percentile: 25.0,
            ..Default::default()
        }
    }

    fn coin(id: &str, symbol: &str, market_cap: f64) -> Coin {
        Coin { id: id.to_string(), symbol: symbol.to_string(), market_cap: Some(market_cap) }
    }

    fn precision_entry(base_asset: &str) -> PrecisionEntry {
        PrecisionEntry {
            symbol: format!("{base_asset}USDC"),
            base_asset: base_asset.to_string(),
            quote_asset: "USDC".to_string(),
            status: true,
            base_asset_precision: 8,
            step_size: "0.00001".to_string(),
            min_qty: "0.00001".to_string(),
            tick_size: "0.01".to_string(),
            min_notional: "10".to_string(),
        }
    }

    /// Spins up an Orchestrator with no other registered workers and returns a handle plus a
    /// raw subscriber receiver the test drives by hand, standing in for the Data
    /// Fetcher/RSI Calculator/Display Agent in these scenario tests.
    async fn harness() -> (rsi_correlator_worker::WorkerHandle<Event>, ServiceBus, tokio::sync::mpsc::Receiver<Event>) {
        let bus = ServiceBus::new();
        let observer = bus
            .subscribe(
                "observer",
                &[
                    Topic::SingleCoinFetched,
                    Topic::FetchTopCoinsRequested,
                    Topic::FetchPrecisionDataRequested,
                    Topic::FetchHistoricalPricesRequested,
                    Topic::CalculateRSIRequested,
                    Topic::CoinProcessingFailed,
                    Topic::AnalysisJobCompleted,
                    Topic::FinalResultsReady,
                    Topic::AllProcessingCompleted,
                    Topic::WorkerFailed,
                ],
                64,
            )
            .await;
        let (handle, _join) = spawn("orchestrator", OrchestratorHandler::new(bus.clone(), vec![]), 64);
        (handle, bus, observer)
    }

    async fn drain_until<F: Fn(&Event) -> bool>(rx: &mut tokio::sync::mpsc::Receiver<Event>, pred: F) -> Event {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("bus channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn minimal_universe_completes_with_one_job_and_one_correlation() {
        let (handle, bus, mut rx) = harness().await;
        let session_guid = "s1".to_string();

        handle
            .submit(Event::AnalysisConfigurationProvided { session_guid: session_guid.clone(), config: config() })
            .await
            .unwrap();
        handle.submit(Event::RunAnalysisRequested { session_guid: session_guid.clone() }).await.unwrap();

        drain_until(&mut rx, |e| matches!(e, Event::FetchTopCoinsRequested { .. })).await;

        handle
            .submit(Event::TopCoinsFetched {
                session_guid: session_guid.clone(),
                coins: vec![coin("bitcoin", "BTC", 1_000_000.0), coin("dogecoin", "DOGE", 10.0)],
            })
            .await
            .unwrap();
        handle
            .submit(Event::PrecisionDataFetched {
                session_guid: session_guid.clone(),
                precision_data: vec![precision_entry("BTC"), precision_entry("DOGE")],
            })
            .await
            .unwrap();

        // BTC and DOGE both get dispatched for historical prices; answer both with a null
        // price series so the job completes without ever reaching the RSI Calculator.
        for _ in 0..2 {
            let event = drain_until(&mut rx, |e| matches!(e, Event::FetchHistoricalPricesRequested { .. })).await;
            let Event::FetchHistoricalPricesRequested { coin_id_symbol, timeframe, .. } = event else { unreachable!() };
            bus.publish(Event::HistoricalPricesFetched {
                session_guid: session_guid.clone(),
                coin_id_symbol,
                timeframe,
                prices: None,
                quote_currency: Some("USDC".to_string()),
            })
            .await;
        }

        // Both coins failed to fetch prices, so this is a degraded completion: no
        // correlation, but exactly one AnalysisJobCompleted and one FinalResultsReady.
        let completed = drain_until(&mut rx, |e| matches!(e, Event::AnalysisJobCompleted { .. })).await;
        assert!(matches!(completed, Event::AnalysisJobCompleted { timeframe, .. } if timeframe == "1d"));

        let final_results = drain_until(&mut rx, |e| matches!(e, Event::FinalResultsReady { .. })).await;
        match final_results {
            Event::FinalResultsReady { results, .. } => assert!(results.is_empty()),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn duplicate_rsi_event_only_decrements_once() {
        let (handle, bus, mut rx) = harness().await;
        let session_guid = "s1".to_string();

        handle
            .submit(Event::AnalysisConfigurationProvided { session_guid: session_guid.clone(), config: config() })
            .await
            .unwrap();
        handle.submit(Event::RunAnalysisRequested { session_guid: session_guid.clone() }).await.unwrap();
        drain_until(&mut rx, |e| matches!(e, Event::FetchTopCoinsRequested { .. })).await;

        handle
            .submit(Event::TopCoinsFetched { session_guid: session_guid.clone(), coins: vec![coin("bitcoin", "BTC", 1_000_000.0)] })
            .await
            .unwrap();
        handle
            .submit(Event::PrecisionDataFetched { session_guid: session_guid.clone(), precision_data: vec![precision_entry("BTC")] })
            .await
            .unwrap();

        drain_until(&mut rx, |e| matches!(e, Event::FetchHistoricalPricesRequested { .. })).await;

        let duplicate = Event::RSICalculated {
            session_guid: session_guid.clone(),
            coin_id_symbol: ("bitcoin".to_string(), "BTC".to_string()),
            timeframe: "1d".to_string(),
            rsi: None,
        };
        bus.publish(duplicate.clone()).await;
        bus.publish(duplicate).await;

        // Only one AnalysisJobCompleted should ever be published, even though BTC's outcome
        // was delivered twice: a second completion would mean the counter went negative and
        // a stray duplicate FinalResultsReady would follow.
        drain_until(&mut rx, |e| matches!(e, Event::AnalysisJobCompleted { .. })).await;
        drain_until(&mut rx, |e| matches!(e, Event::FinalResultsReady { .. })).await;
    }
}
