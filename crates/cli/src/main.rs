use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rsi_correlator_bus::{ServiceBus, DEFAULT_SUBSCRIBER_CAPACITY};
use rsi_correlator_core::{AnalysisConfig, ConfigLoader, Event, ExchangeClient, MarketListProvider, Topic};
use rsi_correlator_database::DatabaseManagerHandler;
use rsi_correlator_display::DisplayAgentHandler;
use rsi_correlator_exchange::{BinanceExchangeClient, CoinGeckoMarketListProvider};
use rsi_correlator_fetcher::DataFetcherHandler;
use rsi_correlator_orchestrator::OrchestratorHandler;
use rsi_correlator_rsi::RsiCalculatorHandler;
use rsi_correlator_worker::{forward_from_bus, spawn, Stoppable};
use tracing::{error, info};

const ORCHESTRATOR_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "rsi-correlator")]
#[command(about = "Scans a coin universe for low-cap assets whose RSI tracks Bitcoin's", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one analysis session end to end and exit.
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Optional TOML configuration file; layered under defaults and `RSI_`-prefixed env vars.
    #[arg(short, long)]
    config: Option<String>,

    /// Overrides `db_path`.
    #[arg(long)]
    db_path: Option<String>,

    /// Overrides `weeks`.
    #[arg(long)]
    weeks: Option<u32>,

    /// Overrides `top_n_coins`.
    #[arg(long = "top-n-coins")]
    top_n_coins: Option<u32>,

    /// Overrides `correlation_threshold`.
    #[arg(long)]
    correlation_threshold: Option<f64>,

    /// Overrides `rsi_period`.
    #[arg(long)]
    rsi_period: Option<u32>,

    /// Overrides `timeframes`; comma-separated, e.g. `1h,1d`.
    #[arg(long, value_delimiter = ',')]
    timeframes: Option<Vec<String>>,

    /// Overrides `low_cap_percentile`.
    #[arg(long)]
    low_cap_percentile: Option<f64>,
}

impl RunArgs {
    fn apply_overrides(&self, config: &mut AnalysisConfig) {
        if let Some(ref path) = self.db_path {
            config.db_path = path.clone();
        }
        if let Some(weeks) = self.weeks {
            config.weeks = weeks;
        }
        if let Some(n) = self.top_n_coins {
            config.top_n_coins = n;
        }
        if let Some(threshold) = self.correlation_threshold {
            config.correlation_threshold = threshold;
        }
        if let Some(period) = self.rsi_period {
            config.rsi_period = period;
        }
        if let Some(ref timeframes) = self.timeframes {
            config.timeframes = timeframes.clone();
        }
        if let Some(percentile) = self.low_cap_percentile {
            config.low_cap_percentile = percentile;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Run(args) => run_session(args).await,
    };
    std::process::exit(exit_code);
}

/// Loads and validates configuration, wires every worker onto a fresh service bus, runs one
/// session to completion, and returns the process exit code mandated by §6: `0` on
/// `AllProcessingCompleted` reached normally, `1` on configuration validation failure before
/// start, `1` if any worker signalled `WorkerFailed` before shutdown.
async fn run_session(args: RunArgs) -> i32 {
    let mut config = match ConfigLoader::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "failed to load configuration");
            return 1;
        }
    };
    args.apply_overrides(&mut config);

    if let Err(err) = config.validate() {
        error!(%err, "configuration invalid");
        return err.exit_code();
    }

    match run_pipeline(config).await {
        Ok(worker_failed) => i32::from(worker_failed),
        Err(err) => {
            error!(%err, "session aborted before completion");
            1
        }
    }
}

/// Wires the pipeline and drives one session. Returns `true` if a `WorkerFailed` was observed
/// before `AllProcessingCompleted` (mandating exit code 1), `false` otherwise.
async fn run_pipeline(config: AnalysisConfig) -> anyhow::Result<bool> {
    let session_guid = uuid::Uuid::new_v4().to_string();
    info!(session_guid, timeframes = ?config.timeframes, "starting analysis session");

    let bus = ServiceBus::new();
    let db_pool = rsi_correlator_database::open(&config.db_path).await.context("opening the analysis database")?;

    let market_list: Arc<dyn MarketListProvider> = Arc::new(CoinGeckoMarketListProvider::new(config.market_list_base_url.clone()));
    let exchange: Arc<dyn ExchangeClient> = Arc::new(BinanceExchangeClient::new(config.exchange_base_url.clone()));

    let db_capacity = 4 * config.timeframes.len().max(1) * config.top_n_coins.max(1) as usize;

    // Each worker: subscribe its declared topics on the bus, spawn its processing loop, and
    // bind the two with a forwarding task (§4.2's "the base binds them to the service bus at
    // start"). Registration order below is what `shutdown_all` reverses at session end.
    let db_rx = bus
        .subscribe(rsi_correlator_orchestrator::DATABASE_WORKER_NAME, &rsi_correlator_database::SUBSCRIBED_TOPICS, db_capacity)
        .await;
    let (db_handle, db_join) = spawn(
        rsi_correlator_orchestrator::DATABASE_WORKER_NAME,
        DatabaseManagerHandler::new(db_pool),
        db_capacity,
    );
    let db_forward = forward_from_bus(db_rx, db_handle.clone(), rsi_correlator_database::into_task);

    let rsi_rx = bus.subscribe("rsi-calculator", &rsi_correlator_rsi::SUBSCRIBED_TOPICS, DEFAULT_SUBSCRIBER_CAPACITY).await;
    let (rsi_handle, rsi_join) = spawn("rsi-calculator", RsiCalculatorHandler::new(bus.clone()), DEFAULT_SUBSCRIBER_CAPACITY);
    let rsi_forward = forward_from_bus(rsi_rx, rsi_handle.clone(), rsi_correlator_rsi::into_task);

    let fetcher_rx = bus.subscribe("data-fetcher", &rsi_correlator_fetcher::SUBSCRIBED_TOPICS, DEFAULT_SUBSCRIBER_CAPACITY).await;
    let (fetcher_handle, fetcher_join) = spawn(
        "data-fetcher",
        DataFetcherHandler::new(bus.clone(), market_list, exchange),
        DEFAULT_SUBSCRIBER_CAPACITY,
    );
    let fetcher_forward = forward_from_bus(fetcher_rx, fetcher_handle.clone(), rsi_correlator_fetcher::into_task);

    let display_rx = bus.subscribe("display-agent", &rsi_correlator_display::SUBSCRIBED_TOPICS, DEFAULT_SUBSCRIBER_CAPACITY).await;
    let (display_handle, display_join) = spawn("display-agent", DisplayAgentHandler::new(bus.clone()), DEFAULT_SUBSCRIBER_CAPACITY);
    let display_forward = forward_from_bus(display_rx, display_handle.clone(), rsi_correlator_display::into_task);

    let workers: Vec<(String, Box<dyn Stoppable>)> = vec![
        (rsi_correlator_orchestrator::DATABASE_WORKER_NAME.to_string(), Box::new(db_handle.clone())),
        ("rsi-calculator".to_string(), Box::new(rsi_handle.clone())),
        ("data-fetcher".to_string(), Box::new(fetcher_handle.clone())),
        ("display-agent".to_string(), Box::new(display_handle.clone())),
    ];

    let orchestrator_rx = bus
        .subscribe("orchestrator", &rsi_correlator_orchestrator::SUBSCRIBED_TOPICS, DEFAULT_SUBSCRIBER_CAPACITY)
        .await;
    let (orchestrator_handle, orchestrator_join) =
        spawn("orchestrator", OrchestratorHandler::new(bus.clone(), workers), DEFAULT_SUBSCRIBER_CAPACITY);
    let orchestrator_forward = forward_from_bus(orchestrator_rx, orchestrator_handle.clone(), rsi_correlator_orchestrator::into_task);

    // The CLI itself observes terminal events to know when to stop waiting and what exit
    // code to return; it is not a pipeline worker, just the process's own off-bus listener.
    let mut completion_rx = bus.subscribe("cli", &[Topic::AllProcessingCompleted, Topic::WorkerFailed], 16).await;

    // Published on the bus, not submitted straight into the Orchestrator's own inbox: the RSI
    // Calculator also subscribes to `AnalysisConfigurationProvided` (to learn `rsi_period`
    // before its first `CalculateRSIRequested`), so both must see it via their own forwarding
    // tasks rather than only the Orchestrator.
    bus.publish(Event::AnalysisConfigurationProvided { session_guid: session_guid.clone(), config: config.clone() })
        .await;
    bus.publish(Event::RunAnalysisRequested { session_guid: session_guid.clone() }).await;

    let mut worker_failed = false;
    loop {
        match completion_rx.recv().await {
            Some(Event::WorkerFailed { worker, reason, .. }) => {
                error!(worker, reason, "worker reported a fatal failure");
                worker_failed = true;
            }
            Some(Event::AllProcessingCompleted { .. }) => break,
            Some(_) | None => break,
        }
    }

    orchestrator_handle.request_stop().await;
    let _ = tokio::time::timeout(ORCHESTRATOR_STOP_TIMEOUT, orchestrator_join).await;
    for join in [db_join, rsi_join, fetcher_join, display_join, db_forward, rsi_forward, fetcher_forward, display_forward, orchestrator_forward]
    {
        join.abort();
    }

    info!(session_guid, worker_failed, "session finished");
    Ok(worker_failed)
}
