use async_trait::async_trait;
use rsi_correlator_bus::ServiceBus;
use rsi_correlator_core::{CoinIdSymbol, Event, PriceSeries, RsiPoint, RsiSeries, TabularPayload, Topic};
use rsi_correlator_worker::WorkerHandler;
use tracing::{info, warn};

use crate::calculator;

/// Unit of work accepted by the RSI Calculator worker (C4). One variant per bus subscription
/// it holds, mirroring the "declare your subscriptions, the base binds them" contract of
/// Worker Base.
pub enum RsiTask {
    ConfigurationProvided {
        rsi_period: u32,
    },
    CalculateRequested {
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        timeframe: String,
        prices: Option<TabularPayload>,
    },
}

pub struct RsiCalculatorHandler {
    bus: ServiceBus,
    rsi_period: Option<u32>,
}

impl RsiCalculatorHandler {
    #[must_use]
    pub fn new(bus: ServiceBus) -> Self {
        Self { bus, rsi_period: None }
    }
}

#[async_trait]
impl WorkerHandler for RsiCalculatorHandler {
    type Task = RsiTask;

    async fn handle(&mut self, task: RsiTask) -> anyhow::Result<()> {
        match task {
            RsiTask::ConfigurationProvided { rsi_period } => {
                self.rsi_period = Some(rsi_period);
                info!(rsi_period, "RSI Calculator received session configuration");
                Ok(())
            }
            RsiTask::CalculateRequested {
                session_guid,
                coin_id_symbol,
                timeframe,
                prices,
            } => {
                let Some(period) = self.rsi_period else {
                    anyhow::bail!("RSI Calculator received a request before configuration");
                };
                let series = prices.and_then(|payload| {
                    match payload.into_price_series(&coin_id_symbol.0, &coin_id_symbol.1, &timeframe) {
                        Ok(series) => Some(series),
                        Err(err) => {
                            warn!(%err, coin_id = %coin_id_symbol.0, "failed to decode price payload");
                            None
                        }
                    }
                });
                let rsi = series
                    .as_ref()
                    .and_then(|series| build_rsi_series(series, period))
                    .as_ref()
                    .map(TabularPayload::from);
                self.bus
                    .publish(Event::RSICalculated {
                        session_guid,
                        coin_id_symbol,
                        timeframe,
                        rsi,
                    })
                    .await;
                Ok(())
            }
        }
    }
}

/// Topics the RSI Calculator declares at construction.
pub const SUBSCRIBED_TOPICS: [Topic; 2] = [Topic::AnalysisConfigurationProvided, Topic::CalculateRSIRequested];

/// Translates a bus event into this worker's task type, or `None` for a topic it does not
/// act on.
#[must_use]
pub fn into_task(event: Event) -> Option<RsiTask> {
    match event {
        Event::AnalysisConfigurationProvided { config, .. } => Some(RsiTask::ConfigurationProvided { rsi_period: config.rsi_period }),
        Event::CalculateRSIRequested { session_guid, coin_id_symbol, timeframe, prices } => {
            Some(RsiTask::CalculateRequested { session_guid, coin_id_symbol, timeframe, prices })
        }
        _ => None,
    }
}

fn build_rsi_series(series: &PriceSeries, period: u32) -> Option<RsiSeries> {
    let closes = series.closes();
    let values = calculator::calculate(&closes, period as usize);
    if values.is_empty() {
        return None;
    }
    let points = values
        .into_iter()
        .map(|(index, value)| RsiPoint {
            timestamp: series.bars[index].timestamp,
            value,
        })
        .collect();
    Some(RsiSeries {
        coin_id: series.coin_id.clone(),
        symbol: series.symbol.clone(),
        timeframe: series.timeframe.clone(),
        points,
    })
}
