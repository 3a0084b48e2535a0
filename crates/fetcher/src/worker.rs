use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rsi_correlator_bus::ServiceBus;
use rsi_correlator_core::{
    Coin, CoinIdSymbol, Event, ExchangeClient, MarketListProvider, PriceSeries, TabularPayload, Topic,
};
use rsi_correlator_exchange::FetchError;
use rsi_correlator_worker::WorkerHandler;
use tracing::{error, info, warn};

use crate::retry::RetryPolicy;

const PAGE_SIZE: u32 = 100;
const MAX_OHLCV_ROWS: u32 = 1000;

pub enum FetcherTask {
    TopCoins {
        session_guid: String,
        n: u32,
    },
    PrecisionData {
        session_guid: String,
    },
    HistoricalPrices {
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        weeks: u32,
        timeframe: String,
        /// Overrides the handler's default quote-currency list for this one fetch.
        quote_currencies_override: Option<Vec<String>>,
    },
}

pub struct DataFetcherHandler {
    bus: ServiceBus,
    market_list: Arc<dyn MarketListProvider>,
    exchange: Arc<dyn ExchangeClient>,
    default_quote_currencies: Vec<String>,
    retry: RetryPolicy,
}

impl DataFetcherHandler {
    #[must_use]
    pub fn new(bus: ServiceBus, market_list: Arc<dyn MarketListProvider>, exchange: Arc<dyn ExchangeClient>) -> Self {
        Self {
            bus,
            market_list,
            exchange,
            default_quote_currencies: vec!["USDC".to_string()],
            retry: RetryPolicy::data_fetcher(),
        }
    }

    #[must_use]
    pub fn with_quote_currencies(mut self, quotes: Vec<String>) -> Self {
        self.default_quote_currencies = quotes;
        self
    }

    fn is_transient(err: &anyhow::Error) -> bool {
        err.downcast_ref::<FetchError>().map(FetchError::is_transient).unwrap_or(false)
    }

    async fn fetch_top_coins(&self, n: u32, session_guid: String) {
        let pages = n.div_ceil(PAGE_SIZE);
        let mut coins: Vec<Coin> = Vec::new();
        for page in 1..=pages {
            let result = self
                .retry
                .execute(Self::is_transient, || self.market_list.top_coins_page(page, PAGE_SIZE))
                .await;
            match result {
                Ok(mut page_coins) => coins.append(&mut page_coins),
                Err(err) => {
                    error!(page, %err, "failed to fetch a page of the coin universe, continuing with remaining pages");
                }
            }
        }
        coins.truncate(n as usize);
        self.bus.publish(Event::TopCoinsFetched { session_guid, coins }).await;
    }

    async fn fetch_precision_data(&self, session_guid: String) {
        let result = self
            .retry
            .execute(Self::is_transient, || self.exchange.active_markets())
            .await;
        let precision_data = match result {
            Ok(data) => data,
            Err(err) => {
                error!(%err, "failed to fetch market precision data after retries");
                Vec::new()
            }
        };
        info!(count = precision_data.len(), "fetched market precision data");
        self.bus
            .publish(Event::PrecisionDataFetched { session_guid, precision_data })
            .await;
    }

    async fn fetch_historical_prices(
        &self,
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        weeks: u32,
        timeframe: String,
        quote_currencies_override: Option<Vec<String>>,
    ) {
        let (coin_id, symbol) = coin_id_symbol.clone();
        let quotes = quote_currencies_override.unwrap_or_else(|| self.default_quote_currencies.clone());

        let mut resolved: Option<(String, String)> = None;
        for quote in &quotes {
            let exchange_symbol = format!("{}{}", symbol.to_uppercase(), quote.to_uppercase());
            match self.exchange.symbol_exists(&exchange_symbol).await {
                Ok(true) => {
                    resolved = Some((exchange_symbol, quote.clone()));
                    break;
                }
                Ok(false) => continue,
                Err(err) => {
                    warn!(%err, exchange_symbol, "error checking symbol existence, treating as not found");
                }
            }
        }

        let Some((exchange_symbol, quote_currency)) = resolved else {
            warn!(symbol, ?quotes, "no symbol found on the exchange for any configured quote currency");
            self.bus
                .publish(Event::HistoricalPricesFetched {
                    session_guid,
                    coin_id_symbol,
                    timeframe,
                    prices: None,
                    quote_currency: None,
                })
                .await;
            return;
        };

        let since_ms = Utc::now().timestamp_millis() - i64::from(weeks) * 7 * 24 * 3600 * 1000;
        let result = self
            .retry
            .execute(Self::is_transient, || {
                self.exchange.fetch_ohlcv(&exchange_symbol, &timeframe, since_ms, MAX_OHLCV_ROWS)
            })
            .await;

        let prices = match result {
            Ok(bars) if bars.is_empty() => {
                warn!(exchange_symbol, "exchange returned an empty OHLCV series");
                None
            }
            Ok(bars) => Some(TabularPayload::from(&PriceSeries {
                coin_id,
                symbol: symbol.clone(),
                timeframe: timeframe.clone(),
                bars,
            })),
            Err(err) => {
                error!(%err, exchange_symbol, "failed to fetch OHLCV after retries");
                None
            }
        };

        self.bus
            .publish(Event::HistoricalPricesFetched {
                session_guid,
                coin_id_symbol,
                timeframe,
                prices,
                quote_currency: Some(quote_currency),
            })
            .await;
    }
}

#[async_trait]
impl WorkerHandler for DataFetcherHandler {
    type Task = FetcherTask;

    async fn handle(&mut self, task: FetcherTask) -> anyhow::Result<()> {
        match task {
            FetcherTask::TopCoins { session_guid, n } => self.fetch_top_coins(n, session_guid).await,
            FetcherTask::PrecisionData { session_guid } => self.fetch_precision_data(session_guid).await,
            FetcherTask::HistoricalPrices {
                session_guid,
                coin_id_symbol,
                weeks,
                timeframe,
                quote_currencies_override,
            } => {
                self.fetch_historical_prices(session_guid, coin_id_symbol, weeks, timeframe, quote_currencies_override)
                    .await;
            }
        }
        Ok(())
    }
}

/// Topics the Data Fetcher declares at construction; the CLI subscribes on its behalf and
/// binds the resulting receiver with [`into_task`].
pub const SUBSCRIBED_TOPICS: [Topic; 3] = [
    Topic::FetchTopCoinsRequested,
    Topic::FetchPrecisionDataRequested,
    Topic::FetchHistoricalPricesRequested,
];

/// Translates a bus event into this worker's task type, or `None` for a topic it does not
/// act on (never reached given [`SUBSCRIBED_TOPICS`], but kept total for forward_from_bus).
#[must_use]
pub fn into_task(event: Event) -> Option<FetcherTask> {
    match event {
        Event::FetchTopCoinsRequested { session_guid, n } => Some(FetcherTask::TopCoins { session_guid, n }),
        Event::FetchPrecisionDataRequested { session_guid } => Some(FetcherTask::PrecisionData { session_guid }),
        Event::FetchHistoricalPricesRequested {
            session_guid,
            coin_id_symbol,
            weeks,
            timeframe,
            quote_currencies_override,
        } => Some(FetcherTask::HistoricalPrices {
            session_guid,
            coin_id_symbol,
            weeks,
            timeframe,
            quote_currencies_override,
        }),
        _ => None,
    }
}
