use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{clock::DefaultClock, state::{direct::NotKeyed, InMemoryState}, Quota, RateLimiter};
use rsi_correlator_core::{ExchangeClient, PrecisionEntry, PriceBar};
use serde::Deserialize;

use crate::error::FetchError;

/// `ExchangeClient` backed by Binance's public REST surface — the OHLCV and market-filter
/// source named in §4.12.
pub struct BinanceExchangeClient {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl BinanceExchangeClient {
    /// Creates a client rate-limited to a conservative 20 requests/second.
    ///
    /// # Panics
    /// Panics if the rate limiter quota cannot be constructed (never, for a nonzero const).
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(20).unwrap());
        Self {
            http: reqwest::Client::new(),
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn exchange_info(&self) -> Result<ExchangeInfo, FetchError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Api {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    status: String,
    #[serde(rename = "baseAssetPrecision")]
    base_asset_precision: u32,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
struct SymbolFilter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(rename = "stepSize", default)]
    step_size: Option<String>,
    #[serde(rename = "minQty", default)]
    min_qty: Option<String>,
    #[serde(rename = "tickSize", default)]
    tick_size: Option<String>,
    #[serde(rename = "minNotional", default)]
    min_notional: Option<String>,
}

impl SymbolInfo {
    fn precision_entry(&self) -> Option<PrecisionEntry> {
        let lot_size = self.filters.iter().find(|f| f.filter_type == "LOT_SIZE")?;
        let price_filter = self.filters.iter().find(|f| f.filter_type == "PRICE_FILTER")?;
        let notional = self.filters.iter().find(|f| f.filter_type == "NOTIONAL")?;
        Some(PrecisionEntry {
            symbol: self.symbol.clone(),
            base_asset: self.base_asset.clone(),
            quote_asset: self.quote_asset.clone(),
            status: self.status == "TRADING",
            base_asset_precision: self.base_asset_precision,
            step_size: lot_size.step_size.clone()?,
            min_qty: lot_size.min_qty.clone()?,
            tick_size: price_filter.tick_size.clone()?,
            min_notional: notional.min_notional.clone()?,
        })
    }
}

#[async_trait]
impl ExchangeClient for BinanceExchangeClient {
    async fn symbol_exists(&self, symbol: &str) -> anyhow::Result<bool> {
        let info = self.exchange_info().await?;
        Ok(info.symbols.iter().any(|s| s.symbol == symbol && s.status == "TRADING"))
    }

    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, since_ms: i64, limit: u32) -> anyhow::Result<Vec<PriceBar>> {
        self.rate_limiter.until_ready().await;
        // Binance's `interval` query parameter already uses the same resolution labels this
        // pipeline's `timeframe` field does ("1h", "1d", ...), so no translation table is needed.
        let url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval={timeframe}&startTime={since_ms}&limit={limit}",
            self.base_url
        );
        let response = self.http.get(&url).send().await.map_err(FetchError::from)?;
        if !response.status().is_success() {
            return Err(FetchError::Api {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            }
            .into());
        }
        let raw: Vec<serde_json::Value> = response.json().await.map_err(FetchError::from)?;
        let mut bars = Vec::with_capacity(raw.len());
        for row in raw {
            let array = row
                .as_array()
                .ok_or_else(|| FetchError::Deserialization("kline row is not an array".to_string()))?;
            let open_time = array[0]
                .as_i64()
                .ok_or_else(|| FetchError::Deserialization("missing open time".to_string()))?;
            let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(open_time)
                .ok_or_else(|| FetchError::Deserialization(format!("invalid timestamp {open_time}")))?;
            let parse = |idx: usize| -> Result<f64, FetchError> {
                array[idx]
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or_else(|| FetchError::Deserialization(format!("bad numeric field at index {idx}")))
            };
            bars.push(PriceBar {
                timestamp,
                open: parse(1)?,
                high: parse(2)?,
                low: parse(3)?,
                close: parse(4)?,
                volume: parse(5)?,
            });
        }
        bars.sort_by_key(|bar| bar.timestamp);
        Ok(bars)
    }

    async fn active_markets(&self) -> anyhow::Result<Vec<PrecisionEntry>> {
        let info = self.exchange_info().await?;
        Ok(info
            .symbols
            .iter()
            .filter(|s| s.status == "TRADING")
            .filter_map(SymbolInfo::precision_entry)
            .collect())
    }
}
