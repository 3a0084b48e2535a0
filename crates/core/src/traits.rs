use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{Coin, PrecisionEntry, PriceBar};

/// Coin-universe source (§4.12). Modelled on CoinGecko's paginated markets endpoint; a
/// concrete implementation lives in the `exchange` crate.
#[async_trait]
pub trait MarketListProvider: Send + Sync {
    async fn top_coins_page(&self, page: u32, per_page: u32) -> Result<Vec<Coin>>;
}

/// Exchange OHLCV + market-filter source (§4.12). Modelled on Binance's public REST
/// surface; a concrete implementation lives in the `exchange` crate.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn symbol_exists(&self, symbol: &str) -> Result<bool>;
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, since_ms: i64, limit: u32) -> Result<Vec<PriceBar>>;
    async fn active_markets(&self) -> Result<Vec<PrecisionEntry>>;
}
