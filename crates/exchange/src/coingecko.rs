use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::{direct::NotKeyed, InMemoryState}, Quota, RateLimiter};
use rsi_correlator_core::{Coin, MarketListProvider};
use serde::Deserialize;

use crate::error::FetchError;

/// `MarketListProvider` backed by CoinGecko's `/coins/markets` endpoint — the coin-universe
/// source named in §4.12.
pub struct CoinGeckoMarketListProvider {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl CoinGeckoMarketListProvider {
    /// Creates a client rate-limited to CoinGecko's public-tier budget (10 requests/second).
    ///
    /// # Panics
    /// Panics if the rate limiter quota cannot be constructed (never, for a nonzero const).
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(10).unwrap());
        Self {
            http: reqwest::Client::new(),
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMarketEntry {
    id: String,
    symbol: String,
    market_cap: Option<f64>,
}

impl From<RawMarketEntry> for Coin {
    fn from(raw: RawMarketEntry) -> Self {
        Self {
            id: raw.id,
            symbol: raw.symbol.to_uppercase(),
            market_cap: raw.market_cap,
        }
    }
}

#[async_trait]
impl MarketListProvider for CoinGeckoMarketListProvider {
    async fn top_coins_page(&self, page: u32, per_page: u32) -> anyhow::Result<Vec<Coin>> {
        self.rate_limiter.until_ready().await;
        let url = format!(
            "{}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={per_page}&page={page}&sparkline=false",
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
        let raw: Vec<RawMarketEntry> = response.json().await.map_err(FetchError::from)?;
        Ok(raw.into_iter().map(Coin::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn top_coins_page_uppercases_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "bitcoin", "symbol": "btc", "market_cap": 1_000_000.0},
                {"id": "dogecoin", "symbol": "doge", "market_cap": null},
            ])))
            .mount(&server)
            .await;
        let client = CoinGeckoMarketListProvider::new(server.uri());

        let coins = client.top_coins_page(1, 100).await.unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].symbol, "BTC");
        assert_eq!(coins[0].market_cap, Some(1_000_000.0));
        assert_eq!(coins[1].market_cap, None);
    }

    #[tokio::test]
    async fn non_success_status_surfaces_as_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let client = CoinGeckoMarketListProvider::new(server.uri());

        let err = client.top_coins_page(1, 100).await.unwrap_err();
        let fetch_err = err.downcast_ref::<FetchError>().expect("should downcast to FetchError");
        assert!(fetch_err.is_transient());
    }
}
