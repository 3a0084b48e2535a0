pub mod binance;
pub mod coingecko;
pub mod error;

pub use binance::BinanceExchangeClient;
pub use coingecko::CoinGeckoMarketListProvider;
pub use error::FetchError;
