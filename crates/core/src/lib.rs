pub mod config;
pub mod config_loader;
pub mod domain;
pub mod error;
pub mod events;
pub mod traits;
pub mod wire;

pub use config::AnalysisConfig;
pub use config_loader::ConfigLoader;
pub use domain::{
    Coin, CoinIdSymbol, CorrelationResult, PrecisionEntry, PriceBar, PriceSeries, RsiPoint,
    RsiSeries,
};
pub use error::{AnalysisError, Result};
pub use events::{Event, Topic};
pub use traits::{ExchangeClient, MarketListProvider};
pub use wire::TabularPayload;
