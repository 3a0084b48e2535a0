use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a coin as used throughout the pipeline: `(coingecko id, exchange symbol)`.
pub type CoinIdSymbol = (String, String);

/// A single entry from the coin universe. Identity is `(id, symbol)`; `market_cap` may be
/// absent if the upstream source omitted it for that coin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coin {
    pub id: String,
    pub symbol: String,
    pub market_cap: Option<f64>,
}

impl Coin {
    #[must_use]
    pub fn id_symbol(&self) -> CoinIdSymbol {
        (self.id.clone(), self.symbol.clone())
    }

    #[must_use]
    pub fn is_btc(&self) -> bool {
        self.symbol.eq_ignore_ascii_case("btc")
    }
}

/// One OHLCV candle, UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Timestamped OHLCV rows for one coin on one timeframe. Invariant: `bars` is sorted by
/// strictly increasing timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    pub coin_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    #[must_use]
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }
}

/// A single `(timestamp, RSI value)` point. `value` is always in `[0, 100]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RsiPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// RSI series for one coin on one timeframe, derived from a `PriceSeries`. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RsiSeries {
    pub coin_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub points: Vec<RsiPoint>,
}

/// Market-precision metadata for one exchange symbol (extracted from `LOT_SIZE`,
/// `PRICE_FILTER`, and `NOTIONAL` filters).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrecisionEntry {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: bool,
    pub base_asset_precision: u32,
    pub step_size: String,
    pub min_qty: String,
    pub tick_size: String,
    pub min_notional: String,
}

/// A retained correlation result. Created only when `|correlation| >= threshold` and the
/// common index length is `>= rsi_period`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationResult {
    pub coin_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub correlation: f64,
    pub market_cap: Option<f64>,
    pub low_cap_quartile: bool,
    /// The last timestamp common to both RSI series used in the correlation — the data-derived
    /// "as-of" time for this result, not wall-clock-at-insert.
    pub run_timestamp: DateTime<Utc>,
}
