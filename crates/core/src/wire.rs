//! Portable tabular wire encoding for price/RSI series (split orientation), per the design
//! note that event payloads carrying in-memory frames serialise to a columnar form at the
//! bus boundary, even though the bus here is in-process.

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PriceBar, PriceSeries, RsiPoint, RsiSeries};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabularPayload {
    pub index: Vec<i64>,
    pub columns: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];
const RSI_COLUMNS: [&str; 1] = ["value"];

impl From<&PriceSeries> for TabularPayload {
    fn from(series: &PriceSeries) -> Self {
        Self {
            index: series.bars.iter().map(|bar| bar.timestamp.timestamp_millis()).collect(),
            columns: PRICE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            data: series
                .bars
                .iter()
                .map(|bar| vec![bar.open, bar.high, bar.low, bar.close, bar.volume])
                .collect(),
        }
    }
}

impl From<&RsiSeries> for TabularPayload {
    fn from(series: &RsiSeries) -> Self {
        Self {
            index: series.points.iter().map(|p| p.timestamp.timestamp_millis()).collect(),
            columns: RSI_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            data: series.points.iter().map(|p| vec![p.value]).collect(),
        }
    }
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid millisecond timestamp: {ms}"))
}

impl TabularPayload {
    /// Reconstructs a `PriceSeries` for `(coin_id, symbol, timeframe)` from this payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the column layout does not match `PRICE_COLUMNS`, or a row does
    /// not have one value per column, or a timestamp is out of range.
    pub fn into_price_series(self, coin_id: &str, symbol: &str, timeframe: &str) -> Result<PriceSeries> {
        if self.columns != PRICE_COLUMNS {
            bail!("unexpected columns for price payload: {:?}", self.columns);
        }
        let mut bars = Vec::with_capacity(self.data.len());
        for (ts, row) in self.index.iter().zip(self.data.iter()) {
            let [open, high, low, close, volume] = row[..] else {
                bail!("price row does not have exactly 5 values");
            };
            bars.push(PriceBar {
                timestamp: millis_to_utc(*ts)?,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        Ok(PriceSeries {
            coin_id: coin_id.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            bars,
        })
    }

    /// Reconstructs an `RsiSeries` for `(coin_id, symbol, timeframe)` from this payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the column layout does not match `RSI_COLUMNS`, or a row does not
    /// carry exactly one value, or a timestamp is out of range.
    pub fn into_rsi_series(self, coin_id: &str, symbol: &str, timeframe: &str) -> Result<RsiSeries> {
        if self.columns != RSI_COLUMNS {
            bail!("unexpected columns for RSI payload: {:?}", self.columns);
        }
        let mut points = Vec::with_capacity(self.data.len());
        for (ts, row) in self.index.iter().zip(self.data.iter()) {
            let [value] = row[..] else {
                bail!("RSI row does not have exactly 1 value");
            };
            points.push(RsiPoint {
                timestamp: millis_to_utc(*ts)?,
                value,
            });
        }
        Ok(RsiSeries {
            coin_id: coin_id.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_series_round_trips_through_tabular_payload() {
        let series = PriceSeries {
            coin_id: "bitcoin".to_string(),
            symbol: "BTC".to_string(),
            timeframe: "1d".to_string(),
            bars: vec![PriceBar {
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 100.0,
            }],
        };
        let payload = TabularPayload::from(&series);
        let restored = payload.into_price_series("bitcoin", "BTC", "1d").unwrap();
        assert_eq!(restored, series);
    }
}
