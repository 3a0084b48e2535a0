use async_trait::async_trait;
use rsi_correlator_core::Event;
use rsi_correlator_worker::WorkerHandler;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DatabaseError;

/// The Database Manager's unit of work is simply the subset of `Event` it subscribes to —
/// it is the one worker that fans in from several topics rather than one.
pub struct DatabaseManagerHandler {
    pool: SqlitePool,
}

impl DatabaseManagerHandler {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_token(&self, coin_id: &str, symbol: &str, market_cap: Option<f64>, session_guid: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO tokens (coin_id, session_guid, symbol, market_cap)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(coin_id, session_guid) DO UPDATE SET
                symbol = excluded.symbol,
                market_cap = excluded.market_cap
            ",
        )
        .bind(coin_id)
        .bind(session_guid)
        .bind(symbol)
        .bind(market_cap)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_prices(&self, event: &Event) -> Result<(), DatabaseError> {
        let Event::HistoricalPricesFetched { session_guid, coin_id_symbol, timeframe, prices, .. } = event else {
            unreachable!("insert_prices called with the wrong event variant");
        };
        let Some(payload) = prices else {
            return Ok(());
        };
        let (coin_id, symbol) = coin_id_symbol;
        let series = payload
            .clone()
            .into_price_series(coin_id, symbol, timeframe)
            .map_err(|err| DatabaseError::Decode(err.to_string()))?;
        let mut tx = self.pool.begin().await?;
        for bar in &series.bars {
            sqlx::query(
                r"
                INSERT OR IGNORE INTO prices
                    (coin_id, timestamp, session_guid, timeframe, symbol, open, high, low, close, volume)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
            )
            .bind(coin_id)
            .bind(bar.timestamp.to_rfc3339())
            .bind(session_guid)
            .bind(timeframe)
            .bind(symbol)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_rsi(&self, event: &Event) -> Result<(), DatabaseError> {
        let Event::RSICalculated { session_guid, coin_id_symbol, timeframe, rsi } = event else {
            unreachable!("insert_rsi called with the wrong event variant");
        };
        let Some(payload) = rsi else {
            return Ok(());
        };
        let (coin_id, symbol) = coin_id_symbol;
        let series = payload
            .clone()
            .into_rsi_series(coin_id, symbol, timeframe)
            .map_err(|err| DatabaseError::Decode(err.to_string()))?;
        let mut tx = self.pool.begin().await?;
        for point in &series.points {
            sqlx::query(
                r"
                INSERT OR IGNORE INTO rsi (coin_id, timestamp, session_guid, timeframe, symbol, value)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(coin_id)
            .bind(point.timestamp.to_rfc3339())
            .bind(session_guid)
            .bind(timeframe)
            .bind(symbol)
            .bind(point.value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_correlation(&self, event: &Event) -> Result<(), DatabaseError> {
        let Event::CorrelationAnalyzed { session_guid, timeframe, result } = event else {
            unreachable!("insert_correlation called with the wrong event variant");
        };
        let Some(result) = result else {
            return Ok(());
        };
        sqlx::query(
            r"
            INSERT OR IGNORE INTO correlations
                (coin_id, run_timestamp, session_guid, timeframe, symbol, correlation, market_cap, low_cap_quartile)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(&result.coin_id)
        .bind(result.run_timestamp.to_rfc3339())
        .bind(session_guid)
        .bind(timeframe)
        .bind(&result.symbol)
        .bind(result.correlation)
        .bind(result.market_cap)
        .bind(result.low_cap_quartile)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_precision_data(&self, event: &Event) -> Result<(), DatabaseError> {
        let Event::PrecisionDataFetched { session_guid, precision_data } = event else {
            unreachable!("insert_precision_data called with the wrong event variant");
        };
        let mut tx = self.pool.begin().await?;
        for entry in precision_data {
            sqlx::query(
                r"
                INSERT OR IGNORE INTO precision_data
                    (symbol, session_guid, base_asset, quote_asset, status, base_asset_precision,
                     step_size, min_qty, tick_size, min_notional)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
            )
            .bind(&entry.symbol)
            .bind(session_guid)
            .bind(&entry.base_asset)
            .bind(&entry.quote_asset)
            .bind(entry.status)
            .bind(entry.base_asset_precision)
            .bind(&entry.step_size)
            .bind(&entry.min_qty)
            .bind(&entry.tick_size)
            .bind(&entry.min_notional)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WorkerHandler for DatabaseManagerHandler {
    type Task = Event;

    async fn handle(&mut self, task: Event) -> anyhow::Result<()> {
        let result: Result<(), DatabaseError> = match &task {
            Event::SingleCoinFetched { session_guid, coin } => {
                self.insert_token(&coin.id, &coin.symbol, coin.market_cap, session_guid).await
            }
            Event::HistoricalPricesFetched { .. } => self.insert_prices(&task).await,
            Event::RSICalculated { .. } => self.insert_rsi(&task).await,
            Event::CorrelationAnalyzed { .. } => self.insert_correlation(&task).await,
            Event::PrecisionDataFetched { .. } => self.insert_precision_data(&task).await,
            other => {
                warn!(topic = ?other.topic(), "Database Manager received an event it does not persist, ignoring");
                Ok(())
            }
        };
        result?;
        debug!(topic = ?task.topic(), "persisted event");
        Ok(())
    }
}

/// Topics the Database Manager declares at construction (§4.8).
pub const SUBSCRIBED_TOPICS: [rsi_correlator_core::Topic; 5] = [
    rsi_correlator_core::Topic::SingleCoinFetched,
    rsi_correlator_core::Topic::HistoricalPricesFetched,
    rsi_correlator_core::Topic::RSICalculated,
    rsi_correlator_core::Topic::CorrelationAnalyzed,
    rsi_correlator_core::Topic::PrecisionDataFetched,
];

/// The Database Manager's task type is `Event` itself, so binding it to the bus is the
/// identity translation.
#[must_use]
pub const fn into_task(event: Event) -> Option<Event> {
    Some(event)
}
