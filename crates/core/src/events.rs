//! Immutable payload schemas shared across topics (C9).
//!
//! Per the design note on dynamic-typed event dispatch, every topic is a variant of one
//! tagged sum type rather than a free-form mapping; the bus validates a wire payload into
//! this type once, at the boundary, and every subscriber downstream receives the typed
//! variant directly.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::domain::{Coin, CoinIdSymbol, CorrelationResult, PrecisionEntry};
use crate::wire::TabularPayload;

/// The topic a given `Event` was published on. One variant per `Event` variant; kept
/// distinct from `Event` itself so subscriptions can be declared without constructing a
/// dummy payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RunAnalysisRequested,
    AnalysisConfigurationProvided,
    FetchTopCoinsRequested,
    TopCoinsFetched,
    SingleCoinFetched,
    FetchPrecisionDataRequested,
    PrecisionDataFetched,
    FetchHistoricalPricesRequested,
    HistoricalPricesFetched,
    CalculateRSIRequested,
    RSICalculated,
    CorrelationAnalyzed,
    CoinProcessingFailed,
    AnalysisJobCompleted,
    FinalResultsReady,
    DisplayCompleted,
    AllProcessingCompleted,
    WorkerFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum Event {
    RunAnalysisRequested {
        session_guid: String,
    },
    AnalysisConfigurationProvided {
        session_guid: String,
        config: AnalysisConfig,
    },
    FetchTopCoinsRequested {
        session_guid: String,
        n: u32,
    },
    TopCoinsFetched {
        session_guid: String,
        coins: Vec<Coin>,
    },
    SingleCoinFetched {
        session_guid: String,
        coin: Coin,
    },
    FetchPrecisionDataRequested {
        session_guid: String,
    },
    PrecisionDataFetched {
        session_guid: String,
        precision_data: Vec<PrecisionEntry>,
    },
    FetchHistoricalPricesRequested {
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        weeks: u32,
        timeframe: String,
        /// Overrides the session's default quote-currency fallback list for this one fetch.
        quote_currencies_override: Option<Vec<String>>,
    },
    HistoricalPricesFetched {
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        timeframe: String,
        prices: Option<TabularPayload>,
        quote_currency: Option<String>,
    },
    CalculateRSIRequested {
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        timeframe: String,
        prices: Option<TabularPayload>,
    },
    RSICalculated {
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        timeframe: String,
        rsi: Option<TabularPayload>,
    },
    CorrelationAnalyzed {
        session_guid: String,
        timeframe: String,
        result: Option<CorrelationResult>,
    },
    CoinProcessingFailed {
        session_guid: String,
        coin_id_symbol: CoinIdSymbol,
        timeframe: String,
        reason: String,
    },
    AnalysisJobCompleted {
        session_guid: String,
        timeframe: String,
    },
    FinalResultsReady {
        session_guid: String,
        results: Vec<CorrelationResult>,
    },
    DisplayCompleted {
        session_guid: String,
    },
    AllProcessingCompleted {
        session_guid: String,
    },
    WorkerFailed {
        session_guid: String,
        worker: String,
        reason: String,
    },
}

impl Event {
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::RunAnalysisRequested { .. } => Topic::RunAnalysisRequested,
            Self::AnalysisConfigurationProvided { .. } => Topic::AnalysisConfigurationProvided,
            Self::FetchTopCoinsRequested { .. } => Topic::FetchTopCoinsRequested,
            Self::TopCoinsFetched { .. } => Topic::TopCoinsFetched,
            Self::SingleCoinFetched { .. } => Topic::SingleCoinFetched,
            Self::FetchPrecisionDataRequested { .. } => Topic::FetchPrecisionDataRequested,
            Self::PrecisionDataFetched { .. } => Topic::PrecisionDataFetched,
            Self::FetchHistoricalPricesRequested { .. } => Topic::FetchHistoricalPricesRequested,
            Self::HistoricalPricesFetched { .. } => Topic::HistoricalPricesFetched,
            Self::CalculateRSIRequested { .. } => Topic::CalculateRSIRequested,
            Self::RSICalculated { .. } => Topic::RSICalculated,
            Self::CorrelationAnalyzed { .. } => Topic::CorrelationAnalyzed,
            Self::CoinProcessingFailed { .. } => Topic::CoinProcessingFailed,
            Self::AnalysisJobCompleted { .. } => Topic::AnalysisJobCompleted,
            Self::FinalResultsReady { .. } => Topic::FinalResultsReady,
            Self::DisplayCompleted { .. } => Topic::DisplayCompleted,
            Self::AllProcessingCompleted { .. } => Topic::AllProcessingCompleted,
            Self::WorkerFailed { .. } => Topic::WorkerFailed,
        }
    }

    #[must_use]
    pub fn session_guid(&self) -> &str {
        match self {
            Self::RunAnalysisRequested { session_guid }
            | Self::AnalysisConfigurationProvided { session_guid, .. }
            | Self::FetchTopCoinsRequested { session_guid, .. }
            | Self::TopCoinsFetched { session_guid, .. }
            | Self::SingleCoinFetched { session_guid, .. }
            | Self::FetchPrecisionDataRequested { session_guid }
            | Self::PrecisionDataFetched { session_guid, .. }
            | Self::FetchHistoricalPricesRequested { session_guid, .. }
            | Self::HistoricalPricesFetched { session_guid, .. }
            | Self::CalculateRSIRequested { session_guid, .. }
            | Self::RSICalculated { session_guid, .. }
            | Self::CorrelationAnalyzed { session_guid, .. }
            | Self::CoinProcessingFailed { session_guid, .. }
            | Self::AnalysisJobCompleted { session_guid, .. }
            | Self::FinalResultsReady { session_guid, .. }
            | Self::DisplayCompleted { session_guid }
            | Self::AllProcessingCompleted { session_guid }
            | Self::WorkerFailed { session_guid, .. } => session_guid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_matches_variant() {
        let event = Event::DisplayCompleted {
            session_guid: "s1".to_string(),
        };
        assert_eq!(event.topic(), Topic::DisplayCompleted);
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::AnalysisJobCompleted {
            session_guid: "s1".to_string(),
            timeframe: "1d".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let restored: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.topic(), Topic::AnalysisJobCompleted);
    }
}
