use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Session-wide analysis parameters. Frozen once constructed and broadcast once via
/// `AnalysisConfigurationProvided`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub weeks: u32,
    pub top_n_coins: u32,
    pub correlation_threshold: f64,
    pub rsi_period: u32,
    pub timeframes: Vec<String>,
    pub low_cap_percentile: f64,
    pub pubsub_url: String,
    pub db_path: String,
    pub exchange_base_url: String,
    pub market_list_base_url: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            weeks: 50,
            top_n_coins: 200,
            correlation_threshold: 0.7,
            rsi_period: 14,
            timeframes: vec!["1d".to_string()],
            low_cap_percentile: 25.0,
            pubsub_url: "http://localhost:5000".to_string(),
            db_path: "crypto_data.db".to_string(),
            exchange_base_url: "https://api.binance.com".to_string(),
            market_list_base_url: "https://api.coingecko.com/api/v3".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Validates the bounds documented in the configuration table. Called once before any
    /// worker starts; a failure here is `ConfigurationInvalid` (exit code 1).
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::ConfigurationInvalid` describing the first violated bound.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.weeks == 0 {
            return Err(AnalysisError::ConfigurationInvalid(
                "weeks must be > 0".to_string(),
            ));
        }
        if self.top_n_coins == 0 {
            return Err(AnalysisError::ConfigurationInvalid(
                "top_n_coins must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(AnalysisError::ConfigurationInvalid(
                "correlation_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.rsi_period <= 1 {
            return Err(AnalysisError::ConfigurationInvalid(
                "rsi_period must be > 1".to_string(),
            ));
        }
        if self.timeframes.is_empty() {
            return Err(AnalysisError::ConfigurationInvalid(
                "timeframes must not be empty".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.low_cap_percentile) {
            return Err(AnalysisError::ConfigurationInvalid(
                "low_cap_percentile must be in [0, 100]".to_string(),
            ));
        }
        Ok(())
    }
}
