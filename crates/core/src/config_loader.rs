use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::config::AnalysisConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the session configuration by layering defaults, an optional TOML file, and
    /// `RSI_`-prefixed environment overrides, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if a present configuration file cannot be parsed, or if the merged
    /// result cannot be deserialised into `AnalysisConfig`.
    pub fn load(config_path: Option<&str>) -> Result<AnalysisConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(AnalysisConfig::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        let config: AnalysisConfig = figment.merge(Env::prefixed("RSI_")).extract()?;
        Ok(config)
    }
}
