use super::BusConfig;
use crate::Result;
use config::{Config, Environment};

impl BusConfig {
    /// Build a config from `RELAYMQ_`-prefixed environment variables layered
    /// over the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::try_from(&BusConfig::default())
            .map_err(|e| crate::BusError::Config(e.to_string()))?;

        let settings = Config::builder()
            .add_source(defaults)
            .add_source(Environment::with_prefix("RELAYMQ"))
            .build()
            .map_err(|e| crate::BusError::Config(e.to_string()))?;

        let config = settings
            .try_deserialize::<BusConfig>()
            .map_err(|e| crate::BusError::Config(e.to_string()))?;

        config.validate().map_err(crate::BusError::Config)?;
        Ok(config)
    }
}
