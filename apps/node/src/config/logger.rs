use std::str::FromStr;

use serde::Deserialize;
use tracing::Level;

#[derive(Deserialize)]
pub struct LoggerConfig {
    /// Log level: trace, debug, info, warn or error.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_owned()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl LoggerConfig {
    pub fn level(&self) -> eyre::Result<Level> {
        Level::from_str(&self.level)
            .map_err(|_| eyre::eyre!("invalid log level {:?}", self.level))
    }
}
