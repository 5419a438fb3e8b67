use config::Config;
use serde::Deserialize;

use std::path::PathBuf;

mod logger;
pub use logger::LoggerConfig;

mod relay;
pub use relay::RelayConfig;

mod storage;
pub use storage::StorageConfig;

#[derive(Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logger: LoggerConfig,
}

impl NodeConfig {
    /// Every section has sane defaults, so a missing file just means the
    /// stock configuration.
    pub fn from_path(path: PathBuf) -> eyre::Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from(path).required(false))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
