use std::path::PathBuf;

use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the identity database.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Create the database if it does not exist yet.
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,

    /// Keep identities in memory only. Handy for local experiments; every
    /// restart forgets all issued numbers.
    #[serde(default)]
    pub in_memory: bool,
}

fn default_path() -> PathBuf {
    PathBuf::from("switchboard-db")
}

fn default_create_if_missing() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            create_if_missing: default_create_if_missing(),
            in_memory: false,
        }
    }
}
