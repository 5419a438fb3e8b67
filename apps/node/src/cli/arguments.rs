use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct Run {
    /// Path to the TOML configuration file.
    #[clap(long, short, default_value = "switchboard.toml")]
    pub config: PathBuf,
}
