use std::net::ToSocketAddrs;
use std::time::Duration;

use eyre::{Context, OptionExt};
use serde::Deserialize;
use switchboard_relay::server;

#[derive(Deserialize, Clone)]
pub struct RelayConfig {
    /// Address to listen on for relay clients.
    #[serde(default = "default_address")]
    pub address: String,
    /// Seconds a caller keeps trying before the number counts as unavailable.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Milliseconds between dial retries.
    #[serde(default = "default_call_retry_delay_ms")]
    pub call_retry_delay_ms: u64,
    /// Milliseconds a linked session waits for its partner's final reply.
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,
}

fn default_address() -> String {
    format!("0.0.0.0:{}", server::DEFAULT_LISTEN_PORT)
}

fn default_call_timeout_secs() -> u64 {
    server::DEFAULT_CALL_TIMEOUT.as_secs()
}

fn default_call_retry_delay_ms() -> u64 {
    server::DEFAULT_CALL_RETRY_DELAY.as_millis() as u64
}

fn default_accept_timeout_ms() -> u64 {
    server::DEFAULT_ACCEPT_TIMEOUT.as_millis() as u64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            call_timeout_secs: default_call_timeout_secs(),
            call_retry_delay_ms: default_call_retry_delay_ms(),
            accept_timeout_ms: default_accept_timeout_ms(),
        }
    }
}

impl RelayConfig {
    pub fn to_server_config(&self) -> eyre::Result<server::Config> {
        let listen = self
            .address
            .to_socket_addrs()
            .wrap_err("Failed to resolve listen address")?
            .next()
            .ok_or_eyre("No address found in listen address")?;

        Ok(server::Config {
            listen,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            call_retry_delay: Duration::from_millis(self.call_retry_delay_ms),
            accept_timeout: Duration::from_millis(self.accept_timeout_ms),
            ..server::Config::default()
        })
    }
}
