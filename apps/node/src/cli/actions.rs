use std::sync::Arc;

use eyre::Context;
use switchboard_peers::Registry;
use switchboard_relay::server;
use switchboard_storage::{
    IdentityStore, LevelDbIdentityStore, LevelDbOptions, MemoryIdentityStore,
};
use tokio::select;
use tokio::signal::unix;
use tokio::signal::unix::SignalKind;
use tracing::info;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::cli::arguments;
use crate::config::{NodeConfig, StorageConfig};

pub async fn run(args: arguments::Run) -> eyre::Result<()> {
    let config = NodeConfig::from_path(args.config)?;

    let level = config.logger.level()?;
    let filter = Targets::new()
        .with_target("switchboard_relay", level)
        .with_target("switchboard_peers", level)
        .with_target("switchboard_storage", level)
        .with_default(level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .try_init()?;

    let store = open_store(&config.storage)?;
    let registry = Arc::new(Registry::new(store));

    let handle = server::spawn(config.relay.to_server_config()?, registry)
        .wrap_err("Failed to start the relay server")?;
    info!("switchboardd serving on {}", handle.local_addr());

    let mut sigterm =
        unix::signal(SignalKind::terminate()).expect("Failed to create SIGTERM signal handler");
    let mut sigint =
        unix::signal(SignalKind::interrupt()).expect("Failed to create SIGINT signal handler");

    select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal");
        }
    }

    tokio::task::spawn_blocking(move || handle.shutdown())
        .await
        .wrap_err("Acceptor thread went away")?
        .wrap_err("Failed to shut the acceptor down")?;

    Ok(())
}

fn open_store(config: &StorageConfig) -> eyre::Result<Arc<dyn IdentityStore>> {
    if config.in_memory {
        info!("Using the in-memory identity store");
        return Ok(Arc::new(MemoryIdentityStore::new()));
    }

    let store = LevelDbIdentityStore::from_opts(LevelDbOptions {
        path: config.path.clone(),
        create_if_missing: config.create_if_missing,
    })
    .wrap_err("Failed to open the identity database")?;

    Ok(Arc::new(store))
}
