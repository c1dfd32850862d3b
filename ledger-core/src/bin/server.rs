//! Ledger server binary
//!
//! Usage: `convey-ledger [config.toml]`. Without a file, configuration comes
//! from `CONVEY_*` environment variables.

use anyhow::Context;
use convey_ledger::{config::StorageBackend, Config, Ledger, LedgerStore};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn serve<S: LedgerStore>(ledger: Ledger<S>) -> anyhow::Result<()> {
    tracing::info!("Ledger ready");

    // Request handlers attach here; the process runs until interrupted
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down ledger server");
    match ledger.metrics().render() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to render metrics"),
    }
    ledger.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env()?,
    };

    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        backend = ?config.storage.backend,
        data_dir = ?config.data_dir,
        "Starting Convey ledger server"
    );

    match config.storage.backend {
        StorageBackend::Rocksdb => serve(Ledger::open(config).await?).await,
        StorageBackend::Memory => serve(Ledger::in_memory(config)?).await,
    }
}
