//! Digest binary
//!
//! Usage: `convey-digest [digest.toml]`. Reads the ledger's RocksDB store and
//! prints the digest for the window ending now as JSON.

use anyhow::Context;
use convey_digest::{Config, DigestWindow};
use convey_ledger::RocksStore;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.ledger.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = RocksStore::open(&config.ledger).context("Failed to open ledger")?;
    let window = DigestWindow::ending(chrono::Utc::now(), config.period_days)?;
    let digest = convey_digest::compute(&store, &config, window)?;

    println!("{}", serde_json::to_string_pretty(&digest)?);
    Ok(())
}
