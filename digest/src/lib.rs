//! Convey Digest
//!
//! Periodic digest of the ledger: ranks authors by the yield their messages
//! earned during a window and splits a prize fund between them.
//!
//! # Example
//!
//! ```no_run
//! use convey_digest::{Config, DigestWindow};
//! use convey_ledger::RocksStore;
//!
//! fn main() -> convey_digest::Result<()> {
//!     let config = Config::default();
//!     let store = RocksStore::open(&config.ledger)?;
//!     let window = DigestWindow::ending(chrono::Utc::now(), config.period_days)?;
//!
//!     let digest = convey_digest::compute(&store, &config, window)?;
//!     println!("{}", digest.rewards.to_json()?);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod rewards;
pub mod window;
pub mod yields;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use rewards::{Reward, RewardTable};
pub use window::DigestWindow;
pub use yields::{author_yields, AuthorYield};

use convey_ledger::LedgerStore;
use serde::{Deserialize, Serialize};

/// Ranking and rewards for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    /// Window covered
    pub window: DigestWindow,
    /// Authors by descending yield
    pub ranking: Vec<AuthorYield>,
    /// Prize fund split
    pub rewards: RewardTable,
}

/// Compute the digest for `window` from a consistent view of `store`
pub fn compute<S: LedgerStore>(store: &S, config: &Config, window: DigestWindow) -> Result<Digest> {
    config.validate()?;
    let view = store.view()?;
    let ranking = author_yields(&view, &window)?;
    let rewards = RewardTable::split(&ranking, config.fund, &config.ineligible)?;

    tracing::info!(
        start = %window.start,
        end = %window.end,
        authors = ranking.len(),
        total = %rewards.total,
        rolled_over = rewards.rolled_over,
        "Digest computed"
    );

    Ok(Digest {
        window,
        ranking,
        rewards,
    })
}
