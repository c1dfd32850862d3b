//! Record ID issuance
//!
//! IDs are strictly increasing, never zero and never reused. The generator is
//! injected into the ledger rather than held globally, so tests can seed it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh record IDs
pub trait IdSequence: Send + Sync {
    /// Issue the next ID
    fn next_id(&self) -> u64;
}

/// In-process counter, seeded from the store's high-water mark
#[derive(Debug)]
pub struct AtomicSequence {
    last: AtomicU64,
}

impl AtomicSequence {
    /// Sequence whose first ID is `last + 1`
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::starting_after(0)
    }
}

impl IdSequence for AtomicSequence {
    fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}
