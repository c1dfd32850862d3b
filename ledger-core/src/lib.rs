//! Convey Ledger Core
//!
//! Ledger of a discussion platform where publishing costs coins and replies
//! pay part of their cost to every message above them.
//!
//! # Architecture
//!
//! - **Append-only records**: conversations, messages, files, charges, yields,
//!   purchases, gifts, awards and deletion tombstones are written once
//! - **Derived balances**: every balance is recomputed from the records
//! - **Single Writer**: one actor task applies every write, so balance checks
//!   and the writes they guard cannot interleave
//! - **Atomic write sets**: a reply, its charge and all its yields commit together

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]
//!
//! # Invariants
//!
//! - One charge per message, committed with it
//! - One yield per ancestor, each half of what the previous hop left
//! - Σ balances = Σ purchases + Σ awards − Σ live charges + Σ live yields
//! - IDs strictly increase and are never reused

pub mod account;
pub mod actor;
pub mod config;
pub mod content;
pub mod error;
pub mod gift;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod sequence;
pub mod store;
pub mod types;
pub mod validation;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use store::{LedgerStore, LedgerView, MemoryStore, RocksStore, WriteSet};
pub use types::{
    Account, Attachment, Award, Charge, Coins, Conversation, ConversationId, ConversationSummary,
    File, FileId, Gift, GiftId, Message, MessageId, MessageSummary, Purchase, PurchaseId, Record,
    StripeCheckout, UserId, Yield,
};
