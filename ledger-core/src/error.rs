//! Error types for the ledger

use crate::types::{Coins, ConversationId, FileId, GiftId, MessageId};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Conversation absent or deleted
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// Message absent or deleted
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    /// Reply target absent, deleted, or in another conversation
    #[error("Parent not found: {0}")]
    ParentNotFound(MessageId),

    /// File absent or deleted
    #[error("File not found: {0}")]
    FileNotFound(FileId),

    /// Gift absent
    #[error("Gift not found: {0}")]
    GiftNotFound(GiftId),

    /// Topic outside the accepted bounds
    #[error("Invalid topic: {0}")]
    InvalidTopic(TopicError),

    /// Content missing or empty
    #[error("Content too short")]
    ContentTooShort,

    /// MIME type not accepted
    #[error("Unrecognized MIME: {0}")]
    MimeUnrecognized(String),

    /// Amount rejected (zero gift, zero award, etc.)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit exceeds spendable balance
    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance {
        /// Balance at check time
        balance: i64,
        /// Amount requested
        required: Coins,
    },

    /// Sender authored the gifted message
    #[error("Self-gifting not permitted")]
    SelfGiftingNotPermitted,

    /// Only the author may delete a record
    #[error("Not the author")]
    NotAuthor,

    /// Message still has live replies
    #[error("Message has replies: {0}")]
    HasReplies(MessageId),

    /// Message has received gifts
    #[error("Message has gifts: {0}")]
    HasGifts(MessageId),

    /// Payment session already recorded with different details
    #[error("Duplicate purchase: {0}")]
    DuplicatePurchase(String),

    /// Amount accumulation overflowed
    #[error("Amount overflow")]
    AmountOverflow,

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Stored data violates a ledger invariant
    #[error("Corrupt ledger: {0}")]
    Corrupt(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a topic was rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    /// Below the minimum length
    #[error("topic too short")]
    TooShort,
    /// Above the maximum length
    #[error("topic too long")]
    TooLong,
    /// Contains a line break
    #[error("topic must be a single line")]
    Multiline,
}

impl Error {
    /// Referenced record does not exist (or is deleted)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ConversationNotFound(_)
                | Error::MessageNotFound(_)
                | Error::ParentNotFound(_)
                | Error::FileNotFound(_)
                | Error::GiftNotFound(_)
        )
    }

    /// Input the user can correct
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidTopic(_)
                | Error::ContentTooShort
                | Error::MimeUnrecognized(_)
                | Error::InvalidAmount(_)
        )
    }

    /// Whole operation may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_) | Error::Concurrency(_))
    }

    /// Short label, used as a metrics dimension
    pub fn reason(&self) -> &'static str {
        match self {
            Error::ConversationNotFound(_)
            | Error::MessageNotFound(_)
            | Error::ParentNotFound(_)
            | Error::FileNotFound(_)
            | Error::GiftNotFound(_) => "not_found",
            Error::InvalidTopic(_)
            | Error::ContentTooShort
            | Error::MimeUnrecognized(_)
            | Error::InvalidAmount(_) => "validation",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::SelfGiftingNotPermitted => "self_gift",
            Error::NotAuthor | Error::HasReplies(_) | Error::HasGifts(_) => "delete_refused",
            Error::DuplicatePurchase(_) => "duplicate_purchase",
            Error::AmountOverflow => "overflow",
            Error::Storage(_) | Error::Serialization(_) | Error::Corrupt(_) | Error::Io(_) => {
                "store"
            }
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<TopicError> for Error {
    fn from(err: TopicError) -> Self {
        Error::InvalidTopic(err)
    }
}
