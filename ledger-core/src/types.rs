//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Append-only storage: records are written once and never mutated
//! - Exact arithmetic: coin amounts are unsigned integers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coin amount carried by a ledger event
pub type Coins = u64;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw identifier
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Raw identifier
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// User identifier, issued by the authentication collaborator
    UserId
);
id_type!(
    /// Conversation identifier
    ConversationId
);
id_type!(
    /// Message identifier
    MessageId
);
id_type!(
    /// File (attachment) identifier
    FileId
);
id_type!(
    /// Charge identifier
    ChargeId
);
id_type!(
    /// Yield identifier
    YieldId
);
id_type!(
    /// Purchase identifier
    PurchaseId
);
id_type!(
    /// Gift identifier
    GiftId
);
id_type!(
    /// Award identifier
    AwardId
);
id_type!(
    /// Tombstone identifier
    TombstoneId
);

/// Identity resolved by the authentication collaborator.
///
/// The ledger trusts it as given and only ever keys on `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// User ID
    pub id: UserId,
    /// Display name
    pub username: String,
    /// Contact address
    pub email: String,
}

impl Account {
    /// Create new account identity
    pub fn new(id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
        }
    }
}

/// Content already persisted by the content-addressed store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Content hash (store key)
    pub hash: String,
    /// MIME type
    pub mime: String,
    /// Size in bytes, which is also its cost in coins
    pub size: Coins,
}

impl Attachment {
    /// Create new attachment descriptor
    pub fn new(hash: impl Into<String>, mime: impl Into<String>, size: Coins) -> Self {
        Self {
            hash: hash.into(),
            mime: mime.into(),
            size,
        }
    }
}

/// Root of a message tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID
    pub id: ConversationId,
    /// Author
    pub author: UserId,
    /// Topic line
    pub topic: String,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

/// Node of a conversation's message tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: MessageId,
    /// Author
    pub author: UserId,
    /// Conversation this message belongs to
    pub conversation: ConversationId,
    /// Parent message (`None` for the root message)
    pub parent: Option<MessageId>,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

impl Message {
    /// Whether this is the root message of its conversation
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Attachment row of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// File ID
    pub id: FileId,
    /// Owning message
    pub message: MessageId,
    /// Content hash
    pub hash: String,
    /// MIME type
    pub mime: String,
    /// Size in bytes
    pub size: Coins,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

/// Cost paid by an author to publish a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Charge ID
    pub id: ChargeId,
    /// Paying user
    pub user: UserId,
    /// Conversation
    pub conversation: ConversationId,
    /// Charged message
    pub message: MessageId,
    /// Amount debited
    pub amount: Coins,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

/// Value flowing from a new message to one of its ancestors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Yield {
    /// Yield ID
    pub id: YieldId,
    /// Author of the yielding message
    pub user: UserId,
    /// Conversation
    pub conversation: ConversationId,
    /// Yielding (new) message
    pub message: MessageId,
    /// Credited ancestor message
    pub parent: MessageId,
    /// Amount credited to the ancestor's author
    pub amount: Coins,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

/// Coin bundle bought through the payment provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Purchase ID
    pub id: PurchaseId,
    /// Credited user
    pub user: UserId,
    /// Provider identifiers, stored verbatim for audit
    pub checkout: StripeCheckout,
    /// Coins credited
    pub bundle_size: Coins,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

/// Identifiers of a completed checkout, as reported by the payment webhook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeCheckout {
    /// Checkout session ID
    pub session_id: String,
    /// Customer ID
    pub customer_id: String,
    /// Payment intent ID
    pub payment_intent_id: String,
    /// Currency code
    pub currency: String,
    /// Amount charged in the currency's minor unit
    pub amount: i64,
}

/// Direct transfer of coins to the author of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gift {
    /// Gift ID
    pub id: GiftId,
    /// Sender
    pub from: UserId,
    /// Conversation
    pub conversation: ConversationId,
    /// Target message; its author is credited
    pub message: MessageId,
    /// Amount transferred
    pub amount: Coins,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

/// Administrative credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    /// Award ID
    pub id: AwardId,
    /// Credited user
    pub user: UserId,
    /// Amount credited
    pub amount: Coins,
    /// Created timestamp
    pub created: DateTime<Utc>,
}

/// Soft-delete marker.
///
/// Deletion never removes rows: it appends a tombstone that balance and
/// listing queries honour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Tombstone ID
    pub id: TombstoneId,
    /// User who deleted the target
    pub user: UserId,
    /// Deleted record
    pub target: Target,
    /// Deleted timestamp
    pub created: DateTime<Utc>,
}

/// Record that can be soft-deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A conversation (hidden from listings)
    Conversation(ConversationId),
    /// A message (hidden, and its charge and outgoing yields voided)
    Message(MessageId),
}

impl Target {
    /// Raw ID of the target record
    pub fn raw(&self) -> u64 {
        match self {
            Target::Conversation(id) => id.get(),
            Target::Message(id) => id.get(),
        }
    }
}

/// Any stored ledger record, keyed by its globally unique ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// Conversation
    Conversation(Conversation),
    /// Message
    Message(Message),
    /// File
    File(File),
    /// Charge
    Charge(Charge),
    /// Yield
    Yield(Yield),
    /// Purchase
    Purchase(Purchase),
    /// Gift
    Gift(Gift),
    /// Award
    Award(Award),
    /// Tombstone
    Tombstone(Tombstone),
}

impl Record {
    /// Raw record ID
    pub fn id(&self) -> u64 {
        match self {
            Record::Conversation(r) => r.id.get(),
            Record::Message(r) => r.id.get(),
            Record::File(r) => r.id.get(),
            Record::Charge(r) => r.id.get(),
            Record::Yield(r) => r.id.get(),
            Record::Purchase(r) => r.id.get(),
            Record::Gift(r) => r.id.get(),
            Record::Award(r) => r.id.get(),
            Record::Tombstone(r) => r.id.get(),
        }
    }

    /// Short kind label, used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Conversation(_) => "conversation",
            Record::Message(_) => "message",
            Record::File(_) => "file",
            Record::Charge(_) => "charge",
            Record::Yield(_) => "yield",
            Record::Purchase(_) => "purchase",
            Record::Gift(_) => "gift",
            Record::Award(_) => "award",
            Record::Tombstone(_) => "tombstone",
        }
    }

    pub(crate) fn into_conversation(self) -> Option<Conversation> {
        match self {
            Record::Conversation(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_message(self) -> Option<Message> {
        match self {
            Record::Message(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_file(self) -> Option<File> {
        match self {
            Record::File(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_charge(self) -> Option<Charge> {
        match self {
            Record::Charge(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_yield(self) -> Option<Yield> {
        match self {
            Record::Yield(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_purchase(self) -> Option<Purchase> {
        match self {
            Record::Purchase(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_gift(self) -> Option<Gift> {
        match self {
            Record::Gift(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_award(self) -> Option<Award> {
        match self {
            Record::Award(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn into_tombstone(self) -> Option<Tombstone> {
        match self {
            Record::Tombstone(r) => Some(r),
            _ => None,
        }
    }
}

/// Conversation with the cost and yield of its root message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation
    pub conversation: Conversation,
    /// Root message ID
    pub root: MessageId,
    /// Cost of the root message
    pub cost: Coins,
    /// Yield credited to the root message
    pub yields: Coins,
}

/// Message with its cost and the yield credited to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Message
    pub message: Message,
    /// Cost charged for the message
    pub cost: Coins,
    /// Yield credited to the message by its descendants
    pub yields: Coins,
}

/// Result of creating a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    /// Conversation
    pub conversation: Conversation,
    /// Root message
    pub message: Message,
    /// Attachment rows
    pub files: Vec<File>,
    /// Charge for the root message
    pub charge: Charge,
}

/// Result of creating a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Message
    pub message: Message,
    /// Attachment rows
    pub files: Vec<File>,
    /// Charge for the message
    pub charge: Charge,
    /// One yield per ancestor, nearest first
    pub yields: Vec<Yield>,
}
