//! Notification collaborator
//!
//! Notices are sent after a write has committed. Delivery is advisory: a
//! failing notifier is logged and never changes the ledger outcome.

use crate::types::{Coins, ConversationId, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// Someone replied to a user's message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseNotice {
    /// Author of the message replied to
    pub recipient: UserId,
    /// Author of the reply
    pub responder: UserId,
    /// Conversation
    pub conversation: ConversationId,
    /// Conversation topic
    pub topic: String,
    /// The reply
    pub message: MessageId,
}

/// A message names another user
///
/// The ledger does not parse message content; the caller detects mentions
/// and hands them to [`crate::Ledger::mention`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionNotice {
    /// User named in the message
    pub recipient: UserId,
    /// Author of the message
    pub mentioner: UserId,
    /// Conversation
    pub conversation: ConversationId,
    /// Conversation topic
    pub topic: String,
    /// The mentioning message
    pub message: MessageId,
}

/// Someone gifted coins to a user's message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftNotice {
    /// Author of the gifted message
    pub recipient: UserId,
    /// Gift sender
    pub sender: UserId,
    /// Conversation
    pub conversation: ConversationId,
    /// Conversation topic
    pub topic: String,
    /// Gifted message
    pub message: MessageId,
    /// Amount received
    pub amount: Coins,
}

/// Receives notices of committed ledger events
pub trait Notifier: Send + Sync {
    /// A message received a reply
    fn response(&self, notice: &ResponseNotice) -> anyhow::Result<()>;

    /// A user was mentioned in a message
    fn mention(&self, notice: &MentionNotice) -> anyhow::Result<()>;

    /// A message received a gift
    fn gift(&self, notice: &GiftNotice) -> anyhow::Result<()>;
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn response(&self, notice: &ResponseNotice) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %notice.recipient,
            responder = %notice.responder,
            conversation_id = %notice.conversation,
            message_id = %notice.message,
            "Response notification"
        );
        Ok(())
    }

    fn mention(&self, notice: &MentionNotice) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %notice.recipient,
            mentioner = %notice.mentioner,
            conversation_id = %notice.conversation,
            message_id = %notice.message,
            "Mention notification"
        );
        Ok(())
    }

    fn gift(&self, notice: &GiftNotice) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %notice.recipient,
            sender = %notice.sender,
            conversation_id = %notice.conversation,
            message_id = %notice.message,
            amount = notice.amount,
            "Gift notification"
        );
        Ok(())
    }
}
