//! Content Tree Manager
//!
//! Builds the conversation → message tree, charges authors for what they
//! publish and distributes part of every reply's charge to its ancestors.
//!
//! # Yield propagation
//!
//! A reply costing `C` walks from its parent to the root. Each ancestor is
//! credited half of what is still undistributed, so the parent receives
//! `C / 2`, the grandparent `(C - C / 2) / 2`, and so on, root included.
//! Integer division truncates; whatever is left after the root stays
//! undistributed.

use crate::{
    account::ensure_affordable,
    config::LedgerConfig,
    error::{Error, Result},
    sequence::IdSequence,
    store::{LedgerStore, LedgerView, WriteSet},
    types::{
        Account, Attachment, Charge, ChargeId, Coins, Conversation, ConversationId,
        ConversationSummary, File, FileId, Message, MessageId, MessageSummary, NewConversation,
        NewMessage, Record, Target, Tombstone, TombstoneId, UserId, Yield, YieldId,
    },
    validation::{validate_attachments, validate_topic},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shares handed to successive ancestors: half of the remainder each hop
#[derive(Debug, Clone, Copy)]
pub struct Halving {
    remaining: Coins,
}

impl Halving {
    /// Start distributing `cost`
    pub fn new(cost: Coins) -> Self {
        Self { remaining: cost }
    }

    /// Amount not yet distributed
    pub fn remaining(&self) -> Coins {
        self.remaining
    }
}

impl Iterator for Halving {
    type Item = Coins;

    fn next(&mut self) -> Option<Coins> {
        let half = self.remaining / 2;
        self.remaining -= half;
        Some(half)
    }
}

/// Content Tree Manager
pub struct ContentTree<S> {
    store: Arc<S>,
    sequence: Arc<dyn IdSequence>,
    config: LedgerConfig,
}

impl<S> Clone for ContentTree<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sequence: self.sequence.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> ContentTree<S> {
    /// Create content tree over a shared store
    pub fn new(store: Arc<S>, sequence: Arc<dyn IdSequence>, config: LedgerConfig) -> Self {
        Self {
            store,
            sequence,
            config,
        }
    }

    fn next_id(&self) -> u64 {
        self.sequence.next_id()
    }

    fn ensure_funded<V: LedgerView>(&self, view: &V, author: UserId, cost: Coins) -> Result<()> {
        if self.config.require_funded_posts {
            ensure_affordable(view, author, cost)?;
        }
        Ok(())
    }

    fn files_for(&self, message: MessageId, attachments: &[Attachment], now: DateTime<Utc>) -> Vec<File> {
        attachments
            .iter()
            .map(|a| File {
                id: FileId::new(self.next_id()),
                message,
                hash: a.hash.clone(),
                mime: a.mime.clone(),
                size: a.size,
                created: now,
            })
            .collect()
    }

    /// Start a conversation with its root message
    pub fn create_conversation(
        &self,
        author: &Account,
        topic: &str,
        attachments: &[Attachment],
        now: DateTime<Utc>,
    ) -> Result<NewConversation> {
        validate_topic(topic)?;
        let cost = validate_attachments(attachments)?;

        let created = self.store.commit_with(|view| {
            self.ensure_funded(view, author.id, cost)?;

            let conversation = Conversation {
                id: ConversationId::new(self.next_id()),
                author: author.id,
                topic: topic.to_string(),
                created: now,
            };
            let message = Message {
                id: MessageId::new(self.next_id()),
                author: author.id,
                conversation: conversation.id,
                parent: None,
                created: now,
            };
            let files = self.files_for(message.id, attachments, now);
            let charge = Charge {
                id: ChargeId::new(self.next_id()),
                user: author.id,
                conversation: conversation.id,
                message: message.id,
                amount: cost,
                created: now,
            };

            let mut writes = WriteSet::new();
            writes.push(Record::Conversation(conversation.clone()));
            writes.push(Record::Message(message.clone()));
            for file in &files {
                writes.push(Record::File(file.clone()));
            }
            writes.push(Record::Charge(charge.clone()));
            Ok((
                writes,
                NewConversation {
                    conversation,
                    message,
                    files,
                    charge,
                },
            ))
        })?;

        tracing::info!(
            conversation_id = %created.conversation.id,
            message_id = %created.message.id,
            user_id = %author.id,
            amount = cost,
            "Created Conversation"
        );

        Ok(created)
    }

    /// Reply to `parent`, charging the author and crediting every ancestor
    pub fn create_message(
        &self,
        author: &Account,
        conversation: ConversationId,
        parent: MessageId,
        attachments: &[Attachment],
        now: DateTime<Utc>,
    ) -> Result<NewMessage> {
        let cost = validate_attachments(attachments)?;

        let created = self.store.commit_with(|view| {
            if view.live_conversation(conversation)?.is_none() {
                return Err(Error::ConversationNotFound(conversation));
            }
            match view.live_message(parent)? {
                Some(m) if m.conversation == conversation => {}
                _ => return Err(Error::ParentNotFound(parent)),
            }
            self.ensure_funded(view, author.id, cost)?;
            let ancestors = ancestry(view, parent)?;

            let message = Message {
                id: MessageId::new(self.next_id()),
                author: author.id,
                conversation,
                parent: Some(parent),
                created: now,
            };
            let files = self.files_for(message.id, attachments, now);
            let charge = Charge {
                id: ChargeId::new(self.next_id()),
                user: author.id,
                conversation,
                message: message.id,
                amount: cost,
                created: now,
            };
            let yields: Vec<Yield> = ancestors
                .into_iter()
                .zip(Halving::new(cost))
                .map(|(ancestor, amount)| Yield {
                    id: YieldId::new(self.next_id()),
                    user: author.id,
                    conversation,
                    message: message.id,
                    parent: ancestor,
                    amount,
                    created: now,
                })
                .collect();

            let mut writes = WriteSet::new();
            writes.push(Record::Message(message.clone()));
            for file in &files {
                writes.push(Record::File(file.clone()));
            }
            writes.push(Record::Charge(charge.clone()));
            for y in &yields {
                writes.push(Record::Yield(y.clone()));
            }
            Ok((
                writes,
                NewMessage {
                    message,
                    files,
                    charge,
                    yields,
                },
            ))
        })?;

        for y in &created.yields {
            tracing::debug!(
                yield_id = %y.id,
                message_id = %created.message.id,
                parent_id = %y.parent,
                amount = y.amount,
                "Created Yield"
            );
        }
        tracing::info!(
            conversation_id = %conversation,
            message_id = %created.message.id,
            parent_id = %parent,
            user_id = %author.id,
            amount = cost,
            ancestors = created.yields.len(),
            "Created Message"
        );

        Ok(created)
    }

    /// Soft-delete a message
    ///
    /// Only the author may delete, and only a message without live replies
    /// or gifts. The message's charge, outgoing yields and files stop
    /// counting. Deleting a root message also hides its conversation.
    pub fn delete_message(&self, user: UserId, id: MessageId, now: DateTime<Utc>) -> Result<Vec<Tombstone>> {
        let (conversation, tombstones) = self.store.commit_with(|view| {
            let message = view.live_message(id)?.ok_or(Error::MessageNotFound(id))?;
            if message.author != user {
                return Err(Error::NotAuthor);
            }
            for reply in view.replies_to(id) {
                if !view.is_deleted(reply?.id.get())? {
                    return Err(Error::HasReplies(id));
                }
            }
            if view.gifts_to(id).next().transpose()?.is_some() {
                return Err(Error::HasGifts(id));
            }

            let mut targets = vec![Target::Message(message.id)];
            if message.is_root() && !view.is_deleted(message.conversation.get())? {
                targets.push(Target::Conversation(message.conversation));
            }
            let tombstones: Vec<Tombstone> = targets
                .into_iter()
                .map(|target| Tombstone {
                    id: TombstoneId::new(self.next_id()),
                    user,
                    target,
                    created: now,
                })
                .collect();

            let mut writes = WriteSet::new();
            for tombstone in &tombstones {
                writes.push(Record::Tombstone(tombstone.clone()));
            }
            Ok((writes, (message.conversation, tombstones)))
        })?;

        tracing::info!(
            message_id = %id,
            conversation_id = %conversation,
            user_id = %user,
            "Deleted Message"
        );

        Ok(tombstones)
    }

    /// Hide a conversation from lookups and listings; balances are unaffected
    pub fn delete_conversation(&self, user: UserId, id: ConversationId, now: DateTime<Utc>) -> Result<Tombstone> {
        let tombstone = self.store.commit_with(|view| {
            let conversation = view
                .live_conversation(id)?
                .ok_or(Error::ConversationNotFound(id))?;
            if conversation.author != user {
                return Err(Error::NotAuthor);
            }

            let tombstone = Tombstone {
                id: TombstoneId::new(self.next_id()),
                user,
                target: Target::Conversation(id),
                created: now,
            };
            let mut writes = WriteSet::new();
            writes.push(Record::Tombstone(tombstone.clone()));
            Ok((writes, tombstone))
        })?;

        tracing::info!(conversation_id = %id, user_id = %user, "Deleted Conversation");

        Ok(tombstone)
    }

    /// Live conversation by ID
    pub fn conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.store
            .view()?
            .live_conversation(id)?
            .ok_or(Error::ConversationNotFound(id))
    }

    /// Live message by ID, with its cost and the yield credited to it
    pub fn message(&self, id: MessageId) -> Result<MessageSummary> {
        let view = self.store.view()?;
        let message = view.live_message(id)?.ok_or(Error::MessageNotFound(id))?;
        summarize(&view, message)
    }

    /// Live messages of a live conversation, oldest first
    pub fn messages(&self, conversation: ConversationId) -> Result<Vec<MessageSummary>> {
        let view = self.store.view()?;
        if view.live_conversation(conversation)?.is_none() {
            return Err(Error::ConversationNotFound(conversation));
        }
        let mut summaries = Vec::new();
        for message in view.messages_in(conversation) {
            let message = message?;
            if !view.is_deleted(message.id.get())? {
                summaries.push(summarize(&view, message)?);
            }
        }
        Ok(summaries)
    }

    /// Parent of a live message (`None` for a root message)
    pub fn parent_of(&self, id: MessageId) -> Result<Option<MessageId>> {
        self.store.view()?.parent_of(id)
    }

    /// File by ID, unless its message is deleted
    pub fn file(&self, id: FileId) -> Result<File> {
        let view = self.store.view()?;
        match view.file(id)? {
            Some(file) if !view.is_deleted(file.message.get())? => Ok(file),
            _ => Err(Error::FileNotFound(id)),
        }
    }

    /// Attachments of a live message, in upload order
    pub fn files(&self, message: MessageId) -> Result<Vec<File>> {
        let view = self.store.view()?;
        if view.live_message(message)?.is_none() {
            return Err(Error::MessageNotFound(message));
        }
        view.files_of(message).collect()
    }

    /// Highest-yield conversations created at or after `since`
    pub fn best(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<ConversationSummary>> {
        self.store.view()?.best_conversations(since, limit)
    }

    /// Newest conversations
    pub fn recent(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        self.store.view()?.recent_conversations(limit)
    }
}

/// Ancestors of `parent`, nearest first, ending at the root
fn ancestry<V: LedgerView>(view: &V, parent: MessageId) -> Result<Vec<MessageId>> {
    let mut chain = Vec::new();
    let mut current = Some(parent);
    while let Some(id) = current {
        let message = view
            .message(id)?
            .ok_or_else(|| Error::Corrupt(format!("ancestor {} is missing", id)))?;
        chain.push(id);
        current = message.parent;
    }
    Ok(chain)
}

fn summarize<V: LedgerView>(view: &V, message: Message) -> Result<MessageSummary> {
    Ok(MessageSummary {
        cost: view.message_cost(message.id)?,
        yields: view.message_yield(message.id)?,
        message,
    })
}
