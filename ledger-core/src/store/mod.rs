//! Ledger Store: append-only records plus lookup indices
//!
//! # Layout
//!
//! - Every record ([`Record`]) is stored once under its globally unique ID.
//! - Secondary indices are keys of the form `tag || owner || record_id` with
//!   empty values. Owners are big-endian IDs (or a BLAKE3 digest for text
//!   owners such as payment session IDs), so a prefix scan yields record IDs
//!   in ascending (insertion) order.
//!
//! # Consistency
//!
//! - [`LedgerStore::commit`] applies a [`WriteSet`] atomically: readers see
//!   either none or all of its records and index entries.
//! - [`LedgerView`] is a consistent snapshot. Every aggregate below is
//!   evaluated against one view, so a balance never mixes pre- and
//!   post-commit state.
//!
//! The store owns no business rules beyond soft-delete visibility.

mod memory;
mod rocks;

pub use memory::{MemoryStore, MemoryView};
pub use rocks::{RocksStore, RocksView};

use crate::{
    error::{Error, Result},
    types::{
        Award, AwardId, Charge, Coins, Conversation, ConversationId, ConversationSummary, File,
        FileId, Gift, GiftId, Message, MessageId, Purchase, PurchaseId, Record, Tombstone, UserId,
        Yield,
    },
};
use chrono::{DateTime, Utc};
use std::marker::PhantomData;

/// Index families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexTag {
    /// All conversations
    Conversations = 1,
    /// Messages by conversation
    ConversationMessages = 2,
    /// Messages by author
    AuthorMessages = 3,
    /// Direct replies by parent message
    MessageReplies = 4,
    /// Files by message
    MessageFiles = 5,
    /// Charges by message
    MessageCharges = 6,
    /// Charges by paying user
    UserCharges = 7,
    /// Yields by credited (ancestor) message
    ParentYields = 8,
    /// Yields by yielding message
    MessageYields = 9,
    /// Purchases by user
    UserPurchases = 10,
    /// Purchases by payment session
    SessionPurchases = 11,
    /// Gifts by target message
    MessageGifts = 12,
    /// Gifts by sender
    SenderGifts = 13,
    /// Gifts by conversation
    ConversationGifts = 14,
    /// Awards by user
    UserAwards = 15,
    /// Tombstones by target record
    TargetTombstones = 16,
}

/// Prefix selecting one index family (and optionally one owner)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    prefix: Vec<u8>,
}

impl IndexKey {
    /// Every entry of a family
    pub fn all(tag: IndexTag) -> Self {
        Self {
            prefix: vec![tag as u8],
        }
    }

    /// Entries owned by a numeric ID
    pub fn id(tag: IndexTag, owner: u64) -> Self {
        let mut prefix = Vec::with_capacity(9);
        prefix.push(tag as u8);
        prefix.extend_from_slice(&owner.to_be_bytes());
        Self { prefix }
    }

    /// Entries owned by a text value (hashed to a fixed width)
    pub fn text(tag: IndexTag, owner: &str) -> Self {
        let mut prefix = Vec::with_capacity(33);
        prefix.push(tag as u8);
        prefix.extend_from_slice(blake3::hash(owner.as_bytes()).as_bytes());
        Self { prefix }
    }

    /// Scan prefix
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Full entry key for a record
    pub fn entry(&self, id: u64) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&id.to_be_bytes());
        key
    }
}

/// Record ID at the tail of an index entry
pub(crate) fn entry_id(key: &[u8]) -> Result<u64> {
    key.len()
        .checked_sub(8)
        .and_then(|start| key[start..].try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| Error::Corrupt(format!("malformed index entry of {} bytes", key.len())))
}

/// Index entries a record contributes
pub(crate) fn index_entries(record: &Record) -> Vec<Vec<u8>> {
    use IndexTag::*;

    let keys = match record {
        Record::Conversation(_) => vec![IndexKey::all(Conversations)],
        Record::Message(m) => {
            let mut keys = vec![
                IndexKey::id(ConversationMessages, m.conversation.get()),
                IndexKey::id(AuthorMessages, m.author.get()),
            ];
            if let Some(parent) = m.parent {
                keys.push(IndexKey::id(MessageReplies, parent.get()));
            }
            keys
        }
        Record::File(f) => vec![IndexKey::id(MessageFiles, f.message.get())],
        Record::Charge(c) => vec![
            IndexKey::id(MessageCharges, c.message.get()),
            IndexKey::id(UserCharges, c.user.get()),
        ],
        Record::Yield(y) => vec![
            IndexKey::id(ParentYields, y.parent.get()),
            IndexKey::id(MessageYields, y.message.get()),
        ],
        Record::Purchase(p) => {
            let mut keys = vec![IndexKey::id(UserPurchases, p.user.get())];
            if !p.checkout.session_id.is_empty() {
                keys.push(IndexKey::text(SessionPurchases, &p.checkout.session_id));
            }
            keys
        }
        Record::Gift(g) => vec![
            IndexKey::id(MessageGifts, g.message.get()),
            IndexKey::id(SenderGifts, g.from.get()),
            IndexKey::id(ConversationGifts, g.conversation.get()),
        ],
        Record::Award(a) => vec![IndexKey::id(UserAwards, a.user.get())],
        Record::Tombstone(t) => vec![IndexKey::id(TargetTombstones, t.target.raw())],
    };

    let id = record.id();
    keys.iter().map(|key| key.entry(id)).collect()
}

/// Records to be committed as one atomic unit
#[derive(Debug, Default, Clone)]
pub struct WriteSet {
    records: Vec<Record>,
}

impl WriteSet {
    /// Empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Queued records, in push order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records queued
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest record ID in the set (0 if empty)
    pub fn last_id(&self) -> u64 {
        self.records.iter().map(Record::id).max().unwrap_or(0)
    }

    pub(crate) fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Durable keyed storage for ledger records
pub trait LedgerStore: Send + Sync + 'static {
    /// Consistent read snapshot
    type View<'a>: LedgerView
    where
        Self: 'a;

    /// Open a read snapshot
    fn view(&self) -> Result<Self::View<'_>>;

    /// Check preconditions and commit without another writer in between
    ///
    /// `build` runs against a fresh snapshot while the store's writer lock is
    /// held, so no other commit can land between what it reads and what it
    /// returns. An error from `build` aborts with nothing written.
    fn commit_with<T, F>(&self, build: F) -> Result<T>
    where
        F: FnOnce(&Self::View<'_>) -> Result<(WriteSet, T)>;

    /// Apply all records and their index entries atomically
    fn commit(&self, writes: WriteSet) -> Result<()> {
        self.commit_with(move |_| Ok((writes, ())))
    }

    /// Highest record ID ever committed (0 for an empty store)
    fn last_id(&self) -> Result<u64>;
}

/// Lazy, finite scan over one index, decoding each referenced record
pub struct Records<'a, V: ?Sized, T> {
    view: &'a V,
    ids: Box<dyn Iterator<Item = Result<u64>> + 'a>,
    extract: fn(Record) -> Option<T>,
    _marker: PhantomData<T>,
}

impl<'a, V: LedgerView + ?Sized, T> Iterator for Records<'a, V, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = match self.ids.next()? {
            Ok(id) => id,
            Err(e) => return Some(Err(e)),
        };
        Some(match self.view.record(id) {
            Ok(Some(record)) => {
                let kind = record.kind();
                (self.extract)(record).ok_or_else(|| {
                    Error::Corrupt(format!("index entry {} points at a {}", id, kind))
                })
            }
            Ok(None) => Err(Error::Corrupt(format!("index entry {} is dangling", id))),
            Err(e) => Err(e),
        })
    }
}

/// Sum coin amounts without silent overflow
pub(crate) fn checked_sum(amounts: impl IntoIterator<Item = Result<Coins>>) -> Result<Coins> {
    amounts.into_iter().try_fold(0u64, |total, amount| {
        total.checked_add(amount?).ok_or(Error::AmountOverflow)
    })
}

/// Read access to a consistent snapshot of the ledger
pub trait LedgerView {
    /// Record by raw ID
    fn record(&self, id: u64) -> Result<Option<Record>>;

    /// Record IDs under an index prefix, ascending
    fn scan(&self, key: &IndexKey) -> Box<dyn Iterator<Item = Result<u64>> + '_>;

    /// Typed scan helper
    fn records<T>(&self, key: IndexKey, extract: fn(Record) -> Option<T>) -> Records<'_, Self, T>
    where
        Self: Sized,
    {
        Records {
            view: self,
            ids: self.scan(&key),
            extract,
            _marker: PhantomData,
        }
    }

    // Lookups by ID (deleted records included)

    /// Conversation by ID
    fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        Ok(self.record(id.get())?.and_then(Record::into_conversation))
    }

    /// Message by ID
    fn message(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.record(id.get())?.and_then(Record::into_message))
    }

    /// File by ID
    fn file(&self, id: FileId) -> Result<Option<File>> {
        Ok(self.record(id.get())?.and_then(Record::into_file))
    }

    /// Purchase by ID
    fn purchase(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        Ok(self.record(id.get())?.and_then(Record::into_purchase))
    }

    /// Gift by ID
    fn gift(&self, id: GiftId) -> Result<Option<Gift>> {
        Ok(self.record(id.get())?.and_then(Record::into_gift))
    }

    /// Award by ID
    fn award(&self, id: AwardId) -> Result<Option<Award>> {
        Ok(self.record(id.get())?.and_then(Record::into_award))
    }

    // Index scans

    /// All conversations, oldest first
    fn conversations(&self) -> Records<'_, Self, Conversation>
    where
        Self: Sized,
    {
        self.records(IndexKey::all(IndexTag::Conversations), Record::into_conversation)
    }

    /// Messages of a conversation
    fn messages_in(&self, conversation: ConversationId) -> Records<'_, Self, Message>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::ConversationMessages, conversation.get()),
            Record::into_message,
        )
    }

    /// Messages written by a user
    fn messages_by(&self, user: UserId) -> Records<'_, Self, Message>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::AuthorMessages, user.get()),
            Record::into_message,
        )
    }

    /// Direct replies to a message
    fn replies_to(&self, message: MessageId) -> Records<'_, Self, Message>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::MessageReplies, message.get()),
            Record::into_message,
        )
    }

    /// Attachments of a message
    fn files_of(&self, message: MessageId) -> Records<'_, Self, File>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::MessageFiles, message.get()),
            Record::into_file,
        )
    }

    /// Charges for a message
    fn charges_of(&self, message: MessageId) -> Records<'_, Self, Charge>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::MessageCharges, message.get()),
            Record::into_charge,
        )
    }

    /// Charges paid by a user
    fn charges_by(&self, user: UserId) -> Records<'_, Self, Charge>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::UserCharges, user.get()),
            Record::into_charge,
        )
    }

    /// Yields credited to a message
    fn yields_to(&self, parent: MessageId) -> Records<'_, Self, Yield>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::ParentYields, parent.get()),
            Record::into_yield,
        )
    }

    /// Yields produced by a message
    fn yields_from(&self, message: MessageId) -> Records<'_, Self, Yield>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::MessageYields, message.get()),
            Record::into_yield,
        )
    }

    /// Purchases credited to a user
    fn purchases_by(&self, user: UserId) -> Records<'_, Self, Purchase>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::UserPurchases, user.get()),
            Record::into_purchase,
        )
    }

    /// Purchases recorded for a payment session
    fn purchases_for_session(&self, session_id: &str) -> Records<'_, Self, Purchase>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::text(IndexTag::SessionPurchases, session_id),
            Record::into_purchase,
        )
    }

    /// Gifts to a message
    fn gifts_to(&self, message: MessageId) -> Records<'_, Self, Gift>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::MessageGifts, message.get()),
            Record::into_gift,
        )
    }

    /// Gifts sent by a user
    fn gifts_from(&self, user: UserId) -> Records<'_, Self, Gift>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::SenderGifts, user.get()),
            Record::into_gift,
        )
    }

    /// Gifts within a conversation
    fn gifts_in(&self, conversation: ConversationId) -> Records<'_, Self, Gift>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::ConversationGifts, conversation.get()),
            Record::into_gift,
        )
    }

    /// Awards credited to a user
    fn awards_by(&self, user: UserId) -> Records<'_, Self, Award>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::UserAwards, user.get()),
            Record::into_award,
        )
    }

    /// Tombstones pointing at a record
    fn tombstones_for(&self, target: u64) -> Records<'_, Self, Tombstone>
    where
        Self: Sized,
    {
        self.records(
            IndexKey::id(IndexTag::TargetTombstones, target),
            Record::into_tombstone,
        )
    }

    // Soft-delete visibility

    /// Whether a record has been soft-deleted
    fn is_deleted(&self, target: u64) -> Result<bool> {
        Ok(self
            .scan(&IndexKey::id(IndexTag::TargetTombstones, target))
            .next()
            .transpose()?
            .is_some())
    }

    /// Conversation, unless absent or deleted
    fn live_conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        match self.conversation(id)? {
            Some(c) if !self.is_deleted(id.get())? => Ok(Some(c)),
            _ => Ok(None),
        }
    }

    /// Message, unless absent or deleted
    fn live_message(&self, id: MessageId) -> Result<Option<Message>> {
        match self.message(id)? {
            Some(m) if !self.is_deleted(id.get())? => Ok(Some(m)),
            _ => Ok(None),
        }
    }

    /// Parent of a live message (`None` for a root message)
    fn parent_of(&self, id: MessageId) -> Result<Option<MessageId>> {
        self.live_message(id)?
            .map(|m| m.parent)
            .ok_or(Error::MessageNotFound(id))
    }

    /// Root message of a conversation
    fn root_message(&self, conversation: ConversationId) -> Result<Option<Message>>
    where
        Self: Sized,
    {
        for message in self.messages_in(conversation) {
            let message = message?;
            if message.is_root() {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    // Aggregates

    /// Cost charged for a live message (0 once deleted)
    fn message_cost(&self, id: MessageId) -> Result<Coins>
    where
        Self: Sized,
    {
        if self.is_deleted(id.get())? {
            return Ok(0);
        }
        checked_sum(self.charges_of(id).map(|c| c.map(|c| c.amount)))
    }

    /// Yield credited to a message by its live descendants
    fn message_yield(&self, id: MessageId) -> Result<Coins>
    where
        Self: Sized,
    {
        checked_sum(self.yields_to(id).filter_map(|y| match y {
            Ok(y) => match self.is_deleted(y.message.get()) {
                Ok(true) => None,
                Ok(false) => Some(Ok(y.amount)),
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        }))
    }

    /// Charges a user paid for live messages
    fn total_charges(&self, user: UserId) -> Result<Coins>
    where
        Self: Sized,
    {
        checked_sum(self.charges_by(user).filter_map(|c| match c {
            Ok(c) => match self.is_deleted(c.message.get()) {
                Ok(true) => None,
                Ok(false) => Some(Ok(c.amount)),
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        }))
    }

    /// Yield credited to a user's live messages
    fn total_yields(&self, user: UserId) -> Result<Coins>
    where
        Self: Sized,
    {
        checked_sum(self.live_messages_by(user).map(|m| self.message_yield(m?.id)))
    }

    /// Gifts received on a user's live messages
    fn total_gifts_received(&self, user: UserId) -> Result<Coins>
    where
        Self: Sized,
    {
        checked_sum(self.live_messages_by(user).map(|m| {
            checked_sum(self.gifts_to(m?.id).map(|g| g.map(|g| g.amount)))
        }))
    }

    /// Gifts a user sent
    fn total_gifts_sent(&self, user: UserId) -> Result<Coins>
    where
        Self: Sized,
    {
        checked_sum(self.gifts_from(user).map(|g| g.map(|g| g.amount)))
    }

    /// Coins a user bought
    fn total_purchases(&self, user: UserId) -> Result<Coins>
    where
        Self: Sized,
    {
        checked_sum(self.purchases_by(user).map(|p| p.map(|p| p.bundle_size)))
    }

    /// Coins a user was awarded
    fn total_awards(&self, user: UserId) -> Result<Coins>
    where
        Self: Sized,
    {
        checked_sum(self.awards_by(user).map(|a| a.map(|a| a.amount)))
    }

    /// Messages written by a user that are not deleted
    fn live_messages_by(&self, user: UserId) -> Box<dyn Iterator<Item = Result<Message>> + '_>
    where
        Self: Sized,
    {
        Box::new(self.messages_by(user).filter_map(move |m| match m {
            Ok(m) => match self.is_deleted(m.id.get()) {
                Ok(true) => None,
                Ok(false) => Some(Ok(m)),
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        }))
    }

    // Rankings

    /// Summary of a live conversation with a live root message
    fn conversation_summary(&self, conversation: Conversation) -> Result<Option<ConversationSummary>>
    where
        Self: Sized,
    {
        if self.is_deleted(conversation.id.get())? {
            return Ok(None);
        }
        let root = match self.root_message(conversation.id)? {
            Some(root) if !self.is_deleted(root.id.get())? => root,
            _ => return Ok(None),
        };
        Ok(Some(ConversationSummary {
            root: root.id,
            cost: self.message_cost(root.id)?,
            yields: self.message_yield(root.id)?,
            conversation,
        }))
    }

    /// Conversations created at or after `since` whose root earned yield,
    /// highest yield first; ties keep creation (ID) order
    fn best_conversations(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<ConversationSummary>>
    where
        Self: Sized,
    {
        let mut results = Vec::new();
        for conversation in self.conversations() {
            let conversation = conversation?;
            if conversation.created < since {
                continue;
            }
            if let Some(summary) = self.conversation_summary(conversation)? {
                if summary.yields > 0 {
                    results.push(summary);
                }
            }
        }
        // Stable sort: equal yields stay in ascending ID order
        results.sort_by(|a, b| b.yields.cmp(&a.yields));
        results.truncate(limit);
        Ok(results)
    }

    /// Live conversations, newest first; ties put the later ID first
    fn recent_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>>
    where
        Self: Sized,
    {
        let mut results = Vec::new();
        for conversation in self.conversations() {
            if let Some(summary) = self.conversation_summary(conversation?)? {
                results.push(summary);
            }
        }
        results.sort_by(|a, b| {
            b.conversation
                .created
                .cmp(&a.conversation.created)
                .then_with(|| b.conversation.id.cmp(&a.conversation.id))
        });
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    //! Contract tests run against every backend

    use super::*;
    use crate::types::{Target, TombstoneId};
    use chrono::Duration;

    pub(crate) fn conversation(id: u64, author: u64, created: DateTime<Utc>) -> Record {
        Record::Conversation(Conversation {
            id: ConversationId::new(id),
            author: UserId::new(author),
            topic: format!("topic {}", id),
            created,
        })
    }

    pub(crate) fn message(id: u64, author: u64, conversation: u64, parent: Option<u64>) -> Record {
        Record::Message(Message {
            id: MessageId::new(id),
            author: UserId::new(author),
            conversation: ConversationId::new(conversation),
            parent: parent.map(MessageId::new),
            created: Utc::now(),
        })
    }

    pub(crate) fn charge(id: u64, user: u64, conversation: u64, message: u64, amount: Coins) -> Record {
        Record::Charge(Charge {
            id: crate::types::ChargeId::new(id),
            user: UserId::new(user),
            conversation: ConversationId::new(conversation),
            message: MessageId::new(message),
            amount,
            created: Utc::now(),
        })
    }

    pub(crate) fn yield_record(id: u64, user: u64, conversation: u64, message: u64, parent: u64, amount: Coins) -> Record {
        Record::Yield(Yield {
            id: crate::types::YieldId::new(id),
            user: UserId::new(user),
            conversation: ConversationId::new(conversation),
            message: MessageId::new(message),
            parent: MessageId::new(parent),
            amount,
            created: Utc::now(),
        })
    }

    fn tombstone(id: u64, user: u64, target: Target) -> Record {
        Record::Tombstone(Tombstone {
            id: TombstoneId::new(id),
            user: UserId::new(user),
            target,
            created: Utc::now(),
        })
    }

    fn thread() -> WriteSet {
        let mut writes = WriteSet::new();
        writes.push(conversation(1, 10, Utc::now()));
        writes.push(message(2, 10, 1, None));
        writes.push(charge(3, 10, 1, 2, 40));
        writes.push(message(4, 20, 1, Some(2)));
        writes.push(charge(5, 20, 1, 4, 30));
        writes.push(yield_record(6, 20, 1, 4, 2, 15));
        writes
    }

    pub(crate) fn check_lookup_and_scan<S: LedgerStore>(store: &S) {
        store.commit(thread()).unwrap();
        assert_eq!(store.last_id().unwrap(), 6);

        let view = store.view().unwrap();
        let root = view.message(MessageId::new(2)).unwrap().unwrap();
        assert!(root.is_root());
        assert!(view.message(MessageId::new(3)).unwrap().is_none(), "charge is not a message");

        let messages: Vec<_> = view
            .messages_in(ConversationId::new(1))
            .map(|m| m.unwrap().id.get())
            .collect();
        assert_eq!(messages, vec![2, 4]);

        let replies: Vec<_> = view
            .replies_to(MessageId::new(2))
            .map(|m| m.unwrap().id.get())
            .collect();
        assert_eq!(replies, vec![4]);

        assert_eq!(view.parent_of(MessageId::new(4)).unwrap(), Some(MessageId::new(2)));
        assert_eq!(view.parent_of(MessageId::new(2)).unwrap(), None);
        assert!(matches!(
            view.parent_of(MessageId::new(99)),
            Err(Error::MessageNotFound(_))
        ));
    }

    pub(crate) fn check_aggregates<S: LedgerStore>(store: &S) {
        store.commit(thread()).unwrap();

        let view = store.view().unwrap();
        assert_eq!(view.message_cost(MessageId::new(2)).unwrap(), 40);
        assert_eq!(view.message_yield(MessageId::new(2)).unwrap(), 15);
        assert_eq!(view.total_charges(UserId::new(10)).unwrap(), 40);
        assert_eq!(view.total_charges(UserId::new(20)).unwrap(), 30);
        assert_eq!(view.total_yields(UserId::new(10)).unwrap(), 15);
        assert_eq!(view.total_yields(UserId::new(20)).unwrap(), 0);
    }

    pub(crate) fn check_tombstones<S: LedgerStore>(store: &S) {
        store.commit(thread()).unwrap();
        let mut writes = WriteSet::new();
        writes.push(tombstone(7, 20, Target::Message(MessageId::new(4))));
        store.commit(writes).unwrap();

        let view = store.view().unwrap();
        assert!(view.is_deleted(4).unwrap());
        assert!(view.live_message(MessageId::new(4)).unwrap().is_none());
        // Stored rows survive deletion
        assert!(view.message(MessageId::new(4)).unwrap().is_some());
        assert_eq!(view.total_charges(UserId::new(20)).unwrap(), 0);
        assert_eq!(view.message_yield(MessageId::new(2)).unwrap(), 0);
    }

    pub(crate) fn check_rankings<S: LedgerStore>(store: &S) {
        let now = Utc::now();
        let mut writes = WriteSet::new();
        // Three conversations; root yields 5, 0, 5
        writes.push(conversation(1, 10, now - Duration::hours(3)));
        writes.push(message(2, 10, 1, None));
        writes.push(conversation(3, 10, now - Duration::hours(2)));
        writes.push(message(4, 10, 3, None));
        writes.push(conversation(5, 10, now - Duration::hours(1)));
        writes.push(message(6, 10, 5, None));
        writes.push(message(7, 20, 1, Some(2)));
        writes.push(yield_record(8, 20, 1, 7, 2, 5));
        writes.push(message(9, 20, 5, Some(6)));
        writes.push(yield_record(10, 20, 5, 9, 6, 5));
        store.commit(writes).unwrap();

        let view = store.view().unwrap();
        let best: Vec<_> = view
            .best_conversations(now - Duration::days(1), 10)
            .unwrap()
            .into_iter()
            .map(|s| s.conversation.id.get())
            .collect();
        assert_eq!(best, vec![1, 5], "zero-yield excluded, ties in insertion order");

        let windowed = view
            .best_conversations(now - Duration::minutes(90), 10)
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].conversation.id.get(), 5);

        let recent: Vec<_> = view
            .recent_conversations(2)
            .unwrap()
            .into_iter()
            .map(|s| s.conversation.id.get())
            .collect();
        assert_eq!(recent, vec![5, 3]);
    }

    #[test]
    fn test_index_key_layout() {
        let key = IndexKey::id(IndexTag::UserCharges, 5);
        assert_eq!(key.prefix().len(), 9);
        let entry = key.entry(77);
        assert!(entry.starts_with(key.prefix()));
        assert_eq!(entry_id(&entry).unwrap(), 77);

        let text = IndexKey::text(IndexTag::SessionPurchases, "cs_test_123");
        assert_eq!(text.prefix().len(), 33);
        assert!(entry_id(&[1, 2]).is_err());
    }

    #[test]
    fn test_purchase_without_session_is_not_indexed_by_session() {
        let record = Record::Purchase(Purchase {
            id: PurchaseId::new(1),
            user: UserId::new(2),
            checkout: Default::default(),
            bundle_size: 10,
            created: Utc::now(),
        });
        assert_eq!(index_entries(&record).len(), 1);
    }

    #[test]
    fn test_checked_sum_overflow() {
        assert_eq!(checked_sum(vec![Ok(1), Ok(2)]).unwrap(), 3);
        assert!(matches!(
            checked_sum(vec![Ok(u64::MAX), Ok(1)]),
            Err(Error::AmountOverflow)
        ));
    }
}
