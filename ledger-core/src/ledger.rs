//! Main ledger orchestration layer
//!
//! Ties together the store, the writer actor and the domain components into
//! one API. Writes are async and serialised by the actor; reads are
//! synchronous and answered from a fresh snapshot.
//!
//! # Example
//!
//! ```no_run
//! use convey_ledger::{Account, Attachment, Config, Ledger, UserId};
//!
//! #[tokio::main]
//! async fn main() -> convey_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let alice = Account::new(UserId::new(1), "alice", "alice@example.com");
//!     ledger.award(alice.id, 100).await?;
//!     let thread = ledger
//!         .create_conversation(&alice, "Hello", vec![Attachment::new("ab12", "text/plain", 42)])
//!         .await?;
//!     assert_eq!(ledger.balance(alice.id)?, 58);
//!     # let _ = thread;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    account::AccountLedger,
    actor::{spawn_ledger_actor, LedgerHandle},
    content::ContentTree,
    gift::GiftTransfer,
    metrics::Metrics,
    notify::{GiftNotice, LogNotifier, MentionNotice, Notifier, ResponseNotice},
    sequence::{AtomicSequence, IdSequence},
    store::{LedgerStore, LedgerView, MemoryStore, RocksStore},
    types::{
        Account, Attachment, Award, Coins, Conversation, ConversationId, ConversationSummary,
        File, FileId, Gift, GiftId, MessageId, MessageSummary, NewConversation, NewMessage,
        Purchase, PurchaseId, StripeCheckout, Tombstone, UserId,
    },
    Config, Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Main ledger interface
pub struct Ledger<S: LedgerStore> {
    /// Actor handle for writes
    handle: LedgerHandle,
    actor: JoinHandle<()>,

    /// Direct store access (for reads)
    store: Arc<S>,

    content: ContentTree<S>,
    accounts: AccountLedger<S>,
    gifts: GiftTransfer<S>,

    notifier: Arc<dyn Notifier>,
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger<RocksStore> {
    /// Open a durable ledger under `config.data_dir`
    pub async fn open(config: Config) -> Result<Self> {
        let store = Arc::new(RocksStore::open(&config)?);
        Self::with_store(store, config)
    }
}

impl Ledger<MemoryStore> {
    /// Volatile ledger, mostly for tests
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Build a ledger over an opened store and spawn its writer
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_store(store: Arc<S>, config: Config) -> Result<Self> {
        let last_id = store.last_id()?;
        let sequence: Arc<dyn IdSequence> = Arc::new(AtomicSequence::starting_after(last_id));
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        let content = ContentTree::new(store.clone(), sequence.clone(), config.ledger.clone());
        let accounts = AccountLedger::new(store.clone(), sequence.clone(), config.ledger.clone());
        let gifts = GiftTransfer::new(store.clone(), sequence);

        let (handle, actor) = spawn_ledger_actor(
            content.clone(),
            accounts.clone(),
            gifts.clone(),
            metrics.clone(),
            config.actor.mailbox_capacity,
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            last_id,
            "Ledger started"
        );

        Ok(Self {
            handle,
            actor,
            store,
            content,
            accounts,
            gifts,
            notifier: Arc::new(LogNotifier),
            metrics,
            config,
        })
    }

    /// Replace the notification collaborator
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    // Writes

    /// Start a conversation with its root message
    pub async fn create_conversation(
        &self,
        author: &Account,
        topic: &str,
        attachments: Vec<Attachment>,
    ) -> Result<NewConversation> {
        self.handle
            .create_conversation(author.clone(), topic.to_string(), attachments)
            .await
    }

    /// Reply to a message; notifies the parent's author
    pub async fn create_message(
        &self,
        author: &Account,
        conversation: ConversationId,
        parent: MessageId,
        attachments: Vec<Attachment>,
    ) -> Result<NewMessage> {
        let created = self
            .handle
            .create_message(author.clone(), conversation, parent, attachments)
            .await?;

        match self.response_notice(&created) {
            Ok(Some(notice)) => {
                if let Err(e) = self.notifier.response(&notice) {
                    tracing::warn!(message_id = %created.message.id, error = %e, "Response notification failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(message_id = %created.message.id, error = %e, "Response notification skipped");
            }
        }

        Ok(created)
    }

    /// Tell `recipient` they were named in `message`
    ///
    /// Nothing is written. Mentioning yourself sends nothing; a deleted or
    /// unknown message fails with [`Error::MessageNotFound`]. Delivery
    /// failures are logged, not returned.
    pub fn mention(&self, recipient: UserId, message: MessageId) -> Result<Option<MentionNotice>> {
        let mentioned = {
            let view = self.store.view()?;
            let mentioned = view
                .live_message(message)?
                .ok_or(Error::MessageNotFound(message))?;
            if view.live_conversation(mentioned.conversation)?.is_none() {
                return Err(Error::MessageNotFound(message));
            }
            mentioned
        };
        if mentioned.author == recipient {
            return Ok(None);
        }

        let notice = MentionNotice {
            recipient,
            mentioner: mentioned.author,
            conversation: mentioned.conversation,
            topic: self.topic_of(mentioned.conversation),
            message,
        };
        if let Err(e) = self.notifier.mention(&notice) {
            tracing::warn!(message_id = %message, error = %e, "Mention notification failed");
        }

        Ok(Some(notice))
    }

    /// Soft-delete a message
    pub async fn delete_message(&self, user: UserId, message: MessageId) -> Result<Vec<Tombstone>> {
        self.handle.delete_message(user, message).await
    }

    /// Soft-delete a conversation
    pub async fn delete_conversation(
        &self,
        user: UserId,
        conversation: ConversationId,
    ) -> Result<Tombstone> {
        self.handle.delete_conversation(user, conversation).await
    }

    /// Gift coins to a message's author; notifies the recipient
    pub async fn gift(
        &self,
        sender: UserId,
        conversation: ConversationId,
        message: MessageId,
        amount: Coins,
    ) -> Result<Gift> {
        let (gift, target) = self
            .handle
            .gift(sender, conversation, message, amount)
            .await?;

        let topic = self.topic_of(conversation);
        let notice = GiftNotice {
            recipient: target.author,
            sender,
            conversation,
            topic,
            message,
            amount,
        };
        if let Err(e) = self.notifier.gift(&notice) {
            tracing::warn!(gift_id = %gift.id, error = %e, "Gift notification failed");
        }

        Ok(gift)
    }

    /// Record a completed checkout
    pub async fn record_purchase(
        &self,
        user: UserId,
        checkout: StripeCheckout,
        bundle_size: Coins,
    ) -> Result<Purchase> {
        self.handle.record_purchase(user, checkout, bundle_size).await
    }

    /// Credit an award
    pub async fn award(&self, user: UserId, amount: Coins) -> Result<Award> {
        self.handle.award(user, amount).await
    }

    // Reads

    /// Current spendable balance
    pub fn balance(&self, user: UserId) -> Result<i64> {
        self.accounts.balance(user)
    }

    /// Live conversation by ID
    pub fn conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.content.conversation(id)
    }

    /// Live message with its cost and yield
    pub fn message(&self, id: MessageId) -> Result<MessageSummary> {
        self.content.message(id)
    }

    /// Live messages of a conversation, oldest first
    pub fn messages(&self, conversation: ConversationId) -> Result<Vec<MessageSummary>> {
        self.content.messages(conversation)
    }

    /// Parent of a message (`None` for a root message)
    pub fn parent_of(&self, id: MessageId) -> Result<Option<MessageId>> {
        self.content.parent_of(id)
    }

    /// File by ID
    pub fn file(&self, id: FileId) -> Result<File> {
        self.content.file(id)
    }

    /// Attachments of a message
    pub fn files(&self, message: MessageId) -> Result<Vec<File>> {
        self.content.files(message)
    }

    /// Gift by ID
    pub fn gift_by_id(&self, id: GiftId) -> Result<Gift> {
        self.gifts.lookup(id)
    }

    /// Gifts in a conversation, optionally narrowed to one message
    pub fn gifts(&self, conversation: ConversationId, message: Option<MessageId>) -> Result<Vec<Gift>> {
        self.gifts.gifts(conversation, message)
    }

    /// Purchase by ID
    pub fn purchase(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        self.accounts.purchase(id)
    }

    /// Purchases of a user
    pub fn purchases(&self, user: UserId) -> Result<Vec<Purchase>> {
        self.accounts.purchases(user)
    }

    /// Awards of a user
    pub fn awards(&self, user: UserId) -> Result<Vec<Award>> {
        self.accounts.awards(user)
    }

    /// Highest-yield conversations created at or after `since`
    pub fn best(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<ConversationSummary>> {
        self.content.best(since, limit)
    }

    /// Newest conversations
    pub fn recent(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        self.content.recent(limit)
    }

    /// Underlying store, for read-only reporting
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    ///
    /// Returns once the writer has stopped, so the store can be reopened
    /// right away.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            handle,
            actor,
            store,
            content,
            accounts,
            gifts,
            ..
        } = self;
        handle.shutdown().await?;
        actor
            .await
            .map_err(|e| Error::Concurrency(format!("Ledger actor failed: {}", e)))?;
        drop((content, accounts, gifts, store));

        tracing::info!("Ledger stopped");
        Ok(())
    }

    fn topic_of(&self, conversation: ConversationId) -> String {
        self.store
            .view()
            .and_then(|view| view.conversation(conversation))
            .ok()
            .flatten()
            .map(|c| c.topic)
            .unwrap_or_default()
    }

    fn response_notice(&self, created: &NewMessage) -> Result<Option<ResponseNotice>> {
        let parent = match created.message.parent {
            Some(parent) => parent,
            None => return Ok(None),
        };
        let recipient = {
            let view = self.store.view()?;
            view.message(parent)?
                .ok_or(Error::MessageNotFound(parent))?
                .author
        };
        if recipient == created.message.author {
            return Ok(None);
        }
        Ok(Some(ResponseNotice {
            recipient,
            responder: created.message.author,
            conversation: created.message.conversation,
            topic: self.topic_of(created.message.conversation),
            message: created.message.id,
        }))
    }
}
