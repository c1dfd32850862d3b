//! Actor-based concurrency for the ledger
//!
//! Every mutating operation goes through one writer task:
//! - Balance checks and the writes they guard run back to back, so two
//!   concurrent gifts can never jointly overspend
//! - Each command commits one atomic write set
//! - Bounded mailbox gives callers backpressure
//!
//! Reads do not pass through the actor; they open their own snapshot.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Request handlers (many concurrent tasks)      │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                   │
//! │         Sends commands to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)               │
//! │   ContentTree / AccountLedger / GiftTransfer         │
//! │                       │                              │
//! │                       ▼                              │
//! │     LedgerStore::commit_with(checks → WriteSet)      │
//! │      (RocksDB WriteBatch / one write-lock section)   │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::{
    account::AccountLedger,
    content::ContentTree,
    gift::GiftTransfer,
    metrics::Metrics,
    store::LedgerStore,
    types::{
        Account, Attachment, Award, Coins, ConversationId, Gift, Message, MessageId,
        NewConversation, NewMessage, Purchase, StripeCheckout, Tombstone, UserId,
    },
    Error, Result,
};
use chrono::Utc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Command sent to the ledger actor
#[derive(Debug)]
pub enum LedgerCommand {
    /// Start a conversation
    CreateConversation {
        author: Account,
        topic: String,
        attachments: Vec<Attachment>,
        response: oneshot::Sender<Result<NewConversation>>,
    },

    /// Reply to a message
    CreateMessage {
        author: Account,
        conversation: ConversationId,
        parent: MessageId,
        attachments: Vec<Attachment>,
        response: oneshot::Sender<Result<NewMessage>>,
    },

    /// Soft-delete a message
    DeleteMessage {
        user: UserId,
        message: MessageId,
        response: oneshot::Sender<Result<Vec<Tombstone>>>,
    },

    /// Soft-delete a conversation
    DeleteConversation {
        user: UserId,
        conversation: ConversationId,
        response: oneshot::Sender<Result<Tombstone>>,
    },

    /// Gift coins to a message's author
    Gift {
        sender: UserId,
        conversation: ConversationId,
        message: MessageId,
        amount: Coins,
        response: oneshot::Sender<Result<(Gift, Message)>>,
    },

    /// Record a completed checkout
    RecordPurchase {
        user: UserId,
        checkout: StripeCheckout,
        bundle_size: Coins,
        response: oneshot::Sender<Result<Purchase>>,
    },

    /// Credit an award
    Award {
        user: UserId,
        amount: Coins,
        response: oneshot::Sender<Result<Award>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that applies ledger commands one at a time
pub struct LedgerActor<S> {
    content: ContentTree<S>,
    accounts: AccountLedger<S>,
    gifts: GiftTransfer<S>,
    metrics: Metrics,
    mailbox: mpsc::Receiver<LedgerCommand>,
}

impl<S: LedgerStore> LedgerActor<S> {
    /// Create new actor
    pub fn new(
        content: ContentTree<S>,
        accounts: AccountLedger<S>,
        gifts: GiftTransfer<S>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<LedgerCommand>,
    ) -> Self {
        Self {
            content,
            accounts,
            gifts,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(command) = self.mailbox.recv().await {
            if let LedgerCommand::Shutdown = command {
                break;
            }
            self.handle_command(command);
        }
        tracing::info!("Ledger actor stopped");
    }

    fn observe<T>(&self, op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let timer = self.metrics.start_operation(op);
        let result = f();
        timer.observe_duration();
        if let Err(e) = &result {
            self.metrics.record_rejection(op, e.reason());
            if e.is_retryable() || matches!(e, Error::Corrupt(_) | Error::Serialization(_)) {
                tracing::error!(op, error = %e, "Ledger command failed");
            } else {
                tracing::debug!(op, error = %e, "Ledger command rejected");
            }
        }
        result
    }

    fn handle_command(&self, command: LedgerCommand) {
        let now = Utc::now();
        match command {
            LedgerCommand::CreateConversation {
                author,
                topic,
                attachments,
                response,
            } => {
                let result = self.observe("create_conversation", || {
                    self.content
                        .create_conversation(&author, &topic, &attachments, now)
                });
                if let Ok(created) = &result {
                    self.metrics.record_created("conversation", 1);
                    self.metrics.record_created("message", 1);
                    self.metrics.record_created("file", created.files.len());
                    self.metrics.record_created("charge", 1);
                }
                let _ = response.send(result);
            }

            LedgerCommand::CreateMessage {
                author,
                conversation,
                parent,
                attachments,
                response,
            } => {
                let result = self.observe("create_message", || {
                    self.content
                        .create_message(&author, conversation, parent, &attachments, now)
                });
                if let Ok(created) = &result {
                    self.metrics.record_created("message", 1);
                    self.metrics.record_created("file", created.files.len());
                    self.metrics.record_created("charge", 1);
                    self.metrics.record_created("yield", created.yields.len());
                }
                let _ = response.send(result);
            }

            LedgerCommand::DeleteMessage {
                user,
                message,
                response,
            } => {
                let result = self.observe("delete_message", || {
                    self.content.delete_message(user, message, now)
                });
                if let Ok(tombstones) = &result {
                    self.metrics.record_created("tombstone", tombstones.len());
                }
                let _ = response.send(result);
            }

            LedgerCommand::DeleteConversation {
                user,
                conversation,
                response,
            } => {
                let result = self.observe("delete_conversation", || {
                    self.content.delete_conversation(user, conversation, now)
                });
                if result.is_ok() {
                    self.metrics.record_created("tombstone", 1);
                }
                let _ = response.send(result);
            }

            LedgerCommand::Gift {
                sender,
                conversation,
                message,
                amount,
                response,
            } => {
                let result = self.observe("gift", || {
                    self.gifts.gift(sender, conversation, message, amount, now)
                });
                if result.is_ok() {
                    self.metrics.record_created("gift", 1);
                }
                let _ = response.send(result);
            }

            LedgerCommand::RecordPurchase {
                user,
                checkout,
                bundle_size,
                response,
            } => {
                let result = self.observe("record_purchase", || {
                    self.accounts.record_purchase(user, checkout, bundle_size, now)
                });
                if result.is_ok() {
                    self.metrics.record_created("purchase", 1);
                }
                let _ = response.send(result);
            }

            LedgerCommand::Award {
                user,
                amount,
                response,
            } => {
                let result = self.observe("award", || self.accounts.award(user, amount, now));
                if result.is_ok() {
                    self.metrics.record_created("award", 1);
                }
                let _ = response.send(result);
            }

            LedgerCommand::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending commands to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerCommand>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Start a conversation
    pub async fn create_conversation(
        &self,
        author: Account,
        topic: String,
        attachments: Vec<Attachment>,
    ) -> Result<NewConversation> {
        self.request(|response| LedgerCommand::CreateConversation {
            author,
            topic,
            attachments,
            response,
        })
        .await
    }

    /// Reply to a message
    pub async fn create_message(
        &self,
        author: Account,
        conversation: ConversationId,
        parent: MessageId,
        attachments: Vec<Attachment>,
    ) -> Result<NewMessage> {
        self.request(|response| LedgerCommand::CreateMessage {
            author,
            conversation,
            parent,
            attachments,
            response,
        })
        .await
    }

    /// Soft-delete a message
    pub async fn delete_message(&self, user: UserId, message: MessageId) -> Result<Vec<Tombstone>> {
        self.request(|response| LedgerCommand::DeleteMessage {
            user,
            message,
            response,
        })
        .await
    }

    /// Soft-delete a conversation
    pub async fn delete_conversation(
        &self,
        user: UserId,
        conversation: ConversationId,
    ) -> Result<Tombstone> {
        self.request(|response| LedgerCommand::DeleteConversation {
            user,
            conversation,
            response,
        })
        .await
    }

    /// Gift coins to a message's author
    pub async fn gift(
        &self,
        sender: UserId,
        conversation: ConversationId,
        message: MessageId,
        amount: Coins,
    ) -> Result<(Gift, Message)> {
        self.request(|response| LedgerCommand::Gift {
            sender,
            conversation,
            message,
            amount,
            response,
        })
        .await
    }

    /// Record a completed checkout
    pub async fn record_purchase(
        &self,
        user: UserId,
        checkout: StripeCheckout,
        bundle_size: Coins,
    ) -> Result<Purchase> {
        self.request(|response| LedgerCommand::RecordPurchase {
            user,
            checkout,
            bundle_size,
            response,
        })
        .await
    }

    /// Credit an award
    pub async fn award(&self, user: UserId, amount: Coins) -> Result<Award> {
        self.request(|response| LedgerCommand::Award {
            user,
            amount,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerCommand::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
///
/// The join handle resolves once the actor has stopped and released its
/// store handles.
pub fn spawn_ledger_actor<S: LedgerStore>(
    content: ContentTree<S>,
    accounts: AccountLedger<S>,
    gifts: GiftTransfer<S>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> (LedgerHandle, JoinHandle<()>) {
    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = LedgerActor::new(content, accounts, gifts, metrics, rx);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (LedgerHandle::new(tx), task)
}
