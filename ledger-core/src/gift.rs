//! Gift Transfer
//!
//! A gift moves coins from a sender to the author of one message. It touches
//! exactly two balances and never propagates up the tree.

use crate::{
    account::ensure_affordable,
    error::{Error, Result},
    sequence::IdSequence,
    store::{LedgerStore, LedgerView, WriteSet},
    types::{Coins, ConversationId, Gift, GiftId, Message, MessageId, Record, UserId},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Gift Transfer
pub struct GiftTransfer<S> {
    store: Arc<S>,
    sequence: Arc<dyn IdSequence>,
}

impl<S> Clone for GiftTransfer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sequence: self.sequence.clone(),
        }
    }
}

impl<S: LedgerStore> GiftTransfer<S> {
    /// Create gift transfer over a shared store
    pub fn new(store: Arc<S>, sequence: Arc<dyn IdSequence>) -> Self {
        Self { store, sequence }
    }

    /// Transfer `amount` from `sender` to the author of `message`
    ///
    /// Returns the gift together with the credited message.
    pub fn gift(
        &self,
        sender: UserId,
        conversation: ConversationId,
        message: MessageId,
        amount: Coins,
        now: DateTime<Utc>,
    ) -> Result<(Gift, Message)> {
        let (gift, target) = self.store.commit_with(|view| {
            let target = match view.live_message(message)? {
                Some(m) if m.conversation == conversation => m,
                _ => return Err(Error::MessageNotFound(message)),
            };
            if target.author == sender {
                return Err(Error::SelfGiftingNotPermitted);
            }
            if amount == 0 {
                return Err(Error::InvalidAmount("gift must be positive".to_string()));
            }
            if view.live_conversation(conversation)?.is_none() {
                return Err(Error::ConversationNotFound(conversation));
            }
            ensure_affordable(view, sender, amount)?;

            let gift = Gift {
                id: GiftId::new(self.sequence.next_id()),
                from: sender,
                conversation,
                message,
                amount,
                created: now,
            };
            let mut writes = WriteSet::new();
            writes.push(Record::Gift(gift.clone()));
            Ok((writes, (gift, target)))
        })?;

        tracing::info!(
            gift_id = %gift.id,
            from = %sender,
            to = %target.author,
            message_id = %message,
            amount,
            "Created Gift"
        );

        Ok((gift, target))
    }

    /// Gift by ID
    pub fn lookup(&self, id: GiftId) -> Result<Gift> {
        self.store.view()?.gift(id)?.ok_or(Error::GiftNotFound(id))
    }

    /// Gifts in a conversation, optionally narrowed to one message, oldest first
    pub fn gifts(&self, conversation: ConversationId, message: Option<MessageId>) -> Result<Vec<Gift>> {
        let view = self.store.view()?;
        match message {
            Some(message) => view
                .gifts_to(message)
                .filter(|g| !matches!(g, Ok(g) if g.conversation != conversation))
                .collect(),
            None => view.gifts_in(conversation).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::AccountLedger,
        config::LedgerConfig,
        content::ContentTree,
        sequence::AtomicSequence,
        store::MemoryStore,
        types::{Account, Attachment, NewConversation},
        validation::MIME_TEXT_PLAIN,
    };

    struct Fixture {
        gifts: GiftTransfer<MemoryStore>,
        accounts: AccountLedger<MemoryStore>,
        thread: NewConversation,
    }

    const AUTHOR: UserId = UserId::new(1);
    const SENDER: UserId = UserId::new(2);

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let sequence: Arc<dyn IdSequence> = Arc::new(AtomicSequence::default());
        let config = LedgerConfig {
            require_funded_posts: false,
            ..LedgerConfig::default()
        };
        let content = ContentTree::new(store.clone(), sequence.clone(), config.clone());
        let thread = content
            .create_conversation(
                &Account::new(AUTHOR, "alice", "alice@example.com"),
                "Hello",
                &[Attachment::new("h", MIME_TEXT_PLAIN, 5)],
                Utc::now(),
            )
            .unwrap();
        Fixture {
            gifts: GiftTransfer::new(store.clone(), sequence.clone()),
            accounts: AccountLedger::new(store, sequence, config),
            thread,
        }
    }

    #[test]
    fn test_gift_moves_coins() {
        let f = fixture();
        f.accounts.award(SENDER, 50, Utc::now()).unwrap();

        let (gift, target) = f
            .gifts
            .gift(SENDER, f.thread.conversation.id, f.thread.message.id, 30, Utc::now())
            .unwrap();
        assert_eq!(target.author, AUTHOR);
        assert_eq!(f.accounts.balance(SENDER).unwrap(), 20);
        assert_eq!(f.accounts.balance(AUTHOR).unwrap(), -5 + 30);
        assert_eq!(f.gifts.lookup(gift.id).unwrap(), gift);
        assert_eq!(f.gifts.gifts(f.thread.conversation.id, None).unwrap().len(), 1);
        assert_eq!(
            f.gifts
                .gifts(f.thread.conversation.id, Some(f.thread.message.id))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_self_gift_rejected_regardless_of_balance() {
        let f = fixture();
        f.accounts.award(AUTHOR, 1_000, Utc::now()).unwrap();
        assert!(matches!(
            f.gifts
                .gift(AUTHOR, f.thread.conversation.id, f.thread.message.id, 1, Utc::now()),
            Err(Error::SelfGiftingNotPermitted)
        ));
        assert!(matches!(
            f.gifts
                .gift(AUTHOR, f.thread.conversation.id, f.thread.message.id, 0, Utc::now()),
            Err(Error::SelfGiftingNotPermitted)
        ));
    }

    #[test]
    fn test_gift_preconditions() {
        let f = fixture();
        let conversation = f.thread.conversation.id;
        let message = f.thread.message.id;

        assert!(matches!(
            f.gifts.gift(SENDER, conversation, MessageId::new(404), 1, Utc::now()),
            Err(Error::MessageNotFound(_))
        ));
        assert!(matches!(
            f.gifts
                .gift(SENDER, ConversationId::new(404), message, 1, Utc::now()),
            Err(Error::MessageNotFound(_))
        ));
        assert!(matches!(
            f.gifts.gift(SENDER, conversation, message, 0, Utc::now()),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            f.gifts.gift(SENDER, conversation, message, 1, Utc::now()),
            Err(Error::InsufficientBalance {
                balance: 0,
                required: 1
            })
        ));
        assert!(matches!(
            f.gifts.lookup(GiftId::new(404)),
            Err(Error::GiftNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_gifts_cannot_overspend() {
        let f = fixture();
        f.accounts.award(SENDER, 10, Utc::now()).unwrap();
        let conversation = f.thread.conversation.id;
        let message = f.thread.message.id;

        let results: Vec<_> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let gifts = f.gifts.clone();
                    scope.spawn(move || gifts.gift(SENDER, conversation, message, 10, Utc::now()))
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::InsufficientBalance { balance: 0, required: 10 })));
        assert_eq!(f.accounts.balance(SENDER).unwrap(), 0);
        assert_eq!(f.gifts.gifts(conversation, None).unwrap().len(), 1);
    }
}
