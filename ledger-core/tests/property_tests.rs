//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Yield halving: each ancestor receives half of what is left
//! - Conservation: Σ balances = Σ purchases + Σ awards − Σ live charges + Σ live yields
//! - Tree integrity: every parent resolves within the same conversation
//! - Self-gifts are always rejected
//! - Reading a balance does not change it

use chrono::Utc;
use convey_ledger::{
    account::AccountLedger,
    config::LedgerConfig,
    content::{ContentTree, Halving},
    gift::GiftTransfer,
    sequence::{AtomicSequence, IdSequence},
    Account, Attachment, Coins, ConversationId, Error, LedgerStore, LedgerView, MemoryStore,
    MessageId, StripeCheckout, UserId,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const USERS: u64 = 3;

struct World {
    store: Arc<MemoryStore>,
    content: ContentTree<MemoryStore>,
    accounts: AccountLedger<MemoryStore>,
    gifts: GiftTransfer<MemoryStore>,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let sequence: Arc<dyn IdSequence> = Arc::new(AtomicSequence::default());
    let config = LedgerConfig {
        require_funded_posts: false,
        ..LedgerConfig::default()
    };
    World {
        content: ContentTree::new(store.clone(), sequence.clone(), config.clone()),
        accounts: AccountLedger::new(store.clone(), sequence.clone(), config),
        gifts: GiftTransfer::new(store.clone(), sequence),
        store,
    }
}

fn account(user: u64) -> Account {
    Account::new(UserId::new(user), format!("user{}", user), format!("user{}@example.com", user))
}

fn text(size: Coins) -> Vec<Attachment> {
    vec![Attachment::new("hash", "text/plain", size)]
}

#[derive(Debug, Clone)]
enum Op {
    Post { user: u64, size: Coins },
    Reply { user: u64, target: usize, size: Coins },
    Gift { user: u64, target: usize, amount: Coins },
    Purchase { user: u64, size: Coins },
    Award { user: u64, amount: Coins },
    Delete { target: usize },
}

/// Strategy for generating ledger operations
fn op_strategy() -> impl Strategy<Value = Op> {
    let user = 1..=USERS;
    prop_oneof![
        (user.clone(), 1u64..10_000).prop_map(|(user, size)| Op::Post { user, size }),
        (user.clone(), any::<usize>(), 1u64..10_000)
            .prop_map(|(user, target, size)| Op::Reply { user, target, size }),
        (user.clone(), any::<usize>(), 1u64..500)
            .prop_map(|(user, target, amount)| Op::Gift { user, target, amount }),
        (user.clone(), 0u64..10_000).prop_map(|(user, size)| Op::Purchase { user, size }),
        (user, 1u64..10_000).prop_map(|(user, amount)| Op::Award { user, amount }),
        any::<usize>().prop_map(|target| Op::Delete { target }),
    ]
}

/// Independent bookkeeping of what should count towards balances
#[derive(Default)]
struct Model {
    /// Every message ever created, in creation order
    messages: Vec<(MessageId, ConversationId, UserId)>,
    /// Live messages: charge and outgoing yields
    live: BTreeMap<MessageId, (Coins, Coins)>,
    purchases: Coins,
    awards: Coins,
}

impl Model {
    fn pick(&self, target: usize) -> Option<(MessageId, ConversationId, UserId)> {
        if self.messages.is_empty() {
            None
        } else {
            Some(self.messages[target % self.messages.len()])
        }
    }
}

fn apply(world: &World, model: &mut Model, op: &Op) {
    let now = Utc::now();
    match *op {
        Op::Post { user, size } => {
            let created = world
                .content
                .create_conversation(&account(user), "Topic", &text(size), now)
                .unwrap();
            model
                .messages
                .push((created.message.id, created.conversation.id, UserId::new(user)));
            model.live.insert(created.message.id, (size, 0));
        }
        Op::Reply { user, target, size } => {
            let (parent, conversation, _) = match model.pick(target) {
                Some(picked) => picked,
                None => return,
            };
            match world
                .content
                .create_message(&account(user), conversation, parent, &text(size), now)
            {
                Ok(created) => {
                    let yielded = created.yields.iter().map(|y| y.amount).sum();
                    model
                        .messages
                        .push((created.message.id, conversation, UserId::new(user)));
                    model.live.insert(created.message.id, (size, yielded));
                }
                Err(Error::ParentNotFound(_)) | Err(Error::ConversationNotFound(_)) => {
                    assert!(!model.live.contains_key(&parent));
                }
                Err(e) => panic!("unexpected reply error: {}", e),
            }
        }
        Op::Gift { user, target, amount } => {
            let (message, conversation, _) = match model.pick(target) {
                Some(picked) => picked,
                None => return,
            };
            match world
                .gifts
                .gift(UserId::new(user), conversation, message, amount, now)
            {
                Ok(_)
                | Err(Error::SelfGiftingNotPermitted)
                | Err(Error::InsufficientBalance { .. })
                | Err(Error::MessageNotFound(_))
                | Err(Error::ConversationNotFound(_)) => {}
                Err(e) => panic!("unexpected gift error: {}", e),
            }
        }
        Op::Purchase { user, size } => {
            world
                .accounts
                .record_purchase(UserId::new(user), StripeCheckout::default(), size, now)
                .unwrap();
            model.purchases += size;
        }
        Op::Award { user, amount } => {
            world.accounts.award(UserId::new(user), amount, now).unwrap();
            model.awards += amount;
        }
        Op::Delete { target } => {
            let (message, _, author) = match model.pick(target) {
                Some(picked) => picked,
                None => return,
            };
            match world.content.delete_message(author, message, now) {
                Ok(_) => {
                    model.live.remove(&message);
                }
                Err(Error::HasReplies(_)) | Err(Error::HasGifts(_)) | Err(Error::MessageNotFound(_)) => {}
                Err(e) => panic!("unexpected delete error: {}", e),
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Each ancestor receives half of what the previous hop left over
    #[test]
    fn prop_yield_halving_exactness(cost in 1u64..1_000_000_000, depth in 1usize..12) {
        let world = world();
        let author = account(1);
        let root = world
            .content
            .create_conversation(&author, "Chain", &text(1), Utc::now())
            .unwrap();
        let mut parent = root.message.id;
        let mut chain = vec![parent];
        for _ in 1..depth {
            parent = world
                .content
                .create_message(&author, root.conversation.id, parent, &text(1), Utc::now())
                .unwrap()
                .message
                .id;
            chain.push(parent);
        }

        let created = world
            .content
            .create_message(&account(2), root.conversation.id, parent, &text(cost), Utc::now())
            .unwrap();

        prop_assert_eq!(created.yields.len(), depth);
        let mut remaining = cost;
        for (y, expected_parent) in created.yields.iter().zip(chain.iter().rev()) {
            prop_assert_eq!(y.amount, remaining / 2);
            prop_assert_eq!(y.parent, *expected_parent);
            remaining -= y.amount;
        }
        let distributed: Coins = created.yields.iter().map(|y| y.amount).sum();
        prop_assert!(distributed <= cost);
        prop_assert_eq!(cost - distributed, remaining);

        let mut halving = Halving::new(cost);
        halving.by_ref().take(depth).for_each(drop);
        prop_assert_eq!(halving.remaining(), remaining);
    }

    /// Balances account for every coin that entered, was burned, or moved
    #[test]
    fn prop_conservation(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let world = world();
        let mut model = Model::default();
        for op in &ops {
            apply(&world, &mut model, op);
        }

        let total: i128 = (1..=USERS)
            .map(|u| i128::from(world.accounts.balance(UserId::new(u)).unwrap()))
            .sum();
        let charges: i128 = model.live.values().map(|(c, _)| i128::from(*c)).sum();
        let yields: i128 = model.live.values().map(|(_, y)| i128::from(*y)).sum();
        let expected = i128::from(model.purchases) + i128::from(model.awards) - charges + yields;
        prop_assert_eq!(total, expected);
    }

    /// Every parent pointer resolves to a message of the same conversation
    #[test]
    fn prop_tree_integrity(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let world = world();
        let mut model = Model::default();
        for op in &ops {
            apply(&world, &mut model, op);
        }

        let view = world.store.view().unwrap();
        for (id, conversation, _) in &model.messages {
            let message = view.message(*id).unwrap().unwrap();
            prop_assert_eq!(message.conversation, *conversation);
            match message.parent {
                Some(parent) => {
                    let parent = view.message(parent).unwrap().unwrap();
                    prop_assert_eq!(parent.conversation, *conversation);
                }
                None => {
                    let root = view.root_message(*conversation).unwrap().unwrap();
                    prop_assert_eq!(root.id, *id);
                }
            }
            if model.live.contains_key(id) {
                prop_assert_eq!(view.parent_of(*id).unwrap(), message.parent);
            }
        }
    }

    /// Gifting your own message fails whatever your balance
    #[test]
    fn prop_self_gift_rejected(amount in 0u64..1_000_000, funds in 0u64..1_000_000) {
        let world = world();
        let author = account(1);
        if funds > 0 {
            world.accounts.award(author.id, funds, Utc::now()).unwrap();
        }
        let root = world
            .content
            .create_conversation(&author, "Mine", &text(1), Utc::now())
            .unwrap();
        let result = world
            .gifts
            .gift(author.id, root.conversation.id, root.message.id, amount, Utc::now());
        prop_assert!(matches!(result, Err(Error::SelfGiftingNotPermitted)));
    }

    /// Reading balances twice without writes gives the same answer
    #[test]
    fn prop_balance_idempotent(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let world = world();
        let mut model = Model::default();
        for op in &ops {
            apply(&world, &mut model, op);
        }
        for u in 1..=USERS {
            let user = UserId::new(u);
            let first = world.accounts.balance(user).unwrap();
            let second = world.accounts.balance(user).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
