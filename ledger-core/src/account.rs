//! Account Ledger: balances, purchases and awards
//!
//! A balance is never cached. It is recomputed from the full event history on
//! every query:
//!
//! ```text
//! balance = purchases + yields on own live messages + awards
//!         + gifts received on own live messages
//!         - charges on own live messages - gifts sent
//! ```

use crate::{
    config::LedgerConfig,
    error::{Error, Result},
    sequence::IdSequence,
    store::{LedgerStore, LedgerView, WriteSet},
    types::{Award, AwardId, Coins, Purchase, PurchaseId, Record, StripeCheckout, UserId},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Balance of a user within one snapshot
pub fn balance_of<V: LedgerView>(view: &V, user: UserId) -> Result<i64> {
    let credits = i128::from(view.total_purchases(user)?)
        + i128::from(view.total_yields(user)?)
        + i128::from(view.total_awards(user)?)
        + i128::from(view.total_gifts_received(user)?);
    let debits = i128::from(view.total_charges(user)?) + i128::from(view.total_gifts_sent(user)?);

    i64::try_from(credits - debits).map_err(|_| Error::AmountOverflow)
}

/// Fail unless `user` can cover `required` coins
pub(crate) fn ensure_affordable<V: LedgerView>(view: &V, user: UserId, required: Coins) -> Result<()> {
    let balance = balance_of(view, user)?;
    if i128::from(balance) < i128::from(required) {
        return Err(Error::InsufficientBalance { balance, required });
    }
    Ok(())
}

/// Account Ledger
pub struct AccountLedger<S> {
    store: Arc<S>,
    sequence: Arc<dyn IdSequence>,
    config: LedgerConfig,
}

impl<S> Clone for AccountLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sequence: self.sequence.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> AccountLedger<S> {
    /// Create account ledger over a shared store
    pub fn new(store: Arc<S>, sequence: Arc<dyn IdSequence>, config: LedgerConfig) -> Self {
        Self {
            store,
            sequence,
            config,
        }
    }

    /// Current spendable balance (may be negative)
    pub fn balance(&self, user: UserId) -> Result<i64> {
        let view = self.store.view()?;
        balance_of(&view, user)
    }

    /// Record a completed checkout
    ///
    /// With purchase deduplication enabled a non-empty session ID is
    /// accepted once: an identical replay returns the stored purchase, a
    /// conflicting one fails with [`Error::DuplicatePurchase`].
    pub fn record_purchase(
        &self,
        user: UserId,
        checkout: StripeCheckout,
        bundle_size: Coins,
        now: DateTime<Utc>,
    ) -> Result<Purchase> {
        let dedup = self.config.dedup_purchases && !checkout.session_id.is_empty();
        let (purchase, replayed) = self.store.commit_with(|view| {
            if dedup {
                let existing = view
                    .purchases_for_session(&checkout.session_id)
                    .next()
                    .transpose()?;
                if let Some(existing) = existing {
                    if existing.user == user
                        && existing.checkout == checkout
                        && existing.bundle_size == bundle_size
                    {
                        return Ok((WriteSet::new(), (existing, true)));
                    }
                    return Err(Error::DuplicatePurchase(checkout.session_id.clone()));
                }
            }

            let purchase = Purchase {
                id: PurchaseId::new(self.sequence.next_id()),
                user,
                checkout: checkout.clone(),
                bundle_size,
                created: now,
            };
            let mut writes = WriteSet::new();
            writes.push(Record::Purchase(purchase.clone()));
            Ok((writes, (purchase, false)))
        })?;

        if replayed {
            tracing::warn!(
                purchase_id = %purchase.id,
                session_id = %purchase.checkout.session_id,
                "Purchase replayed"
            );
            return Ok(purchase);
        }

        tracing::info!(
            purchase_id = %purchase.id,
            user_id = %user,
            bundle_size,
            "Created Purchase"
        );

        Ok(purchase)
    }

    /// Record an administrative credit
    pub fn award(&self, user: UserId, amount: Coins, now: DateTime<Utc>) -> Result<Award> {
        if amount == 0 {
            return Err(Error::InvalidAmount("award must be positive".to_string()));
        }

        let award = Award {
            id: AwardId::new(self.sequence.next_id()),
            user,
            amount,
            created: now,
        };

        let mut writes = WriteSet::new();
        writes.push(Record::Award(award.clone()));
        self.store.commit(writes)?;

        tracing::info!(award_id = %award.id, user_id = %user, amount, "Created Award");

        Ok(award)
    }

    /// Purchase by ID
    pub fn purchase(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        self.store.view()?.purchase(id)
    }

    /// Purchases of a user, oldest first
    pub fn purchases(&self, user: UserId) -> Result<Vec<Purchase>> {
        self.store.view()?.purchases_by(user).collect()
    }

    /// Awards of a user, oldest first
    pub fn awards(&self, user: UserId) -> Result<Vec<Award>> {
        self.store.view()?.awards_by(user).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sequence::AtomicSequence, store::MemoryStore};

    fn ledger(config: LedgerConfig) -> AccountLedger<MemoryStore> {
        AccountLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(AtomicSequence::default()),
            config,
        )
    }

    fn checkout(session_id: &str) -> StripeCheckout {
        StripeCheckout {
            session_id: session_id.to_string(),
            customer_id: "cus_1".to_string(),
            payment_intent_id: "pi_1".to_string(),
            currency: "usd".to_string(),
            amount: 500,
        }
    }

    #[test]
    fn test_empty_balance() {
        let accounts = ledger(LedgerConfig::default());
        assert_eq!(accounts.balance(UserId::new(1)).unwrap(), 0);
    }

    #[test]
    fn test_purchase_and_award_credit() {
        let accounts = ledger(LedgerConfig::default());
        let user = UserId::new(1);
        accounts
            .record_purchase(user, checkout("cs_1"), 100, Utc::now())
            .unwrap();
        accounts.award(user, 25, Utc::now()).unwrap();
        assert_eq!(accounts.balance(user).unwrap(), 125);
        assert_eq!(accounts.purchases(user).unwrap().len(), 1);
        assert_eq!(accounts.awards(user).unwrap()[0].amount, 25);
    }

    #[test]
    fn test_purchase_replay_is_idempotent() {
        let accounts = ledger(LedgerConfig::default());
        let user = UserId::new(1);
        let first = accounts
            .record_purchase(user, checkout("cs_1"), 100, Utc::now())
            .unwrap();
        let replay = accounts
            .record_purchase(user, checkout("cs_1"), 100, Utc::now())
            .unwrap();
        assert_eq!(first, replay);
        assert_eq!(accounts.balance(user).unwrap(), 100);

        assert!(matches!(
            accounts.record_purchase(user, checkout("cs_1"), 200, Utc::now()),
            Err(Error::DuplicatePurchase(_))
        ));
    }

    #[test]
    fn test_purchases_without_session_are_not_deduplicated() {
        let accounts = ledger(LedgerConfig::default());
        let user = UserId::new(1);
        for _ in 0..2 {
            accounts
                .record_purchase(user, StripeCheckout::default(), 10, Utc::now())
                .unwrap();
        }
        assert_eq!(accounts.balance(user).unwrap(), 20);
    }

    #[test]
    fn test_dedup_disabled_records_every_delivery() {
        let accounts = ledger(LedgerConfig {
            dedup_purchases: false,
            ..LedgerConfig::default()
        });
        let user = UserId::new(1);
        for _ in 0..2 {
            accounts
                .record_purchase(user, checkout("cs_1"), 10, Utc::now())
                .unwrap();
        }
        assert_eq!(accounts.balance(user).unwrap(), 20);
    }

    #[test]
    fn test_zero_award_rejected() {
        let accounts = ledger(LedgerConfig::default());
        assert!(matches!(
            accounts.award(UserId::new(1), 0, Utc::now()),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_concurrent_replays_record_one_purchase() {
        let accounts = ledger(LedgerConfig::default());
        let user = UserId::new(1);

        let results: Vec<_> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let accounts = accounts.clone();
                    scope.spawn(move || {
                        accounts.record_purchase(user, checkout("cs_1"), 100, Utc::now())
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let first = results[0].as_ref().unwrap();
        assert!(results.iter().all(|r| r.as_ref().unwrap() == first));
        assert_eq!(accounts.purchases(user).unwrap().len(), 1);
        assert_eq!(accounts.balance(user).unwrap(), 100);
    }
}
