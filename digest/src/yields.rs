//! Yield earned per author within a window

use crate::{window::DigestWindow, Result};
use convey_ledger::{Coins, LedgerView, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coins an author earned from replies during a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorYield {
    /// Author credited
    pub user: UserId,
    /// Sum of yields credited to the author's messages
    pub amount: Coins,
}

/// Sum the yields created inside `window` per credited author.
///
/// Deleted conversations and yields from deleted messages do not count.
/// Authors are ranked by descending yield, ties by ascending user id; authors
/// who earned nothing are left out.
pub fn author_yields<V: LedgerView>(view: &V, window: &DigestWindow) -> Result<Vec<AuthorYield>> {
    let mut totals: BTreeMap<UserId, Coins> = BTreeMap::new();

    for conversation in view.conversations() {
        let conversation = conversation?;
        if view.is_deleted(conversation.id.get())? {
            continue;
        }
        for message in view.messages_in(conversation.id) {
            let message = message?;
            if view.is_deleted(message.id.get())? {
                continue;
            }
            for y in view.yields_from(message.id) {
                let y = y?;
                if y.amount == 0 || !window.contains(y.created) {
                    continue;
                }
                let parent = view
                    .message(y.parent)?
                    .ok_or(convey_ledger::Error::MessageNotFound(y.parent))?;
                let total = totals.entry(parent.author).or_insert(0);
                *total = total
                    .checked_add(y.amount)
                    .ok_or(convey_ledger::Error::AmountOverflow)?;
            }
        }
    }

    let mut ranked: Vec<AuthorYield> = totals
        .into_iter()
        .map(|(user, amount)| AuthorYield { user, amount })
        .collect();
    // BTreeMap order already breaks ties by user id; the sort is stable
    ranked.sort_by(|a, b| b.amount.cmp(&a.amount));
    Ok(ranked)
}
