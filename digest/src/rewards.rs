//! Prize fund split
//!
//! Each eligible author receives the fraction of the fund matching their
//! fraction of the eligible yield, rounded up to the cent. Rounding up means
//! the paid total may exceed the fund by less than a cent per author.
//! When no eligible author earned anything the fund is not claimed and
//! rolls over to the next digest.

use crate::{yields::AuthorYield, Error, Result};
use convey_ledger::{Coins, UserId};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One author's line in the reward table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    /// Author
    pub user: UserId,
    /// Yield earned during the window
    pub yield_amount: Coins,
    /// Whether the author may receive a share
    pub eligible: bool,
    /// Share of the fund, in currency units (zero when ineligible)
    pub share: Decimal,
}

/// Outcome of splitting a prize fund
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTable {
    /// Fund offered
    pub fund: Decimal,
    /// Rewards in ranking order
    pub rewards: Vec<Reward>,
    /// Sum of all shares
    pub total: Decimal,
    /// Nobody eligible earned yield, so the fund carries over
    pub rolled_over: bool,
}

impl RewardTable {
    /// Split `fund` across `ranked` authors, skipping `ineligible` users
    pub fn split(
        ranked: &[AuthorYield],
        fund: Decimal,
        ineligible: &BTreeSet<UserId>,
    ) -> Result<Self> {
        if fund.is_sign_negative() {
            return Err(Error::Reward(format!("negative fund {}", fund)));
        }

        let eligible_yield: Decimal = ranked
            .iter()
            .filter(|a| !ineligible.contains(&a.user))
            .map(|a| Decimal::from(a.amount))
            .sum();
        let rolled_over = eligible_yield.is_zero();

        let mut rewards = Vec::with_capacity(ranked.len());
        let mut total = Decimal::ZERO;
        for author in ranked {
            let eligible = !ineligible.contains(&author.user);
            let mut share = if eligible && !rolled_over {
                Decimal::from(author.amount)
                    .checked_mul(fund)
                    .and_then(|n| n.checked_div(eligible_yield))
                    .ok_or_else(|| {
                        Error::Reward(format!("share of user {} overflows", author.user))
                    })?
                    .round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
            } else {
                Decimal::ZERO
            };
            share.rescale(2);
            total += share;
            rewards.push(Reward {
                user: author.user,
                yield_amount: author.amount,
                eligible,
                share,
            });
        }

        if rolled_over {
            tracing::info!(fund = %fund, "Prize fund not claimed, rolling over");
        }

        Ok(Self {
            fund,
            rewards,
            total,
            rolled_over,
        })
    }

    /// Share paid to a user, if they are in the table
    pub fn share_of(&self, user: UserId) -> Option<Decimal> {
        self.rewards.iter().find(|r| r.user == user).map(|r| r.share)
    }

    /// Serialize the table as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
