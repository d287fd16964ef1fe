//! Share Vault Module
//!
//! Per-pool ledger of pooled assets and the shares issued against them.
//! Shares are proportional claims: a deposit into an empty vault mints 1:1,
//! later deposits mint `amount * total_shares / total_assets`, and a
//! withdrawal pays `shares * total_assets / total_shares`, always rounding
//! down in the pool's favour.
//!
//! ## Plan / Apply
//!
//! Every mutation is split in two. `plan_*` is pure, performs all checks and
//! returns a plan holding the post-state; `apply_*` commits a plan and cannot
//! fail. The caller can therefore run fallible side effects (asset custody)
//! between the two and drop the plan if they fail. A plan is only valid
//! against the exact vault state it was computed from.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PosumError, PosumResult};
use crate::math;
use crate::types::{Address, ShareClass, Timestamp};

// ============================================================================
// Types
// ============================================================================

/// One user's holding in one share class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultPosition {
    /// Shares held
    pub share_balance: u128,
    /// Time of the most recent deposit into this class
    pub deposit_timestamp: Timestamp,
}

/// Checked deposit, ready to commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPlan {
    /// Depositor
    pub user: Address,
    /// Receiving class
    pub class: ShareClass,
    /// Assets entering the vault
    pub assets_in: u128,
    /// Shares issued
    pub shares_minted: u128,
    /// Deposit time
    pub timestamp: Timestamp,
    total_assets_after: u128,
    total_shares_after: u128,
    class_shares_after: u128,
    balance_after: u128,
}

impl DepositPlan {
    /// User's share balance in the class once committed
    pub fn balance_after(&self) -> u128 {
        self.balance_after
    }
}

/// Checked withdrawal, ready to commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawPlan {
    /// Withdrawing user
    pub user: Address,
    /// Source class
    pub class: ShareClass,
    /// Shares burned
    pub shares_burned: u128,
    /// Assets leaving the vault
    pub assets_out: u128,
    total_assets_after: u128,
    total_shares_after: u128,
    class_shares_after: u128,
    balance_after: u128,
}

impl WithdrawPlan {
    /// User's share balance in the class once committed
    pub fn balance_after(&self) -> u128 {
        self.balance_after
    }
}

/// Checked class-to-class share move (no asset movement)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertPlan {
    /// Owner of the shares
    pub user: Address,
    /// Class the shares leave
    pub from: ShareClass,
    /// Class the shares join
    pub to: ShareClass,
    /// Shares moved
    pub shares: u128,
    /// Conversion time
    pub timestamp: Timestamp,
    from_class_after: u128,
    to_class_after: u128,
    to_balance_after: u128,
}

// ============================================================================
// Vault
// ============================================================================

/// Share ledger for a single pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ShareVault {
    total_assets: u128,
    total_shares: u128,
    class_shares: BTreeMap<ShareClass, u128>,
    positions: BTreeMap<(Address, ShareClass), VaultPosition>,
}

impl ShareVault {
    /// Create an empty vault offering the given classes
    pub fn new(classes: impl IntoIterator<Item = ShareClass>) -> Self {
        Self {
            total_assets: 0,
            total_shares: 0,
            class_shares: classes.into_iter().map(|c| (c, 0)).collect(),
            positions: BTreeMap::new(),
        }
    }

    /// Assets under management
    pub fn total_assets(&self) -> u128 {
        self.total_assets
    }

    /// Shares outstanding across all classes
    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    /// Shares outstanding in one class (0 when not offered)
    pub fn class_shares(&self, class: ShareClass) -> u128 {
        self.class_shares.get(&class).copied().unwrap_or(0)
    }

    /// True when the vault offers the class
    pub fn offers(&self, class: ShareClass) -> bool {
        self.class_shares.contains_key(&class)
    }

    /// Position of `user` in `class`, if one was ever opened
    pub fn position(&self, user: &Address, class: ShareClass) -> Option<&VaultPosition> {
        self.positions.get(&(*user, class))
    }

    /// Share balance of `user` in `class`
    pub fn share_balance(&self, user: &Address, class: ShareClass) -> u128 {
        self.position(user, class).map(|p| p.share_balance).unwrap_or(0)
    }

    /// All positions ever opened, zero balances included
    pub fn positions(&self) -> impl Iterator<Item = (&(Address, ShareClass), &VaultPosition)> {
        self.positions.iter()
    }

    /// Asset value of `shares` at the current conversion rate
    pub fn preview_withdraw(&self, shares: u128) -> PosumResult<u128> {
        math::assets_for_shares(shares, self.total_assets, self.total_shares)
    }

    /// Shares `amount` would mint right now
    pub fn preview_deposit(&self, amount: u128) -> PosumResult<u128> {
        math::shares_for_assets(amount, self.total_assets, self.total_shares)
    }

    /// Re-value the pooled assets at `value`, e.g. an external position's
    /// redeemable value. Share balances are untouched, so the change is
    /// spread pro rata over every holder; with no shares outstanding the
    /// whole value is dust for the next depositor.
    pub fn sync_total_assets(&mut self, value: u128) {
        self.total_assets = value;
    }

    fn require_class(&self, class: ShareClass) -> PosumResult<u128> {
        self.class_shares
            .get(&class)
            .copied()
            .ok_or(PosumError::InvalidShareClass { class })
    }

    /// Plan a deposit of `amount` assets into `class`
    pub fn plan_deposit(
        &self,
        user: Address,
        amount: u128,
        class: ShareClass,
        now: Timestamp,
    ) -> PosumResult<DepositPlan> {
        if amount == 0 {
            return Err(PosumError::ZeroAmount);
        }
        let class_total = self.require_class(class)?;

        // Overflow here is caused by the amount, not by the ledger
        let too_large = |err: PosumError| match err {
            PosumError::ArithmeticOverflow => PosumError::DepositTooLarge { amount },
            other => other,
        };

        // Residual dust with no shares outstanding is absorbed by this depositor
        let shares = self.preview_deposit(amount).map_err(too_large)?;
        if shares == 0 {
            return Err(PosumError::ZeroSharesMinted { amount });
        }

        Ok(DepositPlan {
            user,
            class,
            assets_in: amount,
            shares_minted: shares,
            timestamp: now,
            total_assets_after: math::checked_add(self.total_assets, amount).map_err(too_large)?,
            total_shares_after: math::checked_add(self.total_shares, shares).map_err(too_large)?,
            class_shares_after: math::checked_add(class_total, shares).map_err(too_large)?,
            balance_after: math::checked_add(self.share_balance(&user, class), shares)
                .map_err(too_large)?,
        })
    }

    /// Commit a deposit plan
    pub fn apply_deposit(&mut self, plan: &DepositPlan) {
        self.total_assets = plan.total_assets_after;
        self.total_shares = plan.total_shares_after;
        self.class_shares.insert(plan.class, plan.class_shares_after);
        let position = self.positions.entry((plan.user, plan.class)).or_default();
        position.share_balance = plan.balance_after;
        position.deposit_timestamp = plan.timestamp;
    }

    /// Plan burning `shares` of `class` for their asset value.
    ///
    /// Lock rules are not checked here.
    pub fn plan_withdraw(
        &self,
        user: Address,
        shares: u128,
        class: ShareClass,
    ) -> PosumResult<WithdrawPlan> {
        if shares == 0 {
            return Err(PosumError::ZeroAmount);
        }
        let class_total = self.require_class(class)?;
        let balance = self.share_balance(&user, class);
        if shares > balance {
            return Err(PosumError::InsufficientShares {
                available: balance,
                requested: shares,
            });
        }

        let assets = self.preview_withdraw(shares)?;

        Ok(WithdrawPlan {
            user,
            class,
            shares_burned: shares,
            assets_out: assets,
            total_assets_after: math::checked_sub(self.total_assets, assets)?,
            total_shares_after: math::checked_sub(self.total_shares, shares)?,
            class_shares_after: math::checked_sub(class_total, shares)?,
            balance_after: balance - shares,
        })
    }

    /// Commit a withdrawal plan
    pub fn apply_withdraw(&mut self, plan: &WithdrawPlan) {
        self.total_assets = plan.total_assets_after;
        self.total_shares = plan.total_shares_after;
        self.class_shares.insert(plan.class, plan.class_shares_after);
        if let Some(position) = self.positions.get_mut(&(plan.user, plan.class)) {
            position.share_balance = plan.balance_after;
        }
    }

    /// Plan moving the user's whole `from` balance into `to`.
    ///
    /// Returns `None` when there is nothing to move.
    pub fn plan_convert(
        &self,
        user: Address,
        from: ShareClass,
        to: ShareClass,
        now: Timestamp,
    ) -> PosumResult<Option<ConvertPlan>> {
        let from_total = self.require_class(from)?;
        let to_total = self.require_class(to)?;
        if from == to {
            return Err(PosumError::InvalidShareClass { class: to });
        }

        let shares = self.share_balance(&user, from);
        if shares == 0 {
            return Ok(None);
        }

        Ok(Some(ConvertPlan {
            user,
            from,
            to,
            shares,
            timestamp: now,
            from_class_after: math::checked_sub(from_total, shares)?,
            to_class_after: math::checked_add(to_total, shares)?,
            to_balance_after: math::checked_add(self.share_balance(&user, to), shares)?,
        }))
    }

    /// Commit a conversion plan. Totals and asset backing are unchanged.
    pub fn apply_convert(&mut self, plan: &ConvertPlan) {
        self.class_shares.insert(plan.from, plan.from_class_after);
        self.class_shares.insert(plan.to, plan.to_class_after);
        if let Some(position) = self.positions.get_mut(&(plan.user, plan.from)) {
            position.share_balance = 0;
        }
        let target = self.positions.entry((plan.user, plan.to)).or_default();
        target.share_balance = plan.to_balance_after;
        target.deposit_timestamp = target.deposit_timestamp.max(plan.timestamp);
    }
}
