//! Typed read and write interface
//!
//! Every read the presentation layer makes is a [`PoolQuery`] variant and
//! every write a [`PoolAction`]; writes answer with a [`Receipt`].

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use posum_common::{Address, PoolEvent, PoolId, ShareClass, Timestamp};

/// Read operations, dispatched by field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolQuery {
    /// Assets `shares` would redeem for now
    PreviewWithdraw { shares: u128 },
    /// SUM points of `user` at the query time
    CurrentSumPoints { user: Address },
    /// Assets under management (or the external position's value)
    ContractValue,
    /// Share balance of `user` in `class`
    UserShares { user: Address, class: ShareClass },
    /// Unlock time of `user` (0 when unlocked)
    UserLockEndDate { user: Address },
    /// Unclaimed yield of `user` at the query time
    ClaimableYield { user: Address },
    /// Shares outstanding
    TotalShares,
    /// Treasury-funded balance claims are paid from
    RewardReserve,
}

/// Write operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolAction {
    /// Deposit `amount` assets into `class`
    Deposit { amount: u128, class: ShareClass },
    /// Redeem `shares` of `class`
    Withdraw { shares: u128, class: ShareClass },
    /// Pay out all settled yield
    Claim,
    /// Move expired Locked shares to Flex
    ConvertExpiredLock,
}

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum ActionOutcome {
    /// Assets in, shares issued
    Deposited { assets: u128, shares: u128 },
    /// Shares burned, assets out
    Withdrawn { shares: u128, assets: u128 },
    /// Yield paid
    Claimed { amount: u128 },
    /// Shares moved Locked to Flex (0 when nothing was locked)
    Converted { shares: u128 },
}

impl ActionOutcome {
    /// The headline amount: shares issued, assets out, yield paid or shares moved
    pub fn amount(&self) -> u128 {
        match self {
            Self::Deposited { shares, .. } => *shares,
            Self::Withdrawn { assets, .. } => *assets,
            Self::Claimed { amount } => *amount,
            Self::Converted { shares } => *shares,
        }
    }
}

/// Result of a committed write, with the user's new balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Receipt {
    /// Pool written to
    pub pool_id: PoolId,
    /// Acting user
    pub user: Address,
    /// Commit time
    pub timestamp: Timestamp,
    /// What happened
    pub outcome: ActionOutcome,
    /// Share balance per offered class after the write
    pub balances: Vec<(ShareClass, u128)>,
    /// Unlock time after the write (0 unlocked, `u64::MAX` permanent)
    pub lock_end: Timestamp,
    /// Unclaimed yield after the write
    pub claimable_yield: u128,
    /// SUM points after the write
    pub sum_points: u128,
    /// Events the write emitted
    pub events: Vec<PoolEvent>,
}

impl Receipt {
    /// Balance in `class` after the write
    pub fn balance(&self, class: ShareClass) -> u128 {
        self.balances
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, b)| *b)
            .unwrap_or(0)
    }
}
