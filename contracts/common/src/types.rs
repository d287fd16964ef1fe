//! Core Types for POSUM Pools
//!
//! This module defines the data structures shared by the vault ledger, the
//! accrual engine, the lock schedule and the registry.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{locks, multipliers, scale};
use crate::errors::{PosumError, PosumResult};

/// Type alias for addresses (32-byte account hash)
pub type Address = [u8; 32];

/// Type alias for pool identifiers
pub type PoolId = [u8; 32];

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// The zero address, never a valid owner, treasury or user
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// First four bytes of an id as hex, for logs and messages
pub fn short_id(id: &[u8; 32]) -> String {
    id[..4].iter().map(|b| format!("{b:02x}")).collect()
}

// ============ Asset Types ============

/// Asset pooled by a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum AssetKind {
    /// Chain-native coin, moved by value rather than approval
    Native { decimals: u8 },
    /// Fungible token that must be approved before a deposit
    Token { token: Address, decimals: u8 },
}

impl AssetKind {
    /// Decimal places of the asset
    pub fn decimals(&self) -> u8 {
        match self {
            Self::Native { decimals } | Self::Token { decimals, .. } => *decimals,
        }
    }

    /// One whole unit in base units (10^decimals)
    pub fn scale(&self) -> u128 {
        10u128.pow(self.decimals() as u32)
    }

    /// True when deposits require an ERC20-style allowance
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::Token { .. })
    }
}

// ============ Share Classes ============

/// Share sub-pools with their own multiplier and withdrawal rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum ShareClass {
    /// The only class of a Degen pool
    Single = 0,
    /// Withdraw any time
    Flex = 1,
    /// Time-locked, higher multiplier
    Locked = 2,
}

/// Withdrawal constraint attached to a share class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LockPolicy {
    /// No lock
    Unlocked,
    /// Each deposit locks the position for `duration_seconds`
    Timed { duration_seconds: u64 },
    /// Deposits can never be withdrawn
    Permanent,
}

/// Per-class parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ShareClassConfig {
    /// Which class
    pub class: ShareClass,
    /// SUM weight in basis points (10000 = 1x)
    pub multiplier_bps: u32,
    /// Withdrawal rule
    pub lock: LockPolicy,
}

// ============ Pool Config ============

/// Pool flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Single asset, permanent lock, 2x SUM
    Degen,
    /// Flex and time-locked classes over a yield-bearing asset
    Positive,
}

/// Immutable pool parameters (treasury aside)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolConfig {
    /// Pool flavour
    pub kind: PoolKind,
    /// Pooled asset
    pub asset: AssetKind,
    /// Offered share classes
    pub classes: Vec<ShareClassConfig>,
    /// Fixed-point scale of both rates, normally `asset.scale()`
    pub scale: u128,
    /// Yield per share unit per second, at `scale`
    pub yield_rate_per_second_per_share: u128,
    /// SUM points per share unit per second, at `scale`
    pub points_rate_per_second: u128,
    /// Receiver/funder of the reward reserve (owner-settable)
    pub treasury: Address,
}

impl PoolConfig {
    /// Look up a class configuration
    pub fn class(&self, class: ShareClass) -> PosumResult<&ShareClassConfig> {
        self.classes
            .iter()
            .find(|c| c.class == class)
            .ok_or(PosumError::InvalidShareClass { class })
    }

    /// True when the pool offers the class
    pub fn has_class(&self, class: ShareClass) -> bool {
        self.classes.iter().any(|c| c.class == class)
    }

    /// Iterate offered classes in declaration order
    pub fn share_classes(&self) -> impl Iterator<Item = ShareClass> + '_ {
        self.classes.iter().map(|c| c.class)
    }

    /// Validate parameters before a pool is created
    pub fn validate(&self) -> PosumResult<()> {
        if self.classes.is_empty() {
            return Err(PosumError::InvalidPoolConfig {
                reason: "pool needs at least one share class",
            });
        }
        if self.asset.decimals() > scale::MAX_DECIMALS {
            return Err(PosumError::InvalidPoolConfig { reason: "asset decimals too large" });
        }
        if self.scale == 0 {
            return Err(PosumError::InvalidPoolConfig { reason: "accrual scale must be positive" });
        }
        if self.treasury == ZERO_ADDRESS {
            return Err(PosumError::InvalidAddress { reason: "treasury cannot be zero address" });
        }
        for (i, cfg) in self.classes.iter().enumerate() {
            if self.classes[..i].iter().any(|c| c.class == cfg.class) {
                return Err(PosumError::InvalidPoolConfig { reason: "share class listed twice" });
            }
            if cfg.multiplier_bps == 0 || cfg.multiplier_bps > multipliers::MAX_BPS {
                return Err(PosumError::InvalidPoolConfig { reason: "multiplier out of range" });
            }
            if let LockPolicy::Timed { duration_seconds } = cfg.lock {
                if duration_seconds == 0 || duration_seconds > locks::MAX_LOCK_SECONDS {
                    return Err(PosumError::InvalidPoolConfig {
                        reason: "lock duration out of range",
                    });
                }
            }
        }
        match self.kind {
            PoolKind::Degen => {
                let single = self.class(ShareClass::Single)?;
                if self.classes.len() != 1 || single.lock != LockPolicy::Permanent {
                    return Err(PosumError::InvalidPoolConfig {
                        reason: "degen pool has exactly one permanently locked class",
                    });
                }
            }
            PoolKind::Positive => {
                let flex = self.class(ShareClass::Flex)?;
                let locked = self.class(ShareClass::Locked)?;
                if self.classes.len() != 2
                    || flex.lock != LockPolicy::Unlocked
                    || !matches!(locked.lock, LockPolicy::Timed { .. })
                {
                    return Err(PosumError::InvalidPoolConfig {
                        reason: "positive pool has one flex and one timed locked class",
                    });
                }
            }
        }
        Ok(())
    }

    /// Deterministic pool identity.
    ///
    /// Hashes every parameter except the treasury, which may be re-pointed
    /// after creation without changing identity.
    pub fn pool_id(&self) -> PoolId {
        let mut hasher = Sha256::new();
        hasher.update(b"posum-pool-v1");
        hasher.update(borsh::to_vec(&self.kind).unwrap_or_default());
        hasher.update(borsh::to_vec(&self.asset).unwrap_or_default());
        hasher.update(borsh::to_vec(&self.classes).unwrap_or_default());
        hasher.update(self.scale.to_le_bytes());
        hasher.update(self.yield_rate_per_second_per_share.to_le_bytes());
        hasher.update(self.points_rate_per_second.to_le_bytes());
        let result = hasher.finalize();
        let mut id = [0u8; 32];
        id.copy_from_slice(&result);
        id
    }
}

// ============ Position View ============

/// Everything known about one (pool, user, class) position.
///
/// Assembled from the vault ledger, the accrual engine and the lock
/// schedule; not stored as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct UserPosition {
    /// Shares held in this class
    pub share_balance: u128,
    /// Time of the most recent deposit into this class
    pub deposit_timestamp: Timestamp,
    /// Unlock time (Locked class only, 0 when unlocked)
    pub unlock_timestamp: Timestamp,
    /// Time the checkpoints were last brought up to date
    pub last_settled_timestamp: Timestamp,
    /// Settled but unclaimed yield (asset units)
    pub accrued_reward_checkpoint: u128,
    /// Settled SUM points
    pub accrued_points_checkpoint: u128,
}
