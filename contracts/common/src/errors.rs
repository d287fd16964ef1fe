//! Error Types for POSUM Pools
//!
//! Every failure is a typed variant so the presentation layer can tell
//! "ask the user to fix the input" apart from "something is structurally
//! wrong". Variants are grouped into four categories, see [`ErrorCategory`].

use thiserror::Error;

use crate::types::{short_id, PoolId, ShareClass};

/// Result type alias for POSUM operations
pub type PosumResult<T> = Result<T, PosumError>;

/// Broad classes of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input, rejected before any state change
    Validation,
    /// Caller lacks the right or the token approval
    Authorization,
    /// Legitimate precondition failure (lock active, nothing to claim, ...)
    State,
    /// Broken invariant; halts the affected pool
    Consistency,
}

/// Main error enum for all POSUM accounting errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PosumError {
    // ============ Validation Errors ============
    /// Zero amount not allowed
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Pool not found with given ID
    #[error("unknown pool {}", short_id(.pool_id))]
    UnknownPool { pool_id: PoolId },

    /// Share class not offered by this pool (or not valid for the operation)
    #[error("share class {class:?} is not valid here")]
    InvalidShareClass { class: ShareClass },

    /// Deposit too small to mint a single share at the current rate
    #[error("deposit of {amount} would mint zero shares")]
    ZeroSharesMinted { amount: u128 },

    /// Caller-supplied time is earlier than the last settlement
    #[error("timestamp {now} is earlier than last settlement at {last}")]
    StaleTimestamp { now: u64, last: u64 },

    /// Pool parameters rejected at creation
    #[error("invalid pool config: {reason}")]
    InvalidPoolConfig { reason: &'static str },

    /// Invalid address (e.g., zero address)
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: &'static str },

    /// Deposit would push the pool's assets or shares past `u128::MAX`
    #[error("deposit of {amount} exceeds pool capacity")]
    DepositTooLarge { amount: u128 },

    // ============ Authorization Errors ============
    /// Caller is not authorized for this operation
    #[error("unauthorized caller")]
    Unauthorized { expected: [u8; 32], actual: [u8; 32] },

    /// Token approval does not cover the deposit
    #[error("allowance {allowance} below requested {requested}")]
    InsufficientAllowance { allowance: u128, requested: u128 },

    // ============ State Errors ============
    /// Wallet does not hold enough of the asset
    #[error("balance {available} below requested {requested}")]
    InsufficientBalance { available: u128, requested: u128 },

    /// Locked shares cannot leave before the unlock time
    #[error("lock active until {unlock_timestamp} (now {now})")]
    LockNotExpired { unlock_timestamp: u64, now: u64 },

    /// Withdrawal exceeds the user's share balance
    #[error("share balance {available} below requested {requested}")]
    InsufficientShares { available: u128, requested: u128 },

    /// No rewards to claim
    #[error("nothing to claim")]
    NothingToClaim,

    /// Reward reserve cannot pay the claim yet
    #[error("reward reserve {available} below claim {requested}")]
    RewardsUnfunded { available: u128, requested: u128 },

    /// Pool with the same identity already exists
    #[error("pool {} already exists", short_id(.pool_id))]
    DuplicatePool { pool_id: PoolId },

    /// Pool refuses writes after a consistency failure
    #[error("pool {} is halted", short_id(.pool_id))]
    PoolHalted { pool_id: PoolId },

    /// Nested write into a pool that is mid-operation
    #[error("re-entrant call into pool {}", short_id(.pool_id))]
    Reentrancy { pool_id: PoolId },

    /// Custody collaborator refused the transfer
    #[error("asset transfer failed: {reason}")]
    TransferFailed { reason: &'static str },

    // ============ Consistency Errors ============
    /// Custody cannot cover an amount the ledger says it owes
    #[error("liquidity {available} below required {required}")]
    InsufficientLiquidity { available: u128, required: u128 },

    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Internal bookkeeping disagrees with itself
    #[error("invariant violated: {reason}")]
    InvariantViolated { reason: &'static str },
}

impl PosumError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "E001_ZERO_AMOUNT",
            Self::UnknownPool { .. } => "E002_UNKNOWN_POOL",
            Self::InvalidShareClass { .. } => "E003_INVALID_CLASS",
            Self::ZeroSharesMinted { .. } => "E004_ZERO_SHARES",
            Self::StaleTimestamp { .. } => "E005_STALE_TIMESTAMP",
            Self::InvalidPoolConfig { .. } => "E006_INVALID_CONFIG",
            Self::InvalidAddress { .. } => "E007_INVALID_ADDRESS",
            Self::DepositTooLarge { .. } => "E008_DEPOSIT_TOO_LARGE",
            Self::Unauthorized { .. } => "E020_UNAUTHORIZED",
            Self::InsufficientAllowance { .. } => "E021_INSUFFICIENT_ALLOWANCE",
            Self::InsufficientBalance { .. } => "E030_INSUFFICIENT_BALANCE",
            Self::LockNotExpired { .. } => "E031_LOCK_NOT_EXPIRED",
            Self::InsufficientShares { .. } => "E032_INSUFFICIENT_SHARES",
            Self::NothingToClaim => "E033_NOTHING_TO_CLAIM",
            Self::RewardsUnfunded { .. } => "E034_REWARDS_UNFUNDED",
            Self::DuplicatePool { .. } => "E035_DUPLICATE_POOL",
            Self::PoolHalted { .. } => "E036_POOL_HALTED",
            Self::Reentrancy { .. } => "E037_REENTRANCY",
            Self::TransferFailed { .. } => "E038_TRANSFER_FAILED",
            Self::InsufficientLiquidity { .. } => "E080_INSUFFICIENT_LIQUIDITY",
            Self::ArithmeticOverflow => "E081_OVERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::InvariantViolated { .. } => "E083_INVARIANT",
        }
    }

    /// Category used by callers to decide how to react
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ZeroAmount
            | Self::UnknownPool { .. }
            | Self::InvalidShareClass { .. }
            | Self::ZeroSharesMinted { .. }
            | Self::StaleTimestamp { .. }
            | Self::InvalidPoolConfig { .. }
            | Self::InvalidAddress { .. }
            | Self::DepositTooLarge { .. } => ErrorCategory::Validation,
            Self::Unauthorized { .. } | Self::InsufficientAllowance { .. } => {
                ErrorCategory::Authorization
            }
            Self::InsufficientBalance { .. }
            | Self::LockNotExpired { .. }
            | Self::InsufficientShares { .. }
            | Self::NothingToClaim
            | Self::RewardsUnfunded { .. }
            | Self::DuplicatePool { .. }
            | Self::PoolHalted { .. }
            | Self::Reentrancy { .. }
            | Self::TransferFailed { .. } => ErrorCategory::State,
            Self::InsufficientLiquidity { .. }
            | Self::ArithmeticOverflow
            | Self::DivisionByZero
            | Self::InvariantViolated { .. } => ErrorCategory::Consistency,
        }
    }

    /// Returns true if this error is recoverable (caller can fix it)
    pub fn is_recoverable(&self) -> bool {
        self.category() != ErrorCategory::Consistency
    }

    /// Returns true if the error must halt further mutation of the pool
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}
