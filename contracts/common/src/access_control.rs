//! Access Control Module
//!
//! Single-owner authorization for pool administration: creating pools,
//! re-pointing a treasury, funding rewards, attaching yield sources and
//! clearing halts. Deposits, withdrawals, claims and lock conversion are
//! permissionless.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PosumError, PosumResult};
use crate::types::{Address, Timestamp, ZERO_ADDRESS};

/// Operations restricted to the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Permission {
    /// Register a new pool
    CreatePool,
    /// Change a pool's treasury address
    SetTreasury,
    /// Move treasury funds into a reward reserve
    FundRewards,
    /// Attach an external yield source
    AttachYieldSource,
    /// Clear a consistency halt
    ResumePool,
    /// Hand ownership to another address
    TransferOwnership,
}

/// Ownership record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccessControlState {
    /// Current owner
    pub owner: Address,
    /// Time of the last ownership change
    pub last_update: Timestamp,
}

impl AccessControlState {
    /// Create access control state owned by `owner`
    pub fn new(owner: Address, now: Timestamp) -> PosumResult<Self> {
        if owner == ZERO_ADDRESS {
            return Err(PosumError::InvalidAddress { reason: "owner cannot be zero address" });
        }
        Ok(Self { owner, last_update: now })
    }

    /// Check if `caller` is the owner
    pub fn is_owner(&self, caller: &Address) -> bool {
        self.owner == *caller
    }
}

// ============================================================================
// Core Access Control Functions
// ============================================================================

/// Fail with `Unauthorized` unless `caller` may perform `permission`
pub fn require_permission(
    state: &AccessControlState,
    caller: &Address,
    _permission: Permission,
) -> PosumResult<()> {
    // Every permission currently maps to the single owner
    if !state.is_owner(caller) {
        return Err(PosumError::Unauthorized {
            expected: state.owner,
            actual: *caller,
        });
    }
    Ok(())
}

/// Hand ownership to `new_owner`, returning the previous owner
pub fn transfer_ownership(
    state: &mut AccessControlState,
    caller: &Address,
    new_owner: Address,
    now: Timestamp,
) -> PosumResult<Address> {
    require_permission(state, caller, Permission::TransferOwnership)?;
    if new_owner == ZERO_ADDRESS {
        return Err(PosumError::InvalidAddress { reason: "new owner cannot be zero address" });
    }
    let previous = state.owner;
    state.owner = new_owner;
    state.last_update = now;
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Address {
        [1u8; 32]
    }

    fn user() -> Address {
        [2u8; 32]
    }

    #[test]
    fn test_owner_has_permission() {
        let state = AccessControlState::new(admin(), 0).unwrap();
        assert!(require_permission(&state, &admin(), Permission::CreatePool).is_ok());
    }

    #[test]
    fn test_non_owner_unauthorized() {
        let state = AccessControlState::new(admin(), 0).unwrap();
        assert_eq!(
            require_permission(&state, &user(), Permission::SetTreasury),
            Err(PosumError::Unauthorized { expected: admin(), actual: user() })
        );
    }

    #[test]
    fn test_transfer_ownership() {
        let mut state = AccessControlState::new(admin(), 0).unwrap();
        let previous = transfer_ownership(&mut state, &admin(), user(), 50).unwrap();

        assert_eq!(previous, admin());
        assert!(state.is_owner(&user()));
        assert!(require_permission(&state, &admin(), Permission::ResumePool).is_err());
        assert_eq!(state.last_update, 50);
    }

    #[test]
    fn test_zero_owner_rejected() {
        assert!(AccessControlState::new(ZERO_ADDRESS, 0).is_err());
        let mut state = AccessControlState::new(admin(), 0).unwrap();
        assert!(matches!(
            transfer_ownership(&mut state, &admin(), ZERO_ADDRESS, 1),
            Err(PosumError::InvalidAddress { .. })
        ));
    }
}
