//! Lock Schedule
//!
//! Unlock times of Locked-class positions. A new locked deposit starts a
//! fresh lock when none is active and otherwise pushes the existing unlock
//! time out to `max(existing, now + duration)`. Locks are never shortened.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PosumError, PosumResult};
use crate::types::{Address, Timestamp};

/// Per-pool map of user unlock times
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LockSchedule {
    unlocks: BTreeMap<Address, Timestamp>,
}

impl LockSchedule {
    /// Create an empty schedule
    pub fn new() -> Self {
        Self::default()
    }

    /// Unlock time of `user`, if locked
    pub fn unlock_timestamp(&self, user: &Address) -> Option<Timestamp> {
        self.unlocks.get(user).copied()
    }

    /// Unlock time a new locked deposit would produce, without recording it
    pub fn projected_unlock(
        &self,
        user: &Address,
        now: Timestamp,
        duration_seconds: u64,
    ) -> PosumResult<Timestamp> {
        let candidate = now
            .checked_add(duration_seconds)
            .ok_or(PosumError::ArithmeticOverflow)?;
        Ok(match self.unlock_timestamp(user) {
            Some(existing) if existing > now => existing.max(candidate),
            _ => candidate,
        })
    }

    /// Record a locked deposit and return the resulting unlock time
    pub fn register_or_extend(
        &mut self,
        user: Address,
        now: Timestamp,
        duration_seconds: u64,
    ) -> PosumResult<Timestamp> {
        let unlock = self.projected_unlock(&user, now, duration_seconds)?;
        self.set_unlock(user, unlock);
        Ok(unlock)
    }

    /// Store a previously projected unlock time. Never moves a lock earlier.
    pub fn set_unlock(&mut self, user: Address, unlock: Timestamp) {
        let entry = self.unlocks.entry(user).or_insert(unlock);
        *entry = (*entry).max(unlock);
    }

    /// True when `user` has no lock or it has run out (`now >= unlock`)
    pub fn is_expired(&self, user: &Address, now: Timestamp) -> bool {
        self.unlock_timestamp(user).map_or(true, |unlock| now >= unlock)
    }

    /// Drop the lock of `user` (Locked balance emptied or converted)
    pub fn release(&mut self, user: &Address) -> Option<Timestamp> {
        self.unlocks.remove(user)
    }

    /// Number of users with a recorded lock
    pub fn len(&self) -> usize {
        self.unlocks.len()
    }

    /// True when no locks are recorded
    pub fn is_empty(&self) -> bool {
        self.unlocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: u64 = 604_800;

    fn user() -> Address {
        [5u8; 32]
    }

    #[test]
    fn test_no_lock_is_expired() {
        let schedule = LockSchedule::new();
        assert!(schedule.is_expired(&user(), 0));
        assert_eq!(schedule.unlock_timestamp(&user()), None);
    }

    #[test]
    fn test_register_and_boundary() {
        let mut schedule = LockSchedule::new();
        let unlock = schedule.register_or_extend(user(), 1_000, WEEK).unwrap();

        assert_eq!(unlock, 1_000 + WEEK);
        assert!(!schedule.is_expired(&user(), unlock - 1));
        assert!(schedule.is_expired(&user(), unlock));
    }

    #[test]
    fn test_extension_never_shortens() {
        let mut schedule = LockSchedule::new();
        schedule.register_or_extend(user(), 0, WEEK).unwrap();

        // Shorter lock mid-way keeps the later unlock
        let unlock = schedule.register_or_extend(user(), 10, 60).unwrap();
        assert_eq!(unlock, WEEK);

        // Longer lock pushes it out
        let unlock = schedule.register_or_extend(user(), 100, WEEK).unwrap();
        assert_eq!(unlock, 100 + WEEK);
    }

    #[test]
    fn test_expired_lock_restarts() {
        let mut schedule = LockSchedule::new();
        schedule.register_or_extend(user(), 0, 60).unwrap();
        let unlock = schedule.register_or_extend(user(), 1_000, 60).unwrap();
        assert_eq!(unlock, 1_060);
    }

    #[test]
    fn test_overflow() {
        let schedule = LockSchedule::new();
        assert_eq!(
            schedule.projected_unlock(&user(), u64::MAX, 1),
            Err(PosumError::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_release() {
        let mut schedule = LockSchedule::new();
        schedule.register_or_extend(user(), 0, 60).unwrap();
        assert_eq!(schedule.release(&user()), Some(60));
        assert!(schedule.is_empty());
    }
}
