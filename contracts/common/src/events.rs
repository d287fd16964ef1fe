//! Pool Events
//!
//! Events are emitted by every committed pool mutation and can be indexed
//! off-chain for dashboards, analytics and notifications. Each receipt
//! carries the events its operation produced.

use std::collections::VecDeque;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::limits;
use crate::types::{Address, PoolId, PoolKind, ShareClass, Timestamp};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Position Events (0x01 - 0x1F)
    Deposited = 0x01,
    Withdrawn = 0x02,
    YieldClaimed = 0x03,
    LockExtended = 0x04,
    LockConverted = 0x05,

    // Pool Events (0x20 - 0x3F)
    PoolCreated = 0x20,
    RewardsFunded = 0x21,
    TreasuryUpdated = 0x22,
    YieldSourceAttached = 0x23,

    // Protocol Events (0x80 - 0x9F)
    PoolHalted = 0x80,
    PoolResumed = 0x81,
    OwnershipTransferred = 0x82,
}

/// Main event enum containing all pool events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolEvent {
    // ============ Position Events ============

    /// Emitted when assets are deposited for shares
    Deposited {
        pool_id: PoolId,
        user: Address,
        class: ShareClass,
        assets: u128,
        shares: u128,
        timestamp: Timestamp,
    },

    /// Emitted when shares are redeemed for assets
    Withdrawn {
        pool_id: PoolId,
        user: Address,
        class: ShareClass,
        shares: u128,
        assets: u128,
        timestamp: Timestamp,
    },

    /// Emitted when accrued yield is paid out
    YieldClaimed {
        pool_id: PoolId,
        user: Address,
        amount: u128,
        timestamp: Timestamp,
    },

    /// Emitted when a locked deposit sets or extends an unlock time
    LockExtended {
        pool_id: PoolId,
        user: Address,
        unlock_timestamp: Timestamp,
        timestamp: Timestamp,
    },

    /// Emitted when expired Locked shares move to Flex
    LockConverted {
        pool_id: PoolId,
        user: Address,
        shares: u128,
        timestamp: Timestamp,
    },

    // ============ Pool Events ============

    /// Emitted when a pool is registered
    PoolCreated {
        pool_id: PoolId,
        kind: PoolKind,
        timestamp: Timestamp,
    },

    /// Emitted when the treasury tops up the reward reserve
    RewardsFunded {
        pool_id: PoolId,
        from: Address,
        amount: u128,
        new_reserve: u128,
        timestamp: Timestamp,
    },

    /// Emitted when the treasury address changes
    TreasuryUpdated {
        pool_id: PoolId,
        old_treasury: Address,
        new_treasury: Address,
        timestamp: Timestamp,
    },

    /// Emitted when an external yield source is attached
    YieldSourceAttached {
        pool_id: PoolId,
        timestamp: Timestamp,
    },

    // ============ Protocol Events ============

    /// Emitted when a consistency failure stops writes
    PoolHalted {
        pool_id: PoolId,
        code: String,
        timestamp: Timestamp,
    },

    /// Emitted when the owner clears a halt
    PoolResumed {
        pool_id: PoolId,
        timestamp: Timestamp,
    },

    /// Emitted when registry ownership changes
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
        timestamp: Timestamp,
    },
}

impl PoolEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposited { .. } => EventType::Deposited,
            Self::Withdrawn { .. } => EventType::Withdrawn,
            Self::YieldClaimed { .. } => EventType::YieldClaimed,
            Self::LockExtended { .. } => EventType::LockExtended,
            Self::LockConverted { .. } => EventType::LockConverted,
            Self::PoolCreated { .. } => EventType::PoolCreated,
            Self::RewardsFunded { .. } => EventType::RewardsFunded,
            Self::TreasuryUpdated { .. } => EventType::TreasuryUpdated,
            Self::YieldSourceAttached { .. } => EventType::YieldSourceAttached,
            Self::PoolHalted { .. } => EventType::PoolHalted,
            Self::PoolResumed { .. } => EventType::PoolResumed,
            Self::OwnershipTransferred { .. } => EventType::OwnershipTransferred,
        }
    }

    /// Get the time the event occurred
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Deposited { timestamp, .. }
            | Self::Withdrawn { timestamp, .. }
            | Self::YieldClaimed { timestamp, .. }
            | Self::LockExtended { timestamp, .. }
            | Self::LockConverted { timestamp, .. }
            | Self::PoolCreated { timestamp, .. }
            | Self::RewardsFunded { timestamp, .. }
            | Self::TreasuryUpdated { timestamp, .. }
            | Self::YieldSourceAttached { timestamp, .. }
            | Self::PoolHalted { timestamp, .. }
            | Self::PoolResumed { timestamp, .. }
            | Self::OwnershipTransferred { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events.
///
/// Holds at most `MAX_EVENT_HISTORY` events; past the cap the oldest event
/// is dropped for each new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: VecDeque<PoolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: VecDeque::new() }
    }

    /// Emit an event (add to log), dropping the oldest past the cap
    pub fn emit(&mut self, event: PoolEvent) {
        if self.events.len() == limits::MAX_EVENT_HISTORY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Append every event of another log
    pub fn extend(&mut self, other: &EventLog) {
        for event in other.events() {
            self.emit(event.clone());
        }
    }

    /// Iterate events, oldest first
    pub fn events(&self) -> impl DoubleEndedIterator<Item = &PoolEvent> + '_ {
        self.events.iter()
    }

    /// Copy of every retained event, oldest first
    pub fn to_vec(&self) -> Vec<PoolEvent> {
        self.events.iter().cloned().collect()
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<PoolEvent> {
        self.events.into()
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&PoolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing was emitted
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposited(timestamp: Timestamp) -> PoolEvent {
        PoolEvent::Deposited {
            pool_id: [1u8; 32],
            user: [2u8; 32],
            class: ShareClass::Flex,
            assets: 1_000_000,
            shares: 1_000_000,
            timestamp,
        }
    }

    #[test]
    fn test_event_type() {
        let event = deposited(100);
        assert_eq!(event.event_type(), EventType::Deposited);
        assert_eq!(event.timestamp(), 100);
    }

    #[test]
    fn test_event_serialization() {
        let event = PoolEvent::PoolHalted {
            pool_id: [1u8; 32],
            code: "E080_INSUFFICIENT_LIQUIDITY".to_string(),
            timestamp: 200,
        };

        let bytes = event.to_bytes();
        let restored = PoolEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        log.emit(deposited(100));
        log.emit(PoolEvent::YieldClaimed {
            pool_id: [1u8; 32],
            user: [2u8; 32],
            amount: 42,
            timestamp: 101,
        });

        assert_eq!(log.len(), 2);
        assert!(log.has_events());
        assert_eq!(log.filter_by_type(EventType::Deposited).len(), 1);
    }

    #[test]
    fn test_event_log_is_bounded() {
        let mut log = EventLog::new();
        for t in 0..(limits::MAX_EVENT_HISTORY as u64 + 5) {
            log.emit(deposited(t));
        }
        assert_eq!(log.len(), limits::MAX_EVENT_HISTORY);
        assert_eq!(log.events().next().map(PoolEvent::timestamp), Some(5));
        assert_eq!(
            log.events().next_back().map(PoolEvent::timestamp),
            Some(limits::MAX_EVENT_HISTORY as u64 + 4)
        );
    }
}
