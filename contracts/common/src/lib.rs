//! POSUM Common Library
//!
//! Share and reward accounting for POSUM yield pools.
//!
//! Shared types, constants, and the pure accounting core used by the pool
//! registry. Nothing in this crate locks, performs I/O or reads a clock:
//! every operation takes the current time as an argument and returns either
//! new state or a typed error.
//!
//! ## Components
//!
//! - **Fixed-point Math**: 256-bit `mul_div`, prorating, share conversion
//! - **Share Vault**: pooled assets, per-class share totals, user balances
//! - **Reward Accrual**: per-class reward-per-share and SUM-point accumulators
//! - **Lock Schedule**: unlock times for Locked-class positions
//! - **Custody**: asset movement collaborator with ERC20-style approvals
//! - **Oracle**: display-only USD prices and external yield sources
//! - **Access Control**: single-owner administration
//! - **Events**: indexable record of every committed mutation
//!
//! ## Pool Flavours
//!
//! - **Degen**: one permanently locked class earning SUM at 2x
//! - **Positive**: Flex (1x, withdraw any time) and Locked (1.5x, timed)

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod share_vault;
pub mod accrual;
pub mod lock_schedule;
pub mod custody;
pub mod oracle;
pub mod access_control;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use share_vault::*;
pub use accrual::*;
pub use lock_schedule::*;
pub use custody::*;
pub use oracle::*;
pub use access_control::*;
