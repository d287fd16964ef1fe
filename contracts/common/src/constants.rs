//! Protocol Constants
//!
//! All magic numbers and default configuration values for POSUM pools.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (real lock durations and emission rates)
//! - Default (no feature) - Testnet values (short locks for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! posum-common = { path = "...", features = ["mainnet"] }
//! ```

/// Fixed-point scales
pub mod scale {
    /// Fine accrual scale (1e18) for pools whose asset scale is too coarse
    /// to express their rates, e.g. an APR on a 6-decimal asset
    pub const ACCRUAL_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// Basis points denominator (10000 = 100% = 1x)
    pub const BPS_DENOMINATOR: u128 = 10_000;

    /// Decimals of native-coin pools (ETH-like)
    pub const NATIVE_DECIMALS: u8 = 18;

    /// Decimals of the USDC-like Positive pool asset
    pub const USDC_DECIMALS: u8 = 6;

    /// Largest supported asset decimals (10^38 still fits in u128)
    pub const MAX_DECIMALS: u8 = 38;
}

/// SUM multipliers per share class (basis points)
pub mod multipliers {
    /// Flex shares earn points at 1x
    pub const FLEX_BPS: u32 = 10_000;

    /// Locked shares earn points at 1.5x
    pub const LOCKED_BPS: u32 = 15_000;

    /// Permanent Degen deposits earn points at 2x
    pub const DEGEN_BPS: u32 = 20_000;

    /// Upper bound accepted for any class (10x)
    pub const MAX_BPS: u32 = 100_000;
}

/// Lock Configuration
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod locks {
    /// One day in seconds
    pub const DAY_SECONDS: u64 = 86_400;

    /// Default lock for the Positive pool's Locked class
    /// - Mainnet: 7 days
    /// - Testnet: 1 hour
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_LOCK_SECONDS: u64 = 7 * DAY_SECONDS;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_LOCK_SECONDS: u64 = 3_600;

    /// Longest lock a pool may be configured with (4 years)
    pub const MAX_LOCK_SECONDS: u64 = 4 * 365 * DAY_SECONDS;

    /// Unlock timestamp reported for permanently locked positions
    pub const PERMANENT_LOCK_END: u64 = u64::MAX;
}

/// Emission Rates
///
/// Rates are fixed point at the pool's accrual scale: a rate of `scale`
/// pays one base unit per share unit per second.
pub mod rates {
    /// Seconds per year used for rate conversion
    pub const SECONDS_PER_YEAR: u128 = 31_536_000;

    /// Seconds for one share unit to earn one SUM point at the default rate
    /// - Mainnet: one day
    /// - Testnet: 1000 seconds
    #[cfg(feature = "mainnet")]
    pub const POINTS_PERIOD_SECONDS: u128 = 86_400;
    #[cfg(not(feature = "mainnet"))]
    pub const POINTS_PERIOD_SECONDS: u128 = 1_000;

    /// Default SUM points rate at `scale`
    pub const fn default_points_rate(scale: u128) -> u128 {
        scale / POINTS_PERIOD_SECONDS
    }

    /// Convert an APR in basis points into a per-second yield rate per share
    /// unit at `scale`. Floors; a coarse scale can round a small APR to 0.
    pub const fn apr_bps_to_rate(apr_bps: u128, scale: u128) -> u128 {
        apr_bps * scale / super::scale::BPS_DENOMINATOR / SECONDS_PER_YEAR
    }
}

/// Operational limits
pub mod limits {
    /// Maximum number of pools one registry tracks
    pub const MAX_POOLS: usize = 64;

    /// Events retained per pool history; older ones are dropped first
    pub const MAX_EVENT_HISTORY: usize = 10_000;
}
