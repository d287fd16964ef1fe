//! Oracle Module
//!
//! Read-only price and yield-source collaborators. Prices are used only for
//! display aggregation (USD totals); no accounting invariant reads them.
//!
//! ## Key Features
//!
//! - **Chainlink-style Quotes**: answer, decimals and update time
//! - **Staleness Detection**: quotes older than a maximum age are ignored
//! - **Yield Sources**: redeemable value of an external lending position

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::errors::{PosumError, PosumResult};
use crate::math;
use crate::types::{AssetKind, PoolId, Timestamp};

// ============================================================================
// Constants
// ============================================================================

/// Decimals of oracle answers (8, Chainlink USD feeds)
pub const PRICE_DECIMALS: u8 = 8;

/// Decimals of aggregated USD values
pub const USD_DECIMALS: u8 = 18;

/// Maximum quote age before it is considered stale (seconds)
pub const MAX_PRICE_AGE_SECONDS: u64 = 3_600;

// ============================================================================
// Types
// ============================================================================

/// Latest price of one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    /// USD price scaled by `10^decimals`
    pub answer: u128,
    /// Decimals of `answer`
    pub decimals: u8,
    /// Time of the last update
    pub updated_at: Timestamp,
}

impl PriceQuote {
    /// Check if the quote is older than `MAX_PRICE_AGE_SECONDS`
    pub fn is_stale(&self, now: Timestamp) -> bool {
        now > self.updated_at.saturating_add(MAX_PRICE_AGE_SECONDS)
    }
}

/// External USD price feed
pub trait PriceOracle: Send + Sync {
    /// Latest quote for `asset`, if the feed knows it
    fn latest_price(&self, asset: &AssetKind) -> Option<PriceQuote>;
}

/// External position a pool's assets are deployed into.
///
/// Once attached, its value is the pool's total assets: share prices follow
/// it, and proceeds must reach the pool's custody account before they can
/// be withdrawn.
pub trait YieldSource: Send + Sync {
    /// Value the pool could redeem right now, in asset base units
    fn redeemable_value(&self, pool_id: &PoolId) -> PosumResult<u128>;
}

/// Oracle answering from a fixed table
#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
    quotes: BTreeMap<AssetKind, PriceQuote>,
}

impl FixedPriceOracle {
    /// Create an empty oracle
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style price registration with `PRICE_DECIMALS`
    pub fn with_price(mut self, asset: AssetKind, answer: u128, updated_at: Timestamp) -> Self {
        self.set_price(asset, answer, updated_at);
        self
    }

    /// Record a price with `PRICE_DECIMALS`
    pub fn set_price(&mut self, asset: AssetKind, answer: u128, updated_at: Timestamp) {
        self.quotes.insert(
            asset,
            PriceQuote { answer, decimals: PRICE_DECIMALS, updated_at },
        );
    }
}

impl PriceOracle for FixedPriceOracle {
    fn latest_price(&self, asset: &AssetKind) -> Option<PriceQuote> {
        self.quotes.get(asset).copied()
    }
}

/// Yield source reporting a constant value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedYieldSource {
    /// Reported redeemable value
    pub value: u128,
}

impl YieldSource for FixedYieldSource {
    fn redeemable_value(&self, _pool_id: &PoolId) -> PosumResult<u128> {
        Ok(self.value)
    }
}

/// Yield source fed by a keeper that pushes each pool's position value
#[derive(Debug, Default)]
pub struct ReportedYieldSource {
    values: RwLock<BTreeMap<PoolId, u128>>,
}

impl ReportedYieldSource {
    /// Create a source with nothing reported
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest redeemable value of `pool_id`
    pub fn report(&self, pool_id: PoolId, value: u128) -> PosumResult<()> {
        self.values
            .write()
            .map_err(|_| PosumError::InvariantViolated { reason: "lock poisoned" })?
            .insert(pool_id, value);
        Ok(())
    }
}

impl YieldSource for ReportedYieldSource {
    /// `UnknownPool` until a value was reported for the pool
    fn redeemable_value(&self, pool_id: &PoolId) -> PosumResult<u128> {
        self.values
            .read()
            .map_err(|_| PosumError::InvariantViolated { reason: "lock poisoned" })?
            .get(pool_id)
            .copied()
            .ok_or(PosumError::UnknownPool { pool_id: *pool_id })
    }
}

// ============================================================================
// Valuation
// ============================================================================

/// USD value (18 decimals) of `amount` base units of an asset with
/// `asset_decimals`, priced by `quote`
pub fn usd_value(amount: u128, asset_decimals: u8, quote: &PriceQuote) -> PosumResult<u128> {
    let asset_scale = 10u128.pow(asset_decimals as u32);
    let in_quote_decimals = math::mul_div(amount, quote.answer, asset_scale)?;
    if quote.decimals <= USD_DECIMALS {
        let up = 10u128.pow((USD_DECIMALS - quote.decimals) as u32);
        in_quote_decimals
            .checked_mul(up)
            .ok_or(PosumError::ArithmeticOverflow)
    } else {
        let down = 10u128.pow((quote.decimals - USD_DECIMALS) as u32);
        Ok(in_quote_decimals / down)
    }
}

/// USD value of `amount` using `oracle`; `None` when unpriced or stale
pub fn price_in_usd(
    oracle: &dyn PriceOracle,
    asset: &AssetKind,
    amount: u128,
    now: Timestamp,
) -> PosumResult<Option<u128>> {
    match oracle.latest_price(asset) {
        Some(quote) if !quote.is_stale(now) => {
            usd_value(amount, asset.decimals(), &quote).map(Some)
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_USD: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_usd_value_eth() {
        // 1.5 ETH at $3000.00000000
        let quote = PriceQuote { answer: 3_000_00000000, decimals: 8, updated_at: 0 };
        let value = usd_value(1_500_000_000_000_000_000, 18, &quote).unwrap();
        assert_eq!(value, 4_500 * ONE_USD);
    }

    #[test]
    fn test_usd_value_usdc() {
        let quote = PriceQuote { answer: 1_00000000, decimals: 8, updated_at: 0 };
        assert_eq!(usd_value(2_500_000, 6, &quote).unwrap(), 2 * ONE_USD + ONE_USD / 2);
    }

    #[test]
    fn test_stale_quote_ignored() {
        let eth = AssetKind::Native { decimals: 18 };
        let oracle = FixedPriceOracle::new().with_price(eth, 3_000_00000000, 100);

        assert!(price_in_usd(&oracle, &eth, 1, 100 + MAX_PRICE_AGE_SECONDS).unwrap().is_some());
        assert!(price_in_usd(&oracle, &eth, 1, 101 + MAX_PRICE_AGE_SECONDS).unwrap().is_none());
    }

    #[test]
    fn test_reported_yield_source() {
        let source = ReportedYieldSource::new();
        let pool = [5u8; 32];
        assert_eq!(
            source.redeemable_value(&pool),
            Err(PosumError::UnknownPool { pool_id: pool })
        );

        source.report(pool, 1_000).unwrap();
        source.report(pool, 1_250).unwrap();
        assert_eq!(source.redeemable_value(&pool).unwrap(), 1_250);
    }

    #[test]
    fn test_unknown_asset() {
        let oracle = FixedPriceOracle::new();
        let usdc = AssetKind::Token { token: [1u8; 32], decimals: 6 };
        assert_eq!(price_in_usd(&oracle, &usdc, 10, 0).unwrap(), None);
    }
}
