//! Dashboard aggregation
//!
//! Per-user portfolio and registry-wide TVL, priced through the registry's
//! oracle. Display only.

use serde::{Deserialize, Serialize};

use posum_common::{
    math, price_in_usd, Address, AssetCustody, AssetKind, PoolId, PoolKind, PosumResult,
    ShareClass, Timestamp,
};

use crate::pool::PoolEngine;
use crate::registry::PoolRegistry;

/// One pool's share of a user's portfolio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHolding {
    pub pool_id: PoolId,
    pub kind: PoolKind,
    pub asset: AssetKind,
    /// Share balance per offered class
    pub shares: Vec<(ShareClass, u128)>,
    /// Assets all of the user's shares redeem for now
    pub redeemable_assets: u128,
    pub sum_points: u128,
    pub claimable_yield: u128,
    pub lock_end: Timestamp,
    /// `redeemable_assets` in USD (18 decimals); `None` when unpriced
    pub value_usd: Option<u128>,
}

/// Everything a user holds across the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub user: Address,
    pub holdings: Vec<PoolHolding>,
    pub total_sum_points: u128,
    /// Sum of the priced holdings
    pub total_value_usd: u128,
}

fn pool_holding(
    engine: &PoolEngine,
    user: &Address,
    now: Timestamp,
) -> PosumResult<Option<PoolHolding>> {
    let config = engine.config();
    let shares: Vec<(ShareClass, u128)> = config
        .share_classes()
        .map(|class| (class, engine.user_shares(user, class)))
        .collect();
    let total_shares = shares
        .iter()
        .try_fold(0u128, |acc, (_, s)| math::checked_add(acc, *s))?;
    let sum_points = engine.current_sum_points(user, now)?;
    let claimable_yield = engine.claimable_yield(user, now)?;
    if total_shares == 0 && sum_points == 0 && claimable_yield == 0 {
        return Ok(None);
    }

    Ok(Some(PoolHolding {
        pool_id: engine.pool_id(),
        kind: config.kind,
        asset: config.asset,
        shares,
        redeemable_assets: engine.preview_withdraw(total_shares)?,
        sum_points,
        claimable_yield,
        lock_end: engine.user_lock_end_date(user),
        value_usd: None,
    }))
}

impl<C: AssetCustody> PoolRegistry<C> {
    /// Aggregate `user`'s positions across every pool at `now`
    pub fn portfolio(&self, user: &Address, now: Timestamp) -> PosumResult<PortfolioSummary> {
        let mut holdings = Vec::new();
        for pool_id in self.list_pools() {
            let holding = self.with_pool(&pool_id, |engine| pool_holding(engine, user, now))??;
            if let Some(mut holding) = holding {
                if let Some(oracle) = self.oracle() {
                    let redeemable = holding.redeemable_assets;
                    holding.value_usd =
                        price_in_usd(oracle.as_ref(), &holding.asset, redeemable, now)?;
                }
                holdings.push(holding);
            }
        }

        let total_sum_points = holdings
            .iter()
            .fold(0u128, |acc, h| acc.saturating_add(h.sum_points));
        let total_value_usd = holdings
            .iter()
            .filter_map(|h| h.value_usd)
            .fold(0u128, |acc, v| acc.saturating_add(v));

        Ok(PortfolioSummary {
            user: *user,
            holdings,
            total_sum_points,
            total_value_usd,
        })
    }

    /// USD value of every pool's contract value; unpriced pools count as 0
    pub fn total_value_locked_usd(&self, now: Timestamp) -> PosumResult<u128> {
        let Some(oracle) = self.oracle() else {
            return Ok(0);
        };
        let mut total = 0u128;
        for pool_id in self.list_pools() {
            let (asset, value) = self.with_pool(&pool_id, |engine| {
                (engine.config().asset, engine.contract_value())
            })?;
            if let Some(usd) = price_in_usd(oracle.as_ref(), &asset, value?, now)? {
                total = total.saturating_add(usd);
            }
        }
        Ok(total)
    }
}
