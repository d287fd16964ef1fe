//! Reward Accrual Engine
//!
//! Continuous yield and SUM-point accrual using the reward-per-share
//! pattern. Each share class has an accumulator that grows by
//! `rate * elapsed` whenever the class has shares outstanding; each user
//! position remembers the accumulator value it was last settled at and
//! converts the difference into an owed amount. Accumulators are fixed point
//! at the pool's accrual scale, so `pending = balance * delta / scale`.
//!
//! ## Settlement Order
//!
//! Accumulators must be settled before any change to a class's share total
//! and before any user-level read, otherwise a newly enlarged balance would
//! capture accrual from before it existed.
//!
//! ## Staging
//!
//! [`RewardAccrualEngine::plan_settlement`] computes every new accumulator
//! and checkpoint without mutating anything; [`RewardAccrualEngine::apply_settlement`]
//! commits the result. Reads use the same projection, saturating instead of
//! failing on a timestamp older than the last settlement.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PosumError, PosumResult};
use crate::math;
use crate::types::{Address, PoolId, ShareClass, Timestamp};

// ============================================================================
// Types
// ============================================================================

/// Per-class global accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RewardAccumulator {
    /// Cumulative yield per share unit, at the pool's scale
    pub reward_per_share_stored: u128,
    /// Cumulative SUM points per weighted share unit, at the pool's scale
    pub points_per_share_stored: u128,
    /// Last settlement time
    pub last_update_time: Timestamp,
}

impl RewardAccumulator {
    /// Accumulator brought forward to `now`.
    ///
    /// Grows only while `class_total_shares > 0`; `last_update_time` always
    /// moves to `now`.
    pub fn advanced(
        &self,
        now: Timestamp,
        class_total_shares: u128,
        yield_rate: u128,
        points_rate: u128,
    ) -> PosumResult<Self> {
        if now < self.last_update_time {
            return Err(PosumError::StaleTimestamp {
                now,
                last: self.last_update_time,
            });
        }
        let elapsed = now - self.last_update_time;
        let mut next = *self;
        if elapsed > 0 && class_total_shares > 0 {
            next.reward_per_share_stored = math::checked_add(
                self.reward_per_share_stored,
                math::pro_rate(yield_rate, elapsed)?,
            )?;
            next.points_per_share_stored = math::checked_add(
                self.points_per_share_stored,
                math::pro_rate(points_rate, elapsed)?,
            )?;
        }
        next.last_update_time = now;
        Ok(next)
    }
}

/// Per (user, class) settlement record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct UserCheckpoint {
    /// Accumulator value already paid into `accrued_reward`
    pub reward_per_share_paid: u128,
    /// Accumulator value already paid into `accrued_points`
    pub points_per_share_paid: u128,
    /// Settled, unclaimed yield (asset units)
    pub accrued_reward: u128,
    /// Settled SUM points
    pub accrued_points: u128,
    /// Last settlement time
    pub last_settled: Timestamp,
}

/// Pool-level settlement phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum AccrualPhase {
    /// No mutation in flight
    #[default]
    Idle,
    /// A mutation is settling and committing
    Settling,
}

/// Inputs describing one class at settlement time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassSnapshot {
    /// Class being settled
    pub class: ShareClass,
    /// Shares outstanding in the class before the mutation
    pub total_shares: u128,
    /// User's balance in the class before the mutation
    pub user_balance: u128,
    /// SUM weight of the class
    pub multiplier_bps: u32,
}

/// Staged accumulator and checkpoint updates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementPlan {
    /// Settled user, if any
    pub user: Option<Address>,
    /// Settlement time
    pub now: Timestamp,
    accumulators: Vec<(ShareClass, RewardAccumulator)>,
    checkpoints: Vec<(ShareClass, UserCheckpoint)>,
}

impl SettlementPlan {
    /// Staged accumulator for `class`
    pub fn accumulator(&self, class: ShareClass) -> Option<&RewardAccumulator> {
        self.accumulators.iter().find(|(c, _)| *c == class).map(|(_, a)| a)
    }

    /// Staged user checkpoint for `class`
    pub fn checkpoint(&self, class: ShareClass) -> Option<&UserCheckpoint> {
        self.checkpoints.iter().find(|(c, _)| *c == class).map(|(_, cp)| cp)
    }

    /// Yield owed to the user across every settled class
    pub fn claimable(&self) -> PosumResult<u128> {
        self.checkpoints
            .iter()
            .try_fold(0u128, |acc, (_, cp)| math::checked_add(acc, cp.accrued_reward))
    }

    /// SUM points held by the user across every settled class
    pub fn points(&self) -> PosumResult<u128> {
        self.checkpoints
            .iter()
            .try_fold(0u128, |acc, (_, cp)| math::checked_add(acc, cp.accrued_points))
    }

    /// Zero the staged yield of every class and return what was owed.
    ///
    /// Fails with `NothingToClaim` when nothing is owed.
    pub fn take_rewards(&mut self) -> PosumResult<u128> {
        let total = self.claimable()?;
        if total == 0 {
            return Err(PosumError::NothingToClaim);
        }
        for (_, cp) in self.checkpoints.iter_mut() {
            cp.accrued_reward = 0;
        }
        Ok(total)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Accrual state of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RewardAccrualEngine {
    scale: u128,
    yield_rate: u128,
    points_rate: u128,
    accumulators: BTreeMap<ShareClass, RewardAccumulator>,
    checkpoints: BTreeMap<(Address, ShareClass), UserCheckpoint>,
    phase: AccrualPhase,
}

impl RewardAccrualEngine {
    /// Create an engine whose accumulators start at `start_time`; both rates
    /// are fixed point at `scale`
    pub fn new(
        scale: u128,
        yield_rate: u128,
        points_rate: u128,
        classes: impl IntoIterator<Item = ShareClass>,
        start_time: Timestamp,
    ) -> Self {
        let accumulators = classes
            .into_iter()
            .map(|c| {
                (c, RewardAccumulator { last_update_time: start_time, ..Default::default() })
            })
            .collect();
        Self {
            scale,
            yield_rate,
            points_rate,
            accumulators,
            checkpoints: BTreeMap::new(),
            phase: AccrualPhase::Idle,
        }
    }

    /// Fixed-point scale of rates and accumulators
    pub fn scale(&self) -> u128 {
        self.scale
    }

    /// Yield per share unit per second (scaled)
    pub fn yield_rate(&self) -> u128 {
        self.yield_rate
    }

    /// Points per share unit per second (scaled)
    pub fn points_rate(&self) -> u128 {
        self.points_rate
    }

    /// Current phase
    pub fn phase(&self) -> AccrualPhase {
        self.phase
    }

    /// Enter `Settling`; a second entry is a re-entrant call
    pub fn begin_settlement(&mut self, pool_id: PoolId) -> PosumResult<()> {
        if self.phase == AccrualPhase::Settling {
            return Err(PosumError::Reentrancy { pool_id });
        }
        self.phase = AccrualPhase::Settling;
        Ok(())
    }

    /// Return to `Idle`
    pub fn end_settlement(&mut self) {
        self.phase = AccrualPhase::Idle;
    }

    /// Stored accumulator of `class`
    pub fn accumulator(&self, class: ShareClass) -> PosumResult<&RewardAccumulator> {
        self.accumulators
            .get(&class)
            .ok_or(PosumError::InvalidShareClass { class })
    }

    /// Stored checkpoint of (`user`, `class`)
    pub fn checkpoint(&self, user: &Address, class: ShareClass) -> Option<&UserCheckpoint> {
        self.checkpoints.get(&(*user, class))
    }

    /// Latest settlement time across all classes
    pub fn last_update_time(&self) -> Timestamp {
        self.accumulators
            .values()
            .map(|a| a.last_update_time)
            .max()
            .unwrap_or(0)
    }

    /// Settle a single class accumulator in place
    pub fn settle(
        &mut self,
        class: ShareClass,
        now: Timestamp,
        class_total_shares: u128,
    ) -> PosumResult<()> {
        let next = self
            .accumulator(class)?
            .advanced(now, class_total_shares, self.yield_rate, self.points_rate)?;
        self.accumulators.insert(class, next);
        Ok(())
    }

    /// Settle a class and then one user's position in it
    pub fn settle_user(
        &mut self,
        user: Address,
        snapshot: ClassSnapshot,
        now: Timestamp,
    ) -> PosumResult<UserCheckpoint> {
        let plan = self.plan_settlement(Some(user), &[snapshot], now)?;
        self.apply_settlement(&plan);
        Ok(self.checkpoint(&user, snapshot.class).copied().unwrap_or_default())
    }

    /// Checkpoint of a user settled against `accumulator`
    pub fn project_user(
        &self,
        user: &Address,
        class: ShareClass,
        balance: u128,
        multiplier_bps: u32,
        accumulator: &RewardAccumulator,
        now: Timestamp,
    ) -> PosumResult<UserCheckpoint> {
        let current = self.checkpoint(user, class).copied().unwrap_or_default();

        let pending_reward = math::accrued_between(
            balance,
            accumulator.reward_per_share_stored,
            current.reward_per_share_paid,
            self.scale,
        )?;

        let weight = math::apply_bps(balance, multiplier_bps)?;
        let pending_points = math::accrued_between(
            weight,
            accumulator.points_per_share_stored,
            current.points_per_share_paid,
            self.scale,
        )?;

        Ok(UserCheckpoint {
            reward_per_share_paid: accumulator.reward_per_share_stored,
            points_per_share_paid: accumulator.points_per_share_stored,
            accrued_reward: math::checked_add(current.accrued_reward, pending_reward)?,
            accrued_points: math::checked_add(current.accrued_points, pending_points)?,
            last_settled: now.max(current.last_settled),
        })
    }

    /// Stage settlement of every listed class and, when given, the user's
    /// position in each. Fails with `StaleTimestamp` if `now` is older than
    /// any stored accumulator.
    pub fn plan_settlement(
        &self,
        user: Option<Address>,
        classes: &[ClassSnapshot],
        now: Timestamp,
    ) -> PosumResult<SettlementPlan> {
        let mut plan = SettlementPlan { user, now, ..Default::default() };
        for snapshot in classes {
            let accumulator = self.accumulator(snapshot.class)?.advanced(
                now,
                snapshot.total_shares,
                self.yield_rate,
                self.points_rate,
            )?;
            if let Some(user) = user.as_ref() {
                let checkpoint = self.project_user(
                    user,
                    snapshot.class,
                    snapshot.user_balance,
                    snapshot.multiplier_bps,
                    &accumulator,
                    now,
                )?;
                plan.checkpoints.push((snapshot.class, checkpoint));
            }
            plan.accumulators.push((snapshot.class, accumulator));
        }
        Ok(plan)
    }

    /// Commit a staged settlement
    pub fn apply_settlement(&mut self, plan: &SettlementPlan) {
        for (class, accumulator) in &plan.accumulators {
            self.accumulators.insert(*class, *accumulator);
        }
        if let Some(user) = plan.user {
            for (class, checkpoint) in &plan.checkpoints {
                self.checkpoints.insert((user, *class), *checkpoint);
            }
        }
    }

    /// Read-only settlement at `now`.
    ///
    /// A `now` older than the stored accumulators is treated as "no time
    /// passed" instead of failing.
    pub fn project(
        &self,
        user: Address,
        classes: &[ClassSnapshot],
        now: Timestamp,
    ) -> PosumResult<SettlementPlan> {
        self.plan_settlement(Some(user), classes, now.max(self.last_update_time()))
    }

    /// Settle the user's classes and zero their unclaimed yield.
    ///
    /// Returns the claimed amount; `NothingToClaim` when zero.
    pub fn claim(
        &mut self,
        user: Address,
        classes: &[ClassSnapshot],
        now: Timestamp,
    ) -> PosumResult<u128> {
        let mut plan = self.plan_settlement(Some(user), classes, now)?;
        let amount = plan.take_rewards()?;
        self.apply_settlement(&plan);
        Ok(amount)
    }
}
