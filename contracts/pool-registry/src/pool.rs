//! Pool Engine
//!
//! One pool's complete state (vault ledger, accrual, lock schedule, reward
//! reserve, halt flag, event history) and the orchestration of every write
//! against it.
//!
//! ## Write Discipline
//!
//! Each write runs in the same order:
//!
//! 0. with a yield source attached, re-value the vault at the source's
//!    redeemable value
//! 1. validate input and stage the vault change (`plan_*`)
//! 2. enforce lock rules
//! 3. stage settlement of every class for the user (pre-mutation balances)
//! 4. move assets through custody
//! 5. commit settlement, vault change and lock update together
//!
//! Apart from the re-valuation, nothing is written before step 5, so a
//! failure anywhere, including a refused transfer, leaves the pool's ledger
//! as it was. A consistency error halts the pool until the owner resumes it.

use std::sync::Arc;

use posum_common::{
    locks::PERMANENT_LOCK_END, math, verify_transfer_in, AccrualPhase, Address, AssetCustody,
    ClassSnapshot, EventLog, LockPolicy, LockSchedule, PoolConfig, PoolEvent, PoolId,
    PosumError, PosumResult, RewardAccrualEngine, ShareClass, ShareVault, Timestamp,
    UserPosition, YieldSource, ZERO_ADDRESS,
};

use crate::query::{ActionOutcome, PoolAction, PoolQuery, Receipt};

/// State and write orchestration of a single pool
pub struct PoolEngine {
    pool_id: PoolId,
    config: PoolConfig,
    vault: ShareVault,
    accrual: RewardAccrualEngine,
    locks: LockSchedule,
    reward_reserve: u128,
    halted: bool,
    yield_source: Option<Arc<dyn YieldSource>>,
    history: EventLog,
}

impl PoolEngine {
    /// Create a pool from a validated config
    pub fn new(config: PoolConfig, now: Timestamp) -> PosumResult<Self> {
        config.validate()?;
        let pool_id = config.pool_id();
        let classes: Vec<ShareClass> = config.share_classes().collect();

        let mut history = EventLog::new();
        history.emit(PoolEvent::PoolCreated {
            pool_id,
            kind: config.kind,
            timestamp: now,
        });

        Ok(Self {
            pool_id,
            vault: ShareVault::new(classes.iter().copied()),
            accrual: RewardAccrualEngine::new(
                config.scale,
                config.yield_rate_per_second_per_share,
                config.points_rate_per_second,
                classes,
                now,
            ),
            config,
            locks: LockSchedule::new(),
            reward_reserve: 0,
            halted: false,
            yield_source: None,
            history,
        })
    }

    // ============ Accessors ============

    /// Pool identifier (also its custody account)
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Pool parameters
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Share ledger
    pub fn vault(&self) -> &ShareVault {
        &self.vault
    }

    /// Accrual state
    pub fn accrual(&self) -> &RewardAccrualEngine {
        &self.accrual
    }

    /// Lock schedule
    pub fn locks(&self) -> &LockSchedule {
        &self.locks
    }

    /// Balance claims are paid from
    pub fn reward_reserve(&self) -> u128 {
        self.reward_reserve
    }

    /// True after a consistency failure until resumed
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Retained event history, oldest first
    pub fn history(&self) -> &EventLog {
        &self.history
    }

    /// Settlement phase; always `Idle` between calls
    pub fn phase(&self) -> AccrualPhase {
        self.accrual.phase()
    }

    fn class_snapshots(&self, user: &Address) -> Vec<ClassSnapshot> {
        self.config
            .classes
            .iter()
            .map(|c| ClassSnapshot {
                class: c.class,
                total_shares: self.vault.class_shares(c.class),
                user_balance: self.vault.share_balance(user, c.class),
                multiplier_bps: c.multiplier_bps,
            })
            .collect()
    }

    // ============ Reads ============

    /// Assets `shares` would redeem for at the current rate
    pub fn preview_withdraw(&self, shares: u128) -> PosumResult<u128> {
        math::assets_for_shares(shares, self.contract_value()?, self.vault.total_shares())
    }

    /// Assets backing the shares: the attached yield source's redeemable
    /// value, else the vault's own total
    pub fn contract_value(&self) -> PosumResult<u128> {
        match &self.yield_source {
            Some(source) => source.redeemable_value(&self.pool_id),
            None => Ok(self.vault.total_assets()),
        }
    }

    /// Share balance of `user` in `class` (0 when none or not offered)
    pub fn user_shares(&self, user: &Address, class: ShareClass) -> u128 {
        self.vault.share_balance(user, class)
    }

    /// Unlock time of `user`: 0 when unlocked, `PERMANENT_LOCK_END` for a
    /// permanent position
    pub fn user_lock_end_date(&self, user: &Address) -> Timestamp {
        for class in &self.config.classes {
            let held = self.vault.share_balance(user, class.class);
            if class.lock == LockPolicy::Permanent && held > 0 {
                return PERMANENT_LOCK_END;
            }
        }
        self.locks.unlock_timestamp(user).unwrap_or(0)
    }

    /// Yield `user` could claim at `now`
    pub fn claimable_yield(&self, user: &Address, now: Timestamp) -> PosumResult<u128> {
        self.accrual
            .project(*user, &self.class_snapshots(user), now)?
            .claimable()
    }

    /// SUM points of `user` at `now`
    pub fn current_sum_points(&self, user: &Address, now: Timestamp) -> PosumResult<u128> {
        self.accrual
            .project(*user, &self.class_snapshots(user), now)?
            .points()
    }

    /// Full view of one (user, class) position at `now`
    pub fn user_position(
        &self,
        user: &Address,
        class: ShareClass,
        now: Timestamp,
    ) -> PosumResult<UserPosition> {
        let class_config = self.config.class(class)?;
        let snapshots: Vec<ClassSnapshot> = self
            .class_snapshots(user)
            .into_iter()
            .filter(|s| s.class == class)
            .collect();
        let plan = self.accrual.project(*user, &snapshots, now)?;
        let checkpoint = plan.checkpoint(class).copied().unwrap_or_default();
        let stored = self.accrual.checkpoint(user, class);
        let position = self.vault.position(user, class).copied().unwrap_or_default();

        let unlock_timestamp = match class_config.lock {
            LockPolicy::Unlocked => 0,
            LockPolicy::Timed { .. } => self.locks.unlock_timestamp(user).unwrap_or(0),
            LockPolicy::Permanent if position.share_balance > 0 => PERMANENT_LOCK_END,
            LockPolicy::Permanent => 0,
        };

        Ok(UserPosition {
            share_balance: position.share_balance,
            deposit_timestamp: position.deposit_timestamp,
            unlock_timestamp,
            last_settled_timestamp: stored.map(|cp| cp.last_settled).unwrap_or(0),
            accrued_reward_checkpoint: checkpoint.accrued_reward,
            accrued_points_checkpoint: checkpoint.accrued_points,
        })
    }

    /// Uniform read dispatch
    pub fn query(&self, query: &PoolQuery, now: Timestamp) -> PosumResult<u128> {
        match query {
            PoolQuery::PreviewWithdraw { shares } => self.preview_withdraw(*shares),
            PoolQuery::CurrentSumPoints { user } => self.current_sum_points(user, now),
            PoolQuery::ContractValue => self.contract_value(),
            PoolQuery::UserShares { user, class } => Ok(self.user_shares(user, *class)),
            PoolQuery::UserLockEndDate { user } => Ok(self.user_lock_end_date(user) as u128),
            PoolQuery::ClaimableYield { user } => self.claimable_yield(user, now),
            PoolQuery::TotalShares => Ok(self.vault.total_shares()),
            PoolQuery::RewardReserve => Ok(self.reward_reserve),
        }
    }

    // ============ Writes ============

    /// Main write entry point
    pub fn execute(
        &mut self,
        custody: &mut dyn AssetCustody,
        user: Address,
        action: PoolAction,
        now: Timestamp,
    ) -> PosumResult<Receipt> {
        if self.halted {
            return Err(PosumError::PoolHalted { pool_id: self.pool_id });
        }
        if user == ZERO_ADDRESS {
            return Err(PosumError::InvalidAddress { reason: "user cannot be zero address" });
        }
        if user == self.pool_id {
            return Err(PosumError::InvalidAddress { reason: "user cannot be the pool account" });
        }

        self.accrual.begin_settlement(self.pool_id)?;
        let mut events = EventLog::new();
        let result = match self.sync_yield_source() {
            Ok(()) => self.dispatch(custody, user, action, now, &mut events),
            Err(err) => Err(err),
        };
        self.accrual.end_settlement();

        match result {
            Ok(outcome) => {
                self.history.extend(&events);
                Ok(self.receipt(user, now, outcome, events))
            }
            Err(err) => {
                if err.is_fatal() {
                    self.halt(&err, now);
                }
                Err(err)
            }
        }
    }

    fn sync_yield_source(&mut self) -> PosumResult<()> {
        if let Some(source) = &self.yield_source {
            let value = source.redeemable_value(&self.pool_id)?;
            self.vault.sync_total_assets(value);
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        custody: &mut dyn AssetCustody,
        user: Address,
        action: PoolAction,
        now: Timestamp,
        events: &mut EventLog,
    ) -> PosumResult<ActionOutcome> {
        match action {
            PoolAction::Deposit { amount, class } => {
                self.execute_deposit(custody, user, amount, class, now, events)
            }
            PoolAction::Withdraw { shares, class } => {
                self.execute_withdraw(custody, user, shares, class, now, events)
            }
            PoolAction::Claim => self.execute_claim(custody, user, now, events),
            PoolAction::ConvertExpiredLock => self.execute_convert(user, now, events),
        }
    }

    fn execute_deposit(
        &mut self,
        custody: &mut dyn AssetCustody,
        user: Address,
        amount: u128,
        class: ShareClass,
        now: Timestamp,
        events: &mut EventLog,
    ) -> PosumResult<ActionOutcome> {
        let class_config = *self.config.class(class)?;
        let plan = self.vault.plan_deposit(user, amount, class, now)?;

        let unlock = match class_config.lock {
            LockPolicy::Timed { duration_seconds } => {
                Some(self.locks.projected_unlock(&user, now, duration_seconds)?)
            }
            LockPolicy::Unlocked | LockPolicy::Permanent => None,
        };

        let settlement = self
            .accrual
            .plan_settlement(Some(user), &self.class_snapshots(&user), now)?;

        let asset = self.config.asset;
        verify_transfer_in(&*custody, &asset, &user, &self.pool_id, amount)?;
        custody.transfer_in(&asset, &user, &self.pool_id, amount)?;

        // Commit
        self.accrual.apply_settlement(&settlement);
        self.vault.apply_deposit(&plan);
        events.emit(PoolEvent::Deposited {
            pool_id: self.pool_id,
            user,
            class,
            assets: amount,
            shares: plan.shares_minted,
            timestamp: now,
        });
        if let Some(unlock_timestamp) = unlock {
            self.locks.set_unlock(user, unlock_timestamp);
            events.emit(PoolEvent::LockExtended {
                pool_id: self.pool_id,
                user,
                unlock_timestamp,
                timestamp: now,
            });
        }

        Ok(ActionOutcome::Deposited { assets: amount, shares: plan.shares_minted })
    }

    fn execute_withdraw(
        &mut self,
        custody: &mut dyn AssetCustody,
        user: Address,
        shares: u128,
        class: ShareClass,
        now: Timestamp,
        events: &mut EventLog,
    ) -> PosumResult<ActionOutcome> {
        let class_config = *self.config.class(class)?;
        let plan = self.vault.plan_withdraw(user, shares, class)?;

        match class_config.lock {
            LockPolicy::Permanent => {
                return Err(PosumError::LockNotExpired {
                    unlock_timestamp: PERMANENT_LOCK_END,
                    now,
                });
            }
            LockPolicy::Timed { .. } if !self.locks.is_expired(&user, now) => {
                return Err(PosumError::LockNotExpired {
                    unlock_timestamp: self.locks.unlock_timestamp(&user).unwrap_or(0),
                    now,
                });
            }
            _ => {}
        }

        let settlement = self
            .accrual
            .plan_settlement(Some(user), &self.class_snapshots(&user), now)?;

        // Reserve funds belong to claimants, not withdrawers
        let asset = self.config.asset;
        let available = custody
            .balance_of(&asset, &self.pool_id)
            .saturating_sub(self.reward_reserve);
        if available < plan.assets_out {
            return Err(PosumError::InsufficientLiquidity {
                available,
                required: plan.assets_out,
            });
        }
        if plan.assets_out > 0 {
            custody.transfer_out(&asset, &self.pool_id, &user, plan.assets_out)?;
        }

        // Commit
        self.accrual.apply_settlement(&settlement);
        self.vault.apply_withdraw(&plan);
        if matches!(class_config.lock, LockPolicy::Timed { .. }) && plan.balance_after() == 0 {
            self.locks.release(&user);
        }
        events.emit(PoolEvent::Withdrawn {
            pool_id: self.pool_id,
            user,
            class,
            shares,
            assets: plan.assets_out,
            timestamp: now,
        });

        Ok(ActionOutcome::Withdrawn { shares, assets: plan.assets_out })
    }

    fn execute_claim(
        &mut self,
        custody: &mut dyn AssetCustody,
        user: Address,
        now: Timestamp,
        events: &mut EventLog,
    ) -> PosumResult<ActionOutcome> {
        let mut settlement = self
            .accrual
            .plan_settlement(Some(user), &self.class_snapshots(&user), now)?;
        let amount = settlement.take_rewards()?;

        if amount > self.reward_reserve {
            return Err(PosumError::RewardsUnfunded {
                available: self.reward_reserve,
                requested: amount,
            });
        }
        let asset = self.config.asset;
        let balance = custody.balance_of(&asset, &self.pool_id);
        if balance < amount {
            return Err(PosumError::InsufficientLiquidity {
                available: balance,
                required: amount,
            });
        }
        let reserve_after = math::checked_sub(self.reward_reserve, amount)?;
        custody.transfer_out(&asset, &self.pool_id, &user, amount)?;

        // Commit
        self.accrual.apply_settlement(&settlement);
        self.reward_reserve = reserve_after;
        events.emit(PoolEvent::YieldClaimed {
            pool_id: self.pool_id,
            user,
            amount,
            timestamp: now,
        });

        Ok(ActionOutcome::Claimed { amount })
    }

    fn execute_convert(
        &mut self,
        user: Address,
        now: Timestamp,
        events: &mut EventLog,
    ) -> PosumResult<ActionOutcome> {
        if !self.config.has_class(ShareClass::Flex) {
            return Err(PosumError::InvalidShareClass { class: ShareClass::Flex });
        }
        if !self.config.has_class(ShareClass::Locked) {
            return Err(PosumError::InvalidShareClass { class: ShareClass::Locked });
        }

        let plan = self
            .vault
            .plan_convert(user, ShareClass::Locked, ShareClass::Flex, now)?;
        if plan.is_some() && !self.locks.is_expired(&user, now) {
            return Err(PosumError::LockNotExpired {
                unlock_timestamp: self.locks.unlock_timestamp(&user).unwrap_or(0),
                now,
            });
        }

        let settlement = self
            .accrual
            .plan_settlement(Some(user), &self.class_snapshots(&user), now)?;

        // Commit
        self.accrual.apply_settlement(&settlement);
        let Some(plan) = plan else {
            return Ok(ActionOutcome::Converted { shares: 0 });
        };
        self.vault.apply_convert(&plan);
        self.locks.release(&user);
        events.emit(PoolEvent::LockConverted {
            pool_id: self.pool_id,
            user,
            shares: plan.shares,
            timestamp: now,
        });

        Ok(ActionOutcome::Converted { shares: plan.shares })
    }

    fn receipt(
        &self,
        user: Address,
        now: Timestamp,
        outcome: ActionOutcome,
        events: EventLog,
    ) -> Receipt {
        // Every write settles all of the user's classes at `now`, so the
        // stored checkpoints are current
        let (claimable_yield, sum_points) = self
            .config
            .share_classes()
            .filter_map(|class| self.accrual.checkpoint(&user, class))
            .fold((0u128, 0u128), |(r, p), cp| {
                (r.saturating_add(cp.accrued_reward), p.saturating_add(cp.accrued_points))
            });

        Receipt {
            pool_id: self.pool_id,
            user,
            timestamp: now,
            outcome,
            balances: self
                .config
                .share_classes()
                .map(|class| (class, self.vault.share_balance(&user, class)))
                .collect(),
            lock_end: self.user_lock_end_date(&user),
            claimable_yield,
            sum_points,
            events: events.into_events(),
        }
    }

    // ============ Administration ============

    fn halt(&mut self, err: &PosumError, now: Timestamp) {
        self.halted = true;
        self.history.emit(PoolEvent::PoolHalted {
            pool_id: self.pool_id,
            code: err.code().to_string(),
            timestamp: now,
        });
    }

    /// Clear a halt; returns whether the pool was halted
    pub fn resume(&mut self, now: Timestamp) -> bool {
        if !self.halted {
            return false;
        }
        self.halted = false;
        self.history.emit(PoolEvent::PoolResumed {
            pool_id: self.pool_id,
            timestamp: now,
        });
        true
    }

    /// Re-point the treasury, returning the previous address
    pub fn set_treasury(&mut self, treasury: Address, now: Timestamp) -> PosumResult<Address> {
        if treasury == ZERO_ADDRESS {
            return Err(PosumError::InvalidAddress { reason: "treasury cannot be zero address" });
        }
        let old_treasury = self.config.treasury;
        self.config.treasury = treasury;
        self.history.emit(PoolEvent::TreasuryUpdated {
            pool_id: self.pool_id,
            old_treasury,
            new_treasury: treasury,
            timestamp: now,
        });
        Ok(old_treasury)
    }

    /// Pull `amount` from the treasury into the reward reserve.
    ///
    /// Returns the new reserve.
    pub fn fund_rewards(
        &mut self,
        custody: &mut dyn AssetCustody,
        amount: u128,
        now: Timestamp,
    ) -> PosumResult<u128> {
        if self.halted {
            return Err(PosumError::PoolHalted { pool_id: self.pool_id });
        }
        if amount == 0 {
            return Err(PosumError::ZeroAmount);
        }
        let new_reserve = math::checked_add(self.reward_reserve, amount)?;
        let asset = self.config.asset;
        let treasury = self.config.treasury;
        verify_transfer_in(&*custody, &asset, &treasury, &self.pool_id, amount)?;
        custody.transfer_in(&asset, &treasury, &self.pool_id, amount)?;

        self.reward_reserve = new_reserve;
        self.history.emit(PoolEvent::RewardsFunded {
            pool_id: self.pool_id,
            from: treasury,
            amount,
            new_reserve,
            timestamp: now,
        });
        Ok(new_reserve)
    }

    /// Price shares from an external position's redeemable value from now on
    pub fn attach_yield_source(&mut self, source: Arc<dyn YieldSource>, now: Timestamp) {
        self.yield_source = Some(source);
        self.history.emit(PoolEvent::YieldSourceAttached {
            pool_id: self.pool_id,
            timestamp: now,
        });
    }

    /// True when a yield source is attached
    pub fn has_yield_source(&self) -> bool {
        self.yield_source.is_some()
    }
}
