//! Pool Registry
//!
//! Owns every pool, the registry owner record, the shared custody ledger and
//! an optional price oracle.
//!
//! ## Locking
//!
//! - The pool map lock is held only long enough to clone a pool handle
//! - Each pool sits behind its own `RwLock`: writes take it exclusively,
//!   reads share it and project at the caller's `now` without mutating
//! - The custody `Mutex` is always taken after the pool lock
//! - A thread-local guard turns a nested call into the same pool (from a
//!   custody callback) into `Reentrancy` instead of a deadlock
//! - A poisoned pool or custody lock surfaces as `InvariantViolated`

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use posum_common::{
    limits, require_permission, short_id, transfer_ownership, AccessControlState, Address,
    AssetCustody, EventLog, InMemoryCustody, Permission, PoolConfig, PoolEvent, PoolId,
    PosumError, PosumResult, PriceOracle, ShareClass, Timestamp, UserPosition, YieldSource,
};

use crate::config::{ConfigError, DegenPoolParams, DeploymentConfig, PositivePoolParams};
use crate::pool::PoolEngine;
use crate::query::{PoolAction, PoolQuery, Receipt};

type PoolHandle = Arc<RwLock<PoolEngine>>;

fn poisoned<T>(_: PoisonError<T>) -> PosumError {
    PosumError::InvariantViolated { reason: "lock poisoned" }
}

// ============ Re-entry Guard ============

thread_local! {
    static ACTIVE_POOLS: RefCell<BTreeSet<PoolId>> = const { RefCell::new(BTreeSet::new()) };
}

/// Marks a pool as mid-operation on the current thread
struct ReentrancyGuard {
    pool_id: PoolId,
}

impl ReentrancyGuard {
    fn enter(pool_id: PoolId) -> PosumResult<Self> {
        ACTIVE_POOLS.with(|active| {
            if active.borrow_mut().insert(pool_id) {
                Ok(Self { pool_id })
            } else {
                Err(PosumError::Reentrancy { pool_id })
            }
        })
    }

    /// Fail if the current thread is inside an operation on `pool_id`
    fn check(pool_id: &PoolId) -> PosumResult<()> {
        ACTIVE_POOLS.with(|active| {
            if active.borrow().contains(pool_id) {
                Err(PosumError::Reentrancy { pool_id: *pool_id })
            } else {
                Ok(())
            }
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        ACTIVE_POOLS.with(|active| {
            active.borrow_mut().remove(&self.pool_id);
        });
    }
}

// ============ Registry ============

struct AdminState {
    access: AccessControlState,
    history: EventLog,
}

/// Registry of Degen and Positive pools
pub struct PoolRegistry<C: AssetCustody = InMemoryCustody> {
    admin: RwLock<AdminState>,
    pools: RwLock<BTreeMap<PoolId, PoolHandle>>,
    custody: Mutex<C>,
    oracle: Option<Arc<dyn PriceOracle>>,
}

impl<C: AssetCustody> PoolRegistry<C> {
    /// Create an empty registry owned by `owner`
    pub fn new(owner: Address, custody: C, now: Timestamp) -> PosumResult<Self> {
        Ok(Self {
            admin: RwLock::new(AdminState {
                access: AccessControlState::new(owner, now)?,
                history: EventLog::new(),
            }),
            pools: RwLock::new(BTreeMap::new()),
            custody: Mutex::new(custody),
            oracle: None,
        })
    }

    /// Build a registry and create every pool of a deployment config
    pub fn from_config(config: &DeploymentConfig, custody: C) -> Result<Self, ConfigError> {
        let owner = config.owner_address()?;
        let registry = Self::new(owner, custody, config.start_time)?;
        for entry in &config.pools {
            let pool_config = entry.to_pool_config()?;
            registry.create_pool(&owner, pool_config, config.start_time)?;
        }
        log::info!(
            "Registry loaded from config: {} pools, owner {}",
            config.pools.len(),
            short_id(&owner)
        );
        Ok(registry)
    }

    /// Attach a display price oracle
    pub fn with_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Attached price oracle, if any
    pub fn oracle(&self) -> Option<&Arc<dyn PriceOracle>> {
        self.oracle.as_ref()
    }

    /// Run `f` against the custody ledger
    pub fn with_custody<R>(&self, f: impl FnOnce(&mut C) -> R) -> PosumResult<R> {
        let mut custody = self.custody.lock().map_err(poisoned)?;
        Ok(f(&mut custody))
    }

    fn pools_read(&self) -> RwLockReadGuard<'_, BTreeMap<PoolId, PoolHandle>> {
        // The map only ever gains entries, so a poisoned map is still sound
        self.pools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool(&self, pool_id: &PoolId) -> PosumResult<PoolHandle> {
        self.pools_read()
            .get(pool_id)
            .cloned()
            .ok_or(PosumError::UnknownPool { pool_id: *pool_id })
    }

    /// Run `f` against a consistent snapshot of one pool
    pub fn with_pool<R>(
        &self,
        pool_id: &PoolId,
        f: impl FnOnce(&PoolEngine) -> R,
    ) -> PosumResult<R> {
        ReentrancyGuard::check(pool_id)?;
        let handle = self.pool(pool_id)?;
        let engine = handle.read().map_err(poisoned)?;
        Ok(f(&engine))
    }

    fn require(&self, caller: &Address, permission: Permission) -> PosumResult<()> {
        let admin = self.admin.read().map_err(poisoned)?;
        require_permission(&admin.access, caller, permission)
    }

    // ============ Pool Creation ============

    /// Create a Degen pool (owner only)
    pub fn create_degen_pool(
        &self,
        caller: &Address,
        params: DegenPoolParams,
        now: Timestamp,
    ) -> PosumResult<PoolId> {
        self.create_pool(caller, params.into_config(), now)
    }

    /// Create a Positive pool (owner only)
    pub fn create_positive_pool(
        &self,
        caller: &Address,
        params: PositivePoolParams,
        now: Timestamp,
    ) -> PosumResult<PoolId> {
        self.create_pool(caller, params.into_config(), now)
    }

    /// Create a pool from a full config (owner only)
    pub fn create_pool(
        &self,
        caller: &Address,
        config: PoolConfig,
        now: Timestamp,
    ) -> PosumResult<PoolId> {
        self.require(caller, Permission::CreatePool)?;
        let kind = config.kind;
        let engine = PoolEngine::new(config, now)?;
        let pool_id = engine.pool_id();

        let mut pools = self.pools.write().map_err(poisoned)?;
        if pools.contains_key(&pool_id) {
            return Err(PosumError::DuplicatePool { pool_id });
        }
        if pools.len() >= limits::MAX_POOLS {
            return Err(PosumError::InvalidPoolConfig { reason: "registry pool limit reached" });
        }
        pools.insert(pool_id, Arc::new(RwLock::new(engine)));

        log::info!("Created {:?} pool {}", kind, short_id(&pool_id));
        Ok(pool_id)
    }

    /// Number of registered pools
    pub fn pool_count(&self) -> usize {
        self.pools_read().len()
    }

    /// Ids of every registered pool, in id order
    pub fn list_pools(&self) -> Vec<PoolId> {
        self.pools_read().keys().copied().collect()
    }

    /// Current parameters of a pool
    pub fn pool_config(&self, pool_id: &PoolId) -> PosumResult<PoolConfig> {
        self.with_pool(pool_id, |engine| engine.config().clone())
    }

    // ============ Writes ============

    /// Deposit `amount` assets into `class`
    pub fn deposit(
        &self,
        pool_id: &PoolId,
        user: Address,
        amount: u128,
        class: ShareClass,
        now: Timestamp,
    ) -> PosumResult<Receipt> {
        self.execute(pool_id, user, PoolAction::Deposit { amount, class }, now)
    }

    /// Redeem `shares` of `class`
    pub fn withdraw(
        &self,
        pool_id: &PoolId,
        user: Address,
        shares: u128,
        class: ShareClass,
        now: Timestamp,
    ) -> PosumResult<Receipt> {
        self.execute(pool_id, user, PoolAction::Withdraw { shares, class }, now)
    }

    /// Pay out all settled yield
    pub fn claim(&self, pool_id: &PoolId, user: Address, now: Timestamp) -> PosumResult<Receipt> {
        self.execute(pool_id, user, PoolAction::Claim, now)
    }

    /// Move expired Locked shares to Flex
    pub fn convert_expired_lock(
        &self,
        pool_id: &PoolId,
        user: Address,
        now: Timestamp,
    ) -> PosumResult<Receipt> {
        self.execute(pool_id, user, PoolAction::ConvertExpiredLock, now)
    }

    /// Uniform write entry point
    pub fn execute(
        &self,
        pool_id: &PoolId,
        user: Address,
        action: PoolAction,
        now: Timestamp,
    ) -> PosumResult<Receipt> {
        let _guard = ReentrancyGuard::enter(*pool_id)?;
        let handle = self.pool(pool_id)?;
        let mut engine = handle.write().map_err(poisoned)?;
        let mut custody = self.custody.lock().map_err(poisoned)?;

        let result = engine.execute(&mut *custody, user, action, now);
        match &result {
            Ok(receipt) => log::info!(
                "Pool {}: {:?} by {} at {}",
                short_id(pool_id),
                receipt.outcome,
                short_id(&user),
                now
            ),
            Err(err) if err.is_fatal() => log::error!(
                "Pool {} halted during {:?} by {}: {} [{}]",
                short_id(pool_id),
                action,
                short_id(&user),
                err,
                err.code()
            ),
            Err(err) => log::debug!(
                "Pool {} rejected {:?} by {}: {}",
                short_id(pool_id),
                action,
                short_id(&user),
                err
            ),
        }
        result
    }

    // ============ Reads ============

    /// Assets `shares` would redeem for now
    pub fn preview_withdraw(&self, pool_id: &PoolId, shares: u128) -> PosumResult<u128> {
        self.with_pool(pool_id, |engine| engine.preview_withdraw(shares))?
    }

    /// SUM points of `user` at `now`
    pub fn current_sum_points(
        &self,
        pool_id: &PoolId,
        user: &Address,
        now: Timestamp,
    ) -> PosumResult<u128> {
        self.with_pool(pool_id, |engine| engine.current_sum_points(user, now))?
    }

    /// Assets under management, or the attached yield source's value
    pub fn contract_value(&self, pool_id: &PoolId) -> PosumResult<u128> {
        self.with_pool(pool_id, |engine| engine.contract_value())?
    }

    /// Share balance of `user` in `class`
    pub fn user_shares(
        &self,
        pool_id: &PoolId,
        user: &Address,
        class: ShareClass,
    ) -> PosumResult<u128> {
        self.with_pool(pool_id, |engine| engine.user_shares(user, class))
    }

    /// Unlock time of `user` (0 unlocked, `u64::MAX` permanent)
    pub fn user_lock_end_date(&self, pool_id: &PoolId, user: &Address) -> PosumResult<Timestamp> {
        self.with_pool(pool_id, |engine| engine.user_lock_end_date(user))
    }

    /// Yield `user` could claim at `now`
    pub fn claimable_yield(
        &self,
        pool_id: &PoolId,
        user: &Address,
        now: Timestamp,
    ) -> PosumResult<u128> {
        self.with_pool(pool_id, |engine| engine.claimable_yield(user, now))?
    }

    /// Full view of one position
    pub fn user_position(
        &self,
        pool_id: &PoolId,
        user: &Address,
        class: ShareClass,
        now: Timestamp,
    ) -> PosumResult<UserPosition> {
        self.with_pool(pool_id, |engine| engine.user_position(user, class, now))?
    }

    /// Uniform read entry point
    pub fn query(&self, pool_id: &PoolId, query: &PoolQuery, now: Timestamp) -> PosumResult<u128> {
        self.with_pool(pool_id, |engine| engine.query(query, now))?
    }

    /// Retained event history of a pool, oldest first
    pub fn events(&self, pool_id: &PoolId) -> PosumResult<Vec<PoolEvent>> {
        self.with_pool(pool_id, |engine| engine.history().to_vec())
    }

    // ============ Administration ============

    /// Current registry owner
    pub fn owner(&self) -> PosumResult<Address> {
        Ok(self.admin.read().map_err(poisoned)?.access.owner)
    }

    /// Registry-level events (ownership changes)
    pub fn admin_events(&self) -> PosumResult<Vec<PoolEvent>> {
        Ok(self.admin.read().map_err(poisoned)?.history.to_vec())
    }

    /// Hand the registry to `new_owner` (owner only)
    pub fn transfer_ownership(
        &self,
        caller: &Address,
        new_owner: Address,
        now: Timestamp,
    ) -> PosumResult<()> {
        let mut admin = self.admin.write().map_err(poisoned)?;
        let previous_owner = transfer_ownership(&mut admin.access, caller, new_owner, now)?;
        admin.history.emit(PoolEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
            timestamp: now,
        });
        log::info!(
            "Ownership transferred from {} to {}",
            short_id(&previous_owner),
            short_id(&new_owner)
        );
        Ok(())
    }

    /// Re-point a pool's treasury (owner only); returns the previous one
    pub fn set_treasury(
        &self,
        caller: &Address,
        pool_id: &PoolId,
        treasury: Address,
        now: Timestamp,
    ) -> PosumResult<Address> {
        self.require(caller, Permission::SetTreasury)?;
        let handle = self.pool(pool_id)?;
        let mut engine = handle.write().map_err(poisoned)?;
        let previous = engine.set_treasury(treasury, now)?;
        log::info!(
            "Pool {} treasury changed from {} to {}",
            short_id(pool_id),
            short_id(&previous),
            short_id(&treasury)
        );
        Ok(previous)
    }

    /// Move `amount` from the pool's treasury into its reward reserve
    /// (owner only); returns the new reserve
    pub fn fund_rewards(
        &self,
        caller: &Address,
        pool_id: &PoolId,
        amount: u128,
        now: Timestamp,
    ) -> PosumResult<u128> {
        self.require(caller, Permission::FundRewards)?;
        let _guard = ReentrancyGuard::enter(*pool_id)?;
        let handle = self.pool(pool_id)?;
        let mut engine = handle.write().map_err(poisoned)?;
        let mut custody = self.custody.lock().map_err(poisoned)?;
        let reserve = engine.fund_rewards(&mut *custody, amount, now)?;
        log::info!("Pool {} reward reserve funded to {}", short_id(pool_id), reserve);
        Ok(reserve)
    }

    /// Report `contract_value` through an external position (owner only)
    pub fn attach_yield_source(
        &self,
        caller: &Address,
        pool_id: &PoolId,
        source: Arc<dyn YieldSource>,
        now: Timestamp,
    ) -> PosumResult<()> {
        self.require(caller, Permission::AttachYieldSource)?;
        let handle = self.pool(pool_id)?;
        handle.write().map_err(poisoned)?.attach_yield_source(source, now);
        log::info!("Pool {} yield source attached", short_id(pool_id));
        Ok(())
    }

    /// Clear a consistency halt (owner only); returns whether one was set
    pub fn resume_pool(
        &self,
        caller: &Address,
        pool_id: &PoolId,
        now: Timestamp,
    ) -> PosumResult<bool> {
        self.require(caller, Permission::ResumePool)?;
        let handle = self.pool(pool_id)?;
        let resumed = handle.write().map_err(poisoned)?.resume(now);
        if resumed {
            log::info!("Pool {} resumed", short_id(pool_id));
        }
        Ok(resumed)
    }

    /// True when a pool refuses writes
    pub fn is_halted(&self, pool_id: &PoolId) -> PosumResult<bool> {
        self.with_pool(pool_id, |engine| engine.is_halted())
    }
}
