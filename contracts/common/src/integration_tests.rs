//! Integration Tests
//!
//! Scenarios that drive the vault ledger, accrual engine and lock schedule
//! together the way a pool does, plus property tests over random operation
//! sequences.

#[cfg(test)]
mod tests {
    use crate::scale::ACCRUAL_PRECISION;
    use crate::*;

    const ONE_USDC: u128 = 1_000_000;
    const ONE_ETH: u128 = 1_000_000_000_000_000_000;
    const WEEK: u64 = 7 * 86_400;

    fn alice() -> Address {
        [2u8; 32]
    }

    fn bob() -> Address {
        [3u8; 32]
    }

    /// Vault + accrual + locks for a Positive pool, without custody
    struct PositiveLedger {
        vault: ShareVault,
        accrual: RewardAccrualEngine,
        locks: LockSchedule,
    }

    impl PositiveLedger {
        fn new(yield_rate: u128, points_rate: u128) -> Self {
            let classes = [ShareClass::Flex, ShareClass::Locked];
            Self {
                vault: ShareVault::new(classes),
                accrual: RewardAccrualEngine::new(
                    ACCRUAL_PRECISION,
                    yield_rate,
                    points_rate,
                    classes,
                    0,
                ),
                locks: LockSchedule::new(),
            }
        }

        fn snapshots(&self, user: &Address) -> Vec<ClassSnapshot> {
            [(ShareClass::Flex, 10_000), (ShareClass::Locked, 15_000)]
                .into_iter()
                .map(|(class, multiplier_bps)| ClassSnapshot {
                    class,
                    total_shares: self.vault.class_shares(class),
                    user_balance: self.vault.share_balance(user, class),
                    multiplier_bps,
                })
                .collect()
        }

        fn deposit(&mut self, user: Address, amount: u128, class: ShareClass, now: u64) -> u128 {
            let plan = self.vault.plan_deposit(user, amount, class, now).unwrap();
            let settlement = self
                .accrual
                .plan_settlement(Some(user), &self.snapshots(&user), now)
                .unwrap();
            self.accrual.apply_settlement(&settlement);
            self.vault.apply_deposit(&plan);
            if class == ShareClass::Locked {
                self.locks.register_or_extend(user, now, WEEK).unwrap();
            }
            plan.shares_minted
        }

        fn withdraw(
            &mut self,
            user: Address,
            shares: u128,
            class: ShareClass,
            now: u64,
        ) -> PosumResult<u128> {
            let plan = self.vault.plan_withdraw(user, shares, class)?;
            if class == ShareClass::Locked && !self.locks.is_expired(&user, now) {
                return Err(PosumError::LockNotExpired {
                    unlock_timestamp: self.locks.unlock_timestamp(&user).unwrap_or(0),
                    now,
                });
            }
            let settlement =
                self.accrual.plan_settlement(Some(user), &self.snapshots(&user), now)?;
            self.accrual.apply_settlement(&settlement);
            self.vault.apply_withdraw(&plan);
            Ok(plan.assets_out)
        }

        fn claimable(&self, user: Address, now: u64) -> u128 {
            let projection = self.accrual.project(user, &self.snapshots(&user), now).unwrap();
            projection.claimable().unwrap()
        }

        fn points(&self, user: Address, now: u64) -> u128 {
            let projection = self.accrual.project(user, &self.snapshots(&user), now).unwrap();
            projection.points().unwrap()
        }
    }

    // ============================================================================
    // Positive Pool Scenarios
    // ============================================================================

    #[test]
    fn test_one_usdc_flex_preview() {
        let mut ledger = PositiveLedger::new(0, 0);
        let shares = ledger.deposit(alice(), ONE_USDC, ShareClass::Flex, 1_000);

        assert_eq!(shares, ONE_USDC);
        assert_eq!(ledger.vault.share_balance(&alice(), ShareClass::Flex), ONE_USDC);
        assert_eq!(ledger.vault.preview_withdraw(ONE_USDC).unwrap(), ONE_USDC);
    }

    #[test]
    fn test_seven_day_lock_boundary() {
        let mut ledger = PositiveLedger::new(0, 0);
        let t = 5_000;
        ledger.deposit(alice(), 100 * ONE_USDC, ShareClass::Locked, t);
        let unlock = t + WEEK;
        assert_eq!(ledger.locks.unlock_timestamp(&alice()), Some(unlock));

        assert_eq!(
            ledger.withdraw(alice(), 100 * ONE_USDC, ShareClass::Locked, unlock - 1),
            Err(PosumError::LockNotExpired { unlock_timestamp: unlock, now: unlock - 1 })
        );
        assert_eq!(
            ledger.withdraw(alice(), 100 * ONE_USDC, ShareClass::Locked, unlock),
            Ok(100 * ONE_USDC)
        );
    }

    #[test]
    fn test_locked_deposit_never_shortens_lock() {
        let mut ledger = PositiveLedger::new(0, 0);
        ledger.deposit(alice(), ONE_USDC, ShareClass::Locked, 0);
        ledger.deposit(alice(), ONE_USDC, ShareClass::Locked, 3 * 86_400);

        // The later deposit moved the unlock out, and flex deposits leave it alone
        assert_eq!(ledger.locks.unlock_timestamp(&alice()), Some(3 * 86_400 + WEEK));
        ledger.deposit(alice(), ONE_USDC, ShareClass::Flex, 4 * 86_400);
        assert_eq!(ledger.locks.unlock_timestamp(&alice()), Some(3 * 86_400 + WEEK));
    }

    #[test]
    fn test_locked_earns_points_at_one_and_a_half() {
        let mut ledger = PositiveLedger::new(0, ACCRUAL_PRECISION);
        ledger.deposit(alice(), 1_000, ShareClass::Flex, 0);
        ledger.deposit(bob(), 1_000, ShareClass::Locked, 0);

        assert_eq!(ledger.points(alice(), 100), 100_000);
        assert_eq!(ledger.points(bob(), 100), 150_000);
    }

    #[test]
    fn test_late_depositor_earns_nothing_retroactively() {
        let rate = ACCRUAL_PRECISION / 100;
        let mut ledger = PositiveLedger::new(rate, 0);
        ledger.deposit(alice(), 10_000, ShareClass::Flex, 0);
        ledger.deposit(bob(), 10_000, ShareClass::Flex, 50);

        assert_eq!(ledger.claimable(bob(), 50), 0);
        assert_eq!(ledger.claimable(alice(), 100), 10_000);
        assert_eq!(ledger.claimable(bob(), 100), 5_000);
    }

    #[test]
    fn test_round_trip_returns_deposit() {
        let mut ledger = PositiveLedger::new(0, 0);
        ledger.deposit(bob(), 7 * ONE_USDC, ShareClass::Flex, 0);
        let shares = ledger.deposit(alice(), 3 * ONE_USDC, ShareClass::Flex, 10);
        let assets = ledger.withdraw(alice(), shares, ShareClass::Flex, 20).unwrap();

        assert!(assets <= 3 * ONE_USDC);
        assert_eq!(assets, 3 * ONE_USDC);
        assert_eq!(ledger.vault.total_assets(), 7 * ONE_USDC);
    }

    #[test]
    fn test_conversion_keeps_totals() {
        let mut ledger = PositiveLedger::new(0, 0);
        ledger.deposit(alice(), 500, ShareClass::Locked, 0);
        ledger.deposit(alice(), 200, ShareClass::Flex, 0);

        let plan = ledger
            .vault
            .plan_convert(alice(), ShareClass::Locked, ShareClass::Flex, WEEK)
            .unwrap()
            .unwrap();
        ledger.vault.apply_convert(&plan);
        ledger.locks.release(&alice());

        assert_eq!(ledger.vault.share_balance(&alice(), ShareClass::Flex), 700);
        assert_eq!(ledger.vault.share_balance(&alice(), ShareClass::Locked), 0);
        assert_eq!(ledger.vault.total_shares(), 700);
        assert_eq!(ledger.vault.total_assets(), 700);
        assert!(ledger.locks.is_expired(&alice(), WEEK));
    }

    // ============================================================================
    // Degen Pool Scenario
    // ============================================================================

    #[test]
    fn test_degen_accrues_rate_times_elapsed() {
        let yield_rate = 3_000_000_000_000_000; // 0.003 per share per second, scaled
        let points_rate = ACCRUAL_PRECISION / 10;
        let mut vault = ShareVault::new([ShareClass::Single]);
        let mut accrual = RewardAccrualEngine::new(
            ACCRUAL_PRECISION,
            yield_rate,
            points_rate,
            [ShareClass::Single],
            0,
        );

        let t0 = 1_000;
        let snapshot = |vault: &ShareVault| ClassSnapshot {
            class: ShareClass::Single,
            total_shares: vault.class_shares(ShareClass::Single),
            user_balance: vault.share_balance(&alice(), ShareClass::Single),
            multiplier_bps: 20_000,
        };

        let plan = vault.plan_deposit(alice(), ONE_ETH, ShareClass::Single, t0).unwrap();
        let settlement = accrual
            .plan_settlement(Some(alice()), &[snapshot(&vault)], t0)
            .unwrap();
        accrual.apply_settlement(&settlement);
        vault.apply_deposit(&plan);

        let projection = accrual.project(alice(), &[snapshot(&vault)], t0 + 100).unwrap();
        assert_eq!(projection.claimable().unwrap(), yield_rate * 100);
        // 2x weight
        assert_eq!(projection.points().unwrap(), 2 * points_rate * 100);
    }

    #[test]
    fn test_usdc_pool_accrues_at_its_own_scale() {
        let scale = ONE_USDC;
        let rate = 1_000;
        let mut vault = ShareVault::new([ShareClass::Flex]);
        let mut accrual = RewardAccrualEngine::new(scale, rate, 0, [ShareClass::Flex], 0);
        let snapshot = |vault: &ShareVault| ClassSnapshot {
            class: ShareClass::Flex,
            total_shares: vault.class_shares(ShareClass::Flex),
            user_balance: vault.share_balance(&alice(), ShareClass::Flex),
            multiplier_bps: 10_000,
        };

        let plan = vault.plan_deposit(alice(), ONE_USDC, ShareClass::Flex, 0).unwrap();
        let settlement = accrual.plan_settlement(Some(alice()), &[snapshot(&vault)], 0).unwrap();
        accrual.apply_settlement(&settlement);
        vault.apply_deposit(&plan);

        // mulDiv(1e6, 1000 * 100, 1e6)
        let projection = accrual.project(alice(), &[snapshot(&vault)], 100).unwrap();
        assert_eq!(projection.claimable().unwrap(), 100_000);
    }

    // ============================================================================
    // Events + Errors
    // ============================================================================

    #[test]
    fn test_event_log_survives_encoding() {
        let mut log = EventLog::new();
        log.emit(PoolEvent::Deposited {
            pool_id: [4u8; 32],
            user: alice(),
            class: ShareClass::Locked,
            assets: ONE_USDC,
            shares: ONE_USDC,
            timestamp: 10,
        });
        log.emit(PoolEvent::LockExtended {
            pool_id: [4u8; 32],
            user: alice(),
            unlock_timestamp: 10 + WEEK,
            timestamp: 10,
        });

        let decoded: Vec<PoolEvent> = log
            .events()
            .map(|e| PoolEvent::from_bytes(&e.to_bytes()).unwrap())
            .collect();
        assert_eq!(decoded, log.to_vec());
        assert_eq!(log.filter_by_type(EventType::LockExtended).len(), 1);
    }
}

#[cfg(test)]
mod properties {
    use crate::scale::ACCRUAL_PRECISION;
    use crate::*;
    use proptest::prelude::*;

    const WEEK: u64 = 7 * 86_400;

    #[derive(Debug, Clone)]
    enum Op {
        Deposit { user: u8, amount: u128, locked: bool },
        Withdraw { user: u8, fraction_bps: u32, locked: bool },
        /// External gain credited to the pooled assets
        Yield { amount: u128 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, 1u128..1_000_000_000, any::<bool>())
                .prop_map(|(user, amount, locked)| Op::Deposit { user, amount, locked }),
            (0u8..4, 1u32..=10_000, any::<bool>()).prop_map(|(user, fraction_bps, locked)| {
                Op::Withdraw { user, fraction_bps, locked }
            }),
        ]
    }

    fn op_with_yield() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => op(),
            1 => (1u128..10_000_000).prop_map(|amount| Op::Yield { amount }),
        ]
    }

    fn redeemable_sum(vault: &ShareVault) -> u128 {
        vault
            .positions()
            .map(|(_, p)| vault.preview_withdraw(p.share_balance).unwrap())
            .sum()
    }

    fn addr(n: u8) -> Address {
        [n + 1; 32]
    }

    fn class_of(locked: bool) -> ShareClass {
        if locked {
            ShareClass::Locked
        } else {
            ShareClass::Flex
        }
    }

    proptest! {
        #[test]
        fn prop_assets_and_shares_conserved(ops in prop::collection::vec(op(), 1..40)) {
            let mut vault = ShareVault::new([ShareClass::Flex, ShareClass::Locked]);
            let mut deposited = 0u128;
            let mut withdrawn = 0u128;

            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Deposit { user, amount, locked } => {
                        let plan = vault
                            .plan_deposit(addr(user), amount, class_of(locked), step as u64)
                            .unwrap();
                        vault.apply_deposit(&plan);
                        deposited += amount;
                    }
                    Op::Yield { amount } => {
                        let value = vault.total_assets() + amount;
                        vault.sync_total_assets(value);
                        deposited += amount;
                    }
                    Op::Withdraw { user, fraction_bps, locked } => {
                        let class = class_of(locked);
                        let balance = vault.share_balance(&addr(user), class);
                        let shares = balance * fraction_bps as u128 / 10_000;
                        if shares == 0 {
                            continue;
                        }
                        let plan = vault.plan_withdraw(addr(user), shares, class).unwrap();
                        vault.apply_withdraw(&plan);
                        withdrawn += plan.assets_out;
                    }
                }
            }

            let position_sum: u128 = vault.positions().map(|(_, p)| p.share_balance).sum();
            prop_assert_eq!(position_sum, vault.total_shares());
            prop_assert_eq!(
                vault.class_shares(ShareClass::Flex) + vault.class_shares(ShareClass::Locked),
                vault.total_shares()
            );
            prop_assert_eq!(vault.total_assets(), deposited - withdrawn);
        }

        #[test]
        fn prop_redeemable_never_exceeds_assets(
            ops in prop::collection::vec(op_with_yield(), 1..40),
        ) {
            let mut vault = ShareVault::new([ShareClass::Flex, ShareClass::Locked]);

            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Deposit { user, amount, locked } => {
                        let planned =
                            vault.plan_deposit(addr(user), amount, class_of(locked), step as u64);
                        match planned {
                            Ok(plan) => vault.apply_deposit(&plan),
                            // Too small to mint a share at the current price
                            Err(PosumError::ZeroSharesMinted { .. }) => continue,
                            Err(err) => return Err(TestCaseError::fail(err.to_string())),
                        }
                    }
                    Op::Withdraw { user, fraction_bps, locked } => {
                        let class = class_of(locked);
                        let balance = vault.share_balance(&addr(user), class);
                        let shares = balance * fraction_bps as u128 / 10_000;
                        if shares == 0 {
                            continue;
                        }
                        let plan = vault.plan_withdraw(addr(user), shares, class).unwrap();
                        vault.apply_withdraw(&plan);
                    }
                    Op::Yield { amount } => {
                        let value = vault.total_assets() + amount;
                        vault.sync_total_assets(value);
                    }
                }
                prop_assert!(redeemable_sum(&vault) <= vault.total_assets());
            }
        }

        #[test]
        fn prop_round_trip_never_profits(
            seed in 1u128..1_000_000_000_000,
            amount in 1u128..1_000_000_000_000,
        ) {
            let mut vault = ShareVault::new([ShareClass::Flex]);
            let first = vault.plan_deposit(addr(0), seed, ShareClass::Flex, 0).unwrap();
            vault.apply_deposit(&first);

            let plan = vault.plan_deposit(addr(1), amount, ShareClass::Flex, 1).unwrap();
            vault.apply_deposit(&plan);
            let out = vault.preview_withdraw(plan.shares_minted).unwrap();
            prop_assert!(out <= amount);
        }

        #[test]
        fn prop_accrual_is_monotonic(
            balance in 1u128..1_000_000_000_000_000_000_000,
            yield_rate in 0u128..1_000_000_000_000_000_000,
            t1 in 0u64..1_000_000,
            dt in 0u64..1_000_000,
        ) {
            let mut accrual = RewardAccrualEngine::new(
                ACCRUAL_PRECISION,
                yield_rate,
                yield_rate,
                [ShareClass::Flex],
                0,
            );
            let user = addr(0);
            let before = ClassSnapshot {
                class: ShareClass::Flex,
                total_shares: 0,
                user_balance: 0,
                multiplier_bps: 15_000,
            };
            accrual.settle_user(user, before, 0).unwrap();

            let after = ClassSnapshot { total_shares: balance, user_balance: balance, ..before };
            let early = accrual.project(user, &[after], t1).unwrap();
            let late = accrual.project(user, &[after], t1 + dt).unwrap();
            prop_assert!(late.claimable().unwrap() >= early.claimable().unwrap());
            prop_assert!(late.points().unwrap() >= early.points().unwrap());
        }

        #[test]
        fn prop_lock_never_shortens(gaps in prop::collection::vec(0u64..2 * WEEK, 1..20)) {
            let mut locks = LockSchedule::new();
            let user = addr(0);
            let mut now = 0u64;
            let mut previous = 0u64;

            for gap in gaps {
                now += gap;
                let unlock = locks.register_or_extend(user, now, WEEK).unwrap();
                prop_assert!(unlock >= previous);
                prop_assert!(unlock >= now + WEEK);
                previous = unlock;
            }
        }
    }
}
