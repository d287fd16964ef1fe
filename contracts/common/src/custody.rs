//! Asset Custody Module
//!
//! Movement of pooled assets between wallets and pool accounts. The pool
//! engine never touches balances directly; it asks an [`AssetCustody`]
//! implementation to pull deposits in and push withdrawals and claims out.
//!
//! ## Key Features
//!
//! - **Approvals**: Token deposits require an ERC20-style allowance granted
//!   to the pool account; native deposits do not
//! - **Distinct Failures**: Missing allowance and missing balance are
//!   reported as different errors
//! - **Conservation**: Transfers never create or destroy units

use std::collections::BTreeMap;

use crate::errors::{PosumError, PosumResult};
use crate::math;
use crate::types::{Address, AssetKind};

// ============================================================================
// Trait
// ============================================================================

/// Ledger of asset balances the engine moves funds through
pub trait AssetCustody: Send {
    /// Balance of `owner` in `asset`
    fn balance_of(&self, asset: &AssetKind, owner: &Address) -> u128;

    /// Amount `spender` may pull from `owner`
    fn allowance(&self, asset: &AssetKind, owner: &Address, spender: &Address) -> u128;

    /// Pull `amount` from `from` into the pool account `to`.
    ///
    /// Token transfers spend the allowance `from` granted to `to`.
    fn transfer_in(
        &mut self,
        asset: &AssetKind,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> PosumResult<()>;

    /// Push `amount` from the pool account `from` to `to`
    fn transfer_out(
        &mut self,
        asset: &AssetKind,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> PosumResult<()>;
}

/// Check that `owner` can fund a transfer of `amount` into `pool_account`.
///
/// Allowance is checked first for tokens, then balance.
pub fn verify_transfer_in<C: AssetCustody + ?Sized>(
    custody: &C,
    asset: &AssetKind,
    owner: &Address,
    pool_account: &Address,
    amount: u128,
) -> PosumResult<()> {
    if asset.requires_approval() {
        let allowance = custody.allowance(asset, owner, pool_account);
        if allowance < amount {
            return Err(PosumError::InsufficientAllowance {
                allowance,
                requested: amount,
            });
        }
    }
    let balance = custody.balance_of(asset, owner);
    if balance < amount {
        return Err(PosumError::InsufficientBalance {
            available: balance,
            requested: amount,
        });
    }
    Ok(())
}

// ============================================================================
// In-memory ledger
// ============================================================================

/// Simple balance and approval ledger
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    balances: BTreeMap<(AssetKind, Address), u128>,
    allowances: BTreeMap<(AssetKind, Address, Address), u128>,
}

impl InMemoryCustody {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `owner` out of thin air (genesis funding)
    pub fn mint(&mut self, asset: AssetKind, owner: Address, amount: u128) -> PosumResult<()> {
        let balance = self.balances.entry((asset, owner)).or_insert(0);
        *balance = math::checked_add(*balance, amount)?;
        Ok(())
    }

    /// Set the allowance `owner` grants `spender`
    pub fn approve(&mut self, asset: AssetKind, owner: Address, spender: Address, amount: u128) {
        self.allowances.insert((asset, owner, spender), amount);
    }

    /// Sum of every balance held in `asset`
    pub fn total_supply(&self, asset: &AssetKind) -> u128 {
        self.balances
            .iter()
            .filter(|((a, _), _)| a == asset)
            .fold(0u128, |acc, (_, b)| acc.saturating_add(*b))
    }

    fn move_balance(
        &mut self,
        asset: &AssetKind,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> PosumResult<()> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(PosumError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        let receiver = self.balance_of(asset, to);
        if from != to {
            let credited = math::checked_add(receiver, amount)?;
            self.balances.insert((*asset, *from), available - amount);
            self.balances.insert((*asset, *to), credited);
        }
        Ok(())
    }
}

impl AssetCustody for InMemoryCustody {
    fn balance_of(&self, asset: &AssetKind, owner: &Address) -> u128 {
        self.balances.get(&(*asset, *owner)).copied().unwrap_or(0)
    }

    fn allowance(&self, asset: &AssetKind, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(&(*asset, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer_in(
        &mut self,
        asset: &AssetKind,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> PosumResult<()> {
        verify_transfer_in(&*self, asset, from, to, amount)?;
        self.move_balance(asset, from, to, amount)?;
        if asset.requires_approval() {
            let remaining = self.allowance(asset, from, to) - amount;
            self.allowances.insert((*asset, *from, *to), remaining);
        }
        Ok(())
    }

    fn transfer_out(
        &mut self,
        asset: &AssetKind,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> PosumResult<()> {
        self.move_balance(asset, from, to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> AssetKind {
        AssetKind::Token { token: [0xaa; 32], decimals: 6 }
    }

    fn eth() -> AssetKind {
        AssetKind::Native { decimals: 18 }
    }

    fn user() -> Address {
        [1u8; 32]
    }

    fn pool() -> Address {
        [2u8; 32]
    }

    #[test]
    fn test_token_requires_allowance_first() {
        let mut custody = InMemoryCustody::new();
        custody.mint(usdc(), user(), 100).unwrap();

        assert_eq!(
            custody.transfer_in(&usdc(), &user(), &pool(), 50),
            Err(PosumError::InsufficientAllowance { allowance: 0, requested: 50 })
        );

        custody.approve(usdc(), user(), pool(), 500);
        assert_eq!(
            custody.transfer_in(&usdc(), &user(), &pool(), 200),
            Err(PosumError::InsufficientBalance { available: 100, requested: 200 })
        );
    }

    #[test]
    fn test_token_transfer_spends_allowance() {
        let mut custody = InMemoryCustody::new();
        custody.mint(usdc(), user(), 100).unwrap();
        custody.approve(usdc(), user(), pool(), 80);

        custody.transfer_in(&usdc(), &user(), &pool(), 30).unwrap();

        assert_eq!(custody.balance_of(&usdc(), &user()), 70);
        assert_eq!(custody.balance_of(&usdc(), &pool()), 30);
        assert_eq!(custody.allowance(&usdc(), &user(), &pool()), 50);
    }

    #[test]
    fn test_native_needs_no_approval() {
        let mut custody = InMemoryCustody::new();
        custody.mint(eth(), user(), 10).unwrap();
        custody.transfer_in(&eth(), &user(), &pool(), 10).unwrap();
        custody.transfer_out(&eth(), &pool(), &user(), 4).unwrap();

        assert_eq!(custody.balance_of(&eth(), &user()), 4);
        assert_eq!(custody.total_supply(&eth()), 10);
    }

    #[test]
    fn test_transfer_out_insufficient() {
        let mut custody = InMemoryCustody::new();
        assert_eq!(
            custody.transfer_out(&eth(), &pool(), &user(), 1),
            Err(PosumError::InsufficientBalance { available: 0, requested: 1 })
        );
    }
}
