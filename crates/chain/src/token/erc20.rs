//! In-memory ERC20 ledger.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use super::{FungibleToken, MintableToken, TokenError};

/// ERC20-style token kept entirely in memory.
///
/// Balances and allowances live in `DashMap`s for lock-free reads; every
/// mutation goes through `write_lock` so a transfer debits and credits as one
/// step.
#[derive(Debug)]
pub struct Erc20Ledger {
    address: Address,
    symbol: String,
    decimals: u8,
    owner: Mutex<Address>,
    balances: DashMap<Address, U256>,
    allowances: DashMap<(Address, Address), U256>,
    total_supply: Mutex<U256>,
    write_lock: Mutex<()>,
}

impl Erc20Ledger {
    /// Create an empty token whose supply is controlled by `owner`.
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8, owner: Address) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            owner: Mutex::new(owner),
            balances: DashMap::new(),
            allowances: DashMap::new(),
            total_supply: Mutex::new(U256::ZERO),
            write_lock: Mutex::new(()),
        }
    }

    /// Token symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Total tokens in circulation.
    pub fn total_supply(&self) -> U256 {
        *self.total_supply.lock()
    }

    /// Hand ownership to a new account (e.g. the engine after deployment).
    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), TokenError> {
        let mut owner = self.owner.lock();
        if *owner != caller {
            return Err(TokenError::NotOwner { caller });
        }
        if new_owner == Address::ZERO {
            return Err(TokenError::ZeroAddress);
        }
        *owner = new_owner;
        Ok(())
    }

    fn balance(&self, account: &Address) -> U256 {
        self.balances.get(account).map(|b| *b).unwrap_or(U256::ZERO)
    }

    fn ensure_owner(&self, caller: Address) -> Result<(), TokenError> {
        if *self.owner.lock() != caller {
            return Err(TokenError::NotOwner { caller });
        }
        Ok(())
    }

    /// Debit and credit under the write lock already held by the caller.
    fn move_balance(&self, from: Address, to: Address, amount: U256) -> Result<(), TokenError> {
        if to == Address::ZERO {
            return Err(TokenError::ZeroAddress);
        }

        let from_balance = self.balance(&from);
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: from,
                balance: from_balance,
                needed: amount,
            });
        }

        if from == to {
            trace!(token = %self.symbol, %from, %amount, "Self transfer");
            return Ok(());
        }
        let credited = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;

        self.balances.insert(from, from_balance - amount);
        self.balances.insert(to, credited);

        trace!(token = %self.symbol, %from, %to, %amount, "Transfer");
        Ok(())
    }
}

impl FungibleToken for Erc20Ledger {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, account: Address) -> U256 {
        self.balance(&account)
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .map(|a| *a)
            .unwrap_or(U256::ZERO)
    }

    fn approve(&self, caller: Address, spender: Address, amount: U256) -> Result<(), TokenError> {
        if spender == Address::ZERO {
            return Err(TokenError::ZeroAddress);
        }
        let _guard = self.write_lock.lock();
        self.allowances.insert((caller, spender), amount);
        Ok(())
    }

    fn transfer(&self, caller: Address, to: Address, amount: U256) -> Result<(), TokenError> {
        let _guard = self.write_lock.lock();
        self.move_balance(caller, to, amount)
    }

    fn transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TokenError> {
        let _guard = self.write_lock.lock();

        let allowance = self.allowance(from, caller);
        if caller != from && allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: from,
                spender: caller,
                allowance,
                needed: amount,
            });
        }

        self.move_balance(from, to, amount)?;

        // U256::MAX is an unlimited approval
        if caller != from && allowance != U256::MAX {
            self.allowances.insert((from, caller), allowance - amount);
        }
        Ok(())
    }
}

impl MintableToken for Erc20Ledger {
    fn mint(&self, caller: Address, to: Address, amount: U256) -> Result<(), TokenError> {
        self.ensure_owner(caller)?;
        if to == Address::ZERO {
            return Err(TokenError::ZeroAddress);
        }
        if amount.is_zero() {
            return Err(TokenError::ZeroAmount);
        }

        let _guard = self.write_lock.lock();
        let mut supply = self.total_supply.lock();
        let new_supply = supply.checked_add(amount).ok_or(TokenError::Overflow)?;
        let new_balance = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;

        *supply = new_supply;
        self.balances.insert(to, new_balance);
        trace!(token = %self.symbol, %to, %amount, "Mint");
        Ok(())
    }

    fn burn(&self, caller: Address, amount: U256) -> Result<(), TokenError> {
        self.ensure_owner(caller)?;
        if amount.is_zero() {
            return Err(TokenError::ZeroAmount);
        }

        let _guard = self.write_lock.lock();
        let balance = self.balance(&caller);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: caller,
                balance,
                needed: amount,
            });
        }

        let mut supply = self.total_supply.lock();
        *supply = supply.saturating_sub(amount);
        self.balances.insert(caller, balance - amount);
        trace!(token = %self.symbol, %caller, %amount, "Burn");
        Ok(())
    }

    fn owner(&self) -> Address {
        *self.owner.lock()
    }
}
