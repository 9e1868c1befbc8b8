//! Confidential token ledger
//!
//! Owned-balance map over hidden unsigned amounts, shared by the AMMs, the
//! liquidity pool and the price-floor service. Balances are disclosed only
//! to their holder or to a trusted principal.
//!
//! Trusted principals (service contracts, AMMs) bypass allowances entirely
//! in `transfer_from`: their effective allowance is unlimited and is never
//! decremented.

use log::debug;

use crate::address::Address;
use crate::confidential::Confidential;
use crate::error::{ContractError, Result};
use crate::runtime::Env;
use crate::storage::MapKey;

const OWNER: &str = "token.owner";
const GATED: &str = "token.gated";
const UNLOCK_HEIGHT: &str = "token.unlock_height";
const TRUSTED: &str = "token.trusted";
const BALANCE: &str = "token.balance";
const ALLOWANCE: &str = "token.allowance";
const TOTAL_SUPPLY: &str = "token.total_supply";

/// Whitelist guard: open to trusted callers always, to everyone once the
/// chain is past `unlock_height`. No unlock height means no guard.
#[inline]
pub fn whitelist_open(caller_trusted: bool, height: u64, unlock_height: Option<u64>) -> bool {
    match unlock_height {
        None => true,
        Some(unlock) => caller_trusted || height > unlock,
    }
}

/// Handle to a deployed token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfidentialToken {
    address: Address,
}

impl ConfidentialToken {
    /// Deploy at `address`; the caller becomes the owner
    pub fn deploy(env: &mut Env<'_>, address: Address, unlock_height: Option<u64>) -> Result<Self> {
        if env.get_addr(address, OWNER, MapKey::None).is_some() {
            return Err(ContractError::Unauthorized);
        }
        env.set_addr(address, OWNER, MapKey::None, env.caller());
        if let Some(height) = unlock_height {
            env.set_flag(address, GATED, MapKey::None, true);
            env.set_uint(address, UNLOCK_HEIGHT, MapKey::None, u128::from(height));
        }
        debug!("token {} deployed by {}", address, env.caller());
        Ok(Self { address })
    }

    /// Handle to a token already deployed at `address`
    pub fn at(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self, env: &Env<'_>) -> Option<Address> {
        env.get_addr(self.address, OWNER, MapKey::None)
    }

    pub fn unlock_height(&self, env: &Env<'_>) -> Option<u64> {
        if !env.get_flag(self.address, GATED, MapKey::None) {
            return None;
        }
        u64::try_from(env.get_uint(self.address, UNLOCK_HEIGHT, MapKey::None)).ok()
    }

    pub fn is_trusted(&self, env: &Env<'_>, who: Address) -> bool {
        env.get_flag(self.address, TRUSTED, MapKey::Addr(who))
    }

    /// Grant or revoke unlimited `transfer_from` (owner only)
    pub fn set_trusted(&self, env: &mut Env<'_>, who: Address, trusted: bool) -> Result<()> {
        self.only_owner(env)?;
        env.set_flag(self.address, TRUSTED, MapKey::Addr(who), trusted);
        debug!("token {}: trusted[{}] = {}", self.address, who, trusted);
        Ok(())
    }

    pub fn total_supply(&self, env: &Env<'_>) -> u128 {
        env.get_uint(self.address, TOTAL_SUPPLY, MapKey::None)
    }

    /// Balance of `who`, disclosed to `who` itself or a trusted caller
    pub fn balance_of(&self, env: &Env<'_>, who: Address) -> Result<Confidential<u128>> {
        self.check_open(env)?;
        let caller = env.caller();
        if caller != who && !self.is_trusted(env, caller) {
            return Err(ContractError::Unauthorized);
        }
        Ok(Confidential::new(self.balance(env, who)))
    }

    /// Allowance granted by `owner` to `spender`, disclosed to either party
    pub fn allowance(&self, env: &Env<'_>, owner: Address, spender: Address) -> Result<Confidential<u128>> {
        let caller = env.caller();
        if caller != owner && caller != spender && !self.is_trusted(env, caller) {
            return Err(ContractError::Unauthorized);
        }
        Ok(Confidential::new(
            env.get_uint(self.address, ALLOWANCE, MapKey::Pair(owner, spender)),
        ))
    }

    /// Create `amount` for `to` (owner or trusted callers)
    pub fn mint(&self, env: &mut Env<'_>, to: Address, amount: u128) -> Result<()> {
        self.only_owner_or_trusted(env)?;

        let supply = self
            .total_supply(env)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        let balance = self
            .balance(env, to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;

        env.set_uint(self.address, TOTAL_SUPPLY, MapKey::None, supply);
        env.set_uint(self.address, BALANCE, MapKey::Addr(to), balance);
        debug!("token {}: mint {} to {}", self.address, amount, to);
        Ok(())
    }

    /// Destroy `amount` held by `from` (the holder itself, owner or trusted callers)
    pub fn burn(&self, env: &mut Env<'_>, from: Address, amount: u128) -> Result<()> {
        if env.caller() != from {
            self.only_owner_or_trusted(env)?;
        }

        let balance = self
            .balance(env, from)
            .checked_sub(amount)
            .ok_or(ContractError::InsufficientBalance)?;
        let supply = self
            .total_supply(env)
            .checked_sub(amount)
            .ok_or(ContractError::Underflow)?;

        env.set_uint(self.address, BALANCE, MapKey::Addr(from), balance);
        env.set_uint(self.address, TOTAL_SUPPLY, MapKey::None, supply);
        debug!("token {}: burn {} from {}", self.address, amount, from);
        Ok(())
    }

    /// Move `amount` from the caller to `to`
    pub fn transfer(&self, env: &mut Env<'_>, to: Address, amount: u128) -> Result<()> {
        self.check_open(env)?;
        let from = env.caller();
        self.move_balance(env, from, to, amount)
    }

    /// Move `amount` from `from` to `to`, spending the caller's allowance
    /// unless the caller is trusted
    pub fn transfer_from(&self, env: &mut Env<'_>, from: Address, to: Address, amount: u128) -> Result<()> {
        self.check_open(env)?;
        let spender = env.caller();

        if !self.is_trusted(env, spender) {
            let key = MapKey::Pair(from, spender);
            let remaining = env
                .get_uint(self.address, ALLOWANCE, key)
                .checked_sub(amount)
                .ok_or(ContractError::InsufficientAllowance)?;
            env.set_uint(self.address, ALLOWANCE, key, remaining);
        }

        self.move_balance(env, from, to, amount)
    }

    /// Set the caller's allowance for `spender` to `amount`
    pub fn approve(&self, env: &mut Env<'_>, spender: Address, amount: u128) -> Result<()> {
        let owner = env.caller();
        env.set_uint(self.address, ALLOWANCE, MapKey::Pair(owner, spender), amount);
        debug!("token {}: {} approved {} for {}", self.address, owner, spender, amount);
        Ok(())
    }

    fn balance(&self, env: &Env<'_>, who: Address) -> u128 {
        env.get_uint(self.address, BALANCE, MapKey::Addr(who))
    }

    fn move_balance(&self, env: &mut Env<'_>, from: Address, to: Address, amount: u128) -> Result<()> {
        let from_balance = self
            .balance(env, from)
            .checked_sub(amount)
            .ok_or(ContractError::InsufficientBalance)?;
        env.set_uint(self.address, BALANCE, MapKey::Addr(from), from_balance);

        // Read after the debit so a self-transfer nets to zero
        let to_balance = self
            .balance(env, to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        env.set_uint(self.address, BALANCE, MapKey::Addr(to), to_balance);

        debug!("token {}: {} -> {} ({})", self.address, from, to, amount);
        Ok(())
    }

    fn check_open(&self, env: &Env<'_>) -> Result<()> {
        let trusted = self.is_trusted(env, env.caller());
        if whitelist_open(trusted, env.block().height, self.unlock_height(env)) {
            Ok(())
        } else {
            Err(ContractError::Unauthorized)
        }
    }

    fn only_owner(&self, env: &Env<'_>) -> Result<()> {
        if self.owner(env) == Some(env.caller()) {
            Ok(())
        } else {
            Err(ContractError::Unauthorized)
        }
    }

    fn only_owner_or_trusted(&self, env: &Env<'_>) -> Result<()> {
        if self.owner(env) == Some(env.caller()) || self.is_trusted(env, env.caller()) {
            Ok(())
        } else {
            Err(ContractError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Call, Runtime};

    const OWNER_ADDR: Address = Address::from_low_u64(1);
    const ALICE: Address = Address::from_low_u64(2);
    const BOB: Address = Address::from_low_u64(3);
    const SERVICE: Address = Address::from_low_u64(4);

    fn setup(unlock_height: Option<u64>) -> (Runtime, ConfidentialToken) {
        let mut rt = Runtime::new();
        let addr = rt.new_address();
        let token = rt
            .execute(Call::new(OWNER_ADDR, addr), |env| {
                let token = ConfidentialToken::deploy(env, addr, unlock_height)?;
                token.mint(env, ALICE, 1_000)?;
                Ok(token)
            })
            .unwrap();
        (rt, token)
    }

    fn balance(rt: &mut Runtime, token: ConfidentialToken, who: Address) -> u128 {
        rt.query(who, |env| token.balance_of(env, who)).unwrap().reveal()
    }

    #[test]
    fn test_whitelist_predicate() {
        assert!(whitelist_open(false, 0, None));
        assert!(whitelist_open(true, 5, Some(10)));
        assert!(!whitelist_open(false, 10, Some(10)));
        assert!(whitelist_open(false, 11, Some(10)));
    }

    #[test]
    fn test_transfer() {
        let (mut rt, token) = setup(None);
        rt.execute(Call::new(ALICE, token.address()), |env| token.transfer(env, BOB, 400))
            .unwrap();
        assert_eq!(balance(&mut rt, token, ALICE), 600);
        assert_eq!(balance(&mut rt, token, BOB), 400);

        let result = rt.execute(Call::new(BOB, token.address()), |env| token.transfer(env, ALICE, 401));
        assert_eq!(result, Err(ContractError::InsufficientBalance));
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let (mut rt, token) = setup(None);
        rt.execute(Call::new(ALICE, token.address()), |env| token.transfer(env, ALICE, 300))
            .unwrap();
        assert_eq!(balance(&mut rt, token, ALICE), 1_000);
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let (mut rt, token) = setup(None);
        rt.execute(Call::new(ALICE, token.address()), |env| token.approve(env, BOB, 250))
            .unwrap();

        rt.execute(Call::new(BOB, token.address()), |env| token.transfer_from(env, ALICE, BOB, 200))
            .unwrap();
        let left = rt
            .query(BOB, |env| token.allowance(env, ALICE, BOB))
            .unwrap()
            .reveal();
        assert_eq!(left, 50);

        let result = rt.execute(Call::new(BOB, token.address()), |env| {
            token.transfer_from(env, ALICE, BOB, 51)
        });
        assert_eq!(result, Err(ContractError::InsufficientAllowance));
    }

    #[test]
    fn test_trusted_bypasses_allowance() {
        let (mut rt, token) = setup(None);
        rt.execute(Call::new(OWNER_ADDR, token.address()), |env| token.set_trusted(env, SERVICE, true))
            .unwrap();

        rt.execute(Call::new(SERVICE, token.address()), |env| {
            token.transfer_from(env, ALICE, SERVICE, 700)
        })
        .unwrap();

        // Allowance untouched, service can read any balance
        let allowance = rt
            .query(SERVICE, |env| token.allowance(env, ALICE, SERVICE))
            .unwrap()
            .reveal();
        assert_eq!(allowance, 0);
        let alice = rt.query(SERVICE, |env| token.balance_of(env, ALICE)).unwrap().reveal();
        assert_eq!(alice, 300);
    }

    #[test]
    fn test_balance_is_private() {
        let (mut rt, token) = setup(None);
        let result = rt.query(BOB, |env| token.balance_of(env, ALICE));
        assert_eq!(result.map(Confidential::reveal), Err(ContractError::Unauthorized));
    }

    #[test]
    fn test_gate_opens_after_unlock_height() {
        let (mut rt, token) = setup(Some(10));

        let result = rt.execute(Call::new(ALICE, token.address()), |env| token.transfer(env, BOB, 1));
        assert_eq!(result, Err(ContractError::Unauthorized));

        rt.advance(11, 0);
        rt.execute(Call::new(ALICE, token.address()), |env| token.transfer(env, BOB, 1))
            .unwrap();
        assert_eq!(balance(&mut rt, token, BOB), 1);
    }

    #[test]
    fn test_mint_and_burn_access() {
        let (mut rt, token) = setup(None);

        let result = rt.execute(Call::new(ALICE, token.address()), |env| token.mint(env, ALICE, 1));
        assert_eq!(result, Err(ContractError::Unauthorized));

        let result = rt.execute(Call::new(BOB, token.address()), |env| token.burn(env, ALICE, 1));
        assert_eq!(result, Err(ContractError::Unauthorized));

        rt.execute(Call::new(ALICE, token.address()), |env| token.burn(env, ALICE, 100))
            .unwrap();
        let supply = rt.query(ALICE, |env| Ok(token.total_supply(env))).unwrap();
        assert_eq!(supply, 900);
    }

    #[test]
    fn test_mint_overflow() {
        let (mut rt, token) = setup(None);
        let result = rt.execute(Call::new(OWNER_ADDR, token.address()), |env| {
            token.mint(env, BOB, u128::MAX)
        });
        assert_eq!(result, Err(ContractError::Overflow));
    }

    #[test]
    fn test_redeploy_rejected() {
        let (mut rt, token) = setup(None);
        let addr = token.address();
        let result = rt.execute(Call::new(ALICE, addr), |env| ConfidentialToken::deploy(env, addr, None));
        assert_eq!(result.map(|t| t.address()), Err(ContractError::Unauthorized));
    }
}
