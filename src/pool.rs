//! Internal constant-product pool with LP shares
//!
//! Owned by a service contract (the price-floor service). Unlike
//! [`PriceRevealAmm`](crate::amm::PriceRevealAmm) it issues LP shares,
//! requires ratio-preserving deposits once seeded, and exposes the
//! owner-only approximate quote functions.

use log::debug;

use amm_model::{burn_shares, calc_swap_input, calc_swap_output, mint_shares, swap_leg};

use crate::address::Address;
use crate::error::{ContractError, Result};
use crate::runtime::Env;
use crate::storage::MapKey;
use crate::token::ConfidentialToken;

const OWNER: &str = "pool.owner";
const RESERVE_A: &str = "pool.reserve_a";
const RESERVE_B: &str = "pool.reserve_b";
const SHARES: &str = "pool.shares";
const TOTAL_SUPPLY: &str = "pool.total_supply";

/// Handle to a deployed liquidity pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiquidityPool {
    address: Address,
    token_a: ConfidentialToken,
    token_b: ConfidentialToken,
    wad: u128,
}

impl LiquidityPool {
    /// Deploy at `address`; the caller becomes the owner
    pub fn deploy(
        env: &mut Env<'_>,
        address: Address,
        token_a: ConfidentialToken,
        token_b: ConfidentialToken,
        wad: u128,
    ) -> Result<Self> {
        if wad == 0 {
            return Err(ContractError::DivByZero);
        }
        if env.get_addr(address, OWNER, MapKey::None).is_some() {
            return Err(ContractError::Unauthorized);
        }
        env.set_addr(address, OWNER, MapKey::None, env.caller());
        debug!("pool {} deployed by {}", address, env.caller());
        Ok(Self::at(address, token_a, token_b, wad))
    }

    pub fn at(address: Address, token_a: ConfidentialToken, token_b: ConfidentialToken, wad: u128) -> Self {
        Self {
            address,
            token_a,
            token_b,
            wad,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn token_a(&self) -> ConfidentialToken {
        self.token_a
    }

    pub fn token_b(&self) -> ConfidentialToken {
        self.token_b
    }

    pub fn owner(&self, env: &Env<'_>) -> Option<Address> {
        env.get_addr(self.address, OWNER, MapKey::None)
    }

    pub fn reserves(&self, env: &Env<'_>) -> (u128, u128) {
        (
            env.get_uint(self.address, RESERVE_A, MapKey::None),
            env.get_uint(self.address, RESERVE_B, MapKey::None),
        )
    }

    pub fn total_supply(&self, env: &Env<'_>) -> u128 {
        env.get_uint(self.address, TOTAL_SUPPLY, MapKey::None)
    }

    pub fn shares_of(&self, env: &Env<'_>, who: Address) -> u128 {
        env.get_uint(self.address, SHARES, MapKey::Addr(who))
    }

    /// Deposit both assets and mint LP shares to the caller
    pub fn add_liquidity(&self, env: &mut Env<'_>, amount_a: u128, amount_b: u128) -> Result<u128> {
        let (reserve_a, reserve_b) = self.reserves(env);
        let supply = self.total_supply(env);
        let minted = mint_shares(amount_a, amount_b, reserve_a, reserve_b, supply)?;

        let provider = env.caller();
        self.token_a
            .transfer_from(&mut env.call_as(self.address), provider, self.address, amount_a)?;
        self.token_b
            .transfer_from(&mut env.call_as(self.address), provider, self.address, amount_b)?;

        let new_a = reserve_a.checked_add(amount_a).ok_or(ContractError::Overflow)?;
        let new_b = reserve_b.checked_add(amount_b).ok_or(ContractError::Overflow)?;
        let new_supply = supply.checked_add(minted).ok_or(ContractError::Overflow)?;
        let new_shares = self
            .shares_of(env, provider)
            .checked_add(minted)
            .ok_or(ContractError::Overflow)?;

        self.set_reserves(env, new_a, new_b);
        env.set_uint(self.address, TOTAL_SUPPLY, MapKey::None, new_supply);
        env.set_uint(self.address, SHARES, MapKey::Addr(provider), new_shares);

        debug!(
            "pool {}: {} added {}/{} for {} shares",
            self.address, provider, amount_a, amount_b, minted
        );
        Ok(minted)
    }

    /// Burn `shares` of the caller and pay out the pro-rata reserves
    pub fn remove_liquidity(&self, env: &mut Env<'_>, shares: u128) -> Result<(u128, u128)> {
        let provider = env.caller();
        let remaining = self
            .shares_of(env, provider)
            .checked_sub(shares)
            .ok_or(ContractError::InsufficientBalance)?;

        let (reserve_a, reserve_b) = self.reserves(env);
        let supply = self.total_supply(env);
        let (out_a, out_b) = burn_shares(shares, reserve_a, reserve_b, supply)?;

        let new_a = reserve_a.checked_sub(out_a).ok_or(ContractError::Underflow)?;
        let new_b = reserve_b.checked_sub(out_b).ok_or(ContractError::Underflow)?;
        let new_supply = supply.checked_sub(shares).ok_or(ContractError::Underflow)?;

        self.set_reserves(env, new_a, new_b);
        env.set_uint(self.address, TOTAL_SUPPLY, MapKey::None, new_supply);
        env.set_uint(self.address, SHARES, MapKey::Addr(provider), remaining);

        self.token_a.transfer(&mut env.call_as(self.address), provider, out_a)?;
        self.token_b.transfer(&mut env.call_as(self.address), provider, out_b)?;

        debug!(
            "pool {}: {} burned {} shares for {}/{}",
            self.address, provider, shares, out_a, out_b
        );
        Ok((out_a, out_b))
    }

    /// Sell `amount_in` of `token_in` for the other asset
    pub fn swap(&self, env: &mut Env<'_>, token_in: Address, amount_in: u128) -> Result<u128> {
        let a_to_b = self.direction(token_in)?;
        let (reserve_a, reserve_b) = self.reserves(env);
        let (reserve_in, reserve_out) = if a_to_b { (reserve_a, reserve_b) } else { (reserve_b, reserve_a) };
        let leg = swap_leg(reserve_in, reserve_out, amount_in, self.wad)?;

        if amount_in > 0 {
            let (input, output) = if a_to_b {
                (self.token_a, self.token_b)
            } else {
                (self.token_b, self.token_a)
            };
            let trader = env.caller();
            input.transfer_from(&mut env.call_as(self.address), trader, self.address, amount_in)?;
            output.transfer(&mut env.call_as(self.address), trader, leg.amount_out)?;
        }

        if a_to_b {
            self.set_reserves(env, leg.reserve_in, leg.reserve_out);
        } else {
            self.set_reserves(env, leg.reserve_out, leg.reserve_in);
        }
        debug!(
            "pool {}: {} swapped {} of {} for {}",
            self.address,
            env.caller(),
            amount_in,
            token_in,
            leg.amount_out
        );
        Ok(leg.amount_out)
    }

    /// Approximate output for selling `amount_in` of `token_in` (owner only)
    pub fn calc_swap_output(&self, env: &Env<'_>, token_in: Address, amount_in: u128) -> Result<u128> {
        self.only_owner(env)?;
        let (reserve_in, reserve_out) = self.oriented_reserves(env, token_in)?;
        Ok(calc_swap_output(reserve_in, reserve_out, amount_in)?)
    }

    /// Approximate input needed to buy `amount_out` of `token_out` (owner only)
    pub fn calc_swap_input(&self, env: &Env<'_>, token_out: Address, amount_out: u128) -> Result<u128> {
        self.only_owner(env)?;
        let token_in = if token_out == self.token_a.address() {
            self.token_b.address()
        } else if token_out == self.token_b.address() {
            self.token_a.address()
        } else {
            return Err(ContractError::Unauthorized);
        };
        let (reserve_in, reserve_out) = self.oriented_reserves(env, token_in)?;
        Ok(calc_swap_input(reserve_in, reserve_out, amount_out)?)
    }

    /// `true` for A -> B; tokens outside the pair are rejected
    fn direction(&self, token_in: Address) -> Result<bool> {
        if token_in == self.token_a.address() {
            Ok(true)
        } else if token_in == self.token_b.address() {
            Ok(false)
        } else {
            Err(ContractError::Unauthorized)
        }
    }

    fn oriented_reserves(&self, env: &Env<'_>, token_in: Address) -> Result<(u128, u128)> {
        let (reserve_a, reserve_b) = self.reserves(env);
        if self.direction(token_in)? {
            Ok((reserve_a, reserve_b))
        } else {
            Ok((reserve_b, reserve_a))
        }
    }

    fn only_owner(&self, env: &Env<'_>) -> Result<()> {
        if self.owner(env) == Some(env.caller()) {
            Ok(())
        } else {
            Err(ContractError::Unauthorized)
        }
    }

    fn set_reserves(&self, env: &mut Env<'_>, reserve_a: u128, reserve_b: u128) {
        env.set_uint(self.address, RESERVE_A, MapKey::None, reserve_a);
        env.set_uint(self.address, RESERVE_B, MapKey::None, reserve_b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Call, Runtime};

    const OWNER_ADDR: Address = Address::from_low_u64(1);
    const LP: Address = Address::from_low_u64(2);

    struct Fixture {
        rt: Runtime,
        pool: LiquidityPool,
    }

    fn setup() -> Fixture {
        let mut rt = Runtime::new();
        let (addr_a, addr_b, addr_pool) = (rt.new_address(), rt.new_address(), rt.new_address());
        let pool = rt
            .execute(Call::new(OWNER_ADDR, addr_pool), |env| {
                let token_a = ConfidentialToken::deploy(env, addr_a, None)?;
                let token_b = ConfidentialToken::deploy(env, addr_b, None)?;
                token_a.mint(env, LP, 10_000)?;
                token_b.mint(env, LP, 10_000)?;
                token_a.set_trusted(env, addr_pool, true)?;
                token_b.set_trusted(env, addr_pool, true)?;
                LiquidityPool::deploy(env, addr_pool, token_a, token_b, amm_model::WAD)
            })
            .unwrap();
        Fixture { rt, pool }
    }

    #[test]
    fn test_first_deposit_mints_sqrt() {
        let Fixture { mut rt, pool } = setup();
        let minted = rt
            .execute(Call::new(LP, pool.address()), |env| pool.add_liquidity(env, 400, 100))
            .unwrap();
        assert_eq!(minted, 200);

        let (supply, shares) = rt
            .query(LP, |env| Ok((pool.total_supply(env), pool.shares_of(env, LP))))
            .unwrap();
        assert_eq!(supply, 200);
        assert_eq!(shares, 200);
    }

    #[test]
    fn test_ratio_mismatch_rejected() {
        let Fixture { mut rt, pool } = setup();
        rt.execute(Call::new(LP, pool.address()), |env| pool.add_liquidity(env, 400, 100))
            .unwrap();

        let result = rt.execute(Call::new(LP, pool.address()), |env| pool.add_liquidity(env, 800, 100));
        assert_eq!(result, Err(ContractError::RatioMismatch));

        let reserves = rt.query(LP, |env| Ok(pool.reserves(env))).unwrap();
        assert_eq!(reserves, (400, 100));
    }

    #[test]
    fn test_remove_liquidity() {
        let Fixture { mut rt, pool } = setup();
        rt.execute(Call::new(LP, pool.address()), |env| pool.add_liquidity(env, 400, 100))
            .unwrap();

        let out = rt
            .execute(Call::new(LP, pool.address()), |env| pool.remove_liquidity(env, 50))
            .unwrap();
        assert_eq!(out, (100, 25));

        let result = rt.execute(Call::new(LP, pool.address()), |env| pool.remove_liquidity(env, 151));
        assert_eq!(result, Err(ContractError::InsufficientBalance));
    }

    #[test]
    fn test_quotes_are_owner_only() {
        let Fixture { mut rt, pool } = setup();
        rt.execute(Call::new(LP, pool.address()), |env| pool.add_liquidity(env, 100, 1_000))
            .unwrap();
        let token_a = pool.token_a().address();
        let token_b = pool.token_b().address();

        let result = rt.query(LP, |env| pool.calc_swap_output(env, token_a, 30));
        assert_eq!(result, Err(ContractError::Unauthorized));

        let out = rt
            .query(OWNER_ADDR, |env| pool.calc_swap_output(env, token_a, 30))
            .unwrap();
        assert_eq!(out, 250);

        let input = rt
            .query(OWNER_ADDR, |env| pool.calc_swap_input(env, token_b, 250))
            .unwrap();
        assert_eq!(input, 33);
    }

    #[test]
    fn test_swap_updates_reserves() {
        let Fixture { mut rt, pool } = setup();
        rt.execute(Call::new(LP, pool.address()), |env| pool.add_liquidity(env, 1_000, 1_000))
            .unwrap();
        let token_b = pool.token_b().address();

        let out = rt
            .execute(Call::new(LP, pool.address()), |env| pool.swap(env, token_b, 100))
            .unwrap();
        assert!(out > 0 && out < 100);

        let (reserve_a, reserve_b) = rt.query(LP, |env| Ok(pool.reserves(env))).unwrap();
        assert_eq!(reserve_b, 1_100);
        assert_eq!(reserve_a, 1_000 - out);
    }
}
