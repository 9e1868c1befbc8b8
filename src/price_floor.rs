//! Reward token price floor
//!
//! Operators earn reward tokens from an oracle and cash them out through
//! the service's own [`LiquidityPool`] at most once per epoch, capped at
//! `max_withdrawal_per_epoch` payment tokens. Customers paying for the
//! service buy reward tokens back through the same pool, and the service
//! burns everything it bought. Withdrawals drain the pool's payment side
//! while buybacks refill it.
//!
//! The service must be trusted on both tokens: it mints rewards, reads
//! balances and pulls tokens from users without allowances. The pool is
//! paid through plain allowances granted by the service.

use log::{debug, info};
use serde::Deserialize;

use chain_model::{epoch_of, WithdrawalWindow};

use crate::address::Address;
use crate::error::{ContractError, Result};
use crate::pool::LiquidityPool;
use crate::runtime::Env;
use crate::storage::MapKey;
use crate::token::ConfidentialToken;

const OWNER: &str = "floor.owner";
const ORACLE: &str = "floor.oracle";
const EPOCH_AMOUNT: &str = "floor.epoch_withdrawal_amt";
const HAS_WITHDRAWN: &str = "floor.has_withdrawn";
const LAST_EPOCH: &str = "floor.last_withdrawal_epoch";

/// Withdrawal limits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PriceFloorConfig {
    pub blocks_per_epoch: u64,
    /// Payment tokens one principal may receive per epoch
    #[serde(deserialize_with = "crate::config::u128_from_u64")]
    pub max_withdrawal_per_epoch: u128,
}

impl Default for PriceFloorConfig {
    fn default() -> Self {
        Self {
            blocks_per_epoch: 7_200,
            max_withdrawal_per_epoch: 1_000 * amm_model::WAD,
        }
    }
}

/// Handle to a deployed price-floor service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceFloorService {
    address: Address,
    reward: ConfidentialToken,
    payment: ConfidentialToken,
    pool: LiquidityPool,
    config: PriceFloorConfig,
}

impl PriceFloorService {
    /// Deploy at `address` with a reward/payment pool at `pool_address`.
    /// The caller becomes the owner, the service the pool's owner.
    #[allow(clippy::too_many_arguments)]
    pub fn deploy(
        env: &mut Env<'_>,
        address: Address,
        pool_address: Address,
        reward: ConfidentialToken,
        payment: ConfidentialToken,
        oracle: Address,
        pool_wad: u128,
        config: PriceFloorConfig,
    ) -> Result<Self> {
        if config.blocks_per_epoch == 0 {
            return Err(ContractError::DivByZero);
        }
        if env.get_addr(address, OWNER, MapKey::None).is_some() {
            return Err(ContractError::Unauthorized);
        }
        let pool = LiquidityPool::deploy(&mut env.call_as(address), pool_address, reward, payment, pool_wad)?;
        env.set_addr(address, OWNER, MapKey::None, env.caller());
        env.set_addr(address, ORACLE, MapKey::None, oracle);
        info!(
            "price floor {} deployed by {}, pool {}, oracle {}",
            address,
            env.caller(),
            pool_address,
            oracle
        );
        Ok(Self::at(address, reward, payment, pool, config))
    }

    pub fn at(
        address: Address,
        reward: ConfidentialToken,
        payment: ConfidentialToken,
        pool: LiquidityPool,
        config: PriceFloorConfig,
    ) -> Self {
        Self {
            address,
            reward,
            payment,
            pool,
            config,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn pool(&self) -> LiquidityPool {
        self.pool
    }

    pub fn config(&self) -> &PriceFloorConfig {
        &self.config
    }

    pub fn owner(&self, env: &Env<'_>) -> Option<Address> {
        env.get_addr(self.address, OWNER, MapKey::None)
    }

    pub fn oracle(&self, env: &Env<'_>) -> Option<Address> {
        env.get_addr(self.address, ORACLE, MapKey::None)
    }

    /// Move reward and payment tokens from the owner into the pool.
    /// Returns the LP shares, held by the service.
    pub fn seed_liquidity(&self, env: &mut Env<'_>, reward_amount: u128, payment_amount: u128) -> Result<u128> {
        if self.owner(env) != Some(env.caller()) {
            return Err(ContractError::Unauthorized);
        }
        let owner = env.caller();
        let mut frame = env.call_as(self.address);
        self.reward.transfer_from(&mut frame, owner, self.address, reward_amount)?;
        self.payment.transfer_from(&mut frame, owner, self.address, payment_amount)?;
        self.reward.approve(&mut frame, self.pool.address(), reward_amount)?;
        self.payment.approve(&mut frame, self.pool.address(), payment_amount)?;
        let shares = self.pool.add_liquidity(&mut frame, reward_amount, payment_amount)?;

        info!(
            "price floor {}: seeded {} reward / {} payment",
            self.address, reward_amount, payment_amount
        );
        Ok(shares)
    }

    /// Mint `amount` reward tokens to `operator` (oracle only)
    pub fn allocate_reward(&self, env: &mut Env<'_>, operator: Address, amount: u128) -> Result<()> {
        if self.oracle(env) != Some(env.caller()) {
            return Err(ContractError::Unauthorized);
        }
        self.reward.mint(&mut env.call_as(self.address), operator, amount)?;
        debug!("price floor {}: allocated {} to {}", self.address, amount, operator);
        Ok(())
    }

    /// Swap the caller's reward balance for payment tokens, once per epoch.
    ///
    /// When the quote for the full balance exceeds the cap, only the reward
    /// needed for the cap is sold, or the whole balance when the cap cannot
    /// be quoted against the pool. Quotes are approximate, so the payout is
    /// clamped to the cap again after the swap and any excess stays with
    /// the service.
    pub fn withdraw(&self, env: &mut Env<'_>) -> Result<u128> {
        let operator = env.caller();
        let epoch = epoch_of(env.block().height, self.config.blocks_per_epoch)?;
        let window = self.window(env, operator);
        // fail before any quoting or transfer
        window.record(epoch, 0)?;

        let cap = self.config.max_withdrawal_per_epoch;
        let mut frame = env.call_as(self.address);

        let balance = self.reward.balance_of(&frame, operator)?.reveal();
        if balance == 0 {
            return Err(ContractError::InsufficientBalance);
        }
        let quote = self.pool.calc_swap_output(&frame, self.reward.address(), balance)?;
        let reward_in = if quote > cap {
            match self.pool.calc_swap_input(&frame, self.payment.address(), cap) {
                Ok(input) => input.min(balance),
                // cap too close to the payment reserve to quote: sell it all
                Err(ContractError::DivByZero | ContractError::Underflow) => balance,
                Err(err) => return Err(err),
            }
        } else {
            balance
        };

        self.reward
            .transfer_from(&mut frame, operator, self.address, reward_in)?;
        self.reward.approve(&mut frame, self.pool.address(), reward_in)?;
        let proceeds = self.pool.swap(&mut frame, self.reward.address(), reward_in)?;
        let paid = proceeds.min(cap);
        self.payment.transfer(&mut frame, operator, paid)?;

        let window = window.record(epoch, paid)?;
        self.store_window(env, operator, window);

        info!(
            "price floor {}: {} withdrew {} reward for {} payment in epoch {}",
            self.address, operator, reward_in, paid, epoch
        );
        Ok(paid)
    }

    /// Buy reward tokens with `amount` payment tokens from the caller and
    /// burn the service's whole reward balance. Returns the amount burned.
    pub fn pay_for_service(&self, env: &mut Env<'_>, amount: u128) -> Result<u128> {
        let customer = env.caller();
        let mut frame = env.call_as(self.address);

        self.payment
            .transfer_from(&mut frame, customer, self.address, amount)?;
        self.payment.approve(&mut frame, self.pool.address(), amount)?;
        self.pool.swap(&mut frame, self.payment.address(), amount)?;

        let held = self.reward.balance_of(&frame, self.address)?.reveal();
        self.reward.burn(&mut frame, self.address, held)?;

        info!(
            "price floor {}: {} paid {}, burned {} reward",
            self.address, customer, amount, held
        );
        Ok(held)
    }

    /// Last withdrawal of `who` (themselves or the owner)
    pub fn withdrawal_record(&self, env: &Env<'_>, who: Address) -> Result<WithdrawalWindow> {
        let caller = env.caller();
        if caller != who && self.owner(env) != Some(caller) {
            return Err(ContractError::Unauthorized);
        }
        Ok(self.window(env, who))
    }

    fn window(&self, env: &Env<'_>, who: Address) -> WithdrawalWindow {
        let key = MapKey::Addr(who);
        let last_withdrawal_epoch = if env.get_flag(self.address, HAS_WITHDRAWN, key) {
            u64::try_from(env.get_uint(self.address, LAST_EPOCH, key)).ok()
        } else {
            None
        };
        WithdrawalWindow {
            epoch_withdrawal_amt: env.get_uint(self.address, EPOCH_AMOUNT, key),
            last_withdrawal_epoch,
        }
    }

    fn store_window(&self, env: &mut Env<'_>, who: Address, window: WithdrawalWindow) {
        let key = MapKey::Addr(who);
        env.set_uint(self.address, EPOCH_AMOUNT, key, window.epoch_withdrawal_amt);
        if let Some(epoch) = window.last_withdrawal_epoch {
            env.set_flag(self.address, HAS_WITHDRAWN, key, true);
            env.set_uint(self.address, LAST_EPOCH, key, u128::from(epoch));
        }
    }
}
