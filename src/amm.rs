//! Confidential constant-product AMM with access-gated price disclosure
//!
//! Two reserves over a pair of [`ConfidentialToken`]s. Liquidity providers
//! get no share token: the first deposit sets the price ratio.
//!
//! Disclosure gates:
//! - `listen()` authorizes exactly one `swap` or `get_price` by the caller
//! - the cooldown mode also requires `cooldown_secs` between `listen()` and `swap`
//! - `get_price_gated` skips the listener gate and reveals the price to
//!   anyone while it is at or above `price_reveal_threshold`

use log::debug;
use serde::Deserialize;

use amm_model::{spot_price, swap_leg, WAD};

use crate::address::Address;
use crate::confidential::Confidential;
use crate::error::{ContractError, Result};
use crate::runtime::Env;
use crate::storage::MapKey;
use crate::token::ConfidentialToken;

const OWNER: &str = "amm.owner";
const RESERVE_A: &str = "amm.reserve_a";
const RESERVE_B: &str = "amm.reserve_b";
const HAS_LISTENED: &str = "amm.has_listened";
const LAST_LISTEN: &str = "amm.last_listen";

/// Default listen-to-swap cooldown in seconds
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;

/// Listener gate in front of `swap` and `get_price`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ListenGate {
    /// No gate
    Disabled,
    /// One `listen()` authorizes one gated call
    SingleUse,
    /// Single use, and `swap` additionally waits `secs` after `listen()`
    Cooldown {
        #[serde(default = "default_cooldown")]
        secs: u64,
    },
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

/// Deployment parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AmmConfig {
    /// Fixed-point scale for swap and price math
    #[serde(deserialize_with = "crate::config::u128_from_u64")]
    pub wad: u128,
    pub listen_gate: ListenGate,
    /// Minimum price `get_price_gated` will disclose
    #[serde(deserialize_with = "crate::config::u128_from_u64")]
    pub price_reveal_threshold: u128,
}

impl Default for AmmConfig {
    fn default() -> Self {
        Self {
            wad: WAD,
            listen_gate: ListenGate::SingleUse,
            price_reveal_threshold: 0,
        }
    }
}

/// Output of a two-legged swap
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapOutcome {
    /// B paid out for the A leg
    pub amount_out_b: u128,
    /// A paid out for the B leg
    pub amount_out_a: u128,
}

/// Handle to a deployed price-reveal AMM
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceRevealAmm {
    address: Address,
    token_a: ConfidentialToken,
    token_b: ConfidentialToken,
    config: AmmConfig,
}

impl PriceRevealAmm {
    /// Deploy at `address`; the caller becomes the owner
    pub fn deploy(
        env: &mut Env<'_>,
        address: Address,
        token_a: ConfidentialToken,
        token_b: ConfidentialToken,
        config: AmmConfig,
    ) -> Result<Self> {
        if config.wad == 0 {
            return Err(ContractError::DivByZero);
        }
        if env.get_addr(address, OWNER, MapKey::None).is_some() {
            return Err(ContractError::Unauthorized);
        }
        env.set_addr(address, OWNER, MapKey::None, env.caller());
        debug!("amm {} deployed ({:?})", address, config.listen_gate);
        Ok(Self::at(address, token_a, token_b, config))
    }

    /// Handle to an AMM already deployed at `address`
    pub fn at(address: Address, token_a: ConfidentialToken, token_b: ConfidentialToken, config: AmmConfig) -> Self {
        Self {
            address,
            token_a,
            token_b,
            config,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &AmmConfig {
        &self.config
    }

    /// Authorize the caller's next gated call
    pub fn listen(&self, env: &mut Env<'_>) -> Result<()> {
        let caller = env.caller();
        let now = u128::from(env.block().timestamp);
        env.set_flag(self.address, HAS_LISTENED, MapKey::Addr(caller), true);
        env.set_uint(self.address, LAST_LISTEN, MapKey::Addr(caller), now);
        debug!("amm {}: {} listening at {}", self.address, caller, now);
        Ok(())
    }

    pub fn has_listened(&self, env: &Env<'_>, who: Address) -> bool {
        env.get_flag(self.address, HAS_LISTENED, MapKey::Addr(who))
    }

    /// Pull `amount_a`/`amount_b` from the caller into the reserves
    pub fn add_liquidity(&self, env: &mut Env<'_>, amount_a: u128, amount_b: u128) -> Result<()> {
        let (reserve_a, reserve_b) = self.reserves(env);
        let new_a = reserve_a.checked_add(amount_a).ok_or(ContractError::Overflow)?;
        let new_b = reserve_b.checked_add(amount_b).ok_or(ContractError::Overflow)?;

        let provider = env.caller();
        self.token_a
            .transfer_from(&mut env.call_as(self.address), provider, self.address, amount_a)?;
        self.token_b
            .transfer_from(&mut env.call_as(self.address), provider, self.address, amount_b)?;

        self.set_reserves(env, new_a, new_b);
        debug!("amm {}: {} added {}/{}", self.address, provider, amount_a, amount_b);
        Ok(())
    }

    /// Sell `amount_in_a` of A for B, then `amount_in_b` of B for A.
    ///
    /// The B leg is priced off the reserves left by the A leg.
    pub fn swap(&self, env: &mut Env<'_>, amount_in_a: u128, amount_in_b: u128) -> Result<SwapOutcome> {
        self.consume_listen(env, true)?;
        let trader = env.caller();
        let (reserve_a, reserve_b) = self.reserves(env);

        let forward = swap_leg(reserve_a, reserve_b, amount_in_a, self.config.wad)?;
        let reverse = swap_leg(forward.reserve_out, forward.reserve_in, amount_in_b, self.config.wad)?;

        if amount_in_a > 0 {
            self.token_a
                .transfer_from(&mut env.call_as(self.address), trader, self.address, amount_in_a)?;
            self.token_b
                .transfer(&mut env.call_as(self.address), trader, forward.amount_out)?;
        }
        if amount_in_b > 0 {
            self.token_b
                .transfer_from(&mut env.call_as(self.address), trader, self.address, amount_in_b)?;
            self.token_a
                .transfer(&mut env.call_as(self.address), trader, reverse.amount_out)?;
        }

        // reverse leg runs B -> A, so its in/out sides are swapped
        self.set_reserves(env, reverse.reserve_out, reverse.reserve_in);

        let outcome = SwapOutcome {
            amount_out_b: forward.amount_out,
            amount_out_a: reverse.amount_out,
        };
        debug!(
            "amm {}: {} swapped {}A/{}B -> {}B/{}A",
            self.address, trader, amount_in_a, amount_in_b, outcome.amount_out_b, outcome.amount_out_a
        );
        Ok(outcome)
    }

    /// Price of A in B, disclosed once per `listen()`
    pub fn get_price(&self, env: &mut Env<'_>) -> Result<Confidential<u128>> {
        self.consume_listen(env, false)?;
        self.compute_price(env).map(Confidential::new)
    }

    /// Price of A in B, disclosed to anyone while it meets the threshold
    pub fn get_price_gated(&self, env: &Env<'_>) -> Result<Confidential<u128>> {
        let price = self.compute_price(env)?;
        if price < self.config.price_reveal_threshold {
            return Err(ContractError::PriceBelowThreshold);
        }
        Ok(Confidential::new(price))
    }

    /// Raw reserves (owner only)
    pub fn get_reserves(&self, env: &Env<'_>) -> Result<(u128, u128)> {
        if env.get_addr(self.address, OWNER, MapKey::None) != Some(env.caller()) {
            return Err(ContractError::Unauthorized);
        }
        Ok(self.reserves(env))
    }

    fn compute_price(&self, env: &Env<'_>) -> Result<u128> {
        let (reserve_a, reserve_b) = self.reserves(env);
        Ok(spot_price(reserve_a, reserve_b, self.config.wad)?)
    }

    fn consume_listen(&self, env: &mut Env<'_>, enforce_cooldown: bool) -> Result<()> {
        let caller = env.caller();
        let cooldown = match self.config.listen_gate {
            ListenGate::Disabled => return Ok(()),
            ListenGate::SingleUse => None,
            ListenGate::Cooldown { secs } => Some(secs),
        };

        if !self.has_listened(env, caller) {
            return Err(ContractError::NotListened);
        }
        if let (Some(secs), true) = (cooldown, enforce_cooldown) {
            let ready_at = env
                .get_uint(self.address, LAST_LISTEN, MapKey::Addr(caller))
                .saturating_add(u128::from(secs));
            if u128::from(env.block().timestamp) < ready_at {
                return Err(ContractError::CooldownActive);
            }
        }

        env.set_flag(self.address, HAS_LISTENED, MapKey::Addr(caller), false);
        Ok(())
    }

    fn reserves(&self, env: &Env<'_>) -> (u128, u128) {
        (
            env.get_uint(self.address, RESERVE_A, MapKey::None),
            env.get_uint(self.address, RESERVE_B, MapKey::None),
        )
    }

    fn set_reserves(&self, env: &mut Env<'_>, reserve_a: u128, reserve_b: u128) {
        env.set_uint(self.address, RESERVE_A, MapKey::None, reserve_a);
        env.set_uint(self.address, RESERVE_B, MapKey::None, reserve_b);
    }
}
