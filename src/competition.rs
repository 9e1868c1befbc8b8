//! Pay-it-forward competition
//!
//! Stage machine `Pre -> During -> Post -> (Pre)` around a [`ChainLedger`].
//!
//! - `Pre`: the organizer picks a charity and approves businesses, approved
//!   businesses fund the pot, the organizer starts the clock
//! - `During`: customers buy through approved storefronts; paying forward
//!   extends the active chain, breaking the streak nukes it
//! - `Post`: the pot is split between the winning chain's participants and
//!   businesses and the charity
//!
//! Every start opens a new ledger round, so a round's payout only ever goes
//! to a chain built in that round.
//!
//! Purchases are priced in native value attached to the call. A purchase
//! that pays forward keeps `pot_cut` (and the rebate when nobody paid
//! forward before) in the contract; the rest goes to the storefront.

use log::{debug, info};
use serde::Deserialize;

use chain_model::{payout_terms, PayoutTerms};

use crate::address::Address;
use crate::chain::{ChainLedger, ChainLengthPolicy};
use crate::error::{ContractError, Result};
use crate::runtime::{native_balance, transfer_native, Env};
use crate::storage::MapKey;

const ORGANIZER: &str = "comp.organizer";
const STAGE: &str = "comp.stage";
const CHARITY: &str = "comp.charity";
const APPROVED: &str = "comp.approved";
const CONTRIBUTION: &str = "comp.contribution";
const START_TIME: &str = "comp.start_time";
const LAST_PIF: &str = "comp.last_pif";
const PER_LINK_PARTICIPANT: &str = "comp.per_link_participant";
const PER_LINK_BUSINESS: &str = "comp.per_link_business";
const DONATION: &str = "comp.donation";
const DONATION_CLAIMED: &str = "comp.donation_claimed";

/// Competition stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    #[default]
    Pre,
    During,
    Post,
}

impl Stage {
    fn to_u128(self) -> u128 {
        match self {
            Stage::Pre => 0,
            Stage::During => 1,
            Stage::Post => 2,
        }
    }

    fn from_u128(raw: u128) -> Self {
        match raw {
            1 => Stage::During,
            2 => Stage::Post,
            _ => Stage::Pre,
        }
    }
}

/// Competition parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompetitionConfig {
    /// Wall-clock length of the `During` stage
    pub duration_secs: u64,
    /// Refunded to a customer whose predecessor paid forward
    #[serde(deserialize_with = "crate::config::u128_from_u64")]
    pub rebate_flat: u128,
    /// Kept in the pot from every pay-forward purchase
    #[serde(deserialize_with = "crate::config::u128_from_u64")]
    pub pot_cut: u128,
    pub chain_length_policy: ChainLengthPolicy,
    /// Return to `Pre` once the pot is fully paid out
    pub reset_when_drained: bool,
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 7 * 24 * 60 * 60,
            rebate_flat: 1,
            pot_cut: 1,
            chain_length_policy: ChainLengthPolicy::CountLinks,
            reset_when_drained: false,
        }
    }
}

/// Business that sells through the competition.
///
/// `purchase` runs in a frame whose caller is the competition and whose
/// value has already been credited to [`StoreFront::address`]. An error
/// aborts the customer's whole transaction.
pub trait StoreFront {
    fn address(&self) -> Address;

    fn purchase(&self, env: &mut Env<'_>, product_id: u128) -> Result<()>;
}

/// Storefront that records units sold and revenue per product
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProductStore {
    address: Address,
}

impl ProductStore {
    const SOLD: &'static str = "store.sold";
    const REVENUE: &'static str = "store.revenue";

    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn units_sold(&self, env: &Env<'_>, product_id: u128) -> u128 {
        env.get_uint(self.address, Self::SOLD, MapKey::Id(product_id))
    }

    pub fn revenue(&self, env: &Env<'_>, product_id: u128) -> u128 {
        env.get_uint(self.address, Self::REVENUE, MapKey::Id(product_id))
    }
}

impl StoreFront for ProductStore {
    fn address(&self) -> Address {
        self.address
    }

    fn purchase(&self, env: &mut Env<'_>, product_id: u128) -> Result<()> {
        let key = MapKey::Id(product_id);
        let sold = self.units_sold(env, product_id).checked_add(1).ok_or(ContractError::Overflow)?;
        let paid = env.received(self.address)?;
        let revenue = self
            .revenue(env, product_id)
            .checked_add(paid)
            .ok_or(ContractError::Overflow)?;
        env.set_uint(self.address, Self::SOLD, key, sold);
        env.set_uint(self.address, Self::REVENUE, key, revenue);
        Ok(())
    }
}

/// Handle to a deployed competition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Competition {
    address: Address,
    ledger: ChainLedger,
    config: CompetitionConfig,
}

impl Competition {
    /// Deploy at `address` together with its ledger at `ledger_address`.
    /// The caller becomes the organizer, the competition the ledger's
    /// authority.
    pub fn deploy(
        env: &mut Env<'_>,
        address: Address,
        ledger_address: Address,
        config: CompetitionConfig,
    ) -> Result<Self> {
        if env.get_addr(address, ORGANIZER, MapKey::None).is_some() {
            return Err(ContractError::Unauthorized);
        }
        let ledger = ChainLedger::deploy(&mut env.call_as(address), ledger_address, config.chain_length_policy)?;
        env.set_addr(address, ORGANIZER, MapKey::None, env.caller());
        info!("competition {} deployed by {}, ledger {}", address, env.caller(), ledger_address);
        Ok(Self::at(address, ledger, config))
    }

    pub fn at(address: Address, ledger: ChainLedger, config: CompetitionConfig) -> Self {
        Self { address, ledger, config }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn ledger(&self) -> ChainLedger {
        self.ledger
    }

    pub fn config(&self) -> &CompetitionConfig {
        &self.config
    }

    pub fn stage(&self, env: &Env<'_>) -> Stage {
        Stage::from_u128(env.get_uint(self.address, STAGE, MapKey::None))
    }

    pub fn organizer(&self, env: &Env<'_>) -> Option<Address> {
        env.get_addr(self.address, ORGANIZER, MapKey::None)
    }

    pub fn charity(&self, env: &Env<'_>) -> Option<Address> {
        env.get_addr(self.address, CHARITY, MapKey::None)
    }

    pub fn is_approved(&self, env: &Env<'_>, business: Address) -> bool {
        env.get_flag(self.address, APPROVED, MapKey::Addr(business))
    }

    /// Total a business paid into the pot
    pub fn contribution_of(&self, env: &Env<'_>, business: Address) -> u128 {
        env.get_uint(self.address, CONTRIBUTION, MapKey::Addr(business))
    }

    /// Terms fixed when the competition ended (all zero before)
    pub fn payout_terms(&self, env: &Env<'_>) -> PayoutTerms {
        PayoutTerms {
            per_link_participant: env.get_uint(self.address, PER_LINK_PARTICIPANT, MapKey::None),
            per_link_business: env.get_uint(self.address, PER_LINK_BUSINESS, MapKey::None),
            donation: env.get_uint(self.address, DONATION, MapKey::None),
        }
    }

    pub fn select_charity(&self, env: &mut Env<'_>, charity: Address) -> Result<()> {
        self.only_organizer(env)?;
        self.at_stage(env, Stage::Pre)?;
        env.set_addr(self.address, CHARITY, MapKey::None, charity);
        debug!("competition {}: charity {}", self.address, charity);
        Ok(())
    }

    /// Add `business` to the allow-list
    pub fn approve_business(&self, env: &mut Env<'_>, business: Address) -> Result<()> {
        self.only_organizer(env)?;
        self.at_stage(env, Stage::Pre)?;
        env.set_flag(self.address, APPROVED, MapKey::Addr(business), true);
        debug!("competition {}: approved {}", self.address, business);
        Ok(())
    }

    /// Fund the pot with the attached value (approved businesses only)
    pub fn business_contribution(&self, env: &mut Env<'_>) -> Result<()> {
        self.only_approved(env)?;
        self.at_stage(env, Stage::Pre)?;
        let business = env.caller();
        let amount = env.received(self.address)?;
        let total = self
            .contribution_of(env, business)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        env.set_uint(self.address, CONTRIBUTION, MapKey::Addr(business), total);
        debug!("competition {}: {} contributed {}", self.address, business, amount);
        Ok(())
    }

    pub fn start_competition(&self, env: &mut Env<'_>) -> Result<()> {
        self.only_organizer(env)?;
        self.at_stage(env, Stage::Pre)?;
        if self.charity(env).is_none() {
            return Err(ContractError::CharityNotSet);
        }
        let now = u128::from(env.block().timestamp);
        let first_chain = self.ledger.open_round(&mut env.call_as(self.address))?;
        env.set_uint(self.address, START_TIME, MapKey::None, now);
        self.set_stage(env, Stage::During);
        info!("competition {} started at {} from chain {}", self.address, now, first_chain);
        Ok(())
    }

    /// Buy `product_id` from `storefront` with the attached value.
    ///
    /// | last | current | storefront gets            | rebate | chain      |
    /// |------|---------|----------------------------|--------|------------|
    /// | yes  | yes     | value - rebate - pot_cut   | yes    | forge link |
    /// | no   | yes     | value - rebate - pot_cut   | no     | forge link |
    /// | yes  | no      | value                      | yes    | nuke       |
    /// | no   | no      | value                      | no     | untouched  |
    ///
    /// Ends the competition when its duration has elapsed.
    pub fn make_comp_transaction(
        &self,
        env: &mut Env<'_>,
        current_pif: bool,
        storefront: &dyn StoreFront,
        product_id: u128,
    ) -> Result<()> {
        self.at_stage(env, Stage::During)?;
        let business = storefront.address();
        if !self.is_approved(env, business) {
            return Err(ContractError::Unauthorized);
        }

        let customer = env.caller();
        let value = env.received(self.address)?;
        let last_pif = env.get_flag(self.address, LAST_PIF, MapKey::None);

        let charge = if current_pif {
            value
                .checked_sub(self.config.rebate_flat)
                .and_then(|rest| rest.checked_sub(self.config.pot_cut))
                .ok_or(ContractError::InsufficientValue)?
        } else {
            value
        };

        transfer_native(env, self.address, business, charge)?;
        storefront.purchase(&mut env.call_with_value(self.address, business, charge), product_id)?;

        if last_pif {
            self.send(env, customer, self.config.rebate_flat)?;
        }

        let ledger = self.ledger;
        match (last_pif, current_pif) {
            (_, true) => ledger.forge_link(&mut env.call_as(self.address), customer, business)?,
            (true, false) => {
                ledger.nuke(&mut env.call_as(self.address))?;
            }
            (false, false) => {}
        }
        env.set_flag(self.address, LAST_PIF, MapKey::None, current_pif);

        debug!(
            "competition {}: {} bought {} from {} (pif {} -> {}, charge {})",
            self.address, customer, product_id, business, last_pif, current_pif, charge
        );

        if self.duration_elapsed(env) {
            self.finish(env)?;
        }
        Ok(())
    }

    /// End the competition once its duration has elapsed
    pub fn conclude(&self, env: &mut Env<'_>) -> Result<()> {
        self.at_stage(env, Stage::During)?;
        if !self.duration_elapsed(env) {
            return Err(ContractError::WrongPhase);
        }
        self.finish(env)
    }

    /// Pay the donation to the charity (charity or organizer). A second
    /// claim pays nothing.
    pub fn claim_donation(&self, env: &mut Env<'_>) -> Result<u128> {
        self.at_stage(env, Stage::Post)?;
        let charity = self.charity(env).ok_or(ContractError::CharityNotSet)?;
        let caller = env.caller();
        if caller != charity && self.organizer(env) != Some(caller) {
            return Err(ContractError::Unauthorized);
        }
        if env.get_flag(self.address, DONATION_CLAIMED, MapKey::None) {
            return Ok(0);
        }

        let donation = self.payout_terms(env).donation;
        env.set_flag(self.address, DONATION_CLAIMED, MapKey::None, true);
        self.send(env, charity, donation)?;
        info!("competition {}: donated {} to {}", self.address, donation, charity);

        self.reset_if_drained(env);
        Ok(donation)
    }

    /// Pay the caller for their links in the winning chain. A second call
    /// pays nothing.
    pub fn payout(&self, env: &mut Env<'_>) -> Result<u128> {
        self.at_stage(env, Stage::Post)?;
        let claimant = env.caller();
        let ledger = self.ledger;

        ledger.check_is_chain_longest(&mut env.call_as(self.address), claimant)?;
        let (stats, winner) = {
            let frame = env.call_as(self.address);
            (ledger.user_stats(&frame, claimant)?, ledger.overall_winning_chain_id(&frame)?)
        };

        let mut amount = 0;
        if stats.best_chain_id == Some(winner) {
            let terms = self.payout_terms(env);
            let per_link = if self.is_approved(env, claimant) {
                terms.per_link_business
            } else {
                terms.per_link_participant
            };
            amount = stats
                .best_chain_link_count
                .checked_mul(per_link)
                .ok_or(ContractError::Overflow)?;
            self.send(env, claimant, amount)?;
        }
        ledger.wallet_has_been_paid(&mut env.call_as(self.address), claimant)?;

        info!("competition {}: paid {} to {}", self.address, amount, claimant);
        self.reset_if_drained(env);
        Ok(amount)
    }

    /// During -> Post: archive the final chain and fix the payout terms
    fn finish(&self, env: &mut Env<'_>) -> Result<()> {
        let ledger = self.ledger;
        let active = ledger.active_chain(&env.call_as(self.address))?;
        if active.unique_participants > 0 || active.unique_businesses > 0 {
            ledger.nuke(&mut env.call_as(self.address))?;
        }

        let (winner, length) = {
            let frame = env.call_as(self.address);
            let winner = ledger.overall_winning_chain_id(&frame)?;
            (winner, ledger.chain_final_length(&frame, winner)?)
        };
        let pot = native_balance(env, self.address);
        let terms = payout_terms(pot, length)?;

        env.set_uint(self.address, PER_LINK_PARTICIPANT, MapKey::None, terms.per_link_participant);
        env.set_uint(self.address, PER_LINK_BUSINESS, MapKey::None, terms.per_link_business);
        env.set_uint(self.address, DONATION, MapKey::None, terms.donation);
        self.set_stage(env, Stage::Post);

        info!(
            "competition {} ended: chain {} won with {} links, pot {}, terms {:?}",
            self.address, winner, length, pot, terms
        );
        Ok(())
    }

    fn reset_if_drained(&self, env: &mut Env<'_>) {
        if !self.config.reset_when_drained || native_balance(env, self.address) > 0 {
            return;
        }
        env.clear(self.address, START_TIME, MapKey::None);
        env.clear(self.address, LAST_PIF, MapKey::None);
        env.clear(self.address, DONATION_CLAIMED, MapKey::None);
        env.clear(self.address, PER_LINK_PARTICIPANT, MapKey::None);
        env.clear(self.address, PER_LINK_BUSINESS, MapKey::None);
        env.clear(self.address, DONATION, MapKey::None);
        self.set_stage(env, Stage::Pre);
        info!("competition {}: pot drained, back to Pre", self.address);
    }

    fn duration_elapsed(&self, env: &Env<'_>) -> bool {
        let start = env.get_uint(self.address, START_TIME, MapKey::None);
        let now = u128::from(env.block().timestamp);
        now >= start.saturating_add(u128::from(self.config.duration_secs))
    }

    /// Pay `amount` out of the pot
    fn send(&self, env: &mut Env<'_>, to: Address, amount: u128) -> Result<()> {
        transfer_native(env, self.address, to, amount).map_err(|_| ContractError::TransferFailed)
    }

    fn set_stage(&self, env: &mut Env<'_>, stage: Stage) {
        env.set_uint(self.address, STAGE, MapKey::None, stage.to_u128());
    }

    fn at_stage(&self, env: &Env<'_>, stage: Stage) -> Result<()> {
        if self.stage(env) == stage {
            Ok(())
        } else {
            Err(ContractError::WrongPhase)
        }
    }

    fn only_organizer(&self, env: &Env<'_>) -> Result<()> {
        if self.organizer(env) == Some(env.caller()) {
            Ok(())
        } else {
            Err(ContractError::Unauthorized)
        }
    }

    fn only_approved(&self, env: &Env<'_>) -> Result<()> {
        if self.is_approved(env, env.caller()) {
            Ok(())
        } else {
            Err(ContractError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_roundtrip() {
        for stage in [Stage::Pre, Stage::During, Stage::Post] {
            assert_eq!(Stage::from_u128(stage.to_u128()), stage);
        }
        assert_eq!(Stage::from_u128(0), Stage::default());
    }

    #[test]
    fn test_default_config_counts_links() {
        let config = CompetitionConfig::default();
        assert_eq!(config.chain_length_policy, ChainLengthPolicy::CountLinks);
        assert_eq!(config.duration_secs, 604_800);
    }
}
