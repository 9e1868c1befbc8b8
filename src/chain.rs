//! Pay-it-forward chain ledger
//!
//! Tracks one active chain of linked participant/business visits, archives
//! each chain's score when it is nuked and remembers, per principal, the
//! best chain they ever took part in. Every operation, getters included, is
//! restricted to the ledger's authority (the competition that deployed it).
//!
//! Link counts are reset lazily: a principal's count is zeroed the first
//! time they show up in a newer chain, not when the old chain is nuked.
//!
//! [`ChainLedger::open_round`] starts a new round at the active chain.
//! Chains archived before it keep their scores but count as zero when
//! picking the winner or a principal's best chain.

use log::{debug, info};
use serde::Deserialize;

use chain_model::chain_score;

use crate::address::Address;
use crate::error::{ContractError, Result};
use crate::runtime::Env;
use crate::storage::MapKey;

const AUTHORITY: &str = "chain.authority";
const ACTIVE_ID: &str = "chain.active_id";
const UNIQUE_PARTICIPANTS: &str = "chain.unique_participants";
const UNIQUE_BUSINESSES: &str = "chain.unique_businesses";
const CHAIN_LENGTH: &str = "chain.length";
const LINKS: &str = "chain.links";
const JOINED: &str = "chain.joined";
const LATEST_CHAIN: &str = "chain.latest";
const HAS_BEST: &str = "chain.has_best";
const BEST_CHAIN: &str = "chain.best";
const BEST_LINKS: &str = "chain.best_links";
const FINAL_SCORE: &str = "chain.final_score";
const FINAL_LENGTH: &str = "chain.final_length";
const WINNER: &str = "chain.winner";
const ROUND_START: &str = "chain.round_start";

/// Whether `forge_link` grows the active chain's length
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainLengthPolicy {
    /// Length stays zero until the chain is nuked
    #[default]
    Reserved,
    /// One unit per forged link
    CountLinks,
}

/// Snapshot of the active chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActiveChain {
    pub chain_id: u128,
    pub unique_participants: u128,
    pub unique_businesses: u128,
    pub chain_length: u128,
}

/// Per-principal chain history
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserStats {
    /// Last chain the principal joined, `None` before the first visit
    pub latest_chain_id: Option<u128>,
    /// Highest-scoring archived chain the principal took part in
    pub best_chain_id: Option<u128>,
    /// Links in the best chain; zeroed once paid
    pub best_chain_link_count: u128,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Participant,
    Business,
}

impl Role {
    fn counter(self) -> &'static str {
        match self {
            Role::Participant => UNIQUE_PARTICIPANTS,
            Role::Business => UNIQUE_BUSINESSES,
        }
    }
}

/// Handle to a deployed chain ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainLedger {
    address: Address,
    policy: ChainLengthPolicy,
}

impl ChainLedger {
    /// Deploy at `address`; the caller becomes the authority.
    /// The first active chain has id 0.
    pub fn deploy(env: &mut Env<'_>, address: Address, policy: ChainLengthPolicy) -> Result<Self> {
        if env.get_addr(address, AUTHORITY, MapKey::None).is_some() {
            return Err(ContractError::Unauthorized);
        }
        env.set_addr(address, AUTHORITY, MapKey::None, env.caller());
        debug!("chain ledger {} deployed, authority {}", address, env.caller());
        Ok(Self::at(address, policy))
    }

    pub fn at(address: Address, policy: ChainLengthPolicy) -> Self {
        Self { address, policy }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn policy(&self) -> ChainLengthPolicy {
        self.policy
    }

    /// Record a participant visit to the active chain
    pub fn record_participant_visit(&self, env: &mut Env<'_>, participant: Address) -> Result<()> {
        self.only_authority(env)?;
        self.record_visit(env, participant, Role::Participant)
    }

    /// Record a business visit to the active chain
    pub fn record_business_visit(&self, env: &mut Env<'_>, business: Address) -> Result<()> {
        self.only_authority(env)?;
        self.record_visit(env, business, Role::Business)
    }

    /// Link `participant` and `business` in the active chain
    pub fn forge_link(&self, env: &mut Env<'_>, participant: Address, business: Address) -> Result<()> {
        self.only_authority(env)?;
        self.record_visit(env, participant, Role::Participant)?;
        self.record_visit(env, business, Role::Business)?;

        if self.policy == ChainLengthPolicy::CountLinks {
            let length = env
                .get_uint(self.address, CHAIN_LENGTH, MapKey::None)
                .checked_add(1)
                .ok_or(ContractError::Overflow)?;
            env.set_uint(self.address, CHAIN_LENGTH, MapKey::None, length);
        }
        debug!(
            "chain {}: link {} -> {} in chain {}",
            self.address,
            participant,
            business,
            self.active_id(env)
        );
        Ok(())
    }

    /// Archive the active chain and start the next one. Returns the
    /// archived score.
    pub fn nuke(&self, env: &mut Env<'_>) -> Result<u128> {
        self.only_authority(env)?;
        let chain = self.load_active(env);
        let score = chain_score(chain.unique_businesses, chain.unique_participants)?;
        let next_id = chain.chain_id.checked_add(1).ok_or(ContractError::Overflow)?;

        let id = MapKey::Id(chain.chain_id);
        env.set_uint(self.address, FINAL_SCORE, id, score);
        env.set_uint(self.address, FINAL_LENGTH, id, chain.chain_length);

        let winner = env.get_uint(self.address, WINNER, MapKey::None);
        if score > self.round_score(env, winner) {
            env.set_uint(self.address, WINNER, MapKey::None, chain.chain_id);
        }

        env.set_uint(self.address, CHAIN_LENGTH, MapKey::None, 0);
        env.set_uint(self.address, UNIQUE_PARTICIPANTS, MapKey::None, 0);
        env.set_uint(self.address, UNIQUE_BUSINESSES, MapKey::None, 0);
        env.set_uint(self.address, ACTIVE_ID, MapKey::None, next_id);

        info!(
            "chain {}: nuked chain {} (score {}, length {}), winner {}",
            self.address,
            chain.chain_id,
            score,
            chain.chain_length,
            env.get_uint(self.address, WINNER, MapKey::None)
        );
        Ok(score)
    }

    /// Promote `who`'s latest chain to their best chain if it scored
    /// strictly higher. The link count is taken from the current counter,
    /// which still belongs to the latest chain until `who` joins a new one.
    pub fn check_is_chain_longest(&self, env: &mut Env<'_>, who: Address) -> Result<()> {
        self.only_authority(env)?;
        self.reconcile_best(env, who);
        Ok(())
    }

    /// Start a new round at the active chain and make it the provisional
    /// winner
    pub fn open_round(&self, env: &mut Env<'_>) -> Result<u128> {
        self.only_authority(env)?;
        let first = self.active_id(env);
        env.set_uint(self.address, ROUND_START, MapKey::None, first);
        env.set_uint(self.address, WINNER, MapKey::None, first);
        debug!("chain {}: round opened at chain {}", self.address, first);
        Ok(first)
    }

    /// First chain of the current round
    pub fn round_start(&self, env: &Env<'_>) -> Result<u128> {
        self.only_authority(env)?;
        Ok(env.get_uint(self.address, ROUND_START, MapKey::None))
    }

    /// Zero `who`'s best-chain link count so later payouts pay nothing
    pub fn wallet_has_been_paid(&self, env: &mut Env<'_>, who: Address) -> Result<()> {
        self.only_authority(env)?;
        env.set_uint(self.address, BEST_LINKS, MapKey::Addr(who), 0);
        Ok(())
    }

    pub fn active_chain(&self, env: &Env<'_>) -> Result<ActiveChain> {
        self.only_authority(env)?;
        Ok(self.load_active(env))
    }

    /// Archived score of `chain_id` (0 for chains not yet nuked)
    pub fn chain_final_score(&self, env: &Env<'_>, chain_id: u128) -> Result<u128> {
        self.only_authority(env)?;
        Ok(self.final_score(env, chain_id))
    }

    /// Archived length of `chain_id` (0 for chains not yet nuked)
    pub fn chain_final_length(&self, env: &Env<'_>, chain_id: u128) -> Result<u128> {
        self.only_authority(env)?;
        Ok(env.get_uint(self.address, FINAL_LENGTH, MapKey::Id(chain_id)))
    }

    pub fn overall_winning_chain_id(&self, env: &Env<'_>) -> Result<u128> {
        self.only_authority(env)?;
        Ok(env.get_uint(self.address, WINNER, MapKey::None))
    }

    pub fn user_stats(&self, env: &Env<'_>, who: Address) -> Result<UserStats> {
        self.only_authority(env)?;
        Ok(UserStats {
            latest_chain_id: self.latest_chain(env, who),
            best_chain_id: self.best_chain(env, who),
            best_chain_link_count: env.get_uint(self.address, BEST_LINKS, MapKey::Addr(who)),
        })
    }

    /// Links `who` forged in the chain they last joined
    pub fn link_count(&self, env: &Env<'_>, who: Address) -> Result<u128> {
        self.only_authority(env)?;
        Ok(env.get_uint(self.address, LINKS, MapKey::Addr(who)))
    }

    fn record_visit(&self, env: &mut Env<'_>, who: Address, role: Role) -> Result<()> {
        let active = self.active_id(env);

        if self.latest_chain(env, who) != Some(active) {
            self.reconcile_best(env, who);
            let unique = env
                .get_uint(self.address, role.counter(), MapKey::None)
                .checked_add(1)
                .ok_or(ContractError::Overflow)?;
            env.set_uint(self.address, LINKS, MapKey::Addr(who), 0);
            env.set_flag(self.address, JOINED, MapKey::Addr(who), true);
            env.set_uint(self.address, LATEST_CHAIN, MapKey::Addr(who), active);
            env.set_uint(self.address, role.counter(), MapKey::None, unique);
            debug!("chain {}: {} joined chain {} as {:?}", self.address, who, active, role);
        }

        let links = env
            .get_uint(self.address, LINKS, MapKey::Addr(who))
            .checked_add(1)
            .ok_or(ContractError::Overflow)?;
        env.set_uint(self.address, LINKS, MapKey::Addr(who), links);
        Ok(())
    }

    fn reconcile_best(&self, env: &mut Env<'_>, who: Address) {
        let Some(latest) = self.latest_chain(env, who) else {
            return;
        };
        let best_score = match self.best_chain(env, who) {
            Some(best) => self.round_score(env, best),
            None => 0,
        };

        if self.round_score(env, latest) > best_score {
            let links = env.get_uint(self.address, LINKS, MapKey::Addr(who));
            env.set_flag(self.address, HAS_BEST, MapKey::Addr(who), true);
            env.set_uint(self.address, BEST_CHAIN, MapKey::Addr(who), latest);
            env.set_uint(self.address, BEST_LINKS, MapKey::Addr(who), links);
            debug!("chain {}: best chain of {} is now {} ({} links)", self.address, who, latest, links);
        }
    }

    fn load_active(&self, env: &Env<'_>) -> ActiveChain {
        ActiveChain {
            chain_id: self.active_id(env),
            unique_participants: env.get_uint(self.address, UNIQUE_PARTICIPANTS, MapKey::None),
            unique_businesses: env.get_uint(self.address, UNIQUE_BUSINESSES, MapKey::None),
            chain_length: env.get_uint(self.address, CHAIN_LENGTH, MapKey::None),
        }
    }

    fn active_id(&self, env: &Env<'_>) -> u128 {
        env.get_uint(self.address, ACTIVE_ID, MapKey::None)
    }

    fn final_score(&self, env: &Env<'_>, chain_id: u128) -> u128 {
        env.get_uint(self.address, FINAL_SCORE, MapKey::Id(chain_id))
    }

    /// Archived score, zero for chains from an earlier round
    fn round_score(&self, env: &Env<'_>, chain_id: u128) -> u128 {
        if chain_id < env.get_uint(self.address, ROUND_START, MapKey::None) {
            0
        } else {
            self.final_score(env, chain_id)
        }
    }

    fn latest_chain(&self, env: &Env<'_>, who: Address) -> Option<u128> {
        env.get_flag(self.address, JOINED, MapKey::Addr(who))
            .then(|| env.get_uint(self.address, LATEST_CHAIN, MapKey::Addr(who)))
    }

    fn best_chain(&self, env: &Env<'_>, who: Address) -> Option<u128> {
        env.get_flag(self.address, HAS_BEST, MapKey::Addr(who))
            .then(|| env.get_uint(self.address, BEST_CHAIN, MapKey::Addr(who)))
    }

    fn only_authority(&self, env: &Env<'_>) -> Result<()> {
        if env.get_addr(self.address, AUTHORITY, MapKey::None) == Some(env.caller()) {
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

    const AUTH: Address = Address::from_low_u64(1);
    const STRANGER: Address = Address::from_low_u64(2);
    const ALICE: Address = Address::from_low_u64(3);

    fn setup(policy: ChainLengthPolicy) -> (Runtime, ChainLedger) {
        let mut rt = Runtime::new();
        let addr = rt.new_address();
        let ledger = rt
            .execute(Call::new(AUTH, addr), |env| ChainLedger::deploy(env, addr, policy))
            .unwrap();
        (rt, ledger)
    }

    #[test]
    fn test_strangers_rejected() {
        let (mut rt, ledger) = setup(ChainLengthPolicy::Reserved);
        let result = rt.execute(Call::new(STRANGER, ledger.address()), |env| ledger.nuke(env));
        assert_eq!(result, Err(ContractError::Unauthorized));

        let result = rt.query(STRANGER, |env| ledger.active_chain(env));
        assert_eq!(result, Err(ContractError::Unauthorized));
    }

    #[test]
    fn test_repeat_visits_count_once() {
        let (mut rt, ledger) = setup(ChainLengthPolicy::Reserved);
        rt.execute(Call::new(AUTH, ledger.address()), |env| {
            ledger.record_participant_visit(env, ALICE)?;
            ledger.record_participant_visit(env, ALICE)?;
            ledger.record_participant_visit(env, ALICE)
        })
        .unwrap();

        let (chain, links) = rt
            .query(AUTH, |env| Ok((ledger.active_chain(env)?, ledger.link_count(env, ALICE)?)))
            .unwrap();
        assert_eq!(chain.unique_participants, 1);
        assert_eq!(chain.unique_businesses, 0);
        assert_eq!(links, 3);
    }

    #[test]
    fn test_open_round_discounts_earlier_chains() {
        let (mut rt, ledger) = setup(ChainLengthPolicy::Reserved);
        let bob = Address::from_low_u64(4);
        let carol = Address::from_low_u64(5);

        let first = rt
            .execute(Call::new(AUTH, ledger.address()), |env| {
                ledger.forge_link(env, ALICE, STRANGER)?;
                ledger.forge_link(env, bob, carol)?;
                ledger.nuke(env)?;
                let first = ledger.open_round(env)?;
                ledger.forge_link(env, ALICE, STRANGER)?;
                ledger.nuke(env)?;
                ledger.check_is_chain_longest(env, ALICE)?;
                Ok(first)
            })
            .unwrap();
        assert_eq!(first, 1);

        let (winner, old_score, stats) = rt
            .query(AUTH, |env| {
                Ok((
                    ledger.overall_winning_chain_id(env)?,
                    ledger.chain_final_score(env, 0)?,
                    ledger.user_stats(env, ALICE)?,
                ))
            })
            .unwrap();
        // chain 0 keeps its archived score but no longer competes
        assert_eq!(old_score, 2);
        assert_eq!(winner, 1);
        assert_eq!(stats.best_chain_id, Some(1));
        assert_eq!(stats.best_chain_link_count, 1);

        let result = rt.execute(Call::new(STRANGER, ledger.address()), |env| ledger.open_round(env));
        assert_eq!(result, Err(ContractError::Unauthorized));
    }

    #[test]
    fn test_count_links_policy() {
        let (mut rt, ledger) = setup(ChainLengthPolicy::CountLinks);
        rt.execute(Call::new(AUTH, ledger.address()), |env| {
            ledger.forge_link(env, ALICE, STRANGER)?;
            ledger.forge_link(env, ALICE, STRANGER)?;
            ledger.nuke(env)
        })
        .unwrap();

        let length = rt.query(AUTH, |env| ledger.chain_final_length(env, 0)).unwrap();
        assert_eq!(length, 2);
    }

    #[test]
    fn test_links_reset_on_new_chain() {
        let (mut rt, ledger) = setup(ChainLengthPolicy::Reserved);
        rt.execute(Call::new(AUTH, ledger.address()), |env| {
            ledger.forge_link(env, ALICE, STRANGER)?;
            ledger.forge_link(env, ALICE, STRANGER)?;
            ledger.nuke(env)?;
            ledger.forge_link(env, ALICE, STRANGER)
        })
        .unwrap();

        let (links, stats) = rt
            .query(AUTH, |env| Ok((ledger.link_count(env, ALICE)?, ledger.user_stats(env, ALICE)?)))
            .unwrap();
        assert_eq!(links, 1);
        assert_eq!(stats.latest_chain_id, Some(1));
        // chain 0 scored 1, so leaving it made it the best chain with 2 links
        assert_eq!(stats.best_chain_id, Some(0));
        assert_eq!(stats.best_chain_link_count, 2);
    }
}
