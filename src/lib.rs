//! Shroud: confidential market and pay-it-forward contracts
//!
//! Contracts run against a pluggable key-value host:
//! 1. [`ConfidentialToken`]: balance ledger whose amounts are disclosed only
//!    to their holder or a trusted service
//! 2. [`PriceRevealAmm`]: constant-product AMM that reveals its price only to
//!    callers who listened first, or to anyone above a threshold
//! 3. [`ChainLedger`] and [`Competition`]: pay-it-forward chains scored and
//!    paid out at the end of a timed competition
//! 4. [`PriceFloorService`]: epoch-capped reward cash-out and buyback-burn
//!    through an internal [`LiquidityPool`]
//!
//! Each public operation takes an [`Env`] call frame. [`Runtime::execute`]
//! wraps one external call in a journal and commits it only on success, so
//! a failed operation never leaves partial state.

#![forbid(unsafe_code)]

pub mod address;
pub mod amm;
pub mod chain;
pub mod competition;
pub mod confidential;
pub mod config;
pub mod error;
pub mod pool;
pub mod price_floor;
pub mod runtime;
pub mod storage;
pub mod token;

pub use address::Address;
pub use amm::{AmmConfig, ListenGate, PriceRevealAmm, SwapOutcome};
pub use chain::{ActiveChain, ChainLedger, ChainLengthPolicy, UserStats};
pub use chain_model::{PayoutTerms, WithdrawalWindow};
pub use competition::{Competition, CompetitionConfig, ProductStore, Stage, StoreFront};
pub use confidential::Confidential;
pub use config::ProtocolConfig;
pub use error::{ContractError, Result};
pub use pool::LiquidityPool;
pub use price_floor::{PriceFloorConfig, PriceFloorService};
pub use runtime::{native_balance, transfer_native, BlockInfo, Call, Env, Runtime, SharedRuntime};
pub use storage::{Journal, KeyValueStore, MapKey, MemoryStore, StorageKey, Value};
pub use token::{whitelist_open, ConfidentialToken};
