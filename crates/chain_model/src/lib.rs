//! Chain Model - Pure scoring and payout math for the pay-it-forward ledger
//!
//! No host or storage dependencies, no unwrap/panic, all functions total.
//! The engine crate wraps these in access control and persistence.

#![no_std]
#![forbid(unsafe_code)]

pub mod epoch;
pub mod payout;
pub mod score;

pub use epoch::{epoch_of, WithdrawalWindow};
pub use payout::{payout_terms, PayoutTerms, BUSINESS_SHARE_PCT, DONATION_PCT, PARTICIPANT_SHARE_PCT};
pub use score::chain_score;

/// Error types for chain model math
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainModelError {
    /// Arithmetic overflow
    Overflow,
    /// Division by zero
    DivByZero,
    /// A withdrawal already happened in this epoch
    AlreadyWithdrawn,
}

pub type Result<T> = core::result::Result<T, ChainModelError>;
