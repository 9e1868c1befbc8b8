//! AMM Model - Pure constant product math (x·y=k)
//!
//! This crate holds the reserve arithmetic shared by both AMM variants of the
//! engine crate: the price-reveal AMM and the LP-share liquidity pool.
//! Everything here is total: every function returns `Result` instead of
//! panicking, so the same code can be checked by the Kani harnesses in
//! `crates/proofs/kani`.

#![no_std]
#![forbid(unsafe_code)]

pub mod math;

pub use math::{
    burn_shares, calc_swap_input, calc_swap_output, mint_shares, mul_div, spot_price, sqrt,
    swap_leg, LegResult,
};

/// Default fixed-point scale (1e6)
pub const WAD: u128 = 1_000_000;

/// Error types for AMM math
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmmError {
    /// Arithmetic overflow
    Overflow,
    /// Arithmetic underflow
    Underflow,
    /// Division by zero
    DivByZero,
    /// Liquidity deposit does not match the pool ratio
    RatioMismatch,
}

pub type Result<T> = core::result::Result<T, AmmError>;
