//! Kani proof harnesses for the model crates
//!
//! Run with: cargo kani -p proofs-kani

#![no_std]
#![forbid(unsafe_code)]

#[cfg(kani)]
mod amm;
#[cfg(kani)]
mod chain;
