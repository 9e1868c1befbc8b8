//! Kani proofs for the constant product math
//!
//! - **A1: Product Non-Decreasing** - x·y never decreases across a swap leg
//! - **A2: Output Bounded** - a leg never pays out more than the output reserve
//! - **A3: Zero Leg** - a zero input leaves the reserves untouched
//! - **A4: Share Conservation** - burning minted shares never releases more than deposited
//! - **A5: Sqrt Floor** - `sqrt` is the floor root from 3 upward

use amm_model::{burn_shares, mint_shares, sqrt, swap_leg, WAD};

/// A1: Product non-decreasing
#[kani::proof]
#[kani::unwind(4)]
fn a1_product_non_decreasing() {
    let reserve_in: u128 = kani::any();
    let reserve_out: u128 = kani::any();
    let amount_in: u128 = kani::any();

    kani::assume(reserve_in > 0 && reserve_in < 1_000_000 * WAD);
    kani::assume(reserve_out > 0 && reserve_out < 1_000_000 * WAD);
    kani::assume(amount_in < 1_000_000 * WAD);

    if let Ok(leg) = swap_leg(reserve_in, reserve_out, amount_in, WAD) {
        assert!(
            leg.reserve_in * leg.reserve_out >= reserve_in * reserve_out,
            "A1: reserve product must not decrease"
        );
    }
}

/// A2: Output bounded by the output reserve
#[kani::proof]
#[kani::unwind(4)]
fn a2_output_bounded() {
    let reserve_in: u128 = kani::any();
    let reserve_out: u128 = kani::any();
    let amount_in: u128 = kani::any();

    kani::assume(reserve_in > 0 && reserve_in < 1_000_000 * WAD);
    kani::assume(reserve_out < 1_000_000 * WAD);
    kani::assume(amount_in < 1_000_000 * WAD);

    if let Ok(leg) = swap_leg(reserve_in, reserve_out, amount_in, WAD) {
        assert!(leg.amount_out <= reserve_out, "A2: leg paid out more than the reserve");
        assert_eq!(leg.reserve_out + leg.amount_out, reserve_out);
        assert_eq!(leg.reserve_in, reserve_in + amount_in);
    }
}

/// A3: Zero input is a no-op
#[kani::proof]
fn a3_zero_leg_noop() {
    let reserve_in: u128 = kani::any();
    let reserve_out: u128 = kani::any();
    let wad: u128 = kani::any();

    let leg = swap_leg(reserve_in, reserve_out, 0, wad);
    assert!(leg.is_ok());
    if let Ok(leg) = leg {
        assert_eq!(leg.amount_out, 0);
        assert_eq!(leg.reserve_in, reserve_in);
        assert_eq!(leg.reserve_out, reserve_out);
    }
}

/// A4: Mint then burn never releases more than was deposited
#[kani::proof]
#[kani::unwind(4)]
fn a4_share_conservation() {
    let reserve_a: u128 = kani::any();
    let reserve_b: u128 = kani::any();
    let supply: u128 = kani::any();
    let k: u128 = kani::any();

    kani::assume(reserve_a > 0 && reserve_a < 1_000_000);
    kani::assume(reserve_b > 0 && reserve_b < 1_000_000);
    kani::assume(supply > 0 && supply < 1_000_000);
    kani::assume(k > 0 && k < 100);

    // Ratio-preserving deposit
    let amount_a = reserve_a * k;
    let amount_b = reserve_b * k;

    if let Ok(shares) = mint_shares(amount_a, amount_b, reserve_a, reserve_b, supply) {
        if let Ok((out_a, out_b)) = burn_shares(shares, reserve_a + amount_a, reserve_b + amount_b, supply + shares) {
            assert!(out_a <= amount_a, "A4: burn released more A than deposited");
            assert!(out_b <= amount_b, "A4: burn released more B than deposited");
        }
    }
}

/// A5: sqrt(y)^2 <= y < (sqrt(y) + 1)^2 for y >= 3
#[kani::proof]
#[kani::unwind(70)]
fn a5_sqrt_is_floor_root() {
    let y: u128 = kani::any();
    kani::assume(y >= 3 && y < (1 << 32));

    let r = sqrt(y);
    assert!(r * r <= y, "A5: root too large");
    assert!((r + 1) * (r + 1) > y, "A5: root too small");
}
