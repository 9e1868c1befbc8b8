//! Property tests for the constant product math
//! Run with: cargo test -p amm_model

use amm_model::*;
use proptest::prelude::*;

proptest! {
    /// k = x·y never decreases across a swap leg
    #[test]
    fn leg_never_decreases_invariant(
        reserve_in in 1u128..1_000_000_000_000,
        reserve_out in 1u128..1_000_000_000_000,
        amount_in in 0u128..1_000_000_000_000,
    ) {
        let k0 = reserve_in * reserve_out;
        let leg = swap_leg(reserve_in, reserve_out, amount_in, WAD).unwrap();
        let k1 = leg.reserve_in * leg.reserve_out;

        prop_assert!(k1 >= k0, "k decreased: {} -> {}", k0, k1);
        prop_assert!(leg.amount_out <= reserve_out);
        if amount_in == 0 {
            prop_assert_eq!(k1, k0);
        }
    }

    /// Output is monotonic in the input amount
    #[test]
    fn leg_output_monotonic(
        reserve_in in 1u128..1_000_000_000,
        reserve_out in 1u128..1_000_000_000,
        a in 0u128..1_000_000_000,
        b in 0u128..1_000_000_000,
    ) {
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        let out_small = swap_leg(reserve_in, reserve_out, small, WAD).unwrap().amount_out;
        let out_large = swap_leg(reserve_in, reserve_out, large, WAD).unwrap().amount_out;
        prop_assert!(out_small <= out_large);
    }

    /// Burning freshly minted shares never releases more than was deposited
    #[test]
    fn mint_then_burn_is_conservative(
        reserve in 1u128..1_000_000,
        ratio in 1u128..100,
        deposit in 1u128..1_000_000,
    ) {
        let reserve_a = reserve * ratio;
        let reserve_b = reserve;
        let supply = sqrt(reserve_a * reserve_b).max(1);
        let amount_a = deposit * ratio;
        let amount_b = deposit;

        let minted = mint_shares(amount_a, amount_b, reserve_a, reserve_b, supply).unwrap();
        let (out_a, out_b) = burn_shares(
            minted,
            reserve_a + amount_a,
            reserve_b + amount_b,
            supply + minted,
        ).unwrap();

        prop_assert!(out_a <= amount_a);
        prop_assert!(out_b <= amount_b);
    }

    /// Babylonian sqrt is the floor square root from 4 upwards
    #[test]
    fn sqrt_is_floor_root(y in 4u128..u64::MAX as u128) {
        let z = sqrt(y);
        prop_assert!(z * z <= y);
        prop_assert!((z + 1) * (z + 1) > y);
    }
}
