//! Kani proofs for chain scoring, payout split and withdrawal windows
//!
//! - **C1: Score Monotone** - more businesses or participants never lower the score
//! - **C2: Payout Bounded** - a fully paid winning chain plus the donation fits the pot
//! - **C3: One Withdrawal Per Epoch** - a recorded epoch rejects a second withdrawal

use chain_model::{chain_score, epoch_of, payout_terms, ChainModelError, WithdrawalWindow};

/// C1: Score is monotone in both counters
#[kani::proof]
fn c1_score_monotone() {
    let businesses: u128 = kani::any();
    let participants: u128 = kani::any();
    let more_businesses: u128 = kani::any();
    let more_participants: u128 = kani::any();

    kani::assume(businesses <= more_businesses && more_businesses < 1_000_000);
    kani::assume(participants <= more_participants && more_participants < 1_000_000);

    let low = chain_score(businesses, participants);
    let high = chain_score(more_businesses, more_participants);
    if let (Ok(low), Ok(high)) = (low, high) {
        assert!(low <= high, "C1: score decreased");
    }
}

/// C2: Per-link amounts times the chain length plus the donation never exceed the pot
#[kani::proof]
fn c2_payout_bounded() {
    let balance: u128 = kani::any();
    let length: u128 = kani::any();

    kani::assume(balance < 1_000_000_000_000);
    kani::assume(length < 10_000);

    if let Ok(terms) = payout_terms(balance, length) {
        let links = terms.per_link_participant * length + terms.per_link_business * length;
        assert!(links + terms.donation <= balance, "C2: payout exceeds pot");
        if length == 0 {
            assert_eq!(terms.per_link_participant, 0);
            assert_eq!(terms.per_link_business, 0);
        }
    }
}

/// C3: Recording twice in the same epoch fails, a later epoch succeeds
#[kani::proof]
fn c3_one_withdrawal_per_epoch() {
    let height: u64 = kani::any();
    let blocks_per_epoch: u64 = kani::any();
    let amount: u128 = kani::any();
    kani::assume(blocks_per_epoch > 0);

    if let Ok(epoch) = epoch_of(height, blocks_per_epoch) {
        if let Ok(window) = WithdrawalWindow::default().record(epoch, amount) {
            assert_eq!(window.record(epoch, amount), Err(ChainModelError::AlreadyWithdrawn));
            if epoch < u64::MAX {
                assert!(window.record(epoch + 1, amount).is_ok());
            }
        }
    }
}
