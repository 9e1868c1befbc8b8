//! Prize pool split at the end of a competition

use crate::{ChainModelError, Result};

/// Share of the pool paid to participants of the winning chain (percent)
pub const PARTICIPANT_SHARE_PCT: u128 = 50;

/// Share of the pool paid to businesses of the winning chain (percent)
pub const BUSINESS_SHARE_PCT: u128 = 15;

/// Share of the pool donated to the charity (percent)
pub const DONATION_PCT: u128 = 35;

/// Per-link payout amounts fixed when the competition closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayoutTerms {
    /// Paid per link to a participant of the winning chain
    pub per_link_participant: u128,
    /// Paid per link to a business of the winning chain
    pub per_link_business: u128,
    /// Paid once to the charity
    pub donation: u128,
}

/// Split `balance` over a winning chain of `winning_chain_length` links.
///
/// ```text
/// per_link_participant = balance * 50 / (length * 100)
/// per_link_business    = balance * 15 / (length * 100)
/// donation             = balance * 35 / 100
/// ```
///
/// Truncation leaves a remainder in the pool. A zero-length winning chain
/// has no links to pay, so both per-link amounts are zero.
pub fn payout_terms(balance: u128, winning_chain_length: u128) -> Result<PayoutTerms> {
    let donation = scaled(balance, DONATION_PCT, 100)?;

    if winning_chain_length == 0 {
        return Ok(PayoutTerms {
            per_link_participant: 0,
            per_link_business: 0,
            donation,
        });
    }

    let denominator = winning_chain_length
        .checked_mul(100)
        .ok_or(ChainModelError::Overflow)?;

    Ok(PayoutTerms {
        per_link_participant: scaled(balance, PARTICIPANT_SHARE_PCT, denominator)?,
        per_link_business: scaled(balance, BUSINESS_SHARE_PCT, denominator)?,
        donation,
    })
}

#[inline]
fn scaled(value: u128, numerator: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(ChainModelError::DivByZero);
    }
    value
        .checked_mul(numerator)
        .map(|v| v / denominator)
        .ok_or(ChainModelError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms() {
        let terms = payout_terms(10_000, 4).unwrap();
        assert_eq!(terms.per_link_participant, 1_250);
        assert_eq!(terms.per_link_business, 375);
        assert_eq!(terms.donation, 3_500);
    }

    #[test]
    fn test_zero_length_pays_no_links() {
        let terms = payout_terms(10_000, 0).unwrap();
        assert_eq!(terms.per_link_participant, 0);
        assert_eq!(terms.per_link_business, 0);
        assert_eq!(terms.donation, 3_500);
    }

    #[test]
    fn test_rounding_remainder_stays() {
        // 7 links: 50*999/700 = 71, 15*999/700 = 21, 35*999/100 = 349
        let terms = payout_terms(999, 7).unwrap();
        let paid = terms.per_link_participant * 7 + terms.per_link_business * 7 + terms.donation;
        assert!(paid <= 999);
    }

    #[test]
    fn test_overflow() {
        assert_eq!(payout_terms(u128::MAX, 1), Err(ChainModelError::Overflow));
    }
}
