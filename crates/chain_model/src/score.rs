//! Chain scoring

use crate::{ChainModelError, Result};

/// Participants needed for each whole step of the participant bonus
pub const PARTICIPANTS_PER_BONUS: u128 = 10;

/// Score of a finished chain: `businesses * (1 + participants / 10)`.
///
/// The bonus uses integer division, so chains with fewer than ten unique
/// participants score exactly their business count.
pub fn chain_score(unique_businesses: u128, unique_participants: u128) -> Result<u128> {
    let multiplier = (unique_participants / PARTICIPANTS_PER_BONUS)
        .checked_add(1)
        .ok_or(ChainModelError::Overflow)?;
    unique_businesses
        .checked_mul(multiplier)
        .ok_or(ChainModelError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bonus_is_stepped() {
        assert_eq!(chain_score(2, 2), Ok(2));
        assert_eq!(chain_score(2, 9), Ok(2));
        assert_eq!(chain_score(2, 10), Ok(4));
        assert_eq!(chain_score(3, 25), Ok(9));
        assert_eq!(chain_score(0, 50), Ok(0));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(chain_score(u128::MAX, 10), Err(ChainModelError::Overflow));
    }
}
