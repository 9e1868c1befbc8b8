//! Epoch arithmetic for capped withdrawals

use crate::{ChainModelError, Result};

/// Epoch containing `height`: `height / blocks_per_epoch`
#[inline]
pub fn epoch_of(height: u64, blocks_per_epoch: u64) -> Result<u64> {
    if blocks_per_epoch == 0 {
        return Err(ChainModelError::DivByZero);
    }
    Ok(height / blocks_per_epoch)
}

/// Per-principal withdrawal bookkeeping.
///
/// The allowance is binary: one withdrawal per epoch regardless of size.
/// `epoch_withdrawal_amt` only records what that withdrawal paid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WithdrawalWindow {
    /// Amount paid by the withdrawal in `last_withdrawal_epoch`
    pub epoch_withdrawal_amt: u128,
    /// Epoch of the last withdrawal, `None` if the principal never withdrew
    pub last_withdrawal_epoch: Option<u64>,
}

impl WithdrawalWindow {
    /// Record a withdrawal of `amount` in `epoch`.
    ///
    /// A new epoch resets the counter first; a second withdrawal in the same
    /// epoch fails with `AlreadyWithdrawn`.
    pub fn record(self, epoch: u64, amount: u128) -> Result<Self> {
        if self.last_withdrawal_epoch == Some(epoch) {
            return Err(ChainModelError::AlreadyWithdrawn);
        }
        Ok(Self {
            epoch_withdrawal_amt: amount,
            last_withdrawal_epoch: Some(epoch),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_of() {
        assert_eq!(epoch_of(0, 100), Ok(0));
        assert_eq!(epoch_of(99, 100), Ok(0));
        assert_eq!(epoch_of(100, 100), Ok(1));
        assert_eq!(epoch_of(5, 0), Err(ChainModelError::DivByZero));
    }

    #[test]
    fn test_one_withdrawal_per_epoch() {
        let window = WithdrawalWindow::default().record(3, 40).unwrap();
        assert_eq!(window.epoch_withdrawal_amt, 40);
        assert_eq!(window.record(3, 1), Err(ChainModelError::AlreadyWithdrawn));

        let next = window.record(4, 7).unwrap();
        assert_eq!(next.epoch_withdrawal_amt, 7);
        assert_eq!(next.last_withdrawal_epoch, Some(4));
    }

    #[test]
    fn test_first_withdrawal_in_epoch_zero() {
        let window = WithdrawalWindow::default().record(0, 5).unwrap();
        assert_eq!(window.last_withdrawal_epoch, Some(0));
    }
}
