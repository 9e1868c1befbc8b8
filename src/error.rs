//! Contract error taxonomy

use amm_model::AmmError;
use chain_model::ChainModelError;
use thiserror::Error;

/// Failure of a contract call.
///
/// Every variant aborts the whole call; the runtime discards the call's
/// journal so no partial state survives.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractError {
    #[error("caller is not authorized for this operation")]
    Unauthorized,

    #[error("operation not allowed in the current competition stage")]
    WrongPhase,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivByZero,

    #[error("liquidity deposit does not match the pool ratio")]
    RatioMismatch,

    #[error("listen cooldown has not elapsed")]
    CooldownActive,

    #[error("caller has not called listen()")]
    NotListened,

    #[error("price is below the reveal threshold")]
    PriceBelowThreshold,

    #[error("already withdrawn in this epoch")]
    AlreadyWithdrawn,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("insufficient allowance")]
    InsufficientAllowance,

    #[error("value transfer failed")]
    TransferFailed,

    #[error("no charity selected")]
    CharityNotSet,

    #[error("attached value does not cover rebate and pot cut")]
    InsufficientValue,
}

pub type Result<T> = core::result::Result<T, ContractError>;

impl From<AmmError> for ContractError {
    fn from(err: AmmError) -> Self {
        match err {
            AmmError::Overflow => ContractError::Overflow,
            AmmError::Underflow => ContractError::Underflow,
            AmmError::DivByZero => ContractError::DivByZero,
            AmmError::RatioMismatch => ContractError::RatioMismatch,
        }
    }
}

impl From<ChainModelError> for ContractError {
    fn from(err: ChainModelError) -> Self {
        match err {
            ChainModelError::Overflow => ContractError::Overflow,
            ChainModelError::DivByZero => ContractError::DivByZero,
            ChainModelError::AlreadyWithdrawn => ContractError::AlreadyWithdrawn,
        }
    }
}
