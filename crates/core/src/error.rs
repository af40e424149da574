//! Engine error taxonomy.

use alloy::primitives::{Address, U256};
use dsc_chain::{OracleError, TokenError};
use thiserror::Error;

/// Broad error classes, used for logging and by callers deciding whether a
/// retry with different parameters makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input or configuration, rejected before any mutation.
    Validation,
    /// The position would be (or is not) under-collateralized.
    Solvency,
    /// A price feed or token collaborator failed.
    ExternalFailure,
    /// Recorded state does not allow the request; never suppressed.
    Invariant,
}

/// Errors returned by engine operations.
///
/// Any error aborts the whole operation: ledgers and token balances are left
/// exactly as they were before the call.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("amount must be more than zero")]
    MustBeMoreThanZero,

    #[error("token {token} is not an allowed collateral")]
    NotAllowedCollateral { token: Address },

    #[error("{tokens} collateral tokens but {price_feeds} price feeds")]
    ConfigurationMismatch { tokens: usize, price_feeds: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("insufficient collateral of {token}: have {available}, requested {requested}")]
    InsufficientCollateral {
        token: Address,
        available: U256,
        requested: U256,
    },

    #[error("burn of {requested} exceeds minted debt {debt}")]
    BurnExceedsDebt { debt: U256, requested: U256 },

    #[error("health factor too low: {health_factor}")]
    HealthFactorTooLow { health_factor: U256 },

    #[error("health factor ok ({health_factor}), position cannot be liquidated")]
    HealthFactorOk { health_factor: U256 },

    #[error("health factor not improved: {before} -> {after}")]
    HealthFactorNotImproved { before: U256, after: U256 },

    #[error("oracle unavailable for {token}: {source}")]
    OracleUnavailable {
        token: Address,
        #[source]
        source: OracleError,
    },

    #[error("transfer of {token} failed: {source}")]
    TransferFailed {
        token: Address,
        #[source]
        source: TokenError,
    },

    #[error("mint failed: {source}")]
    MintFailed {
        #[source]
        source: TokenError,
    },

    #[error("arithmetic overflow")]
    MathOverflow,

    #[error("re-entrant call rejected")]
    ReentrantCall,
}

impl EngineError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MustBeMoreThanZero
            | Self::NotAllowedCollateral { .. }
            | Self::ConfigurationMismatch { .. }
            | Self::InvalidConfiguration(_) => ErrorKind::Validation,
            Self::HealthFactorTooLow { .. }
            | Self::HealthFactorOk { .. }
            | Self::HealthFactorNotImproved { .. } => ErrorKind::Solvency,
            Self::OracleUnavailable { .. } | Self::TransferFailed { .. } | Self::MintFailed { .. } => {
                ErrorKind::ExternalFailure
            }
            Self::InsufficientCollateral { .. }
            | Self::BurnExceedsDebt { .. }
            | Self::MathOverflow
            | Self::ReentrantCall => ErrorKind::Invariant,
        }
    }
}

/// Shorthand used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::MustBeMoreThanZero.kind(), ErrorKind::Validation);
        assert_eq!(
            EngineError::ConfigurationMismatch { tokens: 2, price_feeds: 1 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::HealthFactorTooLow { health_factor: U256::ZERO }.kind(),
            ErrorKind::Solvency
        );
        assert_eq!(
            EngineError::OracleUnavailable {
                token: Address::ZERO,
                source: OracleError::NoData { feed: Address::ZERO },
            }
            .kind(),
            ErrorKind::ExternalFailure
        );
        assert_eq!(
            EngineError::BurnExceedsDebt { debt: U256::ZERO, requested: U256::from(1u64) }.kind(),
            ErrorKind::Invariant
        );
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::ConfigurationMismatch { tokens: 2, price_feeds: 1 };
        assert_eq!(err.to_string(), "2 collateral tokens but 1 price feeds");

        let err = EngineError::TransferFailed {
            token: Address::ZERO,
            source: TokenError::ZeroAmount,
        };
        assert!(err.to_string().contains("amount must be more than zero"));
    }
}
