//! Price data type.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::{OracleError, RoundData};

/// Price data with metadata, validated from a feed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// Price value (in feed decimals)
    pub price: U256,
    /// Price decimals
    pub decimals: u8,
    /// Timestamp when price was updated
    pub timestamp: u64,
    /// Round the price was read from
    pub round_id: u128,
}

impl PriceData {
    /// Create new price data.
    pub fn new(price: U256, decimals: u8, timestamp: u64, round_id: u128) -> Self {
        Self {
            price,
            decimals,
            timestamp,
            round_id,
        }
    }

    /// Build price data from a feed round, rejecting unusable answers.
    pub fn from_round(feed: Address, round: &RoundData, decimals: u8) -> Result<Self, OracleError> {
        let price = round.positive_answer().ok_or(OracleError::NonPositiveAnswer {
            feed,
            answer: round.answer,
        })?;

        if round.updated_at == 0 || round.answered_in_round < round.round_id {
            return Err(OracleError::IncompleteRound {
                feed,
                round_id: round.round_id,
            });
        }

        Ok(Self::new(price, decimals, round.updated_at, round.round_id))
    }

    /// Check if price is stale.
    pub fn is_stale(&self, threshold_secs: u64, current_time: u64) -> bool {
        current_time.saturating_sub(self.timestamp) > threshold_secs
    }

    /// Get age in seconds.
    pub fn age_secs(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.timestamp)
    }

    /// Rescale the price to `target` decimals.
    ///
    /// Returns `None` if upscaling overflows. Downscaling truncates.
    pub fn normalize_to(&self, target: u8) -> Option<U256> {
        let ten = U256::from(10u64);
        if self.decimals == target {
            Some(self.price)
        } else if self.decimals < target {
            let factor = ten.checked_pow(U256::from(target - self.decimals))?;
            self.price.checked_mul(factor)
        } else {
            let factor = ten.checked_pow(U256::from(self.decimals - target))?;
            Some(self.price / factor)
        }
    }
}
