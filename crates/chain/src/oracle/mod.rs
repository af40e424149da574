//! Price feed abstraction.
//!
//! A [`PriceFeed`] mirrors a Chainlink AggregatorV3: it reports the latest
//! round with a signed answer and a fixed number of decimals. Feeds never
//! validate their own answers; the engine's oracle adapter decides what is
//! usable.
//!
//! # Example
//!
//! ```rust,ignore
//! use dsc_chain::oracle::{InMemoryAggregator, PriceFeed};
//!
//! let feed = InMemoryAggregator::new(feed_address, 8, I256::try_from(2000_0000_0000i64)?);
//! let round = feed.latest_round_data()?;
//! assert!(round.is_valid());
//! ```

mod aggregator;
mod types;

pub use aggregator::InMemoryAggregator;
pub use types::PriceData;

use alloy::primitives::{Address, I256, U256};
use std::fmt::Debug;
use thiserror::Error;

/// Errors surfaced by a price feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The feed has never reported a round.
    #[error("price feed {feed} has no data")]
    NoData { feed: Address },

    /// The answer is zero or negative.
    #[error("price feed {feed} returned non-positive answer {answer}")]
    NonPositiveAnswer { feed: Address, answer: I256 },

    /// The round was never completed (no update timestamp or carried over).
    #[error("price feed {feed} returned an incomplete round {round_id}")]
    IncompleteRound { feed: Address, round_id: u128 },

    /// The answer is older than the allowed age.
    #[error("price feed {feed} is stale: {age_secs}s old, limit {max_age_secs}s")]
    Stale {
        feed: Address,
        age_secs: u64,
        max_age_secs: u64,
    },
}

/// Core trait for price feed reads.
pub trait PriceFeed: Send + Sync + Debug {
    /// Feed contract address.
    fn address(&self) -> Address;

    /// Decimals of the answer (8 for most USD feeds).
    fn decimals(&self) -> u8;

    /// Latest round reported by the feed.
    fn latest_round_data(&self) -> Result<RoundData, OracleError>;

    /// Human-readable pair name, e.g. "ETH / USD".
    fn description(&self) -> String {
        String::new()
    }
}

/// Round data from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundData {
    /// Round ID
    pub round_id: u128,
    /// Signed price answer (feed decimals)
    pub answer: I256,
    /// Timestamp when round started
    pub started_at: u64,
    /// Timestamp when answer was computed
    pub updated_at: u64,
    /// Round ID for which answer was computed
    pub answered_in_round: u128,
}

impl RoundData {
    /// Check if this round's data is usable.
    pub fn is_valid(&self) -> bool {
        self.answer.is_positive() && self.updated_at > 0 && self.answered_in_round >= self.round_id
    }

    /// Positive answer as an unsigned value, `None` for zero or negative answers.
    pub fn positive_answer(&self) -> Option<U256> {
        if self.answer.is_positive() {
            Some(self.answer.into_raw())
        } else {
            None
        }
    }
}
