//! In-memory Chainlink-style aggregator.

use alloy::primitives::{Address, I256};
use parking_lot::RwLock;
use tracing::debug;

use super::{OracleError, PriceFeed, RoundData};

/// Aggregator holding its latest round in memory.
///
/// Every answer update opens a new round stamped with the current time, the
/// same way a `MockV3Aggregator` behaves on a dev chain.
#[derive(Debug)]
pub struct InMemoryAggregator {
    address: Address,
    decimals: u8,
    description: String,
    latest: RwLock<Option<RoundData>>,
}

impl InMemoryAggregator {
    /// Create an aggregator with an initial answer.
    pub fn new(address: Address, decimals: u8, initial_answer: I256) -> Self {
        let aggregator = Self::empty(address, decimals);
        aggregator.update_answer(initial_answer);
        aggregator
    }

    /// Create an aggregator that has not reported any round yet.
    pub fn empty(address: Address, decimals: u8) -> Self {
        Self {
            address,
            decimals,
            description: String::new(),
            latest: RwLock::new(None),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Publish a new answer as the next round.
    pub fn update_answer(&self, answer: I256) {
        let now = chrono::Utc::now().timestamp().max(1) as u64;
        let mut latest = self.latest.write();
        let round_id = latest.as_ref().map_or(1, |r| r.round_id + 1);

        debug!(feed = %self.address, round_id, answer = %answer, "Aggregator answer updated");

        *latest = Some(RoundData {
            round_id,
            answer,
            started_at: now,
            updated_at: now,
            answered_in_round: round_id,
        });
    }

    /// Replace the latest round verbatim (timestamps included).
    pub fn update_round_data(&self, round: RoundData) {
        *self.latest.write() = Some(round);
    }
}

impl PriceFeed for InMemoryAggregator {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn latest_round_data(&self) -> Result<RoundData, OracleError> {
        self.latest
            .read()
            .clone()
            .ok_or(OracleError::NoData { feed: self.address })
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
