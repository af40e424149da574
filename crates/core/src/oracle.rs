//! Price oracle adapter.
//!
//! Reads the latest round of a collateral token's feed and hands back a
//! WAD-normalized USD price. Quotes are never cached: every valuation reads
//! the feed again, and any failure is surfaced to the calling operation
//! without retry.

use alloy::primitives::{Address, U256};
use dsc_chain::{OracleError, PriceData, PriceFeed};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::OracleSettings;
use crate::error::{EngineError, EngineResult};
use crate::registry::CollateralAsset;
use crate::u256_math::PRICE_DECIMALS;

/// A USD price read at the moment of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    /// Collateral token the price is for
    pub token: Address,
    /// USD per whole token, WAD (18 decimals)
    pub price: U256,
    /// Always [`PRICE_DECIMALS`]
    pub decimals: u8,
    /// Feed round the price came from
    pub round_id: u128,
    /// Feed update timestamp
    pub updated_at: u64,
}

/// Adapter over the per-token price feeds.
pub struct PriceOracle {
    /// Feeds by collateral token
    feeds: HashMap<Address, Arc<dyn PriceFeed>>,
    /// Staleness guard
    settings: OracleSettings,
}

impl std::fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracle")
            .field("feed_count", &self.feeds.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl PriceOracle {
    /// Create an adapter from token -> feed handles.
    pub fn new(feeds: HashMap<Address, Arc<dyn PriceFeed>>, settings: OracleSettings) -> Self {
        Self { feeds, settings }
    }

    /// Latest USD price for one unit of `asset`, normalized to 18 decimals.
    pub fn price(&self, asset: &CollateralAsset) -> EngineResult<PriceQuote> {
        let unavailable = |source: OracleError| EngineError::OracleUnavailable {
            token: asset.token,
            source,
        };

        let feed = self.feeds.get(&asset.token).ok_or_else(|| {
            unavailable(OracleError::NoData {
                feed: asset.price_feed,
            })
        })?;

        let round = feed.latest_round_data().map_err(unavailable)?;
        let data = PriceData::from_round(feed.address(), &round, feed.decimals()).map_err(|e| {
            warn!(token = %asset.token, feed = %asset.price_feed, error = %e, "Rejected price round");
            unavailable(e)
        })?;

        if let Some(max_age_secs) = self.settings.max_price_age_secs {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            if data.is_stale(max_age_secs, now) {
                return Err(unavailable(OracleError::Stale {
                    feed: asset.price_feed,
                    age_secs: data.age_secs(now),
                    max_age_secs,
                }));
            }
        }

        let price = data.normalize_to(PRICE_DECIMALS).ok_or(EngineError::MathOverflow)?;
        // A tiny answer from a feed with more than 18 decimals truncates to zero
        if price.is_zero() {
            warn!(token = %asset.token, feed = %asset.price_feed, answer = %round.answer, "Price truncated to zero");
            return Err(unavailable(OracleError::NonPositiveAnswer {
                feed: asset.price_feed,
                answer: round.answer,
            }));
        }

        debug!(
            token = %asset.token,
            round_id = data.round_id,
            %price,
            "Price quote"
        );

        Ok(PriceQuote {
            token: asset.token,
            price,
            decimals: PRICE_DECIMALS,
            round_id: data.round_id,
            updated_at: data.timestamp,
        })
    }
}
