//! External collaborator layer for the stablecoin engine.
//!
//! This crate provides:
//! - The price feed interface (Chainlink-style `latestRoundData`) and round data types
//! - An in-memory aggregator with a settable answer
//! - Fungible token interfaces for collateral and the mintable debt token
//! - An in-memory ERC20-style ledger implementing both token interfaces
//!
//! The engine in `dsc-core` only talks to these traits, so a real chain
//! binding can be dropped in without touching the accounting code.

pub mod oracle;
pub mod token;

pub use oracle::{InMemoryAggregator, OracleError, PriceData, PriceFeed, RoundData};
pub use token::{Erc20Ledger, FungibleToken, MintableToken, TokenError};
