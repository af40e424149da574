//! DSC engine core logic.
//!
//! This crate provides the collateralized-debt engine:
//! - Collateral allow-list and per-user position ledgers
//! - Oracle-driven USD valuation with decimal normalization
//! - Health factor computation and the solvency gate
//! - Liquidation planning with bonus seizure and improvement checks
//! - Atomic position operations with compensated token settlement
//!
//! External tokens and price feeds live in `dsc-chain`.

pub mod config;
mod engine;
mod error;
mod events;
mod health;
mod ledger;
mod liquidation;
mod oracle;
mod registry;
mod settlement;
pub mod u256_math;
mod valuation;

pub use config::{DeploymentConfig, DeploymentParams, EngineConfig, OracleSettings, RiskParameters};
pub use engine::{Collaborators, DscEngine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::{EngineEvent, EngineEventSignatures};
pub use health::{calculate_health_factor, HealthFactorEngine, MAX_HEALTH_FACTOR};
pub use ledger::{PositionStore, UserPosition};
pub use liquidation::{LiquidationEngine, LiquidationPlan};
pub use oracle::{PriceOracle, PriceQuote};
pub use registry::{CollateralAsset, SystemRegistry};
pub use settlement::{Settlement, SettlementStep, TokenHandles};
pub use valuation::ValuationEngine;
