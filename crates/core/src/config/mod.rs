//! Configuration for the engine.
//!
//! This module provides:
//! - Engine configuration (profiles, risk constants, oracle guard)
//! - Deployment configuration (collateral tokens, price feeds, debt token)

mod deployment;
mod engine;

pub use deployment::{parse_address, DeploymentConfig, DeploymentDetails, DeploymentParams};
pub use engine::{EngineConfig, OracleSettings, RiskParameters};
