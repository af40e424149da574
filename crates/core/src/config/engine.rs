//! Engine configuration with profile support.
//!
//! Provides the protocol risk constants (liquidation threshold, bonus,
//! minimum health factor) and the optional oracle staleness guard, loadable
//! from TOML or selected by profile name.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Collateralization and liquidation constants
    #[serde(default)]
    pub risk: RiskParameters,

    /// Price feed guard
    #[serde(default)]
    pub oracle: OracleSettings,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Protocol risk constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Share of collateral value that may back debt (5000 = 50%, i.e. 200% collateralized)
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold_bps: u16,

    /// Extra collateral paid to liquidators (1000 = 10%)
    #[serde(default = "default_liquidation_bonus")]
    pub liquidation_bonus_bps: u16,

    /// Minimum health factor in WAD (1e18 = 1.0)
    #[serde(default = "default_min_health_factor")]
    pub min_health_factor_wad: u64,
}

fn default_liquidation_threshold() -> u16 {
    5000
}
fn default_liquidation_bonus() -> u16 {
    1000
}
fn default_min_health_factor() -> u64 {
    1_000_000_000_000_000_000
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            liquidation_threshold_bps: default_liquidation_threshold(),
            liquidation_bonus_bps: default_liquidation_bonus(),
            min_health_factor_wad: default_min_health_factor(),
        }
    }
}

impl RiskParameters {
    /// Minimum health factor as WAD.
    pub fn min_health_factor(&self) -> U256 {
        U256::from(self.min_health_factor_wad)
    }

    /// Liquidation threshold as a decimal (e.g., 0.5).
    pub fn threshold_decimal(&self) -> f64 {
        self.liquidation_threshold_bps as f64 / 10000.0
    }

    /// Liquidation bonus as a decimal (e.g., 0.1).
    pub fn bonus_decimal(&self) -> f64 {
        self.liquidation_bonus_bps as f64 / 10000.0
    }

    /// Reject parameters that would make the health factor meaningless.
    pub fn validate(&self) -> EngineResult<()> {
        if self.liquidation_threshold_bps == 0 || self.liquidation_threshold_bps > 10000 {
            return Err(EngineError::InvalidConfiguration(format!(
                "liquidation threshold {} bps outside (0, 10000]",
                self.liquidation_threshold_bps
            )));
        }
        if self.liquidation_bonus_bps > 10000 {
            return Err(EngineError::InvalidConfiguration(format!(
                "liquidation bonus {} bps above 10000",
                self.liquidation_bonus_bps
            )));
        }
        if self.min_health_factor_wad == 0 {
            return Err(EngineError::InvalidConfiguration(
                "minimum health factor must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Price feed guard settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Reject rounds older than this many seconds (disabled when absent)
    #[serde(default)]
    pub max_price_age_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            risk: RiskParameters::default(),
            oracle: OracleSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.risk.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Stricter collateralization and a three-hour staleness limit.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            risk: RiskParameters {
                liquidation_threshold_bps: 4000, // 250% collateralized
                liquidation_bonus_bps: 500,
                min_health_factor_wad: default_min_health_factor(),
            },
            oracle: OracleSettings {
                max_price_age_secs: Some(3 * 60 * 60),
            },
        }
    }

    /// Load a named profile or a TOML file path.
    pub fn load_profile(profile: &str) -> anyhow::Result<Self> {
        match profile.to_lowercase().as_str() {
            "default" => Ok(Self::default()),
            "conservative" | "safe" => Ok(Self::conservative()),
            path => Self::from_file(path),
        }
    }

    /// Get profile from environment variable ENGINE_PROFILE, or default.
    /// Supported values: default, conservative, or a TOML file path.
    pub fn from_env() -> anyhow::Result<Self> {
        let profile = std::env::var("ENGINE_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::load_profile(&profile)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            liquidation_threshold = self.risk.threshold_decimal(),
            liquidation_bonus = self.risk.bonus_decimal(),
            min_health_factor = self.risk.min_health_factor_wad,
            "Risk parameters"
        );
        tracing::info!(
            max_price_age_secs = ?self.oracle.max_price_age_secs,
            "Oracle guard"
        );
    }
}
