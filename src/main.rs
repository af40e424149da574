//! DSC engine simulator
//!
//! Runs a scenario of deposits, mints, redemptions, burns, price moves and
//! liquidations against the engine, backed by in-memory tokens and price
//! feeds, and prints the resulting positions as JSON.
//!
//! Usage: `dsc-engine [scenario.toml]` (or set `SCENARIO`). The engine
//! profile comes from `ENGINE_PROFILE`.

mod scenario;
mod simulator;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dsc_core::EngineConfig;

use crate::scenario::Scenario;
use crate::simulator::Simulator;

/// Environment variable names.
mod env {
    pub const SCENARIO: &str = "SCENARIO";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

const DEFAULT_SCENARIO: &str = "config/scenario.toml";

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let engine_config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    engine_config.log_config();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(env::SCENARIO).ok())
        .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    info!(scenario = %path, "Loading scenario");

    let scenario = Scenario::from_file(&path)?;
    let report = Simulator::new(scenario, &engine_config)
        .context("Failed to set up scenario")?
        .run()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Logs go to stderr so the JSON report on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dsc_core=debug,dsc_chain=debug"));
    let json = std::env::var(env::LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
