//! Builds in-memory collaborators for a scenario and runs its steps.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy::primitives::{utils::format_units, Address, I256, U256};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use dsc_chain::{Erc20Ledger, FungibleToken, InMemoryAggregator, MintableToken, PriceFeed};
use dsc_core::config::{parse_address, DeploymentConfig};
use dsc_core::{
    Collaborators, DscEngine, EngineConfig, EngineError, EngineEvent, EngineResult, MAX_HEALTH_FACTOR,
};

use crate::scenario::{parse_amount, Scenario, Step};

const DSC_SYMBOL: &str = "DSC";
const DSC_DECIMALS: u8 = 18;

/// Outcome of one step.
#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final state of one account.
#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub name: String,
    pub address: Address,
    pub debt: String,
    /// `None` when a price feed is unavailable
    pub collateral_value_usd: Option<String>,
    pub health_factor: Option<String>,
    pub collateral: BTreeMap<String, String>,
    pub wallet: BTreeMap<String, String>,
}

/// Everything the simulator prints.
#[derive(Debug, Serialize)]
pub struct Report {
    pub deployment: String,
    pub steps: Vec<StepOutcome>,
    pub accounts: Vec<AccountSummary>,
    pub events: Vec<EngineEvent>,
    pub dsc_total_supply: String,
}

/// A scenario wired to a live engine.
pub struct Simulator {
    name: String,
    engine: DscEngine,
    dsc: Arc<Erc20Ledger>,
    /// Collateral tokens by symbol
    tokens: BTreeMap<String, Arc<Erc20Ledger>>,
    /// Feeds by address
    feeds: HashMap<Address, Arc<InMemoryAggregator>>,
    /// Accounts in scenario order
    accounts: Vec<(String, Address)>,
    steps: Vec<Step>,
}

impl Simulator {
    /// Deploy tokens and feeds, fund accounts and construct the engine.
    pub fn new(scenario: Scenario, config: &EngineConfig) -> Result<Self> {
        let params = DeploymentConfig {
            deployment: scenario.deployment.clone(),
        }
        .resolve()?;
        let deployer = parse_address(&scenario.deployer, "deployer")?;

        // Debt token is deployed by the deployer, then handed to the engine
        let dsc = Arc::new(Erc20Ledger::new(params.dsc, DSC_SYMBOL, DSC_DECIMALS, deployer));
        dsc.transfer_ownership(deployer, params.engine)
            .context("Failed to transfer debt token ownership to the engine")?;

        let mut tokens = BTreeMap::new();
        for spec in &scenario.tokens {
            let address = parse_address(&spec.address, "token")?;
            let token = Arc::new(Erc20Ledger::new(address, spec.symbol.clone(), spec.decimals, deployer));
            tokens.insert(spec.symbol.clone(), token);
        }

        let mut feeds = HashMap::new();
        for spec in &scenario.feeds {
            let address = parse_address(&spec.address, "price feed")?;
            let mut feed = InMemoryAggregator::new(address, spec.decimals, feed_answer(spec.answer)?);
            if let Some(description) = &spec.description {
                feed = feed.with_description(description.clone());
            }
            feeds.insert(address, Arc::new(feed));
        }

        let mut accounts = Vec::with_capacity(scenario.accounts.len());
        for spec in &scenario.accounts {
            let address = parse_address(&spec.address, "account")?;
            for (symbol, amount) in &spec.funds {
                let token = tokens
                    .get(symbol)
                    .ok_or_else(|| anyhow!("Account {} funded with unknown token {}", spec.name, symbol))?;
                let amount = parse_amount(amount, token.decimals())?;
                token
                    .mint(deployer, address, amount)
                    .with_context(|| format!("Failed to fund {} with {}", spec.name, symbol))?;
            }
            if spec.approve_engine {
                for token in tokens.values() {
                    token.approve(address, params.engine, U256::MAX)?;
                }
                dsc.approve(address, params.engine, U256::MAX)?;
            }
            accounts.push((spec.name.clone(), address));
        }

        let collaborators = Collaborators {
            dsc: dsc.clone(),
            collateral_tokens: tokens
                .values()
                .map(|t| t.clone() as Arc<dyn FungibleToken>)
                .collect(),
            price_feeds: feeds.values().map(|f| f.clone() as Arc<dyn PriceFeed>).collect(),
        };
        let engine = DscEngine::new(&params, collaborators, config)?;

        info!(
            deployment = %params.name,
            tokens = tokens.len(),
            accounts = accounts.len(),
            steps = scenario.steps.len(),
            "Scenario loaded"
        );

        Ok(Self {
            name: params.name,
            engine,
            dsc,
            tokens,
            feeds,
            accounts,
            steps: scenario.steps,
        })
    }

    /// Run every step, then summarize. Rejected steps are recorded and the
    /// run continues.
    pub fn run(self) -> Result<Report> {
        let mut outcomes = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let result = self.apply(step)?;
            match &result {
                Ok(()) => info!(index, action = step.action(), "Step succeeded"),
                Err(e) => warn!(index, action = step.action(), error = %e, "Step rejected"),
            }
            outcomes.push(StepOutcome {
                index,
                action: step.action(),
                ok: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }

        let accounts = self
            .accounts
            .iter()
            .map(|(name, address)| self.summarize(name, *address))
            .collect();

        Ok(Report {
            deployment: self.name.clone(),
            steps: outcomes,
            accounts,
            events: self.engine.drain_events(),
            dsc_total_supply: display_units(self.dsc.total_supply(), DSC_DECIMALS),
        })
    }

    /// Outer error: the scenario itself is malformed. Inner: the engine
    /// rejected the call.
    fn apply(&self, step: &Step) -> Result<EngineResult<()>> {
        let engine = &self.engine;
        let dsc_amount = |amount: &str| parse_amount(amount, DSC_DECIMALS);

        Ok(match step {
            Step::Deposit { account, token, amount } => {
                let token = self.token(token)?;
                engine.deposit_collateral(self.account(account)?, token.address(), parse_amount(amount, token.decimals())?)
            }
            Step::Mint { account, amount } => engine.mint_dsc(self.account(account)?, dsc_amount(amount)?),
            Step::Redeem { account, token, amount } => {
                let token = self.token(token)?;
                engine.redeem_collateral(self.account(account)?, token.address(), parse_amount(amount, token.decimals())?)
            }
            Step::Burn { account, amount } => engine.burn_dsc(self.account(account)?, dsc_amount(amount)?),
            Step::DepositAndMint { account, token, collateral, mint } => {
                let token = self.token(token)?;
                engine.deposit_collateral_and_mint_dsc(
                    self.account(account)?,
                    token.address(),
                    parse_amount(collateral, token.decimals())?,
                    dsc_amount(mint)?,
                )
            }
            Step::RedeemForDsc { account, token, collateral, burn } => {
                let token = self.token(token)?;
                engine.redeem_collateral_for_dsc(
                    self.account(account)?,
                    token.address(),
                    parse_amount(collateral, token.decimals())?,
                    dsc_amount(burn)?,
                )
            }
            Step::Liquidate { liquidator, user, token, debt_to_cover } => {
                let token = self.token(token)?.address();
                let liquidator = self.account(liquidator)?;
                let user = self.account(user)?;

                if debt_to_cover.eq_ignore_ascii_case("restore") {
                    match engine.debt_to_restore_health(user, token) {
                        Ok(Some(amount)) if !amount.is_zero() => engine.liquidate(liquidator, user, token, amount),
                        Ok(Some(_)) => engine
                            .health_factor(user)
                            .and_then(|health_factor| Err(EngineError::HealthFactorOk { health_factor })),
                        Ok(None) => {
                            warn!(%user, %token, "No liquidation amount restores health, covering all debt");
                            engine.liquidate(liquidator, user, token, engine.minted_debt(user))
                        }
                        Err(e) => Err(e),
                    }
                } else {
                    engine.liquidate(liquidator, user, token, dsc_amount(debt_to_cover)?)
                }
            }
            Step::SetPrice { token, answer } => {
                let token = self.token(token)?.address();
                let feed_address = engine
                    .collateral_token_price_feed(token)
                    .ok_or_else(|| anyhow!("Token {} has no price feed", token))?;
                let feed = self
                    .feeds
                    .get(&feed_address)
                    .ok_or_else(|| anyhow!("Feed {} not deployed", feed_address))?;
                feed.update_answer(feed_answer(*answer)?);
                info!(%token, answer, "Price updated");
                Ok(())
            }
        })
    }

    fn account(&self, name: &str) -> Result<Address> {
        self.accounts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| *a)
            .ok_or_else(|| anyhow!("Unknown account {}", name))
    }

    fn token(&self, symbol: &str) -> Result<&Arc<Erc20Ledger>> {
        self.tokens
            .get(symbol)
            .ok_or_else(|| anyhow!("Unknown token {}", symbol))
    }

    fn summarize(&self, name: &str, address: Address) -> AccountSummary {
        let position = self.engine.position(address);

        let mut collateral = BTreeMap::new();
        let mut wallet = BTreeMap::new();
        for (symbol, token) in &self.tokens {
            let deposited = position.collateral_of(&token.address());
            if !deposited.is_zero() {
                collateral.insert(symbol.clone(), display_units(deposited, token.decimals()));
            }
            wallet.insert(symbol.clone(), display_units(token.balance_of(address), token.decimals()));
        }
        wallet.insert(
            DSC_SYMBOL.to_string(),
            display_units(self.dsc.balance_of(address), DSC_DECIMALS),
        );

        let health_factor = self.engine.health_factor(address).ok().map(|hf| {
            if hf == MAX_HEALTH_FACTOR {
                "max".to_string()
            } else {
                display_units(hf, 18)
            }
        });

        AccountSummary {
            name: name.to_string(),
            address,
            debt: display_units(position.debt(), DSC_DECIMALS),
            collateral_value_usd: self
                .engine
                .account_collateral_value(address)
                .ok()
                .map(|v| display_units(v, 18)),
            health_factor,
            collateral,
            wallet,
        }
    }
}

fn feed_answer(answer: i64) -> Result<I256> {
    I256::try_from(answer).map_err(|_| anyhow!("Feed answer {} out of range", answer))
}

fn display_units(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}
