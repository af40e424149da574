//! DSC engine: position operations, liquidation and read-only views.
//!
//! Every mutating entry point follows the same sequence:
//!
//! 1. take the operation lock (re-entry from a collaborator fails `ReentrantCall`)
//! 2. stage the affected positions as local copies and apply ledger changes
//! 3. check solvency on the staged state when the operation can worsen it
//! 4. commit the staged positions to the store
//! 5. run the token settlement; on failure undo the completed calls and
//!    restore the previous positions
//!
//! Events are recorded only after step 5 succeeds.

use alloy::primitives::{Address, U256};
use dsc_chain::{FungibleToken, MintableToken, PriceFeed};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use smallvec::{smallvec, SmallVec};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{DeploymentParams, EngineConfig, RiskParameters};
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::health::{self, HealthFactorEngine};
use crate::ledger::{PositionStore, UserPosition};
use crate::liquidation::LiquidationEngine;
use crate::oracle::PriceOracle;
use crate::registry::SystemRegistry;
use crate::settlement::{Settlement, SettlementStep, TokenHandles};
use crate::u256_math::wad_to_f64;
use crate::valuation::ValuationEngine;

/// External handles the engine is wired to at construction.
///
/// Tokens and feeds are matched to the deployment lists by address, so their
/// order here does not matter.
pub struct Collaborators {
    pub dsc: Arc<dyn MintableToken>,
    pub collateral_tokens: Vec<Arc<dyn FungibleToken>>,
    pub price_feeds: Vec<Arc<dyn PriceFeed>>,
}

/// Staged result of one operation, ready to commit.
struct StagedOperation {
    positions: SmallVec<[(Address, UserPosition); 2]>,
    settlement: Settlement,
    events: SmallVec<[EngineEvent; 2]>,
    /// Health factor checked on the staged state, if any
    health_factor: Option<U256>,
}

/// Held for the duration of a mutating operation.
struct OperationGuard<'a> {
    active: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.active.set(false);
    }
}

/// Collateralized debt engine.
pub struct DscEngine {
    /// Engine account: owner of the debt token and custodian of collateral
    address: Address,
    params: RiskParameters,
    registry: SystemRegistry,
    oracle: PriceOracle,
    dsc: Arc<dyn MintableToken>,
    collateral_tokens: HashMap<Address, Arc<dyn FungibleToken>>,
    store: RwLock<PositionStore>,
    /// Serializes operations across threads; the flag marks one in progress
    op_lock: ReentrantMutex<Cell<bool>>,
    events: Mutex<Vec<EngineEvent>>,
}

impl std::fmt::Debug for DscEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DscEngine")
            .field("address", &self.address)
            .field("dsc", &self.dsc.address())
            .field("registry", &self.registry)
            .field("params", &self.params)
            .finish()
    }
}

impl DscEngine {
    /// Wire the engine to its collaborators.
    ///
    /// Fails `ConfigurationMismatch` when the token and feed lists differ in
    /// length and `InvalidConfiguration` for zero addresses, duplicate tokens,
    /// handles missing for a listed address, or a debt token the engine does
    /// not own.
    pub fn new(
        deployment: &DeploymentParams,
        collaborators: Collaborators,
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        config.risk.validate()?;

        if deployment.token_addresses.len() != deployment.price_feed_addresses.len() {
            return Err(EngineError::ConfigurationMismatch {
                tokens: deployment.token_addresses.len(),
                price_feeds: deployment.price_feed_addresses.len(),
            });
        }
        if deployment.engine == Address::ZERO || deployment.dsc == Address::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "engine and debt token addresses must be non-zero".to_string(),
            ));
        }

        let dsc = collaborators.dsc;
        if dsc.address() != deployment.dsc {
            return Err(EngineError::InvalidConfiguration(format!(
                "debt token handle is {}, deployment lists {}",
                dsc.address(),
                deployment.dsc
            )));
        }
        if dsc.owner() != deployment.engine {
            return Err(EngineError::InvalidConfiguration(format!(
                "debt token is owned by {}, not the engine {}",
                dsc.owner(),
                deployment.engine
            )));
        }

        let mut tokens_by_address: HashMap<Address, Arc<dyn FungibleToken>> = collaborators
            .collateral_tokens
            .into_iter()
            .map(|t| (t.address(), t))
            .collect();
        let mut feeds_by_address: HashMap<Address, Arc<dyn PriceFeed>> = collaborators
            .price_feeds
            .into_iter()
            .map(|f| (f.address(), f))
            .collect();

        let decimals = deployment
            .token_addresses
            .iter()
            .map(|token| {
                tokens_by_address.get(token).map(|t| t.decimals()).ok_or_else(|| {
                    EngineError::InvalidConfiguration(format!("no handle for collateral token {}", token))
                })
            })
            .collect::<EngineResult<Vec<u8>>>()?;

        let registry = SystemRegistry::new(
            &deployment.token_addresses,
            &deployment.price_feed_addresses,
            &decimals,
        )?;

        let mut collateral_tokens = HashMap::with_capacity(registry.len());
        let mut feeds = HashMap::with_capacity(registry.len());
        for asset in registry.iter() {
            let feed = feeds_by_address.remove(&asset.price_feed).ok_or_else(|| {
                EngineError::InvalidConfiguration(format!("no handle for price feed {}", asset.price_feed))
            })?;
            feeds.insert(asset.token, feed);
            if let Some(token) = tokens_by_address.remove(&asset.token) {
                collateral_tokens.insert(asset.token, token);
            }
        }

        info!(
            engine = %deployment.engine,
            dsc = %deployment.dsc,
            collateral_count = registry.len(),
            "DSC engine initialized"
        );

        Ok(Self {
            address: deployment.engine,
            params: config.risk.clone(),
            registry,
            oracle: PriceOracle::new(feeds, config.oracle.clone()),
            dsc,
            collateral_tokens,
            store: RwLock::new(PositionStore::new()),
            op_lock: ReentrantMutex::new(Cell::new(false)),
            events: Mutex::new(Vec::new()),
        })
    }

    // ---------------------------------------------------------------------
    // Position operations
    // ---------------------------------------------------------------------

    /// Move `amount` of `token` from `user` into the engine.
    #[instrument(skip(self), fields(user = %user, token = %token, amount = %amount))]
    pub fn deposit_collateral(&self, user: Address, token: Address, amount: U256) -> EngineResult<()> {
        self.run("deposit_collateral", |store| {
            let mut position = store.position(&user);
            position.record_deposit(&self.registry, token, amount)?;

            Ok(StagedOperation {
                positions: smallvec![(user, position)],
                settlement: Settlement::new().then(SettlementStep::PullCollateral {
                    token,
                    from: user,
                    amount,
                }),
                events: smallvec![EngineEvent::CollateralDeposited { user, token, amount }],
                health_factor: None,
            })
        })
    }

    /// Mint `amount` of debt token to `user`.
    #[instrument(skip(self), fields(user = %user, amount = %amount))]
    pub fn mint_dsc(&self, user: Address, amount: U256) -> EngineResult<()> {
        self.run("mint_dsc", |store| {
            let mut position = store.position(&user);
            position.record_mint(amount)?;
            let health_factor = self.health().revert_if_health_factor_broken(&position)?;

            Ok(StagedOperation {
                positions: smallvec![(user, position)],
                settlement: Settlement::new().then(SettlementStep::MintDebt { to: user, amount }),
                events: smallvec![EngineEvent::DscMinted { user, amount }],
                health_factor: Some(health_factor),
            })
        })
    }

    /// Return `amount` of `token` to `user`.
    #[instrument(skip(self), fields(user = %user, token = %token, amount = %amount))]
    pub fn redeem_collateral(&self, user: Address, token: Address, amount: U256) -> EngineResult<()> {
        self.run("redeem_collateral", |store| {
            if amount.is_zero() {
                return Err(EngineError::MustBeMoreThanZero);
            }
            self.registry.require(&token)?;

            let mut position = store.position(&user);
            position.record_withdrawal(token, amount)?;
            let health_factor = self.health().revert_if_health_factor_broken(&position)?;

            Ok(StagedOperation {
                positions: smallvec![(user, position)],
                settlement: Settlement::new().then(SettlementStep::PayCollateral {
                    token,
                    to: user,
                    amount,
                }),
                events: smallvec![EngineEvent::CollateralRedeemed {
                    from: user,
                    to: user,
                    token,
                    amount,
                }],
                health_factor: Some(health_factor),
            })
        })
    }

    /// Repay `amount` of `user`'s debt with their own tokens.
    #[instrument(skip(self), fields(user = %user, amount = %amount))]
    pub fn burn_dsc(&self, user: Address, amount: U256) -> EngineResult<()> {
        self.run("burn_dsc", |store| {
            let mut position = store.position(&user);
            position.record_burn(amount)?;

            Ok(StagedOperation {
                positions: smallvec![(user, position)],
                settlement: Settlement::new()
                    .then(SettlementStep::PullDebt { from: user, amount })
                    .then(SettlementStep::BurnDebt { amount }),
                events: smallvec![EngineEvent::DscBurned {
                    on_behalf_of: user,
                    payer: user,
                    amount,
                }],
                health_factor: None,
            })
        })
    }

    /// Deposit collateral and mint against it in one step.
    #[instrument(skip(self), fields(user = %user, token = %token))]
    pub fn deposit_collateral_and_mint_dsc(
        &self,
        user: Address,
        token: Address,
        collateral_amount: U256,
        mint_amount: U256,
    ) -> EngineResult<()> {
        self.run("deposit_collateral_and_mint_dsc", |store| {
            let mut position = store.position(&user);
            position.record_deposit(&self.registry, token, collateral_amount)?;
            position.record_mint(mint_amount)?;
            let health_factor = self.health().revert_if_health_factor_broken(&position)?;

            Ok(StagedOperation {
                positions: smallvec![(user, position)],
                settlement: Settlement::new()
                    .then(SettlementStep::PullCollateral {
                        token,
                        from: user,
                        amount: collateral_amount,
                    })
                    .then(SettlementStep::MintDebt {
                        to: user,
                        amount: mint_amount,
                    }),
                events: smallvec![
                    EngineEvent::CollateralDeposited {
                        user,
                        token,
                        amount: collateral_amount,
                    },
                    EngineEvent::DscMinted {
                        user,
                        amount: mint_amount,
                    },
                ],
                health_factor: Some(health_factor),
            })
        })
    }

    /// Burn debt, then redeem collateral, with a single trailing check.
    #[instrument(skip(self), fields(user = %user, token = %token))]
    pub fn redeem_collateral_for_dsc(
        &self,
        user: Address,
        token: Address,
        collateral_amount: U256,
        burn_amount: U256,
    ) -> EngineResult<()> {
        self.run("redeem_collateral_for_dsc", |store| {
            if collateral_amount.is_zero() {
                return Err(EngineError::MustBeMoreThanZero);
            }
            self.registry.require(&token)?;

            let mut position = store.position(&user);
            position.record_burn(burn_amount)?;
            position.record_withdrawal(token, collateral_amount)?;
            let health_factor = self.health().revert_if_health_factor_broken(&position)?;

            Ok(StagedOperation {
                positions: smallvec![(user, position)],
                settlement: Settlement::new()
                    .then(SettlementStep::PullDebt {
                        from: user,
                        amount: burn_amount,
                    })
                    .then(SettlementStep::BurnDebt { amount: burn_amount })
                    .then(SettlementStep::PayCollateral {
                        token,
                        to: user,
                        amount: collateral_amount,
                    }),
                events: smallvec![
                    EngineEvent::DscBurned {
                        on_behalf_of: user,
                        payer: user,
                        amount: burn_amount,
                    },
                    EngineEvent::CollateralRedeemed {
                        from: user,
                        to: user,
                        token,
                        amount: collateral_amount,
                    },
                ],
                health_factor: Some(health_factor),
            })
        })
    }

    /// Repay `debt_to_cover` of an under-collateralized `user`'s debt and
    /// receive the matching `token` collateral plus the liquidation bonus.
    ///
    /// The amount is not clamped: covering more than needed is allowed as
    /// long as the user's health factor strictly improves. Use
    /// [`Self::debt_to_restore_health`] to size a minimal liquidation.
    #[instrument(skip(self), fields(liquidator = %liquidator, user = %user, token = %token, debt_to_cover = %debt_to_cover))]
    pub fn liquidate(
        &self,
        liquidator: Address,
        user: Address,
        token: Address,
        debt_to_cover: U256,
    ) -> EngineResult<()> {
        self.run("liquidate", |store| {
            if debt_to_cover.is_zero() {
                return Err(EngineError::MustBeMoreThanZero);
            }
            let asset = self.registry.require(&token)?;
            let liquidation = self.liquidation();

            let mut position = store.position(&user);
            let plan = liquidation.plan(&position, asset, debt_to_cover)?;
            liquidation.apply(&plan, &mut position)?;
            let ending_health_factor = liquidation.verify_improved(&plan, &position)?;

            let liquidator_position = if liquidator == user {
                position.clone()
            } else {
                store.position(&liquidator)
            };
            self.health().revert_if_health_factor_broken(&liquidator_position)?;

            Ok(StagedOperation {
                positions: smallvec![(user, position)],
                settlement: Settlement::new()
                    .then(SettlementStep::PullDebt {
                        from: liquidator,
                        amount: debt_to_cover,
                    })
                    .then(SettlementStep::BurnDebt { amount: debt_to_cover })
                    .then(SettlementStep::PayCollateral {
                        token,
                        to: liquidator,
                        amount: plan.collateral_to_seize,
                    }),
                events: smallvec![EngineEvent::Liquidated {
                    liquidator,
                    user,
                    token,
                    debt_covered: debt_to_cover,
                    collateral_seized: plan.collateral_to_seize,
                }],
                health_factor: Some(ending_health_factor),
            })
        })
    }

    // ---------------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------------

    /// Current health factor; `U256::MAX` without debt.
    pub fn health_factor(&self, user: Address) -> EngineResult<U256> {
        let position = self.snapshot(&user);
        self.health().health_factor(&position)
    }

    /// `(minted debt, collateral value in USD)`.
    pub fn account_information(&self, user: Address) -> EngineResult<(U256, U256)> {
        let position = self.snapshot(&user);
        let collateral_value = self.valuation().total_collateral_value_usd(&position)?;
        Ok((position.debt(), collateral_value))
    }

    pub fn account_collateral_value(&self, user: Address) -> EngineResult<U256> {
        let position = self.snapshot(&user);
        self.valuation().total_collateral_value_usd(&position)
    }

    /// USD value of `amount` of a registered token.
    pub fn usd_value(&self, token: Address, amount: U256) -> EngineResult<U256> {
        let asset = self.registry.require(&token)?;
        self.valuation().usd_value(asset, amount)
    }

    /// Amount of a registered token worth `usd_amount` (WAD).
    pub fn token_amount_from_usd(&self, token: Address, usd_amount: U256) -> EngineResult<U256> {
        let asset = self.registry.require(&token)?;
        self.valuation().token_amount_from_usd(asset, usd_amount)
    }

    pub fn collateral_balance_of(&self, user: Address, token: Address) -> U256 {
        let _serial = self.op_lock.lock();
        self.store
            .read()
            .get(&user)
            .map(|p| p.collateral_of(&token))
            .unwrap_or(U256::ZERO)
    }

    pub fn minted_debt(&self, user: Address) -> U256 {
        let _serial = self.op_lock.lock();
        self.store.read().get(&user).map(|p| p.debt()).unwrap_or(U256::ZERO)
    }

    /// Copy of a user's position.
    pub fn position(&self, user: Address) -> UserPosition {
        self.snapshot(&user)
    }

    /// Registered collateral tokens, in registry order.
    pub fn collateral_tokens(&self) -> Vec<Address> {
        self.registry.tokens()
    }

    pub fn collateral_token_price_feed(&self, token: Address) -> Option<Address> {
        self.registry.get(&token).map(|a| a.price_feed)
    }

    /// Health factor from raw totals, without touching any position.
    pub fn calculate_health_factor(&self, debt: U256, collateral_value_usd: U256) -> EngineResult<U256> {
        health::calculate_health_factor(debt, collateral_value_usd, &self.params)
    }

    /// Smallest liquidation of `token` that restores `user` to the minimum
    /// health factor. See [`LiquidationEngine::debt_to_restore_health`].
    pub fn debt_to_restore_health(&self, user: Address, token: Address) -> EngineResult<Option<U256>> {
        let asset = self.registry.require(&token)?;
        let position = self.snapshot(&user);
        self.liquidation().debt_to_restore_health(&position, asset)
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    /// Debt token address.
    pub fn dsc(&self) -> Address {
        self.dsc.address()
    }

    /// Engine account address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Take every event recorded since the last drain.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn valuation(&self) -> ValuationEngine<'_> {
        ValuationEngine::new(&self.registry, &self.oracle)
    }

    fn health(&self) -> HealthFactorEngine<'_> {
        HealthFactorEngine::new(self.valuation(), &self.params)
    }

    fn liquidation(&self) -> LiquidationEngine<'_> {
        LiquidationEngine::new(self.valuation(), &self.params)
    }

    fn handles(&self) -> TokenHandles<'_> {
        TokenHandles {
            engine: self.address,
            dsc: &self.dsc,
            collateral: &self.collateral_tokens,
        }
    }

    /// Consistent copy of a position, waiting for any operation in flight.
    fn snapshot(&self, user: &Address) -> UserPosition {
        let _serial = self.op_lock.lock();
        self.store.read().position(user)
    }

    fn enter(&self) -> EngineResult<OperationGuard<'_>> {
        let active = self.op_lock.lock();
        if active.get() {
            return Err(EngineError::ReentrantCall);
        }
        active.set(true);
        Ok(OperationGuard { active })
    }

    /// Stage, commit and settle one operation.
    fn run<F>(&self, operation: &'static str, stage: F) -> EngineResult<()>
    where
        F: FnOnce(&PositionStore) -> EngineResult<StagedOperation>,
    {
        let result = self.enter().and_then(|_guard| {
            let staged = stage(&self.store.read())?;
            self.commit_and_settle(staged)
        });

        if let Err(ref e) = result {
            warn!(operation, error = %e, kind = ?e.kind(), "Operation rejected");
        }
        result
    }

    fn commit_and_settle(&self, staged: StagedOperation) -> EngineResult<()> {
        let StagedOperation {
            positions,
            settlement,
            events,
            health_factor,
        } = staged;

        let previous: SmallVec<[(Address, UserPosition); 2]> = {
            let mut store = self.store.write();
            positions
                .into_iter()
                .map(|(user, position)| (user, store.replace(user, position)))
                .collect()
        };

        if let Err(e) = settlement.execute(self.handles()) {
            let mut store = self.store.write();
            for (user, position) in previous.into_iter().rev() {
                store.replace(user, position);
            }
            debug!(error = %e, "Positions restored after failed settlement");
            return Err(e);
        }

        for event in &events {
            info!(
                ?event,
                health_factor = health_factor.map(wad_to_f64),
                "Operation settled"
            );
        }
        self.events.lock().extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OracleSettings;
    use crate::u256_math::WAD;
    use alloy::primitives::I256;
    use dsc_chain::{Erc20Ledger, InMemoryAggregator, TokenError};
    use std::sync::{OnceLock, Weak};

    const ENGINE: Address = Address::repeat_byte(0xe1);
    const DEPLOYER: Address = Address::repeat_byte(0xd0);
    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);
    const CAROL: Address = Address::repeat_byte(0xc0);
    const DSC: Address = Address::repeat_byte(0xd5);
    const WETH: Address = Address::repeat_byte(0x11);
    const WBTC: Address = Address::repeat_byte(0x12);
    const ETH_FEED: Address = Address::repeat_byte(0x21);
    const BTC_FEED: Address = Address::repeat_byte(0x22);

    fn usd(v: u64) -> U256 {
        U256::from(v) * WAD
    }

    fn eth(v: u64) -> U256 {
        U256::from(v) * WAD
    }

    /// Feed answer with 8 decimals.
    fn answer(dollars: i64) -> I256 {
        I256::try_from(dollars * 100_000_000).unwrap()
    }

    fn deployment() -> DeploymentParams {
        DeploymentParams {
            name: "test".to_string(),
            engine: ENGINE,
            dsc: DSC,
            token_addresses: vec![WETH, WBTC],
            price_feed_addresses: vec![ETH_FEED, BTC_FEED],
        }
    }

    struct Fixture {
        engine: DscEngine,
        weth: Arc<Erc20Ledger>,
        wbtc: Arc<Erc20Ledger>,
        dsc: Arc<Erc20Ledger>,
        eth_feed: Arc<InMemoryAggregator>,
    }

    impl Fixture {
        /// WETH at $2000, WBTC (8 decimals) at $30000. Alice and Bob hold
        /// 100 WETH and 1 WBTC each and approve the engine for everything.
        fn new() -> Self {
            let weth = Arc::new(Erc20Ledger::new(WETH, "WETH", 18, DEPLOYER));
            let wbtc = Arc::new(Erc20Ledger::new(WBTC, "WBTC", 8, DEPLOYER));
            let dsc = Arc::new(Erc20Ledger::new(DSC, "DSC", 18, ENGINE));
            let eth_feed = Arc::new(InMemoryAggregator::new(ETH_FEED, 8, answer(2000)));
            let btc_feed = Arc::new(InMemoryAggregator::new(BTC_FEED, 8, answer(30000)));

            for account in [ALICE, BOB] {
                weth.mint(DEPLOYER, account, eth(100)).unwrap();
                wbtc.mint(DEPLOYER, account, U256::from(100_000_000u64)).unwrap();
                weth.approve(account, ENGINE, U256::MAX).unwrap();
                wbtc.approve(account, ENGINE, U256::MAX).unwrap();
                dsc.approve(account, ENGINE, U256::MAX).unwrap();
            }

            let engine = DscEngine::new(
                &deployment(),
                Collaborators {
                    dsc: dsc.clone(),
                    collateral_tokens: vec![
                        weth.clone() as Arc<dyn FungibleToken>,
                        wbtc.clone() as Arc<dyn FungibleToken>,
                    ],
                    price_feeds: vec![
                        eth_feed.clone() as Arc<dyn PriceFeed>,
                        btc_feed as Arc<dyn PriceFeed>,
                    ],
                },
                &EngineConfig::default(),
            )
            .unwrap();

            Self {
                engine,
                weth,
                wbtc,
                dsc,
                eth_feed,
            }
        }

        fn set_eth_price(&self, dollars: i64) {
            self.eth_feed.update_answer(answer(dollars));
        }
    }

    // ------------------------------------------------------------------
    // Deposit / redeem
    // ------------------------------------------------------------------

    #[test]
    fn test_deposit_values_collateral() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(15)).unwrap();

        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(15));
        assert_eq!(f.engine.account_collateral_value(ALICE).unwrap(), usd(30000));
        assert_eq!(f.weth.balance_of(ENGINE), eth(15));
        assert_eq!(f.weth.balance_of(ALICE), eth(85));
        assert_eq!(
            f.engine.drain_events(),
            vec![EngineEvent::CollateralDeposited {
                user: ALICE,
                token: WETH,
                amount: eth(15)
            }]
        );
    }

    #[test]
    fn test_multi_asset_valuation() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(1)).unwrap();
        f.engine
            .deposit_collateral(ALICE, WBTC, U256::from(50_000_000u64))
            .unwrap();

        // $2000 + 0.5 * $30000
        assert_eq!(f.engine.account_collateral_value(ALICE).unwrap(), usd(17000));
        assert_eq!(
            f.engine.usd_value(WBTC, U256::from(100_000_000u64)).unwrap(),
            usd(30000)
        );
        assert_eq!(f.wbtc.balance_of(ENGINE), U256::from(50_000_000u64));
    }

    #[test]
    fn test_invalid_deposits_change_nothing() {
        let f = Fixture::new();
        let other_token = Address::repeat_byte(0x99);

        assert!(matches!(
            f.engine.deposit_collateral(ALICE, WETH, U256::ZERO),
            Err(EngineError::MustBeMoreThanZero)
        ));
        assert!(matches!(
            f.engine.deposit_collateral(ALICE, other_token, eth(1)),
            Err(EngineError::NotAllowedCollateral { token }) if token == other_token
        ));

        assert!(f.engine.position(ALICE).is_empty());
        assert_eq!(f.weth.balance_of(ALICE), eth(100));
        assert!(f.engine.drain_events().is_empty());
    }

    #[test]
    fn test_deposit_then_redeem_restores_balance() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(7)).unwrap();
        f.engine.redeem_collateral(ALICE, WETH, eth(7)).unwrap();

        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), U256::ZERO);
        assert_eq!(f.weth.balance_of(ALICE), eth(100));
        assert_eq!(f.weth.balance_of(ENGINE), U256::ZERO);
    }

    #[test]
    fn test_redeem_more_than_deposited() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(1)).unwrap();

        assert!(matches!(
            f.engine.redeem_collateral(ALICE, WETH, eth(2)),
            Err(EngineError::InsufficientCollateral { .. })
        ));
        assert!(matches!(
            f.engine.redeem_collateral(ALICE, WETH, U256::ZERO),
            Err(EngineError::MustBeMoreThanZero)
        ));
        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(1));
    }

    #[test]
    fn test_redeem_breaking_health_factor_rolls_back() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(10)).unwrap();
        f.engine.mint_dsc(ALICE, usd(5000)).unwrap();

        // 6 WETH left = $12000 * 0.5 = 6000 >= 5000
        f.engine.redeem_collateral(ALICE, WETH, eth(4)).unwrap();
        // 5 WETH left = 5000 / 5000 = 1.0, still allowed
        f.engine.redeem_collateral(ALICE, WETH, eth(1)).unwrap();

        assert!(matches!(
            f.engine.redeem_collateral(ALICE, WETH, U256::from(1u64)),
            Err(EngineError::HealthFactorTooLow { .. })
        ));
        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(5));
        assert_eq!(f.weth.balance_of(ALICE), eth(95));
    }

    // ------------------------------------------------------------------
    // Mint / burn
    // ------------------------------------------------------------------

    #[test]
    fn test_mint_within_limit_and_rollback_beyond() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(15)).unwrap();

        f.engine.mint_dsc(ALICE, usd(10000)).unwrap();
        assert_eq!(
            f.engine.health_factor(ALICE).unwrap(),
            WAD * U256::from(3u64) / U256::from(2u64)
        );
        f.engine.drain_events();

        let result = f.engine.mint_dsc(ALICE, usd(11000));
        match result {
            Err(EngineError::HealthFactorTooLow { health_factor }) => {
                assert!((wad_to_f64(health_factor) - 0.714).abs() < 0.001);
            }
            other => panic!("expected HealthFactorTooLow, got {:?}", other),
        }

        assert_eq!(f.engine.minted_debt(ALICE), usd(10000));
        assert_eq!(f.dsc.balance_of(ALICE), usd(10000));
        assert!(f.engine.drain_events().is_empty());
    }

    #[test]
    fn test_mint_then_burn_restores_debt() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(10)).unwrap();
        f.engine.mint_dsc(ALICE, usd(1000)).unwrap();
        f.engine.mint_dsc(ALICE, usd(250)).unwrap();
        f.engine.burn_dsc(ALICE, usd(250)).unwrap();

        assert_eq!(f.engine.minted_debt(ALICE), usd(1000));
        assert_eq!(f.dsc.balance_of(ALICE), usd(1000));
        assert_eq!(f.dsc.total_supply(), usd(1000));
    }

    #[test]
    fn test_mint_without_collateral_fails() {
        let f = Fixture::new();
        assert!(matches!(
            f.engine.mint_dsc(ALICE, usd(1)),
            Err(EngineError::HealthFactorTooLow { health_factor }) if health_factor.is_zero()
        ));
        assert!(matches!(
            f.engine.mint_dsc(ALICE, U256::ZERO),
            Err(EngineError::MustBeMoreThanZero)
        ));
    }

    #[test]
    fn test_burn_more_than_minted() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(10)).unwrap();
        f.engine.mint_dsc(ALICE, usd(100)).unwrap();

        assert!(matches!(
            f.engine.burn_dsc(ALICE, usd(101)),
            Err(EngineError::BurnExceedsDebt { .. })
        ));
        assert_eq!(f.dsc.balance_of(ALICE), usd(100));
    }

    #[test]
    fn test_deposit_and_burn_ignore_oracle_outage() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(10)).unwrap();
        f.engine.mint_dsc(ALICE, usd(1000)).unwrap();

        f.set_eth_price(0);

        f.engine.deposit_collateral(ALICE, WETH, eth(1)).unwrap();
        f.engine.burn_dsc(ALICE, usd(500)).unwrap();
        assert!(matches!(
            f.engine.mint_dsc(ALICE, usd(1)),
            Err(EngineError::OracleUnavailable { token, .. }) if token == WETH
        ));
        assert!(matches!(
            f.engine.redeem_collateral(ALICE, WETH, eth(1)),
            Err(EngineError::OracleUnavailable { .. })
        ));

        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(11));
        assert_eq!(f.engine.minted_debt(ALICE), usd(500));
    }

    #[test]
    fn test_debt_free_user_redeems_during_outage() {
        let f = Fixture::new();
        f.engine.deposit_collateral(ALICE, WETH, eth(3)).unwrap();
        f.set_eth_price(-1);

        f.engine.redeem_collateral(ALICE, WETH, eth(3)).unwrap();
        assert_eq!(f.engine.health_factor(ALICE).unwrap(), U256::MAX);
    }

    // ------------------------------------------------------------------
    // Compositions
    // ------------------------------------------------------------------

    #[test]
    fn test_deposit_and_mint_is_atomic() {
        let f = Fixture::new();

        assert!(matches!(
            f.engine
                .deposit_collateral_and_mint_dsc(ALICE, WETH, eth(1), usd(1001)),
            Err(EngineError::HealthFactorTooLow { .. })
        ));
        assert!(f.engine.position(ALICE).is_empty());
        assert_eq!(f.weth.balance_of(ALICE), eth(100));
        assert_eq!(f.dsc.total_supply(), U256::ZERO);

        f.engine
            .deposit_collateral_and_mint_dsc(ALICE, WETH, eth(1), usd(1000))
            .unwrap();
        assert_eq!(f.engine.account_information(ALICE).unwrap(), (usd(1000), usd(2000)));
        assert_eq!(f.engine.drain_events().len(), 2);
    }

    #[test]
    fn test_redeem_for_dsc() {
        let f = Fixture::new();
        f.engine
            .deposit_collateral_and_mint_dsc(ALICE, WETH, eth(10), usd(10000))
            .unwrap();

        // Redeeming alone would break the health factor
        assert!(matches!(
            f.engine.redeem_collateral(ALICE, WETH, eth(5)),
            Err(EngineError::HealthFactorTooLow { .. })
        ));

        f.engine
            .redeem_collateral_for_dsc(ALICE, WETH, eth(5), usd(5000))
            .unwrap();
        assert_eq!(f.engine.minted_debt(ALICE), usd(5000));
        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(5));
        assert_eq!(f.weth.balance_of(ALICE), eth(95));
        assert_eq!(f.dsc.balance_of(ALICE), usd(5000));
        assert_eq!(f.engine.health_factor(ALICE).unwrap(), WAD);
    }

    #[test]
    fn test_redeem_for_dsc_rolls_back_burn() {
        let f = Fixture::new();
        f.engine
            .deposit_collateral_and_mint_dsc(ALICE, WETH, eth(10), usd(10000))
            .unwrap();

        assert!(matches!(
            f.engine.redeem_collateral_for_dsc(ALICE, WETH, eth(6), usd(1000)),
            Err(EngineError::HealthFactorTooLow { .. })
        ));
        assert_eq!(f.engine.minted_debt(ALICE), usd(10000));
        assert_eq!(f.dsc.balance_of(ALICE), usd(10000));
    }

    // ------------------------------------------------------------------
    // Settlement failures and locking
    // ------------------------------------------------------------------

    #[test]
    fn test_transfer_failure_leaves_ledger_untouched() {
        let f = Fixture::new();
        f.weth.mint(DEPLOYER, CAROL, eth(5)).unwrap();

        // No approval
        assert!(matches!(
            f.engine.deposit_collateral(CAROL, WETH, eth(5)),
            Err(EngineError::TransferFailed {
                token,
                source: TokenError::InsufficientAllowance { .. },
            }) if token == WETH
        ));
        assert!(f.engine.position(CAROL).is_empty());
        assert_eq!(f.weth.balance_of(CAROL), eth(5));
    }

    #[test]
    fn test_failed_pay_out_restores_burned_debt() {
        let f = Fixture::new();
        f.engine
            .deposit_collateral_and_mint_dsc(ALICE, WETH, eth(10), usd(1000))
            .unwrap();

        // Drain the engine's WETH behind its back so the pay-out step fails
        f.weth.transfer(ENGINE, DEPLOYER, eth(10)).unwrap();

        assert!(matches!(
            f.engine.redeem_collateral_for_dsc(ALICE, WETH, eth(1), usd(500)),
            Err(EngineError::TransferFailed { token, .. }) if token == WETH
        ));
        assert_eq!(f.engine.minted_debt(ALICE), usd(1000));
        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(10));
        assert_eq!(f.dsc.balance_of(ALICE), usd(1000));
        assert_eq!(f.dsc.total_supply(), usd(1000));
    }

    #[test]
    fn test_concurrent_operations_are_serialized() {
        let f = Fixture::new();

        std::thread::scope(|s| {
            for user in [ALICE, BOB] {
                let engine = &f.engine;
                s.spawn(move || {
                    for _ in 0..20 {
                        engine.deposit_collateral(user, WETH, eth(1)).unwrap();
                        engine.mint_dsc(user, usd(100)).unwrap();
                    }
                });
            }
        });

        for user in [ALICE, BOB] {
            assert_eq!(f.engine.collateral_balance_of(user, WETH), eth(20));
            assert_eq!(f.engine.minted_debt(user), usd(2000));
        }
        assert_eq!(f.weth.balance_of(ENGINE), eth(40));
        assert_eq!(f.engine.drain_events().len(), 80);
    }

    /// Collateral token that calls back into the engine during `transfer_from`.
    #[derive(Debug)]
    struct ReentrantToken {
        inner: Erc20Ledger,
        engine: OnceLock<Weak<DscEngine>>,
        callback_result: parking_lot::Mutex<Option<EngineResult<()>>>,
        observed_balance: parking_lot::Mutex<Option<U256>>,
    }

    impl FungibleToken for ReentrantToken {
        fn address(&self) -> Address {
            self.inner.address()
        }
        fn decimals(&self) -> u8 {
            self.inner.decimals()
        }
        fn balance_of(&self, account: Address) -> U256 {
            self.inner.balance_of(account)
        }
        fn allowance(&self, owner: Address, spender: Address) -> U256 {
            self.inner.allowance(owner, spender)
        }
        fn approve(&self, caller: Address, spender: Address, amount: U256) -> Result<(), TokenError> {
            self.inner.approve(caller, spender, amount)
        }
        fn transfer(&self, caller: Address, to: Address, amount: U256) -> Result<(), TokenError> {
            self.inner.transfer(caller, to, amount)
        }
        fn transfer_from(
            &self,
            caller: Address,
            from: Address,
            to: Address,
            amount: U256,
        ) -> Result<(), TokenError> {
            if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                *self.callback_result.lock() = Some(engine.mint_dsc(from, U256::from(1u64)));
                *self.observed_balance.lock() = Some(engine.collateral_balance_of(from, self.address()));
            }
            self.inner.transfer_from(caller, from, to, amount)
        }
    }

    #[test]
    fn test_reentrant_call_rejected() {
        let token = Arc::new(ReentrantToken {
            inner: Erc20Ledger::new(WETH, "WETH", 18, DEPLOYER),
            engine: OnceLock::new(),
            callback_result: parking_lot::Mutex::new(None),
            observed_balance: parking_lot::Mutex::new(None),
        });
        token.inner.mint(DEPLOYER, ALICE, eth(10)).unwrap();
        token.inner.approve(ALICE, ENGINE, U256::MAX).unwrap();

        let dsc = Arc::new(Erc20Ledger::new(DSC, "DSC", 18, ENGINE));
        let mut params = deployment();
        params.token_addresses = vec![WETH];
        params.price_feed_addresses = vec![ETH_FEED];

        let engine = Arc::new(
            DscEngine::new(
                &params,
                Collaborators {
                    dsc: dsc.clone(),
                    collateral_tokens: vec![token.clone() as Arc<dyn FungibleToken>],
                    price_feeds: vec![
                        Arc::new(InMemoryAggregator::new(ETH_FEED, 8, answer(2000))) as Arc<dyn PriceFeed>,
                    ],
                },
                &EngineConfig::default(),
            )
            .unwrap(),
        );
        token.engine.set(Arc::downgrade(&engine)).unwrap();

        engine.deposit_collateral(ALICE, WETH, eth(10)).unwrap();

        assert!(matches!(
            *token.callback_result.lock(),
            Some(Err(EngineError::ReentrantCall))
        ));
        // Views still work from inside the callback
        assert_eq!(*token.observed_balance.lock(), Some(eth(10)));
        assert_eq!(engine.minted_debt(ALICE), U256::ZERO);
        assert_eq!(dsc.total_supply(), U256::ZERO);
        assert_eq!(engine.collateral_balance_of(ALICE, WETH), eth(10));

        // The guard is released afterwards
        engine.mint_dsc(ALICE, usd(100)).unwrap();
    }

    // ------------------------------------------------------------------
    // Liquidation
    // ------------------------------------------------------------------

    /// Alice: 10 WETH, 10000 debt (HF 1.0 at $2000). Bob: 20 WETH, 10000 debt.
    fn liquidation_fixture() -> Fixture {
        let f = Fixture::new();
        f.engine
            .deposit_collateral_and_mint_dsc(ALICE, WETH, eth(10), usd(10000))
            .unwrap();
        f.engine
            .deposit_collateral_and_mint_dsc(BOB, WETH, eth(20), usd(10000))
            .unwrap();
        f.engine.drain_events();
        f
    }

    #[test]
    fn test_liquidate_healthy_position_fails() {
        let f = liquidation_fixture();

        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, WETH, usd(100)),
            Err(EngineError::HealthFactorOk { health_factor }) if health_factor == WAD
        ));
        // Debt-free users can never be liquidated
        assert!(matches!(
            f.engine.liquidate(BOB, CAROL, WETH, usd(100)),
            Err(EngineError::HealthFactorOk { .. })
        ));
    }

    #[test]
    fn test_liquidate_improves_health_factor() {
        let f = liquidation_fixture();
        f.set_eth_price(1800);

        let before = f.engine.health_factor(ALICE).unwrap();
        assert_eq!(before, WAD * U256::from(9u64) / U256::from(10u64));

        f.engine.liquidate(BOB, ALICE, WETH, usd(2000)).unwrap();

        // 2000 / 1800 = 1.111... WETH, plus 10%
        let seized = U256::from(1_222_222_222_222_222_222u64);
        assert_eq!(f.engine.minted_debt(ALICE), usd(8000));
        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(10) - seized);
        assert_eq!(f.weth.balance_of(BOB), eth(80) + seized);
        assert_eq!(f.dsc.balance_of(BOB), usd(8000));
        assert_eq!(f.dsc.total_supply(), usd(18000));
        assert!(f.engine.health_factor(ALICE).unwrap() > before);

        assert_eq!(
            f.engine.drain_events(),
            vec![EngineEvent::Liquidated {
                liquidator: BOB,
                user: ALICE,
                token: WETH,
                debt_covered: usd(2000),
                collateral_seized: seized,
            }]
        );
    }

    #[test]
    fn test_liquidation_that_worsens_position_fails() {
        let f = liquidation_fixture();
        // Collateral worth exactly the debt: every bonus unit makes it worse
        f.set_eth_price(1000);

        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, WETH, usd(1000)),
            Err(EngineError::HealthFactorNotImproved { before, after }) if after < before
        ));
        assert_eq!(f.engine.minted_debt(ALICE), usd(10000));
        assert_eq!(f.dsc.balance_of(BOB), usd(10000));
        assert_eq!(f.weth.balance_of(BOB), eth(80));
    }

    #[test]
    fn test_liquidation_bounds() {
        let f = liquidation_fixture();
        f.set_eth_price(1800);

        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, WETH, U256::ZERO),
            Err(EngineError::MustBeMoreThanZero)
        ));
        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, Address::repeat_byte(0x99), usd(1)),
            Err(EngineError::NotAllowedCollateral { .. })
        ));
        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, WETH, usd(10001)),
            Err(EngineError::BurnExceedsDebt { .. })
        ));
        // Alice holds no WBTC to seize
        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, WBTC, usd(100)),
            Err(EngineError::InsufficientCollateral { token, .. }) if token == WBTC
        ));
    }

    #[test]
    fn test_liquidator_must_stay_healthy() {
        let f = Fixture::new();
        f.engine
            .deposit_collateral_and_mint_dsc(ALICE, WETH, eth(10), usd(10000))
            .unwrap();
        f.engine
            .deposit_collateral_and_mint_dsc(BOB, WETH, eth(10), usd(10000))
            .unwrap();
        f.set_eth_price(1800);

        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, WETH, usd(1000)),
            Err(EngineError::HealthFactorTooLow { .. })
        ));
        assert_eq!(f.engine.minted_debt(ALICE), usd(10000));
    }

    #[test]
    fn test_liquidator_without_allowance() {
        let f = liquidation_fixture();
        f.set_eth_price(1800);
        f.dsc.approve(BOB, ENGINE, U256::ZERO).unwrap();

        assert!(matches!(
            f.engine.liquidate(BOB, ALICE, WETH, usd(2000)),
            Err(EngineError::TransferFailed { token, .. }) if token == DSC
        ));
        assert_eq!(f.engine.minted_debt(ALICE), usd(10000));
        assert_eq!(f.engine.collateral_balance_of(ALICE, WETH), eth(10));
    }

    #[test]
    fn test_debt_to_restore_health() {
        let f = liquidation_fixture();
        assert_eq!(f.engine.debt_to_restore_health(ALICE, WETH).unwrap(), Some(U256::ZERO));

        f.set_eth_price(1800);
        let needed = f.engine.debt_to_restore_health(ALICE, WETH).unwrap().unwrap();

        // (10000 - 0.5 * 18000) / (1 - 0.5 * 1.1) = 2222.22...
        assert!(needed > usd(2222) && needed < usd(2223));

        f.engine.liquidate(BOB, ALICE, WETH, needed).unwrap();
        assert!(f.engine.health_factor(ALICE).unwrap() >= f.engine.params().min_health_factor());
    }

    #[test]
    fn test_debt_to_restore_health_impossible() {
        let f = liquidation_fixture();
        f.set_eth_price(1000);

        // Would need to seize more WETH than Alice holds
        assert_eq!(f.engine.debt_to_restore_health(ALICE, WETH).unwrap(), None);
    }

    // ------------------------------------------------------------------
    // Construction and views
    // ------------------------------------------------------------------

    fn collaborators() -> Collaborators {
        Collaborators {
            dsc: Arc::new(Erc20Ledger::new(DSC, "DSC", 18, ENGINE)),
            collateral_tokens: vec![
                Arc::new(Erc20Ledger::new(WETH, "WETH", 18, DEPLOYER)) as Arc<dyn FungibleToken>,
                Arc::new(Erc20Ledger::new(WBTC, "WBTC", 8, DEPLOYER)) as Arc<dyn FungibleToken>,
            ],
            price_feeds: vec![
                Arc::new(InMemoryAggregator::new(ETH_FEED, 8, answer(2000))) as Arc<dyn PriceFeed>,
                Arc::new(InMemoryAggregator::new(BTC_FEED, 8, answer(30000))) as Arc<dyn PriceFeed>,
            ],
        }
    }

    #[test]
    fn test_construction_validation() {
        let config = EngineConfig::default();

        let mut params = deployment();
        params.price_feed_addresses.pop();
        assert!(matches!(
            DscEngine::new(&params, collaborators(), &config),
            Err(EngineError::ConfigurationMismatch { tokens: 2, price_feeds: 1 })
        ));

        let mut params = deployment();
        params.dsc = Address::ZERO;
        assert!(matches!(
            DscEngine::new(&params, collaborators(), &config),
            Err(EngineError::InvalidConfiguration(_))
        ));

        let mut params = deployment();
        params.price_feed_addresses[1] = Address::ZERO;
        assert!(matches!(
            DscEngine::new(&params, collaborators(), &config),
            Err(EngineError::InvalidConfiguration(_))
        ));

        let mut params = deployment();
        params.token_addresses[1] = WETH;
        assert!(matches!(
            DscEngine::new(&params, collaborators(), &config),
            Err(EngineError::InvalidConfiguration(_))
        ));

        // Debt token still owned by the deployer
        let mut handles = collaborators();
        handles.dsc = Arc::new(Erc20Ledger::new(DSC, "DSC", 18, DEPLOYER));
        assert!(matches!(
            DscEngine::new(&deployment(), handles, &config),
            Err(EngineError::InvalidConfiguration(_))
        ));

        let mut handles = collaborators();
        handles.price_feeds.pop();
        assert!(matches!(
            DscEngine::new(&deployment(), handles, &config),
            Err(EngineError::InvalidConfiguration(_))
        ));

        let mut bad_risk = EngineConfig::default();
        bad_risk.risk.liquidation_threshold_bps = 0;
        assert!(matches!(
            DscEngine::new(&deployment(), collaborators(), &bad_risk),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_registry_views() {
        let engine = DscEngine::new(&deployment(), collaborators(), &EngineConfig::default()).unwrap();

        assert_eq!(engine.collateral_tokens(), vec![WETH, WBTC]);
        assert_eq!(engine.collateral_token_price_feed(WBTC), Some(BTC_FEED));
        assert_eq!(engine.collateral_token_price_feed(DSC), None);
        assert_eq!(engine.dsc(), DSC);
        assert_eq!(engine.address(), ENGINE);
        assert_eq!(engine.health_factor(ALICE).unwrap(), U256::MAX);
        assert_eq!(
            engine.token_amount_from_usd(WETH, usd(100)).unwrap(),
            U256::from(50_000_000_000_000_000u64)
        );
        assert_eq!(
            engine.calculate_health_factor(usd(100), usd(1000)).unwrap(),
            WAD * U256::from(5u64)
        );
    }

    #[test]
    fn test_staleness_guard() {
        let config = EngineConfig {
            oracle: OracleSettings {
                max_price_age_secs: Some(60),
            },
            ..EngineConfig::default()
        };
        let handles = collaborators();
        let stale_feed = Arc::new(InMemoryAggregator::empty(ETH_FEED, 8));
        stale_feed.update_round_data(dsc_chain::RoundData {
            round_id: 1,
            answer: answer(2000),
            started_at: 1,
            updated_at: 1,
            answered_in_round: 1,
        });
        let handles = Collaborators {
            price_feeds: vec![stale_feed as Arc<dyn PriceFeed>, handles.price_feeds[1].clone()],
            ..handles
        };

        let engine = DscEngine::new(&deployment(), handles, &config).unwrap();
        assert!(matches!(
            engine.usd_value(WETH, eth(1)),
            Err(EngineError::OracleUnavailable { .. })
        ));
        assert_eq!(engine.usd_value(WBTC, U256::from(100_000_000u64)).unwrap(), usd(30000));
    }
}
