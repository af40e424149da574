//! Engine events and their topic signatures.
//!
//! Events are recorded only once an operation has fully settled, so the log
//! never contains an event for a reverted call.

use alloy::primitives::{keccak256, Address, B256, U256};
use serde::Serialize;

/// Keccak256 topic hashes, matching the Solidity event declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineEventSignatures {
    /// CollateralDeposited(address indexed user, address indexed token, uint256 indexed amount)
    pub collateral_deposited: B256,
    /// CollateralRedeemed(address indexed redeemedFrom, address indexed redeemedTo, address indexed token, uint256 amount)
    pub collateral_redeemed: B256,
    /// DscMinted(address indexed user, uint256 amount)
    pub dsc_minted: B256,
    /// DscBurned(address indexed onBehalfOf, address indexed dscFrom, uint256 amount)
    pub dsc_burned: B256,
    /// Liquidated(address indexed liquidator, address indexed user, address indexed token, uint256 debtCovered, uint256 collateralSeized)
    pub liquidated: B256,
}

impl EngineEventSignatures {
    pub fn new() -> Self {
        Self {
            collateral_deposited: keccak256("CollateralDeposited(address,address,uint256)"),
            collateral_redeemed: keccak256("CollateralRedeemed(address,address,address,uint256)"),
            dsc_minted: keccak256("DscMinted(address,uint256)"),
            dsc_burned: keccak256("DscBurned(address,address,uint256)"),
            liquidated: keccak256("Liquidated(address,address,address,uint256,uint256)"),
        }
    }

    /// All topics, for log filtering.
    pub fn all_signatures(&self) -> Vec<B256> {
        vec![
            self.collateral_deposited,
            self.collateral_redeemed,
            self.dsc_minted,
            self.dsc_burned,
            self.liquidated,
        ]
    }
}

impl Default for EngineEventSignatures {
    fn default() -> Self {
        Self::new()
    }
}

/// A state change recorded by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    CollateralDeposited {
        user: Address,
        token: Address,
        amount: U256,
    },
    CollateralRedeemed {
        from: Address,
        to: Address,
        token: Address,
        amount: U256,
    },
    DscMinted {
        user: Address,
        amount: U256,
    },
    DscBurned {
        on_behalf_of: Address,
        payer: Address,
        amount: U256,
    },
    Liquidated {
        liquidator: Address,
        user: Address,
        token: Address,
        debt_covered: U256,
        collateral_seized: U256,
    },
}

impl EngineEvent {
    /// Topic hash of this event.
    pub fn topic(&self) -> B256 {
        let sigs = EngineEventSignatures::new();
        match self {
            Self::CollateralDeposited { .. } => sigs.collateral_deposited,
            Self::CollateralRedeemed { .. } => sigs.collateral_redeemed,
            Self::DscMinted { .. } => sigs.dsc_minted,
            Self::DscBurned { .. } => sigs.dsc_burned,
            Self::Liquidated { .. } => sigs.liquidated,
        }
    }

    /// Check if this event touches `account`'s position.
    pub fn affects_position(&self, account: Address) -> bool {
        match self {
            Self::CollateralDeposited { user, .. } | Self::DscMinted { user, .. } => *user == account,
            Self::CollateralRedeemed { from, .. } => *from == account,
            Self::DscBurned { on_behalf_of, .. } => *on_behalf_of == account,
            Self::Liquidated { liquidator, user, .. } => *user == account || *liquidator == account,
        }
    }

    pub fn is_liquidation(&self) -> bool {
        matches!(self, Self::Liquidated { .. })
    }
}
