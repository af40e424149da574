//! Ordered token calls for one operation.
//!
//! The engine commits ledger changes before it moves tokens. A [`Settlement`]
//! runs the resulting transfers in order and, when one fails, undoes the ones
//! that already ran (newest first) so the caller can restore the ledger and
//! report a clean failure.

use alloy::primitives::{Address, U256};
use dsc_chain::{FungibleToken, MintableToken, TokenError};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{EngineError, EngineResult};

/// A single token movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStep {
    /// Collateral from `from` into the engine (needs an allowance).
    PullCollateral { token: Address, from: Address, amount: U256 },
    /// Collateral from the engine to `to`.
    PayCollateral { token: Address, to: Address, amount: U256 },
    /// Debt tokens from `from` into the engine (needs an allowance).
    PullDebt { from: Address, amount: U256 },
    /// Destroy debt tokens held by the engine.
    BurnDebt { amount: U256 },
    /// Create debt tokens for `to`.
    MintDebt { to: Address, amount: U256 },
}

/// Token handles a settlement runs against.
#[derive(Clone, Copy)]
pub struct TokenHandles<'a> {
    /// Engine account, the caller of every token call
    pub engine: Address,
    pub dsc: &'a Arc<dyn MintableToken>,
    pub collateral: &'a HashMap<Address, Arc<dyn FungibleToken>>,
}

impl<'a> TokenHandles<'a> {
    fn collateral_token(&self, token: Address) -> EngineResult<&'a Arc<dyn FungibleToken>> {
        self.collateral
            .get(&token)
            .ok_or(EngineError::NotAllowedCollateral { token })
    }
}

/// Ordered list of token calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settlement {
    steps: SmallVec<[SettlementStep; 4]>,
}

impl Settlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then(mut self, step: SettlementStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[SettlementStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order.
    ///
    /// On failure the completed steps are compensated in reverse order and
    /// the failing step's error is returned. A compensation that itself fails
    /// is logged; the original error still wins.
    pub fn execute(&self, handles: TokenHandles<'_>) -> EngineResult<()> {
        for (index, step) in self.steps.iter().enumerate() {
            debug!(?step, "Settlement step");
            if let Err(e) = run(step, handles) {
                debug!(?step, error = %e, completed = index, "Settlement step failed, compensating");
                for done in self.steps[..index].iter().rev() {
                    if let Err(comp) = compensate(done, handles) {
                        error!(step = ?done, error = %comp, "Compensation failed");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

fn run(step: &SettlementStep, handles: TokenHandles<'_>) -> EngineResult<()> {
    let engine = handles.engine;
    let dsc = handles.dsc;
    let dsc_failed = |source: TokenError| EngineError::TransferFailed {
        token: dsc.address(),
        source,
    };

    match *step {
        SettlementStep::PullCollateral { token, from, amount } => handles
            .collateral_token(token)?
            .transfer_from(engine, from, engine, amount)
            .map_err(|source| EngineError::TransferFailed { token, source }),
        SettlementStep::PayCollateral { token, to, amount } => handles
            .collateral_token(token)?
            .transfer(engine, to, amount)
            .map_err(|source| EngineError::TransferFailed { token, source }),
        SettlementStep::PullDebt { from, amount } => {
            dsc.transfer_from(engine, from, engine, amount).map_err(dsc_failed)
        }
        SettlementStep::BurnDebt { amount } => dsc.burn(engine, amount).map_err(dsc_failed),
        SettlementStep::MintDebt { to, amount } => dsc
            .mint(engine, to, amount)
            .map_err(|source| EngineError::MintFailed { source }),
    }
}

/// Inverse of a completed step.
///
/// Steps that paid tokens out can only be reversed with the recipient's
/// allowance; operations order those steps last so they are never undone.
fn compensate(step: &SettlementStep, handles: TokenHandles<'_>) -> Result<(), TokenError> {
    let engine = handles.engine;
    let dsc = handles.dsc;

    match *step {
        SettlementStep::PullCollateral { token, from, amount } => match handles.collateral.get(&token) {
            Some(t) => t.transfer(engine, from, amount),
            None => Err(TokenError::ZeroAddress),
        },
        SettlementStep::PayCollateral { token, to, amount } => match handles.collateral.get(&token) {
            Some(t) => t.transfer_from(engine, to, engine, amount),
            None => Err(TokenError::ZeroAddress),
        },
        SettlementStep::PullDebt { from, amount } => dsc.transfer(engine, from, amount),
        SettlementStep::BurnDebt { amount } => dsc.mint(engine, engine, amount),
        SettlementStep::MintDebt { to, amount } => {
            dsc.transfer_from(engine, to, engine, amount)?;
            dsc.burn(engine, amount)
        }
    }
}
