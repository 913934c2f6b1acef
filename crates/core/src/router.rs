//! Liquidator selection and submission.

use alloy::primitives::{Address, B256};
use liquidator_chain::{ExecutionError, LiquidateArgs, LiquidatorContract, LiquidatorKind};
use std::collections::HashSet;
use tracing::info;

use crate::position::LiquidationCandidate;
use crate::quote::RoutePlan;

/// Routes each liquidation to the flash-mint or flash-loan liquidator.
#[derive(Debug, Clone)]
pub struct ExecutionRouter {
    flash_mint: LiquidatorContract,
    flash_loan: LiquidatorContract,
    /// Debt assets the flash-mint liquidator can mint
    flash_mintable: HashSet<Address>,
}

impl ExecutionRouter {
    pub fn new(
        flash_mint: LiquidatorContract,
        flash_loan: LiquidatorContract,
        flash_mintable: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            flash_mint,
            flash_loan,
            flash_mintable: flash_mintable.into_iter().collect(),
        }
    }

    /// Liquidator for a given debt asset. Its address is also the receiver
    /// every swap leg must be quoted for.
    pub fn select(&self, debt_asset: Address) -> &LiquidatorContract {
        if self.flash_mintable.contains(&debt_asset) {
            &self.flash_mint
        } else {
            &self.flash_loan
        }
    }

    pub fn kind_for(&self, debt_asset: Address) -> LiquidatorKind {
        self.select(debt_asset).kind
    }

    /// Submit `liquidate(...)` through `contract`.
    pub async fn execute(
        &self,
        contract: &LiquidatorContract,
        candidate: &LiquidationCandidate,
        plan: &RoutePlan,
    ) -> Result<B256, ExecutionError> {
        let args = LiquidateArgs {
            collateral_a_token: candidate.collateral.reserve.tokens.a_token,
            debt_a_token: candidate.debt.reserve.tokens.a_token,
            user: candidate.user,
            debt_to_cover: candidate.debt_to_cover,
            unstake: plan.unstake,
            swap_payload: plan.route.encode_payload(),
        };

        let tx_hash = contract.liquidate(&args).await?;
        info!(
            user = %candidate.user,
            kind = %contract.kind,
            tx = %tx_hash,
            "Liquidation confirmed"
        );
        Ok(tx_hash)
    }
}
