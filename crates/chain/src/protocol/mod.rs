//! Lending protocol read layer.
//!
//! [`LendingPool`] is the seam between the liquidation pipeline and the
//! on-chain pool, oracle, data provider and liquidation logic contracts.
//! [`AaveV3Pool`] implements it over JSON-RPC; tests substitute in-memory
//! fakes.

mod aave_v3;

pub use aave_v3::{AaveV3Addresses, AaveV3Pool};

use alloy::primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;

/// Protocol-level settings of one reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveConfig {
    /// Underlying asset
    pub asset: Address,
    /// Token decimals
    pub decimals: u8,
    /// Loan-to-value (bps)
    pub ltv_bps: u16,
    /// Liquidation threshold (bps)
    pub liquidation_threshold_bps: u16,
    /// Liquidation bonus (bps, 10500 = 5% premium; 0 when not collateral)
    pub liquidation_bonus_bps: u16,
    pub usage_as_collateral_enabled: bool,
    pub borrowing_enabled: bool,
    pub is_active: bool,
    pub is_frozen: bool,
}

/// Token addresses attached to a reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveTokens {
    pub a_token: Address,
    pub stable_debt_token: Address,
    pub variable_debt_token: Address,
}

/// A user's balances in one reserve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserReserveData {
    /// Supplied balance (receipt token balance)
    pub supplied: U256,
    pub stable_debt: U256,
    pub variable_debt: U256,
    /// Whether the user has this reserve enabled as collateral
    pub usage_as_collateral_enabled: bool,
}

impl UserReserveData {
    /// Total outstanding debt in this reserve.
    pub fn total_debt(&self) -> U256 {
        self.stable_debt.saturating_add(self.variable_debt)
    }
}

/// A borrower's aggregate position as reported by the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserAccountSnapshot {
    /// Total collateral in base currency units (oracle decimals)
    pub total_collateral_base: U256,
    /// Total debt in base currency units (oracle decimals)
    pub total_debt_base: U256,
    pub available_borrows_base: U256,
    pub current_liquidation_threshold: U256,
    pub ltv: U256,
    /// Health factor (wad, 1e18 = 1.0)
    pub health_factor: U256,
}

/// Read access to the lending protocol.
#[async_trait]
pub trait LendingPool: Send + Sync {
    /// All reserves listed in the pool.
    async fn reserves_list(&self) -> Result<Vec<Address>>;

    /// Configuration of one reserve.
    async fn reserve_config(&self, asset: Address) -> Result<ReserveConfig>;

    /// Receipt and debt token addresses of one reserve.
    async fn reserve_tokens(&self, asset: Address) -> Result<ReserveTokens>;

    /// A user's balances in one reserve.
    async fn user_reserve(&self, asset: Address, user: Address) -> Result<UserReserveData>;

    /// A user's aggregate position.
    async fn account_snapshot(&self, user: Address) -> Result<UserAccountSnapshot>;

    /// Oracle price of an asset in base currency units.
    async fn asset_price(&self, asset: Address) -> Result<U256>;

    /// Health factor (wad) below which the whole debt may be repaid at once.
    async fn close_factor_hf_threshold(&self) -> Result<U256>;
}
