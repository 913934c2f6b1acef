//! Aave V3 style pool reader.
//!
//! Every read is a typed `eth_call` through alloy's `#[sol(rpc)]` bindings.

use super::{LendingPool, ReserveConfig, ReserveTokens, UserAccountSnapshot, UserReserveData};
use crate::contracts::{IAaveOracle, ILiquidationLogic, IPool, IPoolDataProvider};
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

/// Addresses of the protocol contracts the reader talks to.
#[derive(Debug, Clone, Copy)]
pub struct AaveV3Addresses {
    pub pool: Address,
    pub oracle: Address,
    pub data_provider: Address,
    pub liquidation_logic: Address,
}

/// JSON-RPC backed [`LendingPool`].
#[derive(Debug)]
pub struct AaveV3Pool {
    rpc_url: String,
    addresses: AaveV3Addresses,
    /// CLOSE_FACTOR_HF_THRESHOLD is a constant; read once
    close_factor_threshold: RwLock<Option<U256>>,
}

impl AaveV3Pool {
    /// Create a reader and verify the RPC endpoint answers.
    pub async fn connect(rpc_url: &str, addresses: AaveV3Addresses) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let block = provider.get_block_number().await?;

        info!(
            pool = %addresses.pool,
            oracle = %addresses.oracle,
            data_provider = %addresses.data_provider,
            block = block,
            "Pool reader connected"
        );

        Ok(Self::new(rpc_url, addresses))
    }

    /// Create a reader without probing the endpoint.
    pub fn new(rpc_url: &str, addresses: AaveV3Addresses) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            addresses,
            close_factor_threshold: RwLock::new(None),
        }
    }

    pub fn addresses(&self) -> &AaveV3Addresses {
        &self.addresses
    }

    fn provider(&self) -> Result<impl Provider> {
        Ok(ProviderBuilder::new().on_http(self.rpc_url.parse()?))
    }
}

#[async_trait]
impl LendingPool for AaveV3Pool {
    async fn reserves_list(&self) -> Result<Vec<Address>> {
        let provider = self.provider()?;
        let pool = IPool::new(self.addresses.pool, &provider);
        let reserves = pool
            .getReservesList()
            .call()
            .await
            .context("getReservesList")?
            ._0;
        debug!(count = reserves.len(), "Fetched reserves list");
        Ok(reserves)
    }

    async fn reserve_config(&self, asset: Address) -> Result<ReserveConfig> {
        let provider = self.provider()?;
        let data_provider = IPoolDataProvider::new(self.addresses.data_provider, &provider);
        let data = data_provider
            .getReserveConfigurationData(asset)
            .call()
            .await
            .with_context(|| format!("getReserveConfigurationData({asset})"))?;

        Ok(ReserveConfig {
            asset,
            decimals: data.decimals.saturating_to::<u8>(),
            ltv_bps: data.ltv.saturating_to::<u16>(),
            liquidation_threshold_bps: data.liquidationThreshold.saturating_to::<u16>(),
            liquidation_bonus_bps: data.liquidationBonus.saturating_to::<u16>(),
            usage_as_collateral_enabled: data.usageAsCollateralEnabled,
            borrowing_enabled: data.borrowingEnabled,
            is_active: data.isActive,
            is_frozen: data.isFrozen,
        })
    }

    async fn reserve_tokens(&self, asset: Address) -> Result<ReserveTokens> {
        let provider = self.provider()?;
        let data_provider = IPoolDataProvider::new(self.addresses.data_provider, &provider);
        let tokens = data_provider
            .getReserveTokensAddresses(asset)
            .call()
            .await
            .with_context(|| format!("getReserveTokensAddresses({asset})"))?;

        Ok(ReserveTokens {
            a_token: tokens.aTokenAddress,
            stable_debt_token: tokens.stableDebtTokenAddress,
            variable_debt_token: tokens.variableDebtTokenAddress,
        })
    }

    async fn user_reserve(&self, asset: Address, user: Address) -> Result<UserReserveData> {
        let provider = self.provider()?;
        let data_provider = IPoolDataProvider::new(self.addresses.data_provider, &provider);
        let data = data_provider
            .getUserReserveData(asset, user)
            .call()
            .await
            .with_context(|| format!("getUserReserveData({asset}, {user})"))?;

        Ok(UserReserveData {
            supplied: data.currentATokenBalance,
            stable_debt: data.currentStableDebt,
            variable_debt: data.currentVariableDebt,
            usage_as_collateral_enabled: data.usageAsCollateralEnabled,
        })
    }

    async fn account_snapshot(&self, user: Address) -> Result<UserAccountSnapshot> {
        let provider = self.provider()?;
        let pool = IPool::new(self.addresses.pool, &provider);
        let data = pool
            .getUserAccountData(user)
            .call()
            .await
            .with_context(|| format!("getUserAccountData({user})"))?;

        Ok(UserAccountSnapshot {
            total_collateral_base: data.totalCollateralBase,
            total_debt_base: data.totalDebtBase,
            available_borrows_base: data.availableBorrowsBase,
            current_liquidation_threshold: data.currentLiquidationThreshold,
            ltv: data.ltv,
            health_factor: data.healthFactor,
        })
    }

    async fn asset_price(&self, asset: Address) -> Result<U256> {
        let provider = self.provider()?;
        let oracle = IAaveOracle::new(self.addresses.oracle, &provider);
        let price = oracle
            .getAssetPrice(asset)
            .call()
            .await
            .with_context(|| format!("getAssetPrice({asset})"))?
            ._0;
        Ok(price)
    }

    async fn close_factor_hf_threshold(&self) -> Result<U256> {
        if let Some(threshold) = *self.close_factor_threshold.read() {
            return Ok(threshold);
        }

        let provider = self.provider()?;
        let logic = ILiquidationLogic::new(self.addresses.liquidation_logic, &provider);
        let threshold = logic
            .CLOSE_FACTOR_HF_THRESHOLD()
            .call()
            .await
            .context("CLOSE_FACTOR_HF_THRESHOLD")?
            ._0;

        info!(threshold = %threshold, "Close factor threshold loaded");
        *self.close_factor_threshold.write() = Some(threshold);
        Ok(threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> AaveV3Addresses {
        AaveV3Addresses {
            pool: Address::repeat_byte(1),
            oracle: Address::repeat_byte(2),
            data_provider: Address::repeat_byte(3),
            liquidation_logic: Address::repeat_byte(4),
        }
    }

    #[test]
    fn test_new_keeps_addresses() {
        let pool = AaveV3Pool::new("http://localhost:8545", addresses());
        assert_eq!(pool.addresses().pool, Address::repeat_byte(1));
        assert!(pool.close_factor_threshold.read().is_none());
    }

    #[tokio::test]
    async fn test_close_factor_threshold_served_from_cache() {
        let pool = AaveV3Pool::new("http://127.0.0.1:1", addresses());
        let threshold = U256::from(950_000_000_000_000_000u64);
        *pool.close_factor_threshold.write() = Some(threshold);

        // Endpoint is unreachable; a cache hit must not touch it.
        assert_eq!(pool.close_factor_hf_threshold().await.unwrap(), threshold);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let pool = AaveV3Pool::new("http://127.0.0.1:1", addresses());
        assert!(pool.reserves_list().await.is_err());
    }
}
