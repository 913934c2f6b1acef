//! Borrower discovery and position reads.
//!
//! Reserve metadata (configuration and token addresses) is loaded once per
//! cycle; balances and prices are read per borrower. Bulk reads run in
//! bounded groups so one cycle never has more than a batch of calls in
//! flight.

use alloy::primitives::{Address, U256};
use anyhow::Result;
use liquidator_api::{ApiError, BorrowerIndex};
use liquidator_chain::{LendingPool, ReserveConfig, UserAccountSnapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::batch::map_in_groups;
use crate::position::{ReserveInfo, UserReserve, UserReserves};
use crate::u256_math;

/// Result of one health-factor read in a bulk scan.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthRead {
    /// Health factor (wad)
    Available(U256),
    /// The read failed; the borrower sits out this cycle
    Unavailable(String),
}

/// Batch sizes for reads.
#[derive(Debug, Clone, Copy)]
pub struct ReaderLimits {
    /// Borrowers per indexing-service page
    pub page_size: usize,
    /// Concurrent health-factor reads
    pub hf_batch_size: usize,
    /// Concurrent per-reserve reads for one borrower
    pub reserve_batch_size: usize,
}

impl Default for ReaderLimits {
    fn default() -> Self {
        Self {
            page_size: 1000,
            hf_batch_size: 50,
            reserve_batch_size: 10,
        }
    }
}

/// Read side of the pipeline.
pub struct PositionReader {
    pool: Arc<dyn LendingPool>,
    index: Arc<dyn BorrowerIndex>,
    limits: ReaderLimits,
    reserves: RwLock<Vec<ReserveInfo>>,
}

impl std::fmt::Debug for PositionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionReader")
            .field("limits", &self.limits)
            .field("reserves", &self.reserves.read().len())
            .finish_non_exhaustive()
    }
}

impl PositionReader {
    pub fn new(pool: Arc<dyn LendingPool>, index: Arc<dyn BorrowerIndex>, limits: ReaderLimits) -> Self {
        Self {
            pool,
            index,
            limits,
            reserves: RwLock::new(Vec::new()),
        }
    }

    pub fn pool(&self) -> &Arc<dyn LendingPool> {
        &self.pool
    }

    /// Page through the indexing service until a short or empty page.
    pub async fn list_borrowers(&self) -> Result<Vec<Address>, ApiError> {
        let page_size = self.limits.page_size.max(1);
        let mut borrowers = Vec::new();
        let mut after = None;

        loop {
            let page = self.index.borrowers_page(after, page_size).await?;
            let len = page.len();
            after = page.last().copied();
            borrowers.extend(page);

            if len < page_size || after.is_none() {
                break;
            }
        }

        debug!(count = borrowers.len(), "Listed borrowers");
        Ok(borrowers)
    }

    pub async fn account_snapshot(&self, user: Address) -> Result<UserAccountSnapshot> {
        self.pool.account_snapshot(user).await
    }

    pub async fn reserve_config(&self, asset: Address) -> Result<ReserveConfig> {
        self.pool.reserve_config(asset).await
    }

    /// Health factor as a plain decimal (1.0 = liquidation boundary).
    pub async fn health_factor(&self, user: Address) -> Result<f64> {
        let snapshot = self.pool.account_snapshot(user).await?;
        Ok(u256_math::wad_to_f64(snapshot.health_factor))
    }

    /// Health factors of many borrowers; failures are isolated per borrower.
    pub async fn health_factors(&self, users: &[Address]) -> Vec<(Address, HealthRead)> {
        let reads = map_in_groups(users, self.limits.hf_batch_size, |&user| {
            let pool = self.pool.clone();
            async move {
                match pool.account_snapshot(user).await {
                    Ok(snapshot) => (user, HealthRead::Available(snapshot.health_factor)),
                    Err(e) => (user, HealthRead::Unavailable(format!("{e:#}"))),
                }
            }
        })
        .await;

        let unavailable = reads
            .iter()
            .filter(|(_, r)| matches!(r, HealthRead::Unavailable(_)))
            .count();
        if unavailable > 0 {
            warn!(unavailable = unavailable, total = users.len(), "Some health factors unavailable");
        }
        reads
    }

    /// Load reserve configurations and token addresses for this cycle.
    pub async fn load_reserves(&self) -> Result<usize> {
        let assets = self.pool.reserves_list().await?;

        let loaded = map_in_groups(&assets, self.limits.reserve_batch_size, |&asset| {
            let pool = self.pool.clone();
            async move {
                let config = pool.reserve_config(asset).await?;
                let tokens = pool.reserve_tokens(asset).await?;
                Ok::<_, anyhow::Error>(ReserveInfo { config, tokens })
            }
        })
        .await;

        let reserves = loaded
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|r| r.config.is_active)
            .collect::<Vec<_>>();

        let count = reserves.len();
        *self.reserves.write() = reserves;
        info!(reserves = count, "Reserve metadata loaded");
        Ok(count)
    }

    /// Cached reserve metadata, loading it on first use.
    async fn reserves(&self) -> Result<Vec<ReserveInfo>> {
        if self.reserves.read().is_empty() {
            self.load_reserves().await?;
        }
        Ok(self.reserves.read().clone())
    }

    /// Priced balances of every reserve the user supplies or borrows.
    pub async fn user_reserves(&self, user: Address) -> Result<UserReserves> {
        let reserves = self.reserves().await?;

        let reads = map_in_groups(&reserves, self.limits.reserve_batch_size, |&reserve| {
            let pool = self.pool.clone();
            async move {
                let data = pool.user_reserve(reserve.asset(), user).await?;
                if data.supplied.is_zero() && data.total_debt().is_zero() {
                    return Ok::<_, anyhow::Error>(None);
                }
                let price = pool.asset_price(reserve.asset()).await?;
                Ok(Some(UserReserve {
                    reserve,
                    price,
                    supplied: data.supplied,
                    debt: data.total_debt(),
                    usage_as_collateral_enabled: data.usage_as_collateral_enabled,
                }))
            }
        })
        .await;

        let mut positions = UserReserves::new();
        for read in reads {
            if let Some(position) = read? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Close-factor switch point (wad).
    pub async fn close_factor_threshold(&self) -> Result<U256> {
        self.pool.close_factor_hf_threshold().await
    }
}
