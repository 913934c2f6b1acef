//! In-memory fakes of every external collaborator.
//!
//! Used by unit tests and, through the `testing` feature, by the
//! integration tests under `tests/`.

use alloy::primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use liquidator_api::{
    ApiError, AssembledSwap, BorrowerIndex, MarketInfo, Notification, Notifier, Quote,
    QuoteRequest, RedeemQuote, RedeemRequest, SwapAggregator, YieldMarketApi,
};
use liquidator_chain::{
    ExecutionError, LendingPool, LiquidationSubmitter, ReserveConfig, ReserveTokens, TokenRegistry,
    UserAccountSnapshot, UserReserveData,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::position::{LiquidationCandidate, ReserveInfo, UserReserve};
use crate::sizing;
use crate::u256_math::{self, WAD};

/// One US dollar in oracle base units.
pub const ONE_USD: u64 = 100_000_000;

/// Lending pool backed by maps.
#[derive(Debug)]
pub struct FakePool {
    reserves: Mutex<Vec<ReserveInfo>>,
    prices: Mutex<HashMap<Address, U256>>,
    health: Mutex<HashMap<Address, U256>>,
    failing: Mutex<HashSet<Address>>,
    balances: Mutex<HashMap<(Address, Address), UserReserveData>>,
    close_factor_threshold: Mutex<U256>,
}

impl Default for FakePool {
    fn default() -> Self {
        Self {
            reserves: Mutex::new(Vec::new()),
            prices: Mutex::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            balances: Mutex::new(HashMap::new()),
            close_factor_threshold: Mutex::new(WAD * U256::from(95u8) / U256::from(100u8)),
        }
    }
}

impl FakePool {
    /// Register reserve `Address::repeat_byte(id)`. A non-zero bonus makes it
    /// usable as collateral. Reserves are listed in insertion order.
    pub fn add_reserve(&self, id: u8, decimals: u8, bonus_bps: u16, price: U256) -> Address {
        let asset = Address::repeat_byte(id);
        self.reserves.lock().push(ReserveInfo {
            config: ReserveConfig {
                asset,
                decimals,
                ltv_bps: 8000,
                liquidation_threshold_bps: 8500,
                liquidation_bonus_bps: bonus_bps,
                usage_as_collateral_enabled: bonus_bps > 0,
                borrowing_enabled: true,
                is_active: true,
                is_frozen: false,
            },
            tokens: ReserveTokens {
                a_token: Address::repeat_byte(id ^ 0x80),
                stable_debt_token: Address::repeat_byte(id ^ 0x40),
                variable_debt_token: Address::repeat_byte(id ^ 0xc0),
            },
        });
        self.prices.lock().insert(asset, price);
        asset
    }

    pub fn set_price(&self, asset: Address, price: U256) {
        self.prices.lock().insert(asset, price);
    }

    pub fn set_health_factor(&self, user: Address, health_factor: U256) {
        self.health.lock().insert(user, health_factor);
    }

    pub fn set_close_factor_threshold(&self, threshold: U256) {
        *self.close_factor_threshold.lock() = threshold;
    }

    /// Make account reads for `user` fail.
    pub fn fail_account(&self, user: Address) {
        self.failing.lock().insert(user);
    }

    pub fn set_debt(&self, user: Address, asset: Address, amount: U256) {
        self.balances.lock().entry((user, asset)).or_default().variable_debt = amount;
    }

    pub fn set_supply(&self, user: Address, asset: Address, amount: U256) {
        let mut balances = self.balances.lock();
        let data = balances.entry((user, asset)).or_default();
        data.supplied = amount;
        data.usage_as_collateral_enabled = true;
    }

    fn reserve(&self, asset: Address) -> Result<ReserveInfo> {
        self.reserves
            .lock()
            .iter()
            .find(|r| r.asset() == asset)
            .copied()
            .ok_or_else(|| anyhow!("unknown reserve {asset}"))
    }
}

#[async_trait]
impl LendingPool for FakePool {
    async fn reserves_list(&self) -> Result<Vec<Address>> {
        Ok(self.reserves.lock().iter().map(|r| r.asset()).collect())
    }

    async fn reserve_config(&self, asset: Address) -> Result<ReserveConfig> {
        Ok(self.reserve(asset)?.config)
    }

    async fn reserve_tokens(&self, asset: Address) -> Result<ReserveTokens> {
        Ok(self.reserve(asset)?.tokens)
    }

    async fn user_reserve(&self, asset: Address, user: Address) -> Result<UserReserveData> {
        Ok(self
            .balances
            .lock()
            .get(&(user, asset))
            .copied()
            .unwrap_or_default())
    }

    /// Totals are summed from the configured balances at oracle prices.
    async fn account_snapshot(&self, user: Address) -> Result<UserAccountSnapshot> {
        if self.failing.lock().contains(&user) {
            return Err(anyhow!("execution reverted: account read failed"));
        }

        let reserves = self.reserves.lock().clone();
        let prices = self.prices.lock().clone();
        let balances = self.balances.lock();

        let mut total_collateral_base = U256::ZERO;
        let mut total_debt_base = U256::ZERO;
        for reserve in &reserves {
            let Some(data) = balances.get(&(user, reserve.asset())) else {
                continue;
            };
            let price = prices.get(&reserve.asset()).copied().unwrap_or_default();
            let decimals = reserve.config.decimals;
            if data.usage_as_collateral_enabled && reserve.config.usage_as_collateral_enabled {
                total_collateral_base +=
                    u256_math::base_value(data.supplied, price, decimals).unwrap_or_default();
            }
            total_debt_base += u256_math::base_value(data.total_debt(), price, decimals).unwrap_or_default();
        }

        Ok(UserAccountSnapshot {
            total_collateral_base,
            total_debt_base,
            health_factor: self.health.lock().get(&user).copied().unwrap_or(U256::MAX),
            ..Default::default()
        })
    }

    async fn asset_price(&self, asset: Address) -> Result<U256> {
        self.prices
            .lock()
            .get(&asset)
            .copied()
            .ok_or_else(|| anyhow!("no price for {asset}"))
    }

    async fn close_factor_hf_threshold(&self) -> Result<U256> {
        Ok(*self.close_factor_threshold.lock())
    }
}

/// Borrower index paging over a fixed list.
#[derive(Debug, Default)]
pub struct FakeBorrowerIndex {
    borrowers: Vec<Address>,
    pages_served: AtomicUsize,
}

impl FakeBorrowerIndex {
    pub fn new(borrowers: Vec<Address>) -> Self {
        Self {
            borrowers,
            pages_served: AtomicUsize::new(0),
        }
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BorrowerIndex for FakeBorrowerIndex {
    async fn borrowers_page(&self, after: Option<Address>, first: usize) -> Result<Vec<Address>, ApiError> {
        self.pages_served.fetch_add(1, Ordering::Relaxed);
        let start = match after {
            Some(after) => self
                .borrowers
                .iter()
                .position(|b| *b == after)
                .map_or(self.borrowers.len(), |i| i + 1),
            None => 0,
        };
        Ok(self.borrowers.iter().skip(start).take(first).copied().collect())
    }
}

/// Token registry backed by maps. Unknown tokens are not principal tokens.
#[derive(Debug, Default)]
pub struct FakeTokenRegistry {
    principal_tokens: Mutex<HashSet<Address>>,
    wrappers: Mutex<HashMap<Address, Address>>,
    decimals: Mutex<HashMap<Address, u8>>,
}

impl FakeTokenRegistry {
    pub fn mark_pt(&self, token: Address) {
        self.principal_tokens.lock().insert(token);
    }

    pub fn set_wrapper(&self, wrapper: Address, asset: Address) {
        self.wrappers.lock().insert(wrapper, asset);
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.decimals.lock().insert(token, decimals);
    }
}

#[async_trait]
impl TokenRegistry for FakeTokenRegistry {
    async fn is_principal_token(&self, token: Address) -> Result<bool> {
        Ok(self.principal_tokens.lock().contains(&token))
    }

    async fn wrapper_asset(&self, wrapper: Address) -> Result<Address> {
        self.wrappers
            .lock()
            .get(&wrapper)
            .copied()
            .ok_or_else(|| anyhow!("{wrapper} is not a wrapper"))
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        self.decimals
            .lock()
            .get(&token)
            .copied()
            .ok_or_else(|| anyhow!("no decimals for {token}"))
    }
}

/// Aggregator quoting 1:1 unless an output or rate is configured.
#[derive(Debug, Default)]
pub struct FakeAggregator {
    prices: Mutex<HashMap<Address, f64>>,
    fixed_output: Mutex<Option<U256>>,
    rate_bps: Mutex<Option<u32>>,
    quote_error: Mutex<Option<ApiError>>,
    assemble_error: Mutex<Option<ApiError>>,
    quote_requests: Mutex<Vec<QuoteRequest>>,
    assembled_receivers: Mutex<Vec<Address>>,
}

impl FakeAggregator {
    /// Router every assembled swap targets.
    pub const ROUTER: Address = Address::repeat_byte(0xd0);

    pub fn set_price(&self, token: Address, usd: f64) {
        self.prices.lock().insert(token, usd);
    }

    /// Quote this output for every request.
    pub fn set_output(&self, amount_out: U256) {
        *self.fixed_output.lock() = Some(amount_out);
    }

    /// Quote `amount_in * rate_bps / 10000` for every request.
    pub fn set_rate_bps(&self, rate_bps: u32) {
        *self.rate_bps.lock() = Some(rate_bps);
    }

    /// Fail the next quote with `err`.
    pub fn fail_quote(&self, err: ApiError) {
        *self.quote_error.lock() = Some(err);
    }

    /// Fail the next assembly with `err`.
    pub fn fail_assemble(&self, err: ApiError) {
        *self.assemble_error.lock() = Some(err);
    }

    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.quote_requests.lock().clone()
    }

    pub fn assembled_receivers(&self) -> Vec<Address> {
        self.assembled_receivers.lock().clone()
    }
}

#[async_trait]
impl SwapAggregator for FakeAggregator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, ApiError> {
        self.quote_requests.lock().push(request.clone());
        if let Some(err) = self.quote_error.lock().take() {
            return Err(err);
        }
        let amount_out = match (*self.fixed_output.lock(), *self.rate_bps.lock()) {
            (Some(fixed), _) => fixed,
            (None, Some(rate)) => {
                request.amount_in * U256::from(rate) / U256::from(u256_math::PERCENTAGE_FACTOR)
            }
            (None, None) => request.amount_in,
        };
        Ok(Quote {
            path_id: format!("path-{}", self.quote_requests.lock().len()),
            token_in: request.token_in,
            amount_in: request.amount_in,
            token_out: request.token_out,
            amount_out,
            gas_estimate: 250_000,
            user: request.user,
        })
    }

    async fn assemble(&self, quote: &Quote, receiver: Address) -> Result<AssembledSwap, ApiError> {
        self.assembled_receivers.lock().push(receiver);
        if let Some(err) = self.assemble_error.lock().take() {
            return Err(err);
        }
        Ok(AssembledSwap {
            to: Self::ROUTER,
            data: Bytes::from(quote.path_id.clone().into_bytes()),
            value: U256::ZERO,
            amount_out: quote.amount_out,
        })
    }

    async fn token_price(&self, token: Address) -> Result<f64, ApiError> {
        self.prices
            .lock()
            .get(&token)
            .copied()
            .ok_or_else(|| ApiError::Rejected {
                service: "aggregator",
                message: format!("no price for {token}"),
            })
    }
}

/// Yield market redeeming principal tokens 1:1.
#[derive(Debug, Default)]
pub struct FakeYieldMarket {
    markets: Mutex<Vec<MarketInfo>>,
    redeem_requests: Mutex<Vec<RedeemRequest>>,
}

impl FakeYieldMarket {
    /// Target of every redemption transaction.
    pub const ROUTER: Address = Address::repeat_byte(0xd1);

    pub fn add_market(&self, market: Address, pt: Address, underlying: Address) {
        self.markets.lock().push(MarketInfo {
            address: market,
            name: format!("PT-{pt}"),
            pt,
            underlying_asset: underlying,
            expiry: "2030-01-01T00:00:00.000Z".to_string(),
        });
    }

    pub fn redeem_requests(&self) -> Vec<RedeemRequest> {
        self.redeem_requests.lock().clone()
    }
}

#[async_trait]
impl YieldMarketApi for FakeYieldMarket {
    async fn active_markets(&self) -> Result<Vec<MarketInfo>, ApiError> {
        Ok(self.markets.lock().clone())
    }

    async fn redeem_quote(&self, request: &RedeemRequest) -> Result<RedeemQuote, ApiError> {
        self.redeem_requests.lock().push(request.clone());
        Ok(RedeemQuote {
            to: Self::ROUTER,
            data: Bytes::from(vec![0x5e, 0x11]),
            value: U256::ZERO,
            amount_out: request.amount_in,
        })
    }
}

/// Submitter recording every call; mined unless told to revert.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    sent: Mutex<Vec<(Address, Bytes)>>,
    revert_next: AtomicBool,
    tx_count: AtomicU64,
}

impl RecordingSubmitter {
    pub fn sent(&self) -> Vec<(Address, Bytes)> {
        self.sent.lock().clone()
    }

    /// Revert the next submission.
    pub fn revert_next(&self) {
        self.revert_next.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl LiquidationSubmitter for RecordingSubmitter {
    fn sender_address(&self) -> Address {
        Address::repeat_byte(0xee)
    }

    async fn submit(&self, to: Address, calldata: Bytes) -> Result<B256, ExecutionError> {
        self.sent.lock().push((to, calldata));
        let n = self.tx_count.fetch_add(1, Ordering::Relaxed) + 1;
        let tx_hash = B256::from(U256::from(n));
        if self.revert_next.swap(false, Ordering::Relaxed) {
            return Err(ExecutionError::Reverted { tx_hash });
        }
        Ok(tx_hash)
    }
}

/// Notifier keeping every notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) {
        self.notifications.lock().push(notification.clone());
    }
}

/// Candidate owing on reserve 0x10 against collateral reserve 0x20, both
/// 18 decimals at $1 with a 5% bonus on the collateral.
pub fn candidate(debt_to_cover: U256) -> LiquidationCandidate {
    let reserve = |id: u8, bonus: u16| ReserveInfo {
        config: ReserveConfig {
            asset: Address::repeat_byte(id),
            decimals: 18,
            ltv_bps: 8000,
            liquidation_threshold_bps: 8500,
            liquidation_bonus_bps: bonus,
            usage_as_collateral_enabled: bonus > 0,
            borrowing_enabled: true,
            is_active: true,
            is_frozen: false,
        },
        tokens: ReserveTokens {
            a_token: Address::repeat_byte(id ^ 0x80),
            stable_debt_token: Address::repeat_byte(id ^ 0x40),
            variable_debt_token: Address::repeat_byte(id ^ 0xc0),
        },
    };
    let price = U256::from(ONE_USD);
    let amount = U256::from(10_000u64) * WAD;

    LiquidationCandidate {
        user: Address::repeat_byte(0x01),
        health_factor: WAD / U256::from(2u8),
        collateral: UserReserve {
            reserve: reserve(0x20, 10500),
            price,
            supplied: amount,
            debt: U256::ZERO,
            usage_as_collateral_enabled: true,
        },
        debt: UserReserve {
            reserve: reserve(0x10, 0),
            price,
            supplied: U256::ZERO,
            debt: amount,
            usage_as_collateral_enabled: false,
        },
        debt_to_cover,
        profit_base: sizing::compute_profit(debt_to_cover, price, 18, 10500).unwrap_or_default(),
    }
}
