//! Swap route assembly.
//!
//! The seized collateral must be turned into the debt asset inside the
//! liquidation transaction. Two routes exist:
//!
//! - **Direct**: one aggregator swap, collateral -> debt asset.
//! - **Principal token**: redeem the PT into its underlying through the
//!   yield market, then (unless the underlying already is the debt asset)
//!   swap underlying -> debt asset through the aggregator.
//!
//! Collateral listed as an unstake token is first unwrapped on-chain; the
//! route is then chosen for the wrapper's underlying. Every leg is quoted
//! with the liquidator contract as receiver.

use alloy::primitives::{Address, Bytes, U256};
use liquidator_api::{
    ApiError, AssembledSwap, Quote, QuoteRequest, RedeemQuote, RedeemRequest, SwapAggregator,
    YieldMarketApi,
};
use liquidator_chain::{encode_swap_payload, TokenRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{LiquidationError, Step};
use crate::position::LiquidationCandidate;
use crate::u256_math::{self, PERCENTAGE_FACTOR};

/// Slippage and estimation buffers.
#[derive(Debug, Clone, Copy)]
pub struct QuoteSettings {
    /// Aggregator / redemption slippage (bps)
    pub slippage_bps: u16,
    /// Extra PT input when sized from a price ratio (bps)
    pub pt_estimate_buffer_bps: u32,
    /// PT input buffer when the price estimate is unavailable (bps)
    pub pt_fallback_buffer_bps: u32,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            slippage_bps: 50,
            pt_estimate_buffer_bps: 1_000,
            pt_fallback_buffer_bps: 5_000,
        }
    }
}

/// Assembled swap legs for one liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapRoute {
    /// Single aggregator leg; `swap` is `None` when collateral and debt are the same asset.
    Direct {
        source: Address,
        amount_in: U256,
        swap: Option<AssembledSwap>,
    },
    /// PT redemption followed by an optional aggregator leg.
    PrincipalToken {
        pt: Address,
        market: Address,
        underlying: Address,
        pt_amount: U256,
        redeem: RedeemQuote,
        swap: Option<AssembledSwap>,
    },
}

impl SwapRoute {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::PrincipalToken { .. } => "principal_token",
        }
    }

    /// Aggregator leg, if any.
    pub fn aggregator_leg(&self) -> Option<&AssembledSwap> {
        match self {
            Self::Direct { swap, .. } | Self::PrincipalToken { swap, .. } => swap.as_ref(),
        }
    }

    /// Redemption leg, if any.
    pub fn redeem_leg(&self) -> Option<&RedeemQuote> {
        match self {
            Self::Direct { .. } => None,
            Self::PrincipalToken { redeem, .. } => Some(redeem),
        }
    }

    /// Expected debt-asset output of the final leg.
    pub fn expected_output(&self) -> U256 {
        match (self.aggregator_leg(), self.redeem_leg()) {
            (Some(swap), _) => swap.amount_out,
            (None, Some(redeem)) => redeem.amount_out,
            (None, None) => U256::ZERO,
        }
    }

    /// Encode as the liquidator's swap payload. Missing legs are a zero
    /// target with empty calldata.
    pub fn encode_payload(&self) -> Bytes {
        let (pendle_target, pendle_data) = match self.redeem_leg() {
            Some(redeem) => (redeem.to, redeem.data.clone()),
            None => (Address::ZERO, Bytes::new()),
        };
        let (aggregator_target, aggregator_data) = match self.aggregator_leg() {
            Some(swap) => (swap.to, swap.data.clone()),
            None => (Address::ZERO, Bytes::new()),
        };
        encode_swap_payload(pendle_target, pendle_data, aggregator_target, aggregator_data)
    }
}

/// A route plus the unstake flag passed to `liquidate(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub route: SwapRoute,
    pub unstake: bool,
    /// Liquidator contract every leg pays out to
    pub receiver: Address,
}

/// Builds [`RoutePlan`]s from external quote services.
pub struct QuoteAssembler {
    aggregator: Arc<dyn SwapAggregator>,
    yield_market: Arc<dyn YieldMarketApi>,
    tokens: Arc<dyn TokenRegistry>,
    settings: QuoteSettings,
    /// collateral token -> wrapper contract to unstake through
    unstake_wrappers: HashMap<Address, Address>,
}

impl std::fmt::Debug for QuoteAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteAssembler")
            .field("aggregator", &self.aggregator.name())
            .field("settings", &self.settings)
            .field("unstake_wrappers", &self.unstake_wrappers.len())
            .finish_non_exhaustive()
    }
}

impl QuoteAssembler {
    pub fn new(
        aggregator: Arc<dyn SwapAggregator>,
        yield_market: Arc<dyn YieldMarketApi>,
        tokens: Arc<dyn TokenRegistry>,
        settings: QuoteSettings,
    ) -> Self {
        Self {
            aggregator,
            yield_market,
            tokens,
            settings,
            unstake_wrappers: HashMap::new(),
        }
    }

    /// Configure tokens that must be unstaked through a wrapper before swapping.
    pub fn with_unstake_wrappers(mut self, wrappers: HashMap<Address, Address>) -> Self {
        self.unstake_wrappers = wrappers;
        self
    }

    pub fn settings(&self) -> &QuoteSettings {
        &self.settings
    }

    /// Build the swap legs converting the candidate's collateral into its debt asset.
    #[instrument(skip(self, candidate), fields(user = %candidate.user, collateral = %candidate.collateral.asset(), debt = %candidate.debt.asset()))]
    pub async fn assemble(
        &self,
        candidate: &LiquidationCandidate,
        receiver: Address,
    ) -> Result<RoutePlan, LiquidationError> {
        let collateral = candidate.collateral.asset();

        let (source, unstake) = match self.unstake_wrappers.get(&collateral) {
            Some(&wrapper) => {
                let underlying = self
                    .tokens
                    .wrapper_asset(wrapper)
                    .await
                    .map_err(|e| LiquidationError::transient(Step::ResolveWrapper, format!("{e:#}")))?;
                debug!(wrapper = %wrapper, underlying = %underlying, "Collateral will be unstaked");
                (underlying, true)
            }
            None => (collateral, false),
        };

        let is_pt = self
            .tokens
            .is_principal_token(source)
            .await
            .map_err(|e| LiquidationError::transient(Step::ClassifyCollateral, format!("{e:#}")))?;

        let route = if is_pt {
            self.principal_token_route(candidate, source, receiver).await?
        } else {
            self.direct_route(candidate, source, unstake, receiver).await?
        };

        info!(
            route = route.kind(),
            unstake = unstake,
            expected_out = %route.expected_output(),
            debt_to_cover = %candidate.debt_to_cover,
            "Swap route assembled"
        );

        Ok(RoutePlan {
            route,
            unstake,
            receiver,
        })
    }

    async fn direct_route(
        &self,
        candidate: &LiquidationCandidate,
        source: Address,
        unstake: bool,
        receiver: Address,
    ) -> Result<SwapRoute, LiquidationError> {
        let debt = candidate.debt.asset();
        let amount_in = self.estimate_direct_input(candidate, source, unstake).await?;

        if source == debt {
            return Ok(SwapRoute::Direct {
                source,
                amount_in,
                swap: None,
            });
        }

        let mut amount_in = amount_in;
        let mut quote = self.quote_direct(source, amount_in, debt, receiver).await?;

        // One re-quote, scaled by the shortfall, before giving up on the estimate.
        if quote.amount_out < candidate.debt_to_cover && !quote.amount_out.is_zero() {
            let topped_up =
                u256_math::mul_div_up(amount_in, candidate.debt_to_cover, quote.amount_out)?;
            debug!(
                amount_out = %quote.amount_out,
                debt_to_cover = %candidate.debt_to_cover,
                amount_in = %amount_in,
                topped_up = %topped_up,
                "Quoted output short, re-quoting"
            );
            amount_in = topped_up;
            quote = self.quote_direct(source, amount_in, debt, receiver).await?;
        }

        if quote.amount_out < candidate.debt_to_cover {
            warn!(
                amount_out = %quote.amount_out,
                debt_to_cover = %candidate.debt_to_cover,
                "Quoted output below repay amount"
            );
        }

        let swap = self
            .aggregator
            .assemble(&quote, receiver)
            .await
            .map_err(|e| LiquidationError::from_api(Step::AggregatorAssemble, e))?;

        Ok(SwapRoute::Direct {
            source,
            amount_in,
            swap: Some(swap),
        })
    }

    async fn quote_direct(
        &self,
        source: Address,
        amount_in: U256,
        debt: Address,
        receiver: Address,
    ) -> Result<Quote, LiquidationError> {
        let request = QuoteRequest::new(source, amount_in, debt, receiver)
            .with_slippage_bps(self.settings.slippage_bps);
        self.aggregator
            .quote(&request)
            .await
            .map_err(|e| LiquidationError::from_api(Step::AggregatorQuote, e))
    }

    /// Source amount needed to buy the repay amount, plus slippage.
    async fn estimate_direct_input(
        &self,
        candidate: &LiquidationCandidate,
        source: Address,
        unstake: bool,
    ) -> Result<U256, LiquidationError> {
        let debt = &candidate.debt;
        let source_decimals = if source == candidate.collateral.asset() {
            candidate.collateral.decimals()
        } else {
            self.tokens
                .decimals(source)
                .await
                .map_err(|e| LiquidationError::transient(Step::TokenDecimals, format!("{e:#}")))?
        };

        let (source_price, debt_price) = tokio::join!(
            self.aggregator.token_price(source),
            self.aggregator.token_price(debt.asset())
        );

        let prices = match (source_price, debt_price) {
            (Ok(s), Ok(d)) => match (usable_price(s), usable_price(d)) {
                (Some(s), Some(d)) => Ok((s, d)),
                _ => Err(ApiError::Rejected {
                    service: "aggregator",
                    message: format!("unusable price (source {s}, debt {d})"),
                }),
            },
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        let (source_price, debt_price) = match prices {
            Ok(prices) => prices,
            Err(e) => {
                if unstake {
                    // The oracle prices the wrapped token, not what is sold.
                    return Err(LiquidationError::from_api(Step::PriceEstimate, e));
                }
                debug!(error = %e, "Aggregator price unavailable, using oracle prices");
                (candidate.collateral.price, debt.price)
            }
        };

        let value = u256_math::base_value(candidate.debt_to_cover, debt_price, debt.decimals())?;
        let amount = u256_math::amount_from_base_value(value, source_price, source_decimals)?;
        Ok(u256_math::percent_mul(
            amount,
            PERCENTAGE_FACTOR + u32::from(self.settings.slippage_bps),
        )?)
    }

    async fn principal_token_route(
        &self,
        candidate: &LiquidationCandidate,
        pt: Address,
        receiver: Address,
    ) -> Result<SwapRoute, LiquidationError> {
        let debt = candidate.debt.asset();

        let market = self.yield_market.market_for(pt).await.map_err(|e| match e {
            ApiError::NoMarket { token } => LiquidationError::UnsupportedCollateral {
                asset: token,
                reason: "principal token has no active market".to_string(),
            },
            other => LiquidationError::from_api(Step::MarketDiscovery, other),
        })?;
        let underlying = market.underlying_asset;

        let pt_decimals = self
            .tokens
            .decimals(pt)
            .await
            .map_err(|e| LiquidationError::transient(Step::TokenDecimals, format!("{e:#}")))?;
        let pt_amount = self
            .estimate_pt_input(candidate, pt, pt_decimals, underlying)
            .await?;

        let redeem = self
            .yield_market
            .redeem_quote(&RedeemRequest {
                market: market.address,
                pt,
                token_out: underlying,
                amount_in: pt_amount,
                receiver,
                slippage_bps: self.settings.slippage_bps,
            })
            .await
            .map_err(|e| LiquidationError::from_api(Step::RedeemQuote, e))?;

        let swap = if underlying == debt {
            None
        } else {
            let request = QuoteRequest::new(underlying, redeem.amount_out, debt, receiver)
                .with_slippage_bps(self.settings.slippage_bps);
            let quote = self
                .aggregator
                .quote(&request)
                .await
                .map_err(|e| LiquidationError::from_api(Step::UnderlyingQuote, e))?;
            let swap = self
                .aggregator
                .assemble(&quote, receiver)
                .await
                .map_err(|e| LiquidationError::from_api(Step::UnderlyingAssemble, e))?;
            Some(swap)
        };

        debug!(
            market = %market.address,
            underlying = %underlying,
            pt_amount = %pt_amount,
            second_leg = swap.is_some(),
            "Principal token route built"
        );

        Ok(SwapRoute::PrincipalToken {
            pt,
            market: market.address,
            underlying,
            pt_amount,
            redeem,
            swap,
        })
    }

    /// PT amount to redeem so the output covers the repay amount.
    async fn estimate_pt_input(
        &self,
        candidate: &LiquidationCandidate,
        pt: Address,
        pt_decimals: u8,
        underlying: Address,
    ) -> Result<U256, LiquidationError> {
        let debt = &candidate.debt;
        let slippage = u32::from(self.settings.slippage_bps);
        let unit_amount =
            u256_math::convert_decimals(candidate.debt_to_cover, debt.decimals(), pt_decimals)?;

        if underlying == debt.asset() {
            return Ok(u256_math::percent_mul(unit_amount, PERCENTAGE_FACTOR + slippage)?);
        }

        match self.price_ratio_estimate(candidate, pt, pt_decimals).await {
            Some(amount) => Ok(u256_math::percent_mul(
                amount,
                PERCENTAGE_FACTOR + slippage + self.settings.pt_estimate_buffer_bps,
            )?),
            None => {
                warn!(
                    pt = %pt,
                    buffer_bps = self.settings.pt_fallback_buffer_bps,
                    "PT input estimate unavailable, using fallback buffer"
                );
                Ok(u256_math::percent_mul(
                    unit_amount,
                    PERCENTAGE_FACTOR + self.settings.pt_fallback_buffer_bps,
                )?)
            }
        }
    }

    async fn price_ratio_estimate(
        &self,
        candidate: &LiquidationCandidate,
        pt: Address,
        pt_decimals: u8,
    ) -> Option<U256> {
        let debt = &candidate.debt;
        let (pt_price, debt_price) = tokio::join!(
            self.aggregator.token_price(pt),
            self.aggregator.token_price(debt.asset())
        );
        let pt_price = usable_price(pt_price.ok()?)?;
        let debt_price = usable_price(debt_price.ok()?)?;

        let value = u256_math::base_value(candidate.debt_to_cover, debt_price, debt.decimals()).ok()?;
        u256_math::amount_from_base_value(value, pt_price, pt_decimals).ok()
    }
}

/// Aggregator USD price in base units; `None` when it rounds to nothing.
fn usable_price(usd: f64) -> Option<U256> {
    let price = u256_math::usd_to_base(usd);
    (!price.is_zero()).then_some(price)
}
