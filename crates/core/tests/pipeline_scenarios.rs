//! End-to-end liquidation scenarios over in-memory collaborators.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use liquidator_chain::contracts::ILiquidator;
use liquidator_chain::{LiquidationSubmitter, LiquidatorContract, LiquidatorKind, SwapPayload};
use liquidator_core::testing::{
    FakeAggregator, FakeBorrowerIndex, FakePool, FakeTokenRegistry, FakeYieldMarket,
    RecordingNotifier, RecordingSubmitter, ONE_USD,
};
use liquidator_core::u256_math::{self, WAD};
use liquidator_core::{
    BackoffCache, ExecutionRouter, LiquidationOutcome, Liquidator, ManualClock, PositionReader,
    QuoteAssembler, QuoteSettings, ReaderLimits,
};
use std::sync::Arc;
use std::time::Duration;

const BORROWER: Address = Address::repeat_byte(0x01);
const DEBT: u8 = 0x10;
const COLLATERAL: u8 = 0x20;
const FLASH_MINT: Address = Address::repeat_byte(0xa1);
const FLASH_LOAN: Address = Address::repeat_byte(0xa2);

fn wad(v: f64) -> U256 {
    u256_math::f64_to_wad(v)
}

fn units(n: u64) -> U256 {
    U256::from(n) * WAD
}

fn usd(n: u64) -> U256 {
    U256::from(n) * U256::from(ONE_USD)
}

struct Bot {
    pool: Arc<FakePool>,
    reader: Arc<PositionReader>,
    aggregator: Arc<FakeAggregator>,
    market: Arc<FakeYieldMarket>,
    tokens: Arc<FakeTokenRegistry>,
    submitter: Arc<RecordingSubmitter>,
    backoff: Arc<BackoffCache>,
}

impl Bot {
    /// Borrower owing 1000 D ($1) against `collateral` C ($1, 5% bonus).
    fn new(health_factor: f64, collateral: u64) -> Self {
        let pool = Arc::new(FakePool::default());
        let debt = pool.add_reserve(DEBT, 18, 0, U256::from(ONE_USD));
        let coll = pool.add_reserve(COLLATERAL, 18, 10500, U256::from(ONE_USD));
        pool.set_debt(BORROWER, debt, units(1_000));
        pool.set_supply(BORROWER, coll, units(collateral));
        pool.set_health_factor(BORROWER, wad(health_factor));

        let reader = Arc::new(PositionReader::new(
            pool.clone(),
            Arc::new(FakeBorrowerIndex::new(vec![BORROWER])),
            ReaderLimits::default(),
        ));

        Self {
            pool,
            reader,
            aggregator: Arc::new(FakeAggregator::default()),
            market: Arc::new(FakeYieldMarket::default()),
            tokens: Arc::new(FakeTokenRegistry::default()),
            submitter: Arc::new(RecordingSubmitter::default()),
            backoff: Arc::new(BackoffCache::in_memory(
                Duration::from_secs(180),
                Arc::new(ManualClock::new(0)),
            )),
        }
    }

    fn liquidator(&self, min_profit_usd: f64) -> Liquidator {
        let assembler = QuoteAssembler::new(
            self.aggregator.clone(),
            self.market.clone(),
            self.tokens.clone(),
            QuoteSettings::default(),
        );
        let router = ExecutionRouter::new(
            LiquidatorContract::new(LiquidatorKind::FlashMint, FLASH_MINT, self.submitter.clone()),
            LiquidatorContract::new(LiquidatorKind::FlashLoan, FLASH_LOAN, self.submitter.clone()),
            [],
        );
        Liquidator::new(
            self.reader.clone(),
            assembler,
            router,
            self.backoff.clone(),
            Arc::new(RecordingNotifier::default()),
            Arc::new(ManualClock::new(0)),
        )
        .with_min_profit(min_profit_usd)
    }

    fn sent_calls(&self) -> Vec<ILiquidator::liquidateCall> {
        self.submitter
            .sent()
            .iter()
            .map(|(_, data)| ILiquidator::liquidateCall::abi_decode(data, true).unwrap())
            .collect()
    }

    fn payload(&self) -> SwapPayload {
        let calls = self.sent_calls();
        assert_eq!(calls.len(), 1);
        SwapPayload::abi_decode(&calls[0].swapData, true).unwrap()
    }
}

fn seize_value(repay: U256) -> U256 {
    let value = u256_math::base_value(repay, U256::from(ONE_USD), 18).unwrap();
    u256_math::percent_mul(value, 10500).unwrap()
}

#[tokio::test]
async fn scenario_a_half_close_factor_without_clamp() {
    let bot = Bot::new(0.80, 1_200);
    // 0.80 sits above a 0.50 close-factor threshold: the 50% band.
    bot.pool.set_close_factor_threshold(wad(0.50));

    let outcome = bot.liquidator(1.0).handle_borrower(BORROWER).await.unwrap();
    assert!(outcome.is_success());

    let call = &bot.sent_calls()[0];
    assert_eq!(call.debtToCover, units(500));
    assert_eq!(seize_value(call.debtToCover), usd(525));
    assert!(!call.receiveAToken);
}

#[tokio::test]
async fn scenario_b_full_close_factor_and_collateral_clamp() {
    let bot = Bot::new(0.10, 1_200);
    let liquidator = bot.liquidator(1.0);
    let snapshot = bot.reader.account_snapshot(BORROWER).await.unwrap();
    let candidate = liquidator
        .size_candidate(BORROWER, &snapshot)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(candidate.debt_to_cover, units(1_000));
    assert_eq!(seize_value(candidate.debt_to_cover), usd(1_050));

    let bot = Bot::new(0.10, 900);
    let liquidator = bot.liquidator(1.0);
    let snapshot = bot.reader.account_snapshot(BORROWER).await.unwrap();
    let candidate = liquidator
        .size_candidate(BORROWER, &snapshot)
        .await
        .unwrap()
        .unwrap();
    assert!(candidate.debt_to_cover < units(1_000));
    let seized = seize_value(candidate.debt_to_cover);
    assert!(seized <= usd(900));
    assert!(usd(900) - seized <= U256::from(1u8));
}

#[tokio::test]
async fn scenario_c_profit_threshold_gates_attempt() {
    let bot = Bot::new(0.96, 10_000);
    let outcome = bot.liquidator(1.0).handle_borrower(BORROWER).await.unwrap();
    assert!(matches!(outcome, LiquidationOutcome::Liquidated { .. }));
    assert_eq!(bot.sent_calls()[0].debtToCover, units(500));
    assert!(!bot.backoff.is_ignored(&BORROWER));

    let bot = Bot::new(0.96, 10_000);
    let outcome = bot.liquidator(30.0).handle_borrower(BORROWER).await.unwrap();
    assert_eq!(
        outcome,
        LiquidationOutcome::BelowProfitThreshold { profit_base: usd(25) }
    );
    assert!(bot.submitter.sent().is_empty());
    assert!(bot.backoff.is_ignored(&BORROWER));
}

#[tokio::test]
async fn scenario_d_pt_redeeming_into_debt_asset_skips_second_leg() {
    let bot = Bot::new(0.50, 10_000);
    let pt = Address::repeat_byte(COLLATERAL);
    bot.tokens.mark_pt(pt);
    bot.tokens.set_decimals(pt, 18);
    bot.market
        .add_market(Address::repeat_byte(0x66), pt, Address::repeat_byte(DEBT));

    let outcome = bot.liquidator(1.0).handle_borrower(BORROWER).await.unwrap();
    assert!(outcome.is_success());

    let payload = bot.payload();
    assert_eq!(payload.pendleTarget, FakeYieldMarket::ROUTER);
    assert_eq!(payload.aggregatorTarget, Address::ZERO);
    assert_eq!(payload.aggregatorData, Bytes::new());
    assert!(bot.aggregator.assembled_receivers().is_empty());

    let redeem = &bot.market.redeem_requests()[0];
    assert_eq!(redeem.receiver, FLASH_LOAN);
    // 1000 repaid at 1:1 plus 0.5% slippage
    assert_eq!(redeem.amount_in, U256::from(1_005u64) * WAD);
}

#[tokio::test]
async fn scenario_d_pt_with_other_underlying_pays_liquidator_contract() {
    let bot = Bot::new(0.50, 10_000);
    let pt = Address::repeat_byte(COLLATERAL);
    let underlying = Address::repeat_byte(0x55);
    bot.tokens.mark_pt(pt);
    bot.tokens.set_decimals(pt, 18);
    bot.market.add_market(Address::repeat_byte(0x66), pt, underlying);

    let outcome = bot.liquidator(1.0).handle_borrower(BORROWER).await.unwrap();
    assert!(outcome.is_success());

    let payload = bot.payload();
    assert_eq!(payload.pendleTarget, FakeYieldMarket::ROUTER);
    assert_eq!(payload.aggregatorTarget, FakeAggregator::ROUTER);
    assert!(!payload.aggregatorData.is_empty());

    let receivers = bot.aggregator.assembled_receivers();
    assert_eq!(receivers, vec![FLASH_LOAN]);
    assert_ne!(receivers[0], bot.submitter.sender_address());

    let quote = &bot.aggregator.quote_requests()[0];
    assert_eq!(quote.token_in, underlying);
    assert_eq!(quote.user, FLASH_LOAN);
}
