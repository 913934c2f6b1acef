//! Per-borrower liquidation pipeline.
//!
//! `handle_borrower` is the failure boundary: whatever happens inside
//! (sizing, quoting, execution) is turned into an outcome, recorded to the
//! backoff cache, the attempt log and the notifier, and never escapes to the
//! scanner.

use alloy::primitives::{Address, B256, U256};
use liquidator_api::{Notification, Notifier, Severity};
use liquidator_chain::{LiquidatorKind, UserAccountSnapshot};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::attempt_log::{AttemptLog, AttemptRecord};
use crate::backoff::BackoffCache;
use crate::clock::Clock;
use crate::error::{LiquidationError, Step};
use crate::position::LiquidationCandidate;
use crate::quote::QuoteAssembler;
use crate::reader::PositionReader;
use crate::router::ExecutionRouter;
use crate::sizing::{self, SizingInput};
use crate::u256_math::{self, WAD};

/// How one borrower's attempt ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidationOutcome {
    /// Nothing to repay (healthy, no repayable debt, no seizable collateral)
    NotLiquidatable { reason: &'static str },
    /// Expected bonus below the configured USD threshold
    BelowProfitThreshold { profit_base: U256 },
    /// Liquidation mined
    Liquidated { tx_hash: B256, kind: LiquidatorKind },
}

impl LiquidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLiquidatable { .. } => "not_liquidatable",
            Self::BelowProfitThreshold { .. } => "below_profit_threshold",
            Self::Liquidated { .. } => "liquidated",
        }
    }

    /// Non-profitable outcomes mute the borrower; a success does not.
    pub fn should_backoff(&self) -> bool {
        !self.is_success()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Liquidated { .. })
    }
}

/// Sizes, quotes and executes liquidations one borrower at a time.
pub struct Liquidator {
    reader: Arc<PositionReader>,
    assembler: QuoteAssembler,
    router: ExecutionRouter,
    backoff: Arc<BackoffCache>,
    attempt_log: AttemptLog,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,

    /// Minimum expected bonus (USD)
    min_profit_usd: f64,
}

impl std::fmt::Debug for Liquidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Liquidator")
            .field("assembler", &self.assembler)
            .field("router", &self.router)
            .field("min_profit_usd", &self.min_profit_usd)
            .finish_non_exhaustive()
    }
}

impl Liquidator {
    pub fn new(
        reader: Arc<PositionReader>,
        assembler: QuoteAssembler,
        router: ExecutionRouter,
        backoff: Arc<BackoffCache>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reader,
            assembler,
            router,
            backoff,
            attempt_log: AttemptLog::disabled(),
            notifier,
            clock,
            min_profit_usd: 1.0,
        }
    }

    /// Set minimum profit threshold.
    pub fn with_min_profit(mut self, min_profit_usd: f64) -> Self {
        self.min_profit_usd = min_profit_usd;
        self
    }

    /// Write one JSON record per attempt.
    pub fn with_attempt_log(mut self, attempt_log: AttemptLog) -> Self {
        self.attempt_log = attempt_log;
        self
    }

    pub fn min_profit_usd(&self) -> f64 {
        self.min_profit_usd
    }

    pub fn backoff(&self) -> &Arc<BackoffCache> {
        &self.backoff
    }

    /// Run the full pipeline for `user` and record the result.
    ///
    /// Transient failures are returned without muting the borrower so the
    /// next cycle retries it. Every other outcome or failure mutes it.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn handle_borrower(&self, user: Address) -> Result<LiquidationOutcome, LiquidationError> {
        let started = Instant::now();
        let mut record = AttemptRecord::new(user, self.clock.now_ms());
        let result = self.liquidate_borrower(user, &mut record).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &result {
            Ok(outcome) => {
                record.outcome = outcome.as_str().to_string();
                record.success = outcome.is_success();
                if let LiquidationOutcome::Liquidated { tx_hash, .. } = outcome {
                    record.tx_hash = Some(*tx_hash);
                }
                info!(outcome = outcome.as_str(), elapsed_ms = elapsed_ms, "Borrower processed");

                if outcome.should_backoff() {
                    self.mute(user);
                }
                if let LiquidationOutcome::Liquidated { tx_hash, kind } = outcome {
                    let notification = Notification::new(
                        Severity::Info,
                        "Liquidation executed",
                        format!(
                            "{kind} liquidator repaid {} with expected profit ${:.2}",
                            record.debt_to_cover.as_deref().unwrap_or("?"),
                            record.expected_profit_usd.unwrap_or_default()
                        ),
                    )
                    .with_borrower(user)
                    .with_tx_hash(Some(*tx_hash));
                    self.notifier.notify(&notification).await;
                }
            }
            Err(e) => {
                record.set_error(e);
                warn!(
                    error = %e,
                    kind = e.kind(),
                    step = e.step().map(|s| s.as_str()).unwrap_or("-"),
                    elapsed_ms = elapsed_ms,
                    "Borrower attempt failed"
                );

                if e.should_backoff() {
                    self.mute(user);
                }
                if !e.is_transient() {
                    let mut notification =
                        Notification::new(Severity::Error, "Liquidation failed", e.to_string())
                            .with_borrower(user);
                    if let Some(step) = e.step() {
                        notification = notification.with_step(step.as_str());
                    }
                    if let LiquidationError::Execution(exec) = e {
                        notification = notification.with_tx_hash(exec.tx_hash());
                    }
                    self.notifier.notify(&notification).await;
                }
            }
        }

        if !matches!(&result, Err(e) if e.is_transient()) {
            self.attempt_log.record(&record);
        }
        result
    }

    async fn liquidate_borrower(
        &self,
        user: Address,
        record: &mut AttemptRecord,
    ) -> Result<LiquidationOutcome, LiquidationError> {
        let snapshot = self
            .reader
            .account_snapshot(user)
            .await
            .map_err(|e| LiquidationError::transient(Step::AccountData, format!("{e:#}")))?;
        record.set_account(
            snapshot.health_factor,
            snapshot.total_collateral_base,
            snapshot.total_debt_base,
        );

        if snapshot.health_factor >= WAD {
            return Ok(LiquidationOutcome::NotLiquidatable { reason: "healthy" });
        }

        let candidate = match self.size_candidate(user, &snapshot).await? {
            Ok(candidate) => candidate,
            Err(outcome) => return Ok(outcome),
        };
        record.set_candidate(&candidate);

        if !sizing::is_profitable(candidate.profit_base, self.min_profit_usd) {
            info!(
                expected_profit = format!("${:.2}", candidate.profit_usd()),
                min_required = self.min_profit_usd,
                "Skipping unprofitable liquidation"
            );
            return Ok(LiquidationOutcome::BelowProfitThreshold {
                profit_base: candidate.profit_base,
            });
        }

        let contract = self.router.select(candidate.debt.asset());
        record.liquidator = Some(contract.kind.to_string());
        info!(
            collateral = %candidate.collateral.asset(),
            debt = %candidate.debt.asset(),
            debt_to_cover = %candidate.debt_to_cover,
            expected_profit = format!("${:.2}", candidate.profit_usd()),
            liquidator = %contract.kind,
            "Executing profitable liquidation"
        );

        let plan = self.assembler.assemble(&candidate, contract.address).await?;
        record.set_route(&plan);

        let tx_hash = self.router.execute(contract, &candidate, &plan).await?;
        Ok(LiquidationOutcome::Liquidated {
            tx_hash,
            kind: contract.kind,
        })
    }

    /// Pick the reserve pair and size the repayment.
    ///
    /// The inner `Err` carries a no-op outcome rather than a failure.
    pub async fn size_candidate(
        &self,
        user: Address,
        snapshot: &UserAccountSnapshot,
    ) -> Result<Result<LiquidationCandidate, LiquidationOutcome>, LiquidationError> {
        let reserves = self
            .reader
            .user_reserves(user)
            .await
            .map_err(|e| LiquidationError::transient(Step::ReserveData, format!("{e:#}")))?;

        let Some(debt) = sizing::select_debt_reserve(&reserves)? else {
            return Ok(Err(LiquidationOutcome::NotLiquidatable {
                reason: "no repayable debt",
            }));
        };
        let Some(collateral) = sizing::select_collateral_reserve(&reserves)? else {
            return Ok(Err(LiquidationOutcome::NotLiquidatable {
                reason: "no seizable collateral",
            }));
        };

        let close_factor_threshold = self
            .reader
            .close_factor_threshold()
            .await
            .map_err(|e| LiquidationError::transient(Step::CloseFactor, format!("{e:#}")))?;

        let collateral_value = collateral
            .supplied_value()?
            .min(snapshot.total_collateral_base);

        let input = SizingInput {
            health_factor: snapshot.health_factor,
            close_factor_threshold,
            total_debt: debt.debt,
            debt_price: debt.price,
            debt_decimals: debt.decimals(),
            collateral_value,
            liquidation_bonus_bps: collateral.liquidation_bonus_bps(),
        };
        let debt_to_cover = sizing::compute_max_repay(&input)?;
        if debt_to_cover.is_zero() {
            return Ok(Err(LiquidationOutcome::NotLiquidatable {
                reason: "zero repay amount",
            }));
        }

        let profit_base = sizing::compute_profit(
            debt_to_cover,
            debt.price,
            debt.decimals(),
            collateral.liquidation_bonus_bps(),
        )?;

        debug!(
            health_factor = u256_math::wad_to_f64(snapshot.health_factor),
            close_factor_threshold = u256_math::wad_to_f64(close_factor_threshold),
            debt_asset = %debt.asset(),
            collateral_asset = %collateral.asset(),
            debt_to_cover = %debt_to_cover,
            "Candidate sized"
        );

        Ok(Ok(LiquidationCandidate {
            user,
            health_factor: snapshot.health_factor,
            collateral,
            debt,
            debt_to_cover,
            profit_base,
        }))
    }

    fn mute(&self, user: Address) {
        if let Err(e) = self.backoff.put(user) {
            warn!(user = %user, error = %e, "Failed to persist backoff entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::quote::QuoteSettings;
    use crate::reader::ReaderLimits;
    use crate::testing::{
        FakeAggregator, FakeBorrowerIndex, FakePool, FakeTokenRegistry, FakeYieldMarket,
        RecordingNotifier, RecordingSubmitter,
    };
    use liquidator_chain::LiquidatorContract;
    use std::time::Duration;

    const ONE_USD: u64 = 100_000_000;

    struct Harness {
        liquidator: Liquidator,
        submitter: Arc<RecordingSubmitter>,
        notifier: Arc<RecordingNotifier>,
        aggregator: Arc<FakeAggregator>,
    }

    fn user() -> Address {
        Address::repeat_byte(0x01)
    }

    fn tokens(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    /// Borrower with 1000 debt (reserve 0x10) against `collateral` units of reserve 0x20.
    fn harness(health_factor: U256, collateral: u64) -> Harness {
        let pool = FakePool::default();
        let debt = pool.add_reserve(0x10, 18, 0, U256::from(ONE_USD));
        let coll = pool.add_reserve(0x20, 18, 10500, U256::from(ONE_USD));
        pool.set_debt(user(), debt, tokens(1_000));
        pool.set_supply(user(), coll, tokens(collateral));
        pool.set_health_factor(user(), health_factor);

        let reader = Arc::new(PositionReader::new(
            Arc::new(pool),
            Arc::new(FakeBorrowerIndex::new(vec![user()])),
            ReaderLimits::default(),
        ));

        let aggregator = Arc::new(FakeAggregator::default());
        aggregator.set_price(debt, 1.0);
        aggregator.set_price(coll, 1.0);
        let assembler = QuoteAssembler::new(
            aggregator.clone(),
            Arc::new(FakeYieldMarket::default()),
            Arc::new(FakeTokenRegistry::default()),
            QuoteSettings::default(),
        );

        let submitter = Arc::new(RecordingSubmitter::default());
        let router = ExecutionRouter::new(
            LiquidatorContract::new(LiquidatorKind::FlashMint, Address::repeat_byte(0xa1), submitter.clone()),
            LiquidatorContract::new(LiquidatorKind::FlashLoan, Address::repeat_byte(0xa2), submitter.clone()),
            [],
        );

        let clock = Arc::new(ManualClock::new(1_000));
        let backoff = Arc::new(BackoffCache::in_memory(Duration::from_secs(180), clock.clone()));
        let notifier = Arc::new(RecordingNotifier::default());

        Harness {
            liquidator: Liquidator::new(reader, assembler, router, backoff, notifier.clone(), clock),
            submitter,
            notifier,
            aggregator,
        }
    }

    #[tokio::test]
    async fn test_liquidates_through_flash_loan_contract() {
        let h = harness(WAD * U256::from(96u8) / U256::from(100u8), 10_000);

        let outcome = h.liquidator.handle_borrower(user()).await.unwrap();
        assert!(matches!(
            outcome,
            LiquidationOutcome::Liquidated {
                kind: LiquidatorKind::FlashLoan,
                ..
            }
        ));
        assert_eq!(h.submitter.sent().len(), 1);
        assert_eq!(h.submitter.sent()[0].0, Address::repeat_byte(0xa2));
        assert_eq!(h.aggregator.assembled_receivers(), vec![Address::repeat_byte(0xa2)]);
        assert!(!h.liquidator.backoff().is_ignored(&user()));
        assert_eq!(h.notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_healthy_borrower_is_muted_without_quotes() {
        let h = harness(WAD, 10_000);

        let outcome = h.liquidator.handle_borrower(user()).await.unwrap();
        assert_eq!(outcome, LiquidationOutcome::NotLiquidatable { reason: "healthy" });
        assert!(h.liquidator.backoff().is_ignored(&user()));
        assert!(h.aggregator.quote_requests().is_empty());
        assert!(h.submitter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_is_muted() {
        let h = harness(WAD / U256::from(2u8), 10_000);
        let liquidator = h.liquidator.with_min_profit(1_000_000.0);

        let outcome = liquidator.handle_borrower(user()).await.unwrap();
        assert!(matches!(outcome, LiquidationOutcome::BelowProfitThreshold { .. }));
        assert!(liquidator.backoff().is_ignored(&user()));
        assert!(h.submitter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_revert_is_reported_with_tx_hash_and_muted() {
        let h = harness(WAD / U256::from(2u8), 10_000);
        h.submitter.revert_next();

        let err = h.liquidator.handle_borrower(user()).await.unwrap_err();
        assert!(matches!(err, LiquidationError::Execution(_)));
        assert!(h.liquidator.backoff().is_ignored(&user()));

        let notes = h.notifier.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].step.as_deref(), Some("execute"));
        assert!(notes[0].tx_hash.is_some());
    }

    #[tokio::test]
    async fn test_transient_quote_failure_is_not_muted() {
        let h = harness(WAD / U256::from(2u8), 10_000);
        h.aggregator.fail_quote(liquidator_api::ApiError::Upstream {
            service: "aggregator",
            status: 502,
            body: "bad gateway".into(),
        });

        let err = h.liquidator.handle_borrower(user()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!h.liquidator.backoff().is_ignored(&user()));
        assert!(h.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_sizing_caps_by_collateral() {
        let h = harness(WAD / U256::from(10u8), 900);
        let snapshot = h.liquidator.reader.account_snapshot(user()).await.unwrap();

        let candidate = h
            .liquidator
            .size_candidate(user(), &snapshot)
            .await
            .unwrap()
            .unwrap();
        assert!(candidate.debt_to_cover < tokens(1_000));
        assert_eq!(candidate.collateral.asset(), Address::repeat_byte(0x20));
    }
}
