//! Scan loop for the liquidation bot.
//!
//! Each cycle lists every borrower, shuffles them, drops muted ones, reads
//! health factors in bounded groups and hands the candidates to the
//! liquidator strictly one at a time.

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::batch::split_into_batches;
use crate::liquidator::{LiquidationOutcome, Liquidator};
use crate::reader::{HealthRead, PositionReader};
use crate::u256_math;

/// Scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    /// Delay between cycle starts
    pub interval: Duration,
    /// Borrowers below this health factor are candidates
    pub hf_threshold: f64,
    /// Candidates per progress chunk
    pub liquidation_batch_size: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            hf_threshold: 1.0,
            liquidation_batch_size: 10,
        }
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub borrowers: usize,
    pub muted: usize,
    pub unavailable: usize,
    pub candidates: usize,
    pub liquidated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drives the liquidator over every borrower on a fixed cadence.
pub struct Scanner {
    reader: Arc<PositionReader>,
    liquidator: Arc<Liquidator>,
    settings: ScannerSettings,
}

impl Scanner {
    pub fn new(reader: Arc<PositionReader>, liquidator: Arc<Liquidator>, settings: ScannerSettings) -> Self {
        Self {
            reader,
            liquidator,
            settings,
        }
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    /// Run cycles until `shutdown` becomes true. Cycle errors are logged and
    /// the loop waits for the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.settings.interval.as_millis(), "Starting scanner loop...");

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.run_cycle().await {
                error!(error = %format!("{e:#}"), "Scan cycle failed");
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Scanner stopped");
    }

    /// One full pass over the borrower set.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        self.reader
            .load_reserves()
            .await
            .context("failed to load reserve metadata")?;

        let mut borrowers = self
            .reader
            .list_borrowers()
            .await
            .context("failed to list borrowers")?;
        report.borrowers = borrowers.len();

        {
            let mut rng = rand::rng();
            borrowers.shuffle(&mut rng);
        }

        let backoff = self.liquidator.backoff();
        borrowers.retain(|user| !backoff.is_ignored(user));
        report.muted = report.borrowers - borrowers.len();

        let threshold = u256_math::f64_to_wad(self.settings.hf_threshold);
        let candidates = self.select_candidates(&borrowers, threshold, &mut report).await;
        report.candidates = candidates.len();

        info!(
            borrowers = report.borrowers,
            muted = report.muted,
            unavailable = report.unavailable,
            candidates = report.candidates,
            "Health factors scanned"
        );

        let chunks = split_into_batches(&candidates, self.settings.liquidation_batch_size);
        let total_chunks = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            for (user, health_factor) in chunk {
                debug!(user = %user, health_factor = u256_math::wad_to_f64(health_factor), "Processing candidate");
                match self.liquidator.handle_borrower(user).await {
                    Ok(LiquidationOutcome::Liquidated { .. }) => report.liquidated += 1,
                    Ok(_) => report.skipped += 1,
                    Err(_) => report.failed += 1,
                }
            }
            info!(
                chunk = i + 1,
                chunks = total_chunks,
                liquidated = report.liquidated,
                skipped = report.skipped,
                failed = report.failed,
                "Candidate chunk processed"
            );
        }

        info!(
            elapsed_ms = started.elapsed().as_millis(),
            liquidated = report.liquidated,
            skipped = report.skipped,
            failed = report.failed,
            "Scan cycle complete"
        );
        Ok(report)
    }

    /// Borrowers whose health factor is below `threshold`, in scan order.
    async fn select_candidates(
        &self,
        borrowers: &[Address],
        threshold: U256,
        report: &mut CycleReport,
    ) -> Vec<(Address, U256)> {
        let mut candidates = Vec::new();
        for (user, read) in self.reader.health_factors(borrowers).await {
            match read {
                HealthRead::Available(hf) if hf < threshold => candidates.push((user, hf)),
                HealthRead::Available(_) => {}
                HealthRead::Unavailable(reason) => {
                    report.unavailable += 1;
                    debug!(user = %user, reason = %reason, "Health factor unavailable");
                }
            }
        }
        if candidates.is_empty() && !borrowers.is_empty() {
            debug!("No borrowers below threshold");
        }
        if report.unavailable == borrowers.len() && !borrowers.is_empty() {
            warn!(count = borrowers.len(), "Every health factor read failed");
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffCache;
    use crate::clock::ManualClock;
    use crate::quote::{QuoteAssembler, QuoteSettings};
    use crate::reader::ReaderLimits;
    use crate::router::ExecutionRouter;
    use crate::testing::{
        FakeAggregator, FakeBorrowerIndex, FakePool, FakeTokenRegistry, FakeYieldMarket,
        RecordingNotifier, RecordingSubmitter,
    };
    use crate::u256_math::WAD;
    use liquidator_chain::{LiquidatorContract, LiquidatorKind};

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn scanner(pool: FakePool, users: Vec<Address>, submitter: Arc<RecordingSubmitter>) -> (Scanner, Arc<ManualClock>) {
        let reader = Arc::new(PositionReader::new(
            Arc::new(pool),
            Arc::new(FakeBorrowerIndex::new(users)),
            ReaderLimits::default(),
        ));
        let aggregator = Arc::new(FakeAggregator::default());
        let assembler = QuoteAssembler::new(
            aggregator,
            Arc::new(FakeYieldMarket::default()),
            Arc::new(FakeTokenRegistry::default()),
            QuoteSettings::default(),
        );
        let router = ExecutionRouter::new(
            LiquidatorContract::new(LiquidatorKind::FlashMint, addr(0xa1), submitter.clone()),
            LiquidatorContract::new(LiquidatorKind::FlashLoan, addr(0xa2), submitter),
            [],
        );
        let clock = Arc::new(ManualClock::new(0));
        let backoff = Arc::new(BackoffCache::in_memory(Duration::from_secs(180), clock.clone()));
        let liquidator = Arc::new(Liquidator::new(
            reader.clone(),
            assembler,
            router,
            backoff,
            Arc::new(RecordingNotifier::default()),
            clock.clone(),
        ));
        (Scanner::new(reader, liquidator, ScannerSettings::default()), clock)
    }

    fn pool_with_borrowers() -> FakePool {
        let pool = FakePool::default();
        let debt = pool.add_reserve(0x10, 18, 0, U256::from(100_000_000u64));
        let coll = pool.add_reserve(0x20, 18, 10500, U256::from(100_000_000u64));
        for (user, hf_pct) in [(addr(1), 50u64), (addr(2), 150), (addr(3), 90)] {
            pool.set_debt(user, debt, U256::from(1_000u64) * WAD);
            pool.set_supply(user, coll, U256::from(10_000u64) * WAD);
            pool.set_health_factor(user, WAD * U256::from(hf_pct) / U256::from(100u8));
        }
        pool.fail_account(addr(4));
        pool
    }

    #[tokio::test]
    async fn test_cycle_liquidates_candidates_and_mutes_failures() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let users = vec![addr(1), addr(2), addr(3), addr(4)];
        let (scanner, _clock) = scanner(pool_with_borrowers(), users, submitter.clone());

        let report = scanner.run_cycle().await.unwrap();
        assert_eq!(report.borrowers, 4);
        assert_eq!(report.unavailable, 1);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.liquidated, 2);
        assert_eq!(submitter.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_muted_borrowers_are_skipped_until_expiry() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let (scanner, clock) = scanner(pool_with_borrowers(), vec![addr(2)], submitter);

        // Healthy borrowers never become candidates, so nothing is muted.
        let first = scanner.run_cycle().await.unwrap();
        assert_eq!(first.candidates, 0);

        scanner.liquidator.backoff().put(addr(2)).unwrap();
        let second = scanner.run_cycle().await.unwrap();
        assert_eq!(second.muted, 1);

        clock.advance(Duration::from_secs(181));
        let third = scanner.run_cycle().await.unwrap();
        assert_eq!(third.muted, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let (scanner, _clock) = scanner(pool_with_borrowers(), vec![], submitter);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scanner.run(rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
