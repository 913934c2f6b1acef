//! Per-attempt JSON records for post-mortem analysis.
//!
//! One file per attempt under the configured directory, named
//! `{borrower}_{timestamp_ms}.json`. Writing is best effort.

use alloy::primitives::{Address, B256, U256};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::LiquidationError;
use crate::position::LiquidationCandidate;
use crate::quote::RoutePlan;
use crate::u256_math;

/// Everything known about one liquidation attempt.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub borrower: Address,
    pub timestamp_ms: u64,
    pub health_factor: f64,
    pub total_collateral_base: String,
    pub total_debt_base: String,
    pub collateral_asset: Option<Address>,
    pub debt_asset: Option<Address>,
    pub debt_to_cover: Option<String>,
    pub expected_profit_usd: Option<f64>,
    pub liquidator: Option<String>,
    pub liquidator_address: Option<Address>,
    pub route: Option<&'static str>,
    pub unstake: bool,
    pub expected_output: Option<String>,
    pub outcome: String,
    pub success: bool,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub error_step: Option<&'static str>,
}

impl AttemptRecord {
    pub fn new(borrower: Address, timestamp_ms: u64) -> Self {
        Self {
            borrower,
            timestamp_ms,
            outcome: "pending".to_string(),
            ..Default::default()
        }
    }

    pub fn set_account(&mut self, health_factor: U256, total_collateral_base: U256, total_debt_base: U256) {
        self.health_factor = u256_math::wad_to_f64(health_factor);
        self.total_collateral_base = total_collateral_base.to_string();
        self.total_debt_base = total_debt_base.to_string();
    }

    pub fn set_candidate(&mut self, candidate: &LiquidationCandidate) {
        self.collateral_asset = Some(candidate.collateral.asset());
        self.debt_asset = Some(candidate.debt.asset());
        self.debt_to_cover = Some(candidate.debt_to_cover.to_string());
        self.expected_profit_usd = Some(candidate.profit_usd());
    }

    pub fn set_route(&mut self, plan: &RoutePlan) {
        self.route = Some(plan.route.kind());
        self.unstake = plan.unstake;
        self.liquidator_address = Some(plan.receiver);
        self.expected_output = Some(plan.route.expected_output().to_string());
    }

    pub fn set_error(&mut self, err: &LiquidationError) {
        self.success = false;
        self.outcome = "failed".to_string();
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
        self.error_step = err.step().map(|s| s.as_str());
        if let LiquidationError::Execution(e) = err {
            self.tx_hash = e.tx_hash();
        }
    }
}

/// Writes [`AttemptRecord`]s to disk when a directory is configured.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    dir: Option<PathBuf>,
}

impl AttemptLog {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn record(&self, record: &AttemptRecord) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(format!("{:#x}_{}.json", record.borrower, record.timestamp_ms));

        let result = std::fs::create_dir_all(dir)
            .map_err(|e| e.to_string())
            .and_then(|_| serde_json::to_vec_pretty(record).map_err(|e| e.to_string()))
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(|e| e.to_string()));

        match result {
            Ok(()) => debug!(path = %path.display(), "Attempt record written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write attempt record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Step;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("attempt-log-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_record_written_under_borrower_and_timestamp() {
        let dir = temp_dir("write");
        let log = AttemptLog::new(Some(dir.clone()));

        let borrower = Address::repeat_byte(0xab);
        let mut record = AttemptRecord::new(borrower, 1_700_000_000_000);
        record.set_account(u256_math::WAD / U256::from(2u8), U256::from(10u64), U256::from(9u64));
        record.set_error(&LiquidationError::SwapAssembly {
            step: Step::AggregatorQuote,
            message: "no route".into(),
        });
        log.record(&record);

        let path = dir.join(format!("{borrower:#x}_1700000000000.json"));
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["healthFactor"], 0.5);
        assert_eq!(json["totalCollateralBase"], "10");
        assert_eq!(json["errorStep"], "aggregator_quote");
        assert_eq!(json["errorKind"], "swap_assembly");
        assert_eq!(json["success"], false);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let log = AttemptLog::disabled();
        assert!(log.dir().is_none());
        log.record(&AttemptRecord::new(Address::ZERO, 0));
    }
}
