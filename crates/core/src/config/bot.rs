//! Runtime configuration for the liquidation bot.
//!
//! Every field has a serde default so a config file only needs the
//! deployment-specific values (contract addresses, endpoints).

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::quote::QuoteSettings;
use crate::reader::ReaderLimits;
use crate::scanner::ScannerSettings;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub chain: ChainSettings,

    #[serde(default)]
    pub contracts: ContractsConfig,

    /// Scan cadence, thresholds and batch sizes
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Profitability and swap parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub attempt_log: AttemptLogConfig,

    /// Debt assets the flash-mint liquidator can mint
    #[serde(default)]
    pub flash_mintable: Vec<Address>,

    /// Collateral tokens that must be unstaked before swapping
    #[serde(default)]
    pub unstake_wrappers: Vec<UnstakeWrapper>,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Chain connection and transaction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// JSON-RPC endpoint; `${VAR}` is expanded from the environment
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Gas limit for `liquidate(...)`
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

fn default_chain_id() -> u64 {
    1
}
fn default_rpc_url() -> String {
    "${RPC_URL}".to_string()
}
fn default_gas_limit() -> u64 {
    liquidator_chain::DEFAULT_LIQUIDATION_GAS_LIMIT
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            rpc_url: default_rpc_url(),
            gas_limit: default_gas_limit(),
        }
    }
}

/// Protocol and liquidator contract addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub pool: Address,
    #[serde(default)]
    pub oracle: Address,
    #[serde(default)]
    pub data_provider: Address,
    #[serde(default)]
    pub liquidation_logic: Address,
    #[serde(default)]
    pub pt_registry: Address,
    #[serde(default)]
    pub flash_mint_liquidator: Address,
    #[serde(default)]
    pub flash_loan_liquidator: Address,
}

impl ContractsConfig {
    /// Required addresses with their field names.
    pub fn required(&self) -> [(&'static str, Address); 7] {
        [
            ("contracts.pool", self.pool),
            ("contracts.oracle", self.oracle),
            ("contracts.data_provider", self.data_provider),
            ("contracts.liquidation_logic", self.liquidation_logic),
            ("contracts.pt_registry", self.pt_registry),
            ("contracts.flash_mint_liquidator", self.flash_mint_liquidator),
            ("contracts.flash_loan_liquidator", self.flash_loan_liquidator),
        ]
    }
}

/// Scan loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Seconds between cycle starts
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Borrowers below this health factor are candidates
    #[serde(default = "default_hf_threshold")]
    pub hf_threshold: f64,

    /// Concurrent health-factor reads
    #[serde(default = "default_hf_batch_size")]
    pub hf_batch_size: usize,

    /// Concurrent per-reserve reads
    #[serde(default = "default_reserve_batch_size")]
    pub reserve_batch_size: usize,

    /// Candidates per progress chunk
    #[serde(default = "default_liquidation_batch_size")]
    pub liquidation_batch_size: usize,

    /// Borrowers per indexing-service page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_interval_secs() -> u64 {
    10
}
fn default_hf_threshold() -> f64 {
    1.0
}
fn default_hf_batch_size() -> usize {
    50
}
fn default_reserve_batch_size() -> usize {
    10
}
fn default_liquidation_batch_size() -> usize {
    10
}
fn default_page_size() -> usize {
    1000
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            hf_threshold: default_hf_threshold(),
            hf_batch_size: default_hf_batch_size(),
            reserve_batch_size: default_reserve_batch_size(),
            liquidation_batch_size: default_liquidation_batch_size(),
            page_size: default_page_size(),
        }
    }
}

impl ScannerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn reader_limits(&self) -> ReaderLimits {
        ReaderLimits {
            page_size: self.page_size,
            hf_batch_size: self.hf_batch_size,
            reserve_batch_size: self.reserve_batch_size,
        }
    }

    pub fn settings(&self) -> ScannerSettings {
        ScannerSettings {
            interval: self.interval(),
            hf_threshold: self.hf_threshold,
            liquidation_batch_size: self.liquidation_batch_size,
        }
    }
}

/// Liquidation execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Minimum expected bonus (USD)
    #[serde(default = "default_min_profit")]
    pub min_profit_usd: f64,

    /// Swap slippage tolerance (bps)
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,

    /// Extra PT input when sized from a price ratio (bps)
    #[serde(default = "default_pt_estimate_buffer_bps")]
    pub pt_estimate_buffer_bps: u32,

    /// PT input buffer when no price estimate is available (bps)
    #[serde(default = "default_pt_fallback_buffer_bps")]
    pub pt_fallback_buffer_bps: u32,
}

fn default_min_profit() -> f64 {
    1.0
}
fn default_slippage_bps() -> u16 {
    50
}
fn default_pt_estimate_buffer_bps() -> u32 {
    1_000
}
fn default_pt_fallback_buffer_bps() -> u32 {
    5_000
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            min_profit_usd: default_min_profit(),
            slippage_bps: default_slippage_bps(),
            pt_estimate_buffer_bps: default_pt_estimate_buffer_bps(),
            pt_fallback_buffer_bps: default_pt_fallback_buffer_bps(),
        }
    }
}

impl LiquidationConfig {
    pub fn quote_settings(&self) -> QuoteSettings {
        QuoteSettings {
            slippage_bps: self.slippage_bps,
            pt_estimate_buffer_bps: self.pt_estimate_buffer_bps,
            pt_fallback_buffer_bps: self.pt_fallback_buffer_bps,
        }
    }
}

/// Borrower mute window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_ignore_duration_ms")]
    pub ignore_duration_ms: u64,

    /// Persist entries to this file; memory-only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_ignore_duration_ms() -> u64 {
    180_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            ignore_duration_ms: default_ignore_duration_ms(),
            path: None,
        }
    }
}

impl BackoffConfig {
    pub fn ignore_duration(&self) -> Duration {
        Duration::from_millis(self.ignore_duration_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptLogConfig {
    /// Directory for per-attempt JSON records; disabled when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// A collateral token and the wrapper contract whose `asset()` it unstakes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeWrapper {
    pub token: Address,
    pub wrapper: Address,
}

/// External service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Borrower indexing service (GraphQL)
    #[serde(default = "default_subgraph_url")]
    pub subgraph_url: String,

    #[serde(default = "default_aggregator_url")]
    pub aggregator_url: String,

    #[serde(default = "default_yield_market_url")]
    pub yield_market_url: String,

    /// Notifications go to the log only when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Ask the aggregator to simulate assembled swaps
    #[serde(default = "default_simulate_swaps")]
    pub simulate_swaps: bool,
}

fn default_subgraph_url() -> String {
    "${SUBGRAPH_URL}".to_string()
}
fn default_aggregator_url() -> String {
    "https://api.odos.xyz".to_string()
}
fn default_yield_market_url() -> String {
    "https://api-v2.pendle.finance/core".to_string()
}
fn default_simulate_swaps() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            subgraph_url: default_subgraph_url(),
            aggregator_url: default_aggregator_url(),
            yield_market_url: default_yield_market_url(),
            webhook_url: None,
            simulate_swaps: default_simulate_swaps(),
        }
    }
}

impl BotConfig {
    /// token -> wrapper lookup for the quote assembler.
    pub fn unstake_map(&self) -> HashMap<Address, Address> {
        self.unstake_wrappers
            .iter()
            .map(|w| (w.token, w.wrapper))
            .collect()
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(
            chain_id = self.chain.chain_id,
            pool = %self.contracts.pool,
            flash_mint = %self.contracts.flash_mint_liquidator,
            flash_loan = %self.contracts.flash_loan_liquidator,
            "Bot configuration loaded"
        );
        tracing::info!(
            interval_secs = self.scanner.interval_secs,
            hf_threshold = self.scanner.hf_threshold,
            hf_batch = self.scanner.hf_batch_size,
            reserve_batch = self.scanner.reserve_batch_size,
            liquidation_batch = self.scanner.liquidation_batch_size,
            "Scanner parameters"
        );
        tracing::info!(
            min_profit = self.liquidation.min_profit_usd,
            slippage_bps = self.liquidation.slippage_bps,
            pt_estimate_buffer_bps = self.liquidation.pt_estimate_buffer_bps,
            pt_fallback_buffer_bps = self.liquidation.pt_fallback_buffer_bps,
            "Liquidation parameters"
        );
        tracing::info!(
            ignore_duration_ms = self.backoff.ignore_duration_ms,
            persistent = self.backoff.path.is_some(),
            flash_mintable = self.flash_mintable.len(),
            unstake_wrappers = self.unstake_wrappers.len(),
            "Routing and backoff"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.scanner.hf_threshold, 1.0);
        assert_eq!(config.liquidation.slippage_bps, 50);
        assert_eq!(config.backoff.ignore_duration(), Duration::from_secs(180));
        assert_eq!(config.chain.gas_limit, 3_000_000);
        assert!(config.api.webhook_url.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: BotConfig = toml::from_str(
            r#"
            flash_mintable = ["0x4747474747474747474747474747474747474747"]

            [scanner]
            hf_batch_size = 25

            [[unstake_wrappers]]
            token = "0x2020202020202020202020202020202020202020"
            wrapper = "0x7777777777777777777777777777777777777777"
            "#,
        )
        .unwrap();

        assert_eq!(config.scanner.hf_batch_size, 25);
        assert_eq!(config.scanner.reserve_batch_size, 10);
        assert_eq!(config.flash_mintable, vec![Address::repeat_byte(0x47)]);
        assert_eq!(
            config.unstake_map().get(&Address::repeat_byte(0x20)),
            Some(&Address::repeat_byte(0x77))
        );
    }

    #[test]
    fn test_sample_config_parses() {
        let config: BotConfig =
            toml::from_str(include_str!("../../../../config/bot.toml")).unwrap();
        assert_eq!(config.chain.rpc_url, "${RPC_URL}");
        assert_eq!(config.scanner.page_size, 1000);
        assert_eq!(config.liquidation.pt_fallback_buffer_bps, 5000);
        assert!(config.flash_mintable.is_empty());
        // Addresses are placeholders until deployment
        assert_eq!(config.contracts.pool, Address::ZERO);
    }

    #[test]
    fn test_serialization() {
        let mut config = BotConfig::default();
        config.liquidation.min_profit_usd = 5.0;
        let toml_str = toml::to_string_pretty(&config).unwrap();

        let parsed: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.liquidation.min_profit_usd, 5.0);
        assert_eq!(parsed.scanner.settings().interval, Duration::from_secs(10));
    }
}
