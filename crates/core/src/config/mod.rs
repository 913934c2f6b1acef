//! Configuration for the liquidation bot.
//!
//! This module provides:
//! - Bot runtime configuration (contracts, thresholds, batch sizes, endpoints)
//! - Loading from TOML with environment overrides
//! - Startup validation

mod bot;
mod loader;

pub use bot::{
    ApiConfig, AttemptLogConfig, BackoffConfig, BotConfig, ChainSettings, ContractsConfig,
    LiquidationConfig, ScannerConfig, UnstakeWrapper,
};
pub use loader::{expand_env, ConfigError, DEFAULT_CONFIG_PATH};
