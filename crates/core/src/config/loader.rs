//! Loading, environment expansion and validation of [`BotConfig`].

use super::BotConfig;
use alloy::primitives::Address;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Default config path when `BOT_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/bot.toml";

/// Startup configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required address {0}")]
    MissingAddress(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Expand a whole-value `${VAR}` reference; other strings pass through.
pub fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    match value.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        Some(var_name) => lookup(var_name).unwrap_or_else(|| value.to_string()),
        None => value.to_string(),
    }
}

impl BotConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file and apply the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        info!(path = %path.display(), "Configuration file loaded");
        Ok(config)
    }

    /// Load from `BOT_CONFIG`, or [`DEFAULT_CONFIG_PATH`].
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// Apply `RPC_URL`, `SUBGRAPH_URL`, `AGGREGATOR_URL` and
    /// `NOTIFY_WEBHOOK_URL`, then expand remaining `${VAR}` references.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// [`Self::apply_env_overrides`] with an explicit variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Some(url) = lookup("SUBGRAPH_URL") {
            self.api.subgraph_url = url;
        }
        if let Some(url) = lookup("AGGREGATOR_URL") {
            self.api.aggregator_url = url;
        }
        if let Some(url) = lookup("NOTIFY_WEBHOOK_URL") {
            self.api.webhook_url = Some(url);
        }

        self.chain.rpc_url = expand_env(&self.chain.rpc_url, &lookup);
        self.api.subgraph_url = expand_env(&self.api.subgraph_url, &lookup);
        self.api.aggregator_url = expand_env(&self.api.aggregator_url, &lookup);
        self.api.yield_market_url = expand_env(&self.api.yield_market_url, &lookup);
        if let Some(url) = self.api.webhook_url.take() {
            self.api.webhook_url = Some(expand_env(&url, &lookup));
        }
    }

    /// Reject configurations the bot cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, address) in self.contracts.required() {
            if address == Address::ZERO {
                return Err(ConfigError::MissingAddress(field));
            }
        }

        for (field, url) in [
            ("chain.rpc_url", &self.chain.rpc_url),
            ("api.subgraph_url", &self.api.subgraph_url),
            ("api.aggregator_url", &self.api.aggregator_url),
            ("api.yield_market_url", &self.api.yield_market_url),
        ] {
            if url.is_empty() || url.starts_with("${") {
                return Err(invalid(field, format!("unresolved value {url:?}")));
            }
        }

        let scanner = &self.scanner;
        for (field, size) in [
            ("scanner.hf_batch_size", scanner.hf_batch_size),
            ("scanner.reserve_batch_size", scanner.reserve_batch_size),
            ("scanner.liquidation_batch_size", scanner.liquidation_batch_size),
            ("scanner.page_size", scanner.page_size),
        ] {
            if size == 0 {
                return Err(invalid(field, "must be positive"));
            }
        }
        if scanner.interval_secs == 0 {
            return Err(invalid("scanner.interval_secs", "must be positive"));
        }
        if !(scanner.hf_threshold.is_finite() && scanner.hf_threshold > 0.0) {
            return Err(invalid("scanner.hf_threshold", "must be positive"));
        }

        let liquidation = &self.liquidation;
        if !(liquidation.min_profit_usd.is_finite() && liquidation.min_profit_usd >= 0.0) {
            return Err(invalid("liquidation.min_profit_usd", "must be non-negative"));
        }
        if liquidation.slippage_bps >= 10_000 {
            return Err(invalid("liquidation.slippage_bps", "must be below 10000"));
        }

        if self.backoff.ignore_duration_ms == 0 {
            return Err(invalid("backoff.ignore_duration_ms", "must be positive"));
        }
        if self.chain.gas_limit == 0 {
            return Err(invalid("chain.gas_limit", "must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> BotConfig {
        let mut config = BotConfig::default();
        let c = &mut config.contracts;
        c.pool = Address::repeat_byte(1);
        c.oracle = Address::repeat_byte(2);
        c.data_provider = Address::repeat_byte(3);
        c.liquidation_logic = Address::repeat_byte(4);
        c.pt_registry = Address::repeat_byte(5);
        c.flash_mint_liquidator = Address::repeat_byte(6);
        c.flash_loan_liquidator = Address::repeat_byte(7);
        config.chain.rpc_url = "http://localhost:8545".into();
        config.api.subgraph_url = "http://localhost:8000/graphql".into();
        config
    }

    #[test]
    fn test_env_expansion() {
        let env = HashMap::from([("TEST_VAR", "test_value")]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        assert_eq!(expand_env("${TEST_VAR}", lookup), "test_value");
        assert_eq!(expand_env("literal", lookup), "literal");
        assert_eq!(expand_env("${NONEXISTENT}", lookup), "${NONEXISTENT}");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = BotConfig::default();
        let env = HashMap::from([
            ("RPC_URL", "http://rpc"),
            ("NOTIFY_WEBHOOK_URL", "http://hook"),
        ]);
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.chain.rpc_url, "http://rpc");
        assert_eq!(config.api.webhook_url.as_deref(), Some("http://hook"));
        // Unset variables stay unresolved and fail validation
        assert_eq!(config.api.subgraph_url, "${SUBGRAPH_URL}");
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.contracts.flash_loan_liquidator = Address::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAddress("contracts.flash_loan_liquidator"))
        ));

        let mut config = valid();
        config.scanner.hf_batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "scanner.hf_batch_size", .. })
        ));

        let mut config = valid();
        config.liquidation.slippage_bps = 10_000;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.api.subgraph_url = "${SUBGRAPH_URL}".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = BotConfig::load("/nonexistent/bot.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
