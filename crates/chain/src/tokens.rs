//! Token metadata and classification.
//!
//! Resolves token decimals, principal-token membership and ERC-4626 wrapper
//! underlyings. Results are immutable on-chain facts, so they are cached in a
//! [`TokenMetadataCache`] owned by the registry instance.

use crate::contracts::{IERC20, IERC4626, IPtRegistry};
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// Token classification needed to pick a swap route.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Whether `token` is a principal token according to the PT registry.
    async fn is_principal_token(&self, token: Address) -> Result<bool>;

    /// Underlying asset of an ERC-4626 style wrapper (`asset()`).
    async fn wrapper_asset(&self, wrapper: Address) -> Result<Address>;

    /// ERC20 decimals.
    async fn decimals(&self, token: Address) -> Result<u8>;
}

/// Per-instance cache of token facts.
#[derive(Debug, Default)]
pub struct TokenMetadataCache {
    decimals: DashMap<Address, u8>,
    principal_tokens: DashMap<Address, bool>,
    wrapper_assets: DashMap<Address, Address>,
}

impl TokenMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decimals(&self, token: &Address) -> Option<u8> {
        self.decimals.get(token).map(|d| *d)
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.decimals.insert(token, decimals);
    }

    pub fn is_principal_token(&self, token: &Address) -> Option<bool> {
        self.principal_tokens.get(token).map(|v| *v)
    }

    pub fn set_principal_token(&self, token: Address, is_pt: bool) {
        self.principal_tokens.insert(token, is_pt);
    }

    pub fn wrapper_asset(&self, wrapper: &Address) -> Option<Address> {
        self.wrapper_assets.get(wrapper).map(|a| *a)
    }

    pub fn set_wrapper_asset(&self, wrapper: Address, asset: Address) {
        self.wrapper_assets.insert(wrapper, asset);
    }

    pub fn len(&self) -> usize {
        self.decimals.len() + self.principal_tokens.len() + self.wrapper_assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// JSON-RPC backed [`TokenRegistry`].
#[derive(Debug)]
pub struct OnchainTokenRegistry {
    rpc_url: String,
    pt_registry: Address,
    cache: TokenMetadataCache,
}

impl OnchainTokenRegistry {
    pub fn new(rpc_url: &str, pt_registry: Address) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            pt_registry,
            cache: TokenMetadataCache::new(),
        }
    }

    /// Access the cache (e.g. to seed decimals already known from reserve configs).
    pub fn cache(&self) -> &TokenMetadataCache {
        &self.cache
    }

    fn provider(&self) -> Result<impl Provider> {
        Ok(ProviderBuilder::new().on_http(self.rpc_url.parse()?))
    }
}

#[async_trait]
impl TokenRegistry for OnchainTokenRegistry {
    async fn is_principal_token(&self, token: Address) -> Result<bool> {
        if let Some(is_pt) = self.cache.is_principal_token(&token) {
            return Ok(is_pt);
        }

        let provider = self.provider()?;
        let registry = IPtRegistry::new(self.pt_registry, &provider);
        let is_pt = registry
            .isPT(token)
            .call()
            .await
            .with_context(|| format!("isPT({token})"))?
            ._0;

        debug!(token = %token, is_pt = is_pt, "Resolved principal token flag");
        self.cache.set_principal_token(token, is_pt);
        Ok(is_pt)
    }

    async fn wrapper_asset(&self, wrapper: Address) -> Result<Address> {
        if let Some(asset) = self.cache.wrapper_asset(&wrapper) {
            return Ok(asset);
        }

        let provider = self.provider()?;
        let vault = IERC4626::new(wrapper, &provider);
        let asset = vault
            .asset()
            .call()
            .await
            .with_context(|| format!("asset() on wrapper {wrapper}"))?
            ._0;

        debug!(wrapper = %wrapper, asset = %asset, "Resolved wrapper underlying");
        self.cache.set_wrapper_asset(wrapper, asset);
        Ok(asset)
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        if let Some(decimals) = self.cache.decimals(&token) {
            return Ok(decimals);
        }

        let provider = self.provider()?;
        let erc20 = IERC20::new(token, &provider);
        let decimals = erc20
            .decimals()
            .call()
            .await
            .with_context(|| format!("decimals() on {token}"))?
            ._0;

        self.cache.set_decimals(token, decimals);
        Ok(decimals)
    }
}
