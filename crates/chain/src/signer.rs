//! Transaction signer and sender for liquidations.
//!
//! - Cached nonce: atomic counter avoids an RPC call per transaction
//! - Fixed gas limit: liquidations are never estimated
//! - Gas price taken from the node at send time

use crate::contracts::LiquidationSubmitter;
use crate::error::ExecutionError;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Gas limit for a liquidation including both swap legs.
pub const DEFAULT_LIQUIDATION_GAS_LIMIT: u64 = 3_000_000;

/// Locally tracked nonce.
pub struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Get next nonce and increment counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Force the counter to the chain value (after a failed or reverted tx).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Signs and sends liquidation transactions from the operator wallet.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    gas_limit: u64,
}

impl TransactionSender {
    /// Create a sender and fetch the starting nonce from the chain.
    pub async fn new(private_key: &str, rpc_url: &str, chain_id: u64, gas_limit: u64) -> Result<Self> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let initial_nonce = provider.get_transaction_count(address).await?;

        info!(
            address = %address,
            chain_id = chain_id,
            initial_nonce = initial_nonce,
            gas_limit = gas_limit,
            "Transaction sender initialized"
        );

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet,
            address,
            chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_limit,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }

    fn wallet_provider(&self) -> Result<impl Provider> {
        Ok(ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?))
    }

    /// Send a transaction and wait for the receipt.
    pub async fn send_transaction(&self, to: Address, calldata: Bytes) -> Result<B256, ExecutionError> {
        let total_start = Instant::now();
        let submit_err = |reason: String| ExecutionError::Submit {
            to: to.to_string(),
            reason,
        };

        let provider = self
            .wallet_provider()
            .map_err(|e| submit_err(format!("invalid rpc url: {e}")))?;

        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(|e| submit_err(format!("eth_gasPrice: {e}")))?;

        let nonce = self.nonce_manager.next();
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        info!(
            to = %to,
            nonce = nonce,
            gas_limit = self.gas_limit,
            gas_price_gwei = gas_price / 1_000_000_000,
            "Sending transaction"
        );

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(to = %to, nonce = nonce, error = %e, "Transaction submission failed, syncing nonce");
                self.sync_nonce().await;
                return Err(submit_err(e.to_string()));
            }
        };
        let tx_hash = *pending.tx_hash();
        let submit_elapsed = total_start.elapsed();

        debug!(
            tx_hash = %tx_hash,
            submit_ms = submit_elapsed.as_millis(),
            "Transaction submitted, waiting for confirmation"
        );

        let receipt = match pending.get_receipt().await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.sync_nonce().await;
                return Err(ExecutionError::Receipt {
                    tx_hash,
                    reason: e.to_string(),
                });
            }
        };

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = total_start.elapsed().as_millis(),
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            warn!(
                tx_hash = %tx_hash,
                total_ms = total_start.elapsed().as_millis(),
                "Transaction reverted, syncing nonce"
            );
            self.sync_nonce().await;
            Err(ExecutionError::Reverted { tx_hash })
        }
    }

    /// Re-read the pending nonce from the chain.
    pub async fn sync_nonce(&self) {
        let provider = match self.wallet_provider() {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "Cannot sync nonce: invalid rpc url");
                return;
            }
        };
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }
}

#[async_trait]
impl LiquidationSubmitter for TransactionSender {
    fn sender_address(&self) -> Address {
        self.address
    }

    async fn submit(&self, to: Address, calldata: Bytes) -> Result<B256, ExecutionError> {
        self.send_transaction(to, calldata).await
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .field("gas_limit", &self.gas_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_manager() {
        let manager = NonceManager::new(10);

        assert_eq!(manager.current(), 10);
        assert_eq!(manager.next(), 10);
        assert_eq!(manager.next(), 11);
        assert_eq!(manager.current(), 12);

        manager.reset(5);
        assert_eq!(manager.current(), 5);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let sender = TransactionSender::new("not-a-key", "http://127.0.0.1:1", 1, 1_000_000).await;
        assert!(sender.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_sender_creation() {
        // Well-known dev key (DO NOT USE IN PRODUCTION)
        let private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let sender = TransactionSender::new(private_key, "http://127.0.0.1:8545", 31337, DEFAULT_LIQUIDATION_GAS_LIMIT)
            .await
            .unwrap();
        assert_eq!(
            format!("{:?}", sender.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }
}
