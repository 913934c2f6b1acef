//! Yield-market discovery and principal-token redemption quotes.

mod pendle;

pub use pendle::PendleClient;

use crate::error::ApiError;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

/// One active yield market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketInfo {
    /// Market contract
    pub address: Address,
    pub name: String,
    /// Principal token traded in this market
    pub pt: Address,
    /// Asset the principal token redeems into
    pub underlying_asset: Address,
    /// Maturity as reported by the service
    pub expiry: String,
}

/// Request to turn principal tokens into the underlying asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemRequest {
    pub market: Address,
    pub pt: Address,
    pub token_out: Address,
    /// Principal tokens to sell
    pub amount_in: U256,
    /// Address the transaction is built for (and that receives the output)
    pub receiver: Address,
    pub slippage_bps: u16,
}

/// Executable redemption transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemQuote {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Expected underlying received
    pub amount_out: U256,
}

/// Yield-market service operations.
#[async_trait]
pub trait YieldMarketApi: Send + Sync {
    /// All currently tradable markets.
    async fn active_markets(&self) -> Result<Vec<MarketInfo>, ApiError>;

    /// Calldata redeeming `amount_in` principal tokens into `token_out`.
    async fn redeem_quote(&self, request: &RedeemRequest) -> Result<RedeemQuote, ApiError>;

    /// Market listing `pt`, or [`ApiError::NoMarket`].
    async fn market_for(&self, pt: Address) -> Result<MarketInfo, ApiError> {
        let markets = self.active_markets().await?;
        find_market(&markets, pt)
            .cloned()
            .ok_or(ApiError::NoMarket { token: pt })
    }
}

/// First market whose principal token is `pt`.
pub fn find_market(markets: &[MarketInfo], pt: Address) -> Option<&MarketInfo> {
    markets.iter().find(|m| m.pt == pt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(pt: u8) -> MarketInfo {
        MarketInfo {
            address: Address::repeat_byte(0x40 + pt),
            name: format!("market-{pt}"),
            pt: Address::repeat_byte(pt),
            underlying_asset: Address::repeat_byte(0x20),
            expiry: "2026-12-31T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn test_find_market_by_pt() {
        let markets = vec![market(1), market(2)];
        assert_eq!(
            find_market(&markets, Address::repeat_byte(2)).map(|m| m.address),
            Some(Address::repeat_byte(0x42))
        );
        assert!(find_market(&markets, Address::repeat_byte(3)).is_none());
    }
}
