//! Pendle hosted API client.

use super::{MarketInfo, RedeemQuote, RedeemRequest, YieldMarketApi};
use crate::error::{check_status, ApiError};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

const SERVICE: &str = "yield-market";

/// Pendle REST client bound to one chain.
#[derive(Debug, Clone)]
pub struct PendleClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
}

impl PendleClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api-v2.pendle.finance/core".to_string(),
            chain_id,
        }
    }

    /// Create with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::transport(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        response.text().await.map_err(|e| ApiError::transport(SERVICE, e))
    }
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    markets: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    address: Address,
    #[serde(default)]
    name: String,
    pt: String,
    underlying_asset: String,
    #[serde(default)]
    expiry: String,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    tx: Option<RawTx>,
    data: Option<SwapData>,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    to: Address,
    data: Bytes,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapData {
    amount_out: String,
}

/// Token ids are reported as `"{chainId}-{address}"`.
fn parse_token_id(raw: &str) -> Result<Address, ApiError> {
    let address = raw.split_once('-').map(|(_, a)| a).unwrap_or(raw);
    address
        .parse::<Address>()
        .map_err(|e| ApiError::decode(SERVICE, format!("token id {raw:?}: {e}")))
}

fn parse_market(raw: serde_json::Value) -> Result<MarketInfo, ApiError> {
    let m: RawMarket = serde_json::from_value(raw).map_err(|e| ApiError::decode(SERVICE, e))?;
    Ok(MarketInfo {
        address: m.address,
        name: m.name,
        pt: parse_token_id(&m.pt)?,
        underlying_asset: parse_token_id(&m.underlying_asset)?,
        expiry: m.expiry,
    })
}

/// Malformed entries are skipped so one bad market does not hide the rest.
fn parse_markets(body: &str) -> Result<Vec<MarketInfo>, ApiError> {
    let response: MarketsResponse =
        serde_json::from_str(body).map_err(|e| ApiError::decode(SERVICE, e))?;

    let total = response.markets.len();
    let markets: Vec<MarketInfo> = response
        .markets
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw)| match parse_market(raw) {
            Ok(market) => Some(market),
            Err(e) => {
                warn!(index = i, error = %e, "Skipping malformed yield market");
                None
            }
        })
        .collect();

    if markets.len() < total {
        debug!(kept = markets.len(), total, "Some yield markets were skipped");
    }
    Ok(markets)
}

fn parse_u256(raw: &str) -> Result<U256, ApiError> {
    raw.parse::<U256>()
        .map_err(|e| ApiError::decode(SERVICE, format!("amount {raw:?}: {e}")))
}

fn parse_redeem(body: &str) -> Result<RedeemQuote, ApiError> {
    let response: SwapResponse =
        serde_json::from_str(body).map_err(|e| ApiError::decode(SERVICE, e))?;

    let tx = response.tx.ok_or_else(|| ApiError::Rejected {
        service: SERVICE,
        message: "redemption quote has no transaction".to_string(),
    })?;
    let data = response
        .data
        .ok_or_else(|| ApiError::decode(SERVICE, "redemption quote has no amountOut"))?;

    let value = match tx.value.as_deref() {
        Some(raw) if !raw.is_empty() => parse_u256(raw)?,
        _ => U256::ZERO,
    };

    Ok(RedeemQuote {
        to: tx.to,
        data: tx.data,
        value,
        amount_out: parse_u256(&data.amount_out)?,
    })
}

#[async_trait]
impl YieldMarketApi for PendleClient {
    async fn active_markets(&self) -> Result<Vec<MarketInfo>, ApiError> {
        let url = format!("{}/v1/{}/markets/active", self.base_url, self.chain_id);
        let body = self.get(&url, &[]).await?;
        let markets = parse_markets(&body)?;
        debug!(count = markets.len(), "Fetched active yield markets");
        Ok(markets)
    }

    #[instrument(skip(self, request), fields(market = %request.market, pt = %request.pt))]
    async fn redeem_quote(&self, request: &RedeemRequest) -> Result<RedeemQuote, ApiError> {
        let url = format!(
            "{}/v1/sdk/{}/markets/{}/swap",
            self.base_url, self.chain_id, request.market
        );
        let query = [
            ("receiver", request.receiver.to_string()),
            ("slippage", (f64::from(request.slippage_bps) / 10_000.0).to_string()),
            ("enableAggregator", "false".to_string()),
            ("tokenIn", request.pt.to_string()),
            ("tokenOut", request.token_out.to_string()),
            ("amountIn", request.amount_in.to_string()),
        ];

        let body = self.get(&url, &query).await?;
        let quote = parse_redeem(&body)?;

        debug!(
            amount_in = %request.amount_in,
            amount_out = %quote.amount_out,
            to = %quote.to,
            "Redemption quote received"
        );
        Ok(quote)
    }
}
