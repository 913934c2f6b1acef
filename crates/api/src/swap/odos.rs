//! Odos smart-order-router client.

use super::{AssembledSwap, Quote, QuoteRequest, SwapAggregator};
use crate::error::{check_status, ApiError};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const SERVICE: &str = "aggregator";

/// Odos REST client bound to one chain.
#[derive(Debug, Clone)]
pub struct OdosClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
    /// Ask the assembler to simulate the transaction
    simulate: bool,
}

impl OdosClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.odos.xyz".to_string(),
            chain_id,
            simulate: false,
        }
    }

    /// Create with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable assembler-side simulation.
    pub fn with_simulation(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the `/sor/quote/v2` body.
    fn quote_body(&self, request: &QuoteRequest) -> QuoteBody {
        QuoteBody {
            chain_id: self.chain_id,
            input_tokens: vec![InputToken {
                token_address: request.token_in,
                amount: request.amount_in.to_string(),
            }],
            output_tokens: vec![OutputToken {
                token_address: request.token_out,
                proportion: 1.0,
            }],
            slippage_limit_percent: f64::from(request.slippage_bps) / 100.0,
            user_addr: request.user,
            referral_code: 0,
            disable_rfqs: true,
            compact: true,
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(SERVICE, e))?;

        let status = response.status();
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Odos reports routing failures as 4xx with a `detail` message.
            let body = response.text().await.unwrap_or_default();
            return Err(rejection_from_body(status.as_u16(), body));
        }
        let response = check_status(SERVICE, response).await?;
        response.text().await.map_err(|e| ApiError::transport(SERVICE, e))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody {
    chain_id: u64,
    input_tokens: Vec<InputToken>,
    output_tokens: Vec<OutputToken>,
    slippage_limit_percent: f64,
    user_addr: Address,
    referral_code: u32,
    #[serde(rename = "disableRFQs")]
    disable_rfqs: bool,
    compact: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputToken {
    token_address: Address,
    amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputToken {
    token_address: Address,
    proportion: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    path_id: Option<String>,
    #[serde(default)]
    out_amounts: Vec<String>,
    #[serde(default)]
    gas_estimate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssembleBody<'a> {
    user_addr: Address,
    path_id: &'a str,
    simulate: bool,
    receiver: Address,
}

#[derive(Debug, Deserialize)]
struct AssembleResponse {
    transaction: Option<AssembledTransaction>,
    simulation: Option<Simulation>,
    #[serde(rename = "outputTokens", default)]
    output_tokens: Vec<AssembledOutput>,
}

#[derive(Debug, Deserialize)]
struct AssembledTransaction {
    to: Address,
    data: Bytes,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Simulation {
    is_success: bool,
    simulation_error: Option<SimulationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulationError {
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct AssembledOutput {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

fn rejection_from_body(status: u16, body: String) -> ApiError {
    match serde_json::from_str::<ErrorBody>(&body).ok().and_then(|b| b.detail) {
        Some(detail) => ApiError::Rejected {
            service: SERVICE,
            message: detail,
        },
        None => ApiError::Upstream {
            service: SERVICE,
            status,
            body,
        },
    }
}

fn parse_amount(raw: &str) -> Result<U256, ApiError> {
    if raw.is_empty() {
        return Ok(U256::ZERO);
    }
    raw.parse::<U256>()
        .map_err(|e| ApiError::decode(SERVICE, format!("amount {raw:?}: {e}")))
}

fn parse_quote(request: &QuoteRequest, body: &str) -> Result<Quote, ApiError> {
    let response: QuoteResponse =
        serde_json::from_str(body).map_err(|e| ApiError::decode(SERVICE, e))?;

    let path_id = response.path_id.ok_or_else(|| ApiError::Rejected {
        service: SERVICE,
        message: "quote has no pathId".to_string(),
    })?;
    let amount_out = match response.out_amounts.first() {
        Some(raw) => parse_amount(raw)?,
        None => return Err(ApiError::decode(SERVICE, "quote has no outAmounts")),
    };

    Ok(Quote {
        path_id,
        token_in: request.token_in,
        amount_in: request.amount_in,
        token_out: request.token_out,
        amount_out,
        gas_estimate: response.gas_estimate.max(0.0) as u64,
        user: request.user,
    })
}

fn parse_assembly(body: &str) -> Result<AssembledSwap, ApiError> {
    let response: AssembleResponse =
        serde_json::from_str(body).map_err(|e| ApiError::decode(SERVICE, e))?;

    if let Some(simulation) = response.simulation {
        if !simulation.is_success {
            let message = simulation
                .simulation_error
                .map(|e| e.error_message)
                .unwrap_or_else(|| "unknown simulation error".to_string());
            return Err(ApiError::Simulation {
                service: SERVICE,
                message,
            });
        }
    }

    let tx = response
        .transaction
        .ok_or_else(|| ApiError::decode(SERVICE, "assembly has no transaction"))?;
    let amount_out = match response.output_tokens.first() {
        Some(out) => parse_amount(&out.amount)?,
        None => U256::ZERO,
    };

    Ok(AssembledSwap {
        to: tx.to,
        data: tx.data,
        value: parse_amount(&tx.value)?,
        amount_out,
    })
}

#[async_trait]
impl SwapAggregator for OdosClient {
    fn name(&self) -> &str {
        "odos"
    }

    #[instrument(skip(self, request), fields(token_in = %request.token_in, token_out = %request.token_out))]
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, ApiError> {
        let body = self.quote_body(request);
        debug!(amount_in = %request.amount_in, user = %request.user, "Requesting aggregator quote");

        let raw = self.post("/sor/quote/v2", &body).await?;
        let quote = parse_quote(request, &raw)?;

        debug!(
            path_id = %quote.path_id,
            amount_out = %quote.amount_out,
            gas_estimate = quote.gas_estimate,
            "Aggregator quote received"
        );
        Ok(quote)
    }

    #[instrument(skip(self, quote), fields(path_id = %quote.path_id))]
    async fn assemble(&self, quote: &Quote, receiver: Address) -> Result<AssembledSwap, ApiError> {
        let body = AssembleBody {
            user_addr: quote.user,
            path_id: &quote.path_id,
            simulate: self.simulate,
            receiver,
        };

        let raw = self.post("/sor/assemble", &body).await?;
        let assembled = parse_assembly(&raw)?;

        debug!(to = %assembled.to, calldata_len = assembled.data.len(), "Aggregator transaction assembled");
        Ok(assembled)
    }

    async fn token_price(&self, token: Address) -> Result<f64, ApiError> {
        let url = format!("{}/pricing/token/{}/{}", self.base_url, self.chain_id, token);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::transport(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let parsed: PriceResponse = response
            .json()
            .await
            .map_err(|e| ApiError::decode(SERVICE, e))?;
        match parsed.price {
            Some(price) if price.is_finite() && price > 0.0 => Ok(price),
            _ => Err(ApiError::Rejected {
                service: SERVICE,
                message: format!("no price for {token}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QuoteRequest {
        QuoteRequest::new(
            Address::repeat_byte(1),
            U256::from(1_000_000u64),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        )
    }

    #[test]
    fn test_quote_body_shape() {
        let client = OdosClient::new(1);
        let body = serde_json::to_value(client.quote_body(&request().with_slippage_bps(50))).unwrap();

        assert_eq!(body["chainId"], 1);
        assert_eq!(body["inputTokens"][0]["amount"], "1000000");
        assert_eq!(body["outputTokens"][0]["proportion"], 1.0);
        assert_eq!(body["slippageLimitPercent"], 0.5);
        assert_eq!(body["disableRFQs"], true);
        assert_eq!(
            body["userAddr"].as_str().unwrap().to_lowercase(),
            format!("{:#x}", Address::repeat_byte(3))
        );
    }

    #[test]
    fn test_parse_quote() {
        let json = r#"{
            "pathId": "abc123",
            "outAmounts": ["999500"],
            "inAmounts": ["1000000"],
            "gasEstimate": 215000.0
        }"#;
        let quote = parse_quote(&request(), json).unwrap();
        assert_eq!(quote.path_id, "abc123");
        assert_eq!(quote.amount_out, U256::from(999_500u64));
        assert_eq!(quote.gas_estimate, 215_000);
        assert_eq!(quote.user, Address::repeat_byte(3));
    }

    #[test]
    fn test_parse_quote_without_path_is_rejection() {
        let json = r#"{ "outAmounts": ["1"] }"#;
        assert!(matches!(parse_quote(&request(), json), Err(ApiError::Rejected { .. })));
    }

    #[test]
    fn test_parse_assembly() {
        let json = r#"{
            "transaction": {
                "to": "0x0202020202020202020202020202020202020202",
                "data": "0xdeadbeef",
                "value": "0"
            },
            "simulation": { "isSuccess": true, "simulationError": null },
            "outputTokens": [{ "tokenAddress": "0x0101010101010101010101010101010101010101", "amount": "42" }]
        }"#;
        let assembled = parse_assembly(json).unwrap();
        assert_eq!(assembled.to, Address::repeat_byte(2));
        assert_eq!(assembled.data, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(assembled.value, U256::ZERO);
        assert_eq!(assembled.amount_out, U256::from(42u64));
    }

    #[test]
    fn test_failed_simulation_is_typed() {
        let json = r#"{
            "transaction": { "to": "0x0202020202020202020202020202020202020202", "data": "0x", "value": "0" },
            "simulation": {
                "isSuccess": false,
                "simulationError": { "type": "other", "errorMessage": "Return amount is not enough" }
            }
        }"#;
        match parse_assembly(json) {
            Err(ApiError::Simulation { message, .. }) => {
                assert_eq!(message, "Return amount is not enough")
            }
            other => panic!("expected simulation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_rejection_detail_surfaces() {
        let err = rejection_from_body(400, r#"{"detail":"No viable path"}"#.to_string());
        match err {
            ApiError::Rejected { message, .. } => assert_eq!(message, "No viable path"),
            other => panic!("unexpected {other:?}"),
        }

        let err = rejection_from_body(404, "not found".to_string());
        assert!(matches!(err, ApiError::Upstream { status: 404, .. }));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OdosClient::new(1).with_base_url("http://localhost:9000/");
        assert_eq!(client.base_url(), "http://localhost:9000");
    }
}
