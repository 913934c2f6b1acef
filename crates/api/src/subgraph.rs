//! Borrower discovery through the protocol's indexing service.

use crate::error::{check_status, ApiError};
use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

const SERVICE: &str = "subgraph";

const ACCOUNTS_QUERY: &str = "query Accounts($first: Int!, $lastId: String!) { \
    accounts(first: $first, where: { id_gt: $lastId }, orderBy: id) { id } }";

/// Paginated source of borrower addresses.
#[async_trait]
pub trait BorrowerIndex: Send + Sync {
    /// Up to `first` borrower ids strictly greater than `after`, ordered by id.
    async fn borrowers_page(
        &self,
        after: Option<Address>,
        first: usize,
    ) -> Result<Vec<Address>, ApiError>;
}

/// GraphQL client for the accounts registry.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: reqwest::Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<AccountsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct AccountsData {
    accounts: Vec<AccountId>,
}

#[derive(Debug, Deserialize)]
struct AccountId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Decode an `accounts` page into addresses.
fn parse_accounts(response: GraphQlResponse) -> Result<Vec<Address>, ApiError> {
    if let Some(first) = response.errors.first() {
        return Err(ApiError::Rejected {
            service: SERVICE,
            message: first.message.clone(),
        });
    }

    let data = response
        .data
        .ok_or_else(|| ApiError::decode(SERVICE, "missing data field"))?;

    data.accounts
        .into_iter()
        .map(|account| {
            account
                .id
                .parse::<Address>()
                .map_err(|e| ApiError::decode(SERVICE, format!("account id {}: {e}", account.id)))
        })
        .collect()
}

#[async_trait]
impl BorrowerIndex for SubgraphClient {
    #[instrument(skip(self))]
    async fn borrowers_page(
        &self,
        after: Option<Address>,
        first: usize,
    ) -> Result<Vec<Address>, ApiError> {
        // Ids are stored lowercase; the empty string sorts before every id.
        let last_id = after
            .map(|a| format!("{a:#x}"))
            .unwrap_or_default();

        let body = json!({
            "query": ACCOUNTS_QUERY,
            "variables": { "first": first, "lastId": last_id },
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::transport(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let parsed: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| ApiError::decode(SERVICE, e))?;
        let page = parse_accounts(parsed)?;

        debug!(count = page.len(), last_id = %last_id, "Fetched borrower page");
        Ok(page)
    }
}
