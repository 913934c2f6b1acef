//! Typed failures of the external HTTP services.

use alloy::primitives::Address;
use thiserror::Error;

/// Failure talking to an external service.
///
/// The pipeline distinguishes transient failures (worth retrying next cycle)
/// from upstream verdicts that make the current attempt pointless.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, timeout or TLS failure before a response arrived.
    #[error("{service}: transport error: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("{service}: upstream returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The service answered but refused the request (e.g. no route found).
    #[error("{service}: request rejected: {message}")]
    Rejected { service: &'static str, message: String },

    /// The assembled transaction failed the service's own simulation.
    #[error("{service}: simulation failed: {message}")]
    Simulation { service: &'static str, message: String },

    /// No active yield market lists the principal token.
    #[error("no active market for principal token {token}")]
    NoMarket { token: Address },

    /// Response body did not match the expected shape.
    #[error("{service}: malformed response: {message}")]
    Decode { service: &'static str, message: String },
}

impl ApiError {
    /// Whether the failure is infrastructure noise rather than a verdict on the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Upstream { status, .. } => *status >= 500 || *status == 429,
            Self::Rejected { .. }
            | Self::Simulation { .. }
            | Self::NoMarket { .. }
            | Self::Decode { .. } => false,
        }
    }

    pub(crate) fn transport(service: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { service, source }
    }

    pub(crate) fn decode(service: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            service,
            message: message.to_string(),
        }
    }
}

/// Turn a non-success response into [`ApiError::Upstream`], passing successes through.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Upstream {
        service,
        status: status.as_u16(),
        body,
    })
}
