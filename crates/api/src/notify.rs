//! Best-effort operator notifications.
//!
//! Delivery never fails the caller: errors are logged and dropped so they
//! cannot mask the outcome being reported.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One reportable event.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrower: Option<Address>,
    /// Pipeline step that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    pub detail: String,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            borrower: None,
            step: None,
            tx_hash: None,
            detail: detail.into(),
        }
    }

    pub fn with_borrower(mut self, borrower: Address) -> Self {
        self.borrower = Some(borrower);
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: Option<B256>) -> Self {
        self.tx_hash = tx_hash;
        self
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.title)?;
        if let Some(borrower) = self.borrower {
            write!(f, " | borrower {borrower}")?;
        }
        if let Some(step) = &self.step {
            write!(f, " | step {step}")?;
        }
        if let Some(tx_hash) = self.tx_hash {
            write!(f, " | tx {tx_hash}")?;
        }
        write!(f, " | {}", self.detail)
    }
}

/// Notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) {
        match notification.severity {
            Severity::Info => info!(notification = %notification, "[NOTIFY]"),
            Severity::Warning => warn!(notification = %notification, "[NOTIFY]"),
            Severity::Error => error!(notification = %notification, "[NOTIFY]"),
        }
    }
}

/// Posts notifications as JSON to a webhook (Slack/Discord-compatible `text` field).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    text: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) {
        let body = WebhookBody {
            text: notification.to_string(),
            notification,
        };

        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), "Webhook notification rejected");
            }
            Err(e) => {
                warn!(error = %e, "Webhook notification failed");
            }
        }
    }
}
