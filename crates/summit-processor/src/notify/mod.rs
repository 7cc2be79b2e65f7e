//! Operator notifications
//!
//! Every operator-visible failure goes through a [`Notifier`]. Delivery
//! problems are logged by [`deliver`] and never reach the pipeline.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::NotifyConfig;
use crate::ingest::voc::parser::BoundViolation;
use crate::models::Instrument;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected notification with status {status}")]
    Rejected { status: u16 },
}

/// Subject and body of one outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// A processor stage failed; `chain` is the full cause chain.
    pub fn stage_failure(processor: &str, chain: &str) -> Self {
        let title = processor
            .parse::<Instrument>()
            .map(|i| i.title())
            .unwrap_or_else(|_| processor.to_string());
        Self::new(format!("{} Error", title), chain)
    }

    pub fn no_new_data(instrument: Instrument, body: impl Into<String>) -> Self {
        Self::new(format!("No New Data for Summit {}", instrument.title()), body)
    }

    /// Counterpart of an earlier notification once its fault cleared.
    pub fn resolved(original: &Notification, body: impl Into<String>) -> Self {
        Self::new(format!("Resolved - {}", original.subject), body)
    }

    pub fn log_parameters(filename: &str, violations: &[BoundViolation]) -> Self {
        let body = violations
            .iter()
            .map(|v| {
                format!(
                    "{} was {} (limits {} to {})",
                    v.parameter, v.value, v.bounds.low, v.bounds.high
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(format!("LogParameter Error in {}", filename), body)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Send and swallow: a failed delivery is logged, never returned.
pub async fn deliver(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier.send(notification).await {
        error!(subject = %notification.subject, error = %e, "Failed to deliver notification");
    }
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        warn!(subject = %notification.subject, body = %notification.body, "Notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    recipients: &'a [String],
}

/// Posts notifications as JSON to a webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    recipients: Vec<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, recipients: Vec<String>, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("summit-processor/0.1")
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            recipients,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            subject: &notification.subject,
            body: &notification.body,
            recipients: &self.recipients,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(subject = %notification.subject, "Notification sent");
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log notifier otherwise.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url.clone(),
            config.recipients.clone(),
            config.timeout_secs,
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
