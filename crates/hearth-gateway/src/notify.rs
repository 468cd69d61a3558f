// SPDX-License-Identifier: BUSL-1.1
//! # Dispute Notices
//!
//! Best-effort messages to job parties. The dispute core dispatches these on
//! detached tasks after its state commit; a failed delivery is logged by the
//! caller and never changes the outcome of a filing or resolution.

use std::time::Duration;

use async_trait::async_trait;
use hearth_core::{DisputeId, JobId, UserId};
use serde::{Deserialize, Serialize};

use crate::config::NotifierConfig;
use crate::error::NotifyError;
use crate::retry::Backoff;

/// Sent to the party on the other side of a newly filed dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeFiledNotice {
    pub recipient: UserId,
    pub dispute_id: DisputeId,
    pub job_id: JobId,
    pub job_title: String,
    /// Human label of the dispute reason.
    pub reason: String,
    pub description: Option<String>,
    pub filed_by: UserId,
    /// `homeowner` or `contractor`.
    pub filed_by_role: String,
}

/// Sent to both parties once an administrator resolves a dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolvedNotice {
    pub recipient: UserId,
    pub dispute_id: DisputeId,
    pub job_id: JobId,
    pub job_title: String,
    pub action: String,
    pub resolution: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_dispute_filed(&self, notice: &DisputeFiledNotice) -> Result<(), NotifyError>;

    async fn notify_dispute_resolved(&self, notice: &DisputeResolvedNotice) -> Result<(), NotifyError>;

    fn notifier_name(&self) -> &str;
}

/// Writes notices to the structured log. Used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_dispute_filed(&self, notice: &DisputeFiledNotice) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notice.recipient,
            dispute_id = %notice.dispute_id,
            job_id = %notice.job_id,
            reason = %notice.reason,
            filed_by_role = %notice.filed_by_role,
            "dispute filed notice"
        );
        Ok(())
    }

    async fn notify_dispute_resolved(&self, notice: &DisputeResolvedNotice) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notice.recipient,
            dispute_id = %notice.dispute_id,
            job_id = %notice.job_id,
            action = %notice.action,
            "dispute resolved notice"
        );
        Ok(())
    }

    fn notifier_name(&self) -> &str {
        "log"
    }
}

#[derive(Serialize)]
struct WebhookEnvelope<'a, T: Serialize> {
    event: &'a str,
    #[serde(flatten)]
    notice: &'a T,
}

/// Posts notices as JSON to an email/SMS relay.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::NotConfigured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.webhook_url,
        })
    }

    async fn post<T: Serialize + Sync>(&self, event: &str, notice: &T) -> Result<(), NotifyError> {
        let body = WebhookEnvelope { event, notice };
        let resp = Backoff::default().send(event, || self.client.post(&self.url).json(&body).send())
            .await
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_dispute_filed(&self, notice: &DisputeFiledNotice) -> Result<(), NotifyError> {
        self.post("dispute_filed", notice).await
    }

    async fn notify_dispute_resolved(&self, notice: &DisputeResolvedNotice) -> Result<(), NotifyError> {
        self.post("dispute_resolved", notice).await
    }

    fn notifier_name(&self) -> &str {
        "webhook"
    }
}
