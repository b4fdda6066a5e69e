//! Asynchronous evidence validation requests

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::nats::NatsClient;
use crate::types::Result;

pub const DEFAULT_VALIDATION_SUBJECT: &str = "rally.evidence.validate";

/// Message handed to the validation collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub evidence_id: String,
    pub campaign_id: String,
    pub requested_at: DateTime<Utc>,
}

/// Best-effort queue; callers log and drop failures
#[async_trait]
pub trait ValidationQueue: Send + Sync {
    async fn enqueue(&self, evidence_id: &str, campaign_id: &str) -> Result<()>;
}

/// Publishes validation requests as JSON on a NATS subject
pub struct NatsValidationQueue {
    client: NatsClient,
    subject: String,
}

impl NatsValidationQueue {
    pub fn new(client: NatsClient, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl ValidationQueue for NatsValidationQueue {
    async fn enqueue(&self, evidence_id: &str, campaign_id: &str) -> Result<()> {
        let request = ValidationRequest {
            evidence_id: evidence_id.to_string(),
            campaign_id: campaign_id.to_string(),
            requested_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&request)?;
        self.client
            .publish(&self.subject, Bytes::from(payload))
            .await?;
        debug!(
            evidence_id = %evidence_id,
            subject = %self.subject,
            "Validation request published"
        );
        Ok(())
    }
}
