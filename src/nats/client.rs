//! NATS client wrapper
//!
//! Connection management with keep-alive and optional credentials. Only the
//! publish side is needed here: validation requests are fire-and-forget.

use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::types::{CampaignError, Result};

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        let url = args
            .nats_url
            .as_deref()
            .ok_or_else(|| CampaignError::Config("NATS_URL is not set".into()))?;
        info!("Connecting to NATS at {}", url);

        // No retry on initial connect: a missing broker should fail startup fast
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(url)
            .await
            .map_err(|e| CampaignError::ValidationQueue(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", url);

        Ok(Self { client })
    }

    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| CampaignError::ValidationQueue(format!("Publish failed: {}", e)))
    }
}
