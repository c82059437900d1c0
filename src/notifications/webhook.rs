//! HTTP delivery of callback events.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::sink::CallbackSink;
use super::{CallbackEvent, CallbackPayload};
use crate::config::CallbackConfig;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Posts `{event, timestamp, data}` to the request's callback URL
pub struct WebhookSink {
    client: Client,
    token: Option<String>,
}

impl WebhookSink {
    pub fn new(config: &CallbackConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build callback HTTP client")?;

        let token = match config.token_env.as_deref() {
            Some(name) => match std::env::var(name) {
                Ok(token) if !token.is_empty() => Some(token),
                _ => {
                    tracing::warn!(
                        env_var = name,
                        "Callback token environment variable is not set or empty"
                    );
                    None
                }
            },
            None => None,
        };

        Ok(Self { client, token })
    }
}

#[async_trait]
impl CallbackSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, url: &str, request_id: &str, event: &CallbackEvent) -> Result<()> {
        let payload = CallbackPayload::new(event)?;
        tracing::debug!(
            event = %event.event_type(),
            callback_url = url,
            request_id,
            "Sending callback"
        );

        let mut request = self
            .client
            .post(url)
            .header(REQUEST_ID_HEADER, request_id)
            .json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    event = %event.event_type(),
                    callback_url = url,
                    request_id,
                    "Callback delivered"
                );
            }
            Ok(response) => {
                tracing::warn!(
                    event = %event.event_type(),
                    callback_url = url,
                    request_id,
                    status = %response.status(),
                    "Callback returned non-success status"
                );
            }
            Err(e) => {
                tracing::warn!(
                    event = %event.event_type(),
                    callback_url = url,
                    request_id,
                    error = %e,
                    "Callback delivery failed"
                );
            }
        }

        Ok(())
    }
}
