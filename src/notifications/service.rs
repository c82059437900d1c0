//! Dispatches callback events without blocking the request that caused them.

use std::sync::Arc;

use anyhow::Result;

use super::sink::CallbackSink;
use super::webhook::WebhookSink;
use super::CallbackEvent;
use crate::config::Config;

/// Central callback dispatcher
#[derive(Clone)]
pub struct NotificationService {
    sink: Option<Arc<dyn CallbackSink>>,
}

impl NotificationService {
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.callback.enabled {
            tracing::info!("Callbacks disabled");
            return Ok(Self::disabled());
        }
        Ok(Self::with_sink(Arc::new(WebhookSink::new(&config.callback)?)))
    }

    pub fn with_sink(sink: Arc<dyn CallbackSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Fire-and-forget: the event is sent from its own task
    pub fn notify(&self, callback_url: &str, request_id: &str, event: CallbackEvent) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        if callback_url.is_empty() {
            tracing::debug!(event = %event.event_type(), "No callback URL, event dropped");
            return;
        }

        let url = callback_url.to_string();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&url, &request_id, &event).await {
                tracing::warn!(
                    sink = %sink.name(),
                    event = %event.event_type(),
                    request_id = %request_id,
                    error = %e,
                    "Callback delivery failed"
                );
            }
        });
    }

    /// Send and wait for completion, for callers already off the request path
    pub async fn deliver(&self, callback_url: &str, request_id: &str, event: CallbackEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        if callback_url.is_empty() {
            return;
        }
        if let Err(e) = sink.deliver(callback_url, request_id, &event).await {
            tracing::warn!(
                sink = %sink.name(),
                event = %event.event_type(),
                request_id,
                error = %e,
                "Callback delivery failed"
            );
        }
    }
}
