//! In-memory sink that keeps every delivery, for tests and local runs.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;

use super::sink::CallbackSink;
use super::CallbackEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub url: String,
    pub request_id: String,
    pub event: CallbackEvent,
}

#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<Delivery>>,
    delivered: Notify,
}

fn lock(deliveries: &Mutex<Vec<Delivery>>) -> MutexGuard<'_, Vec<Delivery>> {
    deliveries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        lock(&self.deliveries).clone()
    }

    /// Wait until at least `count` events arrived, or give up after `timeout`
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Delivery> {
        let _ = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.delivered.notified();
                if lock(&self.deliveries).len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.deliveries()
    }
}

#[async_trait]
impl CallbackSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, url: &str, request_id: &str, event: &CallbackEvent) -> Result<()> {
        lock(&self.deliveries).push(Delivery {
            url: url.to_string(),
            request_id: request_id.to_string(),
            event: event.clone(),
        });
        self.delivered.notify_waiters();
        Ok(())
    }
}
