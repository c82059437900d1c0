//! Callback delivery trait.

use anyhow::Result;
use async_trait::async_trait;

use super::CallbackEvent;

/// Something that can deliver a [`CallbackEvent`] to a URL.
///
/// Delivery is fire-and-forget: implementations log failures and only
/// return an error for problems they could not report themselves.
#[async_trait]
pub trait CallbackSink: Send + Sync {
    /// Sink name, used in logs
    fn name(&self) -> &str;

    async fn deliver(&self, url: &str, request_id: &str, event: &CallbackEvent) -> Result<()>;
}
