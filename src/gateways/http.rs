//! Shared HTTP plumbing for gateway clients.
//!
//! Wraps a reqwest client with bearer auth, a per-request timeout and
//! exponential backoff retry for transient failures.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::GatewayError;
use crate::config::GatewayConfig;

/// HTTP client bound to one gateway's base URL
pub struct HttpConnector {
    name: &'static str,
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    max_retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl HttpConnector {
    pub fn new(name: &'static str, config: &GatewayConfig) -> Result<Self, GatewayError> {
        if config.url.trim().is_empty() {
            return Err(GatewayError::not_configured(name));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("reqflow/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::network(name, e.to_string()))?;

        Ok(Self {
            name,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token(),
            client,
            max_retries: config.retry.attempts.saturating_sub(1),
            min_delay: Duration::from_millis(config.retry.min_delay_ms),
            max_delay: Duration::from_millis(config.retry.max_delay_ms),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn retry_strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }

    /// POST a JSON body and decode a JSON response, retrying transient failures
    pub async fn post_json<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp, GatewayError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(endpoint);
        let op = || async {
            let mut request = self.client.post(&url).json(body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            self.decode(request.send().await).await
        };

        op.retry(self.retry_strategy())
            .when(GatewayError::is_transient)
            .notify(|err, dur| {
                warn!(gateway = self.name, "Retrying {} after {:?}: {}", endpoint, dur, err);
            })
            .await
    }

    /// POST a multipart form; `build` is called once per attempt
    pub async fn post_multipart<Resp, F>(&self, endpoint: &str, build: F) -> Result<Resp, GatewayError>
    where
        Resp: DeserializeOwned,
        F: Fn() -> Form,
    {
        let url = self.url(endpoint);
        let op = || async {
            let mut request = self.client.post(&url).multipart(build());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            self.decode(request.send().await).await
        };

        op.retry(self.retry_strategy())
            .when(GatewayError::is_transient)
            .notify(|err, dur| {
                warn!(gateway = self.name, "Retrying {} after {:?}: {}", endpoint, dur, err);
            })
            .await
    }

    async fn decode<Resp: DeserializeOwned>(
        &self,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Resp, GatewayError> {
        let response = response.map_err(|e| GatewayError::from_reqwest(self.name, &e))?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(gateway = self.name, status = %status, "Gateway returned error status");
            return Err(GatewayError::http(self.name, status.as_u16(), message));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| GatewayError::decode(self.name, e.to_string()))
    }
}
