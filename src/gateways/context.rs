//! HTTP client for the semantic retrieval (context) service.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};

use super::{ContextGateway, ContextRequest, GatewayError, HttpConnector};
use crate::config::ContextConfig;

const GATEWAY_NAME: &str = "context";

#[derive(Deserialize)]
struct Chunk {
    text: String,
}

#[derive(Deserialize, Default)]
struct RelevantContext {
    #[serde(default)]
    relevant_chunks: Vec<Chunk>,
}

#[derive(Deserialize)]
struct ContextResponse {
    #[serde(default)]
    relevant_context: RelevantContext,
}

impl ContextResponse {
    fn joined(self) -> String {
        self.relevant_context
            .relevant_chunks
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct HttpContextGateway {
    connector: HttpConnector,
    endpoint: String,
}

impl HttpContextGateway {
    pub fn new(config: &ContextConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            connector: HttpConnector::new(GATEWAY_NAME, &config.gateway)?,
            endpoint: config.context_endpoint.clone(),
        })
    }
}

#[async_trait]
impl ContextGateway for HttpContextGateway {
    #[instrument(skip(self, request), fields(project_id = %request.project_id))]
    async fn get_context(&self, request: &ContextRequest) -> Result<String, GatewayError> {
        let response: ContextResponse = self.connector.post_json(&self.endpoint, request).await?;
        let context = response.joined();
        info!(length = context.len(), "Project context retrieved");
        Ok(context)
    }
}
