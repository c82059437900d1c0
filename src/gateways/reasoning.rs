//! HTTP client for the reasoning service.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};

use super::{
    AnswersRequest, DraftRequest, GatewayError, GenerateQuestionsRequest, GeneratedQuestion,
    HttpConnector, QuestionBlock, ReasoningGateway,
};
use crate::config::ReasoningConfig;

const GATEWAY_NAME: &str = "reasoning";

#[derive(Deserialize)]
struct GenerateQuestionsResponse {
    #[serde(default)]
    iterations: Vec<QuestionBlock>,
}

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    questions: Vec<GeneratedQuestion>,
}

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    result: String,
}

pub struct HttpReasoningGateway {
    connector: HttpConnector,
    config: ReasoningConfig,
}

impl HttpReasoningGateway {
    pub fn new(config: &ReasoningConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            connector: HttpConnector::new(GATEWAY_NAME, &config.gateway)?,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ReasoningGateway for HttpReasoningGateway {
    #[instrument(skip(self, request))]
    async fn generate_questions(
        &self,
        request: &GenerateQuestionsRequest,
    ) -> Result<Vec<QuestionBlock>, GatewayError> {
        let response: GenerateQuestionsResponse = self
            .connector
            .post_json(&self.config.generate_questions_endpoint, request)
            .await?;
        info!(blocks = response.iterations.len(), "Questions generated");
        Ok(response.iterations)
    }

    #[instrument(skip(self, request), fields(answered = request.answered_questions.len()))]
    async fn validate_answers(
        &self,
        request: &AnswersRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError> {
        let response: ValidateResponse = self
            .connector
            .post_json(&self.config.validate_answers_endpoint, request)
            .await?;
        Ok(response.questions)
    }

    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    async fn validate_draft(
        &self,
        request: &DraftRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError> {
        let response: ValidateResponse = self
            .connector
            .post_json(&self.config.validate_draft_endpoint, request)
            .await?;
        Ok(response.questions)
    }

    #[instrument(skip(self, request))]
    async fn generate_summary(&self, request: &AnswersRequest) -> Result<String, GatewayError> {
        let response: SummaryResponse = self
            .connector
            .post_json(&self.config.generate_summary_endpoint, request)
            .await?;
        Ok(response.result)
    }

    #[instrument(skip(self, request))]
    async fn generate_draft_summary(
        &self,
        request: &DraftRequest,
    ) -> Result<String, GatewayError> {
        let response: SummaryResponse = self
            .connector
            .post_json(&self.config.generate_draft_summary_endpoint, request)
            .await?;
        Ok(response.result)
    }
}
