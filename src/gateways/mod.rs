//! External service gateways used by the workflow engine.
//!
//! Each gateway is a narrow async trait so the engine can run against the HTTP
//! clients in production and the [`mock`] implementations in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod context;
mod error;
mod http;
pub mod mock;
mod reasoning;
mod transcription;

pub use context::HttpContextGateway;
pub use error::GatewayError;
pub use http::HttpConnector;
pub use reasoning::HttpReasoningGateway;
pub use transcription::{audio_checksum, HttpTranscriptionGateway};

/// A question proposed by the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub text: String,
    #[serde(default)]
    pub explanation: String,
}

/// A titled group of generated questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBlock {
    pub title: String,
    pub questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnsweredQuestion {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateQuestionsRequest {
    pub user_goal: String,
    pub project_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
}

/// Prompt built from the interview answers; used for validation and summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswersRequest {
    pub answered_questions: Vec<AnsweredQuestion>,
    pub user_goal: String,
    pub project_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
}

/// Prompt built from draft messages plus any follow-up answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub messages: Vec<String>,
    pub additional_questions: Vec<AnsweredQuestion>,
    pub user_goal: String,
    pub project_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub project_id: String,
    pub user_goal: String,
    pub top_k: u32,
    pub max_questions: u32,
}

/// Question generation, answer validation and summarization.
#[async_trait]
pub trait ReasoningGateway: Send + Sync {
    async fn generate_questions(
        &self,
        request: &GenerateQuestionsRequest,
    ) -> Result<Vec<QuestionBlock>, GatewayError>;

    /// Follow-up questions; empty means the answers are sufficient
    async fn validate_answers(
        &self,
        request: &AnswersRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError>;

    async fn validate_draft(
        &self,
        request: &DraftRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError>;

    async fn generate_summary(&self, request: &AnswersRequest) -> Result<String, GatewayError>;

    async fn generate_draft_summary(&self, request: &DraftRequest)
        -> Result<String, GatewayError>;
}

/// Semantic retrieval over a project's indexed documents.
#[async_trait]
pub trait ContextGateway: Send + Sync {
    /// Relevant chunks joined into one text
    async fn get_context(&self, request: &ContextRequest) -> Result<String, GatewayError>;
}

/// Speech to text.
#[async_trait]
pub trait TranscriptionGateway: Send + Sync {
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String, GatewayError>;
}
