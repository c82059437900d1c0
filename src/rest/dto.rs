//! Data Transfer Objects for the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::Project;
use crate::error::{WorkflowError, WorkflowResult};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Returned when work continues in the background
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcceptedResponse {
    pub status: String,
    pub message: String,
}

impl AcceptedResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "accepted".to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Answer DTOs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    #[serde(default)]
    pub answers: String,
    #[serde(default)]
    pub is_skipped: bool,
    pub callback_url: String,
}

impl SubmitAnswerRequest {
    pub fn validate(&self) -> WorkflowResult<()> {
        validate_callback(&self.callback_url)?;
        if !self.is_skipped && self.answers.trim().is_empty() {
            return Err(WorkflowError::MissingField("answers"));
        }
        Ok(())
    }
}

/// Options for an audio answer; the audio itself is the request body
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AudioAnswerQuery {
    #[serde(default)]
    pub is_skipped: bool,
    #[serde(default)]
    pub callback_url: String,
}

impl AudioAnswerQuery {
    pub fn validate(&self, audio: &[u8]) -> WorkflowResult<()> {
        validate_callback(&self.callback_url)?;
        if !self.is_skipped && audio.is_empty() {
            return Err(WorkflowError::MissingField("audio"));
        }
        Ok(())
    }
}

fn validate_callback(url: &str) -> WorkflowResult<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(WorkflowError::MissingField("callback_url"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(WorkflowError::Validation(format!(
            "callback_url must be an http(s) URL: {url}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResultQuery {
    /// `markdown` (default) or `json`
    #[serde(default)]
    pub format: Option<String>,
}

// =============================================================================
// Project DTOs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: String,
    /// Receives a `projectUpdated` event once the project is stored
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Project> for ProjectResponse {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            title: p.title,
            description: p.description,
            files: p.files,
            created_at: p.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_required_unless_skipped() {
        let mut req = SubmitAnswerRequest {
            answers: "  ".into(),
            is_skipped: false,
            callback_url: "http://client/hook".into(),
        };
        assert_eq!(req.validate(), Err(WorkflowError::MissingField("answers")));
        req.is_skipped = true;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_callback_must_be_http() {
        let query = AudioAnswerQuery {
            is_skipped: false,
            callback_url: "ftp://client".into(),
        };
        assert!(matches!(
            query.validate(b"OggS"),
            Err(WorkflowError::Validation(_))
        ));

        let query = AudioAnswerQuery {
            is_skipped: false,
            callback_url: "https://client/hook".into(),
        };
        assert_eq!(query.validate(b""), Err(WorkflowError::MissingField("audio")));
    }
}
