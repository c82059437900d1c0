//! Workflow error taxonomy.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::SessionStatus;
use crate::gateways::GatewayError;
use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("iteration {0} not found")]
    IterationNotFound(Uuid),

    #[error("question {0} not found")]
    QuestionNotFound(Uuid),

    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("cannot {operation} while session is {status}")]
    InvalidSessionState {
        operation: &'static str,
        status: SessionStatus,
    },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no draft messages to validate")]
    NoDraftMessages,

    #[error("draft message limit of {max} reached")]
    DraftLimitReached { max: usize },

    #[error("session has no result")]
    NoResult,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WorkflowError::SessionNotFound(_)
                | WorkflowError::IterationNotFound(_)
                | WorkflowError::QuestionNotFound(_)
                | WorkflowError::ProjectNotFound(_)
        )
    }

    /// Expected domain outcomes, logged at warning level
    pub fn is_domain(&self) -> bool {
        self.is_not_found() || matches!(self, WorkflowError::InvalidSessionState { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkflowError::MissingField(_)
                | WorkflowError::Validation(_)
                | WorkflowError::NoDraftMessages
                | WorkflowError::DraftLimitReached { .. }
        )
    }

    /// Convert a store failure raised while running `operation`
    pub(crate) fn from_store(operation: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => match entity {
                "session" => WorkflowError::SessionNotFound(id),
                "iteration" => WorkflowError::IterationNotFound(id),
                "question" => WorkflowError::QuestionNotFound(id),
                "project" => WorkflowError::ProjectNotFound(id),
                _ => WorkflowError::Internal(format!("{entity} {id} not found")),
            },
            StoreError::StatusMismatch { actual } | StoreError::RoundExists { actual } => {
                WorkflowError::InvalidSessionState {
                    operation,
                    status: actual,
                }
            }
            StoreError::LimitReached { max } => WorkflowError::DraftLimitReached { max },
            StoreError::Conflict(msg) | StoreError::Backend(msg) => {
                WorkflowError::Internal(format!("{operation}: {msg}"))
            }
        }
    }

    /// Log at the severity the error class calls for
    pub fn log(&self, operation: &str, session_id: Uuid) {
        if self.is_domain() || self.is_validation() {
            tracing::warn!(%session_id, operation, error = %self, "Workflow operation rejected");
        } else if matches!(self, WorkflowError::Gateway(_)) {
            tracing::warn!(%session_id, operation, error = %self, "Gateway call failed");
        } else {
            tracing::error!(%session_id, operation, error = %self, "Workflow operation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mismatch_becomes_invalid_state() {
        let err = WorkflowError::from_store(
            "submit answer",
            StoreError::StatusMismatch {
                actual: SessionStatus::Done,
            },
        );
        assert_eq!(
            err,
            WorkflowError::InvalidSessionState {
                operation: "submit answer",
                status: SessionStatus::Done
            }
        );
        assert_eq!(err.to_string(), "cannot submit answer while session is DONE");
    }

    #[test]
    fn test_not_found_mapping() {
        let id = Uuid::new_v4();
        let err = WorkflowError::from_store(
            "get question",
            StoreError::NotFound {
                entity: "question",
                id,
            },
        );
        assert_eq!(err, WorkflowError::QuestionNotFound(id));
        assert!(err.is_not_found());
        assert!(err.is_domain());
    }

    #[test]
    fn test_gateway_error_is_transparent() {
        let err: WorkflowError = GatewayError::timeout("reasoning").into();
        assert_eq!(err.to_string(), "reasoning: request timed out");
        assert!(!err.is_domain());
    }
}
