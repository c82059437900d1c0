//! Navigation failures and how they are shown to the user.

use thiserror::Error;

use crate::error::WorkflowError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NavigationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("no active session")]
    NoActiveSession,

    #[error("no question is being answered")]
    NoCurrentQuestion,

    #[error("there is no previous question")]
    NothingToGoBackTo,

    #[error("a generation started {elapsed_secs}s ago is still running")]
    StillProcessing { elapsed_secs: i64 },

    #[error("draft message limit of {max} reached")]
    DraftLimitReached { max: usize },

    #[error("unsupported conversation state version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt conversation state: {0}")]
    CorruptState(String),

    #[error("state storage failed: {0}")]
    Storage(String),
}

/// What the chat front-end tells the user when a step fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFacingError {
    /// Expected problem with a message the user can act on
    Warning(String),
    NothingToGoBackTo,
    StillProcessing,
    Timeout,
    NetworkIssue,
    Generic,
}

impl UserFacingError {
    pub fn message(&self) -> String {
        match self {
            UserFacingError::Warning(msg) => msg.clone(),
            UserFacingError::NothingToGoBackTo => "There is no previous question.".to_string(),
            UserFacingError::StillProcessing => {
                "Still working on your previous request, please wait.".to_string()
            }
            UserFacingError::Timeout => {
                "The request took too long. Please try again.".to_string()
            }
            UserFacingError::NetworkIssue => {
                "A service could not be reached. Please try again later.".to_string()
            }
            UserFacingError::Generic => "Something went wrong. Please try again.".to_string(),
        }
    }
}

pub fn classify(err: &NavigationError) -> UserFacingError {
    match err {
        NavigationError::Workflow(inner) => classify_workflow(inner),
        NavigationError::NothingToGoBackTo => UserFacingError::NothingToGoBackTo,
        NavigationError::StillProcessing { .. } => UserFacingError::StillProcessing,
        NavigationError::NoActiveSession
        | NavigationError::NoCurrentQuestion
        | NavigationError::DraftLimitReached { .. } => UserFacingError::Warning(err.to_string()),
        NavigationError::UnsupportedVersion(_)
        | NavigationError::CorruptState(_)
        | NavigationError::Storage(_) => UserFacingError::Generic,
    }
}

fn classify_workflow(err: &WorkflowError) -> UserFacingError {
    match err {
        WorkflowError::Gateway(gateway) if gateway.is_timeout() => UserFacingError::Timeout,
        WorkflowError::Gateway(gateway) if gateway.is_network() => UserFacingError::NetworkIssue,
        WorkflowError::Gateway(_) | WorkflowError::Internal(_) => UserFacingError::Generic,
        other if other.is_domain() || other.is_validation() => {
            UserFacingError::Warning(other.to_string())
        }
        _ => UserFacingError::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionStatus;
    use crate::gateways::GatewayError;
    use uuid::Uuid;

    #[test]
    fn test_classification() {
        let not_found = NavigationError::from(WorkflowError::SessionNotFound(Uuid::nil()));
        assert!(matches!(classify(&not_found), UserFacingError::Warning(_)));

        let state = NavigationError::from(WorkflowError::InvalidSessionState {
            operation: "submit answer",
            status: SessionStatus::Done,
        });
        assert!(matches!(classify(&state), UserFacingError::Warning(_)));

        let timeout = NavigationError::from(WorkflowError::from(GatewayError::timeout("reasoning")));
        assert_eq!(classify(&timeout), UserFacingError::Timeout);

        let network = NavigationError::from(WorkflowError::from(GatewayError::network(
            "context",
            "connection refused",
        )));
        assert_eq!(classify(&network), UserFacingError::NetworkIssue);

        let http = NavigationError::from(WorkflowError::from(GatewayError::http(
            "reasoning",
            500,
            "boom",
        )));
        assert_eq!(classify(&http), UserFacingError::Generic);

        assert_eq!(
            classify(&NavigationError::NothingToGoBackTo),
            UserFacingError::NothingToGoBackTo
        );
    }
}
