//! Core entities of the requirements workflow.
//!
//! A [`Session`] owns a sequence of [`Iteration`]s, each holding numbered
//! [`Question`]s. Draft-mode sessions additionally collect [`DraftMessage`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Title given to the single follow-up iteration produced by validation.
pub const ADDITIONAL_QUESTIONS_TITLE: &str = "additional questions";

/// Status of a session in the workflow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    New,
    AskUserGoal,
    SelectOrCreateProject,
    AskProjectName,
    AskProjectDescription,
    AskUserContext,
    ChooseMode,
    InterviewInfo,
    DraftInfo,
    GeneratingQuestions,
    WaitingForAnswers,
    DraftCollecting,
    Validating,
    GeneratingRequirements,
    Done,
    Error,
    Canceled,
}

impl SessionStatus {
    /// Every status, in workflow order.
    pub const ALL: [SessionStatus; 17] = [
        SessionStatus::New,
        SessionStatus::AskUserGoal,
        SessionStatus::SelectOrCreateProject,
        SessionStatus::AskProjectName,
        SessionStatus::AskProjectDescription,
        SessionStatus::AskUserContext,
        SessionStatus::ChooseMode,
        SessionStatus::InterviewInfo,
        SessionStatus::DraftInfo,
        SessionStatus::GeneratingQuestions,
        SessionStatus::WaitingForAnswers,
        SessionStatus::DraftCollecting,
        SessionStatus::Validating,
        SessionStatus::GeneratingRequirements,
        SessionStatus::Done,
        SessionStatus::Error,
        SessionStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::New => "NEW",
            SessionStatus::AskUserGoal => "ASK_USER_GOAL",
            SessionStatus::SelectOrCreateProject => "SELECT_OR_CREATE_PROJECT",
            SessionStatus::AskProjectName => "ASK_PROJECT_NAME",
            SessionStatus::AskProjectDescription => "ASK_PROJECT_DESCRIPTION",
            SessionStatus::AskUserContext => "ASK_USER_CONTEXT",
            SessionStatus::ChooseMode => "CHOOSE_MODE",
            SessionStatus::InterviewInfo => "INTERVIEW_INFO",
            SessionStatus::DraftInfo => "DRAFT_INFO",
            SessionStatus::GeneratingQuestions => "GENERATING_QUESTIONS",
            SessionStatus::WaitingForAnswers => "WAITING_FOR_ANSWERS",
            SessionStatus::DraftCollecting => "DRAFT_COLLECTING",
            SessionStatus::Validating => "VALIDATING",
            SessionStatus::GeneratingRequirements => "GENERATING_REQUIREMENTS",
            SessionStatus::Done => "DONE",
            SessionStatus::Error => "ERROR",
            SessionStatus::Canceled => "CANCELED",
        }
    }

    /// Terminal statuses are never left by regular transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Done | SessionStatus::Error | SessionStatus::Canceled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the session gathers information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    Interview,
    Draft,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Interview => f.write_str("INTERVIEW"),
            SessionMode::Draft => f.write_str("DRAFT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Unanswered,
    Skipped,
    Answered,
}

impl QuestionStatus {
    /// Still waiting for an answer (never answered, or skipped earlier).
    pub fn is_open(&self) -> bool {
        matches!(self, QuestionStatus::Unanswered | QuestionStatus::Skipped)
    }
}

/// Root aggregate of one requirements-gathering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub status: SessionStatus,
    #[serde(default)]
    pub mode: Option<SessionMode>,
    #[serde(default)]
    pub user_goal: Option<String>,
    #[serde(default)]
    pub project_context: Option<String>,
    /// Number of the iteration currently being answered (1-based)
    pub current_iteration: u32,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(status: SessionStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: None,
            status,
            mode: None,
            user_goal: None,
            project_context: None,
            current_iteration: 1,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Goal text, treating an empty string as unset.
    pub fn goal(&self) -> Option<&str> {
        self.user_goal.as_deref().filter(|g| !g.trim().is_empty())
    }

    /// Project context, treating an empty string as unset.
    pub fn context(&self) -> Option<&str> {
        self.project_context
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

/// A titled block of questions generated together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: Uuid,
    pub session_id: Uuid,
    pub number: u32,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Iteration {
    pub fn is_additional(&self) -> bool {
        self.title == ADDITIONAL_QUESTIONS_TITLE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub iteration_id: Uuid,
    pub number: u32,
    pub status: QuestionStatus,
    pub question: String,
    pub explanation: String,
    #[serde(default)]
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
}

/// Rejected question status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionTransitionError {
    EmptyAnswer,
    AlreadyAnswered,
}

impl Question {
    /// Record an answer. Allowed from any status; answered questions are edited
    /// in place, and the text can never be blanked.
    pub fn answer(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QuestionTransitionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QuestionTransitionError::EmptyAnswer);
        }
        self.answer = Some(text.to_string());
        self.status = QuestionStatus::Answered;
        self.answered_at = Some(now);
        Ok(())
    }

    /// Mark the question skipped. Skipping an already skipped question is a no-op.
    pub fn skip(&mut self) -> Result<(), QuestionTransitionError> {
        match self.status {
            QuestionStatus::Answered => Err(QuestionTransitionError::AlreadyAnswered),
            QuestionStatus::Unanswered | QuestionStatus::Skipped => {
                self.status = QuestionStatus::Skipped;
                Ok(())
            }
        }
    }
}

/// Free-form text collected in draft mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl DraftMessage {
    pub fn new(session_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            files: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// An iteration together with its questions, as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IterationView {
    pub session_id: Uuid,
    pub iteration_id: Uuid,
    pub iteration_number: u32,
    pub title: String,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuestionView {
    pub id: Uuid,
    pub question_number: u32,
    pub status: QuestionStatus,
    pub question: String,
    pub explanation: String,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_number: q.number,
            status: q.status,
            question: q.question.clone(),
            explanation: q.explanation.clone(),
        }
    }
}

impl IterationView {
    pub fn new(iteration: &Iteration, questions: &[Question]) -> Self {
        Self {
            session_id: iteration.session_id,
            iteration_id: iteration.id,
            iteration_number: iteration.number,
            title: iteration.title.clone(),
            questions: questions.iter().map(QuestionView::from).collect(),
        }
    }

    /// First question still waiting for an answer.
    pub fn first_open(&self) -> Option<&QuestionView> {
        self.questions
            .iter()
            .find(|q| q.status == QuestionStatus::Unanswered)
    }
}

/// Session as reported to API clients and callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    pub session_status: SessionStatus,
    pub iteration_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            project_id: session.project_id,
            session_status: session.status,
            iteration_number: session.current_iteration,
            final_result: session.result.clone(),
            error: session.error.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}
