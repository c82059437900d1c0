//! Persistence boundary for sessions and their children.
//!
//! Every workflow operation re-reads from the store and writes back before
//! returning; nothing is cached across requests. Status changes go through
//! [`Store::transition`], a compare-and-swap on the session status, which is
//! the only concurrency control the workflow relies on.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    DraftMessage, Iteration, Project, Question, Session, SessionMode, SessionStatus,
};

mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Conditional update matched no row
    #[error("session is in status {actual}")]
    StatusMismatch { actual: SessionStatus },

    /// The session already holds its one follow-up round
    #[error("follow-up round already exists, session is in status {actual}")]
    RoundExists { actual: SessionStatus },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("limit of {max} reached")]
    LimitReached { max: usize },

    #[error("storage failure: {0}")]
    Backend(String),
}

/// An iteration and its questions, written together.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: Iteration,
    pub questions: Vec<Question>,
}

/// Field updates applied together with a status change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub mode: Option<SessionMode>,
    pub user_goal: Option<String>,
    pub project_context: Option<String>,
    pub project_id: Option<Uuid>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl SessionPatch {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.user_goal = Some(goal.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub(crate) fn apply(self, session: &mut Session) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(mode) = self.mode {
            session.mode = Some(mode);
        }
        if let Some(goal) = self.user_goal {
            session.user_goal = Some(goal);
        }
        if let Some(context) = self.project_context {
            session.project_context = Some(context);
        }
        if let Some(project_id) = self.project_id {
            session.project_id = Some(project_id);
        }
        if let Some(result) = self.result {
            session.result = Some(result);
        }
        if let Some(error) = self.error {
            session.error = Some(error);
        }
    }
}

/// Typed CRUD access to workflow entities.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<Session, StoreError>;

    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError>;

    /// Apply `patch` only if the session's status is one of `expected`.
    ///
    /// Read, compare and write happen atomically. A mismatch returns
    /// [`StoreError::StatusMismatch`] and leaves the session untouched.
    async fn transition(
        &self,
        id: Uuid,
        expected: &[SessionStatus],
        patch: SessionPatch,
    ) -> Result<Session, StoreError>;

    /// Move the iteration pointer from `from` to `to` if it still equals `from`.
    ///
    /// Returns false when another caller already moved it.
    async fn advance_iteration(&self, id: Uuid, from: u32, to: u32) -> Result<bool, StoreError>;

    /// Insert iterations with their questions and apply `patch`, all or nothing.
    ///
    /// Nothing is written unless the session's status is one of `expected`.
    /// Iterations are numbered after the session's highest number at write
    /// time and questions are re-parented to their iteration. An iteration
    /// titled [`crate::domain::ADDITIONAL_QUESTIONS_TITLE`] is refused with
    /// [`StoreError::RoundExists`] when the session already has one.
    async fn insert_iterations(
        &self,
        session_id: Uuid,
        expected: &[SessionStatus],
        records: Vec<IterationRecord>,
        patch: SessionPatch,
    ) -> Result<(Session, Vec<IterationRecord>), StoreError>;

    async fn get_iteration(&self, id: Uuid) -> Result<Iteration, StoreError>;

    /// Iterations of a session ordered by number.
    async fn list_iterations(&self, session_id: Uuid) -> Result<Vec<Iteration>, StoreError>;

    async fn get_question(&self, id: Uuid) -> Result<Question, StoreError>;

    async fn update_question(&self, question: &Question) -> Result<(), StoreError>;

    /// Questions of an iteration ordered by number.
    async fn list_questions(&self, iteration_id: Uuid) -> Result<Vec<Question>, StoreError>;

    /// Append a draft message unless the session already holds `max` of them.
    async fn append_draft_message(
        &self,
        message: DraftMessage,
        max: usize,
    ) -> Result<DraftMessage, StoreError>;

    /// Draft messages ordered by creation time.
    async fn list_draft_messages(&self, session_id: Uuid)
        -> Result<Vec<DraftMessage>, StoreError>;

    async fn create_project(&self, project: Project) -> Result<Project, StoreError>;

    async fn get_project(&self, id: Uuid) -> Result<Project, StoreError>;

    /// Projects ordered by creation time.
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;
}
