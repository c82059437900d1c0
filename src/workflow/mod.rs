//! Session workflow engine.
//!
//! Drives a session from creation to a finished requirements document. Every
//! mutating operation loads the session, checks its status against the
//! operation's [`Operation::required`] set, and commits the new status through
//! the store's conditional update. Gateway failures abort the operation before
//! any status is written; the engine never retries on its own.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::domain::{IterationView, Project, Question, Session, SessionStatus};
use crate::error::{WorkflowError, WorkflowResult};
use crate::gateways::{
    audio_checksum, ContextGateway, GatewayError, QuestionBlock, ReasoningGateway,
    TranscriptionGateway,
};
use crate::lifecycle;
use crate::store::{SessionPatch, Store};

mod draft;
mod format;
mod guards;
mod interview;
mod oneshot;
mod setup;

pub use format::{format_result, FormattedResult, ResultFormat};
pub use guards::Operation;
pub use oneshot::{ContextAnswer, StartSessionRequest};

/// External services the engine calls
#[derive(Clone)]
pub struct Gateways {
    pub reasoning: Arc<dyn ReasoningGateway>,
    pub context: Arc<dyn ContextGateway>,
    pub transcription: Arc<dyn TranscriptionGateway>,
}

#[derive(Clone)]
pub struct SessionEngine {
    store: Arc<dyn Store>,
    gateways: Gateways,
    settings: WorkflowConfig,
}

impl SessionEngine {
    pub fn new(store: Arc<dyn Store>, gateways: Gateways, settings: WorkflowConfig) -> Self {
        Self {
            store,
            gateways,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn settings(&self) -> &WorkflowConfig {
        &self.settings
    }

    /// Load a session and check it may run `op`
    async fn guarded(&self, op: Operation, session_id: Uuid) -> WorkflowResult<Session> {
        let session = self.get_session(session_id).await?;
        if !op.allows(session.status) {
            let err = WorkflowError::InvalidSessionState {
                operation: op.name(),
                status: session.status,
            };
            err.log(op.name(), session_id);
            return Err(err);
        }
        Ok(session)
    }

    /// Conditional status write; a concurrent winner surfaces as invalid state
    async fn commit(
        &self,
        op: Operation,
        session_id: Uuid,
        patch: SessionPatch,
    ) -> WorkflowResult<Session> {
        let target = patch.status;
        let session = self
            .store
            .transition(session_id, op.required(), patch)
            .await
            .map_err(|e| WorkflowError::from_store(op.name(), e))?;
        if let Some(status) = target {
            tracing::info!(%session_id, status = %status, operation = op.name(), "Session transitioned");
        }
        Ok(session)
    }

    /// Save generated blocks together with the status write of `op`
    async fn commit_blocks(
        &self,
        op: Operation,
        session_id: Uuid,
        blocks: &[QuestionBlock],
        patch: SessionPatch,
    ) -> WorkflowResult<Vec<IterationView>> {
        let target = patch.status;
        let (_, views) = lifecycle::save_generated_blocks(
            self.store.as_ref(),
            op.name(),
            session_id,
            op.required(),
            blocks,
            patch,
        )
        .await?;
        if let Some(status) = target {
            tracing::info!(%session_id, status = %status, operation = op.name(), "Session transitioned");
        }
        Ok(views)
    }

    fn require_goal(session: &Session) -> WorkflowResult<String> {
        session
            .goal()
            .map(str::to_string)
            .ok_or(WorkflowError::MissingField("user_goal"))
    }

    fn require_context(session: &Session) -> WorkflowResult<String> {
        session
            .context()
            .map(str::to_string)
            .ok_or(WorkflowError::MissingField("project_context"))
    }

    /// Description of the linked project, if any
    async fn project_description(&self, session: &Session) -> WorkflowResult<Option<String>> {
        let Some(project_id) = session.project_id else {
            return Ok(None);
        };
        let project = self.get_project(project_id).await?;
        if project.description.trim().is_empty() {
            return Err(WorkflowError::MissingField("project_description"));
        }
        Ok(Some(project.description))
    }

    async fn transcribe(&self, audio: &[u8], filename: &str) -> WorkflowResult<String> {
        if audio.is_empty() {
            return Err(WorkflowError::MissingField("audio"));
        }
        tracing::info!(
            filename,
            checksum = %audio_checksum(audio),
            size = audio.len(),
            "Transcribing audio"
        );

        let transcript = self.gateways.transcription.transcribe(audio, filename).await?;
        if transcript.trim().is_empty() {
            return Err(GatewayError::empty("transcription", "transcript").into());
        }
        Ok(transcript)
    }

    pub async fn get_session(&self, session_id: Uuid) -> WorkflowResult<Session> {
        self.store
            .get_session(session_id)
            .await
            .map_err(|e| WorkflowError::from_store("get session", e))
    }

    pub async fn get_project(&self, project_id: Uuid) -> WorkflowResult<Project> {
        self.store
            .get_project(project_id)
            .await
            .map_err(|e| WorkflowError::from_store("get project", e))
    }

    pub async fn list_projects(&self) -> WorkflowResult<Vec<Project>> {
        self.store
            .list_projects()
            .await
            .map_err(|e| WorkflowError::from_store("list projects", e))
    }

    /// Register a project outside of any session
    pub async fn create_project(
        &self,
        title: &str,
        description: &str,
    ) -> WorkflowResult<Project> {
        if title.trim().is_empty() {
            return Err(WorkflowError::MissingField("title"));
        }
        if description.trim().is_empty() {
            return Err(WorkflowError::MissingField("description"));
        }
        self.store
            .create_project(Project::new(title.trim(), description.trim()))
            .await
            .map_err(|e| WorkflowError::from_store("create project", e))
    }

    pub async fn get_question(&self, question_id: Uuid) -> WorkflowResult<Question> {
        self.store
            .get_question(question_id)
            .await
            .map_err(|e| WorkflowError::from_store("get question", e))
    }

    pub async fn get_question_explanation(&self, question_id: Uuid) -> WorkflowResult<String> {
        Ok(self.get_question(question_id).await?.explanation)
    }

    pub async fn get_iteration(&self, iteration_id: Uuid) -> WorkflowResult<IterationView> {
        lifecycle::iteration_view(self.store.as_ref(), iteration_id).await
    }

    /// Load a question and make sure it belongs to the session
    async fn session_question(&self, session_id: Uuid, question_id: Uuid) -> WorkflowResult<Question> {
        let question = self.get_question(question_id).await?;
        let iteration = self
            .store
            .get_iteration(question.iteration_id)
            .await
            .map_err(|e| WorkflowError::from_store("get question", e))?;
        if iteration.session_id != session_id {
            return Err(WorkflowError::QuestionNotFound(question_id));
        }
        Ok(question)
    }

    pub async fn unanswered_questions(&self, session_id: Uuid) -> WorkflowResult<Vec<Question>> {
        lifecycle::unanswered_questions(self.store.as_ref(), session_id).await
    }

    pub async fn has_skipped_questions(&self, session_id: Uuid) -> WorkflowResult<bool> {
        lifecycle::has_skipped_questions(self.store.as_ref(), session_id).await
    }

    /// Final document; only available once the session is done
    pub async fn get_result(&self, session_id: Uuid) -> WorkflowResult<String> {
        let session = self.guarded(Operation::GetResult, session_id).await?;
        match session.result {
            Some(result) if !result.trim().is_empty() => Ok(result),
            _ => Err(WorkflowError::NoResult),
        }
    }

    /// Move to `Canceled` from any state except `Done`/`Canceled`
    pub async fn cancel_session(&self, session_id: Uuid) -> WorkflowResult<Session> {
        self.guarded(Operation::CancelSession, session_id).await?;
        self.commit(
            Operation::CancelSession,
            session_id,
            SessionPatch::status(SessionStatus::Canceled),
        )
        .await
    }

    /// Record a failure on the session and move it to `Error`
    pub async fn fail_session(&self, session_id: Uuid, reason: &str) -> WorkflowResult<Session> {
        self.guarded(Operation::FailSession, session_id).await?;
        self.commit(
            Operation::FailSession,
            session_id,
            SessionPatch::status(SessionStatus::Error).with_error(reason),
        )
        .await
    }
}
