//! Session setup: goal, project or manual context, and mode selection.

use uuid::Uuid;

use super::{Operation, SessionEngine};
use crate::domain::{Project, Session, SessionMode, SessionStatus};
use crate::error::{WorkflowError, WorkflowResult};
use crate::gateways::ContextRequest;
use crate::store::SessionPatch;

/// Context text built from the manual setup questions and the user's reply
pub(crate) fn manual_context(questions: &str, answers: &str) -> String {
    format!("Questions {questions} answered: {answers}")
}

impl SessionEngine {
    /// Create a session waiting for the user's goal
    pub async fn start_session(&self) -> WorkflowResult<Session> {
        let session = self
            .store
            .create_session(Session::new(SessionStatus::AskUserGoal))
            .await
            .map_err(|e| WorkflowError::from_store("start session", e))?;
        tracing::info!(session_id = %session.id, "Session started");
        Ok(session)
    }

    pub async fn submit_goal(&self, session_id: Uuid, goal: &str) -> WorkflowResult<Session> {
        self.guarded(Operation::SubmitGoal, session_id).await?;
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(WorkflowError::MissingField("user_goal"));
        }
        self.commit(
            Operation::SubmitGoal,
            session_id,
            SessionPatch::status(SessionStatus::SelectOrCreateProject).with_goal(goal),
        )
        .await
    }

    pub async fn submit_audio_goal(&self, session_id: Uuid, audio: &[u8]) -> WorkflowResult<Session> {
        self.guarded(Operation::SubmitGoal, session_id).await?;
        let goal = self.transcribe(audio, "goal.ogg").await?;
        self.submit_goal(session_id, &goal).await
    }

    /// Link an existing project and pull its context from the context service
    pub async fn link_project_context(
        &self,
        session_id: Uuid,
        project_id: Uuid,
    ) -> WorkflowResult<Session> {
        let session = self
            .guarded(Operation::LinkProjectContext, session_id)
            .await?;
        let goal = Self::require_goal(&session)?;
        self.get_project(project_id).await?;

        let context = self
            .gateways
            .context
            .get_context(&ContextRequest {
                project_id: project_id.to_string(),
                user_goal: goal,
                top_k: self.settings.context_top_k,
                max_questions: self.settings.context_max_questions,
            })
            .await?;

        self.commit(
            Operation::LinkProjectContext,
            session_id,
            SessionPatch::status(SessionStatus::ChooseMode)
                .with_project(project_id)
                .with_context(context),
        )
        .await
    }

    pub async fn start_manual_context(&self, session_id: Uuid) -> WorkflowResult<Session> {
        self.guarded(Operation::StartManualContext, session_id).await?;
        self.commit(
            Operation::StartManualContext,
            session_id,
            SessionPatch::status(SessionStatus::AskUserContext),
        )
        .await
    }

    /// The default setup questions as one numbered prompt
    pub fn context_questions_prompt(&self) -> String {
        self.settings
            .default_context_questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {q}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn submit_context(
        &self,
        session_id: Uuid,
        questions: &str,
        answers: &str,
    ) -> WorkflowResult<Session> {
        self.guarded(Operation::SubmitContext, session_id).await?;
        if answers.trim().is_empty() {
            return Err(WorkflowError::MissingField("project_context"));
        }
        self.commit(
            Operation::SubmitContext,
            session_id,
            SessionPatch::status(SessionStatus::ChooseMode)
                .with_context(manual_context(questions, answers.trim())),
        )
        .await
    }

    pub async fn submit_audio_context(
        &self,
        session_id: Uuid,
        questions: &str,
        audio: &[u8],
    ) -> WorkflowResult<Session> {
        self.guarded(Operation::SubmitContext, session_id).await?;
        let answers = self.transcribe(audio, "context.ogg").await?;
        self.submit_context(session_id, questions, &answers).await
    }

    pub async fn set_mode(&self, session_id: Uuid, mode: SessionMode) -> WorkflowResult<Session> {
        self.guarded(Operation::SetMode, session_id).await?;
        let next = match mode {
            SessionMode::Interview => SessionStatus::InterviewInfo,
            SessionMode::Draft => SessionStatus::DraftInfo,
        };
        self.commit(
            Operation::SetMode,
            session_id,
            SessionPatch::status(next).with_mode(mode),
        )
        .await
    }

    pub async fn restart_mode_selection(&self, session_id: Uuid) -> WorkflowResult<Session> {
        self.guarded(Operation::RestartModeSelection, session_id)
            .await?;
        self.commit(
            Operation::RestartModeSelection,
            session_id,
            SessionPatch::status(SessionStatus::ChooseMode),
        )
        .await
    }

    pub async fn restart_project_selection(&self, session_id: Uuid) -> WorkflowResult<Session> {
        self.guarded(Operation::RestartProjectSelection, session_id)
            .await?;
        self.commit(
            Operation::RestartProjectSelection,
            session_id,
            SessionPatch::status(SessionStatus::SelectOrCreateProject),
        )
        .await
    }

    pub async fn start_draft_collecting(&self, session_id: Uuid) -> WorkflowResult<Session> {
        let session = self
            .guarded(Operation::StartDraftCollecting, session_id)
            .await?;
        if session.mode != Some(SessionMode::Draft) {
            return Err(WorkflowError::Validation(
                "draft collecting requires draft mode".to_string(),
            ));
        }
        self.commit(
            Operation::StartDraftCollecting,
            session_id,
            SessionPatch::status(SessionStatus::DraftCollecting),
        )
        .await
    }

    pub async fn start_project_creation(&self, session_id: Uuid) -> WorkflowResult<Session> {
        self.guarded(Operation::StartProjectCreation, session_id)
            .await?;
        self.commit(
            Operation::StartProjectCreation,
            session_id,
            SessionPatch::status(SessionStatus::AskProjectName),
        )
        .await
    }

    /// Accept the new project's name; the caller keeps it until the description arrives
    pub async fn submit_project_name(
        &self,
        session_id: Uuid,
        name: &str,
    ) -> WorkflowResult<Session> {
        self.guarded(Operation::SubmitProjectName, session_id).await?;
        if name.trim().is_empty() {
            return Err(WorkflowError::MissingField("project_name"));
        }
        self.commit(
            Operation::SubmitProjectName,
            session_id,
            SessionPatch::status(SessionStatus::AskProjectDescription),
        )
        .await
    }

    /// Create the project, link it and use its description as context
    pub async fn submit_project_description(
        &self,
        session_id: Uuid,
        name: &str,
        description: &str,
    ) -> WorkflowResult<(Session, Project)> {
        self.guarded(Operation::SubmitProjectDescription, session_id)
            .await?;
        let project = self.create_project(name, description).await?;
        tracing::info!(%session_id, project_id = %project.id, "Project created");

        let session = self
            .commit(
                Operation::SubmitProjectDescription,
                session_id,
                SessionPatch::status(SessionStatus::ChooseMode)
                    .with_project(project.id)
                    .with_context(project.description.clone()),
            )
            .await?;
        Ok((session, project))
    }

    pub async fn submit_audio_project_description(
        &self,
        session_id: Uuid,
        name: &str,
        audio: &[u8],
    ) -> WorkflowResult<(Session, Project)> {
        self.guarded(Operation::SubmitProjectDescription, session_id)
            .await?;
        let description = self.transcribe(audio, "project.ogg").await?;
        self.submit_project_description(session_id, name, &description)
            .await
    }
}
