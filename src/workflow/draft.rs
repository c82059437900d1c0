//! Draft mode: free-form messages, validated and summarized as a whole.

use uuid::Uuid;

use super::{Operation, SessionEngine};
use crate::domain::{DraftMessage, IterationView, Session, SessionStatus};
use crate::error::{WorkflowError, WorkflowResult};
use crate::gateways::DraftRequest;
use crate::lifecycle;
use crate::store::StoreError;

impl SessionEngine {
    pub async fn add_draft_message(
        &self,
        session_id: Uuid,
        text: &str,
    ) -> WorkflowResult<DraftMessage> {
        self.guarded(Operation::AddDraftMessage, session_id).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::MissingField("message"));
        }

        let max = self.settings.max_draft_messages;
        let message = self
            .store
            .append_draft_message(DraftMessage::new(session_id, text), max)
            .await
            .map_err(|e| match e {
                StoreError::LimitReached { max } => WorkflowError::DraftLimitReached { max },
                other => WorkflowError::from_store("add draft message", other),
            })?;
        tracing::debug!(%session_id, message_id = %message.id, "Draft message added");
        Ok(message)
    }

    pub async fn add_audio_draft_message(
        &self,
        session_id: Uuid,
        audio: &[u8],
    ) -> WorkflowResult<DraftMessage> {
        self.guarded(Operation::AddDraftMessage, session_id).await?;
        let text = self.transcribe(audio, "draft.ogg").await?;
        self.add_draft_message(session_id, &text).await
    }

    pub async fn draft_messages(&self, session_id: Uuid) -> WorkflowResult<Vec<DraftMessage>> {
        self.store
            .list_draft_messages(session_id)
            .await
            .map_err(|e| WorkflowError::from_store("list draft messages", e))
    }

    async fn draft_request(&self, session: &Session) -> WorkflowResult<DraftRequest> {
        let user_goal = Self::require_goal(session)?;
        let project_context = Self::require_context(session)?;

        let messages: Vec<String> = self
            .draft_messages(session.id)
            .await?
            .into_iter()
            .map(|m| m.text)
            .collect();
        if messages.is_empty() {
            return Err(WorkflowError::NoDraftMessages);
        }

        Ok(DraftRequest {
            messages,
            additional_questions: lifecycle::collect_all_answers(self.store.as_ref(), session.id)
                .await?,
            user_goal,
            project_context,
            project_description: self.project_description(session).await?,
        })
    }

    /// Validate the collected draft; same single-round loop as the interview.
    ///
    /// The status only changes once the reasoning service has answered.
    pub async fn validate_draft_messages(
        &self,
        session_id: Uuid,
    ) -> WorkflowResult<Option<IterationView>> {
        let op = Operation::ValidateDraftMessages;
        let session = self.guarded(op, session_id).await?;

        if lifecycle::has_additional_round(self.store.as_ref(), session_id).await? {
            Self::require_goal(&session)?;
            Self::require_context(&session)?;
            tracing::info!(%session_id, "Follow-up round already done, skipping validation");
            return self.apply_validation(op, session_id, Vec::new()).await;
        }

        let request = self.draft_request(&session).await?;
        let follow_ups = self.gateways.reasoning.validate_draft(&request).await?;
        self.apply_validation(op, session_id, follow_ups).await
    }

    pub async fn generate_draft_summary(&self, session_id: Uuid) -> WorkflowResult<Session> {
        let session = self
            .guarded(Operation::GenerateDraftSummary, session_id)
            .await?;
        let request = self.draft_request(&session).await?;
        let summary = self.gateways.reasoning.generate_draft_summary(&request).await?;
        self.finish(Operation::GenerateDraftSummary, session_id, summary)
            .await
    }
}
