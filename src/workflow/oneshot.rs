//! Single-request session start used by the HTTP front-end.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::SessionEngine;
use crate::domain::{IterationView, Session, SessionMode, SessionStatus};
use crate::error::{WorkflowError, WorkflowResult};
use crate::gateways::{ContextRequest, GenerateQuestionsRequest};
use crate::lifecycle;
use crate::store::SessionPatch;

/// A setup question answered up front
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContextAnswer {
    pub question: String,
    pub answer: String,
}

/// Everything needed to start an interview in one call
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    pub user_goal: String,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub context_questions: Option<Vec<ContextAnswer>>,
    pub callback_url: String,
}

impl StartSessionRequest {
    /// Goal and callback are required; context comes from exactly one source
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.user_goal.trim().is_empty() {
            return Err(WorkflowError::MissingField("user_goal"));
        }
        if self.callback_url.trim().is_empty() {
            return Err(WorkflowError::MissingField("callback_url"));
        }
        let has_questions = self
            .context_questions
            .as_ref()
            .is_some_and(|qs| !qs.is_empty());
        match (self.project_id.is_some(), has_questions) {
            (true, true) => Err(WorkflowError::Validation(
                "provide either project_id or context_questions, not both".to_string(),
            )),
            (false, false) => Err(WorkflowError::Validation(
                "either project_id or context_questions is required".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn format_context_answers(answers: &[ContextAnswer]) -> String {
    answers
        .iter()
        .enumerate()
        .map(|(i, qa)| {
            format!(
                "Question {}: {}\nUser answered: {}\n\n",
                i + 1,
                qa.question,
                qa.answer
            )
        })
        .collect()
}

impl SessionEngine {
    /// Create a filled interview session and return its first iteration.
    ///
    /// Context and questions are produced before the session is stored, so a
    /// failed gateway call leaves nothing behind.
    pub async fn start_http_session(
        &self,
        request: &StartSessionRequest,
    ) -> WorkflowResult<IterationView> {
        request.validate()?;
        let user_goal = request.user_goal.trim().to_string();

        let (project_context, project_description) = match request.project_id {
            Some(project_id) => {
                let project = self.get_project(project_id).await?;
                let context = self
                    .gateways
                    .context
                    .get_context(&ContextRequest {
                        project_id: project_id.to_string(),
                        user_goal: user_goal.clone(),
                        top_k: self.settings.context_top_k,
                        max_questions: self.settings.context_max_questions,
                    })
                    .await?;
                (context, Some(project.description))
            }
            None => (
                format_context_answers(request.context_questions.as_deref().unwrap_or_default()),
                None,
            ),
        };

        let blocks = self
            .generate_blocks(&GenerateQuestionsRequest {
                user_goal: user_goal.clone(),
                project_context: project_context.clone(),
                project_description,
            })
            .await?;

        let mut session = Session::new(SessionStatus::WaitingForAnswers);
        session.mode = Some(SessionMode::Interview);
        session.user_goal = Some(user_goal);
        session.project_context = Some(project_context);
        session.project_id = request.project_id;
        let session = self
            .store
            .create_session(session)
            .await
            .map_err(|e| WorkflowError::from_store("start session", e))?;

        let (_, views) = lifecycle::save_generated_blocks(
            self.store.as_ref(),
            "start session",
            session.id,
            &[SessionStatus::WaitingForAnswers],
            &blocks,
            SessionPatch::default(),
        )
        .await?;
        tracing::info!(
            session_id = %session.id,
            iterations = views.len(),
            "One-shot session started"
        );
        views
            .into_iter()
            .next()
            .ok_or_else(|| WorkflowError::Internal("no iteration saved".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::gateways::mock::ReasoningCall;
    use crate::gateways::GatewayError;

    fn manual_request() -> StartSessionRequest {
        StartSessionRequest {
            user_goal: "Automate invoicing".into(),
            project_id: None,
            context_questions: Some(vec![ContextAnswer {
                question: "What do you sell?".into(),
                answer: "Consulting".into(),
            }]),
            callback_url: "http://localhost:9000/hook".into(),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(manual_request().validate().is_ok());

        let mut req = manual_request();
        req.callback_url = String::new();
        assert_eq!(req.validate(), Err(WorkflowError::MissingField("callback_url")));

        let mut req = manual_request();
        req.project_id = Some(Uuid::new_v4());
        assert!(matches!(req.validate(), Err(WorkflowError::Validation(_))));

        let mut req = manual_request();
        req.context_questions = Some(vec![]);
        assert!(matches!(req.validate(), Err(WorkflowError::Validation(_))));
    }

    #[tokio::test]
    async fn test_manual_context_session() {
        let h = harness();
        let view = h.engine.start_http_session(&manual_request()).await.unwrap();
        assert_eq!(view.iteration_number, 1);

        let session = h.engine.get_session(view.session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::WaitingForAnswers);
        assert_eq!(session.mode, Some(SessionMode::Interview));
        assert_eq!(
            session.project_context.as_deref(),
            Some("Question 1: What do you sell?\nUser answered: Consulting\n\n")
        );
        assert!(h.context.requests().is_empty());
    }

    #[tokio::test]
    async fn test_project_session_sends_description() {
        let h = harness();
        let project = h.engine.create_project("Billing", "Invoices for B2B").await.unwrap();
        let mut req = manual_request();
        req.context_questions = None;
        req.project_id = Some(project.id);

        let view = h.engine.start_http_session(&req).await.unwrap();
        let session = h.engine.get_session(view.session_id).await.unwrap();
        assert_eq!(session.project_id, Some(project.id));

        let generate = h
            .reasoning
            .calls()
            .into_iter()
            .find_map(|c| match c {
                ReasoningCall::GenerateQuestions(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(generate.project_description.as_deref(), Some("Invoices for B2B"));
    }

    #[tokio::test]
    async fn test_failed_generation_surfaces_gateway_error() {
        let h = harness();
        h.reasoning.fail_with(GatewayError::http("reasoning", 500, "boom"));
        let err = h.engine.start_http_session(&manual_request()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Gateway(GatewayError::Http { status: 500, .. })));
    }
}
