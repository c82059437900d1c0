//! Interview mode: question generation, answering, and the validation loop.

use chrono::Utc;
use uuid::Uuid;

use super::{Operation, SessionEngine};
use crate::domain::{
    IterationView, Question, QuestionTransitionError, Session, SessionStatus,
    ADDITIONAL_QUESTIONS_TITLE,
};
use crate::error::{WorkflowError, WorkflowResult};
use crate::gateways::{
    AnswersRequest, GatewayError, GenerateQuestionsRequest, GeneratedQuestion, QuestionBlock,
};
use crate::lifecycle;
use crate::store::SessionPatch;

impl SessionEngine {
    /// Generate the interview questions and open the session for answers
    pub async fn load_questions(&self, session_id: Uuid) -> WorkflowResult<Vec<IterationView>> {
        let session = self.guarded(Operation::LoadQuestions, session_id).await?;
        let request = GenerateQuestionsRequest {
            user_goal: Self::require_goal(&session)?,
            project_context: Self::require_context(&session)?,
            project_description: self.project_description(&session).await?,
        };

        let blocks = self.generate_blocks(&request).await?;
        let views = self
            .commit_blocks(
                Operation::LoadQuestions,
                session_id,
                &blocks,
                SessionPatch::status(SessionStatus::WaitingForAnswers),
            )
            .await?;
        tracing::info!(%session_id, iterations = views.len(), "Questions loaded");
        Ok(views)
    }

    pub(super) async fn generate_blocks(
        &self,
        request: &GenerateQuestionsRequest,
    ) -> WorkflowResult<Vec<QuestionBlock>> {
        let blocks = self.gateways.reasoning.generate_questions(request).await?;
        if blocks.is_empty() {
            return Err(GatewayError::empty("reasoning", "questions").into());
        }
        Ok(blocks)
    }

    /// Answer a question (new, skipped, or already answered).
    ///
    /// Returns the iteration to answer next. When none remains and nothing is
    /// left open, the session moves to `Validating`.
    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        answer: &str,
    ) -> WorkflowResult<Option<IterationView>> {
        self.guarded(Operation::SubmitAnswer, session_id).await?;
        let mut question = self.session_question(session_id, question_id).await?;

        question
            .answer(answer, Utc::now())
            .map_err(|_| WorkflowError::MissingField("answer"))?;
        self.save_question(&question).await?;
        tracing::debug!(%session_id, %question_id, "Answer saved");

        self.after_question_closed(Operation::SubmitAnswer, session_id)
            .await
    }

    pub async fn submit_audio_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        audio: &[u8],
    ) -> WorkflowResult<Option<IterationView>> {
        self.guarded(Operation::SubmitAnswer, session_id).await?;
        let answer = self.transcribe(audio, &format!("{question_id}.ogg")).await?;
        self.submit_answer(session_id, question_id, &answer).await
    }

    /// Skip a question. Skipping an answered question keeps its answer.
    pub async fn skip_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> WorkflowResult<Option<IterationView>> {
        self.guarded(Operation::SkipAnswer, session_id).await?;
        self.skip_question(session_id, question_id).await?;
        self.after_question_closed(Operation::SkipAnswer, session_id)
            .await
    }

    /// Skip during replay; returns what is still open.
    pub async fn skip_replayed_question(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> WorkflowResult<Vec<Question>> {
        self.guarded(Operation::SkipReplayedQuestion, session_id)
            .await?;
        self.skip_question(session_id, question_id).await?;

        let remaining = self.unanswered_questions(session_id).await?;
        if remaining.is_empty() {
            self.commit(
                Operation::SkipReplayedQuestion,
                session_id,
                SessionPatch::status(SessionStatus::Validating),
            )
            .await?;
        }
        Ok(remaining)
    }

    /// Re-enter answering after a result exists. The stored result is kept.
    pub async fn reopen_for_answers(&self, session_id: Uuid) -> WorkflowResult<Session> {
        self.guarded(Operation::ReopenForAnswers, session_id).await?;
        self.commit(
            Operation::ReopenForAnswers,
            session_id,
            SessionPatch::status(SessionStatus::WaitingForAnswers),
        )
        .await
    }

    async fn skip_question(&self, session_id: Uuid, question_id: Uuid) -> WorkflowResult<()> {
        let mut question = self.session_question(session_id, question_id).await?;
        match question.skip() {
            Ok(()) => self.save_question(&question).await,
            Err(QuestionTransitionError::AlreadyAnswered) => {
                tracing::debug!(%session_id, %question_id, "Skip ignored, question already answered");
                Ok(())
            }
            Err(QuestionTransitionError::EmptyAnswer) => Err(WorkflowError::MissingField("answer")),
        }
    }

    async fn save_question(&self, question: &Question) -> WorkflowResult<()> {
        self.store
            .update_question(question)
            .await
            .map_err(|e| WorkflowError::from_store("save question", e))
    }

    async fn after_question_closed(
        &self,
        op: Operation,
        session_id: Uuid,
    ) -> WorkflowResult<Option<IterationView>> {
        let iteration = lifecycle::current_iteration(self.store.as_ref(), session_id).await?;
        if iteration.is_none() && self.unanswered_questions(session_id).await?.is_empty() {
            self.commit(
                op,
                session_id,
                SessionPatch::status(SessionStatus::Validating),
            )
            .await?;
        }
        Ok(iteration)
    }

    /// Ask the reasoning service whether the answers are sufficient.
    ///
    /// Runs at most one follow-up round per session: returns the new round, or
    /// `None` once the session is ready for requirement generation.
    pub async fn validate_answers(&self, session_id: Uuid) -> WorkflowResult<Option<IterationView>> {
        let op = Operation::ValidateAnswers;
        let session = self.guarded(op, session_id).await?;
        let user_goal = Self::require_goal(&session)?;
        let project_context = Self::require_context(&session)?;

        if lifecycle::has_additional_round(self.store.as_ref(), session_id).await? {
            tracing::info!(%session_id, "Follow-up round already done, skipping validation");
            self.ready_for_requirements(op, session_id).await?;
            return Ok(None);
        }

        let request = AnswersRequest {
            answered_questions: lifecycle::collect_all_answers(self.store.as_ref(), session_id)
                .await?,
            user_goal,
            project_context,
            project_description: self.project_description(&session).await?,
        };
        let follow_ups = self.gateways.reasoning.validate_answers(&request).await?;
        self.apply_validation(op, session_id, follow_ups).await
    }

    /// Save a follow-up round, or move on to requirement generation
    pub(super) async fn apply_validation(
        &self,
        op: Operation,
        session_id: Uuid,
        follow_ups: Vec<GeneratedQuestion>,
    ) -> WorkflowResult<Option<IterationView>> {
        if follow_ups.is_empty() {
            self.ready_for_requirements(op, session_id).await?;
            return Ok(None);
        }

        // The store refuses a second round, so a concurrent validation that
        // lost fails here with nothing written.
        let block = QuestionBlock {
            title: ADDITIONAL_QUESTIONS_TITLE.to_string(),
            questions: follow_ups,
        };
        let view = self
            .commit_blocks(
                op,
                session_id,
                &[block],
                SessionPatch::status(SessionStatus::WaitingForAnswers),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WorkflowError::Internal("follow-up round was not saved".to_string()))?;
        tracing::info!(
            %session_id,
            questions = view.questions.len(),
            "Follow-up questions added"
        );
        Ok(Some(view))
    }

    async fn ready_for_requirements(&self, op: Operation, session_id: Uuid) -> WorkflowResult<()> {
        self.commit(
            op,
            session_id,
            SessionPatch::status(SessionStatus::GeneratingRequirements),
        )
        .await
        .map(|_| ())
    }

    /// Produce the requirements document from the interview answers
    pub async fn generate_summary(&self, session_id: Uuid) -> WorkflowResult<Session> {
        let session = self.guarded(Operation::GenerateSummary, session_id).await?;
        let request = AnswersRequest {
            answered_questions: lifecycle::collect_all_answers(self.store.as_ref(), session_id)
                .await?,
            user_goal: Self::require_goal(&session)?,
            project_context: Self::require_context(&session)?,
            project_description: self.project_description(&session).await?,
        };

        let summary = self.gateways.reasoning.generate_summary(&request).await?;
        self.finish(Operation::GenerateSummary, session_id, summary)
            .await
    }

    pub(super) async fn finish(
        &self,
        op: Operation,
        session_id: Uuid,
        summary: String,
    ) -> WorkflowResult<Session> {
        if summary.trim().is_empty() {
            return Err(GatewayError::empty("reasoning", "summary").into());
        }
        let session = self
            .commit(
                op,
                session_id,
                SessionPatch::status(SessionStatus::Done).with_result(summary),
            )
            .await?;
        tracing::info!(%session_id, "Requirements generated");
        Ok(session)
    }
}
