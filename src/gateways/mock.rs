//! In-memory gateway implementations for tests and local runs.
//!
//! The mocks record every call so tests can assert on what the engine sent.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    AnswersRequest, ContextGateway, ContextRequest, DraftRequest, GatewayError,
    GenerateQuestionsRequest, GeneratedQuestion, QuestionBlock, ReasoningGateway,
    TranscriptionGateway,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `count` numbered questions
pub fn questions(prefix: &str, count: usize) -> Vec<GeneratedQuestion> {
    (1..=count)
        .map(|i| GeneratedQuestion {
            text: format!("{prefix} question {i}?"),
            explanation: format!("why {prefix} question {i} matters"),
        })
        .collect()
}

pub fn block(title: &str, count: usize) -> QuestionBlock {
    QuestionBlock {
        title: title.to_string(),
        questions: questions(title, count),
    }
}

/// A recorded reasoning call
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningCall {
    GenerateQuestions(GenerateQuestionsRequest),
    ValidateAnswers(AnswersRequest),
    ValidateDraft(DraftRequest),
    GenerateSummary(AnswersRequest),
    GenerateDraftSummary(DraftRequest),
}

/// Scripted reasoning service.
///
/// Validation rounds are consumed in order; once exhausted, validation
/// reports the answers as sufficient.
pub struct MockReasoning {
    blocks: Mutex<Vec<QuestionBlock>>,
    validation_rounds: Mutex<VecDeque<Vec<GeneratedQuestion>>>,
    summary: Mutex<String>,
    failure: Mutex<Option<GatewayError>>,
    calls: Mutex<Vec<ReasoningCall>>,
}

impl Default for MockReasoning {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReasoning {
    /// Two blocks of three questions, no follow-ups, a fixed summary
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(vec![block("Users", 3), block("Processes", 3)]),
            validation_rounds: Mutex::new(VecDeque::new()),
            summary: Mutex::new("## Requirements\n\n- Track customers".to_string()),
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_blocks(self, blocks: Vec<QuestionBlock>) -> Self {
        *lock(&self.blocks) = blocks;
        self
    }

    pub fn with_validation_rounds(self, rounds: Vec<Vec<GeneratedQuestion>>) -> Self {
        *lock(&self.validation_rounds) = rounds.into();
        self
    }

    pub fn with_summary(self, summary: impl Into<String>) -> Self {
        *lock(&self.summary) = summary.into();
        self
    }

    /// Make every following call fail with `error`
    pub fn fail_with(&self, error: GatewayError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    pub fn calls(&self) -> Vec<ReasoningCall> {
        lock(&self.calls).clone()
    }

    pub fn validation_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    ReasoningCall::ValidateAnswers(_) | ReasoningCall::ValidateDraft(_)
                )
            })
            .count()
    }

    fn record(&self, call: ReasoningCall) -> Result<(), GatewayError> {
        lock(&self.calls).push(call);
        match lock(&self.failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_round(&self) -> Vec<GeneratedQuestion> {
        lock(&self.validation_rounds).pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningGateway for MockReasoning {
    async fn generate_questions(
        &self,
        request: &GenerateQuestionsRequest,
    ) -> Result<Vec<QuestionBlock>, GatewayError> {
        self.record(ReasoningCall::GenerateQuestions(request.clone()))?;
        Ok(lock(&self.blocks).clone())
    }

    async fn validate_answers(
        &self,
        request: &AnswersRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError> {
        self.record(ReasoningCall::ValidateAnswers(request.clone()))?;
        Ok(self.next_round())
    }

    async fn validate_draft(
        &self,
        request: &DraftRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError> {
        self.record(ReasoningCall::ValidateDraft(request.clone()))?;
        Ok(self.next_round())
    }

    async fn generate_summary(&self, request: &AnswersRequest) -> Result<String, GatewayError> {
        self.record(ReasoningCall::GenerateSummary(request.clone()))?;
        Ok(lock(&self.summary).clone())
    }

    async fn generate_draft_summary(
        &self,
        request: &DraftRequest,
    ) -> Result<String, GatewayError> {
        self.record(ReasoningCall::GenerateDraftSummary(request.clone()))?;
        Ok(lock(&self.summary).clone())
    }
}

/// Context service returning a fixed text
pub struct MockContext {
    context: String,
    requests: Mutex<Vec<ContextRequest>>,
}

impl MockContext {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ContextRequest> {
        lock(&self.requests).clone()
    }
}

impl Default for MockContext {
    fn default() -> Self {
        Self::new("Existing CRM spreadsheets maintained by the sales team.")
    }
}

#[async_trait]
impl ContextGateway for MockContext {
    async fn get_context(&self, request: &ContextRequest) -> Result<String, GatewayError> {
        lock(&self.requests).push(request.clone());
        Ok(self.context.clone())
    }
}

/// Transcription service returning a fixed transcript
pub struct MockTranscription {
    transcript: String,
}

impl MockTranscription {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

impl Default for MockTranscription {
    fn default() -> Self {
        Self::new("transcribed speech")
    }
}

#[async_trait]
impl TranscriptionGateway for MockTranscription {
    async fn transcribe(&self, audio: &[u8], _filename: &str) -> Result<String, GatewayError> {
        if audio.is_empty() {
            return Err(GatewayError::invalid_input(
                "transcription",
                "empty audio data provided",
            ));
        }
        Ok(self.transcript.clone())
    }
}
