//! End-to-end runs of the session engine against in-memory gateways.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Barrier;
use uuid::Uuid;

use reqflow::config::WorkflowConfig;
use reqflow::domain::{
    IterationView, Session, SessionMode, SessionStatus, ADDITIONAL_QUESTIONS_TITLE,
};
use reqflow::error::WorkflowError;
use reqflow::gateways::mock::{block, questions, MockContext, MockReasoning, MockTranscription};
use reqflow::gateways::{
    AnswersRequest, DraftRequest, GatewayError, GenerateQuestionsRequest, GeneratedQuestion,
    QuestionBlock, ReasoningGateway,
};
use reqflow::store::{MemoryStore, Store};
use reqflow::workflow::{Gateways, Operation, SessionEngine};

struct Setup {
    engine: SessionEngine,
    store: Arc<MemoryStore>,
    reasoning: Arc<MockReasoning>,
}

fn setup(reasoning: MockReasoning) -> Setup {
    setup_gated(reasoning, None)
}

/// Like [`setup`], but the gated reasoning call waits until two callers are in it
fn setup_gated(reasoning: MockReasoning, gated: Option<Gated>) -> Setup {
    let store = Arc::new(MemoryStore::new());
    let reasoning = Arc::new(reasoning);
    let gateway: Arc<dyn ReasoningGateway> = match gated {
        Some(call) => Arc::new(BarrierReasoning {
            inner: reasoning.clone(),
            call,
            barrier: Barrier::new(2),
        }),
        None => reasoning.clone(),
    };
    let engine = SessionEngine::new(
        store.clone(),
        Gateways {
            reasoning: gateway,
            context: Arc::new(MockContext::default()),
            transcription: Arc::new(MockTranscription::default()),
        },
        WorkflowConfig::default(),
    );
    Setup {
        engine,
        store,
        reasoning,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Gated {
    Generation,
    Validation,
}

/// Holds concurrent callers of one reasoning call until both arrived, so both
/// pass the status check before either commits.
struct BarrierReasoning {
    inner: Arc<MockReasoning>,
    call: Gated,
    barrier: Barrier,
}

impl BarrierReasoning {
    async fn hold(&self, call: Gated) {
        if call == self.call {
            self.barrier.wait().await;
        }
    }
}

#[async_trait]
impl ReasoningGateway for BarrierReasoning {
    async fn generate_questions(
        &self,
        request: &GenerateQuestionsRequest,
    ) -> Result<Vec<QuestionBlock>, GatewayError> {
        self.hold(Gated::Generation).await;
        self.inner.generate_questions(request).await
    }

    async fn validate_answers(
        &self,
        request: &AnswersRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError> {
        self.hold(Gated::Validation).await;
        self.inner.validate_answers(request).await
    }

    async fn validate_draft(
        &self,
        request: &DraftRequest,
    ) -> Result<Vec<GeneratedQuestion>, GatewayError> {
        self.hold(Gated::Validation).await;
        self.inner.validate_draft(request).await
    }

    async fn generate_summary(&self, request: &AnswersRequest) -> Result<String, GatewayError> {
        self.inner.generate_summary(request).await
    }

    async fn generate_draft_summary(
        &self,
        request: &DraftRequest,
    ) -> Result<String, GatewayError> {
        self.inner.generate_draft_summary(request).await
    }
}

/// New session taken through goal and manual context to the chosen mode
async fn configured(engine: &SessionEngine, mode: SessionMode) -> Uuid {
    let session = engine.start_session().await.unwrap();
    engine.submit_goal(session.id, "build a CRM").await.unwrap();
    engine.start_manual_context(session.id).await.unwrap();
    let questions = engine.context_questions_prompt();
    engine
        .submit_context(session.id, &questions, "five sales reps, spreadsheets today")
        .await
        .unwrap();
    let session = engine.set_mode(session.id, mode).await.unwrap();
    session.id
}

/// Answer every question of `views` in order; returns what the last answer returned
async fn answer_all(
    engine: &SessionEngine,
    session_id: Uuid,
    views: &[IterationView],
) -> Option<IterationView> {
    let mut last = None;
    for view in views {
        for question in &view.questions {
            last = engine
                .submit_answer(session_id, question.id, &format!("answer to {}", question.question))
                .await
                .unwrap();
        }
    }
    last
}

async fn status(engine: &SessionEngine, session_id: Uuid) -> SessionStatus {
    engine.get_session(session_id).await.unwrap().status
}

#[tokio::test]
async fn interview_without_follow_up_reaches_done() {
    let s = setup(MockReasoning::new().with_blocks(vec![block("Users", 3), block("Data", 3)]));
    let id = configured(&s.engine, SessionMode::Interview).await;

    let views = s.engine.load_questions(id).await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(status(&s.engine, id).await, SessionStatus::WaitingForAnswers);

    assert_eq!(answer_all(&s.engine, id, &views).await, None);
    assert_eq!(status(&s.engine, id).await, SessionStatus::Validating);

    assert_eq!(s.engine.validate_answers(id).await.unwrap(), None);
    assert_eq!(
        status(&s.engine, id).await,
        SessionStatus::GeneratingRequirements
    );

    let session = s.engine.generate_summary(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Done);
    assert!(!session.result.unwrap_or_default().is_empty());
    assert!(!s.engine.get_result(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn interview_with_one_follow_up_round() {
    let s = setup(
        MockReasoning::new()
            .with_blocks(vec![block("Users", 3), block("Data", 3)])
            .with_validation_rounds(vec![questions("follow-up", 2), questions("again", 2)]),
    );
    let id = configured(&s.engine, SessionMode::Interview).await;
    let views = s.engine.load_questions(id).await.unwrap();
    answer_all(&s.engine, id, &views).await;

    let round = s.engine.validate_answers(id).await.unwrap().unwrap();
    assert_eq!(round.title, ADDITIONAL_QUESTIONS_TITLE);
    assert_eq!(round.questions.len(), 2);
    assert_eq!(status(&s.engine, id).await, SessionStatus::WaitingForAnswers);

    // Iteration numbers stay unique and increasing across rounds
    let numbers: Vec<u32> = views
        .iter()
        .chain(std::iter::once(&round))
        .map(|v| v.iteration_number)
        .collect();
    assert!(numbers.windows(2).all(|w| w[0] < w[1]), "{numbers:?}");

    answer_all(&s.engine, id, std::slice::from_ref(&round)).await;
    assert_eq!(status(&s.engine, id).await, SessionStatus::Validating);

    // The second validation short-circuits: no second round, no gateway call
    assert_eq!(s.engine.validate_answers(id).await.unwrap(), None);
    assert_eq!(s.reasoning.validation_calls(), 1);
    assert_eq!(
        status(&s.engine, id).await,
        SessionStatus::GeneratingRequirements
    );

    let session = s.engine.generate_summary(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Done);
}

#[tokio::test]
async fn draft_collection_is_capped_and_needs_messages() {
    let s = setup(MockReasoning::new());

    let empty = configured(&s.engine, SessionMode::Draft).await;
    s.engine.start_draft_collecting(empty).await.unwrap();
    assert_eq!(
        s.engine.validate_draft_messages(empty).await,
        Err(WorkflowError::NoDraftMessages)
    );
    assert_eq!(status(&s.engine, empty).await, SessionStatus::DraftCollecting);

    let id = configured(&s.engine, SessionMode::Draft).await;
    s.engine.start_draft_collecting(id).await.unwrap();
    for text in ["Track leads", "Import contacts from CSV", "Weekly pipeline report"] {
        s.engine.add_draft_message(id, text).await.unwrap();
    }
    assert_eq!(s.engine.draft_messages(id).await.unwrap().len(), 3);

    for i in 3..10 {
        s.engine
            .add_draft_message(id, &format!("detail {i}"))
            .await
            .unwrap();
    }
    assert_eq!(
        s.engine.add_draft_message(id, "eleventh").await,
        Err(WorkflowError::DraftLimitReached { max: 10 })
    );

    assert_eq!(s.engine.validate_draft_messages(id).await.unwrap(), None);
    let session = s.engine.generate_draft_summary(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Done);
}

#[tokio::test]
async fn racing_question_loads_leave_one_set_of_questions() {
    let s = setup_gated(MockReasoning::new(), Some(Gated::Generation));
    let id = configured(&s.engine, SessionMode::Interview).await;

    let (a, b) = tokio::join!(s.engine.load_questions(id), s.engine.load_questions(id));
    let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
    let views = winner.unwrap();
    assert!(
        matches!(
            loser,
            Err(WorkflowError::InvalidSessionState {
                status: SessionStatus::WaitingForAnswers,
                ..
            })
        ),
        "{loser:?}"
    );
    assert_eq!(s.reasoning.calls().len(), 2);

    let stored = s.store.list_iterations(id).await.unwrap();
    assert_eq!(stored.len(), views.len());
    assert_eq!(
        stored.iter().map(|it| it.id).collect::<Vec<_>>(),
        views.iter().map(|v| v.iteration_id).collect::<Vec<_>>()
    );
    assert_eq!(status(&s.engine, id).await, SessionStatus::WaitingForAnswers);
}

#[tokio::test]
async fn racing_validations_add_one_follow_up_round() {
    let s = setup_gated(
        MockReasoning::new()
            .with_blocks(vec![block("Users", 2)])
            .with_validation_rounds(vec![questions("follow-up", 2), questions("again", 2)]),
        Some(Gated::Validation),
    );
    let id = configured(&s.engine, SessionMode::Interview).await;
    let views = s.engine.load_questions(id).await.unwrap();
    answer_all(&s.engine, id, &views).await;
    assert_eq!(status(&s.engine, id).await, SessionStatus::Validating);

    let (a, b) = tokio::join!(s.engine.validate_answers(id), s.engine.validate_answers(id));
    let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
    let round = winner.unwrap().unwrap();
    assert!(
        matches!(loser, Err(WorkflowError::InvalidSessionState { .. })),
        "{loser:?}"
    );

    let rounds: Vec<_> = s
        .store
        .list_iterations(id)
        .await
        .unwrap()
        .into_iter()
        .filter(|it| it.title == ADDITIONAL_QUESTIONS_TITLE)
        .collect();
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0].id, round.iteration_id);
    assert_eq!(status(&s.engine, id).await, SessionStatus::WaitingForAnswers);
}

/// Run `op` with placeholder arguments
async fn run(engine: &SessionEngine, op: Operation, id: Uuid) -> Result<(), WorkflowError> {
    let question = Uuid::new_v4();
    match op {
        Operation::SubmitGoal => engine.submit_goal(id, "goal").await.map(drop),
        Operation::LinkProjectContext => engine
            .link_project_context(id, Uuid::new_v4())
            .await
            .map(drop),
        Operation::StartProjectCreation => engine.start_project_creation(id).await.map(drop),
        Operation::SubmitProjectName => engine.submit_project_name(id, "name").await.map(drop),
        Operation::SubmitProjectDescription => engine
            .submit_project_description(id, "name", "description")
            .await
            .map(drop),
        Operation::StartManualContext => engine.start_manual_context(id).await.map(drop),
        Operation::SubmitContext => engine.submit_context(id, "q", "a").await.map(drop),
        Operation::SetMode => engine
            .set_mode(id, SessionMode::Interview)
            .await
            .map(drop),
        Operation::RestartModeSelection => engine.restart_mode_selection(id).await.map(drop),
        Operation::RestartProjectSelection => {
            engine.restart_project_selection(id).await.map(drop)
        }
        Operation::StartDraftCollecting => engine.start_draft_collecting(id).await.map(drop),
        Operation::LoadQuestions => engine.load_questions(id).await.map(drop),
        Operation::SubmitAnswer => engine.submit_answer(id, question, "yes").await.map(drop),
        Operation::SkipAnswer => engine.skip_answer(id, question).await.map(drop),
        Operation::SkipReplayedQuestion => {
            engine.skip_replayed_question(id, question).await.map(drop)
        }
        Operation::ReopenForAnswers => engine.reopen_for_answers(id).await.map(drop),
        Operation::ValidateAnswers => engine.validate_answers(id).await.map(drop),
        Operation::ValidateDraftMessages => engine.validate_draft_messages(id).await.map(drop),
        Operation::GenerateSummary => engine.generate_summary(id).await.map(drop),
        Operation::GenerateDraftSummary => engine.generate_draft_summary(id).await.map(drop),
        Operation::AddDraftMessage => engine.add_draft_message(id, "text").await.map(drop),
        Operation::GetResult => engine.get_result(id).await.map(drop),
        Operation::CancelSession => engine.cancel_session(id).await.map(drop),
        Operation::FailSession => engine.fail_session(id, "reason").await.map(drop),
    }
}

#[tokio::test]
async fn every_operation_rejects_statuses_outside_its_table() {
    for op in Operation::ALL {
        for status in SessionStatus::ALL {
            if op.allows(status) {
                continue;
            }
            let s = setup(MockReasoning::new());
            let mut session = Session::new(status);
            session.user_goal = Some("build a CRM".into());
            session.project_context = Some("sales team".into());
            session.mode = Some(SessionMode::Interview);
            let session = s.store.create_session(session).await.unwrap();

            let result = run(&s.engine, op, session.id).await;
            assert!(
                matches!(result, Err(WorkflowError::InvalidSessionState { .. })),
                "{} in {status}: {result:?}",
                op.name()
            );
            let after = s.store.get_session(session.id).await.unwrap();
            assert_eq!(after.status, status, "{} changed {status}", op.name());
            assert!(s.reasoning.calls().is_empty(), "{} called out in {status}", op.name());
        }
    }
}
