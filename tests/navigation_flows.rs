//! Chat navigation driven end to end over in-memory gateways.

use std::collections::HashSet;
use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use reqflow::config::{NavigationConfig, WorkflowConfig};
use reqflow::domain::{Session, SessionMode, SessionStatus, ADDITIONAL_QUESTIONS_TITLE};
use reqflow::gateways::mock::{questions, MockContext, MockReasoning, MockTranscription};
use reqflow::gateways::GatewayError;
use reqflow::navigation::{
    ConversationState, JsonFileStateStore, MemoryStateStore, Navigator, Outcome, QuestionPrompt,
    StateStore, UserFacingError,
};
use reqflow::store::{MemoryStore, Store};
use reqflow::workflow::{Gateways, SessionEngine};

const USER: i64 = 42;

struct Setup {
    navigator: Navigator,
    store: Arc<MemoryStore>,
    reasoning: Arc<MockReasoning>,
}

fn engine(store: Arc<MemoryStore>, reasoning: Arc<MockReasoning>) -> SessionEngine {
    SessionEngine::new(
        store,
        Gateways {
            reasoning,
            context: Arc::new(MockContext::default()),
            transcription: Arc::new(MockTranscription::default()),
        },
        WorkflowConfig::default(),
    )
}

fn setup_with(reasoning: MockReasoning, states: Arc<dyn StateStore>) -> Setup {
    let store = Arc::new(MemoryStore::new());
    let reasoning = Arc::new(reasoning);
    let navigator = Navigator::new(
        engine(store.clone(), reasoning.clone()),
        states,
        NavigationConfig::default(),
    );
    Setup {
        navigator,
        store,
        reasoning,
    }
}

/// Session ready for questions, with the conversation pointing at it
async fn ready_to_interview(s: &Setup, states: &dyn StateStore) -> Uuid {
    let mut session = Session::new(SessionStatus::InterviewInfo);
    session.user_goal = Some("build a CRM".into());
    session.project_context = Some("sales team of five".into());
    session.mode = Some(SessionMode::Interview);
    let session = s.store.create_session(session).await.unwrap();
    states
        .save(USER, &ConversationState::for_session(session.id))
        .await
        .unwrap();
    session.id
}

fn prompt(outcome: Outcome) -> QuestionPrompt {
    match outcome {
        Outcome::Advance(prompt) => prompt,
        other => panic!("expected a question, got {other:?}"),
    }
}

#[tokio::test]
async fn replay_visits_each_skipped_question_once_then_validates() {
    let states = Arc::new(MemoryStateStore::new());
    let s = setup_with(MockReasoning::new(), states.clone());
    let session_id = ready_to_interview(&s, states.as_ref()).await;
    let nav = &s.navigator;

    // Six questions: answer, skip, skip, answer, answer, answer
    let mut skipped = HashSet::new();
    let mut current = prompt(nav.start_interview(USER).await);
    let mut outcome = None;
    for step in 0..6 {
        let next = if step == 1 || step == 2 {
            skipped.insert(current.question.id);
            nav.skip(USER).await
        } else {
            nav.answer(USER, "an answer").await
        };
        match next {
            Outcome::Advance(p) => current = p,
            other => outcome = Some(other),
        }
    }
    assert_eq!(
        outcome,
        Some(Outcome::Done {
            result: "## Requirements\n\n- Track customers".to_string(),
            has_skipped: true,
        })
    );
    assert_eq!(s.reasoning.validation_calls(), 1);

    // Replay reopens the finished session and walks the skipped questions
    let first = prompt(nav.answer_skipped(USER).await);
    assert_eq!(
        s.store.get_session(session_id).await.unwrap().status,
        SessionStatus::WaitingForAnswers
    );
    let mut seen = vec![first.question.id];
    assert_eq!(first.replay.map(|r| (r.number, r.total)), Some((1, 2)));

    let second = prompt(nav.answer(USER, "late answer").await);
    assert_eq!(second.replay.map(|r| (r.number, r.total)), Some((2, 2)));
    seen.push(second.question.id);

    let done = nav.answer(USER, "another late answer").await;
    assert!(
        matches!(done, Outcome::Done { has_skipped: false, .. }),
        "{done:?}"
    );
    assert_eq!(seen.iter().copied().collect::<HashSet<_>>(), skipped);
    assert_eq!(seen.len(), 2);
    assert_eq!(s.reasoning.validation_calls(), 2);
}

#[tokio::test]
async fn back_during_replay_steps_the_counter_back() {
    let states = Arc::new(MemoryStateStore::new());
    let s = setup_with(MockReasoning::new(), states.clone());
    ready_to_interview(&s, states.as_ref()).await;
    let nav = &s.navigator;

    // Six questions: answer, skip, skip, skip, answer, answer
    let mut skipped = Vec::new();
    let mut current = prompt(nav.start_interview(USER).await);
    for step in 0..6 {
        let next = if (1..=3).contains(&step) {
            skipped.push(current.question.id);
            nav.skip(USER).await
        } else {
            nav.answer(USER, "an answer").await
        };
        match next {
            Outcome::Advance(p) => current = p,
            other => assert!(
                matches!(other, Outcome::Done { has_skipped: true, .. }),
                "{other:?}"
            ),
        }
    }

    let first = prompt(nav.answer_skipped(USER).await);
    assert_eq!(first.question.id, skipped[0]);
    assert_eq!(first.replay.map(|r| (r.number, r.total)), Some((1, 3)));

    let second = prompt(nav.answer(USER, "first late answer").await);
    assert_eq!(second.question.id, skipped[1]);
    assert_eq!(second.replay.map(|r| r.number), Some(2));

    // Back shows the earlier answer one step down the counter
    let back = prompt(nav.back(USER).await);
    assert_eq!(back.question.id, skipped[0]);
    assert_eq!(back.answer.as_deref(), Some("first late answer"));
    assert_eq!(back.replay.map(|r| (r.number, r.total)), Some((1, 3)));

    // Re-answering resumes where the replay was left
    let mut visited = vec![skipped[0]];
    let resumed = prompt(nav.answer(USER, "revised late answer").await);
    assert_eq!(resumed.question.id, skipped[1]);
    assert_eq!(resumed.replay.map(|r| r.number), Some(2));
    visited.push(resumed.question.id);

    let third = prompt(nav.answer(USER, "second late answer").await);
    assert_eq!(third.replay.map(|r| r.number), Some(3));
    visited.push(third.question.id);

    let done = nav.answer(USER, "third late answer").await;
    assert!(
        matches!(done, Outcome::Done { has_skipped: false, .. }),
        "{done:?}"
    );
    assert_eq!(visited, skipped);

    let revised = s.navigator.engine().get_question(skipped[0]).await.unwrap();
    assert_eq!(revised.answer.as_deref(), Some("revised late answer"));
}

#[tokio::test]
async fn empty_replay_validates_immediately() {
    let states = Arc::new(MemoryStateStore::new());
    let s = setup_with(MockReasoning::new(), states.clone());
    let session_id = ready_to_interview(&s, states.as_ref()).await;
    let nav = &s.navigator;

    prompt(nav.start_interview(USER).await);
    for _ in 0..5 {
        prompt(nav.answer(USER, "an answer").await);
    }

    // The last answer reaches validation, which times out
    s.reasoning.fail_with(GatewayError::timeout("reasoning"));
    assert_eq!(
        nav.answer(USER, "last answer").await,
        Outcome::Failed(UserFacingError::Timeout)
    );
    assert_eq!(
        s.store.get_session(session_id).await.unwrap().status,
        SessionStatus::Validating
    );

    // Nothing left open: asking for skipped questions validates right away
    s.reasoning.recover();
    let outcome = nav.answer_skipped(USER).await;
    assert!(
        matches!(outcome, Outcome::Done { has_skipped: false, .. }),
        "{outcome:?}"
    );
    assert_eq!(
        s.store.get_session(session_id).await.unwrap().status,
        SessionStatus::Done
    );
}

#[tokio::test]
async fn follow_up_round_is_asked_once() {
    let states = Arc::new(MemoryStateStore::new());
    let s = setup_with(
        MockReasoning::new().with_validation_rounds(vec![
            questions("follow-up", 2),
            questions("never asked", 2),
        ]),
        states.clone(),
    );
    ready_to_interview(&s, states.as_ref()).await;
    let nav = &s.navigator;

    prompt(nav.start_interview(USER).await);
    for _ in 0..5 {
        prompt(nav.answer(USER, "an answer").await);
    }
    let round = match nav.answer(USER, "last answer").await {
        Outcome::NeedsMoreInfo(round) => round,
        other => panic!("expected follow-up questions, got {other:?}"),
    };
    assert_eq!(round.title, ADDITIONAL_QUESTIONS_TITLE);

    let state = nav.state(USER).await.unwrap().unwrap();
    assert_eq!(state.current_question_id, Some(round.questions[0].id));

    let second = prompt(nav.answer(USER, "follow-up answer").await);
    assert_eq!(second.question.id, round.questions[1].id);
    let done = nav.answer(USER, "second follow-up answer").await;
    assert!(matches!(done, Outcome::Done { .. }), "{done:?}");
    assert_eq!(s.reasoning.validation_calls(), 1);
}

#[tokio::test]
async fn back_shows_previous_answer_then_forward_resumes() {
    let states = Arc::new(MemoryStateStore::new());
    let s = setup_with(MockReasoning::new(), states.clone());
    ready_to_interview(&s, states.as_ref()).await;
    let nav = &s.navigator;

    let first = prompt(nav.start_interview(USER).await);
    assert!(!first.can_go_back);
    let second = prompt(nav.answer(USER, "sales reps").await);
    assert!(second.can_go_back);

    let back = prompt(nav.back(USER).await);
    assert_eq!(back.question.id, first.question.id);
    assert_eq!(back.answer.as_deref(), Some("sales reps"));
    assert_eq!(
        nav.back(USER).await,
        Outcome::Failed(UserFacingError::NothingToGoBackTo)
    );

    let forward = prompt(nav.answer(USER, "sales reps and managers").await);
    assert_eq!(forward.question.id, second.question.id);
}

#[tokio::test]
async fn older_file_state_is_migrated_and_usable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversations.json");

    let states = Arc::new(JsonFileStateStore::open(&path).unwrap());
    let s = setup_with(MockReasoning::new(), states.clone());
    let session_id = ready_to_interview(&s, states.as_ref()).await;
    let first = prompt(s.navigator.start_interview(USER).await);

    // Rewrite the file the way the previous release stored it
    let legacy = serde_json::json!({
        USER.to_string(): {
            "version": 1,
            "session_id": session_id.to_string(),
            "current_question_index": 0,
            "current_question_id": first.question.id.to_string(),
            "previous_question_id": "",
            "project_id": "",
            "pending_confirmation": "",
            "is_processing": false,
            "processing_started": "0001-01-01T00:00:00Z",
            "last_message_id": 0
        }
    });
    std::fs::write(&path, serde_json::to_string_pretty(&legacy).unwrap()).unwrap();

    let reopened: Arc<dyn StateStore> = Arc::new(JsonFileStateStore::open(&path).unwrap());
    let state = reopened.load(USER).await.unwrap().unwrap();
    assert_eq!(state.version, reqflow::navigation::CURRENT_VERSION);
    assert_eq!(state.previous_question_id, None);
    assert_eq!(state.processing_started, None);

    let nav = Navigator::new(
        s.navigator.engine().clone(),
        reopened.clone(),
        NavigationConfig::default(),
    );
    let second = prompt(nav.answer(USER, "sales reps").await);
    assert_ne!(second.question.id, first.question.id);

    // Saved back in the current format
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(!contents.contains("current_question_index"));
}
