//! HTTP surface: one-shot start, answering by callback, and result download.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use reqflow::config::{Config, WorkflowConfig};
use reqflow::domain::{QuestionStatus, SessionStatus, SessionView};
use reqflow::gateways::mock::{block, questions, MockContext, MockReasoning, MockTranscription};
use reqflow::notifications::{CallbackEvent, NotificationService, RecordingSink};
use reqflow::rest::{build_router, ApiState};
use reqflow::store::MemoryStore;
use reqflow::workflow::{Gateways, SessionEngine};

const CALLBACK: &str = "http://client.test/hook";

fn app(reasoning: MockReasoning) -> (Router, Arc<RecordingSink>) {
    let engine = SessionEngine::new(
        Arc::new(MemoryStore::new()),
        Gateways {
            reasoning: Arc::new(reasoning),
            context: Arc::new(MockContext::default()),
            transcription: Arc::new(MockTranscription::new("spoken answer")),
        },
        WorkflowConfig::default(),
    );
    let sink = Arc::new(RecordingSink::new());
    let state = ApiState::new(
        engine,
        NotificationService::with_sink(sink.clone()),
        Config::default(),
    );
    (build_router(state), sink)
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

/// Wait for the `n`-th callback and return it
async fn callback(sink: &RecordingSink, n: usize) -> CallbackEvent {
    let deliveries = sink.wait_for(n, Duration::from_secs(5)).await;
    assert!(deliveries.len() >= n, "callback {n} never arrived");
    assert_eq!(deliveries[n - 1].url, CALLBACK);
    deliveries[n - 1].event.clone()
}

#[tokio::test]
async fn one_shot_interview_runs_to_final_result() {
    let (router, sink) = app(
        MockReasoning::new()
            .with_blocks(vec![block("Users", 2), block("Data", 1)])
            .with_validation_rounds(vec![questions("follow-up", 1)])
            .with_summary("## Requirements\n\n- Export invoices"),
    );

    let (status, _) = send(
        &router,
        post_json(
            "/api/v1/interview-session",
            &serde_json::json!({
                "user_goal": "Automate invoicing",
                "context_questions": [
                    { "question": "Who sends invoices?", "answer": "Accounting" }
                ],
                "callback_url": CALLBACK
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut event = callback(&sink, 1).await;
    let mut session_id = None;
    let mut answered = 0;
    let mut audio_sent = false;
    for n in 2..=20 {
        let view = match event {
            CallbackEvent::Questions(view) => view,
            CallbackEvent::FinalResult(_) => break,
            other => panic!("unexpected callback {other:?}"),
        };
        session_id = Some(view.session_id);
        let question = view
            .questions
            .iter()
            .find(|q| q.status == QuestionStatus::Unanswered)
            .expect("questions event without an open question");

        let uri = format!(
            "/api/v1/interview-session/{}/answer/{}",
            view.session_id, question.id
        );
        let (status, _) = if audio_sent {
            send(
                &router,
                post_json(
                    &uri,
                    &serde_json::json!({ "answers": "typed answer", "callback_url": CALLBACK }),
                ),
            )
            .await
        } else {
            audio_sent = true;
            send(
                &router,
                Request::builder()
                    .method("POST")
                    .uri(format!("{uri}/audio?callback_url={CALLBACK}"))
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(Body::from(vec![1u8, 2, 3, 4]))
                    .unwrap(),
            )
            .await
        };
        assert_eq!(status, StatusCode::ACCEPTED);
        answered += 1;
        event = callback(&sink, n).await;
    }

    // Two + one generated questions, one follow-up
    assert_eq!(answered, 4);
    let last = sink.deliveries().pop().unwrap();
    let CallbackEvent::FinalResult(view) = last.event else {
        panic!("expected the final result, got {:?}", last.event);
    };
    assert_eq!(view.session_status, SessionStatus::Done);
    let session_id = session_id.unwrap();
    assert_eq!(view.session_id, session_id);

    let (status, body) = send(
        &router,
        Request::builder()
            .uri(format!("/api/v1/interview-session/{session_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session: SessionView = serde_json::from_slice(&body).unwrap();
    assert_eq!(session.final_result.as_deref(), Some("## Requirements\n\n- Export invoices"));

    let (status, body) = send(
        &router,
        Request::builder()
            .uri(format!(
                "/api/v1/interview-session/{session_id}/result?format=markdown"
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let document = String::from_utf8(body).unwrap();
    assert!(document.starts_with("# Business requirements"), "{document}");
    assert!(document.contains("Export invoices"));
}

#[tokio::test]
async fn unsupported_result_format_is_rejected() {
    let (router, _) = app(MockReasoning::new());
    let (status, _) = send(
        &router,
        Request::builder()
            .uri(format!(
                "/api/v1/interview-session/{}/result?format=pdf",
                uuid::Uuid::new_v4()
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn start_requires_exactly_one_context_source() {
    let (router, sink) = app(MockReasoning::new());
    let (status, body) = send(
        &router,
        post_json(
            "/api/v1/interview-session",
            &serde_json::json!({ "user_goal": "CRM", "callback_url": CALLBACK }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "validation_error");
    assert!(sink.deliveries().is_empty());
}

#[tokio::test]
async fn skipped_answer_still_needs_callback_url() {
    let (router, _) = app(MockReasoning::new());
    let (status, _) = send(
        &router,
        post_json(
            &format!(
                "/api/v1/interview-session/{}/answer/{}",
                uuid::Uuid::new_v4(),
                uuid::Uuid::new_v4()
            ),
            &serde_json::json!({ "is_skipped": true, "callback_url": "" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
