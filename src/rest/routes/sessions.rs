//! Interview session endpoints.
//!
//! Mutating calls validate the request, answer `202 Accepted`, and finish the
//! workflow in a background task that reports to the request's callback URL.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::request_id;
use crate::domain::{IterationView, SessionView};
use crate::error::WorkflowError;
use crate::notifications::CallbackEvent;
use crate::rest::dto::{AcceptedResponse, AudioAnswerQuery, ResultQuery, SubmitAnswerRequest};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::workflow::{format_result, ResultFormat, StartSessionRequest};

/// Start an interview session in one call
#[utoipa::path(
    post,
    path = "/api/v1/interview-session",
    tag = "Sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 202, description = "Session creation accepted; questions arrive by callback", body = AcceptedResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn start(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    request.validate()?;
    let request_id = request_id(&headers);
    tracing::info!(request_id = %request_id, "Starting interview session");

    tokio::spawn(async move {
        let event = match state.engine.start_http_session(&request).await {
            Ok(iteration) => {
                tracing::info!(session_id = %iteration.session_id, "Session started");
                CallbackEvent::Questions(iteration)
            }
            Err(e) => failure("failed to start session", &e, []),
        };
        state
            .notifier
            .deliver(&request.callback_url, &request_id, event)
            .await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse::new("session creation is being processed")),
    ))
}

/// Get a session's status
#[utoipa::path(
    get,
    path = "/api/v1/interview-session/{id}",
    tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session", body = SessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.engine.get_session(id).await?;
    Ok(Json(SessionView::from(&session)))
}

/// Answer or skip a question
#[utoipa::path(
    post,
    path = "/api/v1/interview-session/{id}/answer/{question_id}",
    tag = "Sessions",
    params(
        ("id" = Uuid, Path, description = "Session id"),
        ("question_id" = Uuid, Path, description = "Question id")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 202, description = "Answer accepted; next step arrives by callback", body = AcceptedResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn submit_answer(
    State(state): State<ApiState>,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(request): Json<SubmitAnswerRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    request.validate()?;
    let input = if request.is_skipped {
        Answer::Skip
    } else {
        Answer::Text(request.answers)
    };
    spawn_answer(state, id, question_id, input, request.callback_url, &headers);
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse::new("answer is being processed")),
    ))
}

/// Answer a question with recorded audio (raw request body)
#[utoipa::path(
    post,
    path = "/api/v1/interview-session/{id}/answer/{question_id}/audio",
    tag = "Sessions",
    params(
        ("id" = Uuid, Path, description = "Session id"),
        ("question_id" = Uuid, Path, description = "Question id"),
        AudioAnswerQuery
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 202, description = "Audio accepted; next step arrives by callback", body = AcceptedResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn submit_audio_answer(
    State(state): State<ApiState>,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<AudioAnswerQuery>,
    headers: HeaderMap,
    audio: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    query.validate(&audio)?;
    let input = if query.is_skipped {
        Answer::Skip
    } else {
        Answer::Audio(audio)
    };
    spawn_answer(state, id, question_id, input, query.callback_url, &headers);
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse::new("audio answer is being processed")),
    ))
}

/// Download the requirements document
#[utoipa::path(
    get,
    path = "/api/v1/interview-session/{id}/result",
    tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session id"), ResultQuery),
    responses(
        (status = 200, description = "Requirements document", body = String),
        (status = 400, description = "Unsupported format", body = ErrorResponse),
        (status = 404, description = "No result yet", body = ErrorResponse),
        (status = 409, description = "Session not finished", body = ErrorResponse)
    )
)]
pub async fn get_result(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ResultQuery>,
) -> Result<Response, ApiError> {
    let format: ResultFormat = query.format.as_deref().unwrap_or_default().parse()?;
    let result = state.engine.get_result(id).await?;
    let document = format_result(&id.to_string(), &result, format)?;

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.file_name),
            ),
        ],
        document.body,
    )
        .into_response())
}

/// Cancel a session
#[utoipa::path(
    post,
    path = "/api/v1/interview-session/{id}/cancel",
    tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session canceled", body = SessionView),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session already finished", body = ErrorResponse)
    )
)]
pub async fn cancel(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.engine.cancel_session(id).await?;
    Ok(Json(SessionView::from(&session)))
}

enum Answer {
    Text(String),
    Audio(Bytes),
    Skip,
}

fn spawn_answer(
    state: ApiState,
    session_id: Uuid,
    question_id: Uuid,
    input: Answer,
    callback_url: String,
    headers: &HeaderMap,
) {
    let request_id = request_id(headers);
    tracing::info!(
        %session_id,
        %question_id,
        request_id = %request_id,
        skipped = matches!(input, Answer::Skip),
        "Answer accepted"
    );

    tokio::spawn(async move {
        let event = answer_flow(&state, session_id, question_id, input).await;
        state
            .notifier
            .deliver(&callback_url, &request_id, event)
            .await;
    });
}

/// Record the answer, then move the session as far as it can go
async fn answer_flow(
    state: &ApiState,
    session_id: Uuid,
    question_id: Uuid,
    input: Answer,
) -> CallbackEvent {
    let engine = &state.engine;
    let ids = [
        ("session_id", session_id.to_string()),
        ("question_id", question_id.to_string()),
    ];

    let next = match input {
        Answer::Text(text) => engine.submit_answer(session_id, question_id, &text).await,
        Answer::Audio(audio) => {
            engine
                .submit_audio_answer(session_id, question_id, &audio)
                .await
        }
        Answer::Skip => engine.skip_answer(session_id, question_id).await,
    };
    match next {
        Ok(Some(iteration)) => return questions(iteration),
        Ok(None) => {}
        Err(e) => return failure("failed to submit answer", &e, ids),
    }

    let ids = [("session_id", session_id.to_string())];
    match engine.validate_answers(session_id).await {
        Ok(Some(round)) => return questions(round),
        Ok(None) => {}
        Err(e) => return failure("failed to validate answers", &e, ids),
    }

    match engine.generate_summary(session_id).await {
        Ok(session) => {
            tracing::info!(%session_id, "Requirements ready");
            CallbackEvent::FinalResult(SessionView::from(&session))
        }
        Err(e) => failure("failed to generate summary", &e, ids),
    }
}

fn questions(iteration: IterationView) -> CallbackEvent {
    CallbackEvent::Questions(iteration)
}

fn failure<const N: usize>(
    message: &str,
    err: &WorkflowError,
    ids: [(&'static str, String); N],
) -> CallbackEvent {
    tracing::warn!(error = %err, "{message}");
    CallbackEvent::error(
        message,
        ids.into_iter()
            .chain(std::iter::once(("error", err.to_string()))),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::{SessionMode, SessionStatus};
    use crate::rest::build_router;
    use crate::rest::state::test_support::*;
    use crate::workflow::test_support::session_in;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-request-id", "req-42")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_start_rejects_missing_callback() {
        let api = test_api();
        let response = build_router(api.state)
            .oneshot(post_json(
                "/api/v1/interview-session",
                serde_json::json!({ "user_goal": "CRM", "callback_url": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_accepts_and_calls_back_with_questions() {
        let api = test_api();
        let response = build_router(api.state)
            .oneshot(post_json(
                "/api/v1/interview-session",
                serde_json::json!({
                    "user_goal": "Automate invoicing",
                    "context_questions": [{ "question": "Who pays?", "answer": "Clients" }],
                    "callback_url": "http://client/hook"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let deliveries = api.sink.wait_for(1, Duration::from_secs(2)).await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].request_id, "req-42");
        assert!(matches!(deliveries[0].event, CallbackEvent::Questions(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_session_is_404() {
        let api = test_api();
        let response = build_router(api.state)
            .oneshot(get(&format!("/api/v1/interview-session/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_result_before_done_is_conflict() {
        let api = test_api();
        let session = session_in(
            &api.harness.store,
            SessionStatus::WaitingForAnswers,
            SessionMode::Interview,
        )
        .await;
        let response = build_router(api.state)
            .oneshot(get(&format!(
                "/api/v1/interview-session/{}/result",
                session.id
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_returns_session() {
        let api = test_api();
        let session = session_in(
            &api.harness.store,
            SessionStatus::WaitingForAnswers,
            SessionMode::Interview,
        )
        .await;
        let response = build_router(api.state)
            .oneshot(post_json(
                &format!("/api/v1/interview-session/{}/cancel", session.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let view: SessionView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.session_status, SessionStatus::Canceled);
    }

    #[tokio::test]
    async fn test_failed_answer_reports_error_event() {
        let api = test_api();
        let session = session_in(
            &api.harness.store,
            SessionStatus::WaitingForAnswers,
            SessionMode::Interview,
        )
        .await;
        let response = build_router(api.state)
            .oneshot(post_json(
                &format!(
                    "/api/v1/interview-session/{}/answer/{}",
                    session.id,
                    Uuid::new_v4()
                ),
                serde_json::json!({ "answers": "yes", "callback_url": "http://client/hook" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let deliveries = api.sink.wait_for(1, Duration::from_secs(2)).await;
        match &deliveries[0].event {
            CallbackEvent::Error { error } => {
                assert_eq!(error.message, "failed to submit answer");
                assert_eq!(error.details["session_id"], session.id.to_string());
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }
}
