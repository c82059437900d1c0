//! HTTP front-end for one-shot interview sessions.
//!
//! Routes live under `/api/v1`. Answers are processed in the background and
//! their outcome is posted to the caller's callback URL.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::ApiState;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(routes::health::health))
        // Session endpoints
        .route("/api/v1/interview-session", post(routes::sessions::start))
        .route(
            "/api/v1/interview-session/:id",
            get(routes::sessions::get_one),
        )
        .route(
            "/api/v1/interview-session/:id/answer/:question_id",
            post(routes::sessions::submit_answer),
        )
        .route(
            "/api/v1/interview-session/:id/answer/:question_id/audio",
            post(routes::sessions::submit_audio_answer),
        )
        .route(
            "/api/v1/interview-session/:id/result",
            get(routes::sessions::get_result),
        )
        .route(
            "/api/v1/interview-session/:id/cancel",
            post(routes::sessions::cancel),
        )
        // Project endpoints
        .route(
            "/api/v1/projects",
            get(routes::projects::list).post(routes::projects::create),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(state: ApiState) -> Result<()> {
    let server = &state.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", server.host, server.port))?;
    let app = build_router(state);

    tracing::info!("REST API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
