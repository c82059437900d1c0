//! Minimal project registry, so one-shot sessions can link a project.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use super::request_id;
use crate::notifications::{CallbackEvent, ProjectUpdate};
use crate::rest::dto::{CreateProjectRequest, ProjectResponse};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// List all projects, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/projects",
    tag = "Projects",
    responses(
        (status = 200, description = "Known projects", body = Vec<ProjectResponse>)
    )
)]
pub async fn list(State(state): State<ApiState>) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let projects = state.engine.list_projects().await?;
    Ok(Json(
        projects.into_iter().map(ProjectResponse::from).collect(),
    ))
}

/// Create a project
#[utoipa::path(
    post,
    path = "/api/v1/projects",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let project = state
        .engine
        .create_project(&request.title, &request.description)
        .await?;
    tracing::info!(project_id = %project.id, title = %project.title, "Project created");

    if let Some(url) = request.callback_url.as_deref() {
        state.notifier.notify(
            url,
            &request_id(&headers),
            CallbackEvent::ProjectUpdated(ProjectUpdate {
                id: project.id,
                title: project.title.clone(),
                description: project.description.clone(),
                files: project.files.clone(),
            }),
        );
    }

    Ok((StatusCode::CREATED, Json(ProjectResponse::from(project))))
}
