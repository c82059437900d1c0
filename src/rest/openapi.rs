//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::domain::{IterationView, QuestionStatus, QuestionView, SessionStatus, SessionView};
use crate::notifications::{CallbackErrorDetails, ProjectUpdate};
use crate::rest::dto::{
    AcceptedResponse, CreateProjectRequest, HealthResponse, ProjectResponse, SubmitAnswerRequest,
};
use crate::rest::error::ErrorResponse;
use crate::workflow::{ContextAnswer, StartSessionRequest};

/// OpenAPI documentation for the reqflow REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "reqflow API",
        description = "Guided requirements interviews with asynchronous callbacks.",
        license(name = "MIT")
    ),
    paths(
        crate::rest::routes::health::health,
        crate::rest::routes::sessions::start,
        crate::rest::routes::sessions::get_one,
        crate::rest::routes::sessions::submit_answer,
        crate::rest::routes::sessions::submit_audio_answer,
        crate::rest::routes::sessions::get_result,
        crate::rest::routes::sessions::cancel,
        crate::rest::routes::projects::list,
        crate::rest::routes::projects::create,
    ),
    components(
        schemas(
            // Response types
            HealthResponse,
            AcceptedResponse,
            SessionView,
            SessionStatus,
            IterationView,
            QuestionView,
            QuestionStatus,
            ProjectResponse,
            ErrorResponse,
            // Callback payloads
            ProjectUpdate,
            CallbackErrorDetails,
            // Request types
            StartSessionRequest,
            ContextAnswer,
            SubmitAnswerRequest,
            CreateProjectRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Sessions", description = "Interview sessions driven over HTTP"),
        (name = "Projects", description = "Projects sessions can link to"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
