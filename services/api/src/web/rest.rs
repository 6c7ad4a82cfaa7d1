//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ApiError, ErrorBody};
use crate::web::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
};
use physio_coach_core::AnnotatedPlan;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use utoipa::{OpenApi, ToSchema};

/// Used when a treatment request does not carry a questionnaire.
pub const DEFAULT_QUESTIONNAIRE: &str = "The patient reports a stiff, mildly painful neck after long \
hours working at a desk. There is no numbness, no recent injury and no dizziness.";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        root_handler,
        treatment_handler,
        treatment_preflight,
    ),
    components(
        schemas(TreatmentRequest, StatusResponse, ErrorBody)
    ),
    tags(
        (name = "Physio Coach API", description = "Exercise plan generation with narrated audio.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The request payload of `POST /treatment`.
#[derive(Deserialize, Default, ToSchema)]
pub struct TreatmentRequest {
    /// Free-text answers of the patient questionnaire.
    #[serde(default)]
    pub questionnaire: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "The service is up", body = StatusResponse)
    )
)]
pub async fn root_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "success".to_string(),
        message: "Hello there!".to_string(),
    })
}

/// Generate a narrated exercise plan for a patient questionnaire.
///
/// The response is the plan with a base64 encoded MP3 `<field>_audio` sibling
/// next to every narrated text field.
#[utoipa::path(
    post,
    path = "/treatment",
    request_body = TreatmentRequest,
    responses(
        (status = 200, description = "Narrated exercise plan", content_type = "application/json"),
        (status = 400, description = "The request body is not valid JSON", body = ErrorBody),
        (status = 502, description = "Plan generation or narration failed", body = ErrorBody),
        (status = 504, description = "A remote service timed out", body = ErrorBody)
    )
)]
pub async fn treatment_handler(
    State(app_state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnnotatedPlan>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        TreatmentRequest::default()
    } else {
        serde_json::from_slice::<TreatmentRequest>(&body)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let questionnaire = request
        .questionnaire
        .unwrap_or_else(|| DEFAULT_QUESTIONNAIRE.to_string());

    let start_time = Instant::now();
    info!(questionnaire_len = questionnaire.len(), "Treatment plan requested.");

    let plan = app_state.plan_generator.generate_plan(&questionnaire).await?;
    let annotated = app_state.narrator.narrate(&plan).await?;

    info!(
        exercise = %plan.exercise,
        steps = plan.steps.len(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Treatment plan ready."
    );
    Ok(Json(annotated))
}

/// Cross-origin preflight for `/treatment`.
#[utoipa::path(
    options,
    path = "/treatment",
    responses(
        (status = 204, description = "Preflight accepted")
    )
)]
pub async fn treatment_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
