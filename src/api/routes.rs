//! API Routes
//!
//! HTTP endpoint definitions. Every handler runs its pipeline stages in the
//! order listed in its doc comment, then calls exactly one gateway.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, ErrorEnvelope};

use super::pipeline::{self, proceed, ClientAddr};
use super::AppState;

/// Content collections in the document store
pub mod collections {
    pub const INFORMATION: &str = "information";
    pub const EXPERIENCES: &str = "experiences";
    pub const REVIEWS: &str = "reviews";
    pub const SKILLS: &str = "skills";
    pub const PORTFOLIOS: &str = "portfolios";
    pub const SERVICES: &str = "services";
}

const CONTACT_SENT_MESSAGE: &str = "Your message has been sent successfully.";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Success response body
#[derive(Debug, Serialize)]
pub struct SuccessEnvelope {
    pub success: bool,
    pub message: String,
}

impl SuccessEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router, mounted under `/api`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/contact", post(submit_contact))
        .route("/information", get(get_information))
        .route("/experience", get(get_experiences))
        .route("/reviews", get(get_reviews))
        .route("/skills", get(get_skills))
        .route("/portfolios", get(get_portfolios))
        .route("/services", get(get_services))
}

// =========================================================================
// GET /api/health
// =========================================================================

/// Liveness only; never touches a gateway
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

// =========================================================================
// POST /api/contact
// =========================================================================

/// Stages: throttle, parse body, validate. Then one mail send.
async fn submit_contact(
    State(state): State<AppState>,
    client: ClientAddr,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let quota = proceed!(pipeline::throttle(&state.limiter, &client));
    let body = proceed!(pipeline::parse_body(body));
    let submission = proceed!(pipeline::validate_contact(&body));

    let message_id = state.mailer.send(&submission).await?;
    tracing::info!(message_id = %message_id, client = %client.0, "Contact submission delivered");

    let mut response = Json(SuccessEnvelope::new(CONTACT_SENT_MESSAGE)).into_response();
    quota.apply(response.headers_mut());
    Ok(response)
}

// =========================================================================
// GET /api/information
// =========================================================================

/// Stages: authorize. Then the first `information` document, verbatim.
async fn get_information(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    proceed!(pipeline::authorize(
        &headers,
        state.settings.api_secret_key.as_deref()
    ));

    let document = state.content.find_one(collections::INFORMATION).await?;
    Ok(Json(document).into_response())
}

// =========================================================================
// Public content
// =========================================================================

async fn list_collection(state: &AppState, collection: &str) -> Result<Json<Vec<Value>>, AppError> {
    let documents = state.content.find_all(collection).await?;
    tracing::debug!(collection = collection, count = documents.len(), "Served content");
    Ok(Json(documents))
}

async fn get_experiences(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    list_collection(&state, collections::EXPERIENCES).await
}

async fn get_reviews(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    list_collection(&state, collections::REVIEWS).await
}

async fn get_skills(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    list_collection(&state, collections::SKILLS).await
}

async fn get_portfolios(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    list_collection(&state, collections::PORTFOLIOS).await
}

async fn get_services(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    list_collection(&state, collections::SERVICES).await
}

/// Fallback for unknown paths
pub async fn not_found() -> Response {
    ErrorEnvelope::new("Not found").into_response_with(StatusCode::NOT_FOUND)
}
