//! Request Pipeline
//!
//! Named stages a handler runs in order before touching a gateway. Each
//! stage either hands a value to the next one or halts the request with a
//! locally rendered rejection.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::ContactSubmission;
use crate::error::ErrorEnvelope;
use crate::rate_limit::{Admission, FixedWindowLimiter, Quota};

use super::validation::{validate, ValidationErrorDetail, CONTACT_RULES};
use super::AppState;

/// Header carrying the shared secret for protected content
pub const API_KEY_HEADER: &str = "x-api-key";

const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";
const UNAUTHORIZED_MESSAGE: &str = "Forbidden: Client is not authorized.";
const VALIDATION_MESSAGE: &str = "Validation failed";
const ORIGIN_REJECTED_MESSAGE: &str = "CORS error: Not allowed";

/// Result of one pipeline stage
#[derive(Debug)]
pub enum Stage<T> {
    Continue(T),
    Halt(Rejection),
}

/// Requests turned away before reaching a gateway
#[derive(Debug)]
pub enum Rejection {
    RateLimited(Quota),
    Unauthorized,
    OriginNotAllowed,
    Invalid(Vec<ValidationErrorDetail>),
    MalformedBody { status: StatusCode, message: String },
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::RateLimited(quota) => {
                let mut response = ErrorEnvelope::new(RATE_LIMITED_MESSAGE)
                    .into_response_with(StatusCode::TOO_MANY_REQUESTS);
                let headers = response.headers_mut();
                quota.apply(headers);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(quota.reset_secs()));
                response
            }
            Rejection::Unauthorized => {
                ErrorEnvelope::new(UNAUTHORIZED_MESSAGE).into_response_with(StatusCode::FORBIDDEN)
            }
            Rejection::OriginNotAllowed => ErrorEnvelope::new(ORIGIN_REJECTED_MESSAGE)
                .into_response_with(StatusCode::FORBIDDEN),
            Rejection::Invalid(details) => ErrorEnvelope::new(VALIDATION_MESSAGE)
                .with_details(details)
                .into_response_with(StatusCode::BAD_REQUEST),
            Rejection::MalformedBody { status, message } => {
                ErrorEnvelope::new(message).into_response_with(status)
            }
        }
    }
}

/// Unwrap a [`Stage`], returning the rejection response from the handler on halt
macro_rules! proceed {
    ($stage:expr) => {
        match $stage {
            $crate::api::pipeline::Stage::Continue(value) => value,
            $crate::api::pipeline::Stage::Halt(rejection) => {
                return Ok(::axum::response::IntoResponse::into_response(rejection));
            }
        }
    };
}
pub(crate) use proceed;

// =========================================================================
// Client address
// =========================================================================

/// Rate-limit key for the calling client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

#[async_trait]
impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(client_addr(
            &parts.headers,
            parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|c| c.0),
            state.settings.rate_limit.trust_proxy,
        ))
    }
}

/// Peer IP, or the first forwarded hop when the proxy is trusted
pub fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> ClientAddr {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(forwarded) = forwarded {
            return ClientAddr(forwarded.to_string());
        }
    }

    ClientAddr(
        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    )
}

// =========================================================================
// Stages
// =========================================================================

/// Count the request against the client's window
pub fn throttle(limiter: &FixedWindowLimiter, client: &ClientAddr) -> Stage<Quota> {
    match limiter.admit(&client.0) {
        Admission::Allowed(quota) => Stage::Continue(quota),
        Admission::Limited(quota) => {
            tracing::warn!(client = %client.0, "Contact rate limit exceeded");
            Stage::Halt(Rejection::RateLimited(quota))
        }
    }
}

/// Accept the parsed JSON body.
///
/// A request without a JSON content type is treated as an empty object so
/// validation reports every missing field.
pub fn parse_body(body: Result<Json<Value>, JsonRejection>) -> Stage<Value> {
    match body {
        Ok(Json(value)) => Stage::Continue(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Stage::Continue(Value::Object(Map::new())),
        Err(rejection) => Stage::Halt(Rejection::MalformedBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }),
    }
}

/// Run the contact rules and shape the submission
pub fn validate_contact(body: &Value) -> Stage<ContactSubmission> {
    let details = validate(CONTACT_RULES, body);
    if !details.is_empty() {
        return Stage::Halt(Rejection::Invalid(details));
    }

    match ContactSubmission::from_body(body) {
        Some(submission) => Stage::Continue(submission),
        // Unreachable while CONTACT_RULES require every field as a string
        None => Stage::Halt(Rejection::Invalid(Vec::new())),
    }
}

/// Check the shared secret header. An unset secret rejects everyone.
pub fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Stage<()> {
    let provided = headers.get(API_KEY_HEADER).map(HeaderValue::as_bytes);

    match (provided, secret) {
        (Some(provided), Some(secret)) if digest_eq(provided, secret.as_bytes()) => {
            Stage::Continue(())
        }
        _ => Stage::Halt(Rejection::Unauthorized),
    }
}

/// Compare fixed-length digests so timing does not leak a matching prefix
fn digest_eq(a: &[u8], b: &[u8]) -> bool {
    Sha256::digest(a) == Sha256::digest(b)
}
