//! API Middleware
//!
//! Request logging, the terminal error envelope stage, CORS, and security
//! response headers.

use std::any::Any;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CorsSettings;
use crate::error::{AppError, PropagatedError};

use super::pipeline::{Rejection, API_KEY_HEADER};
use super::AppState;

// =========================================================================
// Error envelope
// =========================================================================

/// Terminal error stage.
///
/// Picks up errors propagated from handlers, logs them with full detail,
/// and renders the envelope for the current environment (with `stack`
/// outside production).
pub async fn error_envelope(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;

    match response.extensions_mut().remove::<PropagatedError>() {
        Some(PropagatedError(err)) => {
            tracing::error!(
                method = %method,
                uri = %uri,
                status = %err.status(),
                error = %err,
                "Request failed"
            );
            err.log();
            err.render(!state.settings.is_production())
        }
        None => response,
    }
}

/// Turn a handler panic into a propagated internal error
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    AppError::Internal(format!("Handler panicked: {}", detail)).into_response()
}

// =========================================================================
// Request logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    API_KEY_HEADER,
    "authorization",
    "cookie",
    "set-cookie",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    // Set by the request id layer further out
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        request_id = ?request_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        request_id = ?request_id,
        "Request completed"
    );

    response
}

// =========================================================================
// CORS
// =========================================================================

/// Whether `origin` may read responses
pub fn origin_allowed(origin: &str, settings: &CorsSettings) -> bool {
    settings.allowed_origins.iter().any(|allowed| allowed == origin)
        || settings
            .preview_origin_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(origin))
}

/// Turn away cross-origin requests from origins outside the policy before
/// any handler runs. Requests without an `Origin` header pass through.
pub async fn reject_disallowed_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).map(|origin| {
        origin
            .to_str()
            .map(|origin| (origin.to_string(), origin_allowed(origin, &state.settings.cors)))
            .unwrap_or_else(|_| ("[invalid utf8]".to_string(), false))
    });

    match origin {
        Some((origin, false)) => {
            tracing::warn!(origin = %origin, uri = %request.uri(), "Origin not allowed");
            Rejection::OriginNotAllowed.into_response()
        }
        _ => next.run(request).await,
    }
}

/// CORS policy: allow-listed origins plus the optional preview pattern
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let policy = settings.clone();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|origin| origin_allowed(origin, &policy))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
        .allow_credentials(settings.allow_credentials)
}

// =========================================================================
// Security headers
// =========================================================================

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
];

/// One layer per header; existing values set by handlers are kept
pub fn security_header_layers() -> Vec<SetResponseHeaderLayer<HeaderValue>> {
    SECURITY_HEADERS
        .iter()
        .map(|&(name, value)| {
            SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn cors_settings() -> CorsSettings {
        CorsSettings {
            allowed_origins: vec!["https://site.test".to_string()],
            preview_origin_pattern: Some(
                Regex::new(r"^(?:https://deploy-preview-\d+--site\.netlify\.app)$").unwrap(),
            ),
            allow_credentials: false,
        }
    }

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-api-key", "secret-key-12345".parse().unwrap());
        headers.insert("x-request-id", "req-123".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let api_key = masked.iter().find(|(k, _)| k == "x-api-key");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let request_id = masked.iter().find(|(k, _)| k == "x-request-id");

        assert_eq!(api_key.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(request_id.unwrap().1, "req-123");
    }

    #[test]
    fn test_sensitive_headers_list() {
        assert!(SENSITIVE_HEADERS.contains(&"x-api-key"));
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(!SENSITIVE_HEADERS.contains(&"content-type"));
    }

    #[test]
    fn test_origin_allowed() {
        let settings = cors_settings();

        assert!(origin_allowed("https://site.test", &settings));
        assert!(origin_allowed("https://deploy-preview-12--site.netlify.app", &settings));
        assert!(!origin_allowed("https://deploy-preview-x--site.netlify.app", &settings));
        assert!(!origin_allowed("https://evil.test", &settings));
    }

    #[test]
    fn test_security_header_values_are_valid() {
        assert_eq!(security_header_layers().len(), SECURITY_HEADERS.len());
    }

    #[test]
    fn test_panic_response_is_propagated() {
        let response = panic_response(Box::new("boom"));
        assert!(response.extensions().get::<PropagatedError>().is_some());
    }
}
