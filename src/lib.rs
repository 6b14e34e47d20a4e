//! Portfolio API Library
//!
//! Re-exports modules for integration testing and the server binary.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod mail;
pub mod rate_limit;

use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use api::AppState;
pub use config::Settings;
pub use db::{ContentStore, Database, DatabaseError};
pub use domain::ContactSubmission;
pub use error::{AppError, AppResult};
pub use mail::{MailError, Mailer, SesMailer};
pub use rate_limit::FixedWindowLimiter;

/// Largest accepted request body
pub const BODY_LIMIT_BYTES: usize = 100 * 1024;

/// Initialize tracing/logging
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portfolio_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Build the application router
pub fn build_app(state: AppState) -> Router {
    // Note: Axum layers are applied in reverse order (last added = first executed)
    // Order: error envelope -> catch panic -> handler
    let api_router = api::create_router()
        .layer(CatchPanicLayer::custom(api::middleware::panic_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::error_envelope,
        ))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES));

    // Order: cors -> security headers -> request id -> trace -> logging -> origin check -> routes
    let router = Router::new()
        .nest("/api", api_router)
        .fallback(api::routes::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::reject_disallowed_origin,
        ))
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    api::middleware::security_header_layers()
        .into_iter()
        .fold(router, |router, layer| router.layer(layer))
        .layer(api::middleware::cors_layer(&state.settings.cors))
        .with_state(state)
}
