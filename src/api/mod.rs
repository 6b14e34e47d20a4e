//! API module
//!
//! HTTP endpoints, their request pipeline, and middleware.

pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod validation;

use std::sync::Arc;

use crate::config::Settings;
use crate::db::ContentStore;
use crate::mail::Mailer;
use crate::rate_limit::FixedWindowLimiter;

pub use routes::create_router;

/// Everything a handler can reach, injected at startup
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub content: Arc<dyn ContentStore>,
    pub mailer: Arc<dyn Mailer>,
    pub limiter: Arc<FixedWindowLimiter>,
}

impl AppState {
    pub fn new(settings: Settings, content: Arc<dyn ContentStore>, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = Arc::new(FixedWindowLimiter::from_settings(&settings.rate_limit));
        Self {
            settings: Arc::new(settings),
            content,
            mailer,
            limiter,
        }
    }
}
