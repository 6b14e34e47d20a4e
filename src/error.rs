//! Error handling module
//!
//! Centralized error types and the JSON error envelope.

use std::error::Error as _;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::validation::ValidationErrorDetail;
use crate::db::DatabaseError;
use crate::mail::MailError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

const MAIL_DELIVERY_MESSAGE: &str = "Email could not be sent. Please try again later.";
const MAIL_CREDENTIALS_MESSAGE: &str =
    "Server configuration error. Please contact the administrator.";

/// Failures that propagate out of a handler to the error envelope stage
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure response body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: None,
            stack: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_stack(mut self, stack: String) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Mail(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client. Mail failures never expose provider detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Mail(MailError::Delivery(_)) => MAIL_DELIVERY_MESSAGE.to_string(),
            AppError::Mail(MailError::Credentials(_)) => MAIL_CREDENTIALS_MESSAGE.to_string(),
            AppError::Database(e) => e.to_string(),
            AppError::Internal(msg) => msg.clone(),
        }
    }

    /// The error and its chain of sources, one per line
    pub fn stack(&self) -> String {
        let mut stack = format!("{:?}", self);
        let mut source = self.source();
        while let Some(cause) = source {
            stack.push_str("\nCaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        stack
    }

    /// Render the failure envelope; the stack is included only on request
    pub fn render(&self, include_stack: bool) -> Response {
        let mut envelope = ErrorEnvelope::new(self.public_message());
        if include_stack && !matches!(self, AppError::Mail(_)) {
            envelope = envelope.with_stack(self.stack());
        }
        envelope.into_response_with(self.status())
    }

    /// Server-side log entry; always carries the full detail
    pub fn log(&self) {
        match self {
            AppError::Mail(MailError::Credentials(detail)) => {
                tracing::error!(
                    detail = %detail,
                    "Mail provider credentials error - check the AWS settings"
                );
            }
            AppError::Mail(MailError::Delivery(detail)) => {
                tracing::error!(detail = %detail, "Mail provider rejected the message");
            }
            AppError::Database(e) => {
                tracing::error!(error = ?e, "Database error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
            }
        }
    }
}

/// Marker left on a response by [`AppError::into_response`] so the error
/// envelope stage can log it and re-render it for the current environment.
#[derive(Debug, Clone)]
pub struct PropagatedError(pub Arc<AppError>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.render(false);
        response
            .extensions_mut()
            .insert(PropagatedError(Arc::new(self)));
        response
    }
}
