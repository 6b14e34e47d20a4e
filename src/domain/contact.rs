//! Contact Submission
//!
//! A contact-form message on its way to the mail gateway.

use serde::Serialize;
use serde_json::Value;

/// A validated contact-form submission.
///
/// Built per request from a body that already passed validation, handed to
/// the mail gateway once, then dropped. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactSubmission {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Extract the trimmed fields from a request body.
    ///
    /// Returns `None` if any field is missing or not a string. Callers run
    /// the contact validation rules first; this only performs the shaping.
    pub(crate) fn from_body(body: &Value) -> Option<Self> {
        let field = |key: &str| body.get(key)?.as_str().map(|s| s.trim().to_string());

        Some(Self {
            name: field("name")?,
            email: field("email")?,
            subject: field("subject")?,
            message: field("message")?,
        })
    }
}
