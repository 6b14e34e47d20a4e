//! Request Validation
//!
//! Declarative per-route field rules evaluated against a parsed JSON body.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest address accepted by the email constraint
const MAX_EMAIL_LENGTH: usize = 254;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// One failed field, reported back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// A single check applied to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Present, not null, and not blank when a string
    Required,
    /// A JSON string
    Text,
    /// Trimmed length in characters, inclusive bounds
    Length { min: usize, max: usize },
    /// An email address
    Email,
}

/// Constraints for one body field, checked in declaration order
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub label: &'static str,
    pub constraints: &'static [Constraint],
}

/// Rules for `POST /api/contact`
pub const CONTACT_RULES: &[FieldRule] = &[
    FieldRule {
        field: "name",
        label: "Name",
        constraints: &[
            Constraint::Required,
            Constraint::Text,
            Constraint::Length { min: 1, max: 100 },
        ],
    },
    FieldRule {
        field: "email",
        label: "Email",
        constraints: &[Constraint::Required, Constraint::Text, Constraint::Email],
    },
    FieldRule {
        field: "subject",
        label: "Subject",
        constraints: &[
            Constraint::Required,
            Constraint::Text,
            Constraint::Length { min: 1, max: 200 },
        ],
    },
    FieldRule {
        field: "message",
        label: "Message",
        constraints: &[
            Constraint::Required,
            Constraint::Text,
            Constraint::Length { min: 1, max: 5000 },
        ],
    },
];

/// Validate `body` against `rules`.
///
/// Each field contributes at most one detail, for its first failing
/// constraint. A body that is not a JSON object is treated as having no
/// fields at all. Returns an empty list when everything passes.
pub fn validate(rules: &[FieldRule], body: &Value) -> Vec<ValidationErrorDetail> {
    rules
        .iter()
        .filter_map(|rule| {
            let value = body.as_object().and_then(|fields| fields.get(rule.field));
            rule.constraints
                .iter()
                .find_map(|constraint| check(*constraint, rule.label, value))
                .map(|message| ValidationErrorDetail {
                    field: rule.field.to_string(),
                    message,
                })
        })
        .collect()
}

/// Returns the failure message, or `None` when the constraint holds
fn check(constraint: Constraint, label: &str, value: Option<&Value>) -> Option<String> {
    match constraint {
        Constraint::Required => {
            let missing = match value {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            missing.then(|| format!("{} is required", label))
        }
        Constraint::Text => match value {
            Some(Value::String(_)) | None => None,
            Some(_) => Some(format!("{} must be a string", label)),
        },
        Constraint::Length { min, max } => {
            let length = value.and_then(Value::as_str)?.trim().chars().count();
            (length < min || length > max)
                .then(|| format!("{} must be between {} and {} characters", label, min, max))
        }
        Constraint::Email => {
            let address = value.and_then(Value::as_str)?.trim();
            let valid = address.len() <= MAX_EMAIL_LENGTH && EMAIL_PATTERN.is_match(address);
            (!valid).then(|| "A valid email address is required".to_string())
        }
    }
}
