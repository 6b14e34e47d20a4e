//! Mail gateway
//!
//! Owns all traffic to the transactional mail provider.

pub mod compose;
pub mod ses;

use async_trait::async_trait;

use crate::domain::ContactSubmission;

pub use compose::{compose, escape_html, OutgoingEmail};
pub use ses::SesMailer;

/// Provider-assigned identifier of an accepted message
pub type MessageId = String;

/// Sends contact submissions. One delivery attempt per call, no retries.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, submission: &ContactSubmission) -> Result<MessageId, MailError>;
}

/// Mail provider failures
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The provider refused or could not deliver the message
    #[error("Email delivery failed: {0}")]
    Delivery(String),

    /// The provider rejected our credentials
    #[error("Mail provider credentials error: {0}")]
    Credentials(String),
}
