//! AWS SES mailer
//!
//! Sends composed contact messages through the SES v2 `SendEmail` API.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::config::{Credentials, Region};
use aws_sdk_sesv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sesv2::operation::send_email::SendEmailError;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client;

use crate::config::MailSettings;
use crate::domain::ContactSubmission;

use super::{compose, MailError, Mailer, MessageId};

/// Provider error codes that mean our credentials are unusable
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
    "InvalidSignatureException",
    "IncompleteSignature",
    "MissingAuthenticationToken",
    "ExpiredToken",
    "ExpiredTokenException",
    "AccessDeniedException",
];

const CHARSET: &str = "UTF-8";

/// SES-backed [`Mailer`]
#[derive(Debug, Clone)]
pub struct SesMailer {
    client: Client,
    settings: MailSettings,
}

impl SesMailer {
    /// Build a client for the configured region.
    ///
    /// Explicit access keys win; otherwise the SDK's default credential
    /// chain is used.
    pub async fn from_settings(settings: &MailSettings) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "portfolio-api-settings",
            ));
        }

        let sdk_config = loader.load().await;
        tracing::info!(region = %settings.region, "SES mailer configured");

        Self {
            client: Client::new(&sdk_config),
            settings: settings.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, submission: &ContactSubmission) -> Result<MessageId, MailError> {
        let email = compose(submission, &self.settings);

        let message = Message::builder()
            .subject(content(email.subject)?)
            .body(
                Body::builder()
                    .text(content(email.text_body)?)
                    .html(content(email.html_body)?)
                    .build(),
            )
            .build();

        let output = self
            .client
            .send_email()
            .from_email_address(email.from)
            .destination(Destination::builder().to_addresses(email.to).build())
            .reply_to_addresses(email.reply_to)
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(classify)?;

        let message_id = accepted_message_id(output.message_id());
        tracing::info!(message_id = %message_id, "Contact email sent");

        Ok(message_id)
    }
}

/// SES always returns an id for accepted mail; an empty one is logged
fn accepted_message_id(id: Option<&str>) -> MessageId {
    match id {
        Some(id) => id.to_string(),
        None => {
            tracing::warn!("SES accepted the message without returning a message id");
            MessageId::new()
        }
    }
}

fn content(data: String) -> Result<Content, MailError> {
    Content::builder()
        .data(data)
        .charset(CHARSET)
        .build()
        .map_err(|e| MailError::Delivery(e.to_string()))
}

fn classify(err: SdkError<SendEmailError>) -> MailError {
    let detail = DisplayErrorContext(&err).to_string();
    let code = err.code().map(str::to_string);

    // Credentials that never resolved fail before the request is dispatched
    let unresolved_credentials =
        matches!(err, SdkError::ConstructionFailure(_) | SdkError::DispatchFailure(_))
            && detail.to_lowercase().contains("credentials");

    classify_failure(code.as_deref(), unresolved_credentials, detail)
}

fn classify_failure(code: Option<&str>, unresolved_credentials: bool, detail: String) -> MailError {
    let is_credentials = unresolved_credentials
        || code.is_some_and(|code| CREDENTIAL_ERROR_CODES.contains(&code));

    if is_credentials {
        MailError::Credentials(detail)
    } else {
        MailError::Delivery(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_message_id() {
        assert_eq!(accepted_message_id(Some("0100-abc")), "0100-abc");
        assert_eq!(accepted_message_id(None), "");
    }

    #[test]
    fn test_message_rejected_is_delivery() {
        let err = classify_failure(Some("MessageRejected"), false, "rejected".to_string());
        assert!(matches!(err, MailError::Delivery(ref d) if d == "rejected"));
    }

    #[test]
    fn test_unverified_sender_is_delivery() {
        let err = classify_failure(Some("MailFromDomainNotVerifiedException"), false, String::new());
        assert!(matches!(err, MailError::Delivery(_)));
    }

    #[test]
    fn test_token_errors_are_credentials() {
        for code in ["InvalidClientTokenId", "SignatureDoesNotMatch", "ExpiredToken"] {
            let err = classify_failure(Some(code), false, String::new());
            assert!(matches!(err, MailError::Credentials(_)), "{}", code);
        }
    }

    #[test]
    fn test_unresolved_credentials_without_code() {
        let err = classify_failure(None, true, "no credentials in chain".to_string());
        assert!(matches!(err, MailError::Credentials(_)));

        let err = classify_failure(None, false, "timeout".to_string());
        assert!(matches!(err, MailError::Delivery(_)));
    }
}
