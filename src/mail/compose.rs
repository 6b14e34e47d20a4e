//! Message Composition
//!
//! Builds the outgoing text and HTML bodies for a contact submission.

use crate::config::MailSettings;
use crate::domain::ContactSubmission;

/// A fully addressed message ready for the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Escape text for embedding in HTML element content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Compose the notification for `submission`.
///
/// User text appears verbatim in the text body and escaped in the HTML body.
/// Replies go to the submitter; delivery goes to the configured recipient.
pub fn compose(submission: &ContactSubmission, settings: &MailSettings) -> OutgoingEmail {
    let site = &settings.site_name;

    let text_body = format!(
        "New Contact Form Submission\n\
         ============================\n\
         \n\
         From: {name}\n\
         Email: {email}\n\
         Subject: {subject}\n\
         \n\
         Message:\n\
         {message}\n\
         \n\
         ---\n\
         Sent from {site} contact form",
        name = submission.name,
        email = submission.email,
        subject = submission.subject,
        message = submission.message,
        site = site,
    );

    let email = escape_html(&submission.email);
    let html_body = format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <style>
      body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
      .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
      .header {{ background-color: #0d5ade; color: white; padding: 20px; text-align: center; }}
      .content {{ padding: 20px; background-color: #f9f9f9; }}
      .field {{ margin-bottom: 15px; }}
      .label {{ font-weight: bold; color: #555; }}
      .message-box {{ background-color: white; padding: 15px; border-left: 4px solid #0d5ade; }}
      .footer {{ text-align: center; padding: 10px; color: #888; font-size: 12px; }}
    </style>
  </head>
  <body>
    <div class="container">
      <div class="header">
        <h1>New message from your contact form</h1>
      </div>
      <div class="content">
        <div class="field">
          <span class="label">From:</span> {name}
        </div>
        <div class="field">
          <span class="label">Email:</span> <a href="mailto:{email}">{email}</a>
        </div>
        <div class="field">
          <span class="label">Subject:</span> {subject}
        </div>
        <div class="field">
          <span class="label">Message:</span>
          <div class="message-box">{message}</div>
        </div>
      </div>
      <div class="footer">
        Sent from {site} contact form
      </div>
    </div>
  </body>
</html>
"#,
        name = escape_html(&submission.name),
        email = email,
        subject = escape_html(&submission.subject),
        message = escape_html(&submission.message).replace('\n', "<br>"),
        site = escape_html(site),
    );

    OutgoingEmail {
        from: settings.from.clone(),
        to: settings.to.clone(),
        reply_to: submission.email.clone(),
        subject: format!("[{} - Contact Form]: {}", site, submission.subject),
        text_body,
        html_body,
    }
}
