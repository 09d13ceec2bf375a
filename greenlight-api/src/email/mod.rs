//! Outbound notifications
//!
//! Only ever invoked from inside [`BackgroundRunner::run`](crate::tasks::BackgroundRunner::run),
//! never on the request path.

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("failed to build message: {0}")]
    Build(String),

    #[error("email transport error: {0}")]
    Transport(#[source] BoxError),
}

/// Message kinds with the data each one renders
#[derive(Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    Welcome { user_id: i64, activation_token: String },
    Activation { activation_token: String },
    PasswordReset { reset_token: String },
}

// tokens stay out of Debug output
impl std::fmt::Debug for EmailTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl EmailTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::Welcome { .. } => "user_welcome",
            EmailTemplate::Activation { .. } => "token_activation",
            EmailTemplate::PasswordReset { .. } => "token_password_reset",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::Welcome { .. } => "Welcome to Greenlight!",
            EmailTemplate::Activation { .. } => "Activate your Greenlight account",
            EmailTemplate::PasswordReset { .. } => "Reset your Greenlight password",
        }
    }

    pub fn body_text(&self) -> String {
        match self {
            EmailTemplate::Welcome {
                user_id,
                activation_token,
            } => format!(
                "Hi,\n\n\
                 Thanks for signing up for a Greenlight account. We're excited to have you on board!\n\
                 For future reference, your user ID number is {user_id}.\n\n\
                 Please send a request to the `PUT /v1/users/activated` endpoint with the following \
                 JSON body to activate your account:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n\n\
                 Thanks,\n\nThe Greenlight Team"
            ),
            EmailTemplate::Activation { activation_token } => format!(
                "Hi,\n\n\
                 Please send a `PUT /v1/users/activated` request with the following JSON body to \
                 activate your account:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n\n\
                 Thanks,\n\nThe Greenlight Team"
            ),
            EmailTemplate::PasswordReset { reset_token } => format!(
                "Hi,\n\n\
                 Please send a `PUT /v1/users/password` request with the following JSON body to set \
                 a new password:\n\n\
                 {{\"password\": \"your new password\", \"token\": \"{reset_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 45 minutes. \
                 If you need another token please make a `POST /v1/tokens/password-reset` request.\n\n\
                 Thanks,\n\nThe Greenlight Team"
            ),
        }
    }
}

/// Notification transport
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, recipient: &str, template: &EmailTemplate) -> Result<(), MailError>;
}

/// AWS SES v2 transport
pub struct SesMailer {
    ses: SesClient,
    from: String,
}

impl SesMailer {
    pub fn new(ses: SesClient, from: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, recipient: &str, template: &EmailTemplate) -> Result<(), MailError> {
        let subject = Content::builder()
            .data(template.subject())
            .build()
            .map_err(|e| MailError::Build(e.to_string()))?;

        let body = Body::builder()
            .text(
                Content::builder()
                    .data(template.body_text())
                    .build()
                    .map_err(|e| MailError::Build(e.to_string()))?,
            )
            .build();

        let message = Message::builder().subject(subject).body(body).build();

        self.ses
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(recipient).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| MailError::Transport(e.into()))?;

        tracing::info!(to = recipient, template = template.name(), "Email sent");
        Ok(())
    }
}

/// Development transport: logs the recipient and template, sends nothing
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: &EmailTemplate) -> Result<(), MailError> {
        tracing::info!(to = recipient, template = template.name(), "Email suppressed (log mailer)");
        Ok(())
    }
}
