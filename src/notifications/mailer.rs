//! SMTP delivery for rendered emails.
//!
//! The transport is built once from configuration and shared; every send is a
//! single SMTP transaction with no queueing or retry.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use thiserror::Error;

use crate::config::{EmailConfig, SmtpConfig};

/// A fully rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("SMTP is not configured (set SMTP_HOST and EMAIL_FROM_ADDRESS)")]
    NotConfigured,

    #[error("Invalid email address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Delivers rendered emails. Implemented by SMTP in production and by
/// recording doubles in tests.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one email and return the Message-ID it was sent with
    async fn send(&self, email: &OutgoingEmail) -> Result<String, MailerError>;

    /// Check that the transport can reach and authenticate with the server
    async fn verify(&self) -> Result<(), MailerError>;
}

/// Parse an address the way the SMTP sender will; used for request validation
pub fn parse_address(address: &str) -> Result<Address, MailerError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|source| MailerError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

struct Sender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Mailbox,
}

/// lettre-backed SMTP mailer
pub struct SmtpMailer {
    sender: Option<Sender>,
}

impl SmtpMailer {
    /// Build the transport. Missing SMTP host or from address yields a mailer
    /// that rejects every send with [`MailerError::NotConfigured`].
    pub fn new(smtp: &SmtpConfig, email: &EmailConfig) -> Result<Self, MailerError> {
        let (Some(host), Some(from_address)) = (
            smtp.host.as_deref().filter(|h| !h.is_empty()),
            email.from_address.as_deref().filter(|a| !a.is_empty()),
        ) else {
            tracing::warn!("SMTP not configured, emails will not be delivered");
            return Ok(Self { sender: None });
        };

        let from = Mailbox::new(Some(email.from_name.clone()), parse_address(from_address)?);
        let reply_to = match email.reply_to_address() {
            Some(reply_to) => Mailbox::new(Some(email.from_name.clone()), parse_address(reply_to)?),
            None => from.clone(),
        };

        // Implicit TLS when secure, otherwise upgrade with STARTTLS when offered
        let builder = if smtp.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Opportunistic(TlsParameters::new(host.to_string())?))
        }
        .port(smtp.port)
        .timeout(Some(Duration::from_secs(smtp.timeout)));

        let builder = if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        tracing::info!(
            host = %host,
            port = smtp.port,
            secure = smtp.secure,
            from = %from,
            "SMTP mailer configured"
        );

        Ok(Self {
            sender: Some(Sender {
                transport: builder.build(),
                from,
                reply_to,
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, MailerError> {
        let sender = self.sender.as_ref().ok_or(MailerError::NotConfigured)?;

        let to = Mailbox::new(None, parse_address(&email.to)?);
        let message_id = new_message_id(&sender.from);

        let message = Message::builder()
            .from(sender.from.clone())
            .reply_to(sender.reply_to.clone())
            .to(to)
            .subject(email.subject.as_str())
            .message_id(Some(message_id.clone()))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )?;

        sender.transport.send(message).await?;

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            message_id = %message_id,
            "Email sent successfully"
        );

        Ok(message_id)
    }

    async fn verify(&self) -> Result<(), MailerError> {
        let sender = self.sender.as_ref().ok_or(MailerError::NotConfigured)?;
        sender.transport.test_connection().await?;
        Ok(())
    }
}

/// `<uuid@sender-domain>`
fn new_message_id(from: &Mailbox) -> String {
    format!("<{}@{}>", uuid::Uuid::new_v4(), from.email.domain())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_config(from: Option<&str>) -> EmailConfig {
        EmailConfig {
            from_address: from.map(str::to_string),
            ..EmailConfig::default()
        }
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("ada@example.com").is_ok());
        assert!(parse_address("  ada@example.com ").is_ok());
        assert!(matches!(
            parse_address("not-an-email"),
            Err(MailerError::InvalidAddress { .. })
        ));
        assert!(parse_address("").is_err());
    }

    #[test]
    fn test_message_id_uses_sender_domain() {
        let from = Mailbox::new(None, "jobs@example.com".parse().unwrap());
        let id = new_message_id(&from);
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
        assert_ne!(id, new_message_id(&from));
    }

    #[tokio::test]
    async fn test_unconfigured_mailer_rejects_sends() {
        let mailer = SmtpMailer::new(&SmtpConfig::default(), &email_config(None)).unwrap();
        assert!(!mailer.is_enabled());

        let result = mailer
            .send(&OutgoingEmail {
                to: "ada@example.com".to_string(),
                subject: "Hi".to_string(),
                html: "<p>Hi</p>".to_string(),
                text: "Hi".to_string(),
            })
            .await;
        assert!(matches!(result, Err(MailerError::NotConfigured)));
        assert!(matches!(mailer.verify().await, Err(MailerError::NotConfigured)));
    }

    #[test]
    fn test_invalid_from_address_rejected() {
        let smtp = SmtpConfig {
            host: Some("smtp.example.com".to_string()),
            ..SmtpConfig::default()
        };
        let result = SmtpMailer::new(&smtp, &email_config(Some("nope")));
        assert!(matches!(result, Err(MailerError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_configured_mailer_builds_without_connecting() {
        let smtp = SmtpConfig {
            host: Some("smtp.example.com".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..SmtpConfig::default()
        };
        let mailer = SmtpMailer::new(&smtp, &email_config(Some("jobs@example.com"))).unwrap();
        assert!(mailer.is_enabled());
    }
}
