//! Transactional email notifications for the job board.
//!
//! `NotificationService` owns the mailer and the template context and offers
//! one typed sender per template. It is shared by the HTTP endpoints and the
//! realtime change listener.

pub mod mailer;
pub mod templates;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;

pub use mailer::{Mailer, MailerError, OutgoingEmail, SmtpMailer};
pub use templates::{
    ApplicationConfirmationData, ApplicationNotificationData, JobPostedData, RenderedEmail,
    SignupAlertData, TemplateContext, UserRole, WelcomeData,
};

/// Manual send request accepted by `POST /send-email`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EmailRequest {
    Welcome(WelcomeData),
    ApplicationConfirmation(ApplicationConfirmationData),
    ApplicationNotification(ApplicationNotificationData),
    JobPosted(JobPostedData),
}

impl EmailRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            EmailRequest::Welcome(_) => "welcome",
            EmailRequest::ApplicationConfirmation(_) => "application_confirmation",
            EmailRequest::ApplicationNotification(_) => "application_notification",
            EmailRequest::JobPosted(_) => "job_posted",
        }
    }

    /// Address the email will be delivered to
    pub fn recipient(&self) -> &str {
        match self {
            EmailRequest::Welcome(data) => &data.email,
            EmailRequest::ApplicationConfirmation(data) => &data.applicant_email,
            EmailRequest::ApplicationNotification(data) => &data.employer_email,
            EmailRequest::JobPosted(data) => &data.employer_email,
        }
    }
}

impl fmt::Display for EmailRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Renders templates and hands them to the mailer
pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    templates: TemplateContext,
    admin_address: Option<String>,
}

impl NotificationService {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        templates: TemplateContext,
        admin_address: Option<String>,
    ) -> Self {
        Self {
            mailer,
            templates,
            admin_address: admin_address.filter(|a| !a.trim().is_empty()),
        }
    }

    /// SMTP-backed service wired from the relay configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mailer = SmtpMailer::new(&config.smtp, &config.email)
            .context("Failed to configure SMTP mailer")?;
        let templates = TemplateContext::new(config.email.from_name.clone(), config.frontend.base_url());
        Ok(Self::new(
            Arc::new(mailer),
            templates,
            config.email.admin_address.clone(),
        ))
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    pub fn admin_address(&self) -> Option<&str> {
        self.admin_address.as_deref()
    }

    /// Send a rendered email, returning the provider message id
    async fn deliver(&self, to: &str, rendered: RenderedEmail, kind: &str) -> Result<String> {
        let email = OutgoingEmail {
            to: to.to_string(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
        };

        let message_id = self
            .mailer
            .send(&email)
            .await
            .with_context(|| format!("Failed to send {} email to {}", kind, to))?;

        tracing::debug!(kind = kind, to = %to, message_id = %message_id, "Notification delivered");
        Ok(message_id)
    }

    pub async fn send_welcome(&self, data: &WelcomeData) -> Result<String> {
        let rendered = templates::welcome(&self.templates, data);
        self.deliver(&data.email, rendered, "welcome").await
    }

    pub async fn send_application_confirmation(
        &self,
        data: &ApplicationConfirmationData,
    ) -> Result<String> {
        let rendered = templates::application_confirmation(&self.templates, data);
        self.deliver(&data.applicant_email, rendered, "application_confirmation")
            .await
    }

    pub async fn send_application_notification(
        &self,
        data: &ApplicationNotificationData,
    ) -> Result<String> {
        let rendered = templates::application_notification(&self.templates, data);
        self.deliver(&data.employer_email, rendered, "application_notification")
            .await
    }

    pub async fn send_job_posted(&self, data: &JobPostedData) -> Result<String> {
        let rendered = templates::job_posted(&self.templates, data);
        self.deliver(&data.employer_email, rendered, "job_posted").await
    }

    /// Alert the configured admin about a new signup. `Ok(None)` when no
    /// admin address is configured.
    pub async fn send_signup_alert(&self, data: &SignupAlertData) -> Result<Option<String>> {
        let Some(admin) = self.admin_address.as_deref() else {
            return Ok(None);
        };
        let rendered = templates::new_signup(&self.templates, data);
        self.deliver(admin, rendered, "new_signup").await.map(Some)
    }

    pub async fn send_test(&self, to: &str) -> Result<String> {
        let rendered = templates::test_message(&self.templates, to);
        self.deliver(to, rendered, "test").await
    }

    /// Dispatch a manual request to the matching typed sender
    pub async fn dispatch(&self, request: &EmailRequest) -> Result<String> {
        match request {
            EmailRequest::Welcome(data) => self.send_welcome(data).await,
            EmailRequest::ApplicationConfirmation(data) => {
                self.send_application_confirmation(data).await
            }
            EmailRequest::ApplicationNotification(data) => {
                self.send_application_notification(data).await
            }
            EmailRequest::JobPosted(data) => self.send_job_posted(data).await,
        }
    }
}
