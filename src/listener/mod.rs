//! Turns realtime INSERT events into notification emails.
//!
//! Each event is handled on its own task. Handlers catch and log every error;
//! nothing is retried and one failed email never stops the others.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::notifications::{
    ApplicationConfirmationData, ApplicationNotificationData, JobPostedData, NotificationService,
    SignupAlertData, WelcomeData,
};
use crate::realtime::{ChangeEvent, ChangeKind};
use crate::supabase::{Application, Job, Profile, RecordSource};

/// Tables the relay subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedTable {
    Applications,
    Jobs,
    Profiles,
}

impl WatchedTable {
    pub const ALL: [WatchedTable; 3] = [
        WatchedTable::Applications,
        WatchedTable::Jobs,
        WatchedTable::Profiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchedTable::Applications => "applications",
            WatchedTable::Jobs => "jobs",
            WatchedTable::Profiles => "profiles",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == table)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }
}

/// What a handler managed to send, for logs and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub sent: usize,
    pub failed: usize,
}

impl HandlerOutcome {
    fn record(&mut self, kind: &str, result: Result<String>) {
        match result {
            Ok(message_id) => {
                self.sent += 1;
                debug!(kind = kind, message_id = %message_id, "Notification sent");
            }
            Err(e) => {
                self.failed += 1;
                error!(kind = kind, error = %format!("{:#}", e), "Notification failed");
            }
        }
    }
}

pub struct ChangeListener {
    notifications: Arc<NotificationService>,
    records: Arc<dyn RecordSource>,
}

impl ChangeListener {
    pub fn new(notifications: Arc<NotificationService>, records: Arc<dyn RecordSource>) -> Self {
        Self {
            notifications,
            records,
        }
    }

    /// Consume events until the sender side closes
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ChangeEvent>) {
        info!(tables = ?WatchedTable::names(), "Change listener started");

        while let Some(event) = rx.recv().await {
            let listener = self.clone();
            tokio::spawn(async move {
                listener.handle(event).await;
            });
        }

        info!("Change listener stopped");
    }

    /// Handle one event, logging instead of returning errors
    pub async fn handle(&self, event: ChangeEvent) -> HandlerOutcome {
        if event.kind != ChangeKind::Insert {
            debug!(table = %event.table, kind = %event.kind, "Ignoring non-insert change");
            return HandlerOutcome::default();
        }

        let Some(table) = WatchedTable::from_table(&event.table) else {
            warn!(table = %event.table, "Change event for unwatched table");
            return HandlerOutcome::default();
        };

        let id = event.record_id();
        info!(table = table.as_str(), id = %id, "Handling new row");

        let result = match table {
            WatchedTable::Applications => self.on_application_inserted(&event).await,
            WatchedTable::Jobs => self.on_job_inserted(&event).await,
            WatchedTable::Profiles => self.on_profile_inserted(&event).await,
        };

        match result {
            Ok(outcome) => {
                info!(
                    table = table.as_str(),
                    id = %id,
                    sent = outcome.sent,
                    failed = outcome.failed,
                    "Finished handling new row"
                );
                outcome
            }
            Err(e) => {
                error!(
                    table = table.as_str(),
                    id = %id,
                    error = %format!("{:#}", e),
                    "Failed to handle new row"
                );
                HandlerOutcome::default()
            }
        }
    }

    async fn on_application_inserted(&self, event: &ChangeEvent) -> Result<HandlerOutcome> {
        let application: Application = decode_record(event)?;

        let job = self
            .records
            .job_with_company(&application.job_id)
            .await?
            .with_context(|| format!("Job {} not found", application.job_id))?;
        // Each read only gates the email that needs it
        let applicant = self.read_profile(&application.applicant_id, "applicant").await;
        let employer = match job.employer_id.as_deref() {
            Some(employer_id) => self.read_profile(employer_id, "employer").await,
            None => None,
        };

        let mut outcome = HandlerOutcome::default();

        let applicant_name = applicant.as_ref().and_then(|a| a.full_name.clone());
        let applicant_email = applicant.as_ref().and_then(|a| a.email());

        match applicant_email {
            Some(email) => {
                let data = ApplicationConfirmationData {
                    applicant_email: email.to_string(),
                    applicant_name: applicant_name.clone(),
                    job_title: job.title.clone(),
                    company_name: job.company_name().map(str::to_string),
                };
                let result = self.notifications.send_application_confirmation(&data).await;
                outcome.record("application_confirmation", result);
            }
            None => warn!(
                profile_id = %application.applicant_id,
                "Applicant email unavailable, skipping confirmation"
            ),
        }

        match employer.as_ref().and_then(|e| e.email().map(|email| (e, email))) {
            Some((employer, email)) => {
                let data = ApplicationNotificationData {
                    employer_email: email.to_string(),
                    employer_name: employer.full_name.clone(),
                    applicant_name,
                    applicant_email: applicant_email.map(str::to_string),
                    job_title: job.title.clone(),
                    company_name: job.company_name().map(str::to_string),
                    cover_letter: application.cover_letter.clone(),
                    resume_url: application.resume_url.clone(),
                };
                let result = self.notifications.send_application_notification(&data).await;
                outcome.record("application_notification", result);
            }
            None => warn!(job_id = %job.id, "Employer email unavailable, skipping notification"),
        }

        Ok(outcome)
    }

    /// Profile lookup that logs read failures instead of propagating them
    async fn read_profile(&self, id: &str, party: &str) -> Option<Profile> {
        match self.records.profile(id).await {
            Ok(profile) => profile,
            Err(e) => {
                error!(
                    profile_id = %id,
                    party = party,
                    error = %format!("{:#}", e),
                    "Failed to read profile"
                );
                None
            }
        }
    }

    async fn on_job_inserted(&self, event: &ChangeEvent) -> Result<HandlerOutcome> {
        let inserted: Job = decode_record(event)?;

        // The insert payload has no join; fetch the company name
        let job = self
            .records
            .job_with_company(&inserted.id)
            .await?
            .unwrap_or(inserted);

        let employer_id = job
            .employer_id
            .as_deref()
            .with_context(|| format!("Job {} has no employer", job.id))?;
        let employer = self
            .records
            .profile(employer_id)
            .await?
            .with_context(|| format!("Employer profile {} not found", employer_id))?;
        let email = employer
            .email()
            .with_context(|| format!("Employer {} has no email", employer.id))?;

        let data = JobPostedData {
            employer_email: email.to_string(),
            employer_name: employer.full_name.clone(),
            job_title: job.title.clone(),
            company_name: job.company_name().map(str::to_string),
            location: job.location.clone(),
            slug: job.slug.clone(),
        };

        let mut outcome = HandlerOutcome::default();
        let result = self.notifications.send_job_posted(&data).await;
        outcome.record("job_posted", result);
        Ok(outcome)
    }

    async fn on_profile_inserted(&self, event: &ChangeEvent) -> Result<HandlerOutcome> {
        let inserted: Profile = decode_record(event)?;

        let profile = if inserted.email().is_some() {
            inserted
        } else {
            self.records.profile(&inserted.id).await?.unwrap_or(inserted)
        };

        let mut outcome = HandlerOutcome::default();
        let Some(email) = profile.email() else {
            warn!(profile_id = %profile.id, "New profile has no email, skipping welcome");
            return Ok(outcome);
        };

        let welcome = WelcomeData {
            email: email.to_string(),
            full_name: profile.full_name.clone(),
            role: profile.role(),
        };
        let result = self.notifications.send_welcome(&welcome).await;
        outcome.record("welcome", result);

        if self.notifications.admin_address().is_some() {
            let alert = SignupAlertData {
                email: email.to_string(),
                full_name: profile.full_name.clone(),
                role: profile.role(),
            };
            let result = self
                .notifications
                .send_signup_alert(&alert)
                .await
                .map(Option::unwrap_or_default);
            outcome.record("new_signup", result);
        }

        Ok(outcome)
    }
}

fn decode_record<T: DeserializeOwned>(event: &ChangeEvent) -> Result<T> {
    serde_json::from_value(event.record.clone())
        .with_context(|| format!("Malformed {} record", event.table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::testing::{service, RecordingMailer};
    use crate::supabase::testing::MemoryRecords;
    use serde_json::json;

    fn records() -> MemoryRecords {
        MemoryRecords::default()
            .with_profile("seeker-1", Some("ada@example.com"), "Ada Lovelace", "job_seeker")
            .with_profile("boss-1", Some("boss@example.com"), "Bill Lumbergh", "employer")
            .with_job("job-1", "Rust Developer", "boss-1", "Initech")
    }

    fn listener(mailer: Arc<RecordingMailer>, records: MemoryRecords, admin: Option<&str>) -> ChangeListener {
        ChangeListener::new(Arc::new(service(mailer, admin)), Arc::new(records))
    }

    #[test]
    fn test_watched_tables() {
        assert_eq!(WatchedTable::names(), vec!["applications", "jobs", "profiles"]);
        assert_eq!(WatchedTable::from_table("jobs"), Some(WatchedTable::Jobs));
        assert_eq!(WatchedTable::from_table("blog_posts"), None);
    }

    #[tokio::test]
    async fn test_application_insert_notifies_both_sides() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = listener(mailer.clone(), records(), None);

        let event = ChangeEvent::insert(
            "applications",
            json!({
                "id": "app-1",
                "job_id": "job-1",
                "applicant_id": "seeker-1",
                "cover_letter": "<p>Hello <em>there</em></p>",
                "status": "pending"
            }),
        );
        let outcome = listener.handle(event).await;
        assert_eq!(outcome, HandlerOutcome { sent: 2, failed: 0 });

        let confirmation = mailer.sent_to("ada@example.com");
        assert_eq!(confirmation.len(), 1);
        assert_eq!(
            confirmation[0].subject,
            "Application received: Rust Developer at Initech"
        );

        let notification = mailer.sent_to("boss@example.com");
        assert_eq!(notification.len(), 1);
        assert!(notification[0].text.contains("Ada Lovelace just applied for Rust Developer."));
        assert!(notification[0].text.contains("Hello there"));
    }

    #[tokio::test]
    async fn test_employer_failure_does_not_block_applicant() {
        let mailer = Arc::new(RecordingMailer::failing_for(&["boss@example.com"]));
        let listener = listener(mailer.clone(), records(), None);

        let event = ChangeEvent::insert(
            "applications",
            json!({"id": "app-1", "job_id": "job-1", "applicant_id": "seeker-1"}),
        );
        let outcome = listener.handle(event).await;
        assert_eq!(outcome, HandlerOutcome { sent: 1, failed: 1 });
        assert_eq!(mailer.sent_to("ada@example.com").len(), 1);
        assert!(mailer.sent_to("boss@example.com").is_empty());
    }

    #[tokio::test]
    async fn test_application_for_missing_job_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = listener(mailer.clone(), records(), None);

        let event = ChangeEvent::insert(
            "applications",
            json!({"id": "app-2", "job_id": "job-404", "applicant_id": "seeker-1"}),
        );
        assert_eq!(listener.handle(event).await, HandlerOutcome::default());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_applicant_still_notifies_employer() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = listener(mailer.clone(), records(), None);

        let event = ChangeEvent::insert(
            "applications",
            json!({"id": "app-3", "job_id": "job-1", "applicant_id": "ghost"}),
        );
        let outcome = listener.handle(event).await;
        assert_eq!(outcome, HandlerOutcome { sent: 1, failed: 0 });
        assert_eq!(mailer.sent_to("boss@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_profile_read_failure_only_skips_dependent_email() {
        // Employer profile read fails: the applicant is still confirmed
        let mailer = Arc::new(RecordingMailer::new());
        let employer_down = listener(mailer.clone(), records().with_unavailable_profile("boss-1"), None);
        let event = ChangeEvent::insert(
            "applications",
            json!({"id": "app-4", "job_id": "job-1", "applicant_id": "seeker-1"}),
        );
        let outcome = employer_down.handle(event).await;
        assert_eq!(outcome, HandlerOutcome { sent: 1, failed: 0 });
        assert_eq!(mailer.sent_to("ada@example.com").len(), 1);

        // Applicant profile read fails: the employer is still notified
        let mailer = Arc::new(RecordingMailer::new());
        let applicant_down = listener(mailer.clone(), records().with_unavailable_profile("seeker-1"), None);
        let event = ChangeEvent::insert(
            "applications",
            json!({"id": "app-5", "job_id": "job-1", "applicant_id": "seeker-1"}),
        );
        let outcome = applicant_down.handle(event).await;
        assert_eq!(outcome, HandlerOutcome { sent: 1, failed: 0 });
        assert_eq!(mailer.sent_to("boss@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_job_insert_notifies_employer() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = listener(mailer.clone(), records(), None);

        let event = ChangeEvent::insert(
            "jobs",
            json!({"id": "job-1", "title": "Rust Developer", "employer_id": "boss-1"}),
        );
        let outcome = listener.handle(event).await;
        assert_eq!(outcome.sent, 1);

        let sent = mailer.sent_to("boss@example.com");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Your job posting is live: Rust Developer");
        assert!(sent[0]
            .text
            .contains("https://jobs.example.com/jobs/rust-developer-initech"));
    }

    #[tokio::test]
    async fn test_profile_insert_sends_welcome_and_admin_alert() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = listener(mailer.clone(), records(), Some("admin@example.com"));

        let event = ChangeEvent::insert(
            "profiles",
            json!({"id": "new-1", "email": "new@example.com", "full_name": "Grace", "role": "employer"}),
        );
        let outcome = listener.handle(event).await;
        assert_eq!(outcome, HandlerOutcome { sent: 2, failed: 0 });

        let welcome = mailer.sent_to("new@example.com");
        assert_eq!(welcome.len(), 1);
        assert!(welcome[0].subject.contains("Welcome"));
        assert!(welcome[0].text.contains("/post-job"));
        assert_eq!(mailer.sent_to("admin@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_profile_without_email_is_reread() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = listener(mailer.clone(), records(), None);

        let event = ChangeEvent::insert("profiles", json!({"id": "seeker-1", "full_name": "Ada"}));
        let outcome = listener.handle(event).await;
        assert_eq!(outcome.sent, 1);
        assert_eq!(mailer.sent_to("ada@example.com").len(), 1);

        let unknown = ChangeEvent::insert("profiles", json!({"id": "ghost"}));
        assert_eq!(listener.handle(unknown).await, HandlerOutcome::default());
    }

    #[tokio::test]
    async fn test_ignored_events() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = listener(mailer.clone(), records(), None);

        let mut update = ChangeEvent::insert("jobs", json!({"id": "job-1", "title": "x"}));
        update.kind = ChangeKind::Update;
        listener.handle(update).await;

        listener
            .handle(ChangeEvent::insert("blog_posts", json!({"id": "p-1"})))
            .await;
        listener
            .handle(ChangeEvent::insert("jobs", json!({"unexpected": true})))
            .await;

        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_run_spawns_handlers_until_channel_closes() {
        let mailer = Arc::new(RecordingMailer::new());
        let listener = Arc::new(listener(mailer.clone(), records(), None));
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(listener.run(rx));
        tx.send(ChangeEvent::insert(
            "profiles",
            json!({"id": "x-1", "email": "x@example.com"}),
        ))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        // Spawned handler tasks may still be finishing
        for _ in 0..50 {
            if !mailer.sent().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(mailer.sent_to("x@example.com").len(), 1);
    }
}
