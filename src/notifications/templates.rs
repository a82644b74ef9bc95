//! HTML and plain text renderers for the relay's transactional emails.
//!
//! Every template produces both variants from the same fields. User supplied
//! values (names, titles, cover letters) are escaped in the HTML variant.

use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::{capitalize, generate_slug, html_escape, strip_html_tags_keep_lines};

/// Account role as stored on the profile row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    JobSeeker,
    Employer,
    Admin,
}

impl UserRole {
    /// Parse a role column value; anything unknown is a job seeker
    pub fn from_db(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("employer") => UserRole::Employer,
            Some("admin") => UserRole::Admin,
            _ => UserRole::JobSeeker,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UserRole::JobSeeker => "job seeker",
            UserRole::Employer => "employer",
            UserRole::Admin => "admin",
        }
    }
}

/// Lenient like the database column: unknown or null roles are job seekers
impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(UserRole::from_db(value.as_deref()))
    }
}

/// Subject and both bodies of a rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Site-wide values interpolated into every template
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub site_name: String,
    pub frontend_url: String,
}

impl TemplateContext {
    pub fn new(site_name: impl Into<String>, frontend_url: &str) -> Self {
        Self {
            site_name: site_name.into(),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    fn link(&self, path: &str) -> String {
        format!("{}{}", self.frontend_url, path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeData {
    pub email: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfirmationData {
    pub applicant_email: String,
    pub applicant_name: Option<String>,
    pub job_title: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationNotificationData {
    pub employer_email: String,
    pub employer_name: Option<String>,
    pub applicant_name: Option<String>,
    pub applicant_email: Option<String>,
    pub job_title: String,
    pub company_name: Option<String>,
    pub cover_letter: Option<String>,
    pub resume_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPostedData {
    pub employer_email: String,
    pub employer_name: Option<String>,
    pub job_title: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    /// Explicit slug; derived from title and company when absent
    pub slug: Option<String>,
}

impl JobPostedData {
    fn slug(&self) -> String {
        self.slug
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| generate_slug(&self.job_title, self.company_name.as_deref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupAlertData {
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
}

fn display_name(name: Option<&str>, fallback: &str) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn company_or_default(company: Option<&str>) -> String {
    display_name(company, "the hiring company")
}

pub fn welcome(ctx: &TemplateContext, data: &WelcomeData) -> RenderedEmail {
    let name = display_name(data.full_name.as_deref(), "there");
    let (intro, cta_label, cta_path) = match data.role {
        UserRole::Employer => (
            "Your employer account is ready. Create your company profile and post your first job to start receiving applications.",
            "Post a job",
            "/post-job",
        ),
        UserRole::Admin => (
            "Your admin account is ready. You can manage listings, companies and blog content from the dashboard.",
            "Open dashboard",
            "/dashboard",
        ),
        UserRole::JobSeeker => (
            "Your account is ready. Browse open positions, save the ones you like and apply in a few clicks.",
            "Browse jobs",
            "/jobs",
        ),
    };
    let cta_url = ctx.link(cta_path);

    let subject = format!("Welcome to {}, {}!", ctx.site_name, name);

    let body = format!(
        r#"<p>Hi {name},</p>
                <p>Welcome to <strong>{site}</strong>! {intro}</p>
                {cta}
                <p>If you have any questions, just reply to this email.</p>"#,
        name = html_escape(&name),
        site = html_escape(&ctx.site_name),
        intro = intro,
        cta = html_button(cta_label, &cta_url),
    );

    let text = format!(
        "Hi {name},\n\nWelcome to {site}! {intro}\n\n{cta_label}: {cta_url}\n\nIf you have any questions, just reply to this email.",
        name = name,
        site = ctx.site_name,
        intro = intro,
        cta_label = cta_label,
        cta_url = cta_url,
    );

    RenderedEmail {
        html: wrap_html(ctx, &format!("Welcome to {}", ctx.site_name), &body),
        text: wrap_text(ctx, &format!("Welcome to {}", ctx.site_name), &text),
        subject,
    }
}

pub fn application_confirmation(
    ctx: &TemplateContext,
    data: &ApplicationConfirmationData,
) -> RenderedEmail {
    let name = display_name(data.applicant_name.as_deref(), "there");
    let company = company_or_default(data.company_name.as_deref());
    let dashboard_url = ctx.link("/dashboard");

    let subject = format!("Application received: {} at {}", data.job_title, company);

    let body = format!(
        r#"<p>Hi {name},</p>
                <p>Thanks for applying! Your application for <strong>{title}</strong> at <strong>{company}</strong> has been submitted.</p>
                <div class="highlight">
                    <div class="highlight-row"><span class="highlight-label">Position</span> <span class="highlight-value">{title}</span></div>
                    <div class="highlight-row"><span class="highlight-label">Company</span> <span class="highlight-value">{company}</span></div>
                </div>
                <p>The employer will review your application and reach out if there is a match. You can follow its status from your dashboard.</p>
                {cta}"#,
        name = html_escape(&name),
        title = html_escape(&data.job_title),
        company = html_escape(&company),
        cta = html_button("View my applications", &dashboard_url),
    );

    let text = format!(
        "Hi {name},\n\nThanks for applying! Your application for {title} at {company} has been submitted.\n\nPosition: {title}\nCompany: {company}\n\nThe employer will review your application and reach out if there is a match. You can follow its status from your dashboard:\n{url}",
        name = name,
        title = data.job_title,
        company = company,
        url = dashboard_url,
    );

    RenderedEmail {
        html: wrap_html(ctx, "Application received", &body),
        text: wrap_text(ctx, "Application received", &text),
        subject,
    }
}

pub fn application_notification(
    ctx: &TemplateContext,
    data: &ApplicationNotificationData,
) -> RenderedEmail {
    let employer = display_name(data.employer_name.as_deref(), "there");
    let applicant = display_name(data.applicant_name.as_deref(), "A candidate");
    let dashboard_url = ctx.link("/dashboard");
    let cover_letter = data
        .cover_letter
        .as_deref()
        .map(strip_html_tags_keep_lines)
        .filter(|c| !c.is_empty());

    let subject = format!("New application for {}", data.job_title);

    let mut details = format!(
        r#"<div class="highlight-row"><span class="highlight-label">Position</span> <span class="highlight-value">{title}</span></div>
                    <div class="highlight-row"><span class="highlight-label">Applicant</span> <span class="highlight-value">{applicant}</span></div>"#,
        title = html_escape(&data.job_title),
        applicant = html_escape(&applicant),
    );
    let mut text_details = format!("Position: {}\nApplicant: {}", data.job_title, applicant);

    if let Some(email) = data.applicant_email.as_deref().filter(|e| !e.is_empty()) {
        details.push_str(&format!(
            r#"
                    <div class="highlight-row"><span class="highlight-label">Email</span> <span class="highlight-value"><a href="mailto:{email}">{email}</a></span></div>"#,
            email = html_escape(email),
        ));
        text_details.push_str(&format!("\nEmail: {}", email));
    }
    if let Some(url) = data.resume_url.as_deref().filter(|u| !u.is_empty()) {
        details.push_str(&format!(
            r#"
                    <div class="highlight-row"><span class="highlight-label">Resume</span> <span class="highlight-value"><a href="{url}">Download resume</a></span></div>"#,
            url = html_escape(url),
        ));
        text_details.push_str(&format!("\nResume: {}", url));
    }

    let cover_html = cover_letter
        .as_deref()
        .map(|c| {
            format!(
                r#"<p><strong>Cover letter</strong></p>
                <blockquote class="quote">{}</blockquote>"#,
                html_escape(c).replace('\n', "<br>")
            )
        })
        .unwrap_or_default();
    let cover_text = cover_letter
        .as_deref()
        .map(|c| format!("\n\nCover letter:\n{}", c))
        .unwrap_or_default();

    let body = format!(
        r#"<p>Hi {employer},</p>
                <p><strong>{applicant}</strong> just applied for <strong>{title}</strong>.</p>
                <div class="highlight">
                    {details}
                </div>
                {cover}
                {cta}"#,
        employer = html_escape(&employer),
        applicant = html_escape(&applicant),
        title = html_escape(&data.job_title),
        details = details,
        cover = cover_html,
        cta = html_button("Review application", &dashboard_url),
    );

    let text = format!(
        "Hi {employer},\n\n{applicant} just applied for {title}.\n\n{details}{cover}\n\nReview the application in your dashboard:\n{url}",
        employer = employer,
        applicant = applicant,
        title = data.job_title,
        details = text_details,
        cover = cover_text,
        url = dashboard_url,
    );

    RenderedEmail {
        html: wrap_html(ctx, "New application", &body),
        text: wrap_text(ctx, "New application", &text),
        subject,
    }
}

pub fn job_posted(ctx: &TemplateContext, data: &JobPostedData) -> RenderedEmail {
    let employer = display_name(data.employer_name.as_deref(), "there");
    let company = company_or_default(data.company_name.as_deref());
    let job_url = ctx.link(&format!("/jobs/{}", data.slug()));

    let subject = format!("Your job posting is live: {}", data.job_title);

    let location_html = data
        .location
        .as_deref()
        .filter(|l| !l.is_empty())
        .map(|l| {
            format!(
                r#"
                    <div class="highlight-row"><span class="highlight-label">Location</span> <span class="highlight-value">{}</span></div>"#,
                html_escape(l)
            )
        })
        .unwrap_or_default();
    let location_text = data
        .location
        .as_deref()
        .filter(|l| !l.is_empty())
        .map(|l| format!("\nLocation: {}", l))
        .unwrap_or_default();

    let body = format!(
        r#"<p>Hi {employer},</p>
                <p>Your job posting <strong>{title}</strong> is now live and visible to job seekers.</p>
                <div class="highlight">
                    <div class="highlight-row"><span class="highlight-label">Position</span> <span class="highlight-value">{title}</span></div>
                    <div class="highlight-row"><span class="highlight-label">Company</span> <span class="highlight-value">{company}</span></div>{location}
                </div>
                {cta}
                <p>We'll email you as soon as candidates apply.</p>"#,
        employer = html_escape(&employer),
        title = html_escape(&data.job_title),
        company = html_escape(&company),
        location = location_html,
        cta = html_button("View posting", &job_url),
    );

    let text = format!(
        "Hi {employer},\n\nYour job posting {title} is now live and visible to job seekers.\n\nPosition: {title}\nCompany: {company}{location}\n\nView posting: {url}\n\nWe'll email you as soon as candidates apply.",
        employer = employer,
        title = data.job_title,
        company = company,
        location = location_text,
        url = job_url,
    );

    RenderedEmail {
        html: wrap_html(ctx, "Job posted", &body),
        text: wrap_text(ctx, "Job posted", &text),
        subject,
    }
}

/// Admin alert for a new signup
pub fn new_signup(ctx: &TemplateContext, data: &SignupAlertData) -> RenderedEmail {
    let name = display_name(data.full_name.as_deref(), "(no name)");
    let role = capitalize(data.role.label());

    let subject = format!("New {} signup: {}", data.role.label(), data.email);

    let body = format!(
        r#"<p>A new account was created on {site}.</p>
                <div class="highlight">
                    <div class="highlight-row"><span class="highlight-label">Name</span> <span class="highlight-value">{name}</span></div>
                    <div class="highlight-row"><span class="highlight-label">Email</span> <span class="highlight-value">{email}</span></div>
                    <div class="highlight-row"><span class="highlight-label">Role</span> <span class="highlight-value">{role}</span></div>
                </div>"#,
        site = html_escape(&ctx.site_name),
        name = html_escape(&name),
        email = html_escape(&data.email),
        role = role,
    );

    let text = format!(
        "A new account was created on {site}.\n\nName: {name}\nEmail: {email}\nRole: {role}",
        site = ctx.site_name,
        name = name,
        email = data.email,
        role = role,
    );

    RenderedEmail {
        html: wrap_html(ctx, "New signup", &body),
        text: wrap_text(ctx, "New signup", &text),
        subject,
    }
}

pub fn test_message(ctx: &TemplateContext, to: &str) -> RenderedEmail {
    let sent_at = chrono::Utc::now().to_rfc3339();
    let subject = format!("Test email from {}", ctx.site_name);

    let body = format!(
        r#"<p>This is a test email from the {site} notification relay.</p>
                <p>If you are reading this, SMTP delivery to <strong>{to}</strong> works.</p>
                <p class="note">Sent at {sent_at}</p>"#,
        site = html_escape(&ctx.site_name),
        to = html_escape(to),
        sent_at = sent_at,
    );

    let text = format!(
        "This is a test email from the {site} notification relay.\n\nIf you are reading this, SMTP delivery to {to} works.\n\nSent at {sent_at}",
        site = ctx.site_name,
        to = to,
        sent_at = sent_at,
    );

    RenderedEmail {
        html: wrap_html(ctx, "Test email", &body),
        text: wrap_text(ctx, "Test email", &text),
        subject,
    }
}

fn html_button(label: &str, url: &str) -> String {
    format!(
        r#"<div class="button-container"><a href="{url}" class="button">{label}</a></div>"#,
        url = html_escape(url),
        label = html_escape(label),
    )
}

/// Shared HTML layout. `body` must already be escaped.
fn wrap_html(ctx: &TemplateContext, heading: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{heading}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #f5f5f5;
        }}
        .container {{ max-width: 560px; margin: 0 auto; padding: 40px 20px; }}
        .card {{ background-color: #ffffff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0, 0, 0, 0.06); overflow: hidden; }}
        .header {{ background: linear-gradient(135deg, #4f46e5 0%, #4338ca 100%); color: white; padding: 32px 24px; text-align: center; }}
        .header h1 {{ margin: 0; font-size: 24px; font-weight: 600; }}
        .content {{ padding: 32px 24px; }}
        .content p {{ margin: 0 0 16px; color: #374151; line-height: 1.6; }}
        .highlight {{ background-color: #f3f4f6; border-radius: 6px; padding: 16px; margin: 20px 0; }}
        .highlight-row {{ padding: 8px 0; border-bottom: 1px solid #e5e7eb; }}
        .highlight-row:last-child {{ border-bottom: none; }}
        .highlight-label {{ color: #6b7280; font-size: 14px; }}
        .highlight-value {{ color: #111827; font-weight: 500; }}
        .quote {{ margin: 0 0 16px; padding: 12px 16px; border-left: 4px solid #4f46e5; color: #374151; background-color: #f9fafb; }}
        .button-container {{ text-align: center; margin: 32px 0; }}
        .button {{ display: inline-block; background: #4f46e5; color: white !important; text-decoration: none; padding: 14px 32px; border-radius: 6px; font-weight: 500; }}
        .note {{ color: #6b7280; font-size: 13px; text-align: center; }}
        .footer {{ padding: 24px; text-align: center; color: #9ca3af; font-size: 12px; border-top: 1px solid #f3f4f6; }}
        .footer a {{ color: #4f46e5; text-decoration: none; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <div class="header">
                <h1>{heading}</h1>
            </div>
            <div class="content">
                {body}
            </div>
            <div class="footer">
                <p>&copy; {year} <a href="{url}">{site}</a></p>
            </div>
        </div>
    </div>
</body>
</html>"#,
        heading = html_escape(heading),
        body = body,
        year = chrono::Utc::now().year(),
        url = html_escape(&ctx.frontend_url),
        site = html_escape(&ctx.site_name),
    )
}

fn wrap_text(ctx: &TemplateContext, heading: &str, body: &str) -> String {
    format!(
        "{heading}\n\n{body}\n\n---\n{site}\n{url}",
        heading = heading,
        body = body,
        site = ctx.site_name,
        url = ctx.frontend_url,
    )
}
