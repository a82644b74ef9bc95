//! Startup self-checks
//!
//! Run before the relay starts accepting requests:
//! - Configuration problems (critical in production)
//! - SMTP server reachability and login
//! - Supabase REST reachability with the service key

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::notifications::Mailer;
use crate::supabase::SupabaseClient;

/// Result of a single startup check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// Failure aborts startup
    pub critical: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            critical: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            passed: false,
            critical,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupCheckReport {
    pub checks: Vec<CheckResult>,
    pub all_critical_passed: bool,
    pub all_passed: bool,
    pub summary: String,
}

impl StartupCheckReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let all_critical_passed = checks.iter().filter(|c| c.critical).all(|c| c.passed);
        let all_passed = checks.iter().all(|c| c.passed);

        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();
        let failed_critical = checks.iter().filter(|c| c.critical && !c.passed).count();

        let summary = if all_passed {
            format!("All {} startup checks passed", total)
        } else if all_critical_passed {
            format!(
                "{}/{} checks passed ({} warnings)",
                passed,
                total,
                total - passed
            )
        } else {
            format!(
                "{}/{} checks passed ({} critical failures)",
                passed, total, failed_critical
            )
        };

        Self {
            checks,
            all_critical_passed,
            all_passed,
            summary,
        }
    }
}

pub async fn run_startup_checks(
    config: &Config,
    mailer: &dyn Mailer,
    supabase: Option<&SupabaseClient>,
) -> StartupCheckReport {
    info!("Running startup self-checks...");

    let checks = vec![
        check_configuration(config),
        check_smtp(mailer).await,
        check_supabase(supabase).await,
    ];

    let report = StartupCheckReport::new(checks);

    for check in &report.checks {
        if check.passed {
            info!(check = %check.name, message = %check.message, "Startup check PASSED");
        } else if check.critical {
            error!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (CRITICAL)"
            );
        } else {
            warn!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (non-critical)"
            );
        }
    }

    info!(
        summary = %report.summary,
        all_passed = report.all_passed,
        all_critical_passed = report.all_critical_passed,
        "Startup checks completed"
    );

    report
}

/// Production refuses to start with configuration problems
fn check_configuration(config: &Config) -> CheckResult {
    let problems = config.validate();
    if problems.is_empty() {
        return CheckResult::pass("configuration", "Configuration is complete");
    }

    CheckResult::fail(
        "configuration",
        format!("{} configuration problem(s)", problems.len()),
        config.environment.is_production(),
    )
    .with_details(problems.join("; "))
}

async fn check_smtp(mailer: &dyn Mailer) -> CheckResult {
    match mailer.verify().await {
        Ok(()) => CheckResult::pass("smtp", "SMTP server accepted the connection"),
        Err(e) => CheckResult::fail("smtp", "SMTP server is not reachable", false)
            .with_details(e.to_string()),
    }
}

async fn check_supabase(client: Option<&SupabaseClient>) -> CheckResult {
    let Some(client) = client else {
        return CheckResult::fail(
            "supabase",
            "Supabase is not configured; realtime notifications are disabled",
            false,
        );
    };

    match client.ping().await {
        Ok(()) => CheckResult::pass("supabase", format!("Supabase reachable at {}", client.base_url())),
        Err(e) => CheckResult::fail("supabase", "Supabase REST API is not reachable", false)
            .with_details(format!("{:#}", e)),
    }
}
