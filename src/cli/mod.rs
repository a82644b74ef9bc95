//! Command-line interface for the relay.
//!
//! Without a subcommand the binary serves the HTTP API and the realtime
//! listener. Subcommands:
//! - `send-test <to>` - deliver the test message through the configured SMTP server
//! - `config check` - print the effective configuration and its problems

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::notifications::NotificationService;

#[derive(Parser, Debug)]
#[command(name = "jobboard-relay")]
#[command(author, version, about = "Email and realtime notification relay for the job board", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Skip startup self-checks
    #[arg(long)]
    pub skip_checks: bool,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send the test email to an address and exit
    SendTest {
        /// Recipient address
        to: String,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate the effective configuration
    Check,
}

/// Run a CLI subcommand. Serving is handled in main.rs.
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::SendTest { to }) => cmd_send_test(config, to).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli, config),
        None => Ok(()),
    }
}

async fn cmd_send_test(config: &Config, to: &str) -> Result<()> {
    let notifications = NotificationService::from_config(config)?;

    println!("Sending test email to {}...", to);
    let message_id = notifications
        .send_test(to)
        .await
        .context("Test email was not delivered")?;

    println!("[OK] Test email sent");
    println!("Message ID: {}", message_id);
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "Enabled"
    } else {
        "Disabled"
    }
}

fn cmd_config_check(cli: &Cli, config: &Config) -> Result<()> {
    println!("Checking configuration: {}", cli.config.display());
    if !cli.config.exists() {
        println!("  (file not found, using defaults and environment)");
    }
    println!();

    println!("Server:");
    println!("  Listen:       {}:{}", config.server.host, config.server.port);
    println!("  Environment:  {}", config.environment);
    println!("  Log Level:    {}", config.logging.level);
    println!();
    println!("SMTP:");
    println!("  Host:         {}", config.smtp.host.as_deref().unwrap_or("-"));
    println!("  Port:         {}", config.smtp.port);
    println!("  Implicit TLS: {}", enabled(config.smtp.secure));
    println!(
        "  Auth:         {}",
        enabled(config.smtp.username.is_some())
    );
    println!(
        "  From:         {} <{}>",
        config.email.from_name,
        config.email.from_address.as_deref().unwrap_or("-")
    );
    println!(
        "  Admin:        {}",
        config.email.admin_address.as_deref().unwrap_or("-")
    );
    println!();
    println!("Supabase:");
    println!("  URL:          {}", config.supabase.url.as_deref().unwrap_or("-"));
    println!(
        "  Service Key:  {}",
        if config.supabase.service_key.is_some() {
            "set"
        } else {
            "missing"
        }
    );
    println!("  Realtime:     {}", enabled(config.supabase.realtime_enabled));
    println!();
    println!("Frontend:       {}", config.frontend.base_url());
    println!("API Key:        {}", enabled(config.auth.api_key.is_some()));
    println!();

    let problems = config.validate();
    if problems.is_empty() {
        println!("[OK] Configuration is valid");
        return Ok(());
    }

    println!("Problems:");
    for problem in &problems {
        println!("  [!!] {}", problem);
    }
    println!();
    anyhow::bail!("{} configuration problem(s) found", problems.len())
}
