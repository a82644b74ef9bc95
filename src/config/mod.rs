use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

#[derive(Clone, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. https://abcd.supabase.co
    pub url: Option<String>,
    /// Service-role key; bypasses row level security for the follow-up reads
    pub service_key: Option<String>,
    /// Subscribe to the realtime change feed (default: true)
    #[serde(default = "default_true")]
    pub realtime_enabled: bool,
    /// Seconds between Phoenix heartbeats (default: 30)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Base delay in seconds before reconnecting a dropped socket (default: 5)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
}

impl SupabaseConfig {
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.service_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_key", &self.service_key.as_ref().map(|_| "********"))
            .field("realtime_enabled", &self.realtime_enabled)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            realtime_enabled: true,
            heartbeat_interval: default_heartbeat_interval(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    5
}

#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Implicit TLS (SMTPS). When false the connection upgrades with STARTTLS if offered.
    #[serde(default)]
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// SMTP command timeout in seconds (default: 30)
    #[serde(default = "default_smtp_timeout")]
    pub timeout: u64,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        self.host.as_deref().is_some_and(|h| !h.is_empty())
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            secure: false,
            username: None,
            password: None,
            timeout: default_smtp_timeout(),
        }
    }
}

// Keeps the password out of logs and `config check` output.
impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_from_name")]
    pub from_name: String,
    pub from_address: Option<String>,
    /// Defaults to the from address
    pub reply_to: Option<String>,
    /// Receives an alert for every new signup when set
    pub admin_address: Option<String>,
}

impl EmailConfig {
    pub fn reply_to_address(&self) -> Option<&str> {
        self.reply_to
            .as_deref()
            .filter(|r| !r.is_empty())
            .or(self.from_address.as_deref())
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_name: default_from_name(),
            from_address: None,
            reply_to: None,
            admin_address: None,
        }
    }
}

fn default_from_name() -> String {
    "Job Board".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_url")]
    pub url: String,
}

impl FrontendConfig {
    /// Frontend URL without a trailing slash, ready for path joins
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: default_frontend_url(),
        }
    }
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for the POST endpoints. Open endpoints when unset.
    pub api_key: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "********"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl Config {
    /// Load the TOML file (if present) and overlay the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults and environment");
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment variables on top of the current values.
    ///
    /// `lookup` abstracts `std::env::var` so the mapping can be tested without
    /// touching the process environment. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got {:?}", port))?;
        }

        if let Some(url) = get("SUPABASE_URL") {
            self.supabase.url = Some(url);
        }
        if let Some(key) = get("SUPABASE_SERVICE_KEY") {
            self.supabase.service_key = Some(key);
        }
        if let Some(enabled) = get("REALTIME_ENABLED") {
            self.supabase.realtime_enabled = parse_bool("REALTIME_ENABLED", &enabled)?;
        }

        if let Some(host) = get("SMTP_HOST") {
            self.smtp.host = Some(host);
        }
        if let Some(port) = get("SMTP_PORT") {
            self.smtp.port = port.trim().parse().with_context(|| {
                format!("SMTP_PORT must be a valid port number, got {:?}", port)
            })?;
        }
        if let Some(secure) = get("SMTP_SECURE") {
            self.smtp.secure = parse_bool("SMTP_SECURE", &secure)?;
        }
        if let Some(user) = get("SMTP_USER") {
            self.smtp.username = Some(user);
        }
        if let Some(pass) = get("SMTP_PASS") {
            self.smtp.password = Some(pass);
        }

        if let Some(name) = get("EMAIL_FROM_NAME") {
            self.email.from_name = name;
        }
        if let Some(address) = get("EMAIL_FROM_ADDRESS") {
            self.email.from_address = Some(address);
        }
        if let Some(reply_to) = get("EMAIL_REPLY_TO") {
            self.email.reply_to = Some(reply_to);
        }
        if let Some(admin) = get("ADMIN_EMAIL") {
            self.email.admin_address = Some(admin);
        }

        if let Some(url) = get("FRONTEND_URL") {
            self.frontend.url = url;
        }
        if let Some(key) = get("RELAY_API_KEY") {
            self.auth.api_key = Some(key);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(env) = get("NODE_ENV") {
            self.environment = Environment::parse(&env);
        }

        Ok(())
    }

    /// Problems that make the relay unable to deliver mail or listen for events.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !self.smtp.is_configured() {
            problems.push("SMTP_HOST is not set; emails cannot be sent".to_string());
        }
        if self.email.from_address.as_deref().map_or(true, str::is_empty) {
            problems.push("EMAIL_FROM_ADDRESS is not set".to_string());
        }
        if self.smtp.username.is_some() != self.smtp.password.is_some() {
            problems.push("SMTP_USER and SMTP_PASS must be set together".to_string());
        }
        if self.supabase.realtime_enabled && !self.supabase.is_configured() {
            problems.push(
                "SUPABASE_URL and SUPABASE_SERVICE_KEY are required for realtime notifications"
                    .to_string(),
            );
        }
        if let Some(url) = self.supabase.url.as_deref() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                problems.push(format!("SUPABASE_URL must be an http(s) URL, got {}", url));
            }
        }
        if !self.frontend.url.starts_with("http://") && !self.frontend.url.starts_with("https://")
        {
            problems.push(format!(
                "FRONTEND_URL must be an http(s) URL, got {}",
                self.frontend.url
            ));
        }
        if self.environment.is_production() && self.auth.api_key.is_none() {
            problems.push("RELAY_API_KEY is not set; POST endpoints are unauthenticated".to_string());
        }

        problems
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got {:?}", key, other),
    }
}
