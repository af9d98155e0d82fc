use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::metrics::EmployeeCensus;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    #[serde(default = "default_mail_api_url")]
    pub api_url: String,
    #[serde(default = "default_mail_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_min_ms")]
    pub retry_min_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigestConfig {
    #[serde(default = "default_digest_window_days")]
    pub window_days: i64,
    #[serde(default = "default_company_delay_ms")]
    pub company_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    #[serde(default = "default_view_window_days")]
    pub window_days: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub census: HashMap<String, u32>,
}

impl AppConfig {
    pub fn employee_census(&self) -> EmployeeCensus {
        EmployeeCensus::new(self.census.clone())
    }

    /// `DATABASE_URL` wins over the file.
    pub fn database_url(&self) -> anyhow::Result<String> {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Ok(url),
            _ if !self.database.url.trim().is_empty() => Ok(self.database.url.clone()),
            _ => anyhow::bail!("DATABASE_URL must be set to the hosted Postgres instance"),
        }
    }

    pub fn mail_api_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.mail.api_key_env)
            .with_context(|| format!("{} must hold the email API key", self.mail.api_key_env))
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(1.0))
    }

    /// Retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// `(min, max)` backoff between attempts.
    pub fn retry_bounds(&self) -> (Duration, Duration) {
        let min = Duration::from_millis(self.retry_min_ms.max(1));
        (min, Duration::from_millis(self.retry_max_ms).max(min))
    }
}

impl DigestConfig {
    pub fn company_delay(&self) -> Duration {
        Duration::from_millis(self.company_delay_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: default_mail_api_url(),
            api_key_env: default_mail_api_key_env(),
            from: default_mail_from(),
            subject_prefix: default_subject_prefix(),
            timeout_seconds: default_timeout_seconds(),
            max_attempts: default_max_attempts(),
            retry_min_ms: default_retry_min_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            window_days: default_digest_window_days(),
            company_delay_ms: default_company_delay_ms(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            window_days: default_view_window_days(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_mail_api_url() -> String {
    "https://api.resend.com/emails".to_string()
}

fn default_mail_api_key_env() -> String {
    "MAIL_API_KEY".to_string()
}

fn default_mail_from() -> String {
    "Safety Reports <reports@example.com>".to_string()
}

fn default_subject_prefix() -> String {
    "Weekly Safety Scorecard".to_string()
}

fn default_timeout_seconds() -> f64 {
    30.0
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_min_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_digest_window_days() -> i64 {
    7
}

fn default_company_delay_ms() -> u64 {
    1_000
}

fn default_view_window_days() -> i64 {
    30
}

/// CLI flag, then `SCORECARD_CONFIG`, then `scorecard.toml` in the working
/// directory. `None` means run on defaults.
pub fn resolve_config_path(cli: Option<PathBuf>) -> Option<PathBuf> {
    if cli.is_some() {
        return cli;
    }
    if let Some(value) = std::env::var_os("SCORECARD_CONFIG") {
        return Some(PathBuf::from(value));
    }
    let local = PathBuf::from("scorecard.toml");
    local.exists().then_some(local)
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
    let cfg: AppConfig = toml::from_str(&content).context("failed to parse TOML config")?;
    Ok(normalize_config(cfg))
}

fn normalize_config(mut cfg: AppConfig) -> AppConfig {
    cfg.mail.max_attempts = cfg.mail.max_attempts.max(1);
    cfg.mail.retry_max_ms = cfg.mail.retry_max_ms.max(cfg.mail.retry_min_ms);
    cfg.digest.window_days = cfg.digest.window_days.max(1);
    cfg.view.window_days = cfg.view.window_days.max(1);
    cfg
}
