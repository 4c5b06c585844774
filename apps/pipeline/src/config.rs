use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ingestion::ImapSettings;

/// Outbound HTTP email API credentials.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub s3_public_url: Option<String>,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: Option<String>,
    pub imap: Option<ImapSettings>,
    pub mail: Option<MailSettings>,
    pub hr_fallback_email: String,
    pub mailbox_poll: Duration,
    pub deadline_sweep: Duration,
    pub report_sweep: Duration,
    pub report_batch_size: i64,
    pub report_concurrency: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_public_url: optional_env("S3_PUBLIC_URL"),
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            imap: imap_from_env()?,
            mail: mail_from_env(),
            hr_fallback_email: optional_env("HR_FALLBACK_EMAIL")
                .unwrap_or_else(|| "hr@example.com".to_string()),
            mailbox_poll: Duration::from_secs(parse_env("MAILBOX_POLL_SECS", 120)?),
            deadline_sweep: Duration::from_secs(parse_env("DEADLINE_SWEEP_SECS", 300)?),
            report_sweep: Duration::from_secs(parse_env("REPORT_SWEEP_SECS", 600)?),
            report_batch_size: parse_env("REPORT_BATCH_SIZE", 5)?,
            report_concurrency: parse_env::<usize>("REPORT_CONCURRENCY", 2)?.clamp(1, 4),
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Base URL stored blobs are served from.
    pub fn blob_base_url(&self) -> String {
        self.s3_public_url.clone().unwrap_or_else(|| {
            format!("{}/{}", self.s3_endpoint.trim_end_matches('/'), self.s3_bucket)
        })
    }
}

/// The poller only runs when host, user and password are all present.
fn imap_from_env() -> Result<Option<ImapSettings>> {
    let (Some(host), Some(user), Some(password)) = (
        optional_env("IMAP_HOST"),
        optional_env("IMAP_USER"),
        optional_env("IMAP_PASSWORD"),
    ) else {
        return Ok(None);
    };
    Ok(Some(ImapSettings {
        host,
        port: parse_env("IMAP_PORT", 993)?,
        user,
        password,
        tls: parse_env("IMAP_TLS", true)?,
    }))
}

fn mail_from_env() -> Option<MailSettings> {
    let (Some(api_url), Some(api_key), Some(from)) = (
        optional_env("MAIL_API_URL"),
        optional_env("MAIL_API_KEY"),
        optional_env("MAIL_FROM"),
    ) else {
        return None;
    };
    Some(MailSettings {
        api_url,
        api_key,
        from,
    })
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank are treated the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
