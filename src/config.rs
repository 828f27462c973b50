//! Runtime configuration, sourced from the environment (and `.env`).
//!
//! Credentials and the target site are deliberately not accepted as CLI
//! flags so they never end up in shell history.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::scrape::expand::ExpansionTuning;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set (export it or add it to .env)")]
    Missing(&'static str),
    #[error("{0} must be an absolute http(s) URL, got {1:?}")]
    BadUrl(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Community root, e.g. `https://example.mn.co`.
    pub site_url: String,
    /// Sign-in page. Defaults to `{site_url}/sign_in`.
    pub login_url: String,
    pub email: String,
    pub password: String,
    pub headless: bool,
    /// Per-action budget (navigation, settle polling).
    pub timeout: Duration,
    /// Base delay between UI actions.
    pub settle_delay: Duration,
    pub pagination_rounds: u32,
    pub expansion_rounds: u32,
    pub stall_rounds: u32,
    /// JSON captures land here; the vault lives in subdirectories.
    pub output_dir: PathBuf,
    pub auth_file: PathBuf,
}

impl Config {
    /// Read configuration from the process environment, loading `.env`
    /// first if one is present. Missing values fall back to defaults;
    /// call [`Config::validate`] before doing anything that needs
    /// credentials.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let site_url = trimmed_var("MAGPIE_SITE_URL").unwrap_or_default();
        let login_url =
            trimmed_var("MAGPIE_LOGIN_URL").unwrap_or_else(|| default_login_url(&site_url));

        Self {
            login_url,
            email: trimmed_var("MAGPIE_EMAIL").unwrap_or_default(),
            password: env::var("MAGPIE_PASSWORD").unwrap_or_default(),
            headless: bool_from(trimmed_var("MAGPIE_HEADLESS"), true),
            timeout: Duration::from_millis(u64_from(trimmed_var("MAGPIE_TIMEOUT_MS"), 30_000)),
            settle_delay: Duration::from_millis(u64_from(trimmed_var("MAGPIE_WAIT_MS"), 500)),
            pagination_rounds: u64_from(trimmed_var("MAGPIE_PAGINATION_ROUNDS"), 10) as u32,
            expansion_rounds: u64_from(trimmed_var("MAGPIE_EXPANSION_ROUNDS"), 8) as u32,
            stall_rounds: u64_from(trimmed_var("MAGPIE_STALL_ROUNDS"), 3) as u32,
            output_dir: PathBuf::from(
                trimmed_var("MAGPIE_OUTPUT_DIR").unwrap_or_else(|| "output".into()),
            ),
            auth_file: PathBuf::from(
                trimmed_var("MAGPIE_AUTH_FILE").unwrap_or_else(|| "auth.json".into()),
            ),
            site_url,
        }
    }

    /// Check that everything a scrape run needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_url.is_empty() {
            return Err(ConfigError::Missing("MAGPIE_SITE_URL"));
        }
        if !self.site_url.starts_with("http://") && !self.site_url.starts_with("https://") {
            return Err(ConfigError::BadUrl("MAGPIE_SITE_URL", self.site_url.clone()));
        }
        if self.email.is_empty() {
            return Err(ConfigError::Missing("MAGPIE_EMAIL"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("MAGPIE_PASSWORD"));
        }
        Ok(())
    }

    pub fn articles_dir(&self) -> PathBuf {
        self.output_dir.join("articles")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.output_dir.join("attachments")
    }

    pub fn expansion_tuning(&self) -> ExpansionTuning {
        ExpansionTuning {
            pagination_rounds: self.pagination_rounds,
            expansion_rounds: self.expansion_rounds,
            stall_rounds: self.stall_rounds,
            settle_delay: self.settle_delay,
            idle_timeout: self.timeout.min(Duration::from_secs(10)),
            ..ExpansionTuning::default()
        }
    }
}

fn trimmed_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_login_url(site_url: &str) -> String {
    if site_url.is_empty() {
        return String::new();
    }
    format!("{}/sign_in", site_url.trim_end_matches('/'))
}

fn bool_from(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|v| v.to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn u64_from(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}
