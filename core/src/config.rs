//! Client configuration.

use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com/v3";
pub const API_KEY_ENV: &str = "SENDGRID_API_KEY";
pub const HOST_ENV: &str = "SENDGRID_HOST";

const DEFAULT_USER_AGENT: &str = concat!("sendgrid-core/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Base URL, credentials and retry policy shared by every operation.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Reads `SENDGRID_API_KEY` and, if set, `SENDGRID_HOST`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingEnv(API_KEY_ENV))?;
        let mut config = Self::new(api_key);
        if let Some(host) = std::env::var(HOST_ENV).ok().filter(|h| !h.is_empty()) {
            config = config.with_base_url(&host);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish()
    }
}
