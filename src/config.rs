//! Client configuration: where the identity API lives, where the token is
//! persisted, and how long a request may take. Values are public; do not store
//! secrets here.

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Path prefix every identity endpoint lives under.
const API_PREFIX: &str = "/api";
const TOKEN_FILE_NAME: &str = "session.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL without a trailing `/`.
    pub api_base_url: String,
    pub token_path: PathBuf,
    /// `None` disables the client-side timeout.
    pub request_timeout: Option<Duration>,
}

impl AppConfig {
    /// Builds a config for `base_url` with the default token location and timeout.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            api_base_url: normalize_base_url(base_url),
            token_path: default_token_path(),
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Like [`AppConfig::new`], but rejects base URLs that are not absolute
    /// `http`/`https` URLs with a host.
    ///
    /// # Errors
    /// Returns an error if `base_url` cannot be parsed, has no host, or uses an unsupported scheme.
    pub fn parse(base_url: &str) -> Result<Self> {
        let config = Self::new(base_url);
        let url = Url::parse(&config.api_base_url)?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(anyhow!("Error parsing URL: unsupported scheme {scheme}")),
        }

        if url.host().is_none() {
            return Err(anyhow!("Error parsing URL: no host specified"));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Zero seconds disables the timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// `<base>/api`
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("{}{API_PREFIX}", self.api_base_url)
    }

    /// Joins the API URL and `path` with exactly one `/`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url(), path.trim().trim_start_matches('/'))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

/// Trims whitespace and trailing `/`; empty input falls back to the default base URL.
#[must_use]
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_API_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Platform data directory for the token file, or the working directory when
/// no home directory can be resolved.
#[must_use]
pub fn default_token_path() -> PathBuf {
    ProjectDirs::from("dev", "auth-session", "auth-session").map_or_else(
        || PathBuf::from(TOKEN_FILE_NAME),
        |dirs| dirs.data_dir().join(TOKEN_FILE_NAME),
    )
}
