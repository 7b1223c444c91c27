use crate::config::{default_token_path, AppConfig};
use anyhow::Result;
use std::path::PathBuf;

/// Flags shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: String,
    pub token_file: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            token_file: None,
            timeout_secs: crate::config::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// # Errors
    /// Returns an error if the API URL is not an absolute `http`/`https` URL.
    pub fn config(&self) -> Result<AppConfig> {
        let token_path = self.token_file.clone().unwrap_or_else(default_token_path);
        Ok(AppConfig::parse(&self.api_url)?
            .with_token_path(token_path)
            .with_timeout_secs(self.timeout_secs))
    }
}
