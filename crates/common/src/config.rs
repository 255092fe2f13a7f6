//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{Error, Result};

pub const ENV_BASE_URL: &str = "TRYON_BASE_URL";
pub const ENV_API_URL: &str = "TRYON_API_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "TRYON_REQUEST_TIMEOUT_SECS";

/// Where and how to reach the inference backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin that relative API paths are resolved against
    pub base_url: String,

    /// Upload endpoint, absolute or relative to `base_url`
    pub api_url: String,

    /// Health route, relative to `base_url`
    pub health_path: String,

    /// Whole-request timeout; `None` waits for as long as the model takes
    pub request_timeout_secs: Option<u64>,

    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            api_url: "/api/try-on/upload".to_string(),
            health_path: "/api/health".to_string(),
            request_timeout_secs: None,
            connect_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `TRYON_*` environment overrides
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_BASE_URL) {
            self.base_url = base;
        }
        if let Some(api) = lookup(ENV_API_URL) {
            self.api_url = api;
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT) {
            let secs = timeout.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!(
                    "{} must be whole seconds, got {:?}",
                    ENV_REQUEST_TIMEOUT, timeout
                ))
            })?;
            self.request_timeout_secs = Some(secs);
        }
        Ok(self)
    }

    fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidConfig(format!("base_url {:?}: {}", self.base_url, e)))
    }

    /// Fully resolved upload endpoint
    pub fn endpoint_url(&self) -> Result<Url> {
        match Url::parse(&self.api_url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(self.base()?.join(&self.api_url)?),
            Err(e) => Err(Error::InvalidConfig(format!("api_url {:?}: {}", self.api_url, e))),
        }
    }

    pub fn health_url(&self) -> Result<Url> {
        Ok(self.base()?.join(&self.health_path)?)
    }
}
