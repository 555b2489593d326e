use crate::errors::{ClientError, Result};
use reqwest::Url;
use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_TOKEN_PATH: &str = "data/tokens.json";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub token_path: PathBuf,
    /// Per-request timeout. `None` leaves it to the transport.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Reads `STUDY_API_URL`, `STUDY_TOKEN_PATH` and `STUDY_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("STUDY_API_URL") {
            config = config.with_base_url(url)?;
        }
        if let Some(path) = lookup("STUDY_TOKEN_PATH") {
            config.token_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("STUDY_HTTP_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    ClientError::Config(format!(
                        "STUDY_HTTP_TIMEOUT_SECS must be a positive integer, got {raw:?}"
                    ))
                })?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let parsed = Url::parse(&url)
            .map_err(|err| ClientError::Config(format!("invalid API url {url:?}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "API url must be http or https, got {url:?}"
            )));
        }
        self.base_url = url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }
}
