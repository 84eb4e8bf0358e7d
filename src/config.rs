//! Configuration for the KageControl client

use crate::channels::ReconnectPolicy;
use crate::error::{ClientError, Result};
use crate::storage::CREDENTIAL_KEY;
use reqwest::Url;
use std::time::Duration;

/// Default backend address
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Configuration for talking to a KageControl backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL (e.g., "http://localhost:8000")
    pub api_url: String,

    /// WebSocket base URL; derived from `api_url` when unset
    pub ws_url: Option<String>,

    /// Storage key holding the credential
    pub credential_key: String,

    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,

    /// How the notification channel waits between connection attempts
    pub reconnect_policy: ReconnectPolicy,

    /// How long a delivered notification suppresses identical ones
    pub dedup_window: Option<Duration>,
}

impl ClientConfig {
    /// Create a new configuration for the given backend
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: None,
            credential_key: CREDENTIAL_KEY.to_string(),
            request_timeout: Duration::from_secs(30),
            reconnect_policy: ReconnectPolicy::default(),
            dedup_window: Some(Duration::from_secs(5 * 60)),
        }
    }

    /// Build from `KAGE_API_URL`, `KAGE_WS_URL` and `KAGE_RECONNECT_MS`
    pub fn from_env() -> Self {
        let mut config =
            Self::new(std::env::var("KAGE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()));

        if let Ok(ws) = std::env::var("KAGE_WS_URL") {
            config.ws_url = Some(ws);
        }

        if let Some(ms) = std::env::var("KAGE_RECONNECT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.reconnect_policy = ReconnectPolicy::constant(Duration::from_millis(ms));
        }

        config
    }

    /// Use an explicit WebSocket base URL
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Store the credential under a different key
    pub fn credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    /// Set the HTTP request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the reconnect policy
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Set the duplicate-notification window
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = Some(window);
        self
    }

    /// Deliver every notification, even repeats
    pub fn no_dedup(mut self) -> Self {
        self.dedup_window = None;
        self
    }

    /// WebSocket base: `ws_url` if set, else `api_url` with http→ws, https→wss
    pub fn ws_base(&self) -> Result<Url> {
        if let Some(ws) = &self.ws_url {
            return Url::parse(ws).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", ws, e)));
        }

        let mut url = Url::parse(&self.api_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.api_url, e)))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(format!("cannot derive ws url from {}", self.api_url)))?;
        Ok(url)
    }
}

/// Join `path` onto `base`, keeping any path prefix `base` already has
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let prefix = format!("{}/", base.path());
        base.set_path(&prefix);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}
