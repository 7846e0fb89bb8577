//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ClientError;

/// Address of the Hot Topics chat endpoint on a local server.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8025/hottopics/chat";

/// Settings for one client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URL of the server (`ws://` or `wss://`).
    pub server_url: String,

    /// How long a connection attempt may take before it counts as failed.
    pub connect_timeout: Duration,

    /// How long [`request`](crate::Correlator::request) waits for a
    /// response when the caller doesn't say.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: Self::DEFAULT_TIMEOUT,
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Default for both the connect and the request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// A default config pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            server_url: url.into(),
            ..Default::default()
        }
    }

    /// Replaces unusable values so the config is safe to run with.
    ///
    /// A zero timeout would fail every attempt instantly, so it falls back
    /// to [`Self::DEFAULT_TIMEOUT`].
    pub fn validated(mut self) -> Self {
        if self.connect_timeout.is_zero() {
            tracing::warn!(
                fallback = ?Self::DEFAULT_TIMEOUT,
                "connect_timeout is zero, using default"
            );
            self.connect_timeout = Self::DEFAULT_TIMEOUT;
        }
        if self.request_timeout.is_zero() {
            tracing::warn!(
                fallback = ?Self::DEFAULT_TIMEOUT,
                "request_timeout is zero, using default"
            );
            self.request_timeout = Self::DEFAULT_TIMEOUT;
        }
        self
    }

    /// Checks that the server URL names a WebSocket endpoint.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidConfig`] for any other scheme.
    pub fn check_url(&self) -> Result<(), ClientError> {
        let url = self.server_url.trim();
        let rest = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .ok_or_else(|| {
                ClientError::InvalidConfig(format!(
                    "server_url must start with ws:// or wss://, got {url:?}"
                ))
            })?;
        if rest.is_empty() {
            return Err(ClientError::InvalidConfig(
                "server_url has no host".into(),
            ));
        }
        Ok(())
    }
}
