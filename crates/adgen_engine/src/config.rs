use std::time::Duration;

use adgen_core::DEFAULT_TRANSIENT_RETRY_BUDGET;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Service root; endpoint paths are appended to it.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to request/response calls, not to the progress stream.
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    /// Consecutive transient poll failures tolerated before giving up.
    pub transient_retry_budget: u32,
    /// Longest quiet period on an open progress stream.
    pub stream_idle_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(2500),
            transient_retry_budget: DEFAULT_TRANSIENT_RETRY_BUDGET,
            stream_idle_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientSettings {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
