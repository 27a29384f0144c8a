use std::collections::BTreeMap;
use std::time::Duration;

/// Path appended to the base URL for the turn-stream endpoint.
const STREAM_PATH: &str = "/v1/turns/stream";

/// Transport configuration for the SSE subscription endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL of the agent gateway.
    pub base_url: String,
    /// Bearer token passed to `Authorization`.
    pub access_token: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    /// Normalized stream endpoint: trailing slashes collapse before the
    /// fixed path is appended.
    pub fn stream_endpoint(&self) -> String {
        format!("{}{STREAM_PATH}", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::EndpointConfig;

    #[test]
    fn stream_endpoint_normalizes_trailing_slashes() {
        let config = EndpointConfig::new("https://agent.example.com///", "token");
        assert_eq!(
            config.stream_endpoint(),
            "https://agent.example.com/v1/turns/stream"
        );
    }

    #[test]
    fn builder_hooks_accumulate() {
        let config = EndpointConfig::new("https://agent.example.com", "token")
            .with_user_agent("session-client/0.1")
            .insert_header("x-conversation", "c1");

        assert_eq!(config.user_agent.as_deref(), Some("session-client/0.1"));
        assert_eq!(
            config.extra_headers.get("x-conversation").map(String::as_str),
            Some("c1")
        );
    }
}
