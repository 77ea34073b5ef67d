//! HTTP transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection manager endpoint and HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// Connection manager URI (`http://host:port/http-bind/`)
    pub uri: String,
    /// TCP/TLS connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// User-Agent header
    pub user_agent: String,
    /// Idle connections kept per host; at least the request window
    pub pool_idle_per_host: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:5280/http-bind".to_string(),
            connect_timeout_secs: 10,
            user_agent: format!("bosh-core/{}", crate::VERSION),
            pool_idle_per_host: 4,
        }
    }
}

impl HttpTransportConfig {
    /// Configuration for the given endpoint.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpTransportConfig::default();
        assert!(config.uri.ends_with("/http-bind"));
        assert!(config.user_agent.starts_with("bosh-core/"));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_builder() {
        let config = HttpTransportConfig::new("https://cm.example.com/bosh")
            .with_connect_timeout(Duration::from_millis(200));
        assert_eq!(config.uri, "https://cm.example.com/bosh");
        assert_eq!(config.connect_timeout_secs, 1);
    }

    #[test]
    fn test_partial_toml() {
        let config: HttpTransportConfig = toml::from_str(r#"uri = "http://cm:5280/""#).unwrap();
        assert_eq!(config.uri, "http://cm:5280/");
        assert_eq!(config.pool_idle_per_host, 4);
    }
}
