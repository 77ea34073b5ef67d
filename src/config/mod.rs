//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `bosh` binary)
//!
//! ```toml
//! [session]
//! to = "example.com"
//! hold = 2
//! wait_secs = 60
//!
//! [retry]
//! max_attempts = 3
//!
//! [transport]
//! uri = "https://example.com/http-bind"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::body::Version;
use crate::error::{BoshError, Result};
use crate::protocol::{RetryConfig, PROTOCOL_VERSION};
use crate::transport::HttpTransportConfig;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Session creation parameters
    #[serde(default)]
    pub session: SessionConfig,

    /// Resend policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Connection manager endpoint
    #[serde(default)]
    pub transport: HttpTransportConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| BoshError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| BoshError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Endpoint
        if let Ok(uri) = std::env::var("BOSH_URI") {
            config.transport.uri = uri;
        }

        // Session
        if let Ok(to) = std::env::var("BOSH_TO") {
            config.session.to = to;
        }
        if let Ok(route) = std::env::var("BOSH_ROUTE") {
            config.session.route = Some(route);
        }
        if let Ok(lang) = std::env::var("BOSH_LANG") {
            config.session.lang = lang;
        }
        if let Ok(hold) = std::env::var("BOSH_HOLD") {
            if let Ok(hold) = hold.parse() {
                config.session.hold = hold;
            }
        }
        if let Ok(wait) = std::env::var("BOSH_WAIT") {
            if let Ok(wait) = wait.parse() {
                config.session.wait_secs = wait;
            }
        }

        // Retry
        if let Ok(attempts) = std::env::var("BOSH_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                config.retry.max_attempts = attempts;
            }
        }

        config
    }

    /// Default config file location (`<config dir>/bosh/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bosh").join("config.toml"))
    }

    /// Defaults, overlaid by `path` (or the default file when it exists),
    /// overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(Self::from_file(path)?),
            None => match Self::default_path() {
                Some(path) if path.exists() => Some(Self::from_file(path)?),
                _ => None,
            },
        };

        let config = file
            .unwrap_or_default()
            .merge(Self::from_env());
        config.validate()?;
        Ok(config)
    }

    /// Merge with another config (other takes precedence where it differs
    /// from the defaults)
    pub fn merge(self, other: Self) -> Self {
        let session_default = SessionConfig::default();
        let retry_default = RetryConfig::default();
        let transport_default = HttpTransportConfig::default();

        Self {
            session: SessionConfig {
                to: pick(self.session.to, other.session.to, &session_default.to),
                route: other.session.route.or(self.session.route),
                from: other.session.from.or(self.session.from),
                lang: pick(self.session.lang, other.session.lang, &session_default.lang),
                version: pick(self.session.version, other.session.version, &session_default.version),
                wait_secs: pick(
                    self.session.wait_secs,
                    other.session.wait_secs,
                    &session_default.wait_secs,
                ),
                hold: pick(self.session.hold, other.session.hold, &session_default.hold),
                ack: pick(self.session.ack, other.session.ack, &session_default.ack),
                initial_rid: other.session.initial_rid.or(self.session.initial_rid),
                empty_request_delay_ms: pick(
                    self.session.empty_request_delay_ms,
                    other.session.empty_request_delay_ms,
                    &session_default.empty_request_delay_ms,
                ),
                timeout_margin_secs: pick(
                    self.session.timeout_margin_secs,
                    other.session.timeout_margin_secs,
                    &session_default.timeout_margin_secs,
                ),
                xmpp_version: other.session.xmpp_version.or(self.session.xmpp_version),
                attributes: {
                    let mut attributes = self.session.attributes;
                    attributes.extend(other.session.attributes);
                    attributes
                },
            },
            retry: RetryConfig {
                max_attempts: pick(
                    self.retry.max_attempts,
                    other.retry.max_attempts,
                    &retry_default.max_attempts,
                ),
                initial_backoff_ms: pick(
                    self.retry.initial_backoff_ms,
                    other.retry.initial_backoff_ms,
                    &retry_default.initial_backoff_ms,
                ),
                max_backoff_ms: pick(
                    self.retry.max_backoff_ms,
                    other.retry.max_backoff_ms,
                    &retry_default.max_backoff_ms,
                ),
                multiplier: pick(
                    self.retry.multiplier,
                    other.retry.multiplier,
                    &retry_default.multiplier,
                ),
            },
            transport: HttpTransportConfig {
                uri: pick(self.transport.uri, other.transport.uri, &transport_default.uri),
                connect_timeout_secs: pick(
                    self.transport.connect_timeout_secs,
                    other.transport.connect_timeout_secs,
                    &transport_default.connect_timeout_secs,
                ),
                user_agent: pick(
                    self.transport.user_agent,
                    other.transport.user_agent,
                    &transport_default.user_agent,
                ),
                pool_idle_per_host: pick(
                    self.transport.pool_idle_per_host,
                    other.transport.pool_idle_per_host,
                    &transport_default.pool_idle_per_host,
                ),
            },
        }
    }

    /// Reject configurations no session could run with.
    pub fn validate(&self) -> Result<()> {
        if self.session.to.trim().is_empty() {
            return Err(BoshError::Config("session.to must not be empty".to_string()));
        }
        if self.session.wait_secs == 0 {
            return Err(BoshError::Config("session.wait_secs must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(BoshError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(BoshError::Config(format!(
                "retry.max_backoff_ms ({}) is below retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }
        if self.transport.uri.trim().is_empty() {
            return Err(BoshError::Config("transport.uri must not be empty".to_string()));
        }
        Ok(())
    }
}

fn pick<T: PartialEq>(base: T, other: T, default: &T) -> T {
    if other != *default {
        other
    } else {
        base
    }
}

/// Session creation parameters proposed to the connection manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Target domain (`to`)
    pub to: String,

    /// Upstream server override (`route`, `xmpp:host:port`)
    pub route: Option<String>,

    /// Originating entity (`from`)
    pub from: Option<String>,

    /// Default language (`xml:lang`)
    pub lang: String,

    /// Highest protocol version to propose (`ver`)
    pub version: Version,

    /// Longest time the CM may hold a request, in seconds (`wait`)
    pub wait_secs: u32,

    /// Requests the CM may hold at once (`hold`)
    pub hold: u32,

    /// Request acknowledgements (`ack="1"`)
    pub ack: bool,

    /// First request id; random when unset
    pub initial_rid: Option<u64>,

    /// Floor on the delay before an empty request, in milliseconds
    pub empty_request_delay_ms: u64,

    /// Added to `wait` to form the per-request deadline, in seconds
    pub timeout_margin_secs: u64,

    /// XMPP over BOSH version (`xmpp:version`)
    pub xmpp_version: Option<String>,

    /// Extra creation attributes. Session-owned attributes override these.
    pub attributes: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            to: "localhost".to_string(),
            route: None,
            from: None,
            lang: "en".to_string(),
            version: PROTOCOL_VERSION,
            wait_secs: 60,
            hold: 2,
            ack: true,
            initial_rid: None,
            empty_request_delay_ms: 100,
            timeout_margin_secs: 5,
            xmpp_version: None,
            attributes: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Session for the given domain.
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            ..Default::default()
        }
    }

    /// Proposed `wait` as a duration.
    pub fn wait(&self) -> Duration {
        Duration::from_secs(u64::from(self.wait_secs))
    }

    /// Slack added to `wait` before a request counts as timed out.
    pub fn timeout_margin(&self) -> Duration {
        Duration::from_secs(self.timeout_margin_secs)
    }

    /// Floor on the delay before an empty request.
    pub fn empty_request_delay(&self) -> Duration {
        Duration::from_millis(self.empty_request_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.to, "localhost");
        assert_eq!(config.session.hold, 2);
        assert_eq!(config.session.version, Version::new(1, 8));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [session]
            to = "example.com"
            route = "xmpp:example.com:5222"
            hold = 1
            wait_secs = 30

            [session.attributes]
            "xmpp:version" = "1.0"

            [retry]
            max_attempts = 5

            [transport]
            uri = "https://example.com/http-bind"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.session.to, "example.com");
        assert_eq!(config.session.route.as_deref(), Some("xmpp:example.com:5222"));
        assert_eq!(config.session.hold, 1);
        assert_eq!(config.session.lang, "en");
        assert_eq!(config.session.attributes["xmpp:version"], "1.0");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 250);
        assert_eq!(config.transport.uri, "https://example.com/http-bind");
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nto = \"file.example\"\nversion = \"1.6\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.session.to, "file.example");
        assert_eq!(config.session.version, Version::new(1, 6));

        let loaded = Config::load(Some(file.path())).unwrap();
        assert_eq!(loaded.session.version, Version::new(1, 6));
    }

    #[test]
    fn test_config_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::from_file(&missing), Err(BoshError::Config(_))));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[session]\nhold = \"two\"").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(BoshError::Config(_))));
    }

    #[test]
    fn test_merge_prefers_non_defaults() {
        let mut base = Config::default();
        base.session.to = "base.example".to_string();
        base.session.hold = 3;

        let mut other = Config::default();
        other.session.to = "other.example".to_string();
        other.transport.uri = "http://cm/".to_string();

        let merged = base.merge(other);
        assert_eq!(merged.session.to, "other.example");
        assert_eq!(merged.session.hold, 3);
        assert_eq!(merged.transport.uri, "http://cm/");
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.session.wait_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.to = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_backoff_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_durations() {
        let session = SessionConfig {
            wait_secs: 30,
            timeout_margin_secs: 2,
            empty_request_delay_ms: 50,
            ..SessionConfig::new("example.com")
        };
        assert_eq!(session.wait(), Duration::from_secs(30));
        assert_eq!(session.timeout_margin(), Duration::from_secs(2));
        assert_eq!(session.empty_request_delay(), Duration::from_millis(50));
    }
}
