//! BOSH client error types.
//!
//! # Error Classification
//!
//! Errors returned from this crate are the ones a caller can act on:
//!
//! - **Session closed**: the session reached its terminal state; the
//!   [`CloseCause`] says why. Sends after this point never reach the wire.
//! - **Client-side violations**: malformed attribute values or bodies,
//!   reported synchronously and without touching session state.
//! - **Ambient failures**: configuration, XML, I/O.
//!
//! Recoverable transport failures are *not* represented here. They are
//! retried inside the session engine and only become visible as a
//! [`CloseCause::RetryExhausted`] once the retry budget is spent.

use thiserror::Error;

use crate::protocol::CloseCause;

/// BOSH client errors.
#[derive(Error, Debug)]
pub enum BoshError {
    /// The session is terminated and accepts no further requests.
    #[error("Session closed: {0}")]
    SessionClosed(CloseCause),

    /// An attribute value could not be parsed by the attribute registry.
    #[error("Invalid attribute {name}={value:?}: {reason}")]
    InvalidAttribute {
        /// Qualified attribute name.
        name: String,
        /// Raw value as received or supplied.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A body cannot be sent as supplied.
    #[error("Invalid body: {0}")]
    InvalidBody(String),

    /// The `<body/>` wrapper could not be parsed or written.
    #[error("XML error: {0}")]
    Xml(String),

    /// Protocol-level error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoshError {
    /// Build an [`BoshError::InvalidAttribute`] error.
    pub fn invalid_attribute(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BoshError::InvalidAttribute {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports a terminated session.
    pub fn is_session_closed(&self) -> bool {
        matches!(self, BoshError::SessionClosed(_))
    }
}

/// Result type alias for BOSH operations
pub type Result<T> = std::result::Result<T, BoshError>;

impl From<reqwest::Error> for BoshError {
    fn from(err: reqwest::Error) -> Self {
        BoshError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for BoshError {
    fn from(err: toml::de::Error) -> Self {
        BoshError::Config(err.to_string())
    }
}

impl From<quick_xml::Error> for BoshError {
    fn from(err: quick_xml::Error) -> Self {
        BoshError::Xml(err.to_string())
    }
}
