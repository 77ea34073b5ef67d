//! Transport boundary for the session engine.
//!
//! The session engine never opens sockets. It hands a [`Body`] and a
//! deadline to a [`Transport`] and gets back either the response body with
//! its HTTP status or a [`TransportFailure`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Session engine                │
//! │        (transport-agnostic)              │
//! └──────────────────┬──────────────────────┘
//!                    │ dispatch(body, timeout)
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  HttpTransport  │ │  test doubles   │
//! │   (reqwest)     │ │  (stub CM)      │
//! └─────────────────┘ └─────────────────┘
//! ```
//!
//! Implementations must accept several concurrent `dispatch` calls; the
//! session keeps up to its negotiated window of requests in flight.

mod config;
mod http;

pub use config::HttpTransportConfig;
pub use http::HttpTransport;

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use ::http::StatusCode;
use thiserror::Error;

use crate::body::Body;

/// Response to one dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status of the exchange.
    pub status: StatusCode,
    /// Response body; empty when the CM sent no content.
    pub body: Body,
}

impl TransportResponse {
    /// A `200 OK` response.
    pub fn ok(body: Body) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// A response with an explicit status.
    pub fn with_status(status: StatusCode, body: Body) -> Self {
        Self { status, body }
    }
}

/// Classification of a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, reset, DNS, TLS.
    Network,
    /// No response before the deadline.
    Timeout,
    /// A response arrived but could not be understood.
    Protocol,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
        })
    }
}

/// A failed exchange. Always recoverable from the session's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failure: {detail}")]
pub struct TransportFailure {
    /// What went wrong.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub detail: String,
}

impl TransportFailure {
    /// Network-level failure.
    pub fn network(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Network,
            detail: detail.into(),
        }
    }

    /// Deadline exceeded.
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            detail: format!("no response within {}ms", after.as_millis()),
        }
    }

    /// Unintelligible response.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Protocol,
            detail: detail.into(),
        }
    }
}

/// Outcome of one dispatch.
pub type DispatchResult = std::result::Result<TransportResponse, TransportFailure>;

/// Pluggable request/response transport.
pub trait Transport: Send + Sync {
    /// Deliver `body` and wait at most `timeout` for the response.
    fn dispatch(&self, body: Body, timeout: Duration) -> BoxFuture<'_, DispatchResult>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}
