//! Events delivered to the session consumer.

use std::fmt;

use serde::Serialize;

use super::params::NegotiatedParams;
use crate::body::{Body, TerminalCondition};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum CloseCause {
    /// The caller disconnected or closed the session.
    ClientRequested,
    /// The CM answered with `type="terminate"`.
    CmTerminated {
        /// Value of the `condition` attribute, if any.
        condition: Option<TerminalCondition>,
    },
    /// A legacy CM answered with HTTP 400, 403 or 404.
    LegacyHttpError {
        /// HTTP status code.
        status: u16,
    },
    /// A request could not be delivered within the retry budget.
    RetryExhausted {
        /// Request that ran out of attempts.
        rid: u64,
        /// Delivery attempts made.
        attempts: u32,
        /// Last failure reported for it.
        reason: String,
    },
    /// The CM broke the protocol (missing sid, malformed parameters).
    ProtocolViolation {
        /// What was wrong.
        detail: String,
    },
}

impl CloseCause {
    /// Terminal condition equivalent to this cause, if there is one.
    pub fn condition(&self) -> Option<TerminalCondition> {
        match self {
            Self::CmTerminated { condition } => condition.clone(),
            Self::LegacyHttpError { status } => TerminalCondition::from_legacy_status(*status),
            _ => None,
        }
    }

    /// Whether the caller asked for the close.
    pub fn is_client_requested(&self) -> bool {
        matches!(self, Self::ClientRequested)
    }
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientRequested => write!(f, "closed by client"),
            Self::CmTerminated {
                condition: Some(condition),
            } => write!(f, "terminated by connection manager ({condition})"),
            Self::CmTerminated { condition: None } => {
                write!(f, "terminated by connection manager")
            },
            Self::LegacyHttpError { status } => {
                write!(f, "legacy connection manager returned HTTP {status}")
            },
            Self::RetryExhausted {
                rid,
                attempts,
                reason,
            } => write!(
                f,
                "request {rid} failed after {attempts} attempts: {reason}"
            ),
            Self::ProtocolViolation { detail } => write!(f, "protocol violation: {detail}"),
        }
    }
}

/// Session lifecycle and data events, in the order the session produced
/// them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The CM accepted the session.
    SessionEstablished {
        /// Session identifier.
        sid: String,
        /// Parameters in effect.
        params: NegotiatedParams,
    },
    /// A response body, released in request id order.
    BodyReceived(Body),
    /// The session is over.
    ConnectionClosed {
        /// Why.
        cause: CloseCause,
        /// Bodies that were queued and never dispatched.
        unsent: Vec<Body>,
    },
}

impl SessionEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionEstablished { .. } => "session_established",
            Self::BodyReceived(_) => "body_received",
            Self::ConnectionClosed { .. } => "connection_closed",
        }
    }
}
