//! Request/response pairs.
//!
//! An [`Exchange`] is created when a body is handed to the transport and
//! lives until the connection manager's response has been released to the
//! consumer. It keeps the exact wire body so a resend after a recoverable
//! failure is identical to the original.

use std::time::{Duration, Instant};

use crate::body::Body;

/// One numbered request and, once it arrives, its response.
#[derive(Debug, Clone)]
pub struct Exchange {
    rid: u64,
    body: Body,
    dispatched_at: Instant,
    attempts: u32,
    empty: bool,
    response: Option<Body>,
    last_failure: Option<String>,
}

impl Exchange {
    /// New exchange on its first delivery attempt.
    pub fn new(rid: u64, body: Body, now: Instant, empty: bool) -> Self {
        Self {
            rid,
            body,
            dispatched_at: now,
            attempts: 1,
            empty,
            response: None,
            last_failure: None,
        }
    }

    /// Request identifier.
    pub fn rid(&self) -> u64 {
        self.rid
    }

    /// Wire body, including `rid` and `sid`.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Delivery attempts so far, starting at 1.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the current attempt was dispatched.
    pub fn dispatched_at(&self) -> Instant {
        self.dispatched_at
    }

    /// Time since the current attempt was dispatched.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.dispatched_at)
    }

    /// Synthesized by the window manager rather than sent by the caller.
    pub fn is_empty_request(&self) -> bool {
        self.empty
    }

    /// Whether a response has been recorded.
    pub fn is_complete(&self) -> bool {
        self.response.is_some()
    }

    /// The response, once recorded.
    pub fn response(&self) -> Option<&Body> {
        self.response.as_ref()
    }

    /// Reason for the most recent failed attempt.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub(crate) fn complete(&mut self, response: Body) {
        self.response = Some(response);
    }

    pub(crate) fn record_failure(&mut self, reason: impl Into<String>) {
        self.last_failure = Some(reason.into());
    }

    /// Start another delivery attempt of the same body.
    pub(crate) fn redeliver(&mut self, now: Instant) {
        self.attempts += 1;
        self.dispatched_at = now;
    }

    pub(crate) fn take_response(&mut self) -> Option<Body> {
        self.response.take()
    }
}
