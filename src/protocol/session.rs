//! Session state machine.
//!
//! [`Session`] is the single mutable aggregate of a BOSH session. It does
//! no I/O: every input (a caller's send, a response, a transport failure,
//! a poll tick) returns the [`Action`]s the driver must carry out, in
//! order. The async driver in [`crate::client`] executes them.
//!
//! Inputs are keyed by `(rid, attempt)`. When a request is resent its
//! attempt number changes, so a late report from the superseded attempt is
//! recognised and ignored.

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

use super::event::{CloseCause, SessionEvent};
use super::exchange::Exchange;
use super::params::{creation_request, NegotiatedParams};
use super::retry::RetryConfig;
use super::window::{PollDecision, Window};
use crate::body::attributes::{self, CONDITION, RID, SID, TYPE, VER};
use crate::body::{Body, BodyType, TerminalCondition};
use crate::config::SessionConfig;
use crate::error::{BoshError, Result};
use crate::transport::{TransportFailure, TransportResponse};

/// HTTP statuses a legacy connection manager uses to end a session.
pub const LEGACY_ERROR_STATUSES: [u16; 3] = [400, 403, 404];

/// Upper bound for a randomly chosen first request id, leaving room for
/// 2^32 increments below 2^53.
const MAX_INITIAL_RID: u64 = (1 << 53) - (1 << 32);

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, nothing sent yet
    Idle,
    /// Creation request sent, waiting for the CM's parameters
    Creating,
    /// Steady-state send/receive
    Active,
    /// Replaying unacknowledged requests after a recoverable error
    Recovering,
    /// Session over; no further requests
    Terminated,
}

/// Work the driver must carry out, in order.
#[derive(Debug, Clone)]
pub enum Action {
    /// Deliver an exchange after `delay`, failing it after `timeout`.
    Dispatch {
        /// Exchange to deliver (current attempt).
        exchange: Exchange,
        /// Wait before sending (backoff).
        delay: Duration,
        /// Response deadline once sent.
        timeout: Duration,
    },
    /// Abandon any in-flight delivery of this request id.
    Cancel(u64),
    /// Call [`Session::poll`] after this long.
    SchedulePoll(Duration),
    /// Deliver an event to the consumer.
    Emit(SessionEvent),
}

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Requests handed to the transport, resends excluded
    pub requests_sent: u64,
    /// Of which synthesized empty requests
    pub empty_requests: u64,
    /// Responses accepted (stale reports excluded)
    pub responses_received: u64,
    /// Recovery rounds started
    pub retries: u64,
    /// Bodies released to the consumer
    pub bodies_delivered: u64,
}

/// BOSH client session
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    retry: RetryConfig,
    state: SessionState,
    params: Option<NegotiatedParams>,
    window: Window,
    /// Request ids being replayed while recovering.
    replay: Option<RangeInclusive<u64>>,
    cause: Option<CloseCause>,
    stats: SessionStats,
}

impl Session {
    /// Create a session. Nothing is sent until the first [`Session::send`].
    pub fn new(config: SessionConfig, retry: RetryConfig) -> Self {
        let first_rid = config
            .initial_rid
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..MAX_INITIAL_RID));
        Self {
            config,
            retry,
            state: SessionState::Idle,
            params: None,
            window: Window::new(first_rid),
            replay: None,
            cause: None,
            stats: SessionStats::default(),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session id, once the CM has assigned one.
    pub fn session_id(&self) -> Option<&str> {
        self.params.as_ref().map(|p| p.sid.as_str())
    }

    /// Negotiated parameters, once established.
    pub fn params(&self) -> Option<&NegotiatedParams> {
        self.params.as_ref()
    }

    /// Whether the CM omitted `ver` in its creation response.
    pub fn is_legacy(&self) -> bool {
        self.params.as_ref().is_some_and(|p| p.legacy)
    }

    /// Why the session ended, if it has.
    pub fn close_cause(&self) -> Option<&CloseCause> {
        self.cause.as_ref()
    }

    /// Request id the next request will carry.
    pub fn next_rid(&self) -> u64 {
        self.window.next_rid()
    }

    /// Requests dispatched and not yet released.
    pub fn in_flight(&self) -> usize {
        self.window.in_flight()
    }

    /// Bodies waiting for a window slot.
    pub fn queued(&self) -> usize {
        self.window.queued()
    }

    /// Get session statistics
    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    /// Client configuration this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Response deadline for a request dispatched now.
    pub fn request_timeout(&self) -> Duration {
        let wait = self
            .params
            .as_ref()
            .map_or_else(|| self.config.wait(), NegotiatedParams::wait);
        wait + self.config.timeout_margin()
    }

    /// Create the session with `initial` as the body of the creation
    /// request (its attributes go out alongside the session's own).
    pub fn create(&mut self, initial: Body, now: Instant) -> Result<Vec<Action>> {
        if let Some(cause) = &self.cause {
            return Err(BoshError::SessionClosed(cause.clone()));
        }
        if self.state != SessionState::Idle {
            return Err(BoshError::Protocol("session already created".to_string()));
        }
        self.send(initial, now)
    }

    /// Queue a body for delivery. The first send creates the session.
    ///
    /// Fails without touching session state if the session is terminated
    /// or the body carries malformed or session-owned attributes.
    pub fn send(&mut self, body: Body, now: Instant) -> Result<Vec<Action>> {
        if let Some(cause) = &self.cause {
            return Err(BoshError::SessionClosed(cause.clone()));
        }
        attributes::validate_outbound(&body)?;

        let mut actions = Vec::new();
        self.window.enqueue(body);

        match self.state {
            SessionState::Idle => {
                tracing::info!(rid = self.window.next_rid(), to = %self.config.to, "creating session");
                self.state = SessionState::Creating;
                self.pump(now, &mut actions);
            },
            SessionState::Active => self.pump(now, &mut actions),
            SessionState::Creating | SessionState::Recovering | SessionState::Terminated => {
                tracing::trace!(queued = self.window.queued(), "send queued");
            },
        }
        Ok(actions)
    }

    /// Process the response to `rid` (delivery attempt `attempt`).
    pub fn on_response(
        &mut self,
        rid: u64,
        attempt: u32,
        response: TransportResponse,
        now: Instant,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.is_current(rid, attempt) {
            tracing::trace!(rid, attempt, "ignoring stale response");
            return actions;
        }

        self.stats.responses_received += 1;
        let TransportResponse { status, body } = response;
        tracing::debug!(rid, status = status.as_u16(), "response received");

        // Error page from an intermediary: the CM never saw this rid
        if !status.is_success()
            && !LEGACY_ERROR_STATUSES.contains(&status.as_u16())
            && body == Body::empty()
        {
            let reason = format!("HTTP {} without a BOSH body", status.as_u16());
            tracing::warn!(rid, attempt, %reason, "request failed");
            if let Some(exchange) = self.window.get_mut(rid) {
                exchange.record_failure(reason.clone());
            }
            self.recover(rid, &reason, now, &mut actions);
            return actions;
        }

        if self.state == SessionState::Creating {
            self.on_creation_response(rid, status.as_u16(), body, now, &mut actions);
        } else {
            self.on_session_response(rid, status.as_u16(), body, now, &mut actions);
        }
        actions
    }

    /// Process a failed delivery of `rid` (attempt `attempt`).
    pub fn on_failure(
        &mut self,
        rid: u64,
        attempt: u32,
        failure: &TransportFailure,
        now: Instant,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.is_current(rid, attempt) {
            tracing::trace!(rid, attempt, "ignoring stale failure");
            return actions;
        }

        tracing::warn!(rid, attempt, kind = %failure.kind, detail = %failure.detail, "request failed");
        if let Some(exchange) = self.window.get_mut(rid) {
            exchange.record_failure(failure.to_string());
        }
        self.recover(rid, &failure.to_string(), now, &mut actions);
        actions
    }

    /// Poll tick: synthesize empty requests the receive window has room for.
    pub fn poll(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state != SessionState::Active {
            return actions;
        }
        let Some(params) = self.params.as_ref() else {
            return actions;
        };
        let timeout = self.request_timeout();

        loop {
            match self.window.poll_decision(now) {
                PollDecision::Now => {
                    let sid = params.sid.as_str();
                    let Some(exchange) = self
                        .window
                        .admit_empty(now, |rid, body| wire_body(sid, rid, body))
                    else {
                        break;
                    };
                    tracing::debug!(rid = exchange.rid(), "sending empty request");
                    self.stats.requests_sent += 1;
                    self.stats.empty_requests += 1;
                    actions.push(Action::Dispatch {
                        exchange,
                        delay: Duration::ZERO,
                        timeout,
                    });
                },
                PollDecision::After(delay) => {
                    actions.push(Action::SchedulePoll(delay));
                    break;
                },
                PollDecision::Idle => break,
            }
        }
        actions
    }

    /// Graceful disconnect.
    ///
    /// Returns the `type="terminate"` request the driver should deliver
    /// (when a session exists) along with the actions that shut the
    /// session down.
    pub fn disconnect(
        &mut self,
        final_body: Option<Body>,
        now: Instant,
    ) -> Result<(Option<Exchange>, Vec<Action>)> {
        if let Some(cause) = &self.cause {
            return Err(BoshError::SessionClosed(cause.clone()));
        }
        let final_body = final_body.unwrap_or_default();
        attributes::validate_outbound(&final_body)?;

        let terminate_request = match (&self.params, self.state) {
            (Some(params), SessionState::Active | SessionState::Recovering) => {
                let rid = self.window.take_rid();
                let body = wire_body(&params.sid, rid, &final_body)
                    .rebuild()
                    .attribute(TYPE, BodyType::Terminate.as_str())
                    .build();
                Some(Exchange::new(rid, body, now, false))
            },
            _ => None,
        };

        let mut actions = Vec::new();
        self.terminate(CloseCause::ClientRequested, &mut actions);
        Ok((terminate_request, actions))
    }

    /// Abrupt close: cancel everything, send nothing.
    pub fn close(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.terminate(CloseCause::ClientRequested, &mut actions);
        actions
    }

    fn is_current(&self, rid: u64, attempt: u32) -> bool {
        self.state != SessionState::Terminated
            && self
                .window
                .get(rid)
                .is_some_and(|e| e.attempts() == attempt && !e.is_complete())
    }

    fn on_creation_response(
        &mut self,
        rid: u64,
        status: u16,
        body: Body,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        match body_type(&body) {
            Some(BodyType::Terminate) => {
                let condition = condition(&body);
                actions.push(Action::Emit(SessionEvent::BodyReceived(body)));
                self.terminate(CloseCause::CmTerminated { condition }, actions);
                return;
            },
            Some(BodyType::Error) => {
                self.recover(rid, "recoverable binding error", now, actions);
                return;
            },
            _ => {},
        }

        let legacy = !body.has_attribute(&VER);
        if legacy && LEGACY_ERROR_STATUSES.contains(&status) {
            self.terminate(CloseCause::LegacyHttpError { status }, actions);
            return;
        }

        let params = match NegotiatedParams::from_response(&self.config, &body) {
            Ok(params) => params,
            Err(err) => {
                self.terminate(
                    CloseCause::ProtocolViolation {
                        detail: err.to_string(),
                    },
                    actions,
                );
                return;
            },
        };

        tracing::info!(
            sid = %params.sid,
            hold = params.hold,
            requests = params.requests,
            wait = params.wait_secs,
            polling = params.polling_secs,
            legacy = params.legacy,
            "session established"
        );

        self.window.configure(
            params.send_window(),
            params.empty_target(),
            params.polling(),
        );
        self.state = SessionState::Active;
        actions.push(Action::Emit(SessionEvent::SessionEstablished {
            sid: params.sid.clone(),
            params: params.clone(),
        }));
        self.params = Some(params);

        if let Some(exchange) = self.window.get_mut(rid) {
            exchange.complete(body);
        }
        self.release(now, actions);
    }

    fn on_session_response(
        &mut self,
        rid: u64,
        status: u16,
        body: Body,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        match body_type(&body) {
            Some(BodyType::Terminate) => {
                let condition = condition(&body);
                actions.push(Action::Emit(SessionEvent::BodyReceived(body)));
                self.terminate(CloseCause::CmTerminated { condition }, actions);
                return;
            },
            Some(BodyType::Error) => {
                if let Some(exchange) = self.window.get_mut(rid) {
                    exchange.record_failure("recoverable binding error");
                }
                self.recover(rid, "recoverable binding error", now, actions);
                return;
            },
            _ => {},
        }

        if LEGACY_ERROR_STATUSES.contains(&status) {
            if self.is_legacy() {
                self.terminate(CloseCause::LegacyHttpError { status }, actions);
                return;
            }
            tracing::debug!(rid, status, "ignoring HTTP error status from non-legacy CM");
        }

        if let Some(exchange) = self.window.get_mut(rid) {
            exchange.complete(body);
        }
        self.release(now, actions);
    }

    /// Release answered exchanges in order, then refill the window.
    fn release(&mut self, now: Instant, actions: &mut Vec<Action>) {
        for mut exchange in self.window.release() {
            if let Some(body) = exchange.take_response() {
                self.stats.bodies_delivered += 1;
                actions.push(Action::Emit(SessionEvent::BodyReceived(body)));
            }
        }

        if self.state == SessionState::Recovering {
            // Released exchanges have left the window and count as answered
            let replayed = self.replay.as_ref().is_some_and(|range| {
                self.window
                    .outstanding()
                    .filter(|e| range.contains(&e.rid()))
                    .all(Exchange::is_complete)
            });
            if replayed {
                tracing::info!("recovered; resuming normal operation");
                self.state = SessionState::Active;
                self.replay = None;
            }
        }

        if self.state == SessionState::Active {
            self.pump(now, actions);
            self.schedule_poll(now, actions);
        }
    }

    /// Dispatch queued bodies while the window has room.
    fn pump(&mut self, now: Instant, actions: &mut Vec<Action>) {
        let timeout = self.request_timeout();
        loop {
            let exchange = match &self.params {
                None => {
                    let config = &self.config;
                    self.window
                        .admit_next(now, |rid, body| creation_request(config, rid, body))
                },
                Some(params) => {
                    let sid = params.sid.as_str();
                    self.window
                        .admit_next(now, |rid, body| wire_body(sid, rid, body))
                },
            };
            let Some(exchange) = exchange else {
                break;
            };
            tracing::debug!(rid = exchange.rid(), payload = exchange.body().payload().len(), "dispatching request");
            self.stats.requests_sent += 1;
            actions.push(Action::Dispatch {
                exchange,
                delay: Duration::ZERO,
                timeout,
            });
        }
    }

    fn schedule_poll(&self, now: Instant, actions: &mut Vec<Action>) {
        let floor = self.config.empty_request_delay();
        match self.window.poll_decision(now) {
            PollDecision::Now => actions.push(Action::SchedulePoll(floor)),
            PollDecision::After(delay) => actions.push(Action::SchedulePoll(delay.max(floor))),
            PollDecision::Idle => {},
        }
    }

    /// Replay `rid` and every later unanswered request, or give up.
    fn recover(&mut self, rid: u64, reason: &str, now: Instant, actions: &mut Vec<Action>) {
        let retry = &self.retry;
        let exhausted = self
            .window
            .unanswered_from(rid)
            .find(|e| !retry.allows(e.attempts()))
            .map(|e| CloseCause::RetryExhausted {
                rid: e.rid(),
                attempts: e.attempts(),
                reason: e.last_failure().unwrap_or(reason).to_string(),
            });
        if let Some(cause) = exhausted {
            self.terminate(cause, actions);
            return;
        }

        let retry_number = self.window.get(rid).map_or(1, Exchange::attempts);
        let delay = self.retry.backoff(retry_number);
        let timeout = self.request_timeout();
        let mut last = rid;

        for exchange in self.window.unanswered_from(rid) {
            if exchange.rid() != rid {
                actions.push(Action::Cancel(exchange.rid()));
            }
            exchange.redeliver(now);
            last = exchange.rid();
            actions.push(Action::Dispatch {
                exchange: exchange.clone(),
                delay,
                timeout,
            });
        }

        self.stats.retries += 1;
        self.replay = Some(match self.replay.take() {
            Some(range) => (*range.start()).min(rid)..=(*range.end()).max(last),
            None => rid..=last,
        });
        if self.state == SessionState::Active {
            self.state = SessionState::Recovering;
        }
        tracing::warn!(from = rid, to = last, delay_ms = delay.as_millis() as u64, reason, "replaying unacknowledged requests");
    }

    fn terminate(&mut self, cause: CloseCause, actions: &mut Vec<Action>) {
        if self.state == SessionState::Terminated {
            return;
        }

        let (outstanding, unsent) = self.window.drain();
        for exchange in &outstanding {
            actions.push(Action::Cancel(exchange.rid()));
        }

        if cause.is_client_requested() {
            tracing::info!(%cause, unsent = unsent.len(), "session closed");
        } else {
            tracing::warn!(%cause, unsent = unsent.len(), "session terminated");
        }

        self.state = SessionState::Terminated;
        self.replay = None;
        self.cause = Some(cause.clone());
        actions.push(Action::Emit(SessionEvent::ConnectionClosed { cause, unsent }));
    }
}

/// Caller body plus the session's `sid` and the assigned `rid`.
fn wire_body(sid: &str, rid: u64, body: &Body) -> Body {
    body.rebuild().attribute(SID, sid).attribute(RID, rid).build()
}

fn body_type(body: &Body) -> Option<BodyType> {
    body.parse_attr(&TYPE).ok().flatten()
}

fn condition(body: &Body) -> Option<TerminalCondition> {
    body.parse_attr(&CONDITION).ok().flatten()
}
