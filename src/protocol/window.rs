//! Pipelining window manager.
//!
//! Decides, for every body handed to the session, whether it goes out now
//! or waits in a FIFO queue, and when an empty request should be
//! synthesized to keep the connection manager's receive window full.
//!
//! The bound on outstanding requests is enforced here and nowhere else:
//! [`Window::admit_next`] and [`Window::admit_empty`] refuse to create an
//! exchange (and consume no request id) once the window is full.
//!
//! ```text
//!   send() ──> [pending FIFO] ──admit──> [outstanding, rid order] ──release──> consumer
//!                                  ^                                    |
//!                                  └──────── slot freed ────────────────┘
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::exchange::Exchange;
use crate::body::Body;

/// Whether an empty request should be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Send one now.
    Now,
    /// Polling interval not yet elapsed; check again after this long.
    After(Duration),
    /// The receive window is full, work is queued, or refill is disabled.
    Idle,
}

/// Outstanding requests plus the queue of bodies waiting for a slot.
#[derive(Debug)]
pub struct Window {
    next_rid: u64,
    outstanding: VecDeque<Exchange>,
    pending: VecDeque<Body>,
    limit: u32,
    empty_target: u32,
    polling: Duration,
    last_empty: Option<Instant>,
}

impl Window {
    /// Window for a session that has not been established: one slot, no
    /// empty requests.
    pub fn new(first_rid: u64) -> Self {
        Self {
            next_rid: first_rid,
            outstanding: VecDeque::new(),
            pending: VecDeque::new(),
            limit: 1,
            empty_target: 0,
            polling: Duration::ZERO,
            last_empty: None,
        }
    }

    /// Apply negotiated limits.
    pub fn configure(&mut self, limit: u32, empty_target: u32, polling: Duration) {
        self.limit = limit.max(1);
        self.empty_target = empty_target.min(self.limit);
        self.polling = polling;
    }

    /// Request id the next admitted exchange will get.
    pub fn next_rid(&self) -> u64 {
        self.next_rid
    }

    /// Maximum outstanding exchanges.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Exchanges dispatched and not yet released.
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Bodies waiting for a slot.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Whether another exchange may be admitted.
    pub fn has_capacity(&self) -> bool {
        self.outstanding.len() < self.limit as usize
    }

    /// Append a body to the send queue.
    pub fn enqueue(&mut self, body: Body) {
        self.pending.push_back(body);
    }

    /// Admit the head of the queue if there is room.
    ///
    /// `compose` turns the caller's body into the wire body for the
    /// assigned request id.
    pub fn admit_next(
        &mut self,
        now: Instant,
        compose: impl FnOnce(u64, &Body) -> Body,
    ) -> Option<Exchange> {
        if !self.has_capacity() {
            return None;
        }
        let body = self.pending.pop_front()?;
        let rid = self.take_rid();
        Some(self.push(Exchange::new(rid, compose(rid, &body), now, false)))
    }

    /// Admit an empty request if there is room and nothing is queued.
    pub fn admit_empty(
        &mut self,
        now: Instant,
        compose: impl FnOnce(u64, &Body) -> Body,
    ) -> Option<Exchange> {
        if !self.has_capacity() || !self.pending.is_empty() {
            return None;
        }
        let rid = self.take_rid();
        self.last_empty = Some(now);
        Some(self.push(Exchange::new(rid, compose(rid, &Body::empty()), now, true)))
    }

    /// Consume a request id outside the window (session termination).
    pub fn take_rid(&mut self) -> u64 {
        let rid = self.next_rid;
        self.next_rid += 1;
        rid
    }

    fn push(&mut self, exchange: Exchange) -> Exchange {
        debug_assert!(self.has_capacity());
        self.outstanding.push_back(exchange.clone());
        exchange
    }

    /// Whether an empty request should be synthesized at `now`.
    pub fn poll_decision(&self, now: Instant) -> PollDecision {
        if self.empty_target == 0
            || !self.pending.is_empty()
            || self.outstanding.len() >= self.empty_target as usize
        {
            return PollDecision::Idle;
        }
        if self.polling.is_zero() {
            return PollDecision::Now;
        }
        match self.last_empty {
            None => PollDecision::Now,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed >= self.polling {
                    PollDecision::Now
                } else {
                    PollDecision::After(self.polling - elapsed)
                }
            },
        }
    }

    /// Outstanding exchange by request id.
    pub fn get(&self, rid: u64) -> Option<&Exchange> {
        self.outstanding.iter().find(|e| e.rid() == rid)
    }

    /// Mutable outstanding exchange by request id.
    pub fn get_mut(&mut self, rid: u64) -> Option<&mut Exchange> {
        self.outstanding.iter_mut().find(|e| e.rid() == rid)
    }

    /// Outstanding exchanges in request id order.
    pub fn outstanding(&self) -> impl Iterator<Item = &Exchange> {
        self.outstanding.iter()
    }

    /// Unanswered exchanges with request id `rid` or greater.
    pub fn unanswered_from(&mut self, rid: u64) -> impl Iterator<Item = &mut Exchange> {
        self.outstanding
            .iter_mut()
            .filter(move |e| e.rid() >= rid && !e.is_complete())
    }

    /// Remove answered exchanges from the front of the window, in request
    /// id order, stopping at the first one still waiting for a response.
    pub fn release(&mut self) -> Vec<Exchange> {
        let mut released = Vec::new();
        while self.outstanding.front().is_some_and(Exchange::is_complete) {
            if let Some(exchange) = self.outstanding.pop_front() {
                released.push(exchange);
            }
        }
        released
    }

    /// Empty the window and the queue.
    pub fn drain(&mut self) -> (Vec<Exchange>, Vec<Body>) {
        (
            self.outstanding.drain(..).collect(),
            self.pending.drain(..).collect(),
        )
    }
}
