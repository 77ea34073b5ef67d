//! Async session driver.
//!
//! [`BoshClient`] owns a [`Session`] behind a mutex and carries out the
//! [`Action`]s it returns: each dispatch runs as its own tokio task with a
//! deadline, poll ticks are timers, and events go to the [`SessionEvents`]
//! stream handed out at construction.
//!
//! ```text
//!  send() ──lock──> Session ──Actions──> apply()
//!                      ^                   │ spawn   ┌─────────────┐
//!                      │                   ├───────> │ deliver(k)  │──> Transport
//!                      │  on_response /    │         └─────────────┘
//!                      └── on_failure ─────┘ emit ──> SessionEvents
//! ```
//!
//! Actions are applied while the lock is held and without awaiting, so the
//! consumer sees events in exactly the order the session produced them.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;

use crate::body::Body;
use crate::config::{Config, SessionConfig};
use crate::error::Result;
use crate::protocol::{
    Action, Exchange, NegotiatedParams, RetryConfig, Session, SessionEvent, SessionState,
    SessionStats,
};
use crate::transport::{HttpTransport, Transport, TransportFailure};

/// Handle to a BOSH session. Cheap to clone; all clones drive the same
/// session.
#[derive(Clone)]
pub struct BoshClient {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

struct Inner {
    session: Session,
    /// In-flight deliveries by request id, with their attempt number.
    tasks: HashMap<u64, (u32, AbortHandle)>,
    poll_task: Option<AbortHandle>,
}

impl BoshClient {
    /// Create a client over `transport`. The session is created by the
    /// first [`BoshClient::send`].
    pub fn new(
        config: SessionConfig,
        retry: RetryConfig,
        transport: Arc<dyn Transport>,
    ) -> (Self, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                session: Session::new(config, retry),
                tasks: HashMap::new(),
                poll_task: None,
            }),
            transport,
            events: tx,
        });
        (Self { shared }, SessionEvents { rx })
    }

    /// Create a client over HTTP from a full configuration.
    pub fn from_config(config: &Config) -> Result<(Self, SessionEvents)> {
        config.validate()?;
        let transport = HttpTransport::new(&config.transport)?;
        Ok(Self::new(
            config.session.clone(),
            config.retry.clone(),
            Arc::new(transport),
        ))
    }

    /// Create the session explicitly. `initial` supplies extra attributes
    /// and payload for the creation request.
    pub async fn create_session(&self, initial: Body) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let actions = inner.session.create(initial, Instant::now())?;
        apply(&self.shared, &mut inner, actions);
        Ok(())
    }

    /// Queue a body for delivery.
    ///
    /// Returns once the body is accepted; delivery happens in the
    /// background. Fails if the session is terminated or the body is
    /// invalid.
    pub async fn send(&self, body: Body) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let actions = inner.session.send(body, Instant::now())?;
        apply(&self.shared, &mut inner, actions);
        Ok(())
    }

    /// Graceful disconnect with an empty terminate body.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_with(Body::empty()).await
    }

    /// Graceful disconnect. `body` (typically carrying final payload such
    /// as an unavailable presence) is sent with `type="terminate"`.
    pub async fn disconnect_with(&self, body: Body) -> Result<()> {
        let (terminate, timeout) = {
            let mut inner = self.shared.inner.lock().await;
            let timeout = inner.session.request_timeout();
            let (terminate, actions) = inner.session.disconnect(Some(body), Instant::now())?;
            apply(&self.shared, &mut inner, actions);
            (terminate, timeout)
        };

        if let Some(exchange) = terminate {
            let rid = exchange.rid();
            match deliver_once(self.shared.transport.as_ref(), &exchange, timeout).await {
                Ok(response) => {
                    tracing::debug!(rid, status = response.status.as_u16(), "terminate acknowledged");
                },
                Err(failure) => {
                    tracing::debug!(rid, %failure, "terminate request not acknowledged");
                },
            }
        }
        Ok(())
    }

    /// Abandon the session without notifying the connection manager.
    pub async fn close(&self) {
        let mut inner = self.shared.inner.lock().await;
        let actions = inner.session.close();
        apply(&self.shared, &mut inner, actions);
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        self.shared.inner.lock().await.session.state()
    }

    /// Session id assigned by the CM.
    pub async fn session_id(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .await
            .session
            .session_id()
            .map(str::to_string)
    }

    /// Negotiated parameters, once established.
    pub async fn params(&self) -> Option<NegotiatedParams> {
        self.shared.inner.lock().await.session.params().cloned()
    }

    /// Session statistics.
    pub async fn stats(&self) -> SessionStats {
        self.shared.inner.lock().await.session.stats()
    }

    /// Name of the underlying transport.
    pub fn transport_name(&self) -> &'static str {
        self.shared.transport.name()
    }
}

impl std::fmt::Debug for BoshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoshClient")
            .field("transport", &self.shared.transport.name())
            .finish_non_exhaustive()
    }
}

/// Stream of [`SessionEvent`]s, in the order the session produced them.
///
/// Ends after [`SessionEvent::ConnectionClosed`] once every client handle
/// has been dropped.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    /// Next event, or `None` when the session is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Next event if one is ready.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for SessionEvents {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Carry out session actions. Must not await.
fn apply(shared: &Arc<Shared>, inner: &mut Inner, actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::Dispatch {
                exchange,
                delay,
                timeout,
            } => {
                let rid = exchange.rid();
                let attempt = exchange.attempts();
                let task = tokio::spawn(deliver(Arc::downgrade(shared), exchange, delay, timeout));
                inner.tasks.insert(rid, (attempt, task.abort_handle()));
            },
            Action::Cancel(rid) => {
                if let Some((_, task)) = inner.tasks.remove(&rid) {
                    task.abort();
                }
            },
            Action::SchedulePoll(delay) => {
                if let Some(task) = inner.poll_task.take() {
                    task.abort();
                }
                let task = tokio::spawn(poll_after(Arc::downgrade(shared), delay));
                inner.poll_task = Some(task.abort_handle());
            },
            Action::Emit(event) => {
                if matches!(event, SessionEvent::ConnectionClosed { .. }) {
                    if let Some(task) = inner.poll_task.take() {
                        task.abort();
                    }
                }
                tracing::trace!(kind = event.kind(), "event");
                // Receiver gone means nobody is listening; the session still runs
                let _ = shared.events.send(event);
            },
        }
    }
}

async fn deliver_once(
    transport: &dyn Transport,
    exchange: &Exchange,
    timeout: Duration,
) -> crate::transport::DispatchResult {
    match tokio::time::timeout(timeout, transport.dispatch(exchange.body().clone(), timeout)).await
    {
        Ok(result) => result,
        Err(_) => Err(TransportFailure::timeout(timeout)),
    }
}

async fn deliver(shared: Weak<Shared>, exchange: Exchange, delay: Duration, timeout: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let Some(transport) = shared.upgrade().map(|s| Arc::clone(&s.transport)) else {
        return;
    };

    let rid = exchange.rid();
    let attempt = exchange.attempts();
    let result = deliver_once(transport.as_ref(), &exchange, timeout).await;

    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.inner.lock().await;
    if inner.tasks.get(&rid).is_some_and(|(a, _)| *a == attempt) {
        inner.tasks.remove(&rid);
    }

    let now = Instant::now();
    let actions = match result {
        Ok(response) => inner.session.on_response(rid, attempt, response, now),
        Err(failure) => inner.session.on_failure(rid, attempt, &failure, now),
    };
    apply(&shared, &mut inner, actions);
}

async fn poll_after(shared: Weak<Shared>, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.inner.lock().await;
    inner.poll_task = None;
    let actions = inner.session.poll(Instant::now());
    apply(&shared, &mut inner, actions);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::attributes::{HOLD, SID, VER};
    use crate::protocol::CloseCause;
    use crate::transport::{DispatchResult, TransportResponse};
    use futures::future::BoxFuture;
    use futures::StreamExt;

    /// Answers every request immediately with a fixed session.
    struct EchoCm;

    impl Transport for EchoCm {
        fn dispatch(&self, body: Body, _timeout: Duration) -> BoxFuture<'_, DispatchResult> {
            Box::pin(async move {
                let response = Body::builder()
                    .attribute(SID, "echo")
                    .attribute(VER, "1.8")
                    .attribute(HOLD, "1")
                    .payloads(body.payload().iter().map(ToString::to_string))
                    .build();
                Ok(TransportResponse::ok(response))
            })
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    /// Never answers.
    struct SilentCm;

    impl Transport for SilentCm {
        fn dispatch(&self, _body: Body, _timeout: Duration) -> BoxFuture<'_, DispatchResult> {
            Box::pin(futures::future::pending())
        }

        fn name(&self) -> &'static str {
            "silent"
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            initial_rid: Some(1),
            wait_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_establishes_and_echoes() {
        let (client, mut events) = BoshClient::new(config(), RetryConfig::default(), Arc::new(EchoCm));
        client
            .send(Body::builder().payload("<hello/>").build())
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::SessionEstablished { sid, .. } => assert_eq!(sid, "echo"),
            other => panic!("unexpected event {other:?}"),
        }
        match events.next().await.unwrap() {
            SessionEvent::BodyReceived(body) => assert_eq!(body.payload()[0].as_str(), "<hello/>"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(client.state().await, SessionState::Active);
        assert_eq!(client.session_id().await.as_deref(), Some("echo"));
        assert_eq!(client.transport_name(), "echo");
    }

    #[tokio::test]
    async fn test_close_cancels_outstanding() {
        let (client, mut events) =
            BoshClient::new(config(), RetryConfig::default(), Arc::new(SilentCm));
        client.send(Body::empty()).await.unwrap();
        client.send(Body::builder().payload("<queued/>").build()).await.unwrap();

        client.close().await;
        match events.recv().await.unwrap() {
            SessionEvent::ConnectionClosed { cause, unsent } => {
                assert_eq!(cause, CloseCause::ClientRequested);
                assert_eq!(unsent.len(), 1);
            },
            other => panic!("unexpected event {other:?}"),
        }
        assert!(client.send(Body::empty()).await.unwrap_err().is_session_closed());
        assert!(client.disconnect().await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_exhausts_retries() {
        let retry = RetryConfig::default()
            .with_max_attempts(2)
            .with_initial_backoff(Duration::from_millis(10));
        let config = SessionConfig {
            timeout_margin_secs: 0,
            ..config()
        };
        let (client, mut events) = BoshClient::new(config, retry, Arc::new(SilentCm));
        client.send(Body::empty()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SessionEvent::ConnectionClosed {
                cause: CloseCause::RetryExhausted { attempts: 2, .. },
                ..
            }
        ));
        assert_eq!(client.state().await, SessionState::Terminated);
    }
}
