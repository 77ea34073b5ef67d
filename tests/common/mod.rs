//! In-memory connection manager for integration tests.
//!
//! Every dispatched request is parked until the test answers it, so tests
//! control exactly when and in which order responses arrive.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bosh::body::attributes::{RID, SID, VER};
use bosh::protocol::RetryConfig;
use bosh::transport::DispatchResult;
use bosh::{
    AttrName, Body, BoshClient, SessionConfig, SessionEvent, SessionEvents, Transport,
    TransportFailure, TransportResponse,
};
use futures::future::BoxFuture;
use http::StatusCode;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Deadline for anything a test waits on.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// First request id used by [`session_config`].
pub const FIRST_RID: u64 = 5000;

/// A request parked at the stub CM.
pub struct StubConnection {
    /// Body as the client sent it.
    pub request: Body,
    responder: oneshot::Sender<DispatchResult>,
}

impl StubConnection {
    /// Request id carried by the request.
    pub fn rid(&self) -> u64 {
        self.request
            .attribute(&RID)
            .and_then(|rid| rid.parse().ok())
            .expect("request without rid")
    }

    /// Answer with `200 OK`.
    pub fn respond(self, body: Body) {
        let _ = self.responder.send(Ok(TransportResponse::ok(body)));
    }

    /// Answer with an explicit HTTP status.
    pub fn respond_with(self, status: u16, body: Body) {
        let status = StatusCode::from_u16(status).expect("valid status");
        let _ = self
            .responder
            .send(Ok(TransportResponse::with_status(status, body)));
    }

    /// Fail the exchange at the transport level.
    pub fn fail(self, failure: TransportFailure) {
        let _ = self.responder.send(Err(failure));
    }
}

/// Transport that hands every request to the test.
pub struct StubCm {
    tx: mpsc::UnboundedSender<StubConnection>,
    rx: Mutex<mpsc::UnboundedReceiver<StubConnection>>,
}

impl StubCm {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    /// Wait for the next request.
    pub async fn await_connection(&self) -> StubConnection {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(STEP_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("client gone")
    }

    /// Assert that no request arrives within `window`.
    pub async fn assert_no_connection(&self, window: Duration) {
        let mut rx = self.rx.lock().await;
        if let Ok(Some(conn)) = tokio::time::timeout(window, rx.recv()).await {
            panic!("unexpected request rid={}", conn.rid());
        }
    }
}

impl Transport for StubCm {
    fn dispatch(&self, body: Body, _timeout: Duration) -> BoxFuture<'_, DispatchResult> {
        let (responder, response) = oneshot::channel();
        let _ = self.tx.send(StubConnection {
            request: body,
            responder,
        });
        Box::pin(async move {
            response
                .await
                .unwrap_or_else(|_| Err(TransportFailure::network("stub connection dropped")))
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Session configuration with a fixed first rid and no idle polling
/// during the test window.
pub fn session_config() -> SessionConfig {
    SessionConfig {
        initial_rid: Some(FIRST_RID),
        hold: 1,
        wait_secs: 60,
        ..SessionConfig::new("test.example")
    }
}

/// Client over a fresh stub CM.
pub fn connect(config: SessionConfig, retry: RetryConfig) -> (Arc<StubCm>, BoshClient, SessionEvents) {
    let cm = StubCm::new();
    let (client, events) = BoshClient::new(config, retry, cm.clone());
    (cm, client, events)
}

/// Session creation response with `ver`.
pub fn creation_response(sid: &str, extra: &[(AttrName, &str)]) -> Body {
    let mut builder = Body::builder().attribute(SID, sid).attribute(VER, "1.8");
    for (name, value) in extra {
        builder = builder.attribute(name.clone(), *value);
    }
    builder.build()
}

/// Body carrying one payload node.
pub fn payload(xml: &str) -> Body {
    Body::builder().payload(xml).build()
}

/// Wait for the next event.
pub async fn next_event(events: &mut SessionEvents) -> SessionEvent {
    tokio::time::timeout(STEP_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

/// Send the creation request, answer it, and consume the resulting
/// `SessionEstablished` and `BodyReceived` events.
pub async fn establish(
    cm: &StubCm,
    client: &BoshClient,
    events: &mut SessionEvents,
    response: Body,
) -> u64 {
    client.send(Body::empty()).await.expect("send");
    let creation = cm.await_connection().await;
    let rid = creation.rid();
    creation.respond(response);

    assert!(matches!(
        next_event(events).await,
        SessionEvent::SessionEstablished { .. }
    ));
    assert!(matches!(next_event(events).await, SessionEvent::BodyReceived(_)));
    rid
}
