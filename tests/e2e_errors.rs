//! End-to-end error handling tests.
//!
//! Legacy HTTP error codes, recoverable binding errors, transport failures
//! and the retry budget.

mod common;

use std::time::Duration;

use bosh::body::attributes::{HOLD, SID, TYPE, WAIT};
use bosh::protocol::RetryConfig;
use bosh::{Body, CloseCause, SessionEvent, SessionState, TerminalCondition, TransportFailure};
use common::*;

fn fast_retry() -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(3)
        .with_initial_backoff(Duration::from_millis(10))
        .with_max_backoff(Duration::from_millis(20))
}

/// A CM that omits `ver` answering 400 is a terminal error
#[tokio::test]
async fn test_legacy_bad_request_terminates() {
    let (cm, client, mut events) = connect(session_config(), RetryConfig::default());
    client.send(Body::empty()).await.unwrap();

    let creation = cm.await_connection().await;
    let legacy = Body::builder()
        .attribute(SID, "123XYZ")
        .attribute(WAIT, "60")
        .build();
    creation.respond_with(400, legacy);

    match next_event(&mut events).await {
        SessionEvent::ConnectionClosed { cause, .. } => {
            assert_eq!(cause, CloseCause::LegacyHttpError { status: 400 });
            assert_eq!(cause.condition(), Some(TerminalCondition::BadRequest));
        },
        other => panic!("unexpected event {other:?}"),
    }
    assert!(client.send(Body::empty()).await.unwrap_err().is_session_closed());
}

/// The same status from a CM that sent `ver` is not terminal
#[tokio::test]
async fn test_non_legacy_bad_request_is_ignored() {
    let (cm, client, mut events) = connect(session_config(), RetryConfig::default());
    client.send(Body::empty()).await.unwrap();

    cm.await_connection()
        .await
        .respond_with(400, creation_response("123XYZ", &[(WAIT, "60")]));

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::SessionEstablished { .. }
    ));
    assert_eq!(client.state().await, SessionState::Active);
}

/// Legacy 404 after establishment ends the session
#[tokio::test]
async fn test_legacy_item_not_found_after_creation() {
    let (cm, client, mut events) = connect(session_config(), RetryConfig::default());
    establish(
        &cm,
        &client,
        &mut events,
        Body::builder().attribute(SID, "old").attribute(HOLD, "1").build(),
    )
    .await;

    client.send(payload("<m/>")).await.unwrap();
    cm.await_connection().await.respond_with(404, Body::empty());

    match next_event(&mut events).await {
        SessionEvent::ConnectionClosed { cause, .. } => {
            assert_eq!(cause.condition(), Some(TerminalCondition::ItemNotFound));
        },
        other => panic!("unexpected event {other:?}"),
    }
}

/// `type="error"` makes the client resend the same request
#[tokio::test]
async fn test_recoverable_error_resends_identical_request() {
    let (cm, client, mut events) = connect(session_config(), fast_retry());
    establish(&cm, &client, &mut events, creation_response("s1", &[])).await;

    client.send(payload("<important/>")).await.unwrap();
    let original = cm.await_connection().await;
    let sent = original.request.clone();
    original.respond(Body::builder().attribute(TYPE, "error").build());

    let resent = cm.await_connection().await;
    assert_eq!(resent.request, sent);
    resent.respond(payload("<ok/>"));

    match next_event(&mut events).await {
        SessionEvent::BodyReceived(body) => assert_eq!(body.payload()[0].as_str(), "<ok/>"),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(client.state().await, SessionState::Active);
    assert_eq!(client.stats().await.retries, 1);
}

/// Sends made while recovering wait until the replay is acknowledged
#[tokio::test]
async fn test_sends_wait_while_recovering() {
    let (cm, client, mut events) = connect(session_config(), fast_retry());
    establish(&cm, &client, &mut events, creation_response("s1", &[])).await;

    client.send(payload("<first/>")).await.unwrap();
    let failed = cm.await_connection().await;
    let rid = failed.rid();
    failed.fail(TransportFailure::network("connection reset"));

    let resent = cm.await_connection().await;
    assert_eq!(resent.rid(), rid);
    client.send(payload("<second/>")).await.unwrap();
    assert_eq!(client.state().await, SessionState::Recovering);
    cm.assert_no_connection(Duration::from_millis(100)).await;

    resent.respond(Body::empty());
    let next = cm.await_connection().await;
    assert_eq!(next.rid(), rid + 1);
    assert_eq!(next.request.payload()[0].as_str(), "<second/>");
    assert_eq!(client.state().await, SessionState::Active);
}

/// Repeated transport failures exhaust the retry budget
#[tokio::test]
async fn test_retry_exhaustion_terminates() {
    let (cm, client, mut events) = connect(session_config(), fast_retry());
    establish(&cm, &client, &mut events, creation_response("s1", &[])).await;

    client.send(payload("<doomed/>")).await.unwrap();
    client.send(payload("<queued/>")).await.unwrap();

    let mut rids = Vec::new();
    for _ in 0..3 {
        let conn = cm.await_connection().await;
        rids.push(conn.rid());
        conn.fail(TransportFailure::network("connection refused"));
    }
    assert!(rids.windows(2).all(|w| w[0] == w[1]));

    match next_event(&mut events).await {
        SessionEvent::ConnectionClosed { cause, unsent } => {
            match cause {
                CloseCause::RetryExhausted { rid, attempts, reason } => {
                    assert_eq!(rid, rids[0]);
                    assert_eq!(attempts, 3);
                    assert!(reason.contains("connection refused"));
                },
                other => panic!("unexpected cause {other:?}"),
            }
            assert_eq!(unsent.len(), 1);
            assert_eq!(unsent[0].payload()[0].as_str(), "<queued/>");
        },
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(client.state().await, SessionState::Terminated);
}

/// Close abandons outstanding work and reports what never went out
#[tokio::test]
async fn test_close_reports_unsent_bodies() {
    let (cm, client, mut events) = connect(session_config(), RetryConfig::default());
    establish(&cm, &client, &mut events, creation_response("s1", &[])).await;

    client.send(payload("<in-flight/>")).await.unwrap();
    client.send(payload("<waiting/>")).await.unwrap();
    let _in_flight = cm.await_connection().await;

    client.close().await;
    match next_event(&mut events).await {
        SessionEvent::ConnectionClosed { cause, unsent } => {
            assert_eq!(cause, CloseCause::ClientRequested);
            assert_eq!(unsent.len(), 1);
        },
        other => panic!("unexpected event {other:?}"),
    }
    cm.assert_no_connection(Duration::from_millis(100)).await;
}
