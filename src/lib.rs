//! # bosh-core - BOSH (XEP-0124) client session engine
//!
//! Emulates a bidirectional stream between a client and a connection
//! manager (CM) using synchronous HTTP request/response pairs, without
//! polling the CM more often than it allows.
//!
//! ## Features
//!
//! - **Session creation**: proposes `hold`/`wait`/`ver`, adopts the CM's
//!   `sid`, `requests`, `polling` and `inactivity`
//! - **Request ids**: strictly increasing, one per request, reused only for
//!   resends
//! - **Pipelining**: up to the negotiated window of concurrent requests,
//!   excess sends queued in order
//! - **Empty requests**: keep the CM supplied with held requests, spaced by
//!   the polling interval
//! - **In-order delivery**: responses released in request id order
//! - **Recovery**: transient failures and `type="error"` replay every
//!   unacknowledged request with identical bodies, with backoff
//! - **Termination**: CM `type="terminate"`, legacy HTTP 400/403/404,
//!   exhausted retries, or client disconnect
//!
//! ## Architecture
//!
//! ```text
//!  caller ──send()──> BoshClient ──lock──> Session (sans-I/O state machine)
//!                         │                    │
//!                         │ <──── Actions ─────┘
//!                         │
//!                         ├── Dispatch ──> Transport (reqwest HttpTransport)
//!                         ├── SchedulePoll ──> timer ──> Session::poll
//!                         └── Emit ──> SessionEvents stream ──> caller
//! ```
//!
//! ### State Machine
//!
//! ```text
//!               send()                 creation response
//!     [Idle] ───────────> [Creating] ──────────────────────> [Active]
//!                              │                            │      ^
//!                              │ terminate / legacy error   │ error│ replay acked
//!                              │ retries exhausted          v      │
//!                              │                        [Recovering]
//!                              v                            │
//!                        [Terminated] <─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bosh::{Body, BoshClient, Config, SessionEvent};
//!
//! # async fn run() -> bosh::Result<()> {
//! let mut config = Config::default();
//! config.transport.uri = "https://example.com/http-bind".to_string();
//! config.session.to = "example.com".to_string();
//!
//! let (client, mut events) = BoshClient::from_config(&config)?;
//! client.send(Body::empty()).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::SessionEstablished { sid, .. } => println!("session {sid}"),
//!         SessionEvent::BodyReceived(body) => println!("{body}"),
//!         SessionEvent::ConnectionClosed { cause, .. } => {
//!             println!("closed: {cause}");
//!             break;
//!         },
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`body`]: `<body/>` wrapper model, attribute registry and XML codec
//! - [`protocol`]: Session state machine, pipelining window and retry policy
//! - [`client`]: Async driver and event stream
//! - [`transport`]: Transport trait and the reqwest HTTP transport
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use body::{AttrName, Body, BodyBuilder, BodyType, Payload, TerminalCondition, Version};
pub use client::{BoshClient, SessionEvents};
pub use config::{Config, SessionConfig};
pub use error::{BoshError, Result};
pub use protocol::{
    CloseCause, NegotiatedParams, RetryConfig, Session, SessionEvent, SessionState, SessionStats,
    PROTOCOL_VERSION,
};
pub use transport::{HttpTransport, HttpTransportConfig, Transport, TransportFailure, TransportResponse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
