//! BOSH session engine.
//!
//! Implements the client side of XEP-0124: session creation, request id
//! sequencing, pipelining within the negotiated window, empty-request
//! polling, in-order delivery of responses, recovery from transient
//! failures and session termination.
//!
//! # Protocol Overview
//!
//! The client talks to a connection manager (CM) over plain HTTP
//! request/response pairs. Each request carries one `<body/>` and a
//! request id one greater than the previous. The CM holds up to `hold`
//! requests open so it always has one to answer when it has data.
//!
//! ## Message Flow
//!
//! ```text
//! Client                                  CM
//!    |                                     |
//!    |--- <body rid=k to= hold= wait=> --->|  Session creation
//!    |<-- <body sid= requests= wait=> -----|  Parameters
//!    |                                     |
//!    |--- <body sid= rid=k+1> payload ---->|  Pipelined requests
//!    |--- <body sid= rid=k+2/> ----------->|  Empty request (poll)
//!    |<-- payload -------------------------|  Released in rid order
//!    |                                     |
//!    |--- <body type=terminate> ---------->|  Disconnect
//! ```
//!
//! ## State Machine
//!
//! | State        | Description                           | Valid Transitions       |
//! |--------------|---------------------------------------|-------------------------|
//! | `Idle`       | Constructed, nothing sent             | → Creating, Terminated  |
//! | `Creating`   | Creation request in flight            | → Active, Terminated    |
//! | `Active`     | Normal operation                      | → Recovering, Terminated|
//! | `Recovering` | Replaying unanswered requests         | → Active, Terminated    |
//! | `Terminated` | Session over                          | (terminal)              |
//!
//! ## Terminal Causes
//!
//! | Cause               | Trigger                                        |
//! |---------------------|------------------------------------------------|
//! | `ClientRequested`   | `disconnect()` or `close()`                    |
//! | `CmTerminated`      | Response with `type="terminate"`               |
//! | `LegacyHttpError`   | HTTP 400/403/404 from a CM that omitted `ver`  |
//! | `RetryExhausted`    | A request used up its delivery attempts        |
//! | `ProtocolViolation` | Missing `sid` or malformed CM parameters       |
//!
//! # Usage
//!
//! The engine is sans-I/O. The driver feeds it inputs and executes the
//! returned [`Action`]s:
//!
//! ```rust
//! use std::time::Instant;
//! use bosh::body::Body;
//! use bosh::config::SessionConfig;
//! use bosh::protocol::{Action, RetryConfig, Session, SessionState};
//!
//! let mut session = Session::new(SessionConfig::default(), RetryConfig::default());
//! let actions = session.send(Body::empty(), Instant::now()).unwrap();
//!
//! assert_eq!(session.state(), SessionState::Creating);
//! assert!(matches!(actions[0], Action::Dispatch { .. }));
//! ```

mod event;
mod exchange;
mod params;
mod retry;
mod session;
mod window;

pub use event::{CloseCause, SessionEvent};
pub use exchange::Exchange;
pub use params::NegotiatedParams;
pub use retry::RetryConfig;
pub use session::{Action, Session, SessionState, SessionStats, LEGACY_ERROR_STATUSES};
pub use window::{PollDecision, Window};

use crate::body::Version;

/// Highest protocol version this client speaks
pub const PROTOCOL_VERSION: Version = Version::new(1, 8);
