//! Session parameters for the creation handshake.
//!
//! The client proposes `hold`, `wait` and `ver` in its session creation
//! request; the connection manager's creation response is authoritative
//! for everything it specifies. Omitted values fall back to what the client
//! proposed.

use std::time::Duration;

use serde::Serialize;

use crate::body::attributes::{
    ACCEPT, ACK, AUTHID, CHARSETS, FROM, HOLD, INACTIVITY, MAXPAUSE, POLLING, REQUESTS, RID,
    ROUTE, SECURE, SID, TO, VER, WAIT, XML_LANG, XMPP_VERSION,
};
use crate::body::{AttrName, Body, Version};
use crate::config::SessionConfig;
use crate::error::{BoshError, Result};

/// Compose the session creation request.
///
/// Precedence, lowest first: configured extra attributes, the caller's
/// own attributes, then the attributes the session itself proposes.
pub(crate) fn creation_request(config: &SessionConfig, rid: u64, body: &Body) -> Body {
    let mut builder = Body::builder();
    for (name, value) in &config.attributes {
        builder = builder.attribute(AttrName::new(name.clone()), value);
    }
    for (name, value) in body.attributes() {
        builder = builder.attribute(name.clone(), value);
    }

    builder = builder
        .attribute(TO, &config.to)
        .attribute(XML_LANG, &config.lang)
        .attribute(VER, config.version)
        .attribute(WAIT, config.wait_secs)
        .attribute(HOLD, config.hold)
        .attribute(RID, rid)
        .attribute_opt(ROUTE, config.route.as_ref())
        .attribute_opt(FROM, config.from.as_ref())
        .attribute_opt(XMPP_VERSION, config.xmpp_version.as_ref());

    if config.ack {
        builder = builder.attribute(ACK, 1);
    }

    builder
        .payloads(body.payload().iter().map(|p| p.as_str().to_string()))
        .build()
}

/// Parameters in effect once the connection manager has answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegotiatedParams {
    /// Session identifier assigned by the CM.
    pub sid: String,
    /// Requests the CM may keep waiting.
    pub hold: u32,
    /// Requests the client may have outstanding.
    pub requests: u32,
    /// Longest time the CM holds a request, in seconds.
    pub wait_secs: u32,
    /// Shortest interval between empty requests, in seconds (0 = none).
    pub polling_secs: u32,
    /// Longest client inactivity the CM tolerates, in seconds.
    pub inactivity_secs: Option<u32>,
    /// Longest pause the CM allows, in seconds.
    pub max_pause_secs: Option<u32>,
    /// Negotiated protocol version; `None` for a legacy CM.
    pub version: Option<Version>,
    /// The CM omitted `ver` and signals errors with HTTP status codes.
    pub legacy: bool,
    /// The CM acknowledges requests.
    pub ack: bool,
    /// Content codings the CM accepts.
    pub accept: Option<String>,
    /// Character sets the CM accepts.
    pub charsets: Option<String>,
    /// Stream authentication identifier.
    pub authid: Option<String>,
    /// Whether the CM-to-server link is secure.
    pub secure: Option<bool>,
}

impl NegotiatedParams {
    /// Read parameters from a session creation response.
    ///
    /// Nothing is applied when any attribute is malformed.
    pub fn from_response(proposed: &SessionConfig, response: &Body) -> Result<Self> {
        let sid = response
            .attribute(&SID)
            .filter(|sid| !sid.trim().is_empty())
            .ok_or_else(|| {
                BoshError::Protocol("session creation response missing sid".to_string())
            })?
            .to_string();

        let version: Option<Version> = response.parse_attr(&VER)?;
        let hold = response.parse_attr::<u32>(&HOLD)?.unwrap_or(proposed.hold);
        let requests = match response.parse_attr::<u32>(&REQUESTS)? {
            Some(0) => {
                return Err(BoshError::invalid_attribute(
                    REQUESTS.as_str(),
                    "0",
                    "must be at least 1",
                ))
            },
            Some(requests) => requests,
            None => hold.saturating_add(1),
        };
        let wait_secs = response
            .parse_attr::<u32>(&WAIT)?
            .unwrap_or(proposed.wait_secs);

        Ok(Self {
            sid,
            hold,
            requests,
            wait_secs,
            polling_secs: response.parse_attr::<u32>(&POLLING)?.unwrap_or(0),
            inactivity_secs: response.parse_attr(&INACTIVITY)?,
            max_pause_secs: response.parse_attr(&MAXPAUSE)?,
            version: version.map(|v| v.min(proposed.version)),
            legacy: version.is_none(),
            ack: response.parse_attr::<u64>(&ACK)?.is_some(),
            accept: response.parse_attr(&ACCEPT)?,
            charsets: response.parse_attr(&CHARSETS)?,
            authid: response.parse_attr(&AUTHID)?,
            secure: response.parse_attr(&SECURE)?,
        })
    }

    /// Maximum outstanding requests.
    ///
    /// One when the CM holds at most one request, otherwise the CM's
    /// `requests` limit.
    pub fn send_window(&self) -> u32 {
        if self.hold <= 1 {
            1
        } else {
            self.requests.max(1)
        }
    }

    /// Outstanding-request level empty requests refill to (0 = none).
    pub fn empty_target(&self) -> u32 {
        if self.hold > 1 {
            self.hold.min(self.send_window())
        } else {
            0
        }
    }

    /// Longest time the CM may hold a request.
    pub fn wait(&self) -> Duration {
        Duration::from_secs(u64::from(self.wait_secs))
    }

    /// Shortest interval between empty requests.
    pub fn polling(&self) -> Duration {
        Duration::from_secs(u64::from(self.polling_secs))
    }
}
