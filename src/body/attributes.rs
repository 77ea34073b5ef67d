//! Attribute registry for the `<body/>` wrapper.
//!
//! XEP-0124 defines a fixed vocabulary of attributes on `<body/>`. Each
//! registered name has a parsing rule (numeric, enumerated, or version);
//! anything else a connection manager sends is kept as an opaque extension.
//!
//! | Attribute    | Rule                  | Used by                        |
//! |--------------|-----------------------|--------------------------------|
//! | `rid`        | `u64`                 | every request                  |
//! | `hold`       | `u32`                 | session creation               |
//! | `wait`       | `u32` seconds         | session creation               |
//! | `requests`   | `u32`, at least 1     | creation response              |
//! | `polling`    | `u32` seconds         | creation response              |
//! | `inactivity` | `u32` seconds         | creation response              |
//! | `maxpause`   | `u32` seconds         | creation response              |
//! | `ver`        | `major.minor`         | creation request and response  |
//! | `type`       | `terminate` / `error` | any response                   |
//! | `condition`  | terminal condition    | terminate responses            |
//! | `ack`        | `u64`                 | requests and responses         |

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Body;
use crate::error::{BoshError, Result};

/// Qualified attribute name, e.g. `sid`, `xml:lang` or `xmpp:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrName(Cow<'static, str>);

impl AttrName {
    /// Name from a static string (registry constants).
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Name from an owned string (CM extensions).
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Qualified name as written on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace prefix, if the name is qualified.
    pub fn prefix(&self) -> Option<&str> {
        self.0.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Whether this is one of the names in the protocol registry.
    pub fn is_registered(&self) -> bool {
        REGISTERED.iter().any(|known| known == self)
    }
}

impl fmt::Display for AttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for AttrName {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for AttrName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Content types the client accepts for compressed payloads.
pub const ACCEPT: AttrName = AttrName::from_static("accept");
/// Request acknowledgement.
pub const ACK: AttrName = AttrName::from_static("ack");
/// Stream authentication identifier.
pub const AUTHID: AttrName = AttrName::from_static("authid");
/// Character sets the CM accepts besides UTF-8.
pub const CHARSETS: AttrName = AttrName::from_static("charsets");
/// Terminal binding condition.
pub const CONDITION: AttrName = AttrName::from_static("condition");
/// HTTP content type of responses.
pub const CONTENT: AttrName = AttrName::from_static("content");
/// Originator of the stream.
pub const FROM: AttrName = AttrName::from_static("from");
/// Maximum requests the CM may keep waiting.
pub const HOLD: AttrName = AttrName::from_static("hold");
/// Maximum seconds of client inactivity.
pub const INACTIVITY: AttrName = AttrName::from_static("inactivity");
/// Key sequencing value.
pub const KEY: AttrName = AttrName::from_static("key");
/// Longest pause the CM allows, in seconds.
pub const MAXPAUSE: AttrName = AttrName::from_static("maxpause");
/// New key sequence.
pub const NEWKEY: AttrName = AttrName::from_static("newkey");
/// Temporary pause request.
pub const PAUSE: AttrName = AttrName::from_static("pause");
/// Shortest allowable interval between empty requests, in seconds.
pub const POLLING: AttrName = AttrName::from_static("polling");
/// Request the CM reports as lost.
pub const REPORT: AttrName = AttrName::from_static("report");
/// Concurrent request limit.
pub const REQUESTS: AttrName = AttrName::from_static("requests");
/// XMPP stream restart (XEP-0206).
pub const RESTART: AttrName = AttrName::from_static("xmpp:restart");
/// Request identifier.
pub const RID: AttrName = AttrName::from_static("rid");
/// Proxy route hint.
pub const ROUTE: AttrName = AttrName::from_static("route");
/// Whether the CM-to-server link is secure.
pub const SECURE: AttrName = AttrName::from_static("secure");
/// Sequence number.
pub const SEQ: AttrName = AttrName::from_static("seq");
/// Session identifier.
pub const SID: AttrName = AttrName::from_static("sid");
/// Stream name for multi-stream sessions.
pub const STREAM: AttrName = AttrName::from_static("stream");
/// Time the CM took to report a lost request.
pub const TIME: AttrName = AttrName::from_static("time");
/// Target domain.
pub const TO: AttrName = AttrName::from_static("to");
/// Body type (`terminate`, `error`).
pub const TYPE: AttrName = AttrName::from_static("type");
/// Protocol version.
pub const VER: AttrName = AttrName::from_static("ver");
/// Longest time the CM may hold a request, in seconds.
pub const WAIT: AttrName = AttrName::from_static("wait");
/// Default language.
pub const XML_LANG: AttrName = AttrName::from_static("xml:lang");
/// XMPP version (XEP-0206).
pub const XMPP_VERSION: AttrName = AttrName::from_static("xmpp:version");

const REGISTERED: &[AttrName] = &[
    ACCEPT,
    ACK,
    AUTHID,
    CHARSETS,
    CONDITION,
    CONTENT,
    FROM,
    HOLD,
    INACTIVITY,
    KEY,
    MAXPAUSE,
    NEWKEY,
    PAUSE,
    POLLING,
    REPORT,
    REQUESTS,
    RESTART,
    RID,
    ROUTE,
    SECURE,
    SEQ,
    SID,
    STREAM,
    TIME,
    TO,
    TYPE,
    VER,
    WAIT,
    XML_LANG,
    XMPP_VERSION,
];

/// A typed attribute value that can be parsed from its wire form.
pub trait AttrValue: Sized {
    /// Parse `raw` as the value of attribute `name`.
    fn parse_attr(name: &AttrName, raw: &str) -> Result<Self>;
}

impl AttrValue for u32 {
    fn parse_attr(name: &AttrName, raw: &str) -> Result<Self> {
        raw.trim()
            .parse()
            .map_err(|e| BoshError::invalid_attribute(name.as_str(), raw, format!("{e}")))
    }
}

impl AttrValue for u64 {
    fn parse_attr(name: &AttrName, raw: &str) -> Result<Self> {
        raw.trim()
            .parse()
            .map_err(|e| BoshError::invalid_attribute(name.as_str(), raw, format!("{e}")))
    }
}

impl AttrValue for bool {
    fn parse_attr(name: &AttrName, raw: &str) -> Result<Self> {
        match raw.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(BoshError::invalid_attribute(
                name.as_str(),
                raw,
                "expected boolean",
            )),
        }
    }
}

impl AttrValue for String {
    fn parse_attr(_name: &AttrName, raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }
}

/// Protocol version carried in `ver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl Version {
    /// Create a version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for Version {
    fn default() -> Self {
        crate::protocol::PROTOCOL_VERSION
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = BoshError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_attr(&VER, s)
    }
}

impl TryFrom<String> for Version {
    type Error = BoshError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl AttrValue for Version {
    fn parse_attr(name: &AttrName, raw: &str) -> Result<Self> {
        let invalid = || BoshError::invalid_attribute(name.as_str(), raw, "expected major.minor");
        let (major, minor) = raw.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Value of the `type` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyType {
    /// Fatal, CM-initiated termination.
    Terminate,
    /// Recoverable binding error.
    Error,
    /// Any other value; carries no protocol meaning for the client.
    Other(String),
}

impl BodyType {
    /// Wire form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Terminate => "terminate",
            Self::Error => "error",
            Self::Other(other) => other,
        }
    }
}

impl AttrValue for BodyType {
    fn parse_attr(_name: &AttrName, raw: &str) -> Result<Self> {
        Ok(match raw.trim() {
            "terminate" => Self::Terminate,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        })
    }
}

/// Terminal binding conditions (XEP-0124 section 17.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalCondition {
    /// The format of an HTTP header or binding element is unacceptable.
    BadRequest,
    /// The target domain became unavailable.
    HostGone,
    /// The target domain is unknown to the CM.
    HostUnknown,
    /// The initialization element lacks `to` or `route`.
    ImproperAddressing,
    /// The CM experienced an internal error.
    InternalServerError,
    /// Unknown sid, or rid outside the window.
    ItemNotFound,
    /// Another request with the same sid replaced this session.
    OtherRequest,
    /// The client violated CM policy.
    PolicyViolation,
    /// The CM could not connect to the remote endpoint.
    RemoteConnectionFailed,
    /// The remote stream reported an error.
    RemoteStreamError,
    /// The CM redirects the client elsewhere.
    SeeOtherUri,
    /// The CM is shutting down.
    SystemShutdown,
    /// Unspecified condition.
    UndefinedCondition,
    /// Condition outside the XEP-0124 vocabulary.
    Unknown(String),
}

impl TerminalCondition {
    /// Condition implied by a legacy HTTP error status (XEP-0124 section 17.1).
    pub fn from_legacy_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(Self::BadRequest),
            403 => Some(Self::PolicyViolation),
            404 => Some(Self::ItemNotFound),
            _ => None,
        }
    }

    /// Wire form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::BadRequest => "bad-request",
            Self::HostGone => "host-gone",
            Self::HostUnknown => "host-unknown",
            Self::ImproperAddressing => "improper-addressing",
            Self::InternalServerError => "internal-server-error",
            Self::ItemNotFound => "item-not-found",
            Self::OtherRequest => "other-request",
            Self::PolicyViolation => "policy-violation",
            Self::RemoteConnectionFailed => "remote-connection-failed",
            Self::RemoteStreamError => "remote-stream-error",
            Self::SeeOtherUri => "see-other-uri",
            Self::SystemShutdown => "system-shutdown",
            Self::UndefinedCondition => "undefined-condition",
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for TerminalCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AttrValue for TerminalCondition {
    fn parse_attr(_name: &AttrName, raw: &str) -> Result<Self> {
        Ok(match raw.trim() {
            "bad-request" => Self::BadRequest,
            "host-gone" => Self::HostGone,
            "host-unknown" => Self::HostUnknown,
            "improper-addressing" => Self::ImproperAddressing,
            "internal-server-error" => Self::InternalServerError,
            "item-not-found" => Self::ItemNotFound,
            "other-request" => Self::OtherRequest,
            "policy-violation" => Self::PolicyViolation,
            "remote-connection-failed" => Self::RemoteConnectionFailed,
            "remote-stream-error" => Self::RemoteStreamError,
            "see-other-uri" => Self::SeeOtherUri,
            "system-shutdown" => Self::SystemShutdown,
            "undefined-condition" => Self::UndefinedCondition,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Attributes the session engine owns; callers may not set them.
const SESSION_OWNED: &[AttrName] = &[RID, SID];

/// Check a caller-supplied body before it enters the session.
///
/// Registered numeric and version attributes must parse, and the
/// session-owned `rid`/`sid` must be absent. So must `type`: ending the
/// session goes through `disconnect`.
pub fn validate_outbound(body: &Body) -> Result<()> {
    for (name, value) in body.attributes() {
        if SESSION_OWNED.contains(name) {
            return Err(BoshError::InvalidBody(format!(
                "attribute '{name}' is assigned by the session"
            )));
        }
        if *name == TYPE {
            return Err(BoshError::InvalidBody(format!(
                "attribute 'type' ('{value}') is not allowed; use disconnect to terminate"
            )));
        }
        if *name == HOLD
            || *name == WAIT
            || *name == REQUESTS
            || *name == POLLING
            || *name == INACTIVITY
            || *name == MAXPAUSE
            || *name == PAUSE
        {
            u32::parse_attr(name, value)?;
        } else if *name == ACK {
            u64::parse_attr(name, value)?;
        } else if *name == VER {
            Version::parse_attr(name, value)?;
        }
    }
    Ok(())
}
