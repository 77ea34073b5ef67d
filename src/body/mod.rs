//! The `<body/>` wrapper element.
//!
//! Every BOSH request and response is a single `<body/>` element: a set of
//! protocol attributes plus zero or more payload nodes. The payload is
//! opaque to this crate; each node is kept as the raw XML fragment it
//! arrived as (or was handed in as).
//!
//! Bodies are immutable. A [`BodyBuilder`] produces them, and
//! [`Body::rebuild`] starts a new builder from an existing body, so the
//! session engine never modifies a body it has handed to anyone.
//!
//! ```rust
//! use bosh::body::{attributes, Body};
//!
//! let body = Body::builder()
//!     .attribute(attributes::TO, "example.com")
//!     .payload("<message to='juliet@example.com'><body>hi</body></message>")
//!     .build();
//!
//! assert_eq!(body.attribute(&attributes::TO), Some("example.com"));
//! assert_eq!(body.payload().len(), 1);
//! ```

pub mod attributes;
mod xml;

use std::fmt;
use std::sync::Arc;

pub use attributes::{AttrName, AttrValue, BodyType, TerminalCondition, Version};
pub use xml::BOSH_NAMESPACE;

use crate::error::Result;

/// One opaque payload node, stored as raw XML.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payload(String);

impl Payload {
    /// Wrap a raw XML fragment.
    pub fn new(xml: impl Into<String>) -> Self {
        Self(xml.into())
    }

    /// The raw XML fragment.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BodyInner {
    attributes: Vec<(AttrName, String)>,
    payload: Vec<Payload>,
}

/// Immutable `<body/>` element. Cheap to clone and safe to share.
#[derive(Clone, PartialEq, Eq)]
pub struct Body {
    inner: Arc<BodyInner>,
}

impl Body {
    /// Start building a body.
    pub fn builder() -> BodyBuilder {
        BodyBuilder::default()
    }

    /// A body with no attributes and no payload.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(BodyInner::default()),
        }
    }

    /// Builder pre-filled with this body's attributes and payload.
    pub fn rebuild(&self) -> BodyBuilder {
        BodyBuilder {
            attributes: self.inner.attributes.clone(),
            payload: self.inner.payload.clone(),
        }
    }

    /// Raw value of an attribute, or `None` if absent.
    pub fn attribute(&self, name: &AttrName) -> Option<&str> {
        self.inner
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Typed value of an attribute, `Ok(None)` if absent.
    pub fn parse_attr<T: AttrValue>(&self, name: &AttrName) -> Result<Option<T>> {
        self.attribute(name)
            .map(|raw| T::parse_attr(name, raw))
            .transpose()
    }

    /// Whether the attribute is present.
    pub fn has_attribute(&self, name: &AttrName) -> bool {
        self.attribute(name).is_some()
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&AttrName, &str)> {
        self.inner
            .attributes
            .iter()
            .map(|(name, value)| (name, value.as_str()))
    }

    /// Payload nodes in order.
    pub fn payload(&self) -> &[Payload] {
        &self.inner.payload
    }

    /// True when the body carries no payload nodes.
    pub fn is_empty(&self) -> bool {
        self.inner.payload.is_empty()
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("attributes", &self.inner.attributes)
            .field("payload", &self.inner.payload.len())
            .finish()
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

/// Builder for [`Body`].
#[derive(Debug, Clone, Default)]
pub struct BodyBuilder {
    attributes: Vec<(AttrName, String)>,
    payload: Vec<Payload>,
}

impl BodyBuilder {
    /// Set an attribute. Setting the same name again replaces the value
    /// but keeps the position of the first write.
    pub fn attribute(mut self, name: impl Into<AttrName>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    /// Set an attribute only when `value` is present.
    pub fn attribute_opt(self, name: impl Into<AttrName>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.attribute(name, value),
            None => self,
        }
    }

    /// Set an attribute unless the builder already has one by that name.
    pub fn attribute_if_absent(self, name: impl Into<AttrName>, value: impl ToString) -> Self {
        let name = name.into();
        if self.attributes.iter().any(|(key, _)| *key == name) {
            self
        } else {
            self.attribute(name, value)
        }
    }

    /// Remove an attribute.
    pub fn remove_attribute(mut self, name: &AttrName) -> Self {
        self.attributes.retain(|(key, _)| key != name);
        self
    }

    /// Append one payload node.
    pub fn payload(mut self, xml: impl Into<String>) -> Self {
        self.payload.push(Payload::new(xml));
        self
    }

    /// Append several payload nodes.
    pub fn payloads<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.payload.extend(nodes.into_iter().map(Payload::new));
        self
    }

    /// Freeze into an immutable body.
    pub fn build(self) -> Body {
        Body {
            inner: Arc::new(BodyInner {
                attributes: self.attributes,
                payload: self.payload,
            }),
        }
    }
}
