//! Wire codec for the `<body/>` wrapper.
//!
//! Only the wrapper is interpreted. Each top-level child is captured
//! verbatim from the input and written back out unchanged.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Body, BodyBuilder};
use crate::error::{BoshError, Result};

/// Namespace of the `<body/>` element.
pub const BOSH_NAMESPACE: &str = "http://jabber.org/protocol/httpbind";

/// Namespace bound to the `xmpp:` prefix (XEP-0206).
const XBOSH_NAMESPACE: &str = "urn:xmpp:xbosh";

impl Body {
    /// Serialize to the wire form.
    pub fn to_xml(&self) -> String {
        let payload_len: usize = self.payload().iter().map(|p| p.as_str().len()).sum();
        let mut out = String::with_capacity(96 + payload_len);

        out.push_str("<body xmlns=\"");
        out.push_str(BOSH_NAMESPACE);
        out.push('"');

        if self.attributes().any(|(name, _)| name.prefix() == Some("xmpp")) {
            out.push_str(" xmlns:xmpp=\"");
            out.push_str(XBOSH_NAMESPACE);
            out.push('"');
        }

        for (name, value) in self.attributes() {
            out.push(' ');
            out.push_str(name.as_str());
            out.push_str("=\"");
            out.push_str(&escape(value));
            out.push('"');
        }

        if self.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            for node in self.payload() {
                out.push_str(node.as_str());
            }
            out.push_str("</body>");
        }
        out
    }

    /// Parse the wire form.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut builder: Option<BodyBuilder> = None;
        let mut depth = 0usize;
        let mut child_start = 0usize;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event()?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(start) => match builder {
                    None => {
                        builder = Some(root(&start)?);
                        depth = 1;
                    },
                    Some(_) => {
                        if depth == 1 {
                            child_start = before;
                        }
                        depth += 1;
                    },
                },
                Event::Empty(start) => match builder.take() {
                    None => return Ok(root(&start)?.build()),
                    Some(b) => {
                        builder = Some(if depth == 1 {
                            b.payload(&xml[before..after])
                        } else {
                            b
                        });
                    },
                },
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    match depth {
                        0 => break,
                        1 => {
                            builder = builder.map(|b| b.payload(&xml[child_start..after]));
                        },
                        _ => {},
                    }
                },
                Event::Text(text) if depth == 1 => {
                    let raw = &xml[before..after];
                    if !text.is_empty() && !raw.trim().is_empty() {
                        builder = builder.map(|b| b.payload(raw));
                    }
                },
                Event::CData(_) if depth == 1 => {
                    builder = builder.map(|b| b.payload(&xml[before..after]));
                },
                Event::Eof => {
                    return Err(BoshError::Xml(if builder.is_none() {
                        "no <body/> element found".to_string()
                    } else {
                        "unexpected end of input inside <body/>".to_string()
                    }));
                },
                _ => {},
            }
        }

        builder
            .map(BodyBuilder::build)
            .ok_or_else(|| BoshError::Xml("no <body/> element found".to_string()))
    }
}

/// Validate the root element and collect its attributes.
fn root(start: &BytesStart<'_>) -> Result<BodyBuilder> {
    if start.local_name().as_ref() != b"body" {
        return Err(BoshError::Xml(format!(
            "expected <body/> root, found <{}>",
            String::from_utf8_lossy(start.name().as_ref())
        )));
    }

    let mut builder = Body::builder();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| BoshError::Xml(format!("attribute name is not UTF-8: {e}")))?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value()?;
        builder = builder.attribute(key.to_string(), value);
    }
    Ok(builder)
}
