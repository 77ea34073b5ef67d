//! HTTP transport backed by reqwest.
//!
//! Every exchange is one `POST` of the serialized `<body/>` to the
//! connection manager URI. The client keeps a connection pool so several
//! pipelined requests can be in flight at once.

use std::time::Duration;

use ::http::header::CONTENT_TYPE;
use futures::future::BoxFuture;
use reqwest::Client;

use super::{DispatchResult, HttpTransportConfig, Transport, TransportFailure, TransportResponse};
use crate::body::Body;
use crate::error::{BoshError, Result};
use crate::protocol::LEGACY_ERROR_STATUSES;

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// BOSH over HTTP/1.1 or HTTP/2.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    uri: String,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint.
    pub fn new(config: &HttpTransportConfig) -> Result<Self> {
        if config.uri.is_empty() {
            return Err(BoshError::Config("connection manager URI is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build()
            .map_err(|e| BoshError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            uri: config.uri.clone(),
        })
    }

    /// Connection manager URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    async fn exchange(&self, body: Body, timeout: Duration) -> DispatchResult {
        let xml = body.to_xml();
        tracing::trace!(uri = %self.uri, bytes = xml.len(), "POST");

        let response = self
            .client
            .post(&self.uri)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .timeout(timeout)
            .body(xml)
            .send()
            .await
            .map_err(|e| classify(&e, timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify(&e, timeout))?;

        let parsed = if text.trim().is_empty() {
            Ok(Body::empty())
        } else {
            Body::from_xml(&text)
        };
        let body = match parsed {
            Ok(body) if status.is_success() || body != Body::empty() => body,
            // Legacy CMs end sessions with a bare status; it must reach the session
            _ if LEGACY_ERROR_STATUSES.contains(&status.as_u16()) => Body::empty(),
            Ok(_) => {
                return Err(TransportFailure::protocol(format!(
                    "HTTP {} without a BOSH body",
                    status.as_u16()
                )))
            },
            Err(e) if !status.is_success() => {
                tracing::debug!(status = status.as_u16(), "non-BOSH error page: {}", e);
                return Err(TransportFailure::protocol(format!(
                    "HTTP {} without a BOSH body",
                    status.as_u16()
                )));
            },
            Err(e) => {
                return Err(TransportFailure::protocol(format!(
                    "unparseable response body: {e}"
                )))
            },
        };

        Ok(TransportResponse::with_status(status, body))
    }
}

impl Transport for HttpTransport {
    fn dispatch(&self, body: Body, timeout: Duration) -> BoxFuture<'_, DispatchResult> {
        Box::pin(self.exchange(body, timeout))
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}

fn classify(err: &reqwest::Error, timeout: Duration) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::timeout(timeout)
    } else {
        TransportFailure::network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_uri() {
        let config = HttpTransportConfig::new("");
        assert!(matches!(HttpTransport::new(&config), Err(BoshError::Config(_))));
    }

    #[test]
    fn test_transport_name() {
        let transport = HttpTransport::new(&HttpTransportConfig::default()).unwrap();
        assert_eq!(transport.name(), "HTTP");
        assert_eq!(transport.uri(), "http://localhost:5280/http-bind");
    }
}
