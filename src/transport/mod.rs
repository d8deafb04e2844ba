//! Transport abstraction the adapter dispatches requests over.
//!
//! A [`Transport`] creates one [`TransportClient`] per endpoint. The adapter
//! owns those clients through its pool and decides when they are closed; the
//! transport only knows how to open them, send on them and close them.

mod endpoint;
mod tls;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::fmt;
use std::sync::Arc;

pub use endpoint::Endpoint;
pub use tls::TlsContext;

/// A request in the shape the transport client expects.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Scheme negotiated by the client (`http` or `https`).
    pub scheme: String,
    /// `host[:port]` of the endpoint.
    pub authority: String,
    /// Uppercased method name.
    pub method: String,
    /// Path including the query string, always starting with `/`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Trailing headers. The adapter never sets them.
    pub trailer: Option<HeaderMap>,
}

impl TransportRequest {
    /// Full target URL reassembled from scheme, authority and path.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority, self.path)
    }
}

/// A fully read response from the transport.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A persistent client bound to a single endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Scheme this client speaks to its endpoint.
    fn scheme(&self) -> &str;

    /// Sends one request and reads the whole response.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// Releases the client's connection resources.
    async fn close(&self) -> Result<()>;
}

/// Factory for endpoint-bound clients.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a client bound to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn TransportClient>>;

    /// Whether clients from this transport can be closed. Persistence is only
    /// honored when they can.
    fn supports_close(&self) -> bool {
        true
    }
}

/// Marker for failures raised by the TLS layer of a transport.
///
/// Transports that do not surface `rustls::Error` directly wrap their TLS
/// failures in this type so they are classified correctly.
#[derive(Debug)]
pub struct TlsFailure(pub anyhow::Error);

impl fmt::Display for TlsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TLS failure: {}", self.0)
    }
}

impl std::error::Error for TlsFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &(dyn std::error::Error + 'static) = self.0.as_ref();
        Some(inner)
    }
}

/// Marker for failures resolving a host name to socket addresses.
///
/// [`crate::http::ReqwestTransport`] raises it when the endpoint's host does
/// not resolve; other transports should do the same.
#[derive(Debug)]
pub struct ResolveFailure {
    pub host: String,
    /// Resolver error, if the lookup itself failed rather than came back empty.
    pub source: Option<std::io::Error>,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to resolve host {}", self.host)
    }
}

impl std::error::Error for ResolveFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
