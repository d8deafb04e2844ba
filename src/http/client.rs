//! Transport backed by reqwest, one `reqwest::Client` per endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, Url, redirect};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::transport::{
    Endpoint, ResolveFailure, Transport, TransportClient, TransportRequest, TransportResponse,
};

/// Opens reqwest clients for endpoints.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    user_agent: String,
    connect_timeout: Option<Duration>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self {
            user_agent: format!("hostpool/{}", env!("HOSTPOOL_VERSION")),
            connect_timeout: None,
        }
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Bounds connection establishment only. The adapter's timeout bounds
    /// the whole send.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self, endpoint), fields(authority = endpoint.authority()))]
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn TransportClient>> {
        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(!endpoint.tls().verify_peer());

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some((host, addrs)) = resolve(endpoint.url()).await? {
            builder = builder.resolve_to_addrs(&host, &addrs);
        }

        let client = builder
            .build()
            .with_context(|| format!("Failed to build HTTP client for {}", endpoint.authority()))?;

        debug!("Opened client for {}", endpoint.host_key());

        Ok(Arc::new(ReqwestClient::new(endpoint.scheme(), client)))
    }
}

/// Looks up a named host once per client and returns the addresses to pin
/// on it. IP literals need no lookup.
async fn resolve(url: &Url) -> Result<Option<(String, Vec<SocketAddr>)>> {
    let Some(host) = url.host_str() else {
        return Ok(None);
    };
    // IPv6 literals come bracketed.
    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return Ok(None);
    }

    let port = url.port_or_known_default().unwrap_or_default();
    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            return Err(ResolveFailure {
                host: host.to_string(),
                source: Some(e),
            }
            .into());
        }
    };
    if addrs.is_empty() {
        return Err(ResolveFailure {
            host: host.to_string(),
            source: None,
        }
        .into());
    }

    debug!("Resolved {} to {} address(es)", host, addrs.len());
    Ok(Some((host.to_string(), addrs)))
}

/// A reqwest client bound to one endpoint.
///
/// Closing drops the inner client, which releases its idle connections.
/// Sends after that fail.
pub struct ReqwestClient {
    scheme: String,
    client: Mutex<Option<Client>>,
}

impl ReqwestClient {
    pub fn new(scheme: impl Into<String>, client: Client) -> Self {
        Self {
            scheme: scheme.into(),
            client: Mutex::new(Some(client)),
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.client.lock().await.is_none()
    }
}

#[async_trait]
impl TransportClient for ReqwestClient {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        // reqwest clients are cheap handles; don't hold the lock across the send.
        let client = self
            .client
            .lock()
            .await
            .clone()
            .context("Client is closed")?;

        let method = Method::from_bytes(request.method.as_bytes())
            .with_context(|| format!("Invalid HTTP method: {}", request.method))?;
        let url = request.url();

        let response = client
            .request(method, &url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        debug!("Received {} bytes from {}", body.len(), url);

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.client.lock().await.take().is_some() {
            debug!("Closed {} client", self.scheme);
        }
        Ok(())
    }
}
