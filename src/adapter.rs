//! Request dispatch over pooled per-host transport clients.
//!
//! One [`Adapter::call`] runs through these states:
//!
//! ```text
//! Idle -> Resolving(URL) -> PoolLookup -> Dispatching(timeout-scoped) -> Completed | Failed
//! ```
//!
//! Both terminal states run the persistence decision before the outcome is
//! returned. `Failed` is classified afterwards; `Completed` is handed to the
//! next handler.

use anyhow::{Context, Result};
use log::{debug, trace, warn};
use std::sync::{Arc, OnceLock};

use crate::cleanup::PoolGuard;
use crate::config::AdapterConfig;
use crate::env::{Env, ResponseEnv};
use crate::error::classify_error;
use crate::handler::{Handler, Passthrough};
use crate::pool::ClientPool;
use crate::transport::{Endpoint, TlsContext, Transport, TransportRequest};

/// Whether a call is the outermost unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// No enclosing unit of work: pooled clients are closed before the call
    /// returns, even on a persistent adapter.
    Root,
    /// Inside an enclosing unit of work: a persistent adapter keeps its pooled
    /// clients open for later calls.
    Nested,
}

/// Dispatches generic requests over pooled transport clients.
pub struct Adapter {
    transport: Arc<dyn Transport>,
    config: AdapterConfig,
    persistent: bool,
    pool: Arc<ClientPool>,
    tls: OnceLock<Arc<TlsContext>>,
    next: Arc<dyn Handler>,
}

impl Adapter {
    pub fn new<T: Transport + 'static>(transport: T, config: AdapterConfig) -> Self {
        Self::from_shared(Arc::new(transport), config)
    }

    pub fn from_shared(transport: Arc<dyn Transport>, config: AdapterConfig) -> Self {
        let persistent = config.persistent && transport.supports_close();
        if config.persistent && !persistent {
            debug!("Transport cannot close clients, persistence disabled");
        }

        Self {
            transport,
            config,
            persistent,
            pool: Arc::new(ClientPool::new()),
            tls: OnceLock::new(),
            next: Arc::new(Passthrough),
        }
    }

    /// Sets the handler that receives each successful response.
    pub fn with_next(mut self, next: impl Handler + 'static) -> Self {
        self.next = Arc::new(next);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Effective persistence: requested and supported by the transport.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    /// Closes every pooled client.
    pub async fn close(&self) -> Result<()> {
        self.pool.close_all().await
    }

    fn tls_context(&self) -> Arc<TlsContext> {
        let tls = self
            .tls
            .get_or_init(|| Arc::new(TlsContext::new(self.config.verify_peer)));
        Arc::clone(tls)
    }

    /// Dispatches one request and hands the response to the next handler.
    ///
    /// Pooled clients are closed before returning when the adapter is not
    /// persistent or `scope` is [`Scope::Root`], whatever the outcome.
    /// Failures come back classified as [`crate::ClassifiedError`] when they
    /// are timeouts, TLS failures or connection failures, and unchanged
    /// otherwise.
    #[tracing::instrument(skip_all, fields(method = %env.request.method, url = ?env.request.url, ?scope))]
    pub async fn call(&self, env: Env, scope: Scope) -> Result<Env> {
        let close_after = !self.persistent || scope == Scope::Root;
        let guard = close_after.then(|| PoolGuard::new(Arc::clone(&self.pool)));

        let outcome = self.dispatch(env).await;

        if close_after {
            trace!("Closing pooled clients after call");
            if let Err(e) = self.pool.close_all().await {
                warn!("Failed to close pooled clients: {:#}", e);
            }
        }
        if let Some(guard) = guard {
            guard.settled();
        }

        let env = outcome.map_err(|e| {
            debug!("Request failed: {:#}", e);
            classify_error(e)
        })?;

        self.next.handle(env).await
    }

    async fn dispatch(&self, mut env: Env) -> Result<Env> {
        let url = env
            .request
            .url
            .as_deref()
            .context("Request has no URL")?;

        let endpoint = Endpoint::parse(url, self.tls_context())?;
        let key = endpoint.host_key();
        trace!("Resolved {} to {}", url, key);

        let transport = &self.transport;
        let client = self
            .pool
            .fetch_or_create(&key, || transport.connect(&endpoint))
            .await
            .inspect_err(|e| debug!("Failed to open client for {}: {:#}", key, e))?;

        let method = match env.request.method.trim() {
            "" => "GET".to_string(),
            method => method.to_uppercase(),
        };

        let request = TransportRequest {
            scheme: client.scheme().to_string(),
            authority: endpoint.authority().to_string(),
            method,
            path: endpoint.path().to_string(),
            headers: env.request.headers.clone(),
            body: env.request.body.clone().unwrap_or_default(),
            trailer: None,
        };

        debug!("{} {}", request.method, request.url());

        let timeout = env.request.options.timeout.or(self.config.timeout);
        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, client.send(request))
                .await
                .with_context(|| format!("No response from {} within {:?}", key, limit))??,
            None => client.send(request).await?,
        };

        debug!("Response {} from {}", response.status, key);

        env.response = Some(ResponseEnv {
            status: response.status,
            headers: response.headers,
            body: response.body,
        });
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::RequestEnv;
    use crate::error::ClassifiedError;
    use crate::handler::{FnHandler, MockHandler};
    use crate::pool::PooledClient;
    use crate::transport::{MockTransport, MockTransportClient, TransportResponse};
    use bytes::Bytes;
    use std::io;

    fn ok_response(status: u16, body: &'static str) -> Result<TransportResponse> {
        Ok(TransportResponse {
            status,
            headers: Default::default(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    /// Transport expecting `connects` connections, each handing out `client`.
    fn transport_for(client: PooledClient, connects: usize) -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_supports_close().return_const(true);
        transport
            .expect_connect()
            .times(connects)
            .returning(move |_| Ok(Arc::clone(&client)));
        transport
    }

    fn request(url: &str) -> Env {
        Env::new(RequestEnv::get(url))
    }

    #[tokio::test]
    async fn test_builds_transport_request() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client
            .expect_send()
            .withf(|r| {
                r.scheme == "https"
                    && r.authority == "example.com:8443"
                    && r.method == "POST"
                    && r.path == "/items?page=2"
                    && r.body.as_ref() == b"payload"
                    && r.headers.get("x-trace").is_some_and(|v| v == "abc")
                    && r.trailer.is_none()
            })
            .times(1)
            .returning(|_| ok_response(201, "created"));
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(transport_for(client, 1), AdapterConfig::default());

        let env = Env::new(
            RequestEnv::new("post", "https://example.com:8443/items?page=2#ignored")
                .header("x-trace", "abc")
                .unwrap()
                .body("payload"),
        );
        let env = adapter.call(env, Scope::Nested).await.unwrap();

        let response = env.response.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.text(), "created");
    }

    #[tokio::test]
    async fn test_absent_body_and_method_defaults() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("http".to_string());
        client
            .expect_send()
            .withf(|r| r.body.is_empty() && r.method == "GET")
            .times(1)
            .returning(|_| ok_response(200, ""));
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(transport_for(client, 1), AdapterConfig::default());

        let env = Env::new(RequestEnv {
            url: Some("http://example.com/".into()),
            ..RequestEnv::default()
        });
        adapter.call(env, Scope::Nested).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_url_is_unclassified() {
        let mut transport = MockTransport::new();
        transport.expect_supports_close().return_const(true);
        transport.expect_connect().never();

        let adapter = Adapter::new(transport, AdapterConfig::default());
        let err = adapter
            .call(Env::new(RequestEnv::default()), Scope::Nested)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ClassifiedError>().is_none());
        assert!(err.to_string().contains("no URL"));
    }

    #[tokio::test]
    async fn test_nested_calls_reuse_client() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client
            .expect_send()
            .times(2)
            .returning(|_| ok_response(200, "ok"));
        client.expect_close().never();
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(transport_for(client, 1), AdapterConfig::default());

        adapter
            .call(request("https://example.com/a"), Scope::Nested)
            .await
            .unwrap();
        adapter
            .call(request("https://example.com/b"), Scope::Nested)
            .await
            .unwrap();

        assert_eq!(adapter.pool().len().await, 1);
    }

    #[tokio::test]
    async fn test_root_scope_closes_pool() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client.expect_send().returning(|_| ok_response(200, "ok"));
        client.expect_close().times(1).returning(|| Ok(()));
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(transport_for(client, 1), AdapterConfig::default());
        assert!(adapter.is_persistent());

        adapter
            .call(request("https://example.com/"), Scope::Root)
            .await
            .unwrap();
        assert!(adapter.pool().is_empty().await);
    }

    #[tokio::test]
    async fn test_non_persistent_closes_after_each_call() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client.expect_send().returning(|_| ok_response(200, "ok"));
        client.expect_close().times(2).returning(|| Ok(()));
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(
            transport_for(client, 2),
            AdapterConfig::new().persistent(false),
        );

        for path in ["/a", "/b"] {
            adapter
                .call(request(&format!("https://example.com{}", path)), Scope::Nested)
                .await
                .unwrap();
            assert!(adapter.pool().is_empty().await);
        }
    }

    #[tokio::test]
    async fn test_persistence_requires_closeable_transport() {
        let mut transport = MockTransport::new();
        transport.expect_supports_close().return_const(false);

        let adapter = Adapter::new(transport, AdapterConfig::default());
        assert!(adapter.config().persistent);
        assert!(!adapter.is_persistent());
    }

    #[tokio::test]
    async fn test_failed_call_still_closes_pool() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client.expect_send().returning(|_| {
            Err(anyhow::Error::new(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            )))
        });
        client.expect_close().times(1).returning(|| Ok(()));
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(
            transport_for(client, 1),
            AdapterConfig::new().persistent(false),
        );

        let err = adapter
            .call(request("https://example.com/"), Scope::Nested)
            .await
            .unwrap_err();

        let classified = err.downcast_ref::<ClassifiedError>().unwrap();
        assert!(classified.is_connection_failed());
        assert!(adapter.pool().is_empty().await);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_outcome() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client.expect_send().returning(|_| ok_response(200, "ok"));
        client
            .expect_close()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("socket already gone")));
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(transport_for(client, 1), AdapterConfig::default());

        let env = adapter
            .call(request("https://example.com/"), Scope::Root)
            .await
            .unwrap();
        assert_eq!(env.response.unwrap().status, 200);
        assert!(adapter.pool().is_empty().await);
    }

    #[tokio::test]
    async fn test_connect_failure_is_classified() {
        let mut transport = MockTransport::new();
        transport.expect_supports_close().return_const(true);
        transport.expect_connect().times(1).returning(|_| {
            Err(anyhow::Error::new(io::Error::from(
                io::ErrorKind::NetworkUnreachable,
            )))
        });

        let adapter = Adapter::new(transport, AdapterConfig::default());
        let err = adapter
            .call(request("https://example.com/"), Scope::Nested)
            .await
            .unwrap_err();

        assert!(
            err.downcast_ref::<ClassifiedError>()
                .unwrap()
                .is_connection_failed()
        );
        assert!(adapter.pool().is_empty().await);
    }

    #[tokio::test]
    async fn test_unclassified_connect_failure_is_returned_as_raised() {
        let mut transport = MockTransport::new();
        transport.expect_supports_close().return_const(true);
        transport
            .expect_connect()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("proxy rejected the tunnel")));

        let adapter = Adapter::new(transport, AdapterConfig::default());
        let err = adapter
            .call(request("https://example.com/"), Scope::Nested)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ClassifiedError>().is_none());
        assert_eq!(format!("{:#}", err), "proxy rejected the tunnel");
    }

    #[tokio::test]
    async fn test_tls_context_is_built_once_with_config_policy() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client.expect_send().returning(|_| ok_response(200, "ok"));
        let client: PooledClient = Arc::new(client);

        let mut transport = MockTransport::new();
        transport.expect_supports_close().return_const(true);
        transport
            .expect_connect()
            .withf(|endpoint| endpoint.tls().verify_peer())
            .times(2)
            .returning(move |_| Ok(Arc::clone(&client)));

        let adapter = Adapter::new(transport, AdapterConfig::new().verify_peer(true));
        adapter
            .call(request("https://a.example/"), Scope::Nested)
            .await
            .unwrap();
        adapter
            .call(request("https://b.example/"), Scope::Nested)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&adapter.tls_context(), &adapter.tls_context()));
    }

    #[tokio::test]
    async fn test_response_goes_to_next_handler() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client.expect_send().returning(|_| ok_response(200, "ok"));
        let client: PooledClient = Arc::new(client);

        let adapter = Adapter::new(transport_for(client, 1), AdapterConfig::default())
            .with_next(FnHandler(|mut env: Env| {
                if let Some(response) = env.response.as_mut() {
                    response.status = 299;
                }
                Ok(env)
            }));

        let env = adapter
            .call(request("https://example.com/"), Scope::Nested)
            .await
            .unwrap();
        assert_eq!(env.response.unwrap().status, 299);
    }

    #[tokio::test]
    async fn test_next_handler_not_called_on_failure() {
        let mut client = MockTransportClient::new();
        client.expect_scheme().return_const("https".to_string());
        client
            .expect_send()
            .returning(|_| Err(anyhow::anyhow!("protocol violation")));
        let client: PooledClient = Arc::new(client);

        let mut next = MockHandler::new();
        next.expect_handle().never();

        let adapter =
            Adapter::new(transport_for(client, 1), AdapterConfig::default()).with_next(next);

        let err = adapter
            .call(request("https://example.com/"), Scope::Nested)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "protocol violation");
    }
}
