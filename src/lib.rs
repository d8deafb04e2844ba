//! Request-dispatch adapter over pooled, per-host transport clients.
//!
//! An [`Adapter`] takes a generic request description ([`env::RequestEnv`]),
//! sends it through a transport client cached per [`HostKey`], copies the
//! response back into a [`env::ResponseEnv`] and hands it to the next
//! [`handler::Handler`]. Transport failures come back as [`ClassifiedError`]
//! when they are timeouts, TLS failures or connection failures.
//!
//! ```rust,no_run
//! use hostpool::{Adapter, AdapterConfig, Scope};
//! use hostpool::env::{Env, RequestEnv};
//! use hostpool::http::ReqwestTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let adapter = Adapter::new(ReqwestTransport::new(), AdapterConfig::default());
//! let env = adapter
//!     .call(Env::new(RequestEnv::get("https://example.com/")), Scope::Nested)
//!     .await?;
//! println!("{}", env.response.map_or(0, |r| r.status));
//! adapter.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cleanup;
pub mod config;
pub mod env;
pub mod error;
pub mod handler;
pub mod host_key;
pub mod http;
pub mod pool;
pub mod transport;

pub use adapter::{Adapter, Scope};
pub use config::AdapterConfig;
pub use error::{ClassifiedError, ConnectionFailureKind, classify, classify_error};
pub use host_key::HostKey;
pub use pool::{ClientPool, PooledClient};
