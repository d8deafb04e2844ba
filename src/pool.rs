//! Per-host cache of transport clients.
//!
//! Each [`HostKey`] maps to a once-initialized slot. Concurrent calls for a key
//! that is not cached yet all wait on the one creation in flight, so a second
//! client is never built and silently dropped. A slot is only filled once its
//! factory finished successfully; a failed or cancelled creation leaves the
//! slot empty for the next caller.

use anyhow::{Result, anyhow};
use futures_util::future::join_all;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::host_key::HostKey;
use crate::transport::TransportClient;

/// A cached client shared by all calls to its host.
pub type PooledClient = Arc<dyn TransportClient>;

type Slot = Arc<OnceCell<PooledClient>>;

/// Cache of one transport client per host.
#[derive(Default)]
pub struct ClientPool {
    slots: Mutex<HashMap<HostKey, Slot>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client cached for `key`, creating it with `factory` on a
    /// miss. The factory runs at most once per key until the pool is closed.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn fetch_or_create<F, Fut>(&self, key: &HostKey, factory: F) -> Result<PooledClient>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PooledClient>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        if let Some(client) = slot.get() {
            trace!("Reusing pooled client for {}", key);
            return Ok(Arc::clone(client));
        }

        let client = slot
            .get_or_try_init(move || async move {
                debug!("Creating client for {}", key);
                factory().await
            })
            .await?;

        Ok(Arc::clone(client))
    }

    /// Closes every cached client and empties the pool.
    ///
    /// Slots whose creation is still in flight stay in the pool, so the
    /// client they produce is tracked and closed by a later flush.
    ///
    /// Every client gets a close attempt even when others fail. Failures are
    /// logged and reported together once all closes ran.
    pub async fn close_all(&self) -> Result<()> {
        let mut clients: Vec<(HostKey, PooledClient)> = Vec::new();
        {
            let mut slots = self.slots.lock().await;
            slots.retain(|key, slot| match slot.get() {
                Some(client) => {
                    clients.push((key.clone(), Arc::clone(client)));
                    false
                }
                None => true,
            });
        }
        if clients.is_empty() {
            return Ok(());
        }

        debug!("Closing {} pooled client(s)", clients.len());

        let total = clients.len();
        let results = join_all(clients.into_iter().map(|(key, client)| async move {
            let result = client.close().await;
            (key, result)
        }))
        .await;

        let mut failures = Vec::new();
        for (key, result) in results {
            if let Err(e) = result {
                warn!("Failed to close client for {}: {:#}", key, e);
                failures.push(e);
            }
        }

        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) if total == 1 => Err(first),
            Some(first) => Err(first.context(anyhow!(
                "Failed to close some of {} pooled clients",
                total
            ))),
        }
    }

    /// Number of hosts with a live client.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a live client is cached for `key`.
    pub async fn contains(&self, key: &HostKey) -> bool {
        let slots = self.slots.lock().await;
        slots.get(key).is_some_and(|slot| slot.initialized())
    }
}
