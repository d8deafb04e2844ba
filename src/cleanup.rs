use log::{debug, warn};
use std::sync::Arc;

use crate::pool::ClientPool;

/// RAII guard that flushes the pool if a call is abandoned before its
/// persistence decision ran, e.g. when the caller drops the call future.
///
/// Closing is async, so the flush runs on a task spawned onto the current
/// tokio runtime. Without a runtime the clients are left to their own drop.
pub struct PoolGuard {
    pool: Arc<ClientPool>,
    armed: bool,
}

impl PoolGuard {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self { pool, armed: true }
    }

    /// The call reached its persistence decision; nothing left to do on drop.
    pub fn settled(mut self) {
        self.armed = false;
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Call abandoned outside a tokio runtime; pooled clients not closed");
            return;
        };

        debug!("Call abandoned before completion, closing pooled clients");
        let pool = Arc::clone(&self.pool);
        handle.spawn(async move {
            if let Err(e) = pool.close_all().await {
                warn!("Failed to close pooled clients: {:#}", e);
            }
        });
    }
}
