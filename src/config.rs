use std::time::Duration;

/// Options fixed when an [`crate::Adapter`] is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Keep pooled clients open between calls. Only honored when the
    /// transport can close its clients.
    pub persistent: bool,
    /// Upper bound on a single send. `None` leaves only the transport's own
    /// deadlines in effect.
    pub timeout: Option<Duration>,
    /// Verify server certificates. Off by default.
    pub verify_peer: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            timeout: None,
            verify_peer: false,
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verify_peer(mut self, verify_peer: bool) -> Self {
        self.verify_peer = verify_peer;
        self
    }
}
