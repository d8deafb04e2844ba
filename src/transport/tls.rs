use log::warn;

/// TLS policy handed to URL parsing and, through the endpoint, to the
/// transport when it opens a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsContext {
    verify_peer: bool,
}

impl TlsContext {
    pub fn new(verify_peer: bool) -> Self {
        if !verify_peer {
            warn!("TLS peer verification is disabled; certificates will not be checked");
        }
        Self { verify_peer }
    }

    /// Whether server certificates and host names are verified.
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }
}

impl Default for TlsContext {
    /// Peer verification is off by default. This is a known weak default;
    /// enable it with [`crate::AdapterConfig::verify_peer`].
    fn default() -> Self {
        Self::new(false)
    }
}
