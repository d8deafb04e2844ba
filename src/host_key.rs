//! Host identity used to select a pooled transport client.

use reqwest::Url;
use std::fmt;

/// Identity of a remote endpoint: scheme, host and port.
///
/// Path, query, fragment and user info are discarded, so every request to the
/// same origin resolves to the same key. The port is the explicit one or the
/// scheme's default, which makes `https://h/` and `https://h:443/` equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl HostKey {
    /// Derives the key from a parsed URL.
    pub fn from_url(url: &Url) -> Self {
        let mut origin = url.clone();
        origin.set_path("");
        origin.set_query(None);
        origin.set_fragment(None);

        Self {
            scheme: origin.scheme().to_string(),
            host: origin.host_str().unwrap_or_default().to_ascii_lowercase(),
            port: origin.port_or_known_default(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl From<&Url> for HostKey {
    fn from(url: &Url) -> Self {
        HostKey::from_url(url)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}
