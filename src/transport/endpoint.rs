use anyhow::{Context, Result, bail};
use reqwest::Url;
use std::sync::Arc;

use super::TlsContext;
use crate::host_key::HostKey;

/// A parsed request target together with the TLS policy used to reach it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    authority: String,
    path: String,
    tls: Arc<TlsContext>,
}

impl Endpoint {
    /// Parses an absolute `http` or `https` URL.
    pub fn parse(url: &str, tls: Arc<TlsContext>) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;

        match url.scheme() {
            "http" | "https" => {}
            other => bail!("Unsupported URL scheme '{}' in {}", other, url),
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => bail!("URL has no host: {}", url),
        };

        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(Self {
            url,
            authority,
            path,
            tls,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// `host[:port]`, with the port only when it was given explicitly.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Request path including the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tls(&self) -> &TlsContext {
        &self.tls
    }

    pub fn host_key(&self) -> HostKey {
        HostKey::from_url(&self.url)
    }
}
