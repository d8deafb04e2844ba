//! Generic request and response descriptions exchanged with the adapter.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::borrow::Cow;
use std::time::Duration;

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides the adapter's timeout for this request only.
    pub timeout: Option<Duration>,
}

/// An outgoing request.
#[derive(Debug, Clone, Default)]
pub struct RequestEnv {
    /// Method name in any case; the adapter uppercases it.
    pub method: String,
    pub url: Option<String>,
    pub headers: HeaderMap,
    /// Absent means an empty body.
    pub body: Option<Bytes>,
    pub options: RequestOptions,
}

impl RequestEnv {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Adds a header, keeping earlier values with the same name.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name: {}", name))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header {}", name))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }
}

/// A response copied out of the transport.
#[derive(Debug, Clone, Default)]
pub struct ResponseEnv {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseEnv {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Request and, once dispatched, its response. This is what travels down the
/// handler chain.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub request: RequestEnv,
    pub response: Option<ResponseEnv>,
}

impl Env {
    pub fn new(request: RequestEnv) -> Self {
        Self {
            request,
            response: None,
        }
    }
}

impl From<RequestEnv> for Env {
    fn from(request: RequestEnv) -> Self {
        Env::new(request)
    }
}
