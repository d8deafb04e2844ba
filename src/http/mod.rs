//! reqwest-backed transport.

mod client;

pub use client::{ReqwestClient, ReqwestTransport};
