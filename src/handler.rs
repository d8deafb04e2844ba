//! Downstream handlers that receive the populated environment after dispatch.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::env::Env;

/// One link in the chain that runs after the adapter filled in a response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, env: Env) -> Result<Env>;
}

/// Hands the environment back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Handler for Passthrough {
    async fn handle(&self, env: Env) -> Result<Env> {
        Ok(env)
    }
}

/// Runs handlers in order, feeding each the previous one's output. Stops at
/// the first error.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<Arc<dyn Handler>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn push(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl Handler for Chain {
    async fn handle(&self, mut env: Env) -> Result<Env> {
        for handler in &self.handlers {
            env = handler.handle(env).await?;
        }
        Ok(env)
    }
}

/// Adapts a synchronous closure into a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Env) -> Result<Env> + Send + Sync,
{
    async fn handle(&self, env: Env) -> Result<Env> {
        (self.0)(env)
    }
}
