//! Job handler trait and the handler registry.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::JobContext;

/// The body of a job.
///
/// Errors are logged by the runtime and never affect trigger bookkeeping.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one run of the job.
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()>;
}

/// Resolves a [`JobInfo::handler`](crate::job::JobInfo::handler) key to a handler.
pub trait HandlerResolver: Send + Sync {
    /// Look up the handler for a key.
    fn resolve(&self, handler: &str) -> Option<Arc<dyn JobHandler>>;
}

/// Thread-safe handler registry keyed by handler name.
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler.
    ///
    /// Returns an error if the name is already taken.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) -> SchedulerResult<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(SchedulerError::DuplicateKey(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Unregister a handler by name.
    pub fn unregister(&self, name: &str) -> SchedulerResult<()> {
        self.handlers
            .remove(name)
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;
        Ok(())
    }

    /// Check whether a handler is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// List registered handler names.
    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, handler: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(handler).map(|entry| entry.value().clone())
    }
}

/// Adapts an async closure into a [`JobHandler`].
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()> {
        (self.func)(ctx.clone()).await
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
