//! Ordered release of everything opened while connecting to MCP servers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CleanupFailure, CoraError};
use crate::util::timeout::with_timeout;

use super::registry::SharedSession;

const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that must be torn down at shutdown.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    /// Human-readable name used in logs and cleanup errors.
    fn label(&self) -> &str;

    async fn release(&self) -> Result<(), CoraError>;
}

/// A provider session held by the lifecycle manager.
pub struct SessionResource {
    label: String,
    session: SharedSession,
}

impl SessionResource {
    pub fn new(label: impl Into<String>, session: SharedSession) -> Self {
        Self {
            label: label.into(),
            session,
        }
    }
}

#[async_trait]
impl ManagedResource for SessionResource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn release(&self) -> Result<(), CoraError> {
        let mut session = self.session.lock().await;
        session.close().await
    }
}

/// Stack of acquired resources, released last-in first-out.
pub struct LifecycleManager {
    stack: Vec<Arc<dyn ManagedResource>>,
    release_timeout: Duration,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }

    /// Upper bound on each individual release.
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    pub fn acquire(&mut self, resource: Arc<dyn ManagedResource>) {
        tracing::debug!(resource = %resource.label(), depth = self.stack.len() + 1, "acquired");
        self.stack.push(resource);
    }

    pub fn acquire_session(&mut self, label: impl Into<String>, session: SharedSession) {
        self.acquire(Arc::new(SessionResource::new(label, session)));
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Release every resource in reverse acquisition order.
    ///
    /// A failing or hung release does not stop the rest; all failures come
    /// back together as [`CoraError::ResourceCleanup`]. The stack is drained,
    /// so a second call does nothing.
    pub async fn release_all(&mut self) -> Result<(), CoraError> {
        let mut failures = Vec::new();

        while let Some(resource) = self.stack.pop() {
            let label = resource.label().to_string();
            match with_timeout(self.release_timeout, resource.release()).await {
                Ok(()) => tracing::debug!(resource = %label, "released"),
                Err(error) => {
                    tracing::warn!(resource = %label, error = %error, "release failed");
                    failures.push(CleanupFailure {
                        resource: label,
                        message: error.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            tracing::error!(failed = failures.len(), "resource cleanup incomplete");
            Err(CoraError::ResourceCleanup(failures))
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
