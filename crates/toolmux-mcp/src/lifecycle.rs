//! Shared-hub lifecycle: acquire/release with refcounted teardown.
//!
//! Several independent call sites in the embedding process need the same
//! hub. Instead of a hidden process-wide singleton, the embedder owns one
//! [`HubRegistry`]; call sites acquire typed handles from it and release
//! them when done. The hub is constructed on the first acquire and fully
//! torn down when the last handle is released.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use toolmux_core::{HostProvider, McpHubError};

use crate::hub::{DefaultConnector, McpConnector, McpHub};

#[derive(Default)]
struct RegistryState {
    consumers: HashSet<String>,
    hub: Option<Arc<McpHub>>,
}

/// Owns the shared hub and the set of consumers using it.
///
/// All state sits behind one async mutex, so concurrent first acquires
/// serialize through a single in-flight initialization: exactly one hub is
/// constructed and later callers get the same instance.
pub struct HubRegistry {
    host: Arc<dyn HostProvider>,
    connector: Arc<dyn McpConnector>,
    state: Mutex<RegistryState>,
}

impl HubRegistry {
    /// Create a registry with an explicit connector.
    pub fn new(host: Arc<dyn HostProvider>, connector: Arc<dyn McpConnector>) -> Self {
        Self {
            host,
            connector,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Create a registry using the production connector, identified by the
    /// host's application name and version.
    pub fn with_default_connector(host: Arc<dyn HostProvider>) -> Self {
        let connector = Arc::new(DefaultConnector::new(host.app_name(), host.app_version()));
        Self::new(host, connector)
    }

    /// Register a consumer and return a handle to the shared hub,
    /// constructing the hub on the first acquire.
    ///
    /// A failed first construction propagates to the caller that triggered
    /// it; that caller's registration is rolled back so a later acquire
    /// retries from scratch.
    pub async fn acquire(
        self: &Arc<Self>,
        consumer: impl Into<String>,
    ) -> Result<HubHandle, McpHubError> {
        let consumer = consumer.into();
        let mut state = self.state.lock().await;
        state.consumers.insert(consumer.clone());

        let hub = if let Some(hub) = &state.hub {
            Arc::clone(hub)
        } else {
            let hub = Arc::new(McpHub::new(
                Arc::clone(&self.host),
                Arc::clone(&self.connector),
            ));
            if let Err(e) = hub.initialize().await {
                state.consumers.remove(&consumer);
                return Err(e);
            }
            state.hub = Some(Arc::clone(&hub));
            hub
        };

        tracing::debug!(
            consumer = %consumer,
            consumers = state.consumers.len(),
            "Hub acquired"
        );

        Ok(HubHandle {
            registry: Arc::clone(self),
            consumer: Some(consumer),
            hub,
        })
    }

    /// Number of registered consumers.
    pub async fn consumer_count(&self) -> usize {
        self.state.lock().await.consumers.len()
    }

    /// Whether a hub instance currently exists.
    pub async fn is_active(&self) -> bool {
        self.state.lock().await.hub.is_some()
    }
}

/// A consumer's handle to the shared hub.
pub struct HubHandle {
    registry: Arc<HubRegistry>,
    /// `None` once released.
    consumer: Option<String>,
    hub: Arc<McpHub>,
}

impl HubHandle {
    /// The shared hub.
    pub fn hub(&self) -> &Arc<McpHub> {
        &self.hub
    }

    /// Deregister this consumer. When it was the last one, the hub is fully
    /// torn down: every connection closed, the settings watcher stopped,
    /// and the shared instance dropped so a later acquire rebuilds.
    pub async fn release(mut self) {
        let Some(consumer) = self.consumer.take() else {
            return;
        };

        let mut state = self.registry.state.lock().await;
        state.consumers.remove(&consumer);

        if state.consumers.is_empty() {
            if let Some(hub) = state.hub.take() {
                hub.dispose().await;
            }
            tracing::info!("Last consumer released; hub torn down");
        } else {
            tracing::debug!(
                consumer = %consumer,
                consumers = state.consumers.len(),
                "Hub released"
            );
        }
    }
}

impl Drop for HubHandle {
    fn drop(&mut self) {
        // A handle should be released explicitly; dropping one leaks its
        // registration and can keep the hub alive past its last real user.
        if let Some(consumer) = &self.consumer {
            tracing::warn!(
                consumer = %consumer,
                "Hub handle dropped without release; registration leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolmux_core::{FsHostProvider, McpServerDescriptor};

    use crate::client::McpSession;
    use crate::transport::McpClientError;

    /// Connector for registries whose settings file has no servers.
    struct NeverConnector;

    #[async_trait]
    impl McpConnector for NeverConnector {
        async fn connect(
            &self,
            descriptor: &McpServerDescriptor,
        ) -> Result<Arc<dyn McpSession>, McpClientError> {
            Err(McpClientError::Protocol(format!(
                "unexpected connect for {}",
                descriptor.name
            )))
        }
    }

    fn registry(dir: &tempfile::TempDir) -> Arc<HubRegistry> {
        let settings = dir.path().join("mcp_settings.json");
        let host = Arc::new(FsHostProvider::new("test-host", "0.0.0", settings));
        Arc::new(HubRegistry::new(host, Arc::new(NeverConnector)))
    }

    #[tokio::test]
    async fn test_first_acquire_constructs_hub() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        assert!(!registry.is_active().await);

        let handle = registry.acquire("executor").await.unwrap();
        assert!(registry.is_active().await);
        assert_eq!(registry.consumer_count().await, 1);

        handle.release().await;
        assert!(!registry.is_active().await);
        assert_eq!(registry.consumer_count().await, 0);
    }

    #[tokio::test]
    async fn test_shared_instance_across_consumers() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let a = registry.acquire("executor").await.unwrap();
        let b = registry.acquire("formatter").await.unwrap();
        assert!(Arc::ptr_eq(a.hub(), b.hub()));
        assert_eq!(registry.consumer_count().await, 2);

        a.release().await;
        assert!(registry.is_active().await);

        b.release().await;
        assert!(!registry.is_active().await);
    }

    #[tokio::test]
    async fn test_reacquire_rebuilds_from_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let first = registry.acquire("executor").await.unwrap();
        let first_hub = Arc::clone(first.hub());
        first.release().await;

        let second = registry.acquire("executor").await.unwrap();
        assert!(!Arc::ptr_eq(&first_hub, second.hub()));
        second.release().await;
    }

    #[tokio::test]
    async fn test_duplicate_consumer_registers_once() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let a = registry.acquire("executor").await.unwrap();
        let b = registry.acquire("executor").await.unwrap();
        assert_eq!(registry.consumer_count().await, 1);

        // Releasing either handle for the shared id empties the set.
        a.release().await;
        assert!(!registry.is_active().await);
        b.release().await;
    }
}
