//! In-process provider
//!
//! Fabricates ids and ARNs without talking to any cloud. Used for offline dry
//! runs (`--provider memory`) and as the provider in engine tests. Every call
//! is recorded and individual resources can be made to fail.

use crate::action::ActionType;
use crate::error::{CloudError, Result};
use crate::provider::{AuthStatus, CloudProvider, ResourceConfig};
use crate::state::{ResourceState, ResourceStatus};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// A call received by [`MemoryProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: ActionType,
    pub resource_type: String,
    pub name: String,
}

#[derive(Default)]
struct Inner {
    calls: Vec<ProviderCall>,
    failing: HashSet<String>,
    incomplete: HashSet<String>,
    next_id: u64,
}

/// Provider that keeps everything in memory
#[derive(Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call for the resource with this logical name fail
    pub fn fail_on(self, name: impl Into<String>) -> Self {
        self.lock().failing.insert(name.into());
        self
    }

    /// Create the resource with this logical name, then report that
    /// configuring it failed
    pub fn fail_after_create(self, name: impl Into<String>) -> Self {
        self.lock().incomplete.insert(name.into());
        self
    }

    /// Stop failing calls for `name`
    pub fn heal(&self, name: &str) {
        let mut inner = self.lock();
        inner.failing.remove(name);
        inner.incomplete.remove(name);
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: ActionType, resource_type: &str, name: &str) -> Result<u64> {
        let mut inner = self.lock();
        inner.calls.push(ProviderCall {
            operation,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        });

        if inner.failing.contains(name) {
            return Err(CloudError::ApiError(format!(
                "{} {} rejected by provider",
                operation, name
            )));
        }

        inner.next_id += 1;
        Ok(inner.next_id)
    }
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn display_name(&self) -> &str {
        "In-memory (offline)"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("local"))
    }

    async fn create(&self, resource: &ResourceConfig) -> Result<ResourceState> {
        let serial = self.record(ActionType::Create, &resource.resource_type, &resource.name)?;
        let id = format!("{}-{:07x}", resource.name.to_lowercase(), serial);
        let arn = format!("arn:memory:{}:{}", resource.resource_type, id);

        tracing::debug!("memory: created {} as {}", resource.key(), id);
        let state = ResourceState::new(id, &resource.resource_type)
            .with_status(ResourceStatus::Ready)
            .with_attribute("arn", serde_json::json!(arn));

        if self.lock().incomplete.contains(&resource.name) {
            return Err(CloudError::Incomplete {
                resource: Box::new(state),
                source: Box::new(CloudError::ApiError(format!(
                    "configuring {} rejected by provider",
                    resource.name
                ))),
            });
        }
        Ok(state)
    }

    async fn update(
        &self,
        resource: &ResourceConfig,
        current: &ResourceState,
    ) -> Result<ResourceState> {
        self.record(ActionType::Update, &resource.resource_type, &resource.name)?;
        tracing::debug!("memory: updated {}", resource.key());
        Ok(current.clone().with_status(ResourceStatus::Ready))
    }

    async fn delete(&self, resource: &ResourceState) -> Result<()> {
        self.record(ActionType::Delete, &resource.resource_type, &resource.name)?;
        tracing::debug!("memory: deleted {}", resource.key());
        Ok(())
    }
}
