//! Registration context
//!
//! A [`Context`] is handed to the provisioning program. Each call to
//! [`Context::register`] diffs one declared resource against the stack state
//! and, in update mode, immediately reconciles it through the provider. A
//! failed registration returns the provider error so the program can stop
//! with `?`; [`Context::finish`] then decides whether outputs get published.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::error::{CloudError, Result};
use crate::graph;
use crate::provider::{CloudProvider, ResourceConfig};
use crate::state::{ResourceState, ResourceStatus, StackState, StateManager};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

/// Placeholder for values that are only known after the provider runs
pub const UNKNOWN: &str = "<computed>";

/// Whether a run talks to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Compute the plan only
    Preview,
    /// Reconcile resources through the provider
    Update,
}

/// Handle to a resource registered in the current run
#[derive(Debug, Clone)]
pub struct RegisteredResource {
    key: String,
    id: Option<String>,
    attributes: HashMap<String, serde_json::Value>,
}

impl RegisteredResource {
    fn known(key: String, state: &ResourceState) -> Self {
        Self {
            key,
            id: Some(state.id.clone()),
            attributes: state.attributes.clone(),
        }
    }

    fn unknown(key: String) -> Self {
        Self {
            key,
            id: None,
            attributes: HashMap::new(),
        }
    }

    /// State key, used as a dependency edge by downstream resources
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Provider id of the resource, or [`UNKNOWN`] during a preview
    pub fn id(&self) -> String {
        self.id.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Provider-computed attribute, or [`UNKNOWN`] when not yet known
    pub fn attribute(&self, name: &str) -> serde_json::Value {
        match (&self.id, self.attributes.get(name)) {
            (_, Some(value)) => value.clone(),
            (None, None) => serde_json::json!(UNKNOWN),
            (Some(_), None) => serde_json::Value::Null,
        }
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    /// Stack state after the run
    pub state: StackState,

    /// Actions in execution order
    pub plan: Plan,

    /// Per-action outcome (empty for previews)
    pub result: ApplyResult,

    /// Keys registered by the program, in order
    pub registered: Vec<String>,

    /// Outputs published by the run; empty unless the run succeeded
    pub outputs: BTreeMap<String, serde_json::Value>,

    /// The error that stopped the run
    pub error: Option<CloudError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Engine handle passed to the provisioning program
pub struct Context<'a> {
    provider: &'a dyn CloudProvider,
    store: Option<&'a StateManager>,
    state: StackState,
    mode: RunMode,
    registered: Vec<String>,
    outputs: BTreeMap<String, serde_json::Value>,
    plan: Plan,
    result: ApplyResult,
    started: Instant,
}

impl<'a> Context<'a> {
    pub fn new(provider: &'a dyn CloudProvider, state: StackState, mode: RunMode) -> Self {
        Self {
            provider,
            store: None,
            state,
            mode,
            registered: Vec::new(),
            outputs: BTreeMap::new(),
            plan: Plan::empty(),
            result: ApplyResult::new(),
            started: Instant::now(),
        }
    }

    /// Save the state after every change (update mode only)
    pub fn with_checkpoints(mut self, store: &'a StateManager) -> Self {
        self.store = Some(store);
        self
    }

    /// Declare a resource and reconcile it
    pub async fn register(&mut self, config: ResourceConfig) -> Result<RegisteredResource> {
        let key = config.key();

        if self.registered.contains(&key) {
            return Err(CloudError::DuplicateResource(key));
        }
        if let Some(missing) = config
            .dependencies
            .iter()
            .find(|dep| !self.registered.contains(dep))
        {
            return Err(CloudError::UnknownDependency {
                resource: key,
                dependency: missing.clone(),
            });
        }

        let existing = self.state.get_resource(&key).cloned();
        let (action_type, changed) = match &existing {
            None => (ActionType::Create, Vec::new()),
            Some(prev) => {
                let changed = changed_fields(&prev.inputs, &config.inputs);
                if changed.is_empty()
                    && prev.dependencies == config.dependencies
                    && prev.status == ResourceStatus::Ready
                {
                    (ActionType::NoOp, changed)
                } else {
                    (ActionType::Update, changed)
                }
            }
        };

        self.registered.push(key.clone());
        let action = Action::new(action_type, &config.resource_type, &config.name)
            .with_changed_fields(changed);
        tracing::info!(resource = %key, action = %action_type, "registering resource");

        if self.mode == RunMode::Preview {
            self.plan.push(action);
            return Ok(match &existing {
                Some(prev) => RegisteredResource::known(key, prev),
                None => RegisteredResource::unknown(key),
            });
        }

        let outcome = match (&existing, action_type) {
            (Some(prev), ActionType::NoOp) => Ok(prev.clone()),
            (Some(prev), _) => self.provider.update(&config, prev).await,
            (None, _) => self.provider.create(&config).await,
        };

        let mut resource = match outcome {
            Ok(resource) => resource,
            Err(CloudError::Incomplete { resource, source }) => {
                // The resource exists; keep it so the next run updates it
                // instead of creating another one.
                let partial =
                    self.record(&config, *resource, existing.as_ref(), ResourceStatus::Error);
                tracing::warn!(
                    resource = %key,
                    id = %partial.id,
                    error = %source,
                    "resource left partially configured"
                );
                self.result.add_failure(action.id.clone(), source.to_string());
                self.plan.push(action);
                self.checkpoint().await?;
                return Err(CloudError::Incomplete {
                    resource: Box::new(partial),
                    source,
                });
            }
            Err(e) => {
                tracing::warn!(resource = %key, error = %e, "provider rejected resource");
                self.result.add_failure(action.id.clone(), e.to_string());
                self.plan.push(action);
                return Err(e);
            }
        };

        if action_type != ActionType::NoOp {
            resource =
                self.record(&config, resource, existing.as_ref(), ResourceStatus::Ready);
            self.checkpoint().await?;
            self.result
                .add_success(action.id.clone(), action.description.clone());
        }

        self.plan.push(action);
        Ok(RegisteredResource::known(key, &resource))
    }

    /// Store the provider's view of a declared resource in the stack state
    fn record(
        &mut self,
        config: &ResourceConfig,
        mut resource: ResourceState,
        existing: Option<&ResourceState>,
        status: ResourceStatus,
    ) -> ResourceState {
        resource.name = config.name.clone();
        resource.resource_type = config.resource_type.clone();
        resource.inputs = config.inputs.clone();
        resource.dependencies = config.dependencies.clone();
        resource.status = status;
        resource.updated_at = Utc::now();
        if let Some(prev) = existing {
            resource.created_at = prev.created_at;
        }
        self.state.set_resource(config.key(), resource.clone());
        resource
    }

    /// Publish a named output; only takes effect if the whole run succeeds
    pub fn export(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.outputs.insert(name.into(), value.into());
    }

    /// Close the run.
    ///
    /// On success, resources recorded in state but not registered by this
    /// run are deleted and the outputs are published. On failure nothing else
    /// is touched and no outputs are published.
    pub async fn finish(mut self, outcome: Result<()>) -> RunReport {
        let mut error = match outcome {
            Ok(()) => {
                let registered: BTreeSet<String> = self.registered.iter().cloned().collect();
                let stale: Vec<String> = self
                    .state
                    .resources
                    .keys()
                    .filter(|k| !registered.contains(*k))
                    .cloned()
                    .collect();
                self.delete_resources(&stale).await.err()
            }
            Err(e) => Some(e),
        };

        if error.is_none() && self.mode == RunMode::Update {
            let outputs = self.outputs.clone();
            self.state.set_outputs(outputs);
            error = self.checkpoint().await.err();
        }

        if error.is_some() {
            self.outputs.clear();
        }
        self.into_report(error)
    }

    /// Delete every resource in the stack and clear its outputs
    pub async fn destroy(mut self) -> RunReport {
        let all: Vec<String> = self.state.resources.keys().cloned().collect();
        let mut error = self.delete_resources(&all).await.err();

        if error.is_none() && self.mode == RunMode::Update {
            self.state.set_outputs(BTreeMap::new());
            error = self.checkpoint().await.err();
        }
        self.outputs.clear();
        self.into_report(error)
    }

    async fn delete_resources(&mut self, keys: &[String]) -> Result<()> {
        let keys: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        let order = graph::destroy_order_of(&self.state, &keys)?;

        for key in order {
            let Some(resource) = self.state.get_resource(&key).cloned() else {
                continue;
            };
            let action = Action::new(ActionType::Delete, &resource.resource_type, &resource.name);
            tracing::info!(resource = %key, "deleting resource");

            if self.mode == RunMode::Preview {
                self.plan.push(action);
                continue;
            }

            if let Err(e) = self.provider.delete(&resource).await {
                tracing::warn!(resource = %key, error = %e, "provider failed to delete resource");
                self.result.add_failure(action.id.clone(), e.to_string());
                self.plan.push(action);
                return Err(e);
            }

            self.state.remove_resource(&key);
            self.checkpoint().await?;
            self.result
                .add_success(action.id.clone(), action.description.clone());
            self.plan.push(action);
        }
        Ok(())
    }

    async fn checkpoint(&self) -> Result<()> {
        match (self.mode, self.store) {
            (RunMode::Update, Some(store)) => store.save(&self.state).await,
            _ => Ok(()),
        }
    }

    fn into_report(mut self, error: Option<CloudError>) -> RunReport {
        self.result.duration_ms = self.started.elapsed().as_millis() as u64;
        RunReport {
            state: self.state,
            plan: self.plan,
            result: self.result,
            registered: self.registered,
            outputs: self.outputs,
            error,
        }
    }
}

/// Top-level input fields that differ between two input objects
fn changed_fields(old: &serde_json::Value, new: &serde_json::Value) -> Vec<String> {
    match (old.as_object(), new.as_object()) {
        (Some(old), Some(new)) => {
            let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
            fields
                .into_iter()
                .filter(|f| old.get(*f) != new.get(*f))
                .cloned()
                .collect()
        }
        _ if old == new => Vec::new(),
        _ => vec!["*".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use serde_json::json;
    use tempfile::tempdir;

    fn key_config(description: &str) -> ResourceConfig {
        ResourceConfig::new(
            "test:index:Key",
            "key",
            json!({ "description": description }),
        )
    }

    fn bucket_config(key: &RegisteredResource) -> ResourceConfig {
        ResourceConfig::new("test:index:Bucket", "bucket", json!({ "key": key.id() }))
            .depends_on(key.key())
    }

    async fn two_step(ctx: &mut Context<'_>, description: &str) -> Result<()> {
        let key = ctx.register(key_config(description)).await?;
        let bucket = ctx.register(bucket_config(&key)).await?;
        ctx.export("bucket", bucket.id());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_creates_and_exports() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        let outcome = two_step(&mut ctx, "a").await;
        let report = ctx.finish(outcome).await;

        assert!(report.is_success());
        assert_eq!(report.state.resources.len(), 2);
        assert_eq!(report.plan.summary().create, 2);
        assert_eq!(report.outputs["bucket"], json!("bucket-0000002"));
        assert_eq!(report.state.outputs, report.outputs);

        let bucket = report.state.get_resource("test:index:Bucket::bucket").unwrap();
        assert_eq!(bucket.inputs["key"], json!("key-0000001"));
        assert_eq!(bucket.dependencies, vec!["test:index:Key::key".to_string()]);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        let outcome = two_step(&mut ctx, "a").await;
        let first = ctx.finish(outcome).await;

        let mut ctx = Context::new(&provider, first.state, RunMode::Update);
        let outcome = two_step(&mut ctx, "a").await;
        let second = ctx.finish(outcome).await;

        assert!(second.is_success());
        assert!(!second.plan.has_changes());
        assert_eq!(second.plan.summary().no_change, 2);
        assert_eq!(provider.calls().len(), 2);
        assert_eq!(second.outputs, first.outputs);
    }

    #[tokio::test]
    async fn test_changed_input_updates_in_place() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        let outcome = two_step(&mut ctx, "a").await;
        let first = ctx.finish(outcome).await;

        let mut ctx = Context::new(&provider, first.state, RunMode::Update);
        let outcome = two_step(&mut ctx, "b").await;
        let second = ctx.finish(outcome).await;

        let actions: Vec<ActionType> = second.plan.actions.iter().map(|a| a.action_type).collect();
        assert_eq!(actions, vec![ActionType::Update, ActionType::NoOp]);
        assert_eq!(second.plan.actions[0].changed_fields, vec!["description"]);
    }

    #[tokio::test]
    async fn test_failure_stops_run_without_outputs() {
        let provider = MemoryProvider::new().fail_on("bucket");
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        let outcome = two_step(&mut ctx, "a").await;
        let report = ctx.finish(outcome).await;

        assert!(!report.is_success());
        assert!(report.outputs.is_empty());
        assert!(report.state.outputs.is_empty());
        // The key stays recorded for the next run to reconcile
        assert!(report.state.get_resource("test:index:Key::key").is_some());
        assert!(report.state.get_resource("test:index:Bucket::bucket").is_none());
        assert_eq!(report.result.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_partially_created_resource_is_kept_and_updated_next_run() {
        let temp_dir = tempdir().unwrap();
        let store = StateManager::new(temp_dir.path(), "t");
        let provider = MemoryProvider::new().fail_after_create("bucket");

        let mut ctx =
            Context::new(&provider, StackState::new("t"), RunMode::Update).with_checkpoints(&store);
        let outcome = two_step(&mut ctx, "a").await;
        let first = ctx.finish(outcome).await;

        assert!(matches!(first.error, Some(CloudError::Incomplete { .. })));
        assert!(first.outputs.is_empty());
        let saved = store.load().await.unwrap();
        let bucket = saved.get_resource("test:index:Bucket::bucket").unwrap();
        assert_eq!(bucket.id, "bucket-0000002");
        assert_eq!(bucket.status, ResourceStatus::Error);

        // Same inputs, but the recorded bucket is not ready: update it in place
        provider.heal("bucket");
        let mut ctx = Context::new(&provider, saved, RunMode::Update).with_checkpoints(&store);
        let outcome = two_step(&mut ctx, "a").await;
        let second = ctx.finish(outcome).await;

        assert!(second.is_success());
        let actions: Vec<ActionType> = second.plan.actions.iter().map(|a| a.action_type).collect();
        assert_eq!(actions, vec![ActionType::NoOp, ActionType::Update]);
        assert_eq!(second.outputs["bucket"], json!("bucket-0000002"));

        let creates = provider
            .calls()
            .iter()
            .filter(|c| c.operation == ActionType::Create)
            .count();
        assert_eq!(creates, 2);
        let bucket = second.state.get_resource("test:index:Bucket::bucket").unwrap();
        assert_eq!(bucket.status, ResourceStatus::Ready);
    }

    #[tokio::test]
    async fn test_preview_never_calls_provider() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Preview);
        let outcome = two_step(&mut ctx, "a").await;
        let report = ctx.finish(outcome).await;

        assert!(report.is_success());
        assert!(provider.calls().is_empty());
        assert!(report.state.resources.is_empty());
        assert_eq!(report.outputs["bucket"], json!(UNKNOWN));
        assert_eq!(report.plan.summary().create, 2);
    }

    #[tokio::test]
    async fn test_unknown_dependency_is_rejected() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        let config = ResourceConfig::new("test:index:Bucket", "bucket", json!({}))
            .depends_on("test:index:Key::key");

        let err = ctx.register(config).await.unwrap_err();
        assert!(matches!(err, CloudError::UnknownDependency { .. }));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        ctx.register(key_config("a")).await.unwrap();

        let err = ctx.register(key_config("a")).await.unwrap_err();
        assert!(matches!(err, CloudError::DuplicateResource(_)));
    }

    #[tokio::test]
    async fn test_unregistered_resources_are_deleted() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        let outcome = two_step(&mut ctx, "a").await;
        let first = ctx.finish(outcome).await;

        let mut ctx = Context::new(&provider, first.state, RunMode::Update);
        let outcome = ctx.register(key_config("a")).await.map(|_| ());
        let second = ctx.finish(outcome).await;

        assert!(second.is_success());
        assert_eq!(second.plan.summary().delete, 1);
        assert_eq!(second.state.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_removes_everything_in_order() {
        let provider = MemoryProvider::new();
        let mut ctx = Context::new(&provider, StackState::new("t"), RunMode::Update);
        let outcome = two_step(&mut ctx, "a").await;
        let first = ctx.finish(outcome).await;

        let report = Context::new(&provider, first.state, RunMode::Update)
            .destroy()
            .await;

        assert!(report.is_success());
        assert!(report.state.resources.is_empty());
        assert!(report.state.outputs.is_empty());
        let deleted: Vec<String> = report.plan.actions.iter().map(|a| a.name.clone()).collect();
        assert_eq!(deleted, vec!["bucket", "key"]);
    }

    #[tokio::test]
    async fn test_checkpoints_are_written() {
        let temp_dir = tempdir().unwrap();
        let store = StateManager::new(temp_dir.path(), "t");
        let provider = MemoryProvider::new().fail_on("bucket");

        let mut ctx =
            Context::new(&provider, StackState::new("t"), RunMode::Update).with_checkpoints(&store);
        let outcome = two_step(&mut ctx, "a").await;
        let report = ctx.finish(outcome).await;
        assert!(!report.is_success());

        let saved = store.load().await.unwrap();
        assert_eq!(saved.resources.len(), 1);
        assert!(saved.outputs.is_empty());
    }

    #[test]
    fn test_changed_fields() {
        let old = json!({ "a": 1, "b": 2 });
        let new = json!({ "a": 1, "b": 3, "c": 4 });
        assert_eq!(changed_fields(&old, &new), vec!["b", "c"]);
        assert!(changed_fields(&old, &old).is_empty());
    }
}
