//! State management for provisioned resources
//!
//! Each stack keeps its state in `.sealbucket/stacks/<stack>.json`, which
//! records every resource the engine created together with the inputs it was
//! created from and the outputs of the last successful run.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".sealbucket";
const STACKS_DIR: &str = "stacks";

/// State of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Stack name
    pub stack: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by `type::name`
    pub resources: HashMap<String, ResourceState>,

    /// Outputs exported by the last successful run
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl StackState {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            stack: stack.into(),
            updated_at: Utc::now(),
            resources: HashMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by key
    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Replace the exported outputs
    pub fn set_outputs(&mut self, outputs: BTreeMap<String, serde_json::Value>) {
        self.outputs = outputs;
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// State of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID (key id, bucket name, ...)
    pub id: String,

    /// Resource type
    pub resource_type: String,

    /// Logical name
    #[serde(default)]
    pub name: String,

    /// Current status
    pub status: ResourceStatus,

    /// Inputs the resource was last reconciled with
    #[serde(default)]
    pub inputs: serde_json::Value,

    /// Provider-computed attributes (ARN, key id, region, ...)
    pub attributes: HashMap<String, serde_json::Value>,

    /// Keys of the resources this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            name: String::new(),
            status: ResourceStatus::Unknown,
            inputs: serde_json::Value::Null,
            attributes: HashMap::new(),
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// State key (`type::name`)
    pub fn key(&self) -> String {
        crate::provider::resource_key(&self.resource_type, &self.name)
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource exists and matches its inputs
    Ready,
    /// Resource exists but its last reconciliation failed part-way
    Error,
    /// Status is unknown
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Error => write!(f, "error"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// State manager for reading/writing stack state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,

    /// Stack name
    stack: String,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>, stack: impl Into<String>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            stack: stack.into(),
        }
    }

    /// Get the stacks directory path
    fn stacks_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR).join(STACKS_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.stacks_dir().join(format!("{}.json", self.stack))
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.stacks_dir().join(format!("{}.json.backup", self.stack))
    }

    /// Scratch file the next state is written to before it replaces the current one
    fn pending_path(&self) -> PathBuf {
        self.stacks_dir().join(format!("{}.json.pending", self.stack))
    }

    /// Get the lock file path
    fn lock_path(&self) -> PathBuf {
        self.stacks_dir().join(format!("{}.lock.json", self.stack))
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.stacks_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StackState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StackState::new(&self.stack));
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        // Version check
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        if state.stack != self.stack {
            return Err(CloudError::StateError(format!(
                "State file {} belongs to stack '{}', not '{}'",
                path.display(),
                state.stack,
                self.stack
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state
    ///
    /// The new state is fully written before it replaces the current file,
    /// so a failed save leaves the previous state in place.
    pub async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let pending = self.pending_path();

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&pending, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
            tracing::debug!("Created state backup");
        }
        fs::rename(&pending, &path).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        match create_lock_file(&lock_path, &content).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                self.check_stale_lock(&lock_path).await?;
                create_lock_file(&lock_path, &content)
                    .await
                    .map_err(|e| match e.kind() {
                        std::io::ErrorKind::AlreadyExists => CloudError::LockError(format!(
                            "Stack '{}' was locked by another run",
                            self.stack
                        )),
                        _ => e.into(),
                    })?;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!("Acquired state lock for stack {}", self.stack);
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }

    /// Remove an existing lock if it is older than one hour, fail otherwise
    async fn check_stale_lock(&self, lock_path: &Path) -> Result<()> {
        let content = fs::read_to_string(lock_path).await?;
        let Ok(lock_info) = serde_json::from_str::<LockInfo>(&content) else {
            // Holder has not finished writing the lock yet
            return Err(CloudError::LockError(format!(
                "Stack '{}' is being locked by another run",
                self.stack
            )));
        };

        let age = Utc::now().signed_duration_since(lock_info.acquired_at);
        if age.num_hours() < 1 {
            return Err(CloudError::LockError(format!(
                "Stack '{}' is locked by {} since {}",
                self.stack, lock_info.holder, lock_info.acquired_at
            )));
        }

        tracing::warn!("Removing stale lock from {}", lock_info.holder);
        fs::remove_file(lock_path).await?;
        Ok(())
    }
}

/// Create the lock file, failing if it already exists
async fn create_lock_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let mut state = StackState::new("dev");
        state.set_resource(
            "aws:kms/key:Key::bucketKey".to_string(),
            ResourceState::new("1234abcd", "aws:kms/key:Key")
                .with_status(ResourceStatus::Ready)
                .with_attribute("arn", serde_json::json!("arn:aws:kms:eu-west-1:1:key/1234abcd")),
        );
        state.outputs.insert("kmsKeyAlias".to_string(), serde_json::json!("alias/x"));

        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert!(loaded.resources.contains_key("aws:kms/key:Key::bucketKey"));
        assert_eq!(loaded.outputs["kmsKeyAlias"], serde_json::json!("alias/x"));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let state = manager.load().await.unwrap();
        assert!(state.is_empty());
        assert_eq!(state.stack, "dev");
    }

    #[tokio::test]
    async fn test_save_keeps_backup_of_previous_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        manager.save(&StackState::new("dev")).await.unwrap();
        manager.save(&StackState::new("dev")).await.unwrap();

        assert!(manager.backup_path().exists());
        assert!(manager.state_path().exists());
    }

    #[tokio::test]
    async fn test_load_rejects_other_stack() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");
        manager.save(&StackState::new("dev")).await.unwrap();

        // Same file, different stack name inside
        let content = std::fs::read_to_string(manager.state_path()).unwrap();
        std::fs::write(
            manager.state_path(),
            content.replace("\"stack\": \"dev\"", "\"stack\": \"prod\""),
        )
        .unwrap();

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, CloudError::StateError(_)));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let lock = manager.acquire_lock().await.unwrap();
        let second = manager.acquire_lock().await;
        assert!(matches!(second, Err(CloudError::LockError(_))));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!manager.lock_path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_lock_attempts_have_one_winner() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let (first, second) = tokio::join!(manager.acquire_lock(), manager.acquire_lock());
        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");
        manager.ensure_state_dir().await.unwrap();

        let stale = LockInfo {
            holder: "crashed-host".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(manager.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = manager.acquire_lock().await.unwrap();
        let content = std::fs::read_to_string(manager.lock_path()).unwrap();
        assert!(!content.contains("crashed-host"));
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let mut state = StackState::new("dev");
        state.set_resource(
            "aws:kms/key:Key::bucketKey".to_string(),
            ResourceState::new("1234abcd", "aws:kms/key:Key"),
        );
        manager.save(&state).await.unwrap();

        // Block the scratch file so the next write fails
        std::fs::create_dir(manager.pending_path()).unwrap();
        assert!(manager.save(&StackState::new("dev")).await.is_err());

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
    }
}
