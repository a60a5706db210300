//! Cloud provider trait definition

use crate::error::{CloudError, Result};
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Cloud provider abstraction trait
///
/// The engine decides *what* to do with each resource; a provider only knows
/// how to create, update and delete the resource types it supports.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws", "memory")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create the resource and return its recorded state
    async fn create(&self, resource: &ResourceConfig) -> Result<ResourceState>;

    /// Bring an existing resource in line with new inputs
    async fn update(
        &self,
        resource: &ResourceConfig,
        current: &ResourceState,
    ) -> Result<ResourceState>;

    /// Delete a resource previously created by this provider
    async fn delete(&self, resource: &ResourceState) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Build the state key of a resource (`type::name`)
pub fn resource_key(resource_type: &str, name: &str) -> String {
    format!("{}::{}", resource_type, name)
}

/// Declaration of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "aws:kms/key:Key")
    pub resource_type: String,

    /// Logical name, unique within a stack
    pub name: String,

    /// Fully resolved input arguments
    pub inputs: serde_json::Value,

    /// Keys of the resources this one references
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        inputs: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            inputs,
            dependencies: Vec::new(),
        }
    }

    /// Declare a resource from a typed argument struct
    pub fn from_args<T: Serialize>(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        args: &T,
    ) -> Result<Self> {
        Ok(Self::new(resource_type, name, serde_json::to_value(args)?))
    }

    /// Add a dependency edge on another resource
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.dependencies.contains(&key) {
            self.dependencies.push(key);
        }
        self
    }

    /// Get the full resource key (type::name)
    pub fn key(&self) -> String {
        resource_key(&self.resource_type, &self.name)
    }

    /// Decode the inputs into a typed argument struct
    pub fn args<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.inputs.clone()).map_err(|e| {
            CloudError::InvalidConfig(format!("{}: invalid arguments: {}", self.name, e))
        })
    }
}
