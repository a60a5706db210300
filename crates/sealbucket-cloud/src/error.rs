//! Engine error types

use crate::state::ResourceState;
use thiserror::Error;

/// Errors raised while registering, planning or reconciling resources
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource already declared in this run: {0}")]
    DuplicateResource(String),

    #[error("Resource {resource} depends on {dependency}, which has not been registered")]
    UnknownDependency {
        resource: String,
        dependency: String,
    },

    #[error("Dependency cycle detected involving: {0}")]
    DependencyCycle(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResource(String),

    /// The provider created the resource but could not finish configuring it.
    /// `resource` describes what exists so it can be recorded and retried.
    #[error("{} was created but is not fully configured: {source}", resource.id)]
    Incomplete {
        resource: Box<ResourceState>,
        source: Box<CloudError>,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
