//! SealBucket resource engine
//!
//! This crate reconciles a declared resource graph against a recorded stack
//! state. The provisioning program registers resources through a
//! [`Context`]; the engine diffs each declaration against the state, asks a
//! [`CloudProvider`] to create, update or delete it, and checkpoints the
//! result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 sealbucket CLI                   │
//! │            (up / preview / destroy)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               sealbucket-cloud                   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │   Context    │  │  State Mgmt  │             │
//! │  └──────────────┘  └──────────────┘             │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait CloudProvider { ... }              │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  aws provider │ │    memory     │
//! │ (kms, s3)     │ │   provider    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod context;
pub mod error;
pub mod graph;
pub mod memory;
pub mod provider;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use context::{Context, RegisteredResource, RunMode, RunReport, UNKNOWN};
pub use error::{CloudError, Result};
pub use memory::{MemoryProvider, ProviderCall};
pub use provider::{AuthStatus, CloudProvider, ResourceConfig, resource_key};
pub use state::{ResourceState, ResourceStatus, StackState, StateLock, StateManager};
