//! AWS provider for SealBucket
//!
//! Implements the `CloudProvider` trait for the four resource types the
//! encrypted-bucket graph uses:
//!
//! - `aws:kms/key:Key`
//! - `aws:kms/alias:Alias`
//! - `aws:s3/bucket:Bucket` (versioning and default encryption)
//! - `aws:s3/bucketPublicAccessBlock:BucketPublicAccessBlock`
//!
//! # Requirements
//!
//! Credentials and region are taken from the standard AWS chain
//! (`AWS_PROFILE`, `AWS_REGION`, `~/.aws/config`, instance metadata, ...).
//!
//! # Example
//!
//! ```ignore
//! use sealbucket_cloud::CloudProvider;
//! use sealbucket_cloud_aws::AwsProvider;
//!
//! let provider = AwsProvider::from_env(Some("eu-west-1".to_string()), None).await;
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod error;
pub mod provider;
pub mod resources;

pub use error::{AwsError, Result};
pub use provider::{AwsProvider, autoname_bucket};
pub use resources::{
    AliasArgs, ApplyServerSideEncryptionByDefaultArgs, BucketArgs, BucketPublicAccessBlockArgs,
    KeyArgs, ResourceArgs, SSE_ALGORITHM_KMS, ServerSideEncryptionConfigurationArgs,
    ServerSideEncryptionRuleArgs, VersioningArgs,
};
