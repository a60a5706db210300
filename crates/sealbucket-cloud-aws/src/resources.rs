//! Typed arguments for the AWS resources SealBucket manages
//!
//! Each struct serializes into the `inputs` of a [`ResourceConfig`], so the
//! JSON shape here is what gets recorded in the stack state and diffed
//! between runs.

use sealbucket_cloud::{ResourceConfig, Result};
use serde::{Deserialize, Serialize};

/// SSE algorithm tag for KMS-managed keys
pub const SSE_ALGORITHM_KMS: &str = "aws:kms";

/// Default waiting period before a scheduled key deletion takes effect
pub const DEFAULT_DELETION_WINDOW_DAYS: i32 = 30;

/// Argument struct bound to one resource type
pub trait ResourceArgs: Serialize + Sized {
    /// Resource type token
    const TYPE: &'static str;

    /// Turn these arguments into a declaration named `name`
    fn declare(&self, name: &str) -> Result<ResourceConfig> {
        ResourceConfig::from_args(Self::TYPE, name, self)
    }
}

/// KMS key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyArgs {
    pub description: String,
    #[serde(default = "default_deletion_window")]
    pub deletion_window_in_days: i32,
}

fn default_deletion_window() -> i32 {
    DEFAULT_DELETION_WINDOW_DAYS
}

impl KeyArgs {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            deletion_window_in_days: DEFAULT_DELETION_WINDOW_DAYS,
        }
    }
}

impl ResourceArgs for KeyArgs {
    const TYPE: &'static str = "aws:kms/key:Key";
}

/// KMS alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasArgs {
    /// Alias name, always prefixed with `alias/`
    pub name: String,
    pub target_key_id: String,
}

impl ResourceArgs for AliasArgs {
    const TYPE: &'static str = "aws:kms/alias:Alias";
}

/// S3 bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning: Option<VersioningArgs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_side_encryption_configuration: Option<ServerSideEncryptionConfigurationArgs>,
}

impl ResourceArgs for BucketArgs {
    const TYPE: &'static str = "aws:s3/bucket:Bucket";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersioningArgs {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSideEncryptionConfigurationArgs {
    pub rule: ServerSideEncryptionRuleArgs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSideEncryptionRuleArgs {
    pub apply_server_side_encryption_by_default: ApplyServerSideEncryptionByDefaultArgs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyServerSideEncryptionByDefaultArgs {
    pub sse_algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_master_key_id: Option<String>,
}

impl ServerSideEncryptionConfigurationArgs {
    /// Default encryption with the given KMS key
    pub fn kms(key_id: impl Into<String>) -> Self {
        Self {
            rule: ServerSideEncryptionRuleArgs {
                apply_server_side_encryption_by_default: ApplyServerSideEncryptionByDefaultArgs {
                    sse_algorithm: SSE_ALGORITHM_KMS.to_string(),
                    kms_master_key_id: Some(key_id.into()),
                },
            },
        }
    }
}

/// Public access block on a bucket.
///
/// Every flag is always `true`; the only way to build one is [`deny_all`].
///
/// [`deny_all`]: BucketPublicAccessBlockArgs::deny_all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPublicAccessBlockArgs {
    bucket: String,
    block_public_acls: bool,
    block_public_policy: bool,
    ignore_public_acls: bool,
    restrict_public_buckets: bool,
}

impl BucketPublicAccessBlockArgs {
    pub fn deny_all(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn block_public_acls(&self) -> bool {
        self.block_public_acls
    }

    pub fn block_public_policy(&self) -> bool {
        self.block_public_policy
    }

    pub fn ignore_public_acls(&self) -> bool {
        self.ignore_public_acls
    }

    pub fn restrict_public_buckets(&self) -> bool {
        self.restrict_public_buckets
    }

    /// All four flags
    pub fn flags(&self) -> [bool; 4] {
        [
            self.block_public_acls,
            self.block_public_policy,
            self.ignore_public_acls,
            self.restrict_public_buckets,
        ]
    }
}

impl ResourceArgs for BucketPublicAccessBlockArgs {
    const TYPE: &'static str = "aws:s3/bucketPublicAccessBlock:BucketPublicAccessBlock";
}
