//! AWS provider implementation

use crate::error::{AwsError, Result};
use crate::resources::{
    AliasArgs, BucketArgs, BucketPublicAccessBlockArgs, KeyArgs, ResourceArgs,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    PublicAccessBlockConfiguration, ServerSideEncryption, ServerSideEncryptionByDefault,
    ServerSideEncryptionConfiguration, ServerSideEncryptionRule, VersioningConfiguration,
};
use sealbucket_cloud::{
    AuthStatus, CloudProvider, ResourceConfig, ResourceState, ResourceStatus,
};
use serde::de::DeserializeOwned;
use serde_json::json;

/// Region where `CreateBucket` must not carry a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// Length of the random suffix appended to auto-named buckets
const BUCKET_SUFFIX_LEN: usize = 7;

/// Physical bucket name for a logical name: lowercase plus a random suffix
pub fn autoname_bucket(name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", name.to_lowercase(), &suffix[..BUCKET_SUFFIX_LEN])
}

/// AWS provider backed by the KMS, S3 and STS SDK clients
pub struct AwsProvider {
    kms: aws_sdk_kms::Client,
    s3: aws_sdk_s3::Client,
    sts: aws_sdk_sts::Client,
    region: String,
}

impl AwsProvider {
    /// Load credentials and region from the default AWS chain
    pub async fn from_env(region: Option<String>, profile: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        Self::from_sdk_config(&config)
    }

    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        tracing::debug!("AWS provider using region {}", region);

        Self {
            kms: aws_sdk_kms::Client::new(config),
            s3: aws_sdk_s3::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            region,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // ========== KMS Key ==========

    async fn create_key(&self, args: &KeyArgs) -> Result<ResourceState> {
        tracing::info!("Creating KMS key");
        let output = self
            .kms
            .create_key()
            .description(&args.description)
            .send()
            .await
            .map_err(|e| AwsError::sdk("CreateKey", e))?;

        let metadata = output.key_metadata().ok_or(AwsError::MissingField {
            operation: "CreateKey",
            field: "KeyMetadata",
        })?;
        let key_id = metadata.key_id().to_string();
        let arn = metadata.arn().ok_or(AwsError::MissingField {
            operation: "CreateKey",
            field: "Arn",
        })?;

        tracing::debug!("Created KMS key {}", key_id);
        Ok(ResourceState::new(&key_id, KeyArgs::TYPE)
            .with_status(ResourceStatus::Ready)
            .with_attribute("arn", json!(arn))
            .with_attribute("key_id", json!(key_id)))
    }

    async fn update_key(&self, args: &KeyArgs, current: &ResourceState) -> Result<ResourceState> {
        let previous: KeyArgs = stored_args(current)?;
        if previous.description != args.description {
            tracing::info!("Updating description of KMS key {}", current.id);
            self.kms
                .update_key_description()
                .key_id(&current.id)
                .description(&args.description)
                .send()
                .await
                .map_err(|e| AwsError::sdk("UpdateKeyDescription", e))?;
        }
        Ok(current.clone())
    }

    async fn delete_key(&self, current: &ResourceState) -> Result<()> {
        let args: KeyArgs = stored_args(current)?;
        tracing::info!(
            "Scheduling deletion of KMS key {} in {} days",
            current.id,
            args.deletion_window_in_days
        );
        self.kms
            .schedule_key_deletion()
            .key_id(&current.id)
            .pending_window_in_days(args.deletion_window_in_days)
            .send()
            .await
            .map_err(|e| AwsError::sdk("ScheduleKeyDeletion", e))?;
        Ok(())
    }

    // ========== KMS Alias ==========

    async fn create_alias(&self, args: &AliasArgs) -> Result<ResourceState> {
        if !args.name.starts_with("alias/") {
            return Err(AwsError::InvalidArgs(format!(
                "alias name '{}' must start with 'alias/'",
                args.name
            )));
        }

        tracing::info!("Creating KMS alias {}", args.name);
        self.kms
            .create_alias()
            .alias_name(&args.name)
            .target_key_id(&args.target_key_id)
            .send()
            .await
            .map_err(|e| AwsError::sdk("CreateAlias", e))?;

        Ok(ResourceState::new(&args.name, AliasArgs::TYPE)
            .with_status(ResourceStatus::Ready)
            .with_attribute("name", json!(args.name))
            .with_attribute("target_key_id", json!(args.target_key_id)))
    }

    async fn update_alias(
        &self,
        args: &AliasArgs,
        current: &ResourceState,
    ) -> Result<ResourceState> {
        // Alias names cannot be changed in place. A retry after a failed
        // create finds the old alias already gone.
        if current.id != args.name {
            self.delete_alias(current).await?;
            return self.create_alias(args).await;
        }

        tracing::info!("Retargeting KMS alias {} to {}", args.name, args.target_key_id);
        self.kms
            .update_alias()
            .alias_name(&args.name)
            .target_key_id(&args.target_key_id)
            .send()
            .await
            .map_err(|e| AwsError::sdk("UpdateAlias", e))?;

        let mut state = current.clone();
        state.set_attribute("target_key_id", json!(args.target_key_id));
        Ok(state)
    }

    async fn delete_alias(&self, current: &ResourceState) -> Result<()> {
        tracing::info!("Deleting KMS alias {}", current.id);
        match self.kms.delete_alias().alias_name(&current.id).send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|err| err.is_not_found_exception()) =>
            {
                tracing::debug!("KMS alias {} is already gone", current.id);
                Ok(())
            }
            Err(e) => Err(AwsError::sdk("DeleteAlias", e)),
        }
    }

    // ========== S3 Bucket ==========

    async fn create_bucket(&self, name: &str, args: &BucketArgs) -> Result<ResourceState> {
        let bucket = autoname_bucket(name);
        tracing::info!("Creating S3 bucket {}", bucket);

        let mut request = self.s3.create_bucket().bucket(&bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| AwsError::sdk("CreateBucket", e))?;

        let state = ResourceState::new(&bucket, BucketArgs::TYPE)
            .with_status(ResourceStatus::Ready)
            .with_attribute("bucket", json!(bucket))
            .with_attribute("arn", json!(format!("arn:aws:s3:::{}", bucket)))
            .with_attribute("region", json!(self.region));

        // The bucket exists from here on and must end up in state either way
        match self.apply_bucket_settings(&bucket, args).await {
            Ok(()) => Ok(state),
            Err(e) => Err(e.incomplete(state)),
        }
    }

    async fn apply_bucket_settings(&self, bucket: &str, args: &BucketArgs) -> Result<()> {
        if let Some(versioning) = &args.versioning {
            let status = if versioning.enabled {
                BucketVersioningStatus::Enabled
            } else {
                BucketVersioningStatus::Suspended
            };
            tracing::debug!("Setting versioning of {} to {:?}", bucket, status);
            self.s3
                .put_bucket_versioning()
                .bucket(bucket)
                .versioning_configuration(VersioningConfiguration::builder().status(status).build())
                .send()
                .await
                .map_err(|e| AwsError::sdk("PutBucketVersioning", e))?;
        }

        match &args.server_side_encryption_configuration {
            Some(sse) => {
                let default = &sse.rule.apply_server_side_encryption_by_default;
                let by_default = ServerSideEncryptionByDefault::builder()
                    .sse_algorithm(ServerSideEncryption::from(default.sse_algorithm.as_str()))
                    .set_kms_master_key_id(default.kms_master_key_id.clone())
                    .build()
                    .map_err(|e| AwsError::InvalidArgs(e.to_string()))?;
                let configuration = ServerSideEncryptionConfiguration::builder()
                    .rules(
                        ServerSideEncryptionRule::builder()
                            .apply_server_side_encryption_by_default(by_default)
                            .build(),
                    )
                    .build()
                    .map_err(|e| AwsError::InvalidArgs(e.to_string()))?;

                tracing::debug!(
                    "Setting default encryption of {} to {}",
                    bucket,
                    default.sse_algorithm
                );
                self.s3
                    .put_bucket_encryption()
                    .bucket(bucket)
                    .server_side_encryption_configuration(configuration)
                    .send()
                    .await
                    .map_err(|e| AwsError::sdk("PutBucketEncryption", e))?;
            }
            None => {
                self.s3
                    .delete_bucket_encryption()
                    .bucket(bucket)
                    .send()
                    .await
                    .map_err(|e| AwsError::sdk("DeleteBucketEncryption", e))?;
            }
        }

        Ok(())
    }

    async fn delete_bucket(&self, current: &ResourceState) -> Result<()> {
        tracing::info!("Deleting S3 bucket {}", current.id);
        self.s3
            .delete_bucket()
            .bucket(&current.id)
            .send()
            .await
            .map_err(|e| AwsError::sdk("DeleteBucket", e))?;
        Ok(())
    }

    // ========== Public Access Block ==========

    async fn put_public_access_block(
        &self,
        args: &BucketPublicAccessBlockArgs,
    ) -> Result<ResourceState> {
        tracing::info!("Blocking public access to {}", args.bucket());
        let configuration = PublicAccessBlockConfiguration::builder()
            .block_public_acls(args.block_public_acls())
            .block_public_policy(args.block_public_policy())
            .ignore_public_acls(args.ignore_public_acls())
            .restrict_public_buckets(args.restrict_public_buckets())
            .build();

        self.s3
            .put_public_access_block()
            .bucket(args.bucket())
            .public_access_block_configuration(configuration)
            .send()
            .await
            .map_err(|e| AwsError::sdk("PutPublicAccessBlock", e))?;

        Ok(
            ResourceState::new(args.bucket(), BucketPublicAccessBlockArgs::TYPE)
                .with_status(ResourceStatus::Ready)
                .with_attribute("bucket", json!(args.bucket())),
        )
    }

    async fn delete_public_access_block(&self, current: &ResourceState) -> Result<()> {
        tracing::info!("Removing public access block from {}", current.id);
        self.s3
            .delete_public_access_block()
            .bucket(&current.id)
            .send()
            .await
            .map_err(|e| AwsError::sdk("DeletePublicAccessBlock", e))?;
        Ok(())
    }

    // ========== Dispatch ==========

    async fn create_resource(&self, resource: &ResourceConfig) -> Result<ResourceState> {
        match resource.resource_type.as_str() {
            KeyArgs::TYPE => self.create_key(&resource.args()?).await,
            AliasArgs::TYPE => self.create_alias(&resource.args()?).await,
            BucketArgs::TYPE => self.create_bucket(&resource.name, &resource.args()?).await,
            BucketPublicAccessBlockArgs::TYPE => {
                self.put_public_access_block(&resource.args()?).await
            }
            other => Err(AwsError::UnsupportedResource(other.to_string())),
        }
    }

    async fn update_resource(
        &self,
        resource: &ResourceConfig,
        current: &ResourceState,
    ) -> Result<ResourceState> {
        match resource.resource_type.as_str() {
            KeyArgs::TYPE => self.update_key(&resource.args()?, current).await,
            AliasArgs::TYPE => self.update_alias(&resource.args()?, current).await,
            BucketArgs::TYPE => {
                self.apply_bucket_settings(&current.id, &resource.args()?)
                    .await?;
                Ok(current.clone())
            }
            BucketPublicAccessBlockArgs::TYPE => {
                let args: BucketPublicAccessBlockArgs = resource.args()?;
                if current.id != args.bucket() {
                    self.delete_public_access_block(current).await?;
                }
                self.put_public_access_block(&args).await
            }
            other => Err(AwsError::UnsupportedResource(other.to_string())),
        }
    }

    async fn delete_resource(&self, current: &ResourceState) -> Result<()> {
        match current.resource_type.as_str() {
            KeyArgs::TYPE => self.delete_key(current).await,
            AliasArgs::TYPE => self.delete_alias(current).await,
            BucketArgs::TYPE => self.delete_bucket(current).await,
            BucketPublicAccessBlockArgs::TYPE => self.delete_public_access_block(current).await,
            other => Err(AwsError::UnsupportedResource(other.to_string())),
        }
    }
}

/// Decode the inputs a resource was last reconciled with
fn stored_args<T: DeserializeOwned>(state: &ResourceState) -> Result<T> {
    serde_json::from_value(state.inputs.clone()).map_err(|e| {
        AwsError::InvalidArgs(format!("stored inputs of {}: {}", state.id, e))
    })
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn display_name(&self) -> &str {
        "Amazon Web Services"
    }

    async fn check_auth(&self) -> sealbucket_cloud::Result<AuthStatus> {
        match self.sts.get_caller_identity().send().await {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "{} (account {}, {})",
                identity.arn().unwrap_or("unknown"),
                identity.account().unwrap_or("unknown"),
                self.region
            ))),
            Err(e) => Ok(AuthStatus::failed(
                AwsError::sdk("GetCallerIdentity", e).to_string(),
            )),
        }
    }

    async fn create(&self, resource: &ResourceConfig) -> sealbucket_cloud::Result<ResourceState> {
        Ok(self.create_resource(resource).await?)
    }

    async fn update(
        &self,
        resource: &ResourceConfig,
        current: &ResourceState,
    ) -> sealbucket_cloud::Result<ResourceState> {
        Ok(self.update_resource(resource, current).await?)
    }

    async fn delete(&self, resource: &ResourceState) -> sealbucket_cloud::Result<()> {
        Ok(self.delete_resource(resource).await?)
    }
}
