//! The provisioning program
//!
//! Declares a KMS key and alias, an S3 bucket encrypted with that key, and a
//! public access block on the bucket, then exports the bucket name, the key
//! ARN and the alias. Any failed step stops the run.

use sealbucket_cloud::{Context, RegisteredResource, Result};
use sealbucket_cloud_aws::{
    AliasArgs, BucketArgs, BucketPublicAccessBlockArgs, KeyArgs, ResourceArgs,
    ServerSideEncryptionConfigurationArgs, VersioningArgs,
};

pub const KEY_DESCRIPTION: &str = "KMS key for S3 bucket encryption";
pub const KEY_ALIAS: &str = "alias/myS3bucketKey";

pub async fn run(ctx: &mut Context<'_>) -> Result<()> {
    let key = create_kms_key(ctx).await?;
    let bucket = create_bucket(ctx, &key).await?;
    enforce_public_access_block(ctx, &bucket).await?;

    ctx.export("bucketName", bucket.id());
    ctx.export("kmsKeyArn", key.attribute("arn"));
    ctx.export("kmsKeyAlias", KEY_ALIAS);
    Ok(())
}

async fn create_kms_key(ctx: &mut Context<'_>) -> Result<RegisteredResource> {
    let key = ctx
        .register(KeyArgs::new(KEY_DESCRIPTION).declare("bucketKey")?)
        .await?;

    let alias = AliasArgs {
        name: KEY_ALIAS.to_string(),
        target_key_id: key.id(),
    };
    ctx.register(alias.declare("myKeyAlias")?.depends_on(key.key()))
        .await?;

    Ok(key)
}

async fn create_bucket(
    ctx: &mut Context<'_>,
    key: &RegisteredResource,
) -> Result<RegisteredResource> {
    let args = BucketArgs {
        versioning: Some(VersioningArgs { enabled: true }),
        server_side_encryption_configuration: Some(ServerSideEncryptionConfigurationArgs::kms(
            key.id(),
        )),
    };

    ctx.register(args.declare("myBucket")?.depends_on(key.key()))
        .await
}

async fn enforce_public_access_block(
    ctx: &mut Context<'_>,
    bucket: &RegisteredResource,
) -> Result<()> {
    let args = BucketPublicAccessBlockArgs::deny_all(bucket.id());
    ctx.register(
        args.declare("myBucketPublicAccessBlock")?
            .depends_on(bucket.key()),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealbucket_cloud::{
        ActionType, MemoryProvider, ResourceStatus, RunMode, RunReport, StackState, UNKNOWN,
        resource_key,
    };
    use serde_json::json;

    const KEY: &str = "aws:kms/key:Key::bucketKey";
    const ALIAS: &str = "aws:kms/alias:Alias::myKeyAlias";
    const BUCKET: &str = "aws:s3/bucket:Bucket::myBucket";

    fn block_key() -> String {
        resource_key(BucketPublicAccessBlockArgs::TYPE, "myBucketPublicAccessBlock")
    }

    async fn run_with(provider: &MemoryProvider, state: StackState, mode: RunMode) -> RunReport {
        let mut ctx = Context::new(provider, state, mode);
        let outcome = run(&mut ctx).await;
        ctx.finish(outcome).await
    }

    #[tokio::test]
    async fn test_declares_four_resources_in_order() {
        let provider = MemoryProvider::new();
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;

        assert!(report.is_success());
        assert_eq!(
            report.registered,
            vec![KEY.to_string(), ALIAS.to_string(), BUCKET.to_string(), block_key()]
        );
        assert_eq!(report.outputs.len(), 3);

        let names: Vec<String> = provider.calls().into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["bucketKey", "myKeyAlias", "myBucket", "myBucketPublicAccessBlock"]
        );
    }

    #[tokio::test]
    async fn test_references_point_at_resources_of_the_same_run() {
        let provider = MemoryProvider::new();
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;
        let state = &report.state;

        let key = state.get_resource(KEY).unwrap();
        let alias = state.get_resource(ALIAS).unwrap();
        let bucket = state.get_resource(BUCKET).unwrap();
        let block = state.get_resource(&block_key()).unwrap();

        let alias_args: AliasArgs = serde_json::from_value(alias.inputs.clone()).unwrap();
        assert_eq!(alias_args.target_key_id, key.id);
        assert_eq!(alias_args.name, KEY_ALIAS);

        let bucket_args: BucketArgs = serde_json::from_value(bucket.inputs.clone()).unwrap();
        let sse = bucket_args.server_side_encryption_configuration.unwrap();
        let default = sse.rule.apply_server_side_encryption_by_default;
        assert_eq!(default.sse_algorithm, "aws:kms");
        assert_eq!(default.kms_master_key_id.as_deref(), Some(key.id.as_str()));
        assert_eq!(bucket_args.versioning, Some(VersioningArgs { enabled: true }));

        let block_args: BucketPublicAccessBlockArgs =
            serde_json::from_value(block.inputs.clone()).unwrap();
        assert_eq!(block_args.bucket(), bucket.id);
        assert_eq!(block_args.flags(), [true; 4]);

        assert_eq!(alias.dependencies, vec![KEY.to_string()]);
        assert_eq!(bucket.dependencies, vec![KEY.to_string()]);
        assert_eq!(block.dependencies, vec![BUCKET.to_string()]);
    }

    #[tokio::test]
    async fn test_exports() {
        let provider = MemoryProvider::new();
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;

        let key = report.state.get_resource(KEY).unwrap();
        let bucket = report.state.get_resource(BUCKET).unwrap();

        assert_eq!(report.outputs["bucketName"], json!(bucket.id));
        assert_eq!(report.outputs["kmsKeyArn"], key.attributes["arn"]);
        assert_eq!(report.outputs["kmsKeyAlias"], json!("alias/myS3bucketKey"));
        assert_eq!(report.state.outputs, report.outputs);
    }

    #[tokio::test]
    async fn test_key_failure_stops_everything() {
        let provider = MemoryProvider::new().fail_on("bucketKey");
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;

        assert!(!report.is_success());
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(report.registered, vec![KEY.to_string()]);
        assert!(report.outputs.is_empty());
        assert!(report.state.resources.is_empty());
        assert!(report.state.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_alias_failure_keeps_key_for_next_run() {
        let provider = MemoryProvider::new().fail_on("myKeyAlias");
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;

        assert!(!report.is_success());
        assert_eq!(provider.calls().len(), 2);
        assert!(report.state.get_resource(KEY).is_some());
        assert!(report.outputs.is_empty());

        // The next run picks up the recorded key instead of creating another
        provider.heal("myKeyAlias");
        let retry = run_with(&provider, report.state, RunMode::Update).await;
        assert!(retry.is_success());
        assert_eq!(retry.plan.actions[0].action_type, ActionType::NoOp);
        assert_eq!(retry.plan.summary().create, 3);
    }

    #[tokio::test]
    async fn test_bucket_failure_skips_access_block() {
        let provider = MemoryProvider::new().fail_on("myBucket");
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;

        assert!(!report.is_success());
        let names: Vec<String> = provider.calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["bucketKey", "myKeyAlias", "myBucket"]);
        assert!(report.outputs.is_empty());
        assert!(report.state.get_resource(&block_key()).is_none());
    }

    #[tokio::test]
    async fn test_half_configured_bucket_is_reused_on_retry() {
        let provider = MemoryProvider::new().fail_after_create("myBucket");
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;

        assert!(!report.is_success());
        assert!(report.outputs.is_empty());
        assert!(report.state.get_resource(&block_key()).is_none());
        let bucket = report.state.get_resource(BUCKET).unwrap();
        assert_eq!(bucket.status, ResourceStatus::Error);
        let bucket_id = bucket.id.clone();

        provider.heal("myBucket");
        let retry = run_with(&provider, report.state, RunMode::Update).await;
        assert!(retry.is_success());
        let summary = retry.plan.summary();
        assert_eq!((summary.create, summary.update, summary.no_change), (1, 1, 2));
        assert_eq!(retry.outputs["bucketName"], json!(bucket_id));
    }

    #[tokio::test]
    async fn test_access_block_failure_is_not_ignored() {
        let provider = MemoryProvider::new().fail_on("myBucketPublicAccessBlock");
        let report = run_with(&provider, StackState::new("test"), RunMode::Update).await;

        assert!(!report.is_success());
        assert!(report.outputs.is_empty());
        assert_eq!(report.state.resources.len(), 3);
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let provider = MemoryProvider::new();
        let first = run_with(&provider, StackState::new("test"), RunMode::Update).await;
        let second = run_with(&provider, first.state.clone(), RunMode::Update).await;

        assert!(second.is_success());
        assert!(!second.plan.has_changes());
        assert_eq!(second.plan.summary().no_change, 4);
        assert_eq!(provider.calls().len(), 4);
        assert_eq!(second.outputs, first.outputs);
    }

    #[tokio::test]
    async fn test_preview_of_empty_stack() {
        let provider = MemoryProvider::new();
        let report = run_with(&provider, StackState::new("test"), RunMode::Preview).await;

        assert!(report.is_success());
        assert!(provider.calls().is_empty());
        assert_eq!(report.plan.summary().create, 4);
        assert_eq!(report.outputs["bucketName"], json!(UNKNOWN));
        assert_eq!(report.outputs["kmsKeyArn"], json!(UNKNOWN));
        assert_eq!(report.outputs["kmsKeyAlias"], json!(KEY_ALIAS));
    }

    #[tokio::test]
    async fn test_preview_after_update_shows_no_changes() {
        let provider = MemoryProvider::new();
        let first = run_with(&provider, StackState::new("test"), RunMode::Update).await;
        let preview = run_with(&provider, first.state, RunMode::Preview).await;

        assert!(!preview.plan.has_changes());
        assert_eq!(preview.outputs, first.outputs);
        assert_eq!(provider.calls().len(), 4);
    }
}
