//! AWS provider error types

use sealbucket_cloud::{CloudError, ResourceState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },

    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResource(String),

    #[error("{} was created but is not fully configured: {source}", resource.id)]
    Incomplete {
        resource: Box<ResourceState>,
        source: Box<AwsError>,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl AwsError {
    /// Attach the resource that already exists to a configuration failure
    pub fn incomplete(self, resource: ResourceState) -> Self {
        Self::Incomplete {
            resource: Box::new(resource),
            source: Box::new(self),
        }
    }

    /// Wrap an SDK error, keeping the full service message
    pub fn sdk<E>(operation: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Api {
            operation: operation.into(),
            message: aws_sdk_s3::error::DisplayErrorContext(err).to_string(),
        }
    }
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Cloud(e) => e,
            AwsError::Incomplete { resource, source } => CloudError::Incomplete {
                resource,
                source: Box::new(CloudError::from(*source)),
            },
            AwsError::InvalidArgs(msg) => CloudError::InvalidConfig(msg),
            AwsError::UnsupportedResource(t) => CloudError::UnsupportedResource(t),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_cloud_error() {
        let api = AwsError::Api {
            operation: "CreateKey".to_string(),
            message: "AccessDeniedException".to_string(),
        };
        match CloudError::from(api) {
            CloudError::ApiError(msg) => {
                assert_eq!(msg, "CreateKey failed: AccessDeniedException")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let unsupported = AwsError::UnsupportedResource("aws:ec2/vpc:Vpc".to_string());
        assert!(matches!(
            CloudError::from(unsupported),
            CloudError::UnsupportedResource(_)
        ));

        let partial = AwsError::Api {
            operation: "PutBucketVersioning".to_string(),
            message: "InternalError".to_string(),
        }
        .incomplete(ResourceState::new("mybucket-1a2b3c4", "aws:s3/bucket:Bucket"));
        match CloudError::from(partial) {
            CloudError::Incomplete { resource, source } => {
                assert_eq!(resource.id, "mybucket-1a2b3c4");
                assert!(matches!(*source, CloudError::ApiError(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let wrapped = AwsError::from(CloudError::InvalidConfig("bad".to_string()));
        assert!(matches!(CloudError::from(wrapped), CloudError::InvalidConfig(_)));
    }
}
