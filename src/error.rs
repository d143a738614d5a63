use thiserror::Error;

use crate::models::machine_image::Architecture;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// The result of a provisioning operation.
pub type CloudResult<T> = Result<T, CloudError>;

/// An error raised while provisioning or tearing down an instance.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The region has no default VPC to place the security group in.
    #[error("no default VPC found in this region")]
    NoDefaultVpc,

    /// The image table has no row for the region and architecture.
    #[error("no AMI found for region {region} and architecture {arch}")]
    ImageNotFound { region: String, arch: Architecture },

    /// The AMI exists but has no root snapshot to clone.
    #[error("no image found with ID {0}")]
    ImageSnapshotNotFound(String),

    /// The instance type is not of the form `<family>.<size>`.
    #[error("invalid instance type: {0}")]
    InvalidInstanceType(String),

    /// The region name is unknown to the SDK.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// The container image is not a plain `name[:tag][@digest]` reference.
    #[error("invalid docker image reference: {0:?}")]
    InvalidDockerImage(String),

    /// The startup script template failed to parse or render.
    #[error("startup script template error: {0}")]
    Template(String),

    /// The startup script template could not be read.
    #[error("could not read startup script template {path}: {source}")]
    TemplateIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The machine image table could not be loaded.
    #[error("could not load machine image table: {0}")]
    ImageTable(String),

    /// The provider rejected a call.
    #[error("{operation} failed: {message}")]
    Provider { operation: String, message: String },

    /// The provider answered without a field we depend on.
    #[error("provider response is missing {0}")]
    MissingField(&'static str),

    /// The instance left the launch path before reaching `running`.
    #[error("instance {instance_id} entered state {state} while waiting for running")]
    InstanceNotRunning { instance_id: String, state: String },

    /// The instance did not reach `running` within the polling budget.
    #[error("instance {instance_id} was not running after {attempts} checks")]
    WaitTimeout { instance_id: String, attempts: u32 },

    /// A step after RunInstances failed; the instance is still in the account.
    #[error("instance {instance_id} in {region} was launched but not completed: {source}")]
    LaunchIncomplete {
        instance_id: String,
        region: String,
        #[source]
        source: Box<CloudError>,
    },

    /// The SDK client could not be built.
    #[error("could not create EC2 client: {0}")]
    Client(String),
}

impl CloudError {
    pub fn provider(operation: &str, message: impl Into<String>) -> Self {
        CloudError::Provider {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}
