use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CloudResult;
use crate::models::cloud_instance::{InstanceSnapshot, RunInstanceSpec};
use crate::models::security_group::{IngressRule, Provisioned};

/// The slice of the EC2 API the launcher drives.
///
/// Calls that can collide with existing resources report the collision as
/// [`Provisioned::AlreadyExists`] instead of an error; every other provider
/// failure is an `Err`.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Id of the account's default VPC in this region, if there is one.
    async fn default_vpc_id(&self) -> CloudResult<Option<String>>;

    async fn find_security_group(&self, name: &str, vpc_id: &str) -> CloudResult<Option<String>>;

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> CloudResult<Provisioned<String>>;

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> CloudResult<Provisioned<()>>;

    /// Snapshot backing the image's first block device mapping.
    async fn image_root_snapshot(&self, image_id: &str) -> CloudResult<Option<String>>;

    async fn run_instance(&self, spec: &RunInstanceSpec) -> CloudResult<InstanceSnapshot>;

    async fn describe_instance(&self, instance_id: &str) -> CloudResult<Option<InstanceSnapshot>>;

    async fn terminate_instance(&self, instance_id: &str) -> CloudResult<()>;
}

/// Builds a region-scoped client.
pub type ComputeFactory = Arc<dyn Fn(&str) -> CloudResult<Arc<dyn ComputeApi>> + Send + Sync>;
