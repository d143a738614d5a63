use log::debug;

use super::compute::ComputeApi;
use crate::error::{CloudError, CloudResult};
use crate::models::security_group::{service_ingress_rules, Provisioned};

/// Returns the id of the group named `name` in the default VPC, creating the
/// group when it does not exist yet.
pub async fn resolve_security_group(
    api: &dyn ComputeApi,
    name: &str,
    description: &str,
) -> CloudResult<String> {
    let vpc_id = api.default_vpc_id().await?.ok_or(CloudError::NoDefaultVpc)?;

    if let Some(group_id) = api.find_security_group(name, &vpc_id).await? {
        debug!("Reusing security group {} ({})", name, group_id);
        return Ok(group_id);
    }

    match api.create_security_group(name, description, &vpc_id).await? {
        Provisioned::Created(group_id) => Ok(group_id),
        // Lost a race with another launch between lookup and create.
        Provisioned::AlreadyExists => api
            .find_security_group(name, &vpc_id)
            .await?
            .ok_or(CloudError::MissingField("SecurityGroups")),
    }
}

/// Opens SSH, HTTPS and `api_port` to the world. Rules that are already
/// present are left alone.
pub async fn add_security_group_rules(
    api: &dyn ComputeApi,
    group_id: &str,
    api_port: u16,
) -> CloudResult<()> {
    for rule in service_ingress_rules(api_port) {
        match api.authorize_ingress(group_id, &rule).await? {
            Provisioned::Created(()) => debug!("Authorized tcp/{} on {}", rule.from_port, group_id),
            Provisioned::AlreadyExists => {
                debug!("Rule tcp/{} already present on {}", rule.from_port, group_id)
            }
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
