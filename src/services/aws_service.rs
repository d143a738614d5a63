use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use log::debug;
use rusoto_core::{HttpClient, RusotoError};
use rusoto_credential::ChainProvider;
use rusoto_ec2::{
    BlockDeviceMapping, CreateSecurityGroupRequest, DescribeImagesRequest,
    DescribeInstancesRequest, DescribeSecurityGroupsRequest, DescribeVpcsRequest,
    EbsBlockDevice, Ec2, Ec2Client, Filter, InstanceMetadataOptionsRequest,
    InstanceNetworkInterfaceSpecification, IpPermission, IpRange, RunInstancesRequest,
    TagSpecification, TerminateInstancesRequest,
};
use rusoto_signature::Region;

use super::compute::{ComputeApi, ComputeFactory};
use crate::error::{CloudError, CloudResult};
use crate::models::cloud_instance::{InstanceSnapshot, InstanceState, RunInstanceSpec};
use crate::models::security_group::{IngressRule, Provisioned};

const DUPLICATE_GROUP: &str = "InvalidGroup.Duplicate";
const DUPLICATE_PERMISSION: &str = "InvalidPermission.Duplicate";
const INSTANCE_NOT_FOUND: &str = "InvalidInstanceID.NotFound";

// -----------------------------------------------------------------------------
// Client
// -----------------------------------------------------------------------------

pub struct AwsCompute {
    client: Ec2Client,
}

impl AwsCompute {
    pub fn new(region: &str) -> CloudResult<Self> {
        let region =
            Region::from_str(region).map_err(|_| CloudError::InvalidRegion(region.to_string()))?;
        let dispatcher = HttpClient::new().map_err(|err| CloudError::Client(err.to_string()))?;
        let client = Ec2Client::new_with(dispatcher, ChainProvider::new(), region);

        Ok(Self { client })
    }
}

pub fn aws_compute_factory() -> ComputeFactory {
    Arc::new(|region: &str| {
        let compute: Arc<dyn ComputeApi> = Arc::new(AwsCompute::new(region)?);
        Ok(compute)
    })
}

#[async_trait]
impl ComputeApi for AwsCompute {
    async fn default_vpc_id(&self) -> CloudResult<Option<String>> {
        let request = DescribeVpcsRequest {
            filters: Some(vec![filter("isDefault", "true")]),
            ..Default::default()
        };

        let result = self
            .client
            .describe_vpcs(request)
            .await
            .map_err(|err| provider_error("DescribeVpcs", err))?;

        Ok(result
            .vpcs
            .unwrap_or_default()
            .into_iter()
            .find_map(|vpc| vpc.vpc_id))
    }

    async fn find_security_group(&self, name: &str, vpc_id: &str) -> CloudResult<Option<String>> {
        let request = DescribeSecurityGroupsRequest {
            filters: Some(vec![filter("group-name", name), filter("vpc-id", vpc_id)]),
            ..Default::default()
        };

        let result = self
            .client
            .describe_security_groups(request)
            .await
            .map_err(|err| provider_error("DescribeSecurityGroups", err))?;

        Ok(result
            .security_groups
            .unwrap_or_default()
            .into_iter()
            .find_map(|group| group.group_id))
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> CloudResult<Provisioned<String>> {
        let request = CreateSecurityGroupRequest {
            group_name: name.to_string(),
            description: description.to_string(),
            vpc_id: Some(vpc_id.to_string()),
            ..Default::default()
        };

        match self.client.create_security_group(request).await {
            Ok(result) => {
                let group_id = result.group_id.ok_or(CloudError::MissingField("GroupId"))?;
                Ok(Provisioned::Created(group_id))
            }
            Err(err) if error_code(&err).as_deref() == Some(DUPLICATE_GROUP) => {
                Ok(Provisioned::AlreadyExists)
            }
            Err(err) => Err(provider_error("CreateSecurityGroup", err)),
        }
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> CloudResult<Provisioned<()>> {
        let request = rusoto_ec2::AuthorizeSecurityGroupIngressRequest {
            group_id: Some(group_id.to_string()),
            ip_permissions: Some(vec![ip_permission(rule)]),
            ..Default::default()
        };

        match self.client.authorize_security_group_ingress(request).await {
            Ok(_) => Ok(Provisioned::Created(())),
            Err(err) if error_code(&err).as_deref() == Some(DUPLICATE_PERMISSION) => {
                Ok(Provisioned::AlreadyExists)
            }
            Err(err) => Err(provider_error("AuthorizeSecurityGroupIngress", err)),
        }
    }

    async fn image_root_snapshot(&self, image_id: &str) -> CloudResult<Option<String>> {
        let request = DescribeImagesRequest {
            image_ids: Some(vec![image_id.to_string()]),
            ..Default::default()
        };

        let result = self
            .client
            .describe_images(request)
            .await
            .map_err(|err| provider_error("DescribeImages", err))?;

        Ok(result
            .images
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|image| image.block_device_mappings)
            .and_then(|mappings| mappings.into_iter().next())
            .and_then(|mapping| mapping.ebs)
            .and_then(|ebs| ebs.snapshot_id))
    }

    async fn run_instance(&self, spec: &RunInstanceSpec) -> CloudResult<InstanceSnapshot> {
        debug!(
            "Private DNS options ({}, A={}, AAAA={}) follow the subnet defaults",
            spec.private_dns_options.hostname_type,
            spec.private_dns_options.enable_a_record,
            spec.private_dns_options.enable_aaaa_record
        );

        let reservation = self
            .client
            .run_instances(create_instance_request(spec))
            .await
            .map_err(|err| provider_error("RunInstances", err))?;

        let instance = reservation
            .instances
            .and_then(|instances| instances.into_iter().next())
            .ok_or(CloudError::MissingField("Instances"))?;

        to_snapshot(instance)
    }

    async fn describe_instance(&self, instance_id: &str) -> CloudResult<Option<InstanceSnapshot>> {
        let request = DescribeInstancesRequest {
            instance_ids: Some(vec![instance_id.to_string()]),
            ..Default::default()
        };

        let result = match self.client.describe_instances(request).await {
            Ok(result) => result,
            // Freshly launched instances can lag behind in DescribeInstances.
            Err(err) if error_code(&err).as_deref() == Some(INSTANCE_NOT_FOUND) => return Ok(None),
            Err(err) => return Err(provider_error("DescribeInstances", err)),
        };

        result
            .reservations
            .unwrap_or_default()
            .into_iter()
            .flat_map(|reservation| reservation.instances.unwrap_or_default())
            .next()
            .map(to_snapshot)
            .transpose()
    }

    async fn terminate_instance(&self, instance_id: &str) -> CloudResult<()> {
        let request = TerminateInstancesRequest {
            instance_ids: vec![instance_id.to_string()],
            ..Default::default()
        };

        let result = self
            .client
            .terminate_instances(request)
            .await
            .map_err(|err| provider_error("TerminateInstances", err))?;

        for change in result.terminating_instances.unwrap_or_default() {
            debug!(
                "Instance {} is now {}",
                change.instance_id.unwrap_or_default(),
                change
                    .current_state
                    .and_then(|state| state.name)
                    .unwrap_or_default()
            );
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Request builders
// -----------------------------------------------------------------------------

fn filter(name: &str, value: &str) -> Filter {
    Filter {
        name: Some(name.to_string()),
        values: Some(vec![value.to_string()]),
    }
}

fn ip_permission(rule: &IngressRule) -> IpPermission {
    IpPermission {
        ip_protocol: Some(rule.protocol.clone()),
        from_port: Some(i64::from(rule.from_port)),
        to_port: Some(i64::from(rule.to_port)),
        ip_ranges: Some(vec![IpRange {
            cidr_ip: Some(rule.cidr.clone()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn create_instance_request(spec: &RunInstanceSpec) -> RunInstancesRequest {
    let volume = &spec.root_volume;
    let metadata = &spec.metadata_options;

    RunInstancesRequest {
        image_id: Some(spec.image_id.clone()),
        instance_type: Some(spec.instance_type.clone()),
        min_count: 1,
        max_count: 1,
        block_device_mappings: Some(vec![BlockDeviceMapping {
            device_name: Some(volume.device_name.clone()),
            ebs: Some(EbsBlockDevice {
                delete_on_termination: Some(volume.delete_on_termination),
                encrypted: Some(volume.encrypted),
                iops: Some(i64::from(volume.iops)),
                snapshot_id: Some(volume.snapshot_id.clone()),
                volume_size: Some(i64::from(volume.size_gib)),
                volume_type: Some(volume.volume_type.clone()),
                throughput: Some(i64::from(volume.throughput)),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        network_interfaces: Some(vec![InstanceNetworkInterfaceSpecification {
            associate_public_ip_address: Some(spec.associate_public_ip),
            device_index: Some(0),
            groups: Some(vec![spec.security_group_id.clone()]),
            ..Default::default()
        }]),
        tag_specifications: Some(vec![TagSpecification {
            resource_type: Some("instance".to_string()),
            tags: Some(vec![rusoto_ec2::Tag {
                key: Some("Name".to_string()),
                value: Some(spec.name_tag.clone()),
            }]),
        }]),
        metadata_options: Some(InstanceMetadataOptionsRequest {
            http_endpoint: Some(on_off(metadata.http_endpoint_enabled).to_string()),
            http_tokens: Some(
                if metadata.http_tokens_required {
                    "required"
                } else {
                    "optional"
                }
                .to_string(),
            ),
            http_put_response_hop_limit: Some(i64::from(metadata.http_put_response_hop_limit)),
            ..Default::default()
        }),
        user_data: Some(general_purpose::STANDARD.encode(spec.user_data.as_bytes())),
        ..Default::default()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn to_snapshot(instance: rusoto_ec2::Instance) -> CloudResult<InstanceSnapshot> {
    let instance_id = instance
        .instance_id
        .ok_or(CloudError::MissingField("InstanceId"))?;
    let state_name = instance
        .state
        .and_then(|state| state.name)
        .ok_or(CloudError::MissingField("State"))?;
    let state = InstanceState::try_from(state_name.as_str())
        .map_err(|err| CloudError::provider("DescribeInstances", err))?;

    Ok(InstanceSnapshot {
        instance_id,
        instance_type: instance.instance_type.unwrap_or_default(),
        state,
        public_ip: instance.public_ip_address.filter(|ip| !ip.is_empty()),
        public_dns: instance.public_dns_name.filter(|dns| !dns.is_empty()),
    })
}

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

/// EC2 reports most failures as an XML error document rather than a typed
/// service error, so the code has to be read out of the body.
fn error_code<E>(err: &RusotoError<E>) -> Option<String> {
    match err {
        RusotoError::Unknown(response) => {
            let body = String::from_utf8_lossy(&response.body);
            xml_element(&body, "Code").map(str::to_string)
        }
        _ => None,
    }
}

fn provider_error<E: std::error::Error + 'static>(
    operation: &str,
    err: RusotoError<E>,
) -> CloudError {
    let message = match &err {
        RusotoError::Unknown(response) => {
            let body = String::from_utf8_lossy(&response.body);
            match (xml_element(&body, "Code"), xml_element(&body, "Message")) {
                (Some(code), Some(message)) => format!("{}: {}", code, message),
                (Some(code), None) => code.to_string(),
                _ => format!("HTTP {}: {}", response.status, body),
            }
        }
        _ => err.to_string(),
    };

    CloudError::provider(operation, message)
}

fn xml_element<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;

    Some(body[start..end].trim())
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
