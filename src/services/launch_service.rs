use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::time::sleep;

use super::compute::{ComputeApi, ComputeFactory};
use super::network_service::{add_security_group_rules, resolve_security_group};
use super::startup_script::render_startup_script;
use crate::error::{CloudError, CloudResult};
use crate::models::cloud_instance::{
    api_url, validate_docker_image, CloudInstance, InstanceHandle, InstanceSnapshot, InstanceState, LaunchCloudInstance,
    MetadataOptions, PrivateDnsOptions, RootVolume, RunInstanceSpec,
};
use crate::models::machine_image::{ImageCatalog, MachineImage};

// -----------------------------------------------------------------------------
// Models
// -----------------------------------------------------------------------------

/// How long to poll for `running`. The defaults match EC2's own
/// `instance_running` waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            delay: Duration::from_secs(15),
            max_attempts: 40,
        }
    }
}

/// Launches and tears down service instances in any region.
#[derive(Clone)]
pub struct Provisioner {
    factory: ComputeFactory,
    catalog: ImageCatalog,
    wait: WaitPolicy,
}

impl Provisioner {
    pub fn new(factory: ComputeFactory, catalog: ImageCatalog, wait: WaitPolicy) -> Self {
        Self {
            factory,
            catalog,
            wait,
        }
    }

    pub async fn launch(&self, launch: &LaunchCloudInstance) -> CloudResult<CloudInstance> {
        let api = (self.factory)(&launch.region)?;
        launch_grobid_api_instance(api.as_ref(), &self.catalog, launch, self.wait).await
    }

    pub async fn terminate(&self, instance_id: &str, region: &str) -> CloudResult<()> {
        let api = (self.factory)(region)?;
        terminate_instance(api.as_ref(), instance_id).await
    }

    pub fn select_image(&self, region: &str, instance_type: &str) -> CloudResult<&MachineImage> {
        self.catalog.select(region, instance_type)
    }
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// Submits the RunInstances call for `launch` inside `security_group_id`.
pub async fn launch_instance(
    api: &dyn ComputeApi,
    catalog: &ImageCatalog,
    launch: &LaunchCloudInstance,
    security_group_id: &str,
) -> CloudResult<InstanceSnapshot> {
    let user_data = render_startup_script(
        launch.startup_script_template_path.as_deref(),
        &launch.docker_image,
        launch.api_port,
    )?;

    let image = catalog.select(&launch.region, &launch.instance_type)?;
    debug!(
        "Selected {} ({}) for {} in {}",
        image.ami_id, image.arch, launch.instance_type, launch.region
    );

    let snapshot_id = api
        .image_root_snapshot(&image.ami_id)
        .await?
        .ok_or_else(|| CloudError::ImageSnapshotNotFound(image.ami_id.clone()))?;

    let spec = RunInstanceSpec {
        image_id: image.ami_id.clone(),
        instance_type: launch.instance_type.clone(),
        root_volume: RootVolume::gp3(&snapshot_id, launch.storage_size),
        security_group_id: security_group_id.to_string(),
        associate_public_ip: true,
        name_tag: launch.instance_name.clone(),
        metadata_options: MetadataOptions::hardened(),
        private_dns_options: PrivateDnsOptions::default(),
        user_data,
    };

    api.run_instance(&spec).await
}

/// Polls until the instance is `running`. Fails early if it heads for
/// shutdown instead.
pub async fn wait_until_running(
    api: &dyn ComputeApi,
    instance_id: &str,
    policy: WaitPolicy,
) -> CloudResult<InstanceSnapshot> {
    for attempt in 1..=policy.max_attempts {
        if let Some(instance) = api.describe_instance(instance_id).await? {
            match instance.state {
                InstanceState::Running => return Ok(instance),
                state if state.is_dead_end() => {
                    return Err(CloudError::InstanceNotRunning {
                        instance_id: instance_id.to_string(),
                        state: state.as_str().to_string(),
                    })
                }
                _ => {}
            }
        }

        if attempt < policy.max_attempts {
            sleep(policy.delay).await;
        }
    }

    Err(CloudError::WaitTimeout {
        instance_id: instance_id.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Security group, ingress rules, launch, wait, and the final details.
///
/// Nothing is rolled back on failure: a group or instance created before the
/// failing step stays in the account and is named in a warning. Failures after
/// RunInstances come back as `LaunchIncomplete` carrying the instance id.
pub async fn launch_grobid_api_instance(
    api: &dyn ComputeApi,
    catalog: &ImageCatalog,
    launch: &LaunchCloudInstance,
    wait: WaitPolicy,
) -> CloudResult<CloudInstance> {
    validate_docker_image(&launch.docker_image)?;

    debug!("Creating security group...");
    let security_group_id = resolve_security_group(
        api,
        &launch.security_group_name,
        &launch.security_group_description,
    )
    .await?;
    debug!("Created security group: {}", security_group_id);

    debug!("Adding security group rules...");
    add_security_group_rules(api, &security_group_id, launch.api_port).await?;

    debug!("Launching EC2 instance...");
    let instance = match launch_instance(api, catalog, launch, &security_group_id).await {
        Ok(instance) => instance,
        Err(err) => {
            warn!(
                "Launch in {} failed before an instance was created ({}); security group {} was left in place",
                launch.region, err, security_group_id
            );
            return Err(err);
        }
    };
    debug!("Instance {} is now launching", instance.instance_id);

    complete_launch(api, launch, &instance.instance_id, wait)
        .await
        .map_err(|err| {
            warn!(
                "Instance {} in {} was left in place for manual cleanup: {}",
                instance.instance_id, launch.region, err
            );
            CloudError::LaunchIncomplete {
                instance_id: instance.instance_id.clone(),
                region: launch.region.clone(),
                source: Box::new(err),
            }
        })
}

/// Waits for `running`, then reads back the addresses the instance was given.
async fn complete_launch(
    api: &dyn ComputeApi,
    launch: &LaunchCloudInstance,
    instance_id: &str,
    wait: WaitPolicy,
) -> CloudResult<CloudInstance> {
    debug!("Waiting for instance to be running...");
    wait_until_running(api, instance_id, wait).await?;

    let instance = api
        .describe_instance(instance_id)
        .await?
        .ok_or(CloudError::MissingField("Reservations"))?;
    let public_ip = instance
        .public_ip
        .ok_or(CloudError::MissingField("PublicIpAddress"))?;
    let public_dns = instance.public_dns.unwrap_or_default();
    let api_url = api_url(&public_ip, launch.api_port);

    debug!("Instance {} is now running", instance.instance_id);
    debug!("Public IP address: {}", public_ip);
    debug!("Public DNS: {}", public_dns);
    info!("Access your API at: {}", api_url);

    let instance_type = if instance.instance_type.is_empty() {
        launch.instance_type.clone()
    } else {
        instance.instance_type
    };

    Ok(CloudInstance {
        handle: InstanceHandle {
            instance_id: instance.instance_id.clone(),
            region: launch.region.clone(),
        },
        instance_id: instance.instance_id,
        instance_type,
        public_ip,
        public_dns,
        api_url,
        launched_at: Utc::now(),
    })
}

pub async fn terminate_instance(api: &dyn ComputeApi, instance_id: &str) -> CloudResult<()> {
    debug!("Terminating instance {}...", instance_id);
    api.terminate_instance(instance_id).await
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
