use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CloudError, CloudResult};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_INSTANCE_TYPE: &str = "m6a.4xlarge";
pub const DEFAULT_STORAGE_SIZE: u32 = 28;
pub const DEFAULT_INSTANCE_NAME: &str = "grobid-software-mentions-api-server";
pub const DEFAULT_DOCKER_IMAGE: &str = "grobid/software-mentions:0.8.1";
pub const DEFAULT_API_PORT: u16 = 8060;
pub const DEFAULT_SECURITY_GROUP_NAME: &str = "grobid-software-mentions-api-server-sg";
pub const DEFAULT_SECURITY_GROUP_DESCRIPTION: &str =
    "Security group for GROBID Software Mentions API server";

// -----------------------------------------------------------------------------
// Launch request
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LaunchCloudInstance {
    pub region: String,
    pub instance_type: String,
    /// Root volume size in GiB.
    pub storage_size: u32,
    pub instance_name: String,
    pub docker_image: String,
    pub api_port: u16,
    pub security_group_name: String,
    pub security_group_description: String,
    /// Falls back to the bundled startup script when unset. Only library
    /// callers may set it; request bodies cannot.
    #[serde(skip)]
    pub startup_script_template_path: Option<PathBuf>,
}

impl Default for LaunchCloudInstance {
    fn default() -> Self {
        LaunchCloudInstance {
            region: DEFAULT_REGION.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            storage_size: DEFAULT_STORAGE_SIZE,
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            docker_image: DEFAULT_DOCKER_IMAGE.to_string(),
            api_port: DEFAULT_API_PORT,
            security_group_name: DEFAULT_SECURITY_GROUP_NAME.to_string(),
            security_group_description: DEFAULT_SECURITY_GROUP_DESCRIPTION.to_string(),
            startup_script_template_path: None,
        }
    }
}

/// Accepts `name[:tag][@digest]` references made of registry-safe characters.
/// The image is spliced into a shell script, so anything else is refused.
pub fn validate_docker_image(image: &str) -> CloudResult<()> {
    let plain = !image.is_empty()
        && !image.starts_with('-')
        && image
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | ':' | '@'));
    if plain {
        Ok(())
    } else {
        Err(CloudError::InvalidDockerImage(image.to_string()))
    }
}

// -----------------------------------------------------------------------------
// Launch result
// -----------------------------------------------------------------------------

/// What is needed to tear the instance down later.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    pub instance_id: String,
    pub region: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CloudInstance {
    pub instance_id: String,
    pub instance_type: String,
    pub public_ip: String,
    pub public_dns: String,
    pub api_url: String,
    pub handle: InstanceHandle,
    pub launched_at: DateTime<Utc>,
}

pub fn api_url(public_ip: &str, api_port: u16) -> String {
    format!("http://{}:{}", public_ip, api_port)
}

// -----------------------------------------------------------------------------
// Provider-facing shapes
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        }
    }

    /// States from which a fresh launch never reaches `running`.
    pub fn is_dead_end(&self) -> bool {
        !matches!(self, InstanceState::Pending | InstanceState::Running)
    }
}

impl TryFrom<&str> for InstanceState {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(InstanceState::Pending),
            "running" => Ok(InstanceState::Running),
            "shutting-down" => Ok(InstanceState::ShuttingDown),
            "terminated" => Ok(InstanceState::Terminated),
            "stopping" => Ok(InstanceState::Stopping),
            "stopped" => Ok(InstanceState::Stopped),
            _ => Err(format!("Invalid InstanceState: {}", value)),
        }
    }
}

/// Provider view of an instance at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSnapshot {
    pub instance_id: String,
    pub instance_type: String,
    pub state: InstanceState,
    pub public_ip: Option<String>,
    pub public_dns: Option<String>,
}

pub const ROOT_DEVICE_NAME: &str = "/dev/sda1";
pub const ROOT_VOLUME_TYPE: &str = "gp3";
pub const ROOT_VOLUME_IOPS: u32 = 3000;
pub const ROOT_VOLUME_THROUGHPUT: u32 = 125;

#[derive(Debug, Clone, PartialEq)]
pub struct RootVolume {
    pub device_name: String,
    pub snapshot_id: String,
    pub size_gib: u32,
    pub volume_type: String,
    pub iops: u32,
    /// MiB/s
    pub throughput: u32,
    pub encrypted: bool,
    pub delete_on_termination: bool,
}

impl RootVolume {
    pub fn gp3(snapshot_id: &str, size_gib: u32) -> Self {
        RootVolume {
            device_name: ROOT_DEVICE_NAME.to_string(),
            snapshot_id: snapshot_id.to_string(),
            size_gib,
            volume_type: ROOT_VOLUME_TYPE.to_string(),
            iops: ROOT_VOLUME_IOPS,
            throughput: ROOT_VOLUME_THROUGHPUT,
            encrypted: false,
            delete_on_termination: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataOptions {
    pub http_endpoint_enabled: bool,
    pub http_tokens_required: bool,
    pub http_put_response_hop_limit: u8,
}

impl MetadataOptions {
    /// IMDSv2 only, reachable from containers one hop away.
    pub fn hardened() -> Self {
        MetadataOptions {
            http_endpoint_enabled: true,
            http_tokens_required: true,
            http_put_response_hop_limit: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrivateDnsOptions {
    pub hostname_type: String,
    pub enable_a_record: bool,
    pub enable_aaaa_record: bool,
}

impl Default for PrivateDnsOptions {
    fn default() -> Self {
        PrivateDnsOptions {
            hostname_type: "ip-name".to_string(),
            enable_a_record: true,
            enable_aaaa_record: false,
        }
    }
}

/// Everything a single RunInstances call carries.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInstanceSpec {
    pub image_id: String,
    pub instance_type: String,
    pub root_volume: RootVolume,
    pub security_group_id: String,
    pub associate_public_ip: bool,
    pub name_tag: String,
    pub metadata_options: MetadataOptions,
    pub private_dns_options: PrivateDnsOptions,
    /// Plain-text script; the adapter encodes it for the wire.
    pub user_data: String,
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
