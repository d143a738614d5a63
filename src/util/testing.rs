//! In-memory stand-in for EC2 used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{CloudError, CloudResult};
use crate::models::cloud_instance::{InstanceSnapshot, InstanceState, RunInstanceSpec};
use crate::models::security_group::{IngressRule, Provisioned};
use crate::services::compute::{ComputeApi, ComputeFactory};

pub fn generate_random_string(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(n)
        .collect()
}

fn generate_resource_id(prefix: &str) -> String {
    format!("{}-{}", prefix, generate_random_string(17).to_lowercase())
}

struct FakeSecurityGroup {
    id: String,
    name: String,
    vpc_id: String,
    rules: Vec<IngressRule>,
}

struct FakeInstance {
    snapshot: InstanceSnapshot,
    pending_checks: u32,
    public_ip: String,
}

struct FakeState {
    default_vpc: Option<String>,
    groups: Vec<FakeSecurityGroup>,
    hide_next_lookup: bool,
    failing: HashSet<String>,
    snapshots_dropped: bool,
    pending_checks: u32,
    public_ip_withheld: bool,
    instances: HashMap<String, FakeInstance>,
    launched: Vec<RunInstanceSpec>,
    launched_ids: Vec<String>,
    terminated: Vec<String>,
    regions: Vec<String>,
}

pub struct FakeCompute {
    state: Mutex<FakeState>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::with_default_vpc(Some(generate_resource_id("vpc")))
    }

    pub fn without_default_vpc() -> Self {
        Self::with_default_vpc(None)
    }

    fn with_default_vpc(default_vpc: Option<String>) -> Self {
        FakeCompute {
            state: Mutex::new(FakeState {
                default_vpc,
                groups: Vec::new(),
                hide_next_lookup: false,
                failing: HashSet::new(),
                snapshots_dropped: false,
                pending_checks: 1,
                public_ip_withheld: false,
                instances: HashMap::new(),
                launched: Vec::new(),
                launched_ids: Vec::new(),
                terminated: Vec::new(),
                regions: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// A factory that hands out this fake for every region.
    pub fn factory(self: &Arc<Self>) -> ComputeFactory {
        let fake = Arc::clone(self);
        Arc::new(move |region: &str| {
            fake.state().regions.push(region.to_string());
            let api: Arc<dyn ComputeApi> = fake.clone();
            Ok(api)
        })
    }

    pub fn fail_operation(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    pub fn hide_groups_from_next_lookup(&self) {
        self.state().hide_next_lookup = true;
    }

    pub fn drop_image_snapshots(&self) {
        self.state().snapshots_dropped = true;
    }

    /// Number of `pending` answers new instances give before `running`.
    pub fn set_pending_checks(&self, checks: u32) {
        self.state().pending_checks = checks;
    }

    /// New instances reach `running` without a public address.
    pub fn withhold_public_ip(&self) {
        self.state().public_ip_withheld = true;
    }

    pub fn insert_security_group(&self, name: &str) -> String {
        let mut state = self.state();
        let id = generate_resource_id("sg");
        let vpc_id = state.default_vpc.clone().unwrap_or_default();
        state.groups.push(FakeSecurityGroup {
            id: id.clone(),
            name: name.to_string(),
            vpc_id,
            rules: Vec::new(),
        });
        id
    }

    pub fn insert_instance(&self, state: InstanceState) -> String {
        let id = generate_resource_id("i");
        self.state().instances.insert(
            id.clone(),
            FakeInstance {
                snapshot: InstanceSnapshot {
                    instance_id: id.clone(),
                    instance_type: "t3.micro".to_string(),
                    state,
                    public_ip: None,
                    public_dns: None,
                },
                pending_checks: 0,
                public_ip: "203.0.113.10".to_string(),
            },
        );
        id
    }

    pub fn security_group_count(&self) -> usize {
        self.state().groups.len()
    }

    pub fn ingress_rules(&self, group_id: &str) -> Vec<IngressRule> {
        self.state()
            .groups
            .iter()
            .find(|group| group.id == group_id)
            .map(|group| group.rules.clone())
            .unwrap_or_default()
    }

    pub fn launched_specs(&self) -> Vec<RunInstanceSpec> {
        self.state().launched.clone()
    }

    /// Ids handed out by `run_instance`, in launch order.
    pub fn instance_ids(&self) -> Vec<String> {
        self.state().launched_ids.clone()
    }

    pub fn terminated_ids(&self) -> Vec<String> {
        self.state().terminated.clone()
    }

    pub fn regions_connected(&self) -> Vec<String> {
        self.state().regions.clone()
    }

    fn check(&self, operation: &str) -> CloudResult<()> {
        if self.state().failing.contains(operation) {
            return Err(CloudError::provider(
                operation,
                "UnauthorizedOperation: You are not authorized to perform this operation.",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn default_vpc_id(&self) -> CloudResult<Option<String>> {
        self.check("DescribeVpcs")?;
        Ok(self.state().default_vpc.clone())
    }

    async fn find_security_group(&self, name: &str, vpc_id: &str) -> CloudResult<Option<String>> {
        self.check("DescribeSecurityGroups")?;
        let mut state = self.state();
        if state.hide_next_lookup {
            state.hide_next_lookup = false;
            return Ok(None);
        }

        Ok(state
            .groups
            .iter()
            .find(|group| group.name == name && group.vpc_id == vpc_id)
            .map(|group| group.id.clone()))
    }

    async fn create_security_group(
        &self,
        name: &str,
        _description: &str,
        vpc_id: &str,
    ) -> CloudResult<Provisioned<String>> {
        self.check("CreateSecurityGroup")?;
        let mut state = self.state();
        if state
            .groups
            .iter()
            .any(|group| group.name == name && group.vpc_id == vpc_id)
        {
            return Ok(Provisioned::AlreadyExists);
        }

        let id = generate_resource_id("sg");
        state.groups.push(FakeSecurityGroup {
            id: id.clone(),
            name: name.to_string(),
            vpc_id: vpc_id.to_string(),
            rules: Vec::new(),
        });
        Ok(Provisioned::Created(id))
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> CloudResult<Provisioned<()>> {
        self.check("AuthorizeSecurityGroupIngress")?;
        let mut state = self.state();
        let group = state
            .groups
            .iter_mut()
            .find(|group| group.id == group_id)
            .ok_or_else(|| {
                CloudError::provider(
                    "AuthorizeSecurityGroupIngress",
                    format!("InvalidGroup.NotFound: The security group '{}' does not exist", group_id),
                )
            })?;

        if group.rules.contains(rule) {
            return Ok(Provisioned::AlreadyExists);
        }
        group.rules.push(rule.clone());
        Ok(Provisioned::Created(()))
    }

    async fn image_root_snapshot(&self, image_id: &str) -> CloudResult<Option<String>> {
        self.check("DescribeImages")?;
        if self.state().snapshots_dropped {
            return Ok(None);
        }
        Ok(Some(format!("snap-{}", image_id)))
    }

    async fn run_instance(&self, spec: &RunInstanceSpec) -> CloudResult<InstanceSnapshot> {
        self.check("RunInstances")?;
        let mut rng = rand::thread_rng();
        let public_ip = format!(
            "54.{}.{}.{}",
            rng.gen_range(1..=254),
            rng.gen_range(0..=255),
            rng.gen_range(1..=254)
        );

        let snapshot = InstanceSnapshot {
            instance_id: generate_resource_id("i"),
            instance_type: spec.instance_type.clone(),
            state: InstanceState::Pending,
            public_ip: None,
            public_dns: None,
        };

        let mut state = self.state();
        let pending_checks = state.pending_checks;
        state.launched.push(spec.clone());
        state.launched_ids.push(snapshot.instance_id.clone());
        state.instances.insert(
            snapshot.instance_id.clone(),
            FakeInstance {
                snapshot: snapshot.clone(),
                pending_checks,
                public_ip,
            },
        );
        Ok(snapshot)
    }

    async fn describe_instance(&self, instance_id: &str) -> CloudResult<Option<InstanceSnapshot>> {
        self.check("DescribeInstances")?;
        let mut state = self.state();
        let withheld = state.public_ip_withheld;
        let Some(instance) = state.instances.get_mut(instance_id) else {
            return Ok(None);
        };

        if instance.snapshot.state == InstanceState::Pending {
            if instance.pending_checks > 0 {
                instance.pending_checks -= 1;
            } else if withheld {
                instance.snapshot.state = InstanceState::Running;
            } else {
                instance.snapshot.state = InstanceState::Running;
                instance.snapshot.public_dns = Some(format!(
                    "ec2-{}.compute.amazonaws.com",
                    instance.public_ip.replace('.', "-")
                ));
                instance.snapshot.public_ip = Some(instance.public_ip.clone());
            }
        }

        Ok(Some(instance.snapshot.clone()))
    }

    async fn terminate_instance(&self, instance_id: &str) -> CloudResult<()> {
        self.check("TerminateInstances")?;
        let mut state = self.state();
        let instance = state.instances.get_mut(instance_id).ok_or_else(|| {
            CloudError::provider(
                "TerminateInstances",
                format!("InvalidInstanceID.NotFound: The instance ID '{}' does not exist", instance_id),
            )
        })?;

        instance.snapshot.state = InstanceState::ShuttingDown;
        state.terminated.push(instance_id.to_string());
        Ok(())
    }
}
