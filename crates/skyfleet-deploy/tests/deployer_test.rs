//! Whole deployments against the in-memory cloud and a scripted remote shell

use async_trait::async_trait;
use skyfleet_cloud::{
    BilledState, CloudClient, ObservedResource, PollIntervals, Presence, Reconciler,
    ResourceAction, ResourceKind, ResourceState, SandboxCloud, SandboxOp,
    list_deployment_resources,
};
use skyfleet_core::{Project, SshConfig, load_project};
use skyfleet_deploy::{
    Command, DeployError, DeployOptions, Deployer, Executor, Reporter, ShellFactory, TaskOutcome,
    Throttle,
};
use skyfleet_remote::{ExecResult, RemoteError, RemoteShell};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const PROJECT: &str = r#"{
    "deployment_name": "sample",
    "ssh_config": {
        "user": "ubuntu",
        "private_key_path": "~/.ssh/sample_rsa",
        "bastion_external_ip_address_name": "sample_bastion_ip"
    },
    "security_groups": {
        "bastion": { "name": "sample_bastion_sg", "rules": [
            { "desc": "SSH", "protocol": "tcp", "remote_ip": "0.0.0.0/0", "port": 22 }
        ]},
        "internal": { "name": "sample_internal_sg", "rules": [
            { "desc": "All internal", "protocol": "all", "remote_ip": "10.5.0.0/16", "port": 0 }
        ]}
    },
    "network": {
        "name": "sample_network",
        "cidr": "10.5.0.0/16",
        "private_subnet": { "name": "sample_private", "cidr": "10.5.0.0/24",
            "route_table_to_nat_gateway_name": "sample_rt_natgw", "availability_zone": "us-east-1c" },
        "public_subnet": { "name": "sample_public", "cidr": "10.5.1.0/24", "availability_zone": "us-east-1c",
            "nat_gateway_name": "sample_natgw", "nat_gateway_external_ip_address_name": "sample_natgw_ip" },
        "router": { "name": "sample_router" }
    },
    "instances": {
        "bastion": {
            "purpose": "bastion",
            "inst_name": "sample-bastion",
            "security_group_name": "sample_bastion_sg",
            "root_key_name": "sample-root",
            "ip_address": "10.5.1.10",
            "external_ip_address_name": "sample_bastion_ip",
            "associated_instance_profile": "sample-reader",
            "flavor": "t2.micro",
            "image_id": "ami-0001",
            "subnet_name": "sample_public",
            "volumes": {
                "log": { "name": "sample_log", "mount_point": "/mnt/log", "size": 1,
                         "permissions": 777, "owner": "ubuntu", "availability_zone": "us-east-1c" }
            },
            "service": {
                "env": { "UI_URL": "http://{SKYFLEET.INTERNAL.BASTION_EXTERNAL_IP_ADDRESS}" },
                "cmd": { "install": ["common/install.sh"], "config": ["common/config.sh"] }
            }
        },
        "rabbitmq": {
            "purpose": "rabbitmq",
            "inst_name": "sample-rabbitmq",
            "security_group_name": "sample_internal_sg",
            "ip_address": "10.5.0.5",
            "flavor": "t2.small",
            "image_id": "ami-0001",
            "subnet_name": "sample_private",
            "service": { "cmd": { "install": ["common/install.sh"] } }
        },
        "prometheus": {
            "purpose": "prometheus",
            "inst_name": "sample-prometheus",
            "security_group_name": "sample_internal_sg",
            "ip_address": "10.5.0.4",
            "flavor": "t2.small",
            "image_id": "ami-0001",
            "subnet_name": "sample_private"
        },
        "daemon01": {
            "purpose": "daemon",
            "inst_name": "sample-daemon01",
            "security_group_name": "sample_internal_sg",
            "ip_address": "10.5.0.101",
            "flavor": "t2.small",
            "image_id": "ami-0001",
            "subnet_name": "sample_private",
            "service": { "cmd": { "start": ["common/start.sh"], "stop": ["common/stop.sh"] } }
        },
        "cass01": {
            "purpose": "cassandra",
            "inst_name": "sample-cass01",
            "security_group_name": "sample_internal_sg",
            "ip_address": "10.5.0.11",
            "flavor": "c7g.large",
            "image_id": "ami-0001",
            "subnet_name": "sample_private",
            "service": { "cmd": {
                "install": ["common/install.sh"],
                "config": ["common/config.sh"],
                "stop": ["common/stop.sh"]
            } }
        },
        "cass02": {
            "purpose": "cassandra",
            "inst_name": "sample-cass02",
            "security_group_name": "sample_internal_sg",
            "ip_address": "10.5.0.12",
            "flavor": "c7g.large",
            "image_id": "ami-0001",
            "subnet_name": "sample_private"
        }
    }
}"#;

/// Answers like healthy hosts and remembers every command
#[derive(Default)]
struct ScriptedShell {
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedShell {
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn ran_on(&self, host: &str, needle: &str) -> bool {
        self.calls()
            .iter()
            .any(|(h, cmd)| h == host && cmd.contains(needle))
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn exec(&self, host: &str, cmd: &str) -> ExecResult {
        self.calls
            .lock()
            .unwrap()
            .push((host.to_string(), cmd.to_string()));
        let mut result = ExecResult::new(host, cmd);
        if cmd.contains("init_volume_attachment") {
            result.stdout = "formatting /dev/nvme1n1\n8c1e2f0a-4b7d-4e55-a3c1-0d9f6b2e7a11\n".into();
        } else if cmd.contains("nodetool") {
            result.stdout = "UN  10.5.0.11  70 KiB  16  100.0%  a  rack1\n\
                             UN  10.5.0.12  68 KiB  16  100.0%  b  rack1\n"
                .into();
        } else if cmd == "id" {
            result.stdout = "uid=1000(ubuntu)\n".into();
        }
        result
    }
}

struct SharedShell {
    shell: Arc<ScriptedShell>,
    opened_with: Mutex<Vec<String>>,
}

impl ShellFactory for SharedShell {
    fn open(&self, ssh: &SshConfig) -> Result<Arc<dyn RemoteShell>, RemoteError> {
        self.opened_with
            .lock()
            .unwrap()
            .push(ssh.external_ip_address.clone());
        Ok(self.shell.clone())
    }
}

#[derive(Default)]
struct Recorder {
    notices: Mutex<Vec<String>>,
    outcomes: Mutex<Vec<(String, bool)>>,
}

impl Reporter for Recorder {
    fn report(&self, outcome: &TaskOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .push((outcome.target.clone(), outcome.result.is_ok()));
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

struct Fixture {
    _dir: TempDir,
    cloud: Arc<SandboxCloud>,
    shell: Arc<ScriptedShell>,
    factory: Arc<SharedShell>,
    recorder: Arc<Recorder>,
    deployer: Deployer,
}

fn load(dir: &TempDir) -> Project {
    let scripts = dir.path().join("scripts").join("common");
    fs::create_dir_all(&scripts).unwrap();
    for name in ["install", "config", "start", "stop"] {
        fs::write(scripts.join(format!("{}.sh", name)), format!("echo {}", name)).unwrap();
    }
    let path = dir.path().join("skyfleet.json");
    fs::write(&path, PROJECT).unwrap();
    load_project(&path).unwrap()
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let project = load(&dir);

    let cloud = Arc::new(SandboxCloud::new());
    cloud.insert_image("ami-0001");
    cloud.insert_key_pair("sample-root");
    for flavor in ["t2.micro", "t2.small", "c7g.large"] {
        cloud.insert_instance_type(flavor);
    }
    let reconciler = Reconciler::new(cloud.clone(), project.deployment_name.clone())
        .with_intervals(PollIntervals::uniform(Duration::from_millis(10)));

    let shell = Arc::new(ScriptedShell::default());
    let factory = Arc::new(SharedShell {
        shell: shell.clone(),
        opened_with: Mutex::new(Vec::new()),
    });
    let recorder = Arc::new(Recorder::default());
    let executor = Executor::new(Throttle::new(Duration::ZERO), recorder.clone());
    let options = DeployOptions {
        ping_pause: Duration::from_millis(10),
        ..DeployOptions::default()
    };

    let deployer = Deployer::new(project, reconciler, factory.clone(), executor, options);
    Fixture {
        _dir: dir,
        cloud,
        shell,
        factory,
        recorder,
        deployer,
    }
}

fn live(cloud: &SandboxCloud, kind: ResourceKind) -> Vec<ObservedResource> {
    cloud
        .resources(kind)
        .into_iter()
        .filter(|r| r.presence() != Presence::Absent)
        .collect()
}

#[tokio::test]
async fn test_deployment_create_then_delete() {
    let mut f = fixture();

    f.deployer.run(Command::DeploymentCreate, "").await.unwrap();

    let instances = live(&f.cloud, ResourceKind::Instance);
    assert_eq!(instances.len(), 6);
    assert!(instances.iter().all(|i| i.state == ResourceState::Running));

    let volume = &live(&f.cloud, ResourceKind::Volume)[0];
    assert_eq!(volume.name.as_deref(), Some("sample_log"));
    assert!(volume.active_attachment().is_some());

    // Bastion is reached on its floating IP, everything else on its private one
    let bastion_ip = f.deployer.project().ssh_config.external_ip_address.clone();
    assert!(!bastion_ip.is_empty());
    assert_eq!(f.factory.opened_with.lock().unwrap().as_slice(), &[bastion_ip.clone()]);
    assert!(f.shell.ran_on(&bastion_ip, "init_volume_attachment /dev/nvme1n1 /mnt/log 777 'ubuntu'"));
    assert!(f.shell.ran_on(&bastion_ip, &format!("UI_URL=http://{}", bastion_ip)));
    assert!(f.shell.ran_on("10.5.0.11", "echo config"));
    assert!(f.shell.ran_on("10.5.0.11", "nodetool status"));

    f.deployer.run(Command::DeploymentDelete, "").await.unwrap();

    assert!(f.shell.ran_on(&bastion_ip, "sudo umount -d /mnt/log"));
    for kind in [
        ResourceKind::Instance,
        ResourceKind::Volume,
        ResourceKind::SecurityGroup,
        ResourceKind::Subnet,
        ResourceKind::Vpc,
        ResourceKind::NatGateway,
        ResourceKind::FloatingIp,
        ResourceKind::InternetGateway,
    ] {
        assert!(live(&f.cloud, kind).is_empty(), "{} left behind", kind);
    }

    let leftovers = list_deployment_resources(f.cloud.as_ref(), Some("sample"))
        .await
        .unwrap();
    assert!(leftovers.iter().all(|r| r.billed != BilledState::Active));
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let mut f = fixture();

    f.deployer.run(Command::DeploymentCreate, "").await.unwrap();
    f.deployer.run(Command::DeploymentCreate, "").await.unwrap();

    assert_eq!(f.cloud.create_calls(ResourceKind::Instance), 6);
    assert_eq!(f.cloud.create_calls(ResourceKind::Vpc), 1);
    assert_eq!(f.cloud.create_calls(ResourceKind::NatGateway), 1);
    assert_eq!(f.cloud.create_calls(ResourceKind::Volume), 1);
}

#[tokio::test]
async fn test_snapshot_and_restore() {
    let mut f = fixture();
    f.deployer.run(Command::DeploymentCreate, "").await.unwrap();

    f.deployer
        .run(Command::DeploymentCreateImages, "")
        .await
        .unwrap();
    assert!(live(&f.cloud, ResourceKind::Instance).is_empty());
    let images = live(&f.cloud, ResourceKind::Image);
    // The seeded base image plus one per instance
    assert_eq!(images.len(), 7);
    let snapshots = f.cloud.resources(ResourceKind::Snapshot);
    assert_eq!(snapshots.len(), 6);
    assert!(snapshots.iter().all(|s| s.tag("DeploymentName") == Some("sample")));

    f.deployer
        .run(Command::DeploymentRestoreInstances, "")
        .await
        .unwrap();
    let restored = live(&f.cloud, ResourceKind::Instance);
    assert_eq!(restored.len(), 6);
    assert!(restored.iter().all(|i| i.state == ResourceState::Running));
    assert!(f.shell.ran_on("10.5.0.101", "echo start"));

    f.deployer
        .run(Command::DeploymentDeleteImages, "")
        .await
        .unwrap();
    assert_eq!(live(&f.cloud, ResourceKind::Image).len(), 1);
    assert!(live(&f.cloud, ResourceKind::Snapshot).is_empty());
}

#[tokio::test]
async fn test_delete_instances_refuses_attached_volumes() {
    let mut f = fixture();
    f.deployer.run(Command::DeploymentCreate, "").await.unwrap();

    let err = f
        .deployer
        .run(Command::DeleteInstances, "bastion")
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Conflict(_)), "{}", err);
    assert_eq!(live(&f.cloud, ResourceKind::Instance).len(), 6);
}

#[tokio::test]
async fn test_volume_command_without_volumes() {
    let mut f = fixture();

    f.deployer
        .run(Command::AttachVolumes, "cass*")
        .await
        .unwrap();

    assert_eq!(
        f.recorder.notices.lock().unwrap().as_slice(),
        &["No volumes to attach".to_string()]
    );
    assert!(f.factory.opened_with.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unmatched_pattern_is_an_error() {
    let mut f = fixture();

    let err = f
        .deployer
        .run(Command::PingInstances, "zookeeper*")
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Project(_)), "{}", err);
    assert!(f.recorder.outcomes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_commands_need_the_bastion_ip() {
    let mut f = fixture();

    let err = f
        .deployer
        .run(Command::PingInstances, "*")
        .await
        .unwrap_err();

    assert!(
        matches!(err, DeployError::Missing { hint: "create_floating_ips", .. }),
        "{}",
        err
    );
}

#[tokio::test]
async fn test_every_target_reports() {
    let mut f = fixture();
    f.deployer.run(Command::CreateFloatingIps, "").await.unwrap();
    f.deployer.run(Command::CreateNetworking, "").await.unwrap();
    f.deployer
        .run(Command::CreateSecurityGroups, "")
        .await
        .unwrap();

    f.deployer
        .run(Command::CreateInstances, "daemon*,cass*")
        .await
        .unwrap();

    let mut targets: Vec<String> = f
        .recorder
        .outcomes
        .lock()
        .unwrap()
        .iter()
        .filter(|(target, _)| !target.is_empty())
        .map(|(target, _)| target.clone())
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["cass01", "cass02", "daemon01"]);

    let notices = f.recorder.notices.lock().unwrap().clone();
    assert!(notices.contains(&"ssh-keygen -f ~/.ssh/known_hosts -R 10.5.0.11;".to_string()));
}

async fn prepare_for_instances(f: &mut Fixture) {
    f.deployer.run(Command::CreateFloatingIps, "").await.unwrap();
    f.deployer.run(Command::CreateNetworking, "").await.unwrap();
    f.deployer
        .run(Command::CreateSecurityGroups, "")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_instance_profile_is_associated_on_rerun() {
    let mut f = fixture();
    prepare_for_instances(&mut f).await;

    // The run dies between creating the instance and its follow-up actions
    f.cloud.fail_on(ResourceKind::FloatingIp, SandboxOp::Perform);
    let first = f.deployer.run(Command::CreateInstances, "bastion").await;
    assert!(first.is_err());
    let bastion = live(&f.cloud, ResourceKind::Instance).remove(0);
    assert_eq!(f.cloud.instance_profile(&bastion.id), None);

    f.cloud.clear_failures();
    f.deployer
        .run(Command::CreateInstances, "bastion")
        .await
        .unwrap();

    assert_eq!(f.cloud.create_calls(ResourceKind::Instance), 1);
    assert_eq!(
        f.cloud.instance_profile(&bastion.id).as_deref(),
        Some("sample-reader")
    );

    // Once associated, further runs leave it alone
    f.deployer
        .run(Command::CreateInstances, "bastion")
        .await
        .unwrap();
    assert_eq!(
        f.cloud.instance_profile(&bastion.id).as_deref(),
        Some("sample-reader")
    );
}

#[tokio::test]
async fn test_attach_refuses_volume_held_by_another_instance() {
    let mut f = fixture();
    prepare_for_instances(&mut f).await;
    f.deployer
        .run(Command::CreateInstances, "bastion")
        .await
        .unwrap();
    f.deployer
        .run(Command::CreateVolumes, "bastion")
        .await
        .unwrap();

    f.cloud.insert(
        ObservedResource::new(ResourceKind::Instance, "i-elsewhere")
            .with_state(ResourceState::Running),
    );
    let volume = live(&f.cloud, ResourceKind::Volume).remove(0);
    f.cloud
        .perform(&ResourceAction::AttachVolume {
            volume_id: volume.id.clone(),
            instance_id: "i-elsewhere".into(),
            device: "/dev/sdf".into(),
        })
        .await
        .unwrap();

    let err = f
        .deployer
        .run(Command::AttachVolumes, "bastion")
        .await
        .unwrap_err();

    assert!(matches!(&err, DeployError::Conflict(m) if m.contains("i-elsewhere")), "{}", err);

    let err = f
        .deployer
        .run(Command::DetachVolumes, "bastion")
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Conflict(_)), "{}", err);
    let volume = live(&f.cloud, ResourceKind::Volume).remove(0);
    assert_eq!(
        volume.active_attachment().map(|a| a.target_id.as_str()),
        Some("i-elsewhere")
    );
    assert!(
        f.shell
            .calls()
            .iter()
            .all(|(_, cmd)| !cmd.contains("init_volume_attachment") && !cmd.contains("umount"))
    );
}
