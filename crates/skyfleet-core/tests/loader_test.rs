use skyfleet_core::{InstancePurpose, ProjectError, load_project};
use std::fs;
use tempfile::TempDir;

const PROJECT: &str = r#"{
    "deployment_name": "sample",
    "ssh_config": {
        "user": "{SKYFLEET_SSH_USER}",
        "private_key_path": "~/.ssh/sample_rsa",
        "bastion_external_ip_address_name": "sample_bastion_ip"
    },
    "timeouts": { "create_instance": 0, "attach_volume": 45 },
    "security_groups": {
        "bastion": { "name": "sample_bastion_sg", "rules": [
            { "desc": "SSH", "protocol": "tcp", "remote_ip": "0.0.0.0/0", "port": 22 }
        ]},
        "internal": { "name": "sample_internal_sg", "rules": [] }
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
            "flavor": "t2.micro",
            "image_id": "ami-0001",
            "subnet_name": "sample_public",
            "volumes": {
                "log": { "name": "sample_log", "mount_point": "/mnt/log", "size": 1,
                         "permissions": 777, "owner": "ubuntu", "availability_zone": "us-east-1c" }
            },
            "service": {
                "env": { "UI_URL": "http://{SKYFLEET.INTERNAL.BASTION_EXTERNAL_IP_ADDRESS}" },
                "cmd": { "install": ["bastion/install.sh"] }
            }
        },
        "cass1": {
            "purpose": "cassandra",
            "inst_name": "sample-cass1",
            "security_group_name": "sample_internal_sg",
            "ip_address": "10.5.0.11",
            "flavor": "c7g.large",
            "image_id": "ami-0001",
            "subnet_name": "sample_private"
        }
    }
}"#;

fn write_project(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let scripts = dir.path().join("scripts").join("bastion");
    fs::create_dir_all(&scripts).unwrap();
    fs::write(scripts.join("install.sh"), "echo install").unwrap();
    let path = dir.path().join("skyfleet.json");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_project() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(&dir, PROJECT);

    let project = temp_env::with_var("SKYFLEET_SSH_USER", Some("ubuntu"), || {
        load_project(&path).unwrap()
    });

    assert_eq!(project.deployment_name, "sample");
    assert_eq!(project.ssh_config.user, "ubuntu");
    assert_eq!(project.ssh_config.port, 22);
    assert_eq!(project.timeouts.create_instance, 120);
    assert_eq!(project.timeouts.attach_volume, 45);
    assert_eq!(project.timeouts.delete_nat_gateway, 180);
    assert_eq!(project.instances.len(), 2);
    assert_eq!(project.instances["cass1"].purpose, InstancePurpose::Cassandra);
    assert_eq!(project.instances["bastion"].volumes["log"].volume_type, "gp2");
    assert_eq!(project.scripts_path(), dir.path().join("scripts"));
}

#[test]
fn test_missing_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(&dir, PROJECT);

    let err = temp_env::with_var_unset("SKYFLEET_SSH_USER", || load_project(&path).unwrap_err());
    match err {
        ProjectError::MissingEnvVars(vars) => assert_eq!(vars, vec!["SKYFLEET_SSH_USER"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_script() {
    let dir = tempfile::tempdir().unwrap();
    let content = PROJECT.replace("bastion/install.sh", "bastion/missing.sh");
    let path = write_project(&dir, &content);

    let err = temp_env::with_var("SKYFLEET_SSH_USER", Some("ubuntu"), || {
        load_project(&path).unwrap_err()
    });
    assert!(matches!(err, ProjectError::MissingScripts { ref scripts, .. } if scripts == &["bastion/missing.sh"]));
}

#[test]
fn test_unknown_security_group() {
    let dir = tempfile::tempdir().unwrap();
    let content = PROJECT.replace(
        "\"security_group_name\": \"sample_internal_sg\"",
        "\"security_group_name\": \"nope_sg\"",
    );
    let path = write_project(&dir, &content);

    let err = temp_env::with_var("SKYFLEET_SSH_USER", Some("ubuntu"), || {
        load_project(&path).unwrap_err()
    });
    assert!(err.to_string().contains("invalid security group nope_sg"));
}

#[test]
fn test_duplicate_ip_address() {
    let dir = tempfile::tempdir().unwrap();
    let content = PROJECT.replace("10.5.0.11", "10.5.1.10");
    let path = write_project(&dir, &content);

    let err = temp_env::with_var("SKYFLEET_SSH_USER", Some("ubuntu"), || {
        load_project(&path).unwrap_err()
    });
    assert!(err.to_string().contains("share internal ip 10.5.1.10"));
}

#[test]
fn test_bastion_ip_required() {
    let dir = tempfile::tempdir().unwrap();
    let content = PROJECT.replace(
        "\"external_ip_address_name\": \"sample_bastion_ip\",",
        "",
    );
    let path = write_project(&dir, &content);

    let err = temp_env::with_var("SKYFLEET_SSH_USER", Some("ubuntu"), || {
        load_project(&path).unwrap_err()
    });
    assert!(err.to_string().contains("at least one must have it"));
}

#[test]
fn test_unsupported_provider() {
    let dir = tempfile::tempdir().unwrap();
    let content = PROJECT.replacen('{', "{\"deploy_provider_name\": \"azure\",", 1);
    let path = write_project(&dir, &content);

    let err = temp_env::with_var("SKYFLEET_SSH_USER", Some("ubuntu"), || {
        load_project(&path).unwrap_err()
    });
    assert!(matches!(err, ProjectError::UnsupportedProvider(ref p) if p == "azure"));
}
