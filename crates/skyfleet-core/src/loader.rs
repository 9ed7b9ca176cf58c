//! Project loader
//!
//! Reads the project JSON, substitutes environment variables, applies
//! defaults and validates cross references.

use crate::error::{ProjectError, Result};
use crate::model::{DEPLOY_PROVIDER_AWS, Project};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Placeholder in service env values, replaced once the bastion floating IP is known
pub const BASTION_IP_PLACEHOLDER: &str = "{SKYFLEET.INTERNAL.BASTION_EXTERNAL_IP_ADDRESS}";

const ENV_VAR_PATTERN: &str = r"\{(SKYFLEET[_A-Z0-9]+)\}";

/// Load and validate a project file
#[instrument(fields(path = %path.display()))]
pub fn load_project(path: &Path) -> Result<Project> {
    let full_path = std::path::absolute(path).map_err(|e| ProjectError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let raw = std::fs::read_to_string(&full_path).map_err(|e| ProjectError::IoError {
        path: full_path.clone(),
        message: e.to_string(),
    })?;

    let root = full_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let project = load_project_from_str(&raw, &root).map_err(|e| match e {
        ProjectError::Parse { message, .. } => ProjectError::Parse {
            path: full_path.clone(),
            message,
        },
        other => other,
    })?;

    info!(
        deployment = %project.deployment_name,
        instances = project.instances.len(),
        "Project loaded"
    );
    Ok(project)
}

/// Load a project from JSON text; `root` anchors relative paths such as the scripts directory
pub fn load_project_from_str(raw: &str, root: &Path) -> Result<Project> {
    debug!("Substituting environment variables");
    let text = substitute_env_vars(raw, |name| std::env::var(name).ok())?;

    let mut project: Project = serde_json::from_str(&text).map_err(|e| ProjectError::Parse {
        path: root.to_path_buf(),
        message: e.to_string(),
    })?;

    if project.deploy_provider_name != DEPLOY_PROVIDER_AWS {
        return Err(ProjectError::UnsupportedProvider(
            project.deploy_provider_name.clone(),
        ));
    }

    project.root = root.to_path_buf();
    project.timeouts.apply_defaults();

    validate(&project)?;
    Ok(project)
}

/// Replace `{SKYFLEET_*}` placeholders with values from `lookup`.
///
/// Every missing (or empty) variable is reported at once. Values are escaped
/// for inclusion inside JSON strings.
pub fn substitute_env_vars<F>(raw: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(ENV_VAR_PATTERN)
        .map_err(|e| ProjectError::Invalid(format!("regex compile error: {}", e)))?;

    let names: BTreeSet<&str> = re
        .captures_iter(raw)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect();

    let mut values = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match lookup(name).filter(|v| !v.is_empty()) {
            Some(value) => values.push((name, value)),
            None => missing.push(name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(ProjectError::MissingEnvVars(missing));
    }

    let mut text = raw.to_string();
    for (name, value) in values {
        let escaped = value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"");
        text = text.replace(&format!("{{{}}}", name), &escaped);
    }
    Ok(text)
}

fn validate(project: &Project) -> Result<()> {
    if project.deployment_name.is_empty() {
        return Err(ProjectError::Invalid("deployment_name is empty".to_string()));
    }

    let ssh = &project.ssh_config;
    if ssh.private_key_path.is_none() && ssh.private_key.is_none() {
        return Err(ProjectError::Invalid(
            "ssh_config needs either private_key_path or private_key".to_string(),
        ));
    }

    let mut host_names = HashSet::new();
    let mut ip_addresses = HashSet::new();
    let mut volume_names = HashSet::new();
    let mut bastion_nickname: Option<&str> = None;

    for (nickname, def) in &project.instances {
        if def.inst_name.is_empty() {
            return Err(ProjectError::Invalid(format!(
                "instance {} has empty inst_name",
                nickname
            )));
        }
        if !host_names.insert(def.inst_name.as_str()) {
            return Err(ProjectError::Invalid(format!(
                "instances share inst_name {}",
                def.inst_name
            )));
        }

        if def.ip_address.is_empty() {
            return Err(ProjectError::Invalid(format!(
                "instance {} has empty ip address",
                nickname
            )));
        }
        if !ip_addresses.insert(def.ip_address.as_str()) {
            return Err(ProjectError::Invalid(format!(
                "instances share internal ip {}",
                def.ip_address
            )));
        }

        if let Some(ip_name) = &def.external_ip_address_name {
            if *ip_name != ssh.bastion_external_ip_address_name {
                return Err(ProjectError::Invalid(format!(
                    "instance {} has unexpected external ip name {}, expected {}",
                    nickname, ip_name, ssh.bastion_external_ip_address_name
                )));
            }
            if let Some(other) = bastion_nickname {
                return Err(ProjectError::Invalid(format!(
                    "instances {},{} share external ip address {}",
                    other, nickname, ip_name
                )));
            }
            bastion_nickname = Some(nickname);
        }

        if def.security_group_name.is_empty() {
            return Err(ProjectError::Invalid(format!(
                "instance {} has empty security group name",
                nickname
            )));
        }
        if !project
            .security_groups
            .values()
            .any(|sg| sg.name == def.security_group_name)
        {
            return Err(ProjectError::Invalid(format!(
                "instance {} has invalid security group {}",
                nickname, def.security_group_name
            )));
        }

        for (vol_nickname, vol) in &def.volumes {
            if vol.name.is_empty() {
                return Err(ProjectError::Invalid(format!(
                    "volume {} of instance {} has empty name",
                    vol_nickname, nickname
                )));
            }
            if !volume_names.insert(vol.name.as_str()) {
                return Err(ProjectError::Invalid(format!(
                    "volumes share name {}",
                    vol.name
                )));
            }
        }
    }

    if bastion_nickname.is_none() {
        return Err(ProjectError::Invalid(format!(
            "none of the instances is using {}, at least one must have it",
            ssh.bastion_external_ip_address_name
        )));
    }

    validate_scripts(project)
}

/// All referenced scripts must exist; unused scripts are only reported
fn validate_scripts(project: &Project) -> Result<()> {
    let scripts_dir = project.scripts_path();

    let referenced: BTreeSet<&str> = project
        .instances
        .values()
        .flat_map(|def| def.service.cmd.all())
        .map(String::as_str)
        .collect();

    let missing: Vec<String> = referenced
        .iter()
        .filter(|script| !scripts_dir.join(script).is_file())
        .map(|script| script.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(ProjectError::MissingScripts {
            dir: scripts_dir,
            scripts: missing,
        });
    }

    let pattern = scripts_dir.join("**").join("*");
    if let Some(pattern) = pattern.to_str()
        && let Ok(entries) = glob::glob(pattern)
    {
        for path in entries.flatten().filter(|p| p.is_file()) {
            let Ok(relative) = path.strip_prefix(&scripts_dir) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if !referenced.contains(relative.as_str()) {
                warn!(script = %relative, "Script is not used by any instance");
            }
        }
    }

    Ok(())
}
