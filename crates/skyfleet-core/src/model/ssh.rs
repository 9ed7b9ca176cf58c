use serde::{Deserialize, Serialize};

/// SSH access to the deployment.
///
/// Every host is reached with the same user and key. Hosts other than the
/// bastion are reached through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConfig {
    /// Public address of the bastion. Filled at run time from the floating IP
    /// named by `bastion_external_ip_address_name`.
    #[serde(default)]
    pub external_ip_address: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub user: String,

    /// Path to the private key file, `~/` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,

    /// Inline private key material (PEM). Never written back out.
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,

    pub bastion_external_ip_address_name: String,
}

fn default_ssh_port() -> u16 {
    22
}
