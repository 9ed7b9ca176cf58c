use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityGroupDef {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<SecurityGroupRuleDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRuleDef {
    /// Human-readable description
    #[serde(default)]
    pub desc: String,
    /// tcp, udp, icmp
    pub protocol: String,
    /// IPv4, IPv6
    #[serde(default = "default_ethertype")]
    pub ethertype: String,
    /// CIDR, e.g. 0.0.0.0/0
    pub remote_ip: String,
    pub port: u16,
    #[serde(default)]
    pub direction: RuleDirection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDirection {
    #[default]
    Ingress,
    Egress,
}

impl std::fmt::Display for RuleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleDirection::Ingress => write!(f, "ingress"),
            RuleDirection::Egress => write!(f, "egress"),
        }
    }
}

fn default_ethertype() -> String {
    "IPv4".to_string()
}
