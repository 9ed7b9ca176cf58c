use serde::{Deserialize, Serialize};

/// Network layout: one VPC with a private and a public subnet.
///
/// The public subnet routes through the internet gateway (`router`); the
/// private subnet routes through a NAT gateway living in the public subnet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkDef {
    pub name: String,
    pub cidr: String,
    pub private_subnet: PrivateSubnetDef,
    pub public_subnet: PublicSubnetDef,
    pub router: RouterDef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateSubnetDef {
    pub name: String,
    pub cidr: String,
    pub route_table_to_nat_gateway_name: String,
    pub availability_zone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicSubnetDef {
    pub name: String,
    pub cidr: String,
    pub availability_zone: String,
    pub nat_gateway_name: String,
    pub nat_gateway_external_ip_address_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterDef {
    pub name: String,
}

impl PublicSubnetDef {
    /// Name given to the VPC main route table once it is bound to this subnet
    pub fn default_route_table_name(&self) -> String {
        format!("{}_vpc_default_rt", self.name)
    }
}
