//! Row types returned by the topology lookups

use serde::{Deserialize, Serialize};

/// Segmentation id of a network (VLAN id or VXLAN segment)
pub type SegmentId = u32;

/// Virtual network identifier
pub type Vni = u32;

/// Gateway addresses of a network's subnets, `gateway_ip/prefixlen`, in query order
pub type GatewaySet = Vec<String>;

/// Network identity snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub id: String,
    pub project_id: String,
    pub name: String,
}

impl NetworkIdentity {
    /// Create a new NetworkIdentity
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: name.into(),
        }
    }
}

/// Static route of a transit subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitRoute {
    pub destination: String,
    #[serde(rename = "nexthop")]
    pub next_hop: String,
}

impl TransitRoute {
    /// Create a new TransitRoute
    pub fn new(destination: impl Into<String>, next_hop: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            next_hop: next_hop.into(),
        }
    }
}

/// Dynamic routing parameters derived from a router's external gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterGatewayInfo {
    /// Address allocated to the router's gateway port (BGP router id)
    pub router_ip: String,
    /// Gateway address of the gateway port's subnet (BGP peer)
    pub router_gateway_ip: String,
    /// Shared address scope of the gateway subnet's pool
    pub address_scope_id: String,
}

/// VNI reached through a router's gateway port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayVni {
    pub vni: Vni,
    /// Network the router's gateway port lives on
    pub network_id: String,
}
