//! Type definitions for the RotH driver

use roth_topology::{GatewaySet, SegmentId, TransitRoute, Vni};
use serde::{Deserialize, Serialize};

/// Prefix of the linux bridge the agent builds for a network
pub const BRIDGE_PREFIX: &str = "brq";

/// Number of network id characters appended to [`BRIDGE_PREFIX`]
pub const BRIDGE_ID_NETWORK_CHARS: usize = 11;

/// Networks whose name starts with this prefix are transit networks
pub const TRANSIT_NETWORK_PREFIX: &str = "transit";

/// Port status on which no action is taken
pub const PORT_STATUS_DOWN: &str = "DOWN";

/// Device owners containing this marker are router ports
pub const ROUTER_OWNER_MARKER: &str = "router";

/// Bridge name for a network: fixed prefix plus the first 11 characters of the id
pub fn bridge_id(network_id: &str) -> String {
    let mut id = String::from(BRIDGE_PREFIX);
    id.extend(network_id.chars().take(BRIDGE_ID_NETWORK_CHARS));
    id
}

/// Pure prefix match; `transitional` counts as transit too
pub fn is_transit_name(network_name: &str) -> bool {
    network_name.starts_with(TRANSIT_NETWORK_PREFIX)
}

/// Snapshot of the port handed to `update_port_postcommit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortContext {
    pub id: String,
    #[serde(default)]
    pub status: String,
    pub network_id: String,
    #[serde(default)]
    pub device_owner: String,
    /// Host the port is bound to; the setup call is addressed to it
    #[serde(rename = "binding:host_id", default)]
    pub host_id: String,
}

impl PortContext {
    /// Create a new PortContext
    pub fn new(
        id: impl Into<String>,
        status: impl Into<String>,
        network_id: impl Into<String>,
        device_owner: impl Into<String>,
        host_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            network_id: network_id.into(),
            device_owner: device_owner.into(),
            host_id: host_id.into(),
        }
    }

    pub fn is_down(&self) -> bool {
        self.status == PORT_STATUS_DOWN
    }

    /// Device owner names a router interface
    pub fn is_router_owned(&self) -> bool {
        self.device_owner.contains(ROUTER_OWNER_MARKER)
    }
}

/// Snapshot of the network handed to `delete_network_precommit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkContext {
    pub id: String,
}

impl NetworkContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// BGP parameters of a router port, resolved all at once or not at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterPeering {
    pub router_id: String,
    /// Router's gateway port address
    pub bgp_id: String,
    /// Gateway address of the router's external subnet
    pub bgp_peer: String,
    /// Tenant CIDRs in the router's shared address scope
    pub router_networks: Vec<String>,
}

/// Fully resolved tenant VRF, the unit handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfDescriptor {
    pub bridge_id: String,
    pub vni: Vni,
    pub gateways: GatewaySet,
    pub transit: Option<TransitRoute>,
    pub host_id: String,
    pub segment_id: SegmentId,
    pub router: Option<RouterPeering>,
}
