//! Neutron schema names read by the topology client.
//!
//! The statements in [`sql`](crate::sql) spell the table names out; these
//! constants label malformed-row errors and name tables for test fixtures.
//! The matched column values in [`values`] are bound into the statements.

/// Tenant networks
pub const NETWORKS_TABLE: &str = "networks";

/// Segmentation (VLAN/VXLAN) per network
pub const NETWORK_SEGMENTS_TABLE: &str = "networksegments";

/// Per-project segment ranges; `name` holds the project id
pub const NETWORK_SEGMENT_RANGES_TABLE: &str = "network_segment_ranges";

pub const SUBNETS_TABLE: &str = "subnets";

/// Static host routes on a subnet
pub const SUBNET_ROUTES_TABLE: &str = "subnetroutes";

pub const ROUTERS_TABLE: &str = "routers";

/// Router to port bindings
pub const ROUTER_PORTS_TABLE: &str = "routerports";

pub const PORTS_TABLE: &str = "ports";

/// Fixed IP allocations per port
pub const IP_ALLOCATIONS_TABLE: &str = "ipallocations";

pub const SUBNET_POOLS_TABLE: &str = "subnetpools";

/// RBAC grants on address scopes
pub const ADDRESS_SCOPE_RBACS_TABLE: &str = "addressscoperbacs";

/// Column values matched by the lookups
pub mod values {
    /// Router port type created once per network on each HA router node
    pub const HA_ROUTER_REPLICATED_INTERFACE: &str = "network:ha_router_replicated_interface";

    /// RBAC action granting shared access
    pub const ACCESS_AS_SHARED: &str = "access_as_shared";
}
