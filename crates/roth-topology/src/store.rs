//! The topology store capability set.

use async_trait::async_trait;

use crate::error::TopologyResult;
use crate::lookup::Lookup;
use crate::types::*;

/// Read-only lookups over the topology schema.
///
/// Each lookup enforces its own expected row count; a miss is returned as
/// [`Lookup::NotFound`] or [`Lookup::Ambiguous`], and `Err` is reserved for
/// store failures and malformed rows.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// Network by id (0 or 1 rows).
    async fn network(&self, network_id: &str) -> TopologyResult<Lookup<NetworkIdentity>>;

    /// Segmentation id of a network (exactly 1 row).
    async fn segment_for_network(&self, network_id: &str) -> TopologyResult<Lookup<SegmentId>>;

    /// Gateways of every subnet on a network (at least 1 row).
    async fn gateways_for_network(&self, network_id: &str)
        -> TopologyResult<Lookup<GatewaySet>>;

    /// Id of the subnet on a transit network (0 or 1 rows).
    async fn transit_subnet(&self, network_id: &str) -> TopologyResult<Lookup<String>>;

    /// Static route of a transit subnet (exactly 1 row).
    async fn transit_route(&self, subnet_id: &str) -> TopologyResult<Lookup<TransitRoute>>;

    /// Router owning a port (exactly 1 row).
    async fn router_id_for_port(&self, port_id: &str) -> TopologyResult<Lookup<String>>;

    /// Gateway chain of a router: gateway port, its allocation, the subnet's
    /// pool, the pool's address scope and the scope's shared grant.
    async fn router_gateway_info(
        &self,
        router_id: &str,
    ) -> TopologyResult<Lookup<RouterGatewayInfo>>;

    /// CIDRs behind a router's HA replicated interfaces that belong to the
    /// given address scope. Interfaces that cannot be traced are skipped.
    async fn router_networks(
        &self,
        router_id: &str,
        address_scope_id: &str,
    ) -> TopologyResult<Vec<String>>;

    /// VNI from the project's segment range minimum (exactly 1 row).
    async fn vni_for_project(&self, project_id: &str) -> TopologyResult<Lookup<Vni>>;

    /// VNI of the project owning the router's gateway network.
    async fn gateway_port_vni(&self, router_id: &str) -> TopologyResult<Lookup<GatewayVni>>;
}
