//! VRF resolver - turns a lifecycle event into a VRF descriptor
//!
//! Every step depends on the steps before it. The first lookup that misses
//! ends resolution with a [`SkipReason`]; a [`VrfDescriptor`] is only built
//! once every field its path needs has been found.

use std::fmt;
use std::sync::Arc;

use roth_topology::{Lookup, SegmentId, TopologyError, TopologyResult, TopologyStore};
use tracing::{debug, instrument};

use crate::types::*;

/// Why an event was not acted upon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Port status is DOWN
    PortDown,
    /// Network missing, or without project/name
    NetworkNotFound { network_id: String },
    /// Project has no VNI and the port belongs to no router
    NoVniOrRouter { port_id: String },
    /// Router fallback found no VNI behind the gateway port
    NoGatewayVni { port_id: String, router_id: String },
    NoSegment { network_id: String },
    NoGateways { network_id: String },
    NoTransitSubnet { network_id: String },
    /// Transit subnet lacks exactly one complete static route
    InvalidTransitRoute { subnet_id: String },
    NoRouterId { port_id: String },
    /// Router gateway chain failed; not fit for dynamic routing
    RouterNotEligible { router_id: String },
    /// HA interface networks could not be determined
    RouterNetworksUnavailable { router_id: String, message: String },
    /// Port has no binding host to address the setup call to
    PortUnbound { port_id: String },
    /// The store failed or returned a malformed row
    StoreError {
        step: &'static str,
        message: String,
        /// The same event may succeed once the store recovers
        retryable: bool,
    },
}

impl SkipReason {
    fn store(step: &'static str, err: TopologyError) -> Self {
        SkipReason::StoreError {
            step,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    /// Expected "nothing to do" outcomes, as opposed to data gaps
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SkipReason::PortDown
                | SkipReason::NetworkNotFound { .. }
                | SkipReason::NoVniOrRouter { .. }
                | SkipReason::NoGatewayVni { .. }
                | SkipReason::PortUnbound { .. }
        )
    }

    /// Store failures that are transient rather than bad data
    pub fn is_retryable(&self) -> bool {
        matches!(self, SkipReason::StoreError { retryable: true, .. })
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PortDown => write!(f, "port down"),
            SkipReason::NetworkNotFound { network_id } => {
                write!(f, "no network project_id or name found for {}", network_id)
            }
            SkipReason::NoVniOrRouter { port_id } => {
                write!(f, "no vni or router_id found for port {}", port_id)
            }
            SkipReason::NoGatewayVni { port_id, router_id } => write!(
                f,
                "no vni behind gateway of router {} for port {}",
                router_id, port_id
            ),
            SkipReason::NoSegment { network_id } => {
                write!(f, "no segment_id found for network {}", network_id)
            }
            SkipReason::NoGateways { network_id } => {
                write!(f, "no gateways found for network {}", network_id)
            }
            SkipReason::NoTransitSubnet { network_id } => {
                write!(f, "no subnet found for transit network {}", network_id)
            }
            SkipReason::InvalidTransitRoute { subnet_id } => write!(
                f,
                "improper route configuration for transit subnet {}",
                subnet_id
            ),
            SkipReason::NoRouterId { port_id } => {
                write!(f, "no router_id found for port {}", port_id)
            }
            SkipReason::RouterNotEligible { router_id } => {
                write!(f, "router {} is not fit for dynamic routing", router_id)
            }
            SkipReason::RouterNetworksUnavailable { router_id, message } => write!(
                f,
                "cannot determine HA replicated interfaces of router {}: {}",
                router_id, message
            ),
            SkipReason::PortUnbound { port_id } => {
                write!(f, "port {} has no binding host", port_id)
            }
            SkipReason::StoreError { step, message, .. } => {
                write!(f, "error during {} lookup: {}", step, message)
            }
        }
    }
}

/// Outcome of resolving one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Resolved(T),
    Skip(SkipReason),
}

impl<T> From<Result<T, SkipReason>> for Resolution<T> {
    fn from(result: Result<T, SkipReason>) -> Self {
        match result {
            Ok(value) => Resolution::Resolved(value),
            Err(reason) => Resolution::Skip(reason),
        }
    }
}

/// A lookup that must be found for resolution to continue
fn require<T>(
    result: TopologyResult<Lookup<T>>,
    step: &'static str,
    miss: impl FnOnce() -> SkipReason,
) -> Result<T, SkipReason> {
    match result {
        Ok(Lookup::Found(value)) => Ok(value),
        Ok(other) => {
            debug!(step, outcome = %other, "Lookup unresolved");
            Err(miss())
        }
        Err(e) => Err(SkipReason::store(step, e)),
    }
}

/// A lookup whose miss selects a fallback path
fn optional<T>(result: TopologyResult<Lookup<T>>, step: &'static str) -> Result<Option<T>, SkipReason> {
    match result {
        Ok(Lookup::Found(value)) => Ok(Some(value)),
        Ok(other) => {
            debug!(step, outcome = %other, "Lookup unresolved, falling back");
            Ok(None)
        }
        Err(e) => Err(SkipReason::store(step, e)),
    }
}

/// VRF Resolver
///
/// Stateless between events; every call reads the store afresh.
#[derive(Clone)]
pub struct VrfResolver {
    store: Arc<dyn TopologyStore>,
}

impl VrfResolver {
    /// Create a new VrfResolver over a topology store
    pub fn new(store: Arc<dyn TopologyStore>) -> Self {
        Self { store }
    }

    /// Resolve the VRF for an updated port
    #[instrument(skip(self, port), fields(port_id = %port.id, network_id = %port.network_id))]
    pub async fn resolve_port(&self, port: &PortContext) -> Resolution<VrfDescriptor> {
        self.try_resolve_port(port).await.into()
    }

    /// Resolve the segment to tear down for a deleted network
    #[instrument(skip(self, network), fields(network_id = %network.id))]
    pub async fn resolve_network_delete(&self, network: &NetworkContext) -> Resolution<SegmentId> {
        require(
            self.store.segment_for_network(&network.id).await,
            "segment by network",
            || SkipReason::NoSegment {
                network_id: network.id.clone(),
            },
        )
        .into()
    }

    async fn try_resolve_port(&self, port: &PortContext) -> Result<VrfDescriptor, SkipReason> {
        if port.is_down() {
            return Err(SkipReason::PortDown);
        }
        if port.host_id.is_empty() {
            return Err(SkipReason::PortUnbound {
                port_id: port.id.clone(),
            });
        }

        let network_missing = || SkipReason::NetworkNotFound {
            network_id: port.network_id.clone(),
        };
        let network = require(
            self.store.network(&port.network_id).await,
            "network",
            network_missing,
        )?;
        if network.project_id.is_empty() || network.name.is_empty() {
            return Err(network_missing());
        }
        let transit = is_transit_name(&network.name);

        // Direct project VNI first; the router gateway path only when it misses
        let mut router_id = None;
        let (vni, network_id) = match optional(
            self.store.vni_for_project(&network.project_id).await,
            "vni by project",
        )? {
            Some(vni) => (vni, port.network_id.clone()),
            None => {
                let found = require(
                    self.store.router_id_for_port(&port.id).await,
                    "router by port",
                    || SkipReason::NoVniOrRouter {
                        port_id: port.id.clone(),
                    },
                )?;
                let gateway = require(
                    self.store.gateway_port_vni(&found).await,
                    "gateway port vni",
                    || SkipReason::NoGatewayVni {
                        port_id: port.id.clone(),
                        router_id: found.clone(),
                    },
                )?;
                debug!(router_id = %found, gateway_network = %gateway.network_id, "VNI resolved via router gateway");
                router_id = Some(found);
                (gateway.vni, gateway.network_id)
            }
        };

        let segment_id = require(
            self.store.segment_for_network(&network_id).await,
            "segment by network",
            || SkipReason::NoSegment {
                network_id: network_id.clone(),
            },
        )?;

        let gateways = require(
            self.store.gateways_for_network(&network_id).await,
            "gateways by network",
            || SkipReason::NoGateways {
                network_id: network_id.clone(),
            },
        )?;

        let transit = if transit {
            let subnet_id = require(
                self.store.transit_subnet(&network_id).await,
                "transit subnet",
                || SkipReason::NoTransitSubnet {
                    network_id: network_id.clone(),
                },
            )?;
            let route = require(
                self.store.transit_route(&subnet_id).await,
                "transit route",
                || SkipReason::InvalidTransitRoute {
                    subnet_id: subnet_id.clone(),
                },
            )?;
            Some(route)
        } else {
            None
        };

        let router = if port.is_router_owned() || router_id.is_some() {
            Some(self.resolve_router(port, router_id).await?)
        } else {
            None
        };

        Ok(VrfDescriptor {
            bridge_id: bridge_id(&network_id),
            vni,
            gateways,
            transit,
            host_id: port.host_id.clone(),
            segment_id,
            router,
        })
    }

    /// Router id, gateway chain and scoped HA networks of a router port
    async fn resolve_router(
        &self,
        port: &PortContext,
        known_router: Option<String>,
    ) -> Result<RouterPeering, SkipReason> {
        let router_id = match known_router {
            Some(id) => id,
            None => require(
                self.store.router_id_for_port(&port.id).await,
                "router by port",
                || SkipReason::NoRouterId {
                    port_id: port.id.clone(),
                },
            )?,
        };

        let info = require(
            self.store.router_gateway_info(&router_id).await,
            "router gateway chain",
            || SkipReason::RouterNotEligible {
                router_id: router_id.clone(),
            },
        )?;

        let router_networks = self
            .store
            .router_networks(&router_id, &info.address_scope_id)
            .await
            .map_err(|e| SkipReason::RouterNetworksUnavailable {
                router_id: router_id.clone(),
                message: e.to_string(),
            })?;

        Ok(RouterPeering {
            router_id,
            bgp_id: info.router_ip,
            bgp_peer: info.router_gateway_ip,
            router_networks,
        })
    }
}
