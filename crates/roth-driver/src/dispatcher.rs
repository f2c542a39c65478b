//! Agent dispatcher - sends resolved VRFs to the RotH agents

use std::sync::Arc;

use roth_topology::SegmentId;
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::commands::*;
use crate::error::DriverResult;
use crate::transport::AgentTransport;
use crate::types::VrfDescriptor;

/// Agent Dispatcher
#[derive(Clone)]
pub struct AgentDispatcher {
    transport: Arc<dyn AgentTransport>,
}

impl AgentDispatcher {
    /// Create a new AgentDispatcher over a transport
    pub fn new(transport: Arc<dyn AgentTransport>) -> Self {
        Self { transport }
    }

    /// Call `setup_tenant_vrf` on the descriptor's host and wait for the reply
    #[instrument(skip(self, descriptor), fields(host = %descriptor.host_id, segment_id = descriptor.segment_id))]
    pub async fn setup_tenant_vrf(&self, descriptor: &VrfDescriptor) -> DriverResult<Value> {
        info!(
            bridge_id = %descriptor.bridge_id,
            vni = descriptor.vni,
            gateways = ?descriptor.gateways,
            transit = ?descriptor.transit,
            router = ?descriptor.router,
            "Call roth agent setup_tenant_vrf"
        );

        let args = build_setup_tenant_vrf_args(descriptor);
        self.transport
            .call(&descriptor.host_id, SETUP_TENANT_VRF, args)
            .await
            .inspect_err(|e| {
                error!(error = %e, retryable = e.is_retryable(), "Error in setup_tenant_vrf rpc call")
            })
    }

    /// Broadcast `delete_tenant_vrf` for a segment
    ///
    /// Nothing is awaited from the agents. A transport failure is logged and
    /// returned, but callers treat it as non-fatal.
    #[instrument(skip(self))]
    pub async fn delete_tenant_vrf(&self, segment_id: SegmentId) -> DriverResult<()> {
        info!("Call roth agent delete_tenant_vrf");

        let args = build_delete_tenant_vrf_args(segment_id);
        self.transport
            .fanout_cast(DELETE_TENANT_VRF, args)
            .await
            .inspect_err(|e| {
                error!(error = %e, retryable = e.is_retryable(), "Error in delete_tenant_vrf rpc call")
            })
    }
}
