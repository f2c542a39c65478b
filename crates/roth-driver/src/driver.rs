//! RotH mechanism driver - lifecycle callbacks from the orchestration framework
//!
//! The framework calls [`MechanismDriver::update_port_postcommit`] after a port
//! update is committed and [`MechanismDriver::delete_network_precommit`] before
//! a network delete is committed. Each callback resolves, then dispatches.
//! Nothing is kept between callbacks.

use std::sync::Arc;

use async_trait::async_trait;
use roth_topology::TopologyStore;
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::dispatcher::AgentDispatcher;
use crate::resolver::{Resolution, SkipReason, VrfResolver};
use crate::transport::AgentTransport;
use crate::types::{NetworkContext, PortContext};

/// What happened to one event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Command sent; carries the agent's reply for calls (`Null` for casts)
    Dispatched(Value),
    Skipped(SkipReason),
    /// Resolution succeeded but the command could not be delivered
    DispatchFailed(String),
}

/// Callbacks a mechanism driver receives from the framework.
///
/// Callbacks never fail towards the framework; outcomes are for logging
/// and observation only.
#[async_trait]
pub trait MechanismDriver: Send + Sync {
    /// Driver name used in logs.
    fn name(&self) -> &str;

    /// Called once when the framework loads the driver.
    fn initialize(&self) {
        info!(driver = self.name(), "Mechanism driver initialized");
    }

    /// Port update committed.
    async fn update_port_postcommit(&self, port: &PortContext) -> EventOutcome;

    /// Network delete about to be committed.
    async fn delete_network_precommit(&self, network: &NetworkContext) -> EventOutcome;
}

/// RotH Mechanism Driver
#[derive(Clone)]
pub struct RothMechanismDriver {
    resolver: VrfResolver,
    dispatcher: AgentDispatcher,
}

impl RothMechanismDriver {
    /// Create a new driver from its collaborators
    pub fn new(store: Arc<dyn TopologyStore>, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            resolver: VrfResolver::new(store),
            dispatcher: AgentDispatcher::new(transport),
        }
    }

    fn log_skip(reason: &SkipReason) {
        if reason.is_expected() {
            info!(%reason, "No action taken");
        } else {
            error!(%reason, retryable = reason.is_retryable(), "No action taken");
        }
    }
}

#[async_trait]
impl MechanismDriver for RothMechanismDriver {
    fn name(&self) -> &str {
        "roth"
    }

    #[instrument(skip(self, port), fields(port_id = %port.id, status = %port.status))]
    async fn update_port_postcommit(&self, port: &PortContext) -> EventOutcome {
        info!(?port, "update_port_postcommit");

        let descriptor = match self.resolver.resolve_port(port).await {
            Resolution::Resolved(descriptor) => descriptor,
            Resolution::Skip(reason) => {
                Self::log_skip(&reason);
                return EventOutcome::Skipped(reason);
            }
        };

        match self.dispatcher.setup_tenant_vrf(&descriptor).await {
            Ok(reply) => {
                info!(%reply, "setup_tenant_vrf result");
                EventOutcome::Dispatched(reply)
            }
            Err(e) => EventOutcome::DispatchFailed(e.to_string()),
        }
    }

    #[instrument(skip(self, network), fields(network_id = %network.id))]
    async fn delete_network_precommit(&self, network: &NetworkContext) -> EventOutcome {
        info!("delete_network_precommit");

        let segment_id = match self.resolver.resolve_network_delete(network).await {
            Resolution::Resolved(segment_id) => segment_id,
            Resolution::Skip(reason) => {
                Self::log_skip(&reason);
                return EventOutcome::Skipped(reason);
            }
        };

        match self.dispatcher.delete_tenant_vrf(segment_id).await {
            Ok(()) => EventOutcome::Dispatched(Value::Null),
            Err(e) => EventOutcome::DispatchFailed(e.to_string()),
        }
    }
}
