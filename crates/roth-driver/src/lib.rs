//! RotH mechanism driver
//!
//! Reacts to port and network lifecycle events, resolves the tenant VRF of
//! the affected network from the neutron topology, and hands it to the RotH
//! agent on the port's host (setup) or to every agent (teardown).
//!
//! - [`VrfResolver`]: the dependent lookup chain producing a [`VrfDescriptor`]
//! - [`AgentDispatcher`]: targeted setup calls and fanout teardown casts
//! - [`RothMechanismDriver`]: the framework callbacks tying both together

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod events;
pub mod resolver;
pub mod transport;
pub mod types;

pub use config::DriverConfig;
pub use dispatcher::AgentDispatcher;
pub use driver::{EventOutcome, MechanismDriver, RothMechanismDriver};
pub use error::{DriverError, DriverResult};
pub use events::{
    handle_event, process_request, DriverEvent, EventListener, EventReply, EventRequest, ReplySink,
};
pub use resolver::{Resolution, SkipReason, VrfResolver};
pub use transport::{AgentTransport, RedisTransport};
pub use types::*;
