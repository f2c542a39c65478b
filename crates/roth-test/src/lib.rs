//! Integration test infrastructure for the RotH mechanism driver
//!
//! Provides:
//! - An in-memory neutron schema with row builders ([`TopologyFixture`])
//! - A transport that records agent traffic ([`RecordingTransport`]) and a
//!   reply sink that records event replies against it ([`RecordingReplies`])
//! - Canned topologies for the end-to-end scenarios

pub mod fixtures;
mod transport;

pub use fixtures::*;
pub use transport::{
    RecordedCall, RecordedCast, RecordedReply, RecordingReplies, RecordingTransport,
};
