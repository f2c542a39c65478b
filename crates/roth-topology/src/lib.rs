//! Read-only topology client for the RotH mechanism driver.
//!
//! Provides the lookups the VRF resolver needs against the neutron schema:
//!
//! - [`TopologyStore`]: the lookup capability set, one method per query
//! - [`SqlTopologyStore`]: parameterized SQL implementation over a sqlx pool
//! - [`Lookup`]: row-count aware outcome (`Found`, `NotFound`, `Ambiguous`)
//! - [`error`]: store failures and malformed rows
//!
//! # Row-count policy
//!
//! | Lookup | Expected rows |
//! |--------|---------------|
//! | network by id | 0 or 1 |
//! | segment by network | exactly 1 |
//! | gateways by network | 1 or more |
//! | transit subnet by network | 0 or 1 |
//! | transit route by subnet | exactly 1 |
//! | router by port | exactly 1 |
//! | router gateway chain | exactly 1 per step |
//! | router HA networks | any |
//! | vni by project | exactly 1 |
//! | gateway port vni | exactly 1 per step |
//!
//! Any other count is reported as a miss and never as a default value.

pub mod error;
pub mod lookup;
pub mod sql;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{TopologyError, TopologyResult};
pub use lookup::Lookup;
pub use sql::SqlTopologyStore;
pub use store::TopologyStore;
pub use types::*;

#[cfg(feature = "mock")]
pub use store::MockTopologyStore;
