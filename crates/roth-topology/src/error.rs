//! Error types for topology store operations.
//!
//! Missing or ambiguous rows are not errors; they are reported through
//! [`Lookup`](crate::Lookup). The variants here cover failures of the store
//! itself and rows whose contents cannot be interpreted.

use thiserror::Error;

/// Result type alias for topology store operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can occur while querying the topology store.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The database driver reported a failure (connection, syntax, decode).
    #[error("Topology query failed: {query}: {source}")]
    Query {
        /// The statement that failed.
        query: &'static str,
        /// The underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// A row was returned but one of its columns cannot be used.
    #[error("Malformed row in {table}: {reason}")]
    MalformedRow {
        /// The table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Connecting to the store failed.
    #[error("Failed to connect to topology store: {0}")]
    Connect(#[source] sqlx::Error),
}

impl TopologyError {
    /// Creates a query error for the given statement.
    pub fn query(query: &'static str, source: sqlx::Error) -> Self {
        Self::Query { query, source }
    }

    /// Creates a malformed row error.
    pub fn malformed(table: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            table,
            reason: reason.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed when the next event arrives.
    pub fn is_retryable(&self) -> bool {
        match self {
            TopologyError::Query { source, .. } => matches!(
                source,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            TopologyError::Connect(_) => true,
            TopologyError::MalformedRow { .. } => false,
        }
    }
}
