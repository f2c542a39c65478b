//! Row-count aware lookup outcomes.
//!
//! Every query against the topology schema has an expected row count.
//! [`Lookup`] records whether that expectation was met, so callers never
//! see partial or ambiguous rows and never confuse "nothing found" with a
//! legitimate zero-valued payload.

use std::fmt;

/// Outcome of a single topology lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Exactly the expected rows were returned.
    Found(T),
    /// No row matched.
    NotFound,
    /// More rows matched than the lookup allows.
    Ambiguous {
        /// Number of rows returned.
        rows: usize,
    },
}

impl<T> Lookup<T> {
    /// Expects exactly one row.
    pub fn exactly_one(mut rows: Vec<T>) -> Self {
        match rows.len() {
            0 => Lookup::NotFound,
            1 => rows.pop().map_or(Lookup::NotFound, Lookup::Found),
            n => Lookup::Ambiguous { rows: n },
        }
    }

    /// Expects one or more rows, keeping all of them in query order.
    pub fn at_least_one(rows: Vec<T>) -> Lookup<Vec<T>> {
        if rows.is_empty() {
            Lookup::NotFound
        } else {
            Lookup::Found(rows)
        }
    }

    /// Maps the found value, preserving misses.
    pub fn map<U, F>(self, f: F) -> Lookup<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Ambiguous { rows } => Lookup::Ambiguous { rows },
        }
    }
}

impl<T> Lookup<Option<T>> {
    /// Treats a found-but-NULL column as not found.
    pub fn flatten(self) -> Lookup<T> {
        match self {
            Lookup::Found(Some(value)) => Lookup::Found(value),
            Lookup::Found(None) | Lookup::NotFound => Lookup::NotFound,
            Lookup::Ambiguous { rows } => Lookup::Ambiguous { rows },
        }
    }
}

impl<T> fmt::Display for Lookup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Found(_) => write!(f, "found"),
            Lookup::NotFound => write!(f, "not found"),
            Lookup::Ambiguous { rows } => write!(f, "ambiguous ({} rows)", rows),
        }
    }
}
