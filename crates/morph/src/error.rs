//! Error types for diffing.

use std::fmt;

use morph_schema::{QualifiedName, SchemaError, StableId};

use crate::solver::SolverError;

/// Which input snapshot an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Old => write!(f, "old"),
            Side::New => write!(f, "new"),
        }
    }
}

/// Errors that can occur while diffing two snapshots.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A snapshot failed validation.
    #[error("invalid {side} snapshot: {source}")]
    InvalidSnapshot {
        side: Side,
        #[source]
        source: SchemaError,
    },

    /// The two snapshots disagree about an object in a way no operation can express.
    #[error("model incompatible at `{id}`: {reason}")]
    ModelIncompatible { id: StableId, reason: String },

    /// The procedure body generator failed.
    #[error("procedure `{procedure}`: {source}")]
    Procedure {
        procedure: QualifiedName,
        #[source]
        source: GenerateError,
    },

    /// The operations could not be put in an order that replays cleanly.
    #[error("cannot order operations: {0}")]
    Unorderable(#[from] SolverError),
}

/// Errors from a [`CommandTreeGenerator`](crate::CommandTreeGenerator).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerateError {
    #[error("target table `{0}` not found")]
    UnknownTable(StableId),

    #[error("parameter `{parameter}` is bound to unknown column `{column}`")]
    UnknownColumn { parameter: String, column: StableId },

    #[error("{0}")]
    Other(String),
}

/// Result type for diff operations.
pub type Result<T> = std::result::Result<T, DiffError>;
