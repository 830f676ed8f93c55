//! Error types for the `ripple-graph` crate.
//!
//! All fallible operations in this crate return [`GraphError`].

use ripple_types::{InfoId, UserId};

/// Errors that can occur while building or querying graph data.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A user with this ID was already added.
    #[error("duplicate user: {0}")]
    DuplicateUser(UserId),

    /// A user was referenced but never added.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// An edge between the two users already exists.
    #[error("duplicate edge from {from} to {to}")]
    DuplicateEdge {
        /// Source of the edge.
        from: UserId,
        /// Target of the edge.
        to: UserId,
    },

    /// Edges from a user to itself are not allowed.
    #[error("self loop on {0}")]
    SelfLoop(UserId),

    /// An edge weight is NaN or infinite.
    #[error("invalid weight {weight} on edge from {from} to {to}")]
    InvalidWeight {
        /// Source of the edge.
        from: UserId,
        /// Target of the edge.
        to: UserId,
        /// The rejected weight.
        weight: f64,
    },

    /// A piece with this ID was already added.
    #[error("duplicate information piece: {0}")]
    DuplicatePiece(InfoId),

    /// A piece was referenced but never added.
    #[error("unknown information piece: {0}")]
    UnknownPiece(InfoId),

    /// A feature value weight is NaN or infinite.
    #[error("invalid weight {weight} in feature table {table}")]
    InvalidFeatureWeight {
        /// Name of the feature table.
        table: String,
        /// The rejected weight.
        weight: f64,
    },
}
