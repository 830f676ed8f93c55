//! Shared type definitions for the ripple diffusion simulator.
//!
//! Every crate in the workspace speaks in terms of the identifiers and
//! value types defined here. Graph storage lives in `ripple-graph`, the
//! simulation state machine in `ripple-core`.
//!
//! # Modules
//!
//! - [`ids`] -- Dense index identifiers for users and pieces, plus run IDs
//! - [`enums`] -- Neighborhood orientation and edge kinds
//! - [`structs`] -- Information pieces and feature values

pub mod enums;
pub mod ids;
pub mod structs;

pub use enums::{EdgeKind, Orientation};
pub use ids::{InfoId, RunId, UserId};
pub use structs::{FeatureValue, InformationPiece};
