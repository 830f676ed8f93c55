//! Social graph and information data for the ripple diffusion simulator.
//!
//! Everything in this crate is read-only once built. The simulator borrows
//! a [`Data`] for the whole run and never mutates it.
//!
//! # Modules
//!
//! - [`graph`] -- Directed, weighted, typed social graph with orientation-aware
//!   neighbor queries
//! - [`features`] -- Named multi-valued feature tables for users and pieces
//! - [`data`] -- The [`Data`] bundle and its validating [`DataBuilder`]
//! - [`error`] -- Error types for graph and data construction

pub mod data;
pub mod error;
pub mod features;
pub mod graph;

pub use data::{Data, DataBuilder};
pub use error::GraphError;
pub use features::FeatureTable;
pub use graph::{Edge, SocialGraph};
