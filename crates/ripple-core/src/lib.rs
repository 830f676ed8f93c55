//! Diffusion simulation engine for the ripple workspace.
//!
//! Information pieces spread over a read-only social graph
//! ([`ripple_graph::Data`]) under five independent policy families
//! bundled into a [`Protocol`]. The [`DiffusionSimulator`] advances the
//! per-user state one synchronous iteration at a time and the
//! [`runner`] drives it until a termination condition is met.
//!
//! # Modules
//!
//! - [`state`] -- Per-user buckets and the global simulation state
//! - [`mechanisms`] -- Selection, expiration, update, propagation and sight policies
//! - [`protocol`] -- The validated five-policy bundle
//! - [`catalog`] -- Named, preconfigured protocols
//! - [`iteration`] -- Per-iteration delta records
//! - [`stop`] -- Configurable stop conditions
//! - [`simulator`] -- The phased iteration loop
//! - [`operator`] -- Shared stop flag and run bounds
//! - [`runner`] -- Run loop with termination handling and callbacks
//! - [`config`] -- YAML configuration structures

pub mod catalog;
pub mod config;
pub mod iteration;
pub mod mechanisms;
pub mod operator;
pub mod protocol;
pub mod runner;
pub mod simulator;
pub mod state;
pub mod stop;

mod random;

pub use catalog::{CatalogParams, ProtocolName};
pub use iteration::Iteration;
pub use mechanisms::{IterationContext, Limit};
pub use operator::{OperatorState, SimulationEndReason};
pub use protocol::{Protocol, ProtocolError};
pub use simulator::{DiffusionSimulator, SimulationError};
pub use state::{PropagatedInformation, SimulationState, UserState};
pub use stop::{Progress, StopCondition};
