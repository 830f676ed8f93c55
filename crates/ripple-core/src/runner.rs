//! Run loop with termination handling.
//!
//! [`run_simulation`] drives a [`DiffusionSimulator`] until one of these
//! holds:
//!
//! - **Operator stop**: the shared stop flag is set
//! - **Time bound**: `max_real_time_seconds` elapsed
//! - **Quiescence**: no user holds any own or received candidate
//! - **Stop condition**: a configured [`StopCondition`] is met
//! - **Iteration bound**: `max_iterations` iterations completed
//!
//! Bounds and the stop flag are checked between iterations only, so every
//! returned state is the result of whole iterations.

use std::sync::Arc;

use ripple_types::RunId;
use serde::Serialize;
use tracing::{info, warn};

use crate::iteration::Iteration;
use crate::operator::{OperatorState, SimulationEndReason};
use crate::simulator::{DiffusionSimulator, SimulationError};
use crate::state::SimulationState;
use crate::stop::StopCondition;

/// Errors that can occur during a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// An iteration failed.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: SimulationError,
    },
}

/// Result of a run.
#[derive(Debug, Serialize)]
pub struct SimulationResult {
    /// Identifier of the run.
    pub run_id: RunId,
    /// The reason the run ended.
    pub end_reason: SimulationEndReason,
    /// Every completed iteration, in order.
    pub iterations: Vec<Iteration>,
    /// Number of completed iterations.
    pub total_iterations: u64,
    /// Releases over the whole run.
    pub total_propagated: u64,
}

/// Callback invoked after each iteration completes.
pub trait IterationCallback: Send {
    /// Called with the iteration record and the state it produced.
    fn on_iteration(&mut self, iteration: &Iteration, state: &SimulationState);
}

/// A no-op callback for testing.
pub struct NoOpCallback;

impl IterationCallback for NoOpCallback {
    fn on_iteration(&mut self, _iteration: &Iteration, _state: &SimulationState) {}
}

/// Run the simulation until a termination condition is met.
///
/// # Errors
///
/// Returns [`RunnerError`] if an iteration fails.
pub fn run_simulation(
    sim: &mut DiffusionSimulator,
    stop: &[StopCondition],
    operator: &Arc<OperatorState>,
    callback: &mut dyn IterationCallback,
) -> Result<SimulationResult, RunnerError> {
    let run_id = RunId::new();
    let mut iterations: Vec<Iteration> = Vec::new();

    info!(
        %run_id,
        max_iterations = operator.max_iterations(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        stop_conditions = stop.len(),
        "Simulation starting"
    );

    let reason = loop {
        // --- Check stop request (before iteration) ---
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            break SimulationEndReason::OperatorStop;
        }

        // --- Check time limit (before iteration) ---
        if operator.time_limit_reached() {
            info!(
                max_seconds = operator.max_real_time_seconds(),
                elapsed = operator.elapsed_seconds(),
                "Real-time limit reached"
            );
            break SimulationEndReason::MaxRealTimeReached;
        }

        // --- Nothing left to move ---
        if sim.is_quiescent() {
            info!(iteration = sim.state().iteration(), "Quiescent before iteration");
            break SimulationEndReason::Quiescence;
        }

        // --- Execute iteration ---
        let record = sim.run_iteration()?;

        // --- Notify callback ---
        callback.on_iteration(&record, sim.state());
        iterations.push(record);

        if sim.is_quiescent() {
            info!(iteration = sim.state().iteration(), "Quiescence reached");
            break SimulationEndReason::Quiescence;
        }

        let progress = sim.progress();
        if stop.iter().any(|c| c.is_met(progress)) {
            info!(iterations = progress.iterations, "Stop condition met");
            break SimulationEndReason::StopCondition;
        }

        // --- Check iteration limit (after iteration) ---
        if operator.iteration_limit_reached(progress.iterations) {
            info!(
                iterations = progress.iterations,
                max_iterations = operator.max_iterations(),
                "Iteration limit reached"
            );
            break SimulationEndReason::MaxIterationsReached;
        }
    };

    operator.set_end_reason(reason.clone());
    let progress = sim.progress();
    Ok(SimulationResult {
        run_id,
        end_reason: reason,
        iterations,
        total_iterations: progress.iterations,
        total_propagated: progress.total_propagated,
    })
}

/// Log the end of a run.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        run_id = %result.run_id,
        reason = ?result.end_reason,
        total_iterations = result.total_iterations,
        total_propagated = result.total_propagated,
        "Simulation ended"
    );

    if let Some(last) = result.iterations.last() {
        info!(
            iteration = last.number,
            propagated = last.propagated_count(),
            new = last.new_count(),
            "Final iteration summary"
        );
    } else {
        warn!("Simulation ended with no iterations executed");
    }
}
