//! Iteration callback that logs run progress.

use ripple_core::runner::IterationCallback;
use ripple_core::{Iteration, SimulationState};
use tracing::{debug, info};

/// Logs a progress line every `every` iterations and a debug line for the rest.
#[derive(Debug)]
pub struct ProgressLogger {
    every: u64,
    total_propagated: u64,
}

impl ProgressLogger {
    /// Log every `every` iterations (values below 1 log every iteration).
    pub const fn new(every: u64) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
            total_propagated: 0,
        }
    }
}

impl IterationCallback for ProgressLogger {
    fn on_iteration(&mut self, iteration: &Iteration, state: &SimulationState) {
        let propagated = u64::try_from(iteration.propagated_count()).unwrap_or(u64::MAX);
        self.total_propagated = self.total_propagated.saturating_add(propagated);

        let completed = iteration.number.saturating_add(1);
        if completed.checked_rem(self.every) == Some(0) {
            let holding = state.users().filter(|u| u.has_candidates()).count();
            info!(
                iteration = iteration.number,
                propagated,
                total_propagated = self.total_propagated,
                users_with_candidates = holding,
                "Progress"
            );
        } else {
            debug!(iteration = iteration.number, propagated, "Iteration done");
        }
    }
}
