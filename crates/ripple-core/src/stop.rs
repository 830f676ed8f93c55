//! Configurable stop conditions.
//!
//! Quiescence always ends a run. These conditions end it earlier, checked
//! after every completed iteration against a running [`Progress`] summary.

use serde::Deserialize;

use crate::iteration::Iteration;

/// Condition that ends a run once met.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopCondition {
    /// Stop after this many iterations.
    MaxIterations {
        /// Iterations to run.
        count: u64,
    },
    /// Stop after an iteration in which nobody released anything.
    NoMorePropagated,
    /// Stop after an iteration in which nobody noticed a new piece.
    NoMoreNew,
    /// Stop once this many releases happened in total.
    TotalPropagated {
        /// Release budget.
        count: u64,
    },
    /// Stop once the iteration index runs past the ground-truth timeline.
    TimestampsExhausted,
    /// Stop when any of the nested conditions holds.
    AnyOf {
        /// Nested conditions.
        conditions: Vec<Self>,
    },
}

/// Running summary a stop condition is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    /// Completed iterations.
    pub iterations: u64,
    /// Releases in the last iteration.
    pub last_propagated: usize,
    /// Users that released something in the last iteration.
    pub last_propagating_users: usize,
    /// First-time exposures in the last iteration.
    pub last_new: usize,
    /// Releases since the run started.
    pub total_propagated: u64,
    /// Timestamp mapped to the next iteration, if any.
    pub next_timestamp: Option<i64>,
}

impl Progress {
    /// Fold a completed iteration into the summary.
    pub fn record(&mut self, iteration: &Iteration, next_timestamp: Option<i64>) {
        self.iterations = self.iterations.saturating_add(1);
        self.last_propagated = iteration.propagated_count();
        self.last_propagating_users = iteration.propagating_users();
        self.last_new = iteration.new_count();
        self.total_propagated = self
            .total_propagated
            .saturating_add(u64::try_from(self.last_propagated).unwrap_or(u64::MAX));
        self.next_timestamp = next_timestamp;
    }
}

impl StopCondition {
    /// Whether the run should stop given `progress`.
    pub fn is_met(&self, progress: &Progress) -> bool {
        match self {
            Self::MaxIterations { count } => progress.iterations >= *count,
            Self::NoMorePropagated => progress.iterations > 0 && progress.last_propagated == 0,
            Self::NoMoreNew => progress.iterations > 0 && progress.last_new == 0,
            Self::TotalPropagated { count } => progress.total_propagated >= *count,
            Self::TimestampsExhausted => progress.next_timestamp.is_none(),
            Self::AnyOf { conditions } => conditions.iter().any(|c| c.is_met(progress)),
        }
    }
}
