//! Shared stop flag and run bounds.
//!
//! The run loop executes on a worker thread while the binary's signal
//! handler lives on the async runtime. Both hold an `Arc<OperatorState>`:
//! the handler sets the stop flag, the loop polls it between iterations.
//! A stop is therefore only honored once the current iteration has
//! completed.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::RunConfig;

/// Reason why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// No user holds any own or received candidate.
    Quiescence,
    /// A configured stop condition held.
    StopCondition,
    /// Reached the configured `max_iterations` limit.
    MaxIterationsReached,
    /// Reached the configured `max_real_time_seconds` limit.
    MaxRealTimeReached,
    /// An operator issued a stop command.
    OperatorStop,
}

/// Shared run control state.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wall-clock time when the run started.
    started_at: DateTime<Utc>,

    /// Maximum number of iterations (0 = unlimited).
    max_iterations: u64,

    /// Maximum wall-clock seconds (0 = unlimited).
    max_real_time_seconds: u64,

    /// Reason the run ended, if it has.
    end_reason: Mutex<Option<SimulationEndReason>>,
}

impl OperatorState {
    /// Create the control state from the run configuration.
    pub fn new(run: &RunConfig) -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            started_at: Utc::now(),
            max_iterations: run.max_iterations,
            max_real_time_seconds: run.max_real_time_seconds,
            end_reason: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop after the current iteration.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Record the reason the run ended.
    pub fn set_end_reason(&self, reason: SimulationEndReason) {
        *self.end_reason.lock() = Some(reason);
    }

    /// Get the reason the run ended, if it has.
    pub fn end_reason(&self) -> Option<SimulationEndReason> {
        self.end_reason.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Boundaries
    // -----------------------------------------------------------------------

    /// Whether `completed` iterations exhaust the iteration budget.
    pub const fn iteration_limit_reached(&self, completed: u64) -> bool {
        self.max_iterations > 0 && completed >= self.max_iterations
    }

    /// Whether the wall-clock budget is spent.
    pub fn time_limit_reached(&self) -> bool {
        self.max_real_time_seconds > 0 && self.elapsed_seconds() >= self.max_real_time_seconds
    }

    /// Return the wall-clock start time.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Return elapsed seconds since the run started.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }

    /// Get the configured max iterations.
    pub const fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    /// Get the configured max real-time seconds.
    pub const fn max_real_time_seconds(&self) -> u64 {
        self.max_real_time_seconds
    }
}
