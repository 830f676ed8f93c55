//! End-of-run JSON report.
//!
//! The report condenses a [`SimulationResult`] and the final state into the
//! figures an operator looks at after a run: how far the pieces travelled,
//! how each iteration went and which topics got the most first-time
//! exposures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ripple_core::runner::SimulationResult;
use ripple_core::{Iteration, SimulationEndReason, SimulationState};
use ripple_graph::Data;
use ripple_types::RunId;
use serde::Serialize;

use crate::network::TOPIC_TABLE;

/// Counts of one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationCounts {
    /// Iteration index.
    pub number: u64,
    /// Timestamp mapped to the iteration.
    pub timestamp: Option<i64>,
    /// (user, piece) releases.
    pub propagated: usize,
    /// Users that released something.
    pub propagating_users: usize,
    /// First-time exposures.
    pub new: usize,
    /// Repeated exposures.
    pub repeated: usize,
    /// Expired received pieces.
    pub discarded: usize,
}

impl From<&Iteration> for IterationCounts {
    fn from(it: &Iteration) -> Self {
        Self {
            number: it.number,
            timestamp: it.timestamp,
            propagated: it.propagated_count(),
            propagating_users: it.propagating_users(),
            new: it.new_count(),
            repeated: it.repeated_count(),
            discarded: it.discarded_count(),
        }
    }
}

/// Summary printed when the binary finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Identifier of the run.
    pub run_id: RunId,
    /// Catalog name, or `custom`.
    pub protocol: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the report was assembled.
    pub finished_at: DateTime<Utc>,
    /// Why the run ended.
    pub end_reason: SimulationEndReason,
    /// Completed iterations.
    pub total_iterations: u64,
    /// Releases over the whole run.
    pub total_propagated: u64,
    /// Users in the network.
    pub users: usize,
    /// Users that saw at least one piece they did not author.
    pub users_reached: usize,
    /// Per-iteration counts, in order.
    pub iterations: Vec<IterationCounts>,
    /// First-time exposures per topic.
    pub topic_exposures: BTreeMap<String, u64>,
}

impl RunReport {
    /// Build the report for a finished run.
    pub fn new(
        protocol: String,
        started_at: DateTime<Utc>,
        result: &SimulationResult,
        state: &SimulationState,
        data: &Data,
    ) -> Self {
        let users_reached = state
            .users()
            .filter(|u| {
                u.seen()
                    .iter()
                    .any(|id| data.piece(*id).is_ok_and(|p| p.creator != u.user()))
            })
            .count();

        Self {
            run_id: result.run_id,
            protocol,
            started_at,
            finished_at: Utc::now(),
            end_reason: result.end_reason.clone(),
            total_iterations: result.total_iterations,
            total_propagated: result.total_propagated,
            users: state.user_count(),
            users_reached,
            iterations: result.iterations.iter().map(IterationCounts::from).collect(),
            topic_exposures: topic_exposures(&result.iterations, data),
        }
    }
}

/// Tally first-time exposures by topic. Pieces without a topic count nothing.
fn topic_exposures(iterations: &[Iteration], data: &Data) -> BTreeMap<String, u64> {
    let mut tally: BTreeMap<String, u64> = BTreeMap::new();
    let exposures = iterations
        .iter()
        .flat_map(|it| it.receiving.values())
        .flat_map(BTreeMap::keys);
    for id in exposures {
        for feature in data.piece_features(TOPIC_TABLE, *id) {
            let count = tally.entry(feature.value.clone()).or_insert(0);
            *count = count.saturating_add(1);
        }
    }
    tally
}
