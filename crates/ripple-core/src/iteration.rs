//! Per-iteration delta records.
//!
//! An [`Iteration`] lists what changed in one step of the loop: who released
//! which pieces, who noticed pieces for the first time or again, and which
//! received pieces expired. Downstream consumers aggregate these instead of
//! diffing full state snapshots.

use std::collections::{BTreeMap, BTreeSet};

use ripple_types::{InfoId, UserId};
use serde::Serialize;

/// Pieces noticed by each user, with the users the copies came from.
pub type Exposures = BTreeMap<UserId, BTreeMap<InfoId, BTreeSet<UserId>>>;

/// What happened in one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Iteration {
    /// Iteration index.
    pub number: u64,
    /// Ground-truth timestamp mapped to the iteration, if any.
    pub timestamp: Option<i64>,
    /// Pieces each user released.
    pub propagating: BTreeMap<UserId, Vec<InfoId>>,
    /// Pieces users noticed for the first time.
    pub receiving: Exposures,
    /// Pieces users noticed again.
    pub rereceiving: Exposures,
    /// Received pieces each user dropped.
    pub discarding: BTreeMap<UserId, Vec<InfoId>>,
}

impl Iteration {
    /// An empty record for iteration `number`.
    pub const fn new(number: u64, timestamp: Option<i64>) -> Self {
        Self {
            number,
            timestamp,
            propagating: BTreeMap::new(),
            receiving: BTreeMap::new(),
            rereceiving: BTreeMap::new(),
            discarding: BTreeMap::new(),
        }
    }

    /// Number of (user, piece) releases.
    pub fn propagated_count(&self) -> usize {
        self.propagating.values().map(Vec::len).sum()
    }

    /// Number of users that released something.
    pub fn propagating_users(&self) -> usize {
        self.propagating.len()
    }

    /// Number of first-time (user, piece) exposures.
    pub fn new_count(&self) -> usize {
        self.receiving.values().map(BTreeMap::len).sum()
    }

    /// Number of repeated (user, piece) exposures.
    pub fn repeated_count(&self) -> usize {
        self.rereceiving.values().map(BTreeMap::len).sum()
    }

    /// Number of (user, piece) expirations.
    pub fn discarded_count(&self) -> usize {
        self.discarding.values().map(Vec::len).sum()
    }

    /// Whether nothing happened at all.
    pub fn is_idle(&self) -> bool {
        self.propagating.is_empty()
            && self.receiving.is_empty()
            && self.rereceiving.is_empty()
            && self.discarding.is_empty()
    }
}
