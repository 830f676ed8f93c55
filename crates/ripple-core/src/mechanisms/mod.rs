//! The five policy families a [`Protocol`](crate::Protocol) is built from.
//!
//! Each family is a plain enum of concrete policies dispatched by `match`.
//! Policy values hold configuration only; any per-run state they need
//! (the sight cache, the push/pull rotation windows) is produced by an
//! explicit init step and owned by the simulator.
//!
//! # Modules
//!
//! - [`selection`] -- What each user releases this iteration
//! - [`expiration`] -- Which received pieces are dropped
//! - [`update`] -- How repeated arrivals merge into `received`
//! - [`propagation`] -- Who receives what a user releases
//! - [`sight`] -- Which arrivals a user actually notices

pub mod expiration;
pub mod propagation;
pub mod selection;
pub mod sight;
pub mod update;

use rand::Rng;
use ripple_graph::Data;
use serde::Deserialize;

use crate::protocol::ProtocolError;

pub use expiration::ExpirationMechanism;
pub use propagation::{PropagationMechanism, PropagationPlan, PropagationState};
pub use selection::{Selection, SelectionMechanism};
pub use sight::{SightCache, SightMechanism};
pub use update::{Arrival, ArrivalKind, UpdateMechanism};

/// Read-only view of the iteration being computed, shared by all workers.
#[derive(Debug, Clone, Copy)]
pub struct IterationContext<'a> {
    /// The simulation input.
    pub data: &'a Data,
    /// Index of the current iteration.
    pub iteration: u64,
    /// Ground-truth timestamp mapped to the iteration, `None` past the timeline.
    pub timestamp: Option<i64>,
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Upper bound on how many candidates a policy may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "CountSpec")]
pub enum Limit {
    /// No bound.
    All,
    /// At most this many.
    AtMost(u32),
}

impl Limit {
    /// A limit of zero, which disables the channel it is applied to.
    pub const NONE: Self = Self::AtMost(0);

    /// Whether the limit can never select anything.
    pub const fn is_none(self) -> bool {
        matches!(self, Self::AtMost(0))
    }
}

/// Count as written in configuration: `all` or an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CountSpec {
    /// The `all` keyword.
    Keyword(CountKeyword),
    /// An explicit count, validated to be non-negative.
    Number(i64),
}

/// Keywords accepted in place of a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountKeyword {
    /// Unbounded.
    All,
}

impl TryFrom<CountSpec> for Limit {
    type Error = ProtocolError;

    fn try_from(spec: CountSpec) -> Result<Self, Self::Error> {
        match spec {
            CountSpec::Keyword(CountKeyword::All) => Ok(Self::All),
            CountSpec::Number(value) => u32::try_from(value)
                .ok()
                .map(Self::AtMost)
                .ok_or(ProtocolError::InvalidCount { value }),
        }
    }
}

/// Pick up to `limit` candidates uniformly at random without replacement.
///
/// When the pool is not larger than the limit every candidate is returned,
/// in pool order.
pub(crate) fn choose_up_to<T: Copy>(candidates: &[T], limit: Limit, rng: &mut impl Rng) -> Vec<T> {
    let wanted = match limit {
        Limit::All => return candidates.to_vec(),
        Limit::AtMost(n) => usize::try_from(n).unwrap_or(usize::MAX),
    };
    if candidates.len() <= wanted {
        return candidates.to_vec();
    }
    rand::seq::index::sample(rng, candidates.len(), wanted)
        .into_iter()
        .filter_map(|i| candidates.get(i).copied())
        .collect()
}
