//! Selection policies: what each user releases in an iteration.
//!
//! A [`SelectionMechanism`] is composed of three independent sub-selectors
//! whose picks are concatenated:
//!
//! - [`OwnSelector`]: which authored pieces are released
//! - [`ReceivedSelector`]: which received pieces are forwarded
//! - [`RepropagateSelector`]: which already-propagated pieces are re-released
//!
//! Any combination is valid; the named constructors cover the classic
//! policies (count, threshold cascade, timestamp replay, independent cascade).

use rand::Rng;
use ripple_graph::{GraphError, SocialGraph};
use ripple_types::{InfoId, Orientation, UserId};
use serde::Deserialize;

use crate::mechanisms::{IterationContext, Limit, choose_up_to};
use crate::protocol::{ProtocolError, check_probability};
use crate::state::{PropagatedInformation, UserState};

// ---------------------------------------------------------------------------
// Sub-selectors
// ---------------------------------------------------------------------------

/// Release rule for authored pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OwnSelector {
    /// Never release own pieces.
    #[default]
    None,
    /// Release up to `limit` own pieces chosen uniformly at random.
    Count {
        /// Maximum number of pieces per iteration.
        limit: Limit,
    },
    /// Release up to `limit` own pieces, oldest timestamp first.
    OldestFirst {
        /// Maximum number of pieces per iteration.
        limit: Limit,
    },
    /// Release every own piece whose timestamp has been reached.
    AtTimestamp,
}

/// Forwarding rule for received pieces.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReceivedSelector {
    /// Never forward received pieces.
    #[default]
    None,
    /// Forward up to `limit` received pieces chosen uniformly at random.
    Count {
        /// Maximum number of pieces per iteration.
        limit: Limit,
    },
    /// Forward pieces received from at least `threshold` distinct neighbors.
    Threshold {
        /// Maximum number of pieces per iteration.
        limit: Limit,
        /// Minimum number of informing neighbors.
        threshold: u32,
        /// Neighborhood in which informing creators are counted.
        orientation: Orientation,
    },
    /// Forward pieces the ground truth says this user re-shared, once the
    /// current timestamp has reached the recorded re-share.
    GroundTruth {
        /// Maximum number of pieces per iteration.
        limit: Limit,
    },
    /// Forward a piece if any of its creators activates the user.
    Cascade {
        /// Activation probability per creator.
        probability: CascadeProbability,
    },
}

/// Re-release rule for already-propagated pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepropagateSelector {
    /// Never re-release.
    #[default]
    None,
    /// Re-release up to `limit` propagated pieces chosen uniformly at random.
    Count {
        /// Maximum number of pieces per iteration.
        limit: Limit,
    },
}

/// Activation probability of an independent cascade.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CascadeProbability {
    /// The same probability for every creator.
    Fixed {
        /// Probability in `[0, 1]`.
        value: f64,
    },
    /// The weight of the edge linking creator and receiver.
    ///
    /// `In` reads the edge creator -> receiver, `Out` the edge
    /// receiver -> creator; `Und` and `Mutual` draw once per existing edge.
    EdgeWeight {
        /// Which edge to read.
        orientation: Orientation,
    },
}

// ---------------------------------------------------------------------------
// Selection result
// ---------------------------------------------------------------------------

/// Pieces a user releases in one iteration, by channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Authored pieces released for the first time.
    pub own: Vec<InfoId>,
    /// Received pieces forwarded.
    pub received: Vec<InfoId>,
    /// Already-propagated pieces released again.
    pub repropagated: Vec<InfoId>,
}

impl Selection {
    /// Whether nothing was selected.
    pub const fn is_empty(&self) -> bool {
        self.own.is_empty() && self.received.is_empty() && self.repropagated.is_empty()
    }

    /// Total number of selected pieces.
    pub const fn len(&self) -> usize {
        self.own
            .len()
            .saturating_add(self.received.len())
            .saturating_add(self.repropagated.len())
    }

    /// All selected IDs, channel by channel.
    pub fn ids(&self) -> impl Iterator<Item = InfoId> + '_ {
        self.own
            .iter()
            .chain(&self.received)
            .chain(&self.repropagated)
            .copied()
    }

    /// The records `sender` emits for this selection at `iteration`.
    pub fn records(&self, sender: UserId, iteration: u64) -> Vec<PropagatedInformation> {
        self.ids()
            .map(|id| PropagatedInformation::new(id, iteration, sender))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SelectionMechanism
// ---------------------------------------------------------------------------

/// A selection policy composed of three sub-selectors.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SelectionMechanism {
    /// Own-piece release.
    #[serde(default)]
    pub own: OwnSelector,
    /// Received-piece forwarding.
    #[serde(default)]
    pub received: ReceivedSelector,
    /// Propagated-piece re-release.
    #[serde(default)]
    pub repropagate: RepropagateSelector,
}

impl SelectionMechanism {
    /// Compose a selection policy from its three channels.
    pub const fn new(
        own: OwnSelector,
        received: ReceivedSelector,
        repropagate: RepropagateSelector,
    ) -> Self {
        Self {
            own,
            received,
            repropagate,
        }
    }

    /// Random release of up to `num_own` own and `num_rec` received pieces,
    /// plus up to `num_repr` re-releases.
    pub const fn count(num_own: Limit, num_rec: Limit, num_repr: Limit) -> Self {
        Self::new(
            OwnSelector::Count { limit: num_own },
            ReceivedSelector::Count { limit: num_rec },
            RepropagateSelector::Count { limit: num_repr },
        )
    }

    /// Count selection whose received channel only forwards pieces that
    /// reached the user through at least `threshold` neighbors.
    pub const fn limited_count_threshold(
        num_own: Limit,
        num_rec: Limit,
        threshold: u32,
        orientation: Orientation,
    ) -> Self {
        Self::new(
            OwnSelector::Count { limit: num_own },
            ReceivedSelector::Threshold {
                limit: num_rec,
                threshold,
                orientation,
            },
            RepropagateSelector::None,
        )
    }

    /// Replay own pieces at their timestamps, never forward.
    pub const fn timestamp_pure() -> Self {
        Self::new(
            OwnSelector::AtTimestamp,
            ReceivedSelector::None,
            RepropagateSelector::None,
        )
    }

    /// Replay own pieces at their timestamps and forward up to `num_rec`
    /// received pieces the ground truth says the user re-shared.
    pub const fn timestamp_loose(num_rec: Limit) -> Self {
        Self::new(
            OwnSelector::AtTimestamp,
            ReceivedSelector::GroundTruth { limit: num_rec },
            RepropagateSelector::None,
        )
    }

    /// Oldest-first release of own pieces, random forwarding of received ones.
    pub const fn timestamp_ordered(num_own: Limit, num_rec: Limit) -> Self {
        Self::new(
            OwnSelector::OldestFirst { limit: num_own },
            ReceivedSelector::Count { limit: num_rec },
            RepropagateSelector::None,
        )
    }

    /// Independent cascade: own pieces by count, each received piece
    /// forwarded once if a creator activates the user.
    pub const fn independent_cascade(
        num_own: Limit,
        probability: CascadeProbability,
        num_repr: Limit,
    ) -> Self {
        Self::new(
            OwnSelector::Count { limit: num_own },
            ReceivedSelector::Cascade { probability },
            RepropagateSelector::Count { limit: num_repr },
        )
    }

    /// Reject unusable parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidThreshold`] for a zero threshold or
    /// [`ProtocolError::InvalidProbability`] for a fixed cascade probability
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match &self.received {
            ReceivedSelector::Threshold { threshold: 0, .. } => {
                Err(ProtocolError::InvalidThreshold { threshold: 0 })
            }
            ReceivedSelector::Cascade {
                probability: CascadeProbability::Fixed { value },
            } => check_probability("cascade probability", *value),
            _ => Ok(()),
        }
    }

    /// Whether the policy may re-release propagated pieces, in which case
    /// users can keep emitting after their candidates run out.
    pub const fn repropagates(&self) -> bool {
        match self.repropagate {
            RepropagateSelector::None => false,
            RepropagateSelector::Count { limit } => !limit.is_none(),
        }
    }

    /// Choose what `user` releases this iteration.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownPiece`] if an own piece is missing from
    /// the data.
    pub fn select(
        &self,
        user: &UserState,
        ctx: &IterationContext<'_>,
        rng: &mut impl Rng,
    ) -> Result<Selection, GraphError> {
        Ok(Selection {
            own: self.select_own(user, ctx, rng)?,
            received: self.select_received(user, ctx, rng),
            repropagated: self.select_repropagated(user, rng),
        })
    }

    fn select_own(
        &self,
        user: &UserState,
        ctx: &IterationContext<'_>,
        rng: &mut impl Rng,
    ) -> Result<Vec<InfoId>, GraphError> {
        match &self.own {
            OwnSelector::None => Ok(Vec::new()),
            OwnSelector::Count { limit } => {
                let pool: Vec<InfoId> = user.own().iter().copied().collect();
                Ok(choose_up_to(&pool, *limit, rng))
            }
            OwnSelector::OldestFirst { limit } => {
                let mut dated = Vec::with_capacity(user.own().len());
                for id in user.own() {
                    dated.push((ctx.data.piece(*id)?.timestamp, *id));
                }
                dated.sort_unstable();
                let take = match limit {
                    Limit::All => dated.len(),
                    Limit::AtMost(n) => usize::try_from(*n).unwrap_or(usize::MAX),
                };
                Ok(dated.into_iter().take(take).map(|(_, id)| id).collect())
            }
            OwnSelector::AtTimestamp => {
                let Some(now) = ctx.timestamp else {
                    return Ok(Vec::new());
                };
                let mut due = Vec::new();
                for id in user.own() {
                    if ctx.data.piece(*id)?.timestamp <= now {
                        due.push(*id);
                    }
                }
                Ok(due)
            }
        }
    }

    fn select_received(
        &self,
        user: &UserState,
        ctx: &IterationContext<'_>,
        rng: &mut impl Rng,
    ) -> Vec<InfoId> {
        let graph = ctx.data.graph();
        match &self.received {
            ReceivedSelector::None => Vec::new(),
            ReceivedSelector::Count { limit } => {
                let pool: Vec<InfoId> = user.received().keys().copied().collect();
                choose_up_to(&pool, *limit, rng)
            }
            ReceivedSelector::Threshold {
                limit,
                threshold,
                orientation,
            } => {
                let needed = usize::try_from(*threshold).unwrap_or(usize::MAX);
                let pool: Vec<InfoId> = user
                    .received()
                    .values()
                    .filter(|r| {
                        r.creators
                            .iter()
                            .filter(|c| graph.is_neighbor(user.user(), **c, *orientation))
                            .count()
                            >= needed
                    })
                    .map(|r| r.info_id)
                    .collect();
                choose_up_to(&pool, *limit, rng)
            }
            ReceivedSelector::GroundTruth { limit } => {
                let pool: Vec<InfoId> = user
                    .received()
                    .keys()
                    .copied()
                    .filter(|id| {
                        ctx.data
                            .real_propagation(user.user(), *id)
                            .zip(ctx.timestamp)
                            .is_some_and(|(real, now)| real <= now)
                    })
                    .collect();
                choose_up_to(&pool, *limit, rng)
            }
            ReceivedSelector::Cascade { probability } => user
                .received()
                .values()
                .filter(|r| activates(*probability, graph, user.user(), r, rng))
                .map(|r| r.info_id)
                .collect(),
        }
    }

    fn select_repropagated(&self, user: &UserState, rng: &mut impl Rng) -> Vec<InfoId> {
        match &self.repropagate {
            RepropagateSelector::None => Vec::new(),
            RepropagateSelector::Count { limit } => {
                let pool: Vec<InfoId> = user.propagated().keys().copied().collect();
                choose_up_to(&pool, *limit, rng)
            }
        }
    }
}

/// One Bernoulli trial per creator (per edge for weighted rules); the
/// user is activated if any trial succeeds.
fn activates(
    probability: CascadeProbability,
    graph: &SocialGraph,
    user: UserId,
    record: &PropagatedInformation,
    rng: &mut impl Rng,
) -> bool {
    record.creators.iter().any(|creator| match probability {
        CascadeProbability::Fixed { value } => rng.random::<f64>() < value,
        CascadeProbability::EdgeWeight { orientation } => {
            let incoming = graph.edge_weight(*creator, user);
            let outgoing = graph.edge_weight(user, *creator);
            let weights = match orientation {
                Orientation::In => [incoming, None],
                Orientation::Out => [outgoing, None],
                Orientation::Und | Orientation::Mutual => [incoming, outgoing],
            };
            weights
                .into_iter()
                .flatten()
                .any(|w| rng.random::<f64>() < w.clamp(0.0, 1.0))
        }
    })
}
