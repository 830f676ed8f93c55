//! Propagation policies: who receives what a user releases.
//!
//! This is the only policy family that reads the graph topology to pick
//! receivers. Broadcast policies send to a whole neighborhood. Partner
//! policies (push, pull, pull-push) pair every user with one neighbor per
//! iteration, drawn from a per-user rotation window so that a partner is not
//! picked again within `num_wait` iterations. The windows live in a
//! [`PropagationState`] owned by the simulator; the policy value itself is
//! immutable and shared by all workers.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;
use rand::seq::IndexedRandom;
use rayon::prelude::*;
use ripple_graph::Data;
use ripple_types::{Orientation, UserId};
use serde::Deserialize;
use tracing::debug;

use crate::random::{Stream, stream_rng};
use crate::state::{PropagatedInformation, UserState};

/// Receiver-choice rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropagationMechanism {
    /// Send to every neighbor along `orientation`.
    AllNeighbors {
        /// Neighborhood to broadcast to.
        orientation: Orientation,
    },
    /// Send to every follower (users with an edge into the sender).
    AllFollowers,
    /// Each user sends its selection to one partner it picks.
    Push {
        /// Iterations before a partner may be picked again.
        num_wait: u32,
        /// Neighborhood partners are drawn from.
        orientation: Orientation,
    },
    /// Each user picks one partner, which sends its selection to the picker.
    Pull {
        /// Iterations before a partner may be picked again.
        num_wait: u32,
        /// Neighborhood partners are drawn from.
        orientation: Orientation,
    },
    /// Push and pull with the same partner every iteration.
    PullPush {
        /// Iterations before a partner may be picked again.
        num_wait: u32,
        /// Neighborhood partners are drawn from.
        #[serde(default = "default_pull_push_orientation")]
        orientation: Orientation,
    },
}

const fn default_pull_push_orientation() -> Orientation {
    Orientation::Und
}

/// Rotation window of recently picked partners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartnerWindow {
    recent: VecDeque<Option<UserId>>,
}

impl PartnerWindow {
    /// Pick a candidate not in the window, then slide the window.
    ///
    /// Iterations without a pick still occupy a slot, so the window always
    /// spans the last `num_wait` iterations.
    pub fn pick(&mut self, candidates: &[UserId], num_wait: u32, rng: &mut impl Rng) -> Option<UserId> {
        let free: Vec<UserId> = candidates
            .iter()
            .copied()
            .filter(|c| !self.recent.contains(&Some(*c)))
            .collect();
        let chosen = free.choose(rng).copied();
        self.recent.push_back(chosen);
        let capacity = usize::try_from(num_wait).unwrap_or(usize::MAX);
        while self.recent.len() > capacity {
            self.recent.pop_front();
        }
        chosen
    }

    /// Partners currently blocked.
    pub fn blocked(&self) -> impl Iterator<Item = UserId> + '_ {
        self.recent.iter().flatten().copied()
    }
}

/// Per-run state of partner policies, one window per user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationState {
    windows: BTreeMap<UserId, PartnerWindow>,
}

impl PropagationState {
    /// Window of one user.
    pub fn window(&self, user: UserId) -> Option<&PartnerWindow> {
        self.windows.get(&user)
    }
}

/// Receivers decided for one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationPlan {
    /// Receivers follow from the graph alone.
    Broadcast,
    /// Receivers per sender, from this iteration's partner draws.
    Partners(BTreeMap<UserId, BTreeSet<UserId>>),
}

impl PropagationMechanism {
    /// Build the per-run state: a rotation window per user for partner
    /// policies, nothing for broadcasts.
    pub fn init_state(&self, data: &Data) -> PropagationState {
        let windows = match self {
            Self::AllNeighbors { .. } | Self::AllFollowers => BTreeMap::new(),
            Self::Push { .. } | Self::Pull { .. } | Self::PullPush { .. } => data
                .users()
                .map(|u| (u, PartnerWindow::default()))
                .collect(),
        };
        PropagationState { windows }
    }

    /// Draw this iteration's partners.
    ///
    /// Every user draws, whether or not it has anything to send, so windows
    /// advance uniformly and pulls by idle users still happen.
    pub fn plan_iteration(
        &self,
        state: &mut PropagationState,
        data: &Data,
        seed: u64,
        iteration: u64,
    ) -> PropagationPlan {
        let (num_wait, orientation, push, pull) = match self {
            Self::AllNeighbors { .. } | Self::AllFollowers => return PropagationPlan::Broadcast,
            Self::Push {
                num_wait,
                orientation,
            } => (*num_wait, *orientation, true, false),
            Self::Pull {
                num_wait,
                orientation,
            } => (*num_wait, *orientation, false, true),
            Self::PullPush {
                num_wait,
                orientation,
            } => (*num_wait, *orientation, true, true),
        };

        let picks: Vec<(UserId, Option<UserId>)> = state
            .windows
            .par_iter_mut()
            .map(|(user, window)| {
                let mut rng = stream_rng(seed, iteration, *user, Stream::Propagation);
                let candidates = data.graph().neighbors(*user, orientation);
                (*user, window.pick(&candidates, num_wait, &mut rng))
            })
            .collect();

        let mut targets: BTreeMap<UserId, BTreeSet<UserId>> = BTreeMap::new();
        for (user, partner) in picks {
            let Some(partner) = partner else { continue };
            if push {
                targets.entry(user).or_default().insert(partner);
            }
            if pull {
                targets.entry(partner).or_default().insert(user);
            }
        }
        debug!(iteration, senders = targets.len(), "Partners drawn");
        PropagationPlan::Partners(targets)
    }

    /// Receivers of `user` under this iteration's plan.
    pub fn targets(&self, plan: &PropagationPlan, data: &Data, user: UserId) -> Vec<UserId> {
        match plan {
            PropagationPlan::Partners(map) => map
                .get(&user)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default(),
            PropagationPlan::Broadcast => match self {
                Self::AllNeighbors { orientation } => data.graph().neighbors(user, *orientation),
                Self::AllFollowers => data.graph().in_neighbors(user).collect(),
                Self::Push { .. } | Self::Pull { .. } | Self::PullPush { .. } => Vec::new(),
            },
        }
    }

    /// Address the sender's selected records to its receivers.
    pub fn propagate(
        &self,
        plan: &PropagationPlan,
        data: &Data,
        sender: &UserState,
        selected: &[PropagatedInformation],
    ) -> BTreeMap<UserId, Vec<PropagatedInformation>> {
        if selected.is_empty() {
            return BTreeMap::new();
        }
        self.targets(plan, data, sender.user())
            .into_iter()
            .map(|target| (target, selected.to_vec()))
            .collect()
    }
}
