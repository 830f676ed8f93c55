//! The phased iteration loop.
//!
//! Each call to [`DiffusionSimulator::run_iteration`] runs one synchronous
//! step of the diffusion:
//!
//! 1. **Select** -- every user picks what it releases, in parallel.
//! 2. **Plan** -- partner policies draw this iteration's partners.
//! 3. **Deliver** -- every sender's records are addressed to its receivers
//!    and merged into per-receiver inboxes by piece.
//! 4. **Commit** -- per user, in parallel: selected pieces move to
//!    `propagated`, stale received pieces expire, the inbox passes through
//!    sight and the survivors are merged by the update policy.
//!
//! Nothing delivered in an iteration can be selected before the next one.
//! Selections are checked against the pieces each user holds and every
//! delivery is addressed before the commit phase touches any user, so a
//! failed iteration leaves the state as it was.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use ripple_graph::{Data, GraphError};
use ripple_types::{InfoId, UserId};
use tracing::{debug, info};

use crate::iteration::Iteration;
use crate::mechanisms::{
    ArrivalKind, IterationContext, PropagationPlan, PropagationState, Selection, SightCache,
};
use crate::protocol::Protocol;
use crate::random::{Stream, stream_rng};
use crate::state::{PropagatedInformation, SimulationState, UserState};
use crate::stop::Progress;

/// Errors that can occur while running an iteration.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// A user selected a piece it does not hold.
    #[error("user {user} selected {info}, which it does not hold")]
    NotHeld {
        /// The selecting user.
        user: UserId,
        /// The selected piece.
        info: InfoId,
    },

    /// A policy addressed a user missing from the state.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// A policy referenced data that does not exist.
    #[error("data error: {source}")]
    Data {
        /// The underlying data error.
        #[from]
        source: GraphError,
    },
}

/// Changes one user went through during the commit phase.
#[derive(Debug)]
struct UserDelta {
    user: UserId,
    propagated: Vec<InfoId>,
    discarded: Vec<InfoId>,
    new: BTreeMap<InfoId, BTreeSet<UserId>>,
    repeated: BTreeMap<InfoId, BTreeSet<UserId>>,
}

/// Runs a [`Protocol`] over a [`Data`] instance one iteration at a time.
#[derive(Debug)]
pub struct DiffusionSimulator {
    protocol: Protocol,
    data: Arc<Data>,
    state: SimulationState,
    sight_cache: SightCache,
    propagation_state: PropagationState,
    seed: u64,
    progress: Progress,
}

impl DiffusionSimulator {
    /// Seed the state from `data` and prepare the policies' per-run state.
    pub fn new(protocol: Protocol, data: Arc<Data>, seed: u64) -> Self {
        let state = SimulationState::from_data(&data);
        let sight_cache = protocol.sight().reset_selections(&data);
        let propagation_state = protocol.propagation().init_state(&data);
        let progress = Progress {
            next_timestamp: data.timestamp_at(0),
            ..Progress::default()
        };
        info!(
            users = data.user_count(),
            pieces = data.piece_count(),
            seed,
            "Simulator initialized"
        );
        Self {
            protocol,
            data,
            state,
            sight_cache,
            propagation_state,
            seed,
            progress,
        }
    }

    /// The protocol being run.
    pub const fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// The simulation input.
    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Current state.
    pub const fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Running summary of completed iterations.
    pub const fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Whether another iteration could still change anything.
    ///
    /// Policies that re-release propagated pieces never quiesce.
    pub fn is_quiescent(&self) -> bool {
        !self.protocol.selection().repropagates() && self.state.is_quiescent()
    }

    /// Run one iteration and return what changed.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if a policy breaks a state invariant. User
    /// state is left untouched in that case.
    pub fn run_iteration(&mut self) -> Result<Iteration, SimulationError> {
        let iteration = self.state.iteration();
        let timestamp = self.data.timestamp_at(iteration);
        let ctx = IterationContext {
            data: &self.data,
            iteration,
            timestamp,
        };
        debug!(iteration, ?timestamp, "Iteration started");

        let selections = phase_select(&self.protocol, &self.state, &ctx, self.seed)?;
        check_selections(&self.state, &selections)?;

        let plan = self.protocol.propagation().plan_iteration(
            &mut self.propagation_state,
            ctx.data,
            self.seed,
            iteration,
        );

        let inboxes = phase_deliver(&self.protocol, &self.state, &ctx, &plan, &selections)?;
        debug!(
            iteration,
            senders = selections.len(),
            receivers = inboxes.len(),
            "Deliveries merged"
        );

        let deltas = phase_commit(
            &self.protocol,
            &self.sight_cache,
            &mut self.state,
            &ctx,
            self.seed,
            &selections,
            inboxes,
        )?;
        self.state.advance();

        let record = assemble(iteration, timestamp, deltas);
        self.progress
            .record(&record, self.data.timestamp_at(self.state.iteration()));
        info!(
            iteration,
            propagated = record.propagated_count(),
            new = record.new_count(),
            repeated = record.repeated_count(),
            discarded = record.discarded_count(),
            "Iteration completed"
        );
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Phase 1: every user picks its releases.
fn phase_select(
    protocol: &Protocol,
    state: &SimulationState,
    ctx: &IterationContext<'_>,
    seed: u64,
) -> Result<BTreeMap<UserId, Selection>, SimulationError> {
    let mut selections: BTreeMap<UserId, Selection> = state
        .user_map()
        .par_iter()
        .map(|(id, user)| -> Result<(UserId, Selection), SimulationError> {
            let mut rng = stream_rng(seed, ctx.iteration, *id, Stream::Selection);
            let selection = protocol.selection().select(user, ctx, &mut rng)?;
            Ok((*id, selection))
        })
        .collect::<Result<BTreeMap<_, _>, SimulationError>>()?;
    selections.retain(|_, s| !s.is_empty());
    Ok(selections)
}

/// Reject selections naming a missing user or a piece the user does not hold.
fn check_selections(
    state: &SimulationState,
    selections: &BTreeMap<UserId, Selection>,
) -> Result<(), SimulationError> {
    for (sender, selection) in selections {
        let user = state
            .user(*sender)
            .ok_or(SimulationError::UnknownUser(*sender))?;
        if let Some(info) = selection.ids().find(|id| !user.holds(*id)) {
            return Err(SimulationError::NotHeld {
                user: *sender,
                info,
            });
        }
    }
    Ok(())
}

/// Phase 3: address every sender's records and merge them per receiver.
///
/// Receivers are accumulated concurrently, one map entry per receiver.
fn phase_deliver(
    protocol: &Protocol,
    state: &SimulationState,
    ctx: &IterationContext<'_>,
    plan: &PropagationPlan,
    selections: &BTreeMap<UserId, Selection>,
) -> Result<BTreeMap<UserId, Vec<PropagatedInformation>>, SimulationError> {
    let inboxes: DashMap<UserId, BTreeMap<InfoId, PropagatedInformation>> = DashMap::new();

    selections
        .par_iter()
        .try_for_each(|(sender, selection)| -> Result<(), SimulationError> {
            let user = state
                .user(*sender)
                .ok_or(SimulationError::UnknownUser(*sender))?;
            let records = selection.records(*sender, ctx.iteration);
            let outgoing = protocol
                .propagation()
                .propagate(plan, ctx.data, user, &records);
            for (target, batch) in outgoing {
                if state.user(target).is_none() {
                    return Err(SimulationError::UnknownUser(target));
                }
                let mut inbox = inboxes.entry(target).or_default();
                for record in batch {
                    inbox
                        .entry(record.info_id)
                        .and_modify(|held| held.absorb(&record))
                        .or_insert(record);
                }
            }
            Ok(())
        })?;

    Ok(inboxes
        .into_iter()
        .map(|(user, inbox)| (user, inbox.into_values().collect()))
        .collect())
}

/// Phase 4: apply releases, expiration, sight and update to every user.
fn phase_commit(
    protocol: &Protocol,
    cache: &SightCache,
    state: &mut SimulationState,
    ctx: &IterationContext<'_>,
    seed: u64,
    selections: &BTreeMap<UserId, Selection>,
    mut inboxes: BTreeMap<UserId, Vec<PropagatedInformation>>,
) -> Result<Vec<UserDelta>, SimulationError> {
    let work: Vec<(&mut UserState, Option<&Selection>, Vec<PropagatedInformation>)> = state
        .user_map_mut()
        .iter_mut()
        .map(|(id, user)| (user, selections.get(id), inboxes.remove(id).unwrap_or_default()))
        .collect();

    work.into_par_iter()
        .map(|(user, selection, inbox)| commit_user(protocol, cache, ctx, seed, user, selection, inbox))
        .collect()
}

fn commit_user(
    protocol: &Protocol,
    cache: &SightCache,
    ctx: &IterationContext<'_>,
    seed: u64,
    user: &mut UserState,
    selection: Option<&Selection>,
    inbox: Vec<PropagatedInformation>,
) -> Result<UserDelta, SimulationError> {
    let id = user.user();

    let mut propagated = Vec::new();
    if let Some(selection) = selection {
        for record in selection.records(id, ctx.iteration) {
            let info = record.info_id;
            if !user.mark_propagated(record) {
                return Err(SimulationError::NotHeld { user: id, info });
            }
            propagated.push(info);
        }
    }

    let expired = protocol.expiration().expire(user, ctx);
    let discarded = user.discard(&expired);

    let mut new = BTreeMap::new();
    let mut repeated = BTreeMap::new();
    if !inbox.is_empty() {
        let mut rng = stream_rng(seed, ctx.iteration, id, Stream::Sight);
        let seen = protocol.sight().sees(cache, user, inbox, &mut rng);
        for arrival in protocol.update().update(user, seen) {
            match arrival.kind {
                ArrivalKind::New => {
                    new.insert(arrival.info_id, arrival.creators);
                }
                ArrivalKind::Repeated => {
                    repeated.insert(arrival.info_id, arrival.creators);
                }
                ArrivalKind::Ignored => {}
            }
        }
    }

    Ok(UserDelta {
        user: id,
        propagated,
        discarded,
        new,
        repeated,
    })
}

/// Fold per-user deltas into the iteration record, skipping idle users.
fn assemble(number: u64, timestamp: Option<i64>, deltas: Vec<UserDelta>) -> Iteration {
    let mut record = Iteration::new(number, timestamp);
    for delta in deltas {
        if !delta.propagated.is_empty() {
            record.propagating.insert(delta.user, delta.propagated);
        }
        if !delta.discarded.is_empty() {
            record.discarding.insert(delta.user, delta.discarded);
        }
        if !delta.new.is_empty() {
            record.receiving.insert(delta.user, delta.new);
        }
        if !delta.repeated.is_empty() {
            record.rereceiving.insert(delta.user, delta.repeated);
        }
    }
    record
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ripple_graph::DataBuilder;
    use ripple_types::{EdgeKind, InformationPiece, Orientation};

    use super::*;
    use crate::mechanisms::{
        ExpirationMechanism, Limit, PropagationMechanism, SelectionMechanism, SightMechanism,
        UpdateMechanism,
    };

    fn uid(n: u32) -> UserId {
        UserId::new(n)
    }

    /// Users 1 and 2 follow user 0, who authored piece 7.
    fn make_data() -> Arc<Data> {
        let mut b = DataBuilder::new();
        for n in 0..3 {
            b.add_user(uid(n)).unwrap();
        }
        b.add_edge(uid(1), uid(0), 1.0, EdgeKind::Regular).unwrap();
        b.add_edge(uid(2), uid(0), 1.0, EdgeKind::Regular).unwrap();
        b.add_piece(InformationPiece {
            id: InfoId::new(7),
            creator: uid(0),
            timestamp: 0,
        });
        Arc::new(b.build().unwrap())
    }

    fn make_protocol() -> Protocol {
        Protocol::new(
            SelectionMechanism::count(Limit::All, Limit::All, Limit::NONE),
            ExpirationMechanism::AllNotPropagated,
            UpdateMechanism::Newest,
            PropagationMechanism::AllFollowers,
            SightMechanism::AllNotPropagated,
        )
        .unwrap()
    }

    #[test]
    fn first_iteration_reaches_followers() {
        let mut sim = DiffusionSimulator::new(make_protocol(), make_data(), 42);
        let record = sim.run_iteration().unwrap();

        assert_eq!(record.number, 0);
        assert_eq!(record.propagating.get(&uid(0)), Some(&vec![InfoId::new(7)]));
        assert_eq!(record.new_count(), 2);
        let follower = sim.state().user(uid(1)).unwrap();
        assert!(follower.contains_received(InfoId::new(7)));
        assert!(sim.state().user(uid(0)).unwrap().contains_propagated(InfoId::new(7)));
        assert_eq!(sim.state().iteration(), 1);
        assert_eq!(sim.progress().total_propagated, 1);
    }

    #[test]
    fn followers_without_followers_expire_and_quiesce() {
        let mut sim = DiffusionSimulator::new(make_protocol(), make_data(), 42);
        sim.run_iteration().unwrap();
        assert!(!sim.is_quiescent());

        // Users 1 and 2 forward to nobody; their copy still counts as released.
        let record = sim.run_iteration().unwrap();
        assert_eq!(record.propagated_count(), 2);
        assert_eq!(record.new_count(), 0);
        assert!(sim.is_quiescent());
        for user in sim.state().users() {
            assert!(user.is_consistent());
        }
    }

    #[test]
    fn same_seed_same_run() {
        let protocol = Protocol::new(
            SelectionMechanism::count(Limit::AtMost(1), Limit::AtMost(1), Limit::NONE),
            ExpirationMechanism::Never,
            UpdateMechanism::Older,
            PropagationMechanism::Push {
                num_wait: 1,
                orientation: Orientation::In,
            },
            SightMechanism::Count { num_sight: 1 },
        )
        .unwrap();
        let data = make_data();
        let mut a = DiffusionSimulator::new(protocol.clone(), Arc::clone(&data), 9);
        let mut b = DiffusionSimulator::new(protocol, data, 9);
        for _ in 0..4 {
            assert_eq!(a.run_iteration().unwrap(), b.run_iteration().unwrap());
        }
        assert_eq!(a.state(), b.state());
    }

    fn forged_selection() -> BTreeMap<UserId, Selection> {
        // User 1 never authored or received piece 7.
        BTreeMap::from([(
            uid(1),
            Selection {
                own: vec![InfoId::new(7)],
                ..Selection::default()
            },
        )])
    }

    #[test]
    fn selections_of_unheld_pieces_are_rejected() {
        let data = make_data();
        let state = SimulationState::from_data(&data);
        let err = check_selections(&state, &forged_selection()).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::NotHeld { user, info } if user == uid(1) && info == InfoId::new(7)
        ));

        let stranger = BTreeMap::from([(uid(9), Selection::default())]);
        assert!(matches!(
            check_selections(&state, &stranger),
            Err(SimulationError::UnknownUser(u)) if u == uid(9)
        ));
    }

    #[test]
    fn commit_refuses_to_release_unheld_pieces() {
        let data = make_data();
        let protocol = make_protocol();
        let cache = protocol.sight().reset_selections(&data);
        let ctx = IterationContext {
            data: &data,
            iteration: 0,
            timestamp: data.timestamp_at(0),
        };
        let selections = forged_selection();
        let mut user = UserState::new(uid(1), []);
        let err = commit_user(
            &protocol,
            &cache,
            &ctx,
            0,
            &mut user,
            selections.get(&uid(1)),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SimulationError::NotHeld { user, .. } if user == uid(1)));
        assert!(user.propagated().is_empty());
    }

    #[test]
    fn deliveries_to_unknown_users_fail() {
        let data = make_data();
        let protocol = make_protocol();
        let state = SimulationState::from_data(&data);
        let ctx = IterationContext {
            data: &data,
            iteration: 0,
            timestamp: data.timestamp_at(0),
        };
        let selections = BTreeMap::from([(
            uid(0),
            Selection {
                own: vec![InfoId::new(7)],
                ..Selection::default()
            },
        )]);
        let plan = PropagationPlan::Partners(BTreeMap::from([(
            uid(0),
            BTreeSet::from([uid(9)]),
        )]));
        let err = phase_deliver(&protocol, &state, &ctx, &plan, &selections).unwrap_err();
        assert!(matches!(err, SimulationError::UnknownUser(u) if u == uid(9)));
    }

    #[test]
    fn failed_iteration_leaves_state_untouched() {
        let mut sim = DiffusionSimulator::new(make_protocol(), make_data(), 42);
        // User 0 still broadcasts to follower 1, who is gone from the state.
        sim.state.user_map_mut().remove(&uid(1));
        let before = sim.state().clone();

        let err = sim.run_iteration().unwrap_err();
        assert!(matches!(err, SimulationError::UnknownUser(u) if u == uid(1)));
        assert_eq!(sim.state(), &before);
        assert_eq!(sim.state().iteration(), 0);
        assert_eq!(sim.progress().total_propagated, 0);
    }
}
