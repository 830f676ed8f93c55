//! Per-user information buckets and the global simulation state.
//!
//! Every user owns a [`UserState`] with four pairwise-disjoint buckets:
//!
//! - `own`: authored pieces not released yet
//! - `received`: pieces obtained from neighbors and not forwarded yet
//! - `propagated`: pieces already forwarded (append-only)
//! - `discarded`: received pieces that expired without being forwarded
//!
//! Only the simulator mutates these buckets, by applying the outputs of the
//! protocol's policies. [`SimulationState`] holds the iteration counter and
//! every user's state.

use std::collections::{BTreeMap, BTreeSet};

use ripple_graph::Data;
use ripple_types::{InfoId, UserId};
use serde::{Deserialize, Serialize};

use crate::mechanisms::update::{ArrivalKind, UpdateMechanism};

// ---------------------------------------------------------------------------
// PropagatedInformation
// ---------------------------------------------------------------------------

/// One logical piece inside a user's `received`, `propagated` or
/// `discarded` bucket, or in flight between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedInformation {
    /// The piece.
    pub info_id: InfoId,
    /// Iteration the record refers to (sent, first received, ...).
    pub iteration: u64,
    /// How many copies were received.
    pub received_times: u32,
    /// Users the copies came from.
    pub creators: BTreeSet<UserId>,
}

impl PropagatedInformation {
    /// A single copy of `info_id` sent by `creator` at `iteration`.
    pub fn new(info_id: InfoId, iteration: u64, creator: UserId) -> Self {
        Self {
            info_id,
            iteration,
            received_times: 1,
            creators: BTreeSet::from([creator]),
        }
    }

    /// Fold another copy of the same piece into this one.
    ///
    /// Counts add up, creators are united and the later iteration wins.
    /// The operation is commutative and associative, so inboxes can be
    /// accumulated in any order.
    pub fn absorb(&mut self, other: &Self) {
        self.received_times = self.received_times.saturating_add(other.received_times);
        self.creators.extend(other.creators.iter().copied());
        self.iteration = self.iteration.max(other.iteration);
    }
}

// ---------------------------------------------------------------------------
// UserState
// ---------------------------------------------------------------------------

/// Information held by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    user: UserId,
    own: BTreeSet<InfoId>,
    received: BTreeMap<InfoId, PropagatedInformation>,
    propagated: BTreeMap<InfoId, PropagatedInformation>,
    discarded: BTreeMap<InfoId, PropagatedInformation>,
    /// Every piece the user has ever held.
    seen: BTreeSet<InfoId>,
}

impl UserState {
    /// Create the state of `user` holding the given authored pieces.
    pub fn new(user: UserId, own: impl IntoIterator<Item = InfoId>) -> Self {
        let own: BTreeSet<InfoId> = own.into_iter().collect();
        Self {
            user,
            seen: own.clone(),
            own,
            received: BTreeMap::new(),
            propagated: BTreeMap::new(),
            discarded: BTreeMap::new(),
        }
    }

    /// The user this state belongs to.
    pub const fn user(&self) -> UserId {
        self.user
    }

    /// Authored pieces not released yet.
    pub const fn own(&self) -> &BTreeSet<InfoId> {
        &self.own
    }

    /// Received pieces awaiting a forwarding decision.
    pub const fn received(&self) -> &BTreeMap<InfoId, PropagatedInformation> {
        &self.received
    }

    /// Pieces already forwarded.
    pub const fn propagated(&self) -> &BTreeMap<InfoId, PropagatedInformation> {
        &self.propagated
    }

    /// Received pieces that expired.
    pub const fn discarded(&self) -> &BTreeMap<InfoId, PropagatedInformation> {
        &self.discarded
    }

    /// Every distinct piece the user has ever held.
    pub const fn seen(&self) -> &BTreeSet<InfoId> {
        &self.seen
    }

    /// Whether the user still authors an unreleased copy of `info`.
    pub fn contains_own(&self, info: InfoId) -> bool {
        self.own.contains(&info)
    }

    /// Whether `info` awaits a forwarding decision.
    pub fn contains_received(&self, info: InfoId) -> bool {
        self.received.contains_key(&info)
    }

    /// Whether the user already forwarded `info`.
    pub fn contains_propagated(&self, info: InfoId) -> bool {
        self.propagated.contains_key(&info)
    }

    /// Whether `info` expired in this user's hands.
    pub fn contains_discarded(&self, info: InfoId) -> bool {
        self.discarded.contains_key(&info)
    }

    /// Whether `info` can be released: own, received or already propagated.
    pub fn holds(&self, info: InfoId) -> bool {
        self.contains_own(info) || self.contains_received(info) || self.contains_propagated(info)
    }

    /// Whether the user still has own or received candidates.
    pub fn has_candidates(&self) -> bool {
        !self.own.is_empty() || !self.received.is_empty()
    }

    /// Move a selected piece into `propagated`.
    ///
    /// Own and received pieces move; pieces already propagated are left
    /// untouched (re-releases). Returns `false` when the user does not hold
    /// the piece at all.
    pub(crate) fn mark_propagated(&mut self, record: PropagatedInformation) -> bool {
        let id = record.info_id;
        if self.own.remove(&id) {
            self.propagated.insert(id, record);
            return true;
        }
        if let Some(previous) = self.received.remove(&id) {
            // Keep how the piece reached this user.
            self.propagated.insert(id, previous);
            return true;
        }
        self.propagated.contains_key(&id)
    }

    /// Move the given received pieces into `discarded`.
    ///
    /// IDs that are not in `received` are ignored. Returns the IDs that
    /// actually moved.
    pub(crate) fn discard(&mut self, ids: &BTreeSet<InfoId>) -> Vec<InfoId> {
        let mut moved = Vec::new();
        for id in ids {
            if let Some(record) = self.received.remove(id) {
                self.discarded.insert(*id, record);
                moved.push(*id);
            }
        }
        moved
    }

    /// Merge one newly seen record according to the update policy.
    pub(crate) fn receive(
        &mut self,
        record: PropagatedInformation,
        update: &UpdateMechanism,
    ) -> ArrivalKind {
        let id = record.info_id;
        if self.own.contains(&id) || self.propagated.contains_key(&id) {
            return ArrivalKind::Ignored;
        }

        if let Some(old) = self.received.get(&id) {
            let merged = update.update_received(old, record);
            self.received.insert(id, merged);
            return ArrivalKind::Repeated;
        }

        if let Some(old) = self.discarded.get(&id) {
            if let Some(restored) = update.update_discarded(old, record) {
                self.discarded.remove(&id);
                self.received.insert(id, restored);
            }
            return ArrivalKind::Repeated;
        }

        self.seen.insert(id);
        self.received.insert(id, record);
        ArrivalKind::New
    }

    /// Whether the four buckets are pairwise disjoint.
    pub fn is_consistent(&self) -> bool {
        let in_received = |id: &InfoId| self.received.contains_key(id);
        let in_propagated = |id: &InfoId| self.propagated.contains_key(id);
        let in_discarded = |id: &InfoId| self.discarded.contains_key(id);

        self.own
            .iter()
            .all(|id| !in_received(id) && !in_propagated(id) && !in_discarded(id))
            && self
                .received
                .keys()
                .all(|id| !in_propagated(id) && !in_discarded(id))
            && self.propagated.keys().all(|id| !in_discarded(id))
    }
}

// ---------------------------------------------------------------------------
// SimulationState
// ---------------------------------------------------------------------------

/// Iteration counter plus the state of every user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationState {
    iteration: u64,
    users: BTreeMap<UserId, UserState>,
}

impl SimulationState {
    /// Seed the state at iteration 0: every user owns what it authored.
    pub fn from_data(data: &Data) -> Self {
        let users = data
            .users()
            .map(|u| (u, UserState::new(u, data.authored_by(u))))
            .collect();
        Self { iteration: 0, users }
    }

    /// Index of the next iteration to run.
    pub const fn iteration(&self) -> u64 {
        self.iteration
    }

    /// State of one user.
    pub fn user(&self, user: UserId) -> Option<&UserState> {
        self.users.get(&user)
    }

    /// Iterate over all user states in ascending user order.
    pub fn users(&self) -> impl Iterator<Item = &UserState> {
        self.users.values()
    }

    /// Number of users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// No user retains any own or received candidate.
    pub fn is_quiescent(&self) -> bool {
        self.users.values().all(|u| !u.has_candidates())
    }

    pub(crate) const fn user_map(&self) -> &BTreeMap<UserId, UserState> {
        &self.users
    }

    pub(crate) const fn user_map_mut(&mut self) -> &mut BTreeMap<UserId, UserState> {
        &mut self.users
    }

    pub(crate) const fn advance(&mut self) {
        self.iteration = self.iteration.saturating_add(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn iid(n: u32) -> InfoId {
        InfoId::new(n)
    }

    fn uid(n: u32) -> UserId {
        UserId::new(n)
    }

    fn make_user() -> UserState {
        UserState::new(uid(0), [iid(1), iid(2)])
    }

    #[test]
    fn absorb_sums_and_unites() {
        let mut a = PropagatedInformation::new(iid(5), 3, uid(1));
        let b = PropagatedInformation::new(iid(5), 3, uid(2));
        a.absorb(&b);
        a.absorb(&PropagatedInformation::new(iid(5), 3, uid(2)));
        assert_eq!(a.received_times, 3);
        assert_eq!(a.creators.len(), 2);
        assert_eq!(a.iteration, 3);
    }

    #[test]
    fn own_release_moves_to_propagated() {
        let mut user = make_user();
        assert!(user.mark_propagated(PropagatedInformation::new(iid(1), 0, uid(0))));
        assert!(!user.contains_own(iid(1)));
        assert!(user.contains_propagated(iid(1)));
        // Re-releasing an already propagated piece is a no-op.
        assert!(user.mark_propagated(PropagatedInformation::new(iid(1), 1, uid(0))));
        // Unknown pieces are rejected.
        assert!(!user.mark_propagated(PropagatedInformation::new(iid(9), 0, uid(0))));
        assert!(user.is_consistent());
    }

    #[test]
    fn receive_classifies_arrivals() {
        let mut user = make_user();
        let update = UpdateMechanism::Newest;

        let own_copy = PropagatedInformation::new(iid(1), 0, uid(3));
        assert_eq!(user.receive(own_copy, &update), ArrivalKind::Ignored);

        let fresh = PropagatedInformation::new(iid(7), 0, uid(3));
        assert_eq!(user.receive(fresh.clone(), &update), ArrivalKind::New);
        assert_eq!(user.receive(fresh, &update), ArrivalKind::Repeated);
        assert_eq!(user.received().get(&iid(7)).unwrap().received_times, 2);
        assert_eq!(user.seen().len(), 3);
        assert!(user.is_consistent());
    }

    #[test]
    fn discarded_pieces_follow_update_policy() {
        let mut user = make_user();
        let record = PropagatedInformation::new(iid(7), 0, uid(3));
        user.receive(record.clone(), &UpdateMechanism::IndependentCascade);
        user.discard(&BTreeSet::from([iid(7)]));
        assert!(user.contains_discarded(iid(7)));

        let again = PropagatedInformation::new(iid(7), 2, uid(4));
        assert_eq!(
            user.receive(again.clone(), &UpdateMechanism::IndependentCascade),
            ArrivalKind::Repeated
        );
        assert!(user.contains_discarded(iid(7)));

        user.receive(again, &UpdateMechanism::Older);
        assert!(user.contains_received(iid(7)));
        assert!(!user.contains_discarded(iid(7)));
        let restored = user.received().get(&iid(7)).unwrap();
        assert_eq!(restored.iteration, 0);
        assert_eq!(restored.received_times, 2);
        assert!(user.is_consistent());
    }

    #[test]
    fn quiescence_tracks_candidates() {
        let mut user = make_user();
        assert!(user.has_candidates());
        user.mark_propagated(PropagatedInformation::new(iid(1), 0, uid(0)));
        user.mark_propagated(PropagatedInformation::new(iid(2), 0, uid(0)));
        assert!(!user.has_candidates());
    }
}
