//! Social graph: users as nodes, follow relations as weighted directed edges.
//!
//! An edge `u -> v` means `u` follows `v`. Each edge carries a weight (used
//! by weighted cascade rules) and an [`EdgeKind`] (used to tell organic links
//! apart from recommended ones).
//!
//! Internally an outbound adjacency map `BTreeMap<UserId, BTreeMap<UserId, Edge>>`
//! indexes edges per source, and a mirrored inbound map indexes them per
//! target, so both directions are answered without scanning.

use std::collections::{BTreeMap, BTreeSet};

use ripple_types::{EdgeKind, Orientation, UserId};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Attributes of a single directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge weight.
    pub weight: f64,
    /// Whether the edge is organic or recommended.
    pub kind: EdgeKind,
}

/// The social graph holding all users and follow edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialGraph {
    /// All users of the network.
    users: BTreeSet<UserId>,
    /// Outbound adjacency: user -> (followed user -> edge).
    outbound: BTreeMap<UserId, BTreeMap<UserId, Edge>>,
    /// Inbound adjacency: user -> (follower -> edge).
    inbound: BTreeMap<UserId, BTreeMap<UserId, Edge>>,
    /// Number of directed edges.
    edge_count: usize,
}

impl SocialGraph {
    /// Create an empty graph.
    pub const fn new() -> Self {
        Self {
            users: BTreeSet::new(),
            outbound: BTreeMap::new(),
            inbound: BTreeMap::new(),
            edge_count: 0,
        }
    }

    // -------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------

    /// Add a user to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateUser`] if the user already exists.
    pub fn add_user(&mut self, user: UserId) -> Result<(), GraphError> {
        if !self.users.insert(user) {
            return Err(GraphError::DuplicateUser(user));
        }
        self.outbound.entry(user).or_default();
        self.inbound.entry(user).or_default();
        Ok(())
    }

    /// Whether the user is part of the graph.
    pub fn contains_user(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }

    /// Number of users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Iterate over all users in ascending ID order.
    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users.iter().copied()
    }

    // -------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------

    /// Add a directed edge `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownUser`] if either endpoint is missing,
    /// [`GraphError::SelfLoop`] if both endpoints are the same user,
    /// [`GraphError::InvalidWeight`] for a non-finite weight, or
    /// [`GraphError::DuplicateEdge`] if the edge already exists.
    pub fn add_edge(
        &mut self,
        from: UserId,
        to: UserId,
        weight: f64,
        kind: EdgeKind,
    ) -> Result<(), GraphError> {
        if !self.users.contains(&from) {
            return Err(GraphError::UnknownUser(from));
        }
        if !self.users.contains(&to) {
            return Err(GraphError::UnknownUser(to));
        }
        if from == to {
            return Err(GraphError::SelfLoop(from));
        }
        if !weight.is_finite() {
            return Err(GraphError::InvalidWeight { from, to, weight });
        }

        let edge = Edge { weight, kind };
        let out = self.outbound.entry(from).or_default();
        if out.contains_key(&to) {
            return Err(GraphError::DuplicateEdge { from, to });
        }
        out.insert(to, edge);
        self.inbound.entry(to).or_default().insert(from, edge);
        self.edge_count = self.edge_count.saturating_add(1);
        Ok(())
    }

    /// Number of directed edges.
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// The edge `from -> to`, if present.
    pub fn edge(&self, from: UserId, to: UserId) -> Option<&Edge> {
        self.outbound.get(&from).and_then(|out| out.get(&to))
    }

    /// Weight of the edge `from -> to`, if present.
    pub fn edge_weight(&self, from: UserId, to: UserId) -> Option<f64> {
        self.edge(from, to).map(|e| e.weight)
    }

    /// Whether `from -> to` exists and is of the given kind.
    pub fn has_edge_of_kind(&self, from: UserId, to: UserId, kind: EdgeKind) -> bool {
        self.edge(from, to).is_some_and(|e| e.kind == kind)
    }

    // -------------------------------------------------------------------
    // Neighborhoods
    // -------------------------------------------------------------------

    /// Users `user` has an edge to.
    pub fn out_neighbors(&self, user: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.outbound
            .get(&user)
            .into_iter()
            .flat_map(|m| m.keys().copied())
    }

    /// Users with an edge into `user`.
    pub fn in_neighbors(&self, user: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.inbound
            .get(&user)
            .into_iter()
            .flat_map(|m| m.keys().copied())
    }

    /// Neighbors of `user` along `orientation`, sorted and without duplicates.
    pub fn neighbors(&self, user: UserId, orientation: Orientation) -> Vec<UserId> {
        match orientation {
            Orientation::Out => self.out_neighbors(user).collect(),
            Orientation::In => self.in_neighbors(user).collect(),
            Orientation::Und => {
                let set: BTreeSet<UserId> = self
                    .out_neighbors(user)
                    .chain(self.in_neighbors(user))
                    .collect();
                set.into_iter().collect()
            }
            Orientation::Mutual => self
                .out_neighbors(user)
                .filter(|v| self.edge(*v, user).is_some())
                .collect(),
        }
    }

    /// Whether `other` belongs to the neighborhood of `user` along `orientation`.
    pub fn is_neighbor(&self, user: UserId, other: UserId, orientation: Orientation) -> bool {
        let out = self.edge(user, other).is_some();
        let inc = self.edge(other, user).is_some();
        match orientation {
            Orientation::Out => out,
            Orientation::In => inc,
            Orientation::Und => out || inc,
            Orientation::Mutual => out && inc,
        }
    }

    /// Whether `other` is linked to `user` by a recommended edge along `orientation`.
    ///
    /// For `Und` either direction may carry the recommendation; for `Mutual`
    /// both edges must exist and at least one must be recommended.
    pub fn is_recommended_neighbor(
        &self,
        user: UserId,
        other: UserId,
        orientation: Orientation,
    ) -> bool {
        let rec_out = self.has_edge_of_kind(user, other, EdgeKind::Recommended);
        let rec_in = self.has_edge_of_kind(other, user, EdgeKind::Recommended);
        match orientation {
            Orientation::Out => rec_out,
            Orientation::In => rec_in,
            Orientation::Und => rec_out || rec_in,
            Orientation::Mutual => {
                self.is_neighbor(user, other, Orientation::Mutual) && (rec_out || rec_in)
            }
        }
    }
}
