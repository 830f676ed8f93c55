//! The read-only data bundle consumed by a simulation run.
//!
//! [`Data`] groups the social graph, the information pieces and who
//! authored them, named feature tables, ground-truth re-propagation records
//! and the sorted timeline of distinct timestamps. It is assembled through
//! [`DataBuilder`], which validates cross references once so that the
//! simulator can treat any later mismatch as an internal-consistency error.

use std::collections::{BTreeMap, BTreeSet};

use ripple_types::{EdgeKind, FeatureValue, InfoId, InformationPiece, UserId};
use tracing::debug;

use crate::error::GraphError;
use crate::features::FeatureTable;
use crate::graph::SocialGraph;

/// Read-only input of a simulation.
#[derive(Debug, Clone)]
pub struct Data {
    graph: SocialGraph,
    pieces: BTreeMap<InfoId, InformationPiece>,
    authored: BTreeMap<UserId, BTreeSet<InfoId>>,
    user_features: BTreeMap<String, FeatureTable<UserId>>,
    piece_features: BTreeMap<String, FeatureTable<InfoId>>,
    real_propagations: BTreeMap<(UserId, InfoId), i64>,
    timestamps: Vec<i64>,
}

impl Data {
    /// The social graph.
    pub const fn graph(&self) -> &SocialGraph {
        &self.graph
    }

    /// Iterate over all users in ascending ID order.
    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.graph.users()
    }

    /// Number of users.
    pub fn user_count(&self) -> usize {
        self.graph.user_count()
    }

    /// Look up an information piece.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownPiece`] if the piece does not exist.
    pub fn piece(&self, id: InfoId) -> Result<&InformationPiece, GraphError> {
        self.pieces.get(&id).ok_or(GraphError::UnknownPiece(id))
    }

    /// Whether the piece exists.
    pub fn contains_piece(&self, id: InfoId) -> bool {
        self.pieces.contains_key(&id)
    }

    /// Iterate over all pieces in ascending ID order.
    pub fn pieces(&self) -> impl Iterator<Item = &InformationPiece> {
        self.pieces.values()
    }

    /// Number of pieces.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Pieces authored by `user`, empty if the user authored nothing.
    pub fn authored_by(&self, user: UserId) -> impl Iterator<Item = InfoId> + '_ {
        self.authored
            .get(&user)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Values of `user` in the named user feature table.
    ///
    /// Unknown tables and users without an entry yield an empty slice.
    pub fn user_features(&self, table: &str, user: UserId) -> &[FeatureValue] {
        self.user_features
            .get(table)
            .map_or(&[], |t| t.get(&user))
    }

    /// Values of `piece` in the named piece feature table.
    ///
    /// Unknown tables and pieces without an entry yield an empty slice.
    pub fn piece_features(&self, table: &str, piece: InfoId) -> &[FeatureValue] {
        self.piece_features
            .get(table)
            .map_or(&[], |t| t.get(&piece))
    }

    /// Names of the piece feature tables.
    pub fn piece_feature_tables(&self) -> impl Iterator<Item = &str> {
        self.piece_features.keys().map(String::as_str)
    }

    /// Ground-truth timestamp at which `user` re-shared `piece`, if ever.
    pub fn real_propagation(&self, user: UserId, piece: InfoId) -> Option<i64> {
        self.real_propagations.get(&(user, piece)).copied()
    }

    /// Sorted distinct timestamps of pieces and re-propagations.
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// Timestamp associated with an iteration, `None` past the last one.
    pub fn timestamp_at(&self, iteration: u64) -> Option<i64> {
        usize::try_from(iteration)
            .ok()
            .and_then(|i| self.timestamps.get(i))
            .copied()
    }
}

/// Incremental, validating constructor for [`Data`].
///
/// Users and edges are checked as they are added; pieces, features and
/// re-propagation records are checked in [`build`](Self::build) so they
/// can be added in any order.
#[derive(Debug, Default)]
pub struct DataBuilder {
    graph: SocialGraph,
    pieces: Vec<InformationPiece>,
    user_features: Vec<(String, UserId, FeatureValue)>,
    piece_features: Vec<(String, InfoId, FeatureValue)>,
    real_propagations: Vec<(UserId, InfoId, i64)>,
}

impl DataBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateUser`] if the user was already added.
    pub fn add_user(&mut self, user: UserId) -> Result<&mut Self, GraphError> {
        self.graph.add_user(user)?;
        Ok(self)
    }

    /// Add a directed follow edge `from -> to`.
    ///
    /// # Errors
    ///
    /// See [`SocialGraph::add_edge`].
    pub fn add_edge(
        &mut self,
        from: UserId,
        to: UserId,
        weight: f64,
        kind: EdgeKind,
    ) -> Result<&mut Self, GraphError> {
        self.graph.add_edge(from, to, weight, kind)?;
        Ok(self)
    }

    /// Whether a user has been added.
    pub fn contains_user(&self, user: UserId) -> bool {
        self.graph.contains_user(user)
    }

    /// Add an information piece.
    pub fn add_piece(&mut self, piece: InformationPiece) -> &mut Self {
        self.pieces.push(piece);
        self
    }

    /// Add a value to a named user feature table.
    pub fn add_user_feature(
        &mut self,
        table: impl Into<String>,
        user: UserId,
        value: FeatureValue,
    ) -> &mut Self {
        self.user_features.push((table.into(), user, value));
        self
    }

    /// Add a value to a named piece feature table.
    pub fn add_piece_feature(
        &mut self,
        table: impl Into<String>,
        piece: InfoId,
        value: FeatureValue,
    ) -> &mut Self {
        self.piece_features.push((table.into(), piece, value));
        self
    }

    /// Record that `user` really re-shared `piece` at `timestamp`.
    pub fn add_real_propagation(&mut self, user: UserId, piece: InfoId, timestamp: i64) -> &mut Self {
        self.real_propagations.push((user, piece, timestamp));
        self
    }

    /// Validate all cross references and produce the [`Data`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicatePiece`] for repeated piece IDs,
    /// [`GraphError::UnknownUser`] or [`GraphError::UnknownPiece`] for
    /// dangling references, or [`GraphError::InvalidFeatureWeight`] for
    /// non-finite feature weights.
    pub fn build(self) -> Result<Data, GraphError> {
        let Self {
            graph,
            pieces: piece_list,
            user_features: user_feature_list,
            piece_features: piece_feature_list,
            real_propagations: real_list,
        } = self;

        let mut pieces = BTreeMap::new();
        let mut authored: BTreeMap<UserId, BTreeSet<InfoId>> = BTreeMap::new();
        let mut timeline = BTreeSet::new();

        for piece in piece_list {
            if !graph.contains_user(piece.creator) {
                return Err(GraphError::UnknownUser(piece.creator));
            }
            if pieces.contains_key(&piece.id) {
                return Err(GraphError::DuplicatePiece(piece.id));
            }
            authored.entry(piece.creator).or_default().insert(piece.id);
            timeline.insert(piece.timestamp);
            pieces.insert(piece.id, piece);
        }

        let mut user_features: BTreeMap<String, FeatureTable<UserId>> = BTreeMap::new();
        for (table, user, value) in user_feature_list {
            if !graph.contains_user(user) {
                return Err(GraphError::UnknownUser(user));
            }
            if !value.weight.is_finite() {
                return Err(GraphError::InvalidFeatureWeight {
                    table,
                    weight: value.weight,
                });
            }
            user_features.entry(table).or_default().push(user, value);
        }

        let mut piece_features: BTreeMap<String, FeatureTable<InfoId>> = BTreeMap::new();
        for (table, piece, value) in piece_feature_list {
            if !pieces.contains_key(&piece) {
                return Err(GraphError::UnknownPiece(piece));
            }
            if !value.weight.is_finite() {
                return Err(GraphError::InvalidFeatureWeight {
                    table,
                    weight: value.weight,
                });
            }
            piece_features.entry(table).or_default().push(piece, value);
        }

        let mut real_propagations = BTreeMap::new();
        for (user, piece, timestamp) in real_list {
            if !graph.contains_user(user) {
                return Err(GraphError::UnknownUser(user));
            }
            if !pieces.contains_key(&piece) {
                return Err(GraphError::UnknownPiece(piece));
            }
            timeline.insert(timestamp);
            // Keep the earliest re-share when a pair is recorded twice.
            real_propagations
                .entry((user, piece))
                .and_modify(|ts: &mut i64| *ts = (*ts).min(timestamp))
                .or_insert(timestamp);
        }

        debug!(
            users = graph.user_count(),
            edges = graph.edge_count(),
            pieces = pieces.len(),
            timestamps = timeline.len(),
            "Data built"
        );

        Ok(Data {
            graph,
            pieces,
            authored,
            user_features,
            piece_features,
            real_propagations,
            timestamps: timeline.into_iter().collect(),
        })
    }
}
