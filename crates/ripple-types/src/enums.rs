//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Which edge direction defines a user's neighborhood.
///
/// An edge `u -> v` means `u` follows `v`. For a user `u`:
/// - `In`: users with an edge into `u` (its followers)
/// - `Out`: users `u` has an edge to (the users it follows)
/// - `Und`: the union of both
/// - `Mutual`: users linked in both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Incoming edges.
    In,
    /// Outgoing edges.
    Out,
    /// Either direction.
    Und,
    /// Both directions.
    Mutual,
}

impl Orientation {
    /// The orientation seen from the other endpoint of an edge.
    ///
    /// `In` and `Out` swap; `Und` and `Mutual` are symmetric.
    pub const fn inverse(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
            Self::Und => Self::Und,
            Self::Mutual => Self::Mutual,
        }
    }
}

/// Kind of a social graph edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// An organic link present in the observed network.
    #[default]
    Regular,
    /// A link added by a contact recommender.
    Recommended,
}
