//! Plain value structs for information pieces and their features.

use serde::{Deserialize, Serialize};

use crate::ids::{InfoId, UserId};

/// An atomic unit of content. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationPiece {
    /// Identifier of the piece.
    pub id: InfoId,
    /// User who authored the piece.
    pub creator: UserId,
    /// Ground-truth creation timestamp.
    pub timestamp: i64,
}

/// One value of a named, possibly multi-valued feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    /// The feature value (for example a hashtag or topic).
    pub value: String,
    /// Weight of the value for its owner.
    pub weight: f64,
}

impl FeatureValue {
    /// Create a feature value.
    pub fn new(value: impl Into<String>, weight: f64) -> Self {
        Self {
            value: value.into(),
            weight,
        }
    }
}
