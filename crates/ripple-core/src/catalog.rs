//! Named, preconfigured protocols.
//!
//! Each catalog entry fixes the five policies of a classic diffusion model
//! and exposes the few knobs that vary between experiments through
//! [`CatalogParams`]. Knobs that an entry does not use are ignored.

use std::fmt;
use std::str::FromStr;

use ripple_types::Orientation;
use serde::{Deserialize, Serialize};

use crate::mechanisms::selection::CascadeProbability;
use crate::mechanisms::{
    ExpirationMechanism, Limit, PropagationMechanism, SelectionMechanism, SightMechanism,
    UpdateMechanism,
};
use crate::protocol::{Protocol, ProtocolError};

/// Default rotation window of the push and pull models.
const DEFAULT_NUM_WAIT: u32 = 1;

/// Names of the preconfigured protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolName {
    /// Every user pushes everything it holds to one out-neighbor.
    PushModel,
    /// Every user pulls everything one out-neighbor holds.
    PullModel,
    /// Push model that also keeps re-releasing propagated pieces.
    RumorSpreading,
    /// Rumor spreading with push and pull over undirected partners.
    BidirectionalRumorSpreading,
    /// Forward a piece once enough followees have shared it.
    ThresholdModel,
    /// Replay the authored timeline, no forwarding.
    TemporalPure,
    /// Replay the authored timeline plus ground-truth re-shares.
    TemporalLoose,
    /// Each exposure activates the receiver with some probability.
    IndependentCascade,
}

impl ProtocolName {
    /// Every catalog entry.
    pub const ALL: [Self; 8] = [
        Self::PushModel,
        Self::PullModel,
        Self::RumorSpreading,
        Self::BidirectionalRumorSpreading,
        Self::ThresholdModel,
        Self::TemporalPure,
        Self::TemporalLoose,
        Self::IndependentCascade,
    ];

    /// Catalog identifier, as used in configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PushModel => "push-model",
            Self::PullModel => "pull-model",
            Self::RumorSpreading => "rumor-spreading",
            Self::BidirectionalRumorSpreading => "bidirectional-rumor-spreading",
            Self::ThresholdModel => "threshold-model",
            Self::TemporalPure => "temporal-pure",
            Self::TemporalLoose => "temporal-loose",
            Self::IndependentCascade => "independent-cascade",
        }
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownProtocol { name: s.to_owned() })
    }
}

/// Tunable parameters of the catalog entries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalogParams {
    /// Rotation window of partner policies.
    #[serde(default)]
    pub num_wait: Option<u32>,
    /// Neighborhood override.
    #[serde(default)]
    pub orientation: Option<Orientation>,
    /// Informing-neighbor threshold; required by `threshold-model`.
    #[serde(default)]
    pub threshold: Option<u32>,
    /// Fixed activation probability of `independent-cascade`; edge weights
    /// are used when absent.
    #[serde(default)]
    pub probability: Option<f64>,
    /// Received-piece limit of `temporal-loose`.
    #[serde(default)]
    pub num_rec: Option<Limit>,
}

/// Build a catalog protocol.
///
/// # Errors
///
/// Returns [`ProtocolError::MissingParameter`] when a required knob is not
/// set, or whatever validation error the assembled policies raise.
pub fn build(name: ProtocolName, params: &CatalogParams) -> Result<Protocol, ProtocolError> {
    let num_wait = params.num_wait.unwrap_or(DEFAULT_NUM_WAIT);
    match name {
        ProtocolName::PushModel => Protocol::new(
            SelectionMechanism::count(Limit::All, Limit::All, Limit::NONE),
            ExpirationMechanism::AllNotPropagated,
            UpdateMechanism::Newest,
            PropagationMechanism::Push {
                num_wait,
                orientation: params.orientation.unwrap_or(Orientation::Out),
            },
            SightMechanism::AllNotPropagated,
        ),
        ProtocolName::PullModel => Protocol::new(
            SelectionMechanism::count(Limit::All, Limit::All, Limit::NONE),
            ExpirationMechanism::AllNotPropagated,
            UpdateMechanism::Newest,
            PropagationMechanism::Pull {
                num_wait,
                orientation: params.orientation.unwrap_or(Orientation::Out),
            },
            SightMechanism::AllNotPropagated,
        ),
        ProtocolName::RumorSpreading => Protocol::new(
            SelectionMechanism::count(Limit::All, Limit::All, Limit::All),
            ExpirationMechanism::AllNotPropagated,
            UpdateMechanism::Newest,
            PropagationMechanism::Push {
                num_wait,
                orientation: params.orientation.unwrap_or(Orientation::Out),
            },
            SightMechanism::AllNotPropagated,
        ),
        ProtocolName::BidirectionalRumorSpreading => Protocol::new(
            SelectionMechanism::count(Limit::All, Limit::All, Limit::All),
            ExpirationMechanism::AllNotPropagated,
            UpdateMechanism::Newest,
            PropagationMechanism::PullPush {
                num_wait,
                orientation: params.orientation.unwrap_or(Orientation::Und),
            },
            SightMechanism::AllNotPropagated,
        ),
        ProtocolName::ThresholdModel => {
            let threshold = params.threshold.ok_or(ProtocolError::MissingParameter {
                protocol: name,
                parameter: "threshold",
            })?;
            Protocol::new(
                SelectionMechanism::limited_count_threshold(
                    Limit::All,
                    Limit::All,
                    threshold,
                    params.orientation.unwrap_or(Orientation::Out),
                ),
                ExpirationMechanism::Never,
                UpdateMechanism::Older,
                PropagationMechanism::AllFollowers,
                SightMechanism::AllNotPropagated,
            )
        }
        ProtocolName::TemporalPure => Protocol::new(
            SelectionMechanism::timestamp_pure(),
            ExpirationMechanism::AllNotRealPropagatedTimestamp,
            UpdateMechanism::Newest,
            PropagationMechanism::AllFollowers,
            SightMechanism::AllNotPropagated,
        ),
        ProtocolName::TemporalLoose => Protocol::new(
            SelectionMechanism::timestamp_loose(params.num_rec.unwrap_or(Limit::All)),
            ExpirationMechanism::AllNotRealPropagatedTimestamp,
            UpdateMechanism::Newest,
            PropagationMechanism::AllFollowers,
            SightMechanism::AllNotPropagated,
        ),
        ProtocolName::IndependentCascade => {
            let probability = params.probability.map_or(
                CascadeProbability::EdgeWeight {
                    orientation: params.orientation.unwrap_or(Orientation::Out),
                },
                |value| CascadeProbability::Fixed { value },
            );
            Protocol::new(
                SelectionMechanism::independent_cascade(Limit::All, probability, Limit::NONE),
                ExpirationMechanism::AllNotPropagated,
                UpdateMechanism::IndependentCascade,
                PropagationMechanism::AllFollowers,
                SightMechanism::AllSight,
            )
        }
    }
}
