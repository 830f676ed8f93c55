//! Synthetic network generator for standalone runs.
//!
//! Builds a random follow graph with authored pieces, optional topic
//! features and ground-truth re-shares, all drawn from one seeded
//! generator so a configuration always yields the same network.

use std::collections::BTreeSet;

use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use ripple_graph::{Data, DataBuilder};
use ripple_types::{EdgeKind, FeatureValue, InfoId, InformationPiece, UserId};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::EngineError;

/// Name of the piece feature table holding topics.
pub const TOPIC_TABLE: &str = "topic";

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// The `network` section of `ripple-config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkConfig {
    /// Number of users.
    #[serde(default = "default_users")]
    pub users: u32,

    /// Followees drawn per user.
    #[serde(default = "default_mean_out_degree")]
    pub mean_out_degree: u32,

    /// Chance that a follow is returned.
    #[serde(default = "default_reciprocity")]
    pub reciprocity: f64,

    /// Chance that a follow is marked as recommended.
    #[serde(default = "default_recommended_fraction")]
    pub recommended_fraction: f64,

    /// Pieces authored by each user.
    #[serde(default = "default_pieces_per_user")]
    pub pieces_per_user: u32,

    /// Piece timestamps are drawn from `0..=timestamp_span`.
    #[serde(default = "default_timestamp_span")]
    pub timestamp_span: i64,

    /// Chance that a follower re-shared a piece in the ground truth.
    #[serde(default = "default_repropagation_rate")]
    pub repropagation_rate: f64,

    /// Topic values pieces are tagged with.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Chance that a piece carries a topic at all.
    #[serde(default = "default_topic_fraction")]
    pub topic_fraction: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            mean_out_degree: default_mean_out_degree(),
            reciprocity: default_reciprocity(),
            recommended_fraction: default_recommended_fraction(),
            pieces_per_user: default_pieces_per_user(),
            timestamp_span: default_timestamp_span(),
            repropagation_rate: default_repropagation_rate(),
            topics: default_topics(),
            topic_fraction: default_topic_fraction(),
        }
    }
}

const fn default_users() -> u32 {
    200
}

const fn default_mean_out_degree() -> u32 {
    8
}

const fn default_reciprocity() -> f64 {
    0.3
}

const fn default_recommended_fraction() -> f64 {
    0.1
}

const fn default_pieces_per_user() -> u32 {
    1
}

const fn default_timestamp_span() -> i64 {
    50
}

const fn default_repropagation_rate() -> f64 {
    0.05
}

fn default_topics() -> Vec<String> {
    vec![
        String::from("news"),
        String::from("sports"),
        String::from("music"),
        String::from("science"),
    ]
}

const fn default_topic_fraction() -> f64 {
    0.8
}

impl NetworkConfig {
    /// Reject settings the generator cannot honor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Network`] describing the first bad field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.users == 0 {
            return Err(EngineError::Network {
                message: String::from("users must be at least 1"),
            });
        }
        if self.timestamp_span < 0 {
            return Err(EngineError::Network {
                message: format!("timestamp_span must not be negative, got {}", self.timestamp_span),
            });
        }
        for (name, value) in [
            ("reciprocity", self.reciprocity),
            ("recommended_fraction", self.recommended_fraction),
            ("repropagation_rate", self.repropagation_rate),
            ("topic_fraction", self.topic_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Network {
                    message: format!("{name} must be within [0, 1], got {value}"),
                });
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Generation
// -----------------------------------------------------------------------

/// Generate a network from `config` and `seed`.
///
/// # Errors
///
/// Returns [`EngineError::Network`] for invalid settings, or
/// [`EngineError::Graph`] if the assembled data is rejected.
pub fn generate(config: &NetworkConfig, seed: u64) -> Result<Data, EngineError> {
    config.validate()?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut builder = DataBuilder::new();

    for n in 0..config.users {
        builder.add_user(UserId::new(n))?;
    }
    if config.users < 2 {
        warn!(users = config.users, "Network too small to have any edge");
    }

    let edges = draw_edges(config, &mut rng);
    for (from, to) in &edges {
        let kind = if rng.random::<f64>() < config.recommended_fraction {
            EdgeKind::Recommended
        } else {
            EdgeKind::Regular
        };
        builder.add_edge(UserId::new(*from), UserId::new(*to), rng.random::<f64>(), kind)?;
    }

    let mut next_piece: u32 = 0;
    let mut pieces: Vec<(InfoId, u32, i64)> = Vec::new();
    for author in 0..config.users {
        for _ in 0..config.pieces_per_user {
            let id = InfoId::new(next_piece);
            next_piece = next_piece.saturating_add(1);
            let timestamp = rng.random_range(0..=config.timestamp_span);
            builder.add_piece(InformationPiece {
                id,
                creator: UserId::new(author),
                timestamp,
            });
            let topic = (rng.random::<f64>() < config.topic_fraction)
                .then(|| config.topics.choose(&mut rng))
                .flatten();
            if let Some(topic) = topic {
                builder.add_piece_feature(TOPIC_TABLE, id, FeatureValue::new(topic.as_str(), 1.0));
            }
            pieces.push((id, author, timestamp));
        }
    }

    // Followers of an author are the users with an edge into it.
    let mut reshares: usize = 0;
    let delay_span = config.timestamp_span.checked_div(4).unwrap_or(0).max(1);
    for (id, author, timestamp) in &pieces {
        for (follower, _) in edges.iter().filter(|(_, to)| to == author) {
            if rng.random::<f64>() < config.repropagation_rate {
                let delay = rng.random_range(1..=delay_span);
                builder.add_real_propagation(
                    UserId::new(*follower),
                    *id,
                    timestamp.saturating_add(delay),
                );
                reshares = reshares.saturating_add(1);
            }
        }
    }

    let data = builder.build()?;
    info!(
        users = data.user_count(),
        edges = edges.len(),
        pieces = data.piece_count(),
        reshares,
        timestamps = data.timestamps().len(),
        "Synthetic network generated"
    );
    Ok(data)
}

/// Draw the follow edges: `mean_out_degree` distinct followees per user,
/// each returned with probability `reciprocity`.
fn draw_edges(config: &NetworkConfig, rng: &mut SmallRng) -> BTreeSet<(u32, u32)> {
    let mut edges = BTreeSet::new();
    let others = usize::try_from(config.users.saturating_sub(1)).unwrap_or(0);
    let degree = usize::try_from(config.mean_out_degree)
        .unwrap_or(usize::MAX)
        .min(others);

    for from in 0..config.users {
        for index in rand::seq::index::sample(rng, others, degree) {
            // Skip over `from` itself.
            let Ok(mut to) = u32::try_from(index) else {
                continue;
            };
            if to >= from {
                to = to.saturating_add(1);
            }
            edges.insert((from, to));
            if rng.random::<f64>() < config.reciprocity {
                edges.insert((to, from));
            }
        }
    }
    edges
}
