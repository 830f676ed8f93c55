//! Sight policies: which arrivals a user actually notices.
//!
//! Sight filters a receiver's merged inbox before the update policy sees it.
//! The `Recommended` policy needs to know which neighbors are linked by a
//! recommended edge; that classification is computed once per run by
//! [`SightMechanism::reset_selections`] and handed back on every call as a
//! read-only [`SightCache`].

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rayon::prelude::*;
use ripple_graph::Data;
use ripple_types::{Orientation, UserId};
use serde::Deserialize;
use tracing::debug;

use crate::mechanisms::{Limit, choose_up_to};
use crate::protocol::{ProtocolError, check_probability};
use crate::state::{PropagatedInformation, UserState};

/// Filter applied to a receiver's inbox.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SightMechanism {
    /// Notice everything the user has not forwarded yet.
    AllNotPropagated,
    /// Notice everything.
    AllSight,
    /// Notice at most `num_sight` distinct pieces, chosen uniformly.
    Count {
        /// Maximum number of distinct pieces noticed per iteration.
        num_sight: u32,
    },
    /// One trial per creator, with a higher chance through recommended edges.
    Recommended {
        /// Chance of noticing a piece sent over a recommended link.
        prob_rec: f64,
        /// Chance of noticing a piece sent over any other link.
        prob_train: f64,
        /// Neighborhood in which recommended links are looked up.
        orientation: Orientation,
    },
}

/// Per-run neighbor classification used by `Recommended` sight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SightCache {
    recommended: BTreeMap<UserId, BTreeSet<UserId>>,
}

impl SightCache {
    /// Whether `creator` reaches `viewer` through a recommended link.
    pub fn is_recommended(&self, viewer: UserId, creator: UserId) -> bool {
        self.recommended
            .get(&viewer)
            .is_some_and(|set| set.contains(&creator))
    }

    /// Number of users with at least one recommended neighbor.
    pub fn len(&self) -> usize {
        self.recommended.len()
    }

    /// Whether no user has a recommended neighbor.
    pub fn is_empty(&self) -> bool {
        self.recommended.is_empty()
    }
}

impl SightMechanism {
    /// Reject probabilities outside `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidProbability`] naming the bad field.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if let Self::Recommended {
            prob_rec,
            prob_train,
            ..
        } = self
        {
            check_probability("prob_rec", *prob_rec)?;
            check_probability("prob_train", *prob_train)?;
        }
        Ok(())
    }

    /// Precompute the sight cache for `data`.
    ///
    /// Only `Recommended` caches anything. Calling it again on the same
    /// graph yields the same cache; a changed graph needs a new call.
    pub fn reset_selections(&self, data: &Data) -> SightCache {
        let Self::Recommended { orientation, .. } = self else {
            return SightCache::default();
        };
        let graph = data.graph();
        let users: Vec<UserId> = data.users().collect();
        let recommended: BTreeMap<UserId, BTreeSet<UserId>> = users
            .par_iter()
            .filter_map(|user| {
                let linked: BTreeSet<UserId> = graph
                    .neighbors(*user, *orientation)
                    .into_iter()
                    .filter(|other| graph.is_recommended_neighbor(*user, *other, *orientation))
                    .collect();
                (!linked.is_empty()).then_some((*user, linked))
            })
            .collect();
        debug!(users = recommended.len(), "Sight cache built");
        SightCache { recommended }
    }

    /// Keep the inbox records `user` notices.
    ///
    /// `incoming` holds one merged record per piece.
    pub fn sees(
        &self,
        cache: &SightCache,
        user: &UserState,
        incoming: Vec<PropagatedInformation>,
        rng: &mut impl Rng,
    ) -> Vec<PropagatedInformation> {
        let unforwarded = |r: &PropagatedInformation| {
            !user.contains_propagated(r.info_id) && !user.contains_own(r.info_id)
        };
        match self {
            Self::AllSight => incoming,
            Self::AllNotPropagated => incoming.into_iter().filter(|r| unforwarded(r)).collect(),
            Self::Count { num_sight } => {
                let pool: Vec<PropagatedInformation> =
                    incoming.into_iter().filter(|r| unforwarded(r)).collect();
                let indices: Vec<usize> = (0..pool.len()).collect();
                let kept: BTreeSet<usize> = choose_up_to(&indices, Limit::AtMost(*num_sight), rng)
                    .into_iter()
                    .collect();
                pool.into_iter()
                    .enumerate()
                    .filter(|(i, _)| kept.contains(i))
                    .map(|(_, r)| r)
                    .collect()
            }
            Self::Recommended {
                prob_rec,
                prob_train,
                ..
            } => incoming
                .into_iter()
                .filter(|r| unforwarded(r))
                .filter(|r| {
                    r.creators.iter().any(|creator| {
                        let chance = if cache.is_recommended(user.user(), *creator) {
                            *prob_rec
                        } else {
                            *prob_train
                        };
                        rng.random::<f64>() < chance
                    })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use ripple_graph::DataBuilder;
    use ripple_types::{EdgeKind, InfoId};

    use super::*;

    fn uid(n: u32) -> UserId {
        UserId::new(n)
    }

    fn record(info: u32, creator: u32) -> PropagatedInformation {
        PropagatedInformation::new(InfoId::new(info), 0, uid(creator))
    }

    /// User 0 follows 1 (regular) and 2 (recommended).
    fn make_data() -> Data {
        let mut b = DataBuilder::new();
        for n in 0..3 {
            b.add_user(uid(n)).unwrap();
        }
        b.add_edge(uid(0), uid(1), 1.0, EdgeKind::Regular).unwrap();
        b.add_edge(uid(0), uid(2), 1.0, EdgeKind::Recommended).unwrap();
        b.build().unwrap()
    }

    fn make_viewer() -> UserState {
        let mut user = UserState::new(uid(0), [InfoId::new(9)]);
        user.receive(record(5, 1), &crate::mechanisms::UpdateMechanism::Newest);
        user.mark_propagated(record(5, 1));
        user
    }

    #[test]
    fn all_not_propagated_drops_forwarded_pieces() {
        let mut rng = SmallRng::seed_from_u64(42);
        let inbox = vec![record(5, 1), record(6, 1), record(9, 2)];
        let seen = SightMechanism::AllNotPropagated.sees(
            &SightCache::default(),
            &make_viewer(),
            inbox.clone(),
            &mut rng,
        );
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.first().unwrap().info_id, InfoId::new(6));

        let everything =
            SightMechanism::AllSight.sees(&SightCache::default(), &make_viewer(), inbox, &mut rng);
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn count_caps_distinct_pieces() {
        let mut rng = SmallRng::seed_from_u64(42);
        let viewer = UserState::new(uid(0), []);
        let mut merged = record(1, 1);
        merged.absorb(&record(1, 2));
        let inbox = vec![merged, record(2, 1), record(3, 1), record(4, 2)];
        let seen = SightMechanism::Count { num_sight: 2 }.sees(
            &SightCache::default(),
            &viewer,
            inbox,
            &mut rng,
        );
        assert_eq!(seen.len(), 2);
        // A kept piece keeps all of its copies.
        if let Some(first) = seen.iter().find(|r| r.info_id == InfoId::new(1)) {
            assert_eq!(first.received_times, 2);
        }
    }

    #[test]
    fn recommended_cache_classifies_links() {
        let data = make_data();
        let sight = SightMechanism::Recommended {
            prob_rec: 1.0,
            prob_train: 0.0,
            orientation: Orientation::Out,
        };
        let cache = sight.reset_selections(&data);
        assert!(cache.is_recommended(uid(0), uid(2)));
        assert!(!cache.is_recommended(uid(0), uid(1)));
        assert_eq!(cache.len(), 1);
        assert_eq!(sight.reset_selections(&data), cache);

        let mut rng = SmallRng::seed_from_u64(42);
        let viewer = UserState::new(uid(0), []);
        let seen = sight.sees(&cache, &viewer, vec![record(1, 1), record(2, 2)], &mut rng);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.first().unwrap().info_id, InfoId::new(2));
    }

    #[test]
    fn other_policies_cache_nothing() {
        let data = make_data();
        assert!(SightMechanism::AllSight.reset_selections(&data).is_empty());
    }

    #[test]
    fn probabilities_are_validated() {
        let sight = SightMechanism::Recommended {
            prob_rec: 1.5,
            prob_train: 0.1,
            orientation: Orientation::Und,
        };
        assert!(matches!(
            sight.validate(),
            Err(ProtocolError::InvalidProbability { name: "prob_rec", .. })
        ));
    }
}
