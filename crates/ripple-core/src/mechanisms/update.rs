//! Update policies: how newly seen pieces merge into `received`.
//!
//! A policy answers two questions. When a piece that is already waiting in
//! `received` arrives again, what does the merged record look like? And when
//! a piece the user has already discarded arrives again, does it come back?

use std::collections::BTreeSet;

use ripple_types::{InfoId, UserId};
use serde::Deserialize;

use crate::state::{PropagatedInformation, UserState};

/// How an arriving record was classified against the user's buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalKind {
    /// First time the user holds the piece.
    New,
    /// The piece was already received or discarded.
    Repeated,
    /// The user authored or already forwarded the piece.
    Ignored,
}

/// Outcome of merging one seen record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    /// The piece.
    pub info_id: InfoId,
    /// Users the arriving copies came from.
    pub creators: BTreeSet<UserId>,
    /// Classification of the arrival.
    pub kind: ArrivalKind,
}

/// Merge rule for repeated arrivals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMechanism {
    /// Keep the most recent iteration and creators, sum the counts.
    /// A discarded piece comes back as a fresh record.
    Newest,
    /// Keep the earliest iteration, unite creators and sum the counts.
    /// A discarded piece comes back with its accumulated history.
    Older,
    /// Keep the first-arrival iteration, unite creators and sum the counts.
    /// A discarded piece never comes back.
    IndependentCascade,
}

impl UpdateMechanism {
    /// Merge the seen records into the user's state.
    pub fn update(&self, user: &mut UserState, incoming: Vec<PropagatedInformation>) -> Vec<Arrival> {
        incoming
            .into_iter()
            .map(|record| {
                let info_id = record.info_id;
                let creators = record.creators.clone();
                let kind = user.receive(record, self);
                Arrival {
                    info_id,
                    creators,
                    kind,
                }
            })
            .collect()
    }

    /// Merge a repeated arrival into the record waiting in `received`.
    pub fn update_received(
        &self,
        old: &PropagatedInformation,
        new: PropagatedInformation,
    ) -> PropagatedInformation {
        let received_times = old.received_times.saturating_add(new.received_times);
        match self {
            Self::Newest => PropagatedInformation {
                info_id: new.info_id,
                iteration: old.iteration.max(new.iteration),
                received_times,
                creators: new.creators,
            },
            Self::Older | Self::IndependentCascade => {
                let mut creators = old.creators.clone();
                creators.extend(new.creators);
                PropagatedInformation {
                    info_id: old.info_id,
                    iteration: old.iteration.min(new.iteration),
                    received_times,
                    creators,
                }
            }
        }
    }

    /// Decide whether a discarded piece returns to `received`, and as what.
    pub fn update_discarded(
        &self,
        old: &PropagatedInformation,
        new: PropagatedInformation,
    ) -> Option<PropagatedInformation> {
        match self {
            Self::Newest => Some(new),
            Self::Older => Some(self.update_received(old, new)),
            Self::IndependentCascade => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(iteration: u64, creator: u32) -> PropagatedInformation {
        PropagatedInformation::new(InfoId::new(1), iteration, UserId::new(creator))
    }

    #[test]
    fn newest_keeps_latest_creators() {
        let merged = UpdateMechanism::Newest.update_received(&record(2, 5), record(4, 6));
        assert_eq!(merged.iteration, 4);
        assert_eq!(merged.received_times, 2);
        assert_eq!(merged.creators, BTreeSet::from([UserId::new(6)]));
    }

    #[test]
    fn older_keeps_first_iteration() {
        let merged = UpdateMechanism::Older.update_received(&record(2, 5), record(4, 6));
        assert_eq!(merged.iteration, 2);
        assert_eq!(merged.creators.len(), 2);
        assert!(
            UpdateMechanism::Older
                .update_discarded(&record(2, 5), record(4, 6))
                .is_some_and(|r| r.received_times == 2)
        );
    }

    #[test]
    fn cascade_activates_once() {
        let mut user = UserState::new(UserId::new(0), []);
        let update = UpdateMechanism::IndependentCascade;

        // Five distinct creators in the same iteration, already merged
        // into one inbox record.
        let mut inbox = record(3, 1);
        for creator in 2..=5 {
            inbox.absorb(&record(3, creator));
        }
        let arrivals = update.update(&mut user, vec![inbox]);
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals.first().unwrap().kind, ArrivalKind::New);

        let held = user.received().get(&InfoId::new(1)).unwrap();
        assert_eq!(held.received_times, 5);
        assert_eq!(held.creators.len(), 5);
        assert_eq!(held.iteration, 3);

        // A later arrival only adds to the counts.
        update.update(&mut user, vec![record(4, 9)]);
        let held = user.received().get(&InfoId::new(1)).unwrap();
        assert_eq!(held.received_times, 6);
        assert_eq!(held.creators.len(), 6);
        assert_eq!(held.iteration, 3);

        assert!(update.update_discarded(held, record(5, 7)).is_none());
    }

    #[test]
    fn sequential_cascade_arrivals_keep_first_iteration() {
        let mut user = UserState::new(UserId::new(0), []);
        let update = UpdateMechanism::IndependentCascade;
        let batch: Vec<PropagatedInformation> = (1..=5).map(|c| record(3, c)).collect();
        update.update(&mut user, batch);
        let held = user.received().get(&InfoId::new(1)).unwrap();
        assert_eq!(held.received_times, 5);
        assert_eq!(held.creators.len(), 5);
        assert_eq!(held.iteration, 3);
    }
}
