//! Whole-run scenarios driven through the public API.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use ripple_core::catalog::{self, CatalogParams, ProtocolName};
use ripple_core::config::RunConfig;
use ripple_core::mechanisms::{
    ExpirationMechanism, PropagationMechanism, SelectionMechanism, SightMechanism,
    UpdateMechanism,
};
use ripple_core::runner::{IterationCallback, NoOpCallback, run_simulation};
use ripple_core::{
    DiffusionSimulator, Iteration, Limit, OperatorState, Protocol, SimulationEndReason,
    SimulationState,
};
use ripple_graph::{Data, DataBuilder};
use ripple_types::{EdgeKind, InfoId, InformationPiece, Orientation, UserId};

fn uid(n: u32) -> UserId {
    UserId::new(n)
}

fn iid(n: u32) -> InfoId {
    InfoId::new(n)
}

fn unbounded() -> Arc<OperatorState> {
    Arc::new(OperatorState::new(&RunConfig {
        max_iterations: 0,
        ..RunConfig::default()
    }))
}

/// Fails the run as soon as a user's buckets overlap.
struct DisjointnessCheck {
    checked: u64,
}

impl IterationCallback for DisjointnessCheck {
    fn on_iteration(&mut self, _iteration: &Iteration, state: &SimulationState) {
        for user in state.users() {
            assert!(user.is_consistent(), "overlapping buckets for {}", user.user());
        }
        self.checked = self.checked.saturating_add(1);
    }
}

/// Directed 4-cycle 0 -> 1 -> 2 -> 3 -> 0, each user authoring one piece.
fn four_cycle() -> Arc<Data> {
    let mut b = DataBuilder::new();
    for n in 0..4 {
        b.add_user(uid(n)).unwrap();
    }
    for (from, to) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
        b.add_edge(uid(from), uid(to), 1.0, EdgeKind::Regular).unwrap();
    }
    for n in 0..4 {
        b.add_piece(InformationPiece {
            id: iid(n),
            creator: uid(n),
            timestamp: 0,
        });
    }
    Arc::new(b.build().unwrap())
}

/// Twelve users on a ring with chords, a recommended edge every third user,
/// two pieces per user at spread-out timestamps and some ground-truth
/// re-shares.
fn mixed_network() -> Arc<Data> {
    let size: u32 = 12;
    let mut b = DataBuilder::new();
    for n in 0..size {
        b.add_user(uid(n)).unwrap();
    }
    for n in 0..size {
        let next = n.saturating_add(1).rem_euclid(size);
        let chord = n.saturating_add(5).rem_euclid(size);
        b.add_edge(uid(n), uid(next), 0.6, EdgeKind::Regular).unwrap();
        let kind = if n.rem_euclid(3) == 0 {
            EdgeKind::Recommended
        } else {
            EdgeKind::Regular
        };
        b.add_edge(uid(n), uid(chord), 0.3, kind).unwrap();
    }
    for n in 0..size {
        for k in 0..2_u32 {
            let id = n.saturating_mul(2).saturating_add(k);
            b.add_piece(InformationPiece {
                id: iid(id),
                creator: uid(n),
                timestamp: i64::from(n.rem_euclid(4)),
            });
        }
    }
    for n in 0..size {
        let reader = n.saturating_add(11).rem_euclid(size);
        let reshared_at = i64::from(n.rem_euclid(4)).saturating_add(1);
        b.add_real_propagation(uid(reader), iid(n.saturating_mul(2)), reshared_at);
    }
    Arc::new(b.build().unwrap())
}

#[test]
fn four_cycle_quiesces_after_one_hop() {
    let protocol = Protocol::new(
        SelectionMechanism::count(Limit::AtMost(1), Limit::NONE, Limit::NONE),
        ExpirationMechanism::AllNotPropagated,
        UpdateMechanism::Newest,
        PropagationMechanism::AllNeighbors {
            orientation: Orientation::Out,
        },
        SightMechanism::AllNotPropagated,
    )
    .unwrap();
    let mut sim = DiffusionSimulator::new(protocol, four_cycle(), 42);
    let result = run_simulation(&mut sim, &[], &unbounded(), &mut NoOpCallback).unwrap();

    assert_eq!(result.end_reason, SimulationEndReason::Quiescence);
    assert_eq!(result.total_iterations, 2);

    let first = result.iterations.first().unwrap();
    assert_eq!(first.propagated_count(), 4);
    for (from, to) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
        let exposures = first.receiving.get(&uid(to)).unwrap();
        assert_eq!(exposures.len(), 1);
        assert_eq!(
            exposures.get(&iid(from)),
            Some(&BTreeSet::from([uid(from)]))
        );
    }

    let second = result.iterations.last().unwrap();
    assert_eq!(second.propagated_count(), 0);
    assert_eq!(second.discarded_count(), 4);

    for user in sim.state().users() {
        assert_eq!(user.seen().len(), 2);
        assert!(user.own().is_empty());
        assert!(user.received().is_empty());
    }
}

#[test]
fn buckets_stay_disjoint_under_every_catalog_protocol() {
    let params = CatalogParams {
        threshold: Some(1),
        probability: Some(0.5),
        num_wait: Some(2),
        ..CatalogParams::default()
    };
    for name in ProtocolName::ALL {
        let protocol = catalog::build(name, &params).unwrap();
        let mut sim = DiffusionSimulator::new(protocol, mixed_network(), 7);
        let operator = Arc::new(OperatorState::new(&RunConfig {
            max_iterations: 25,
            ..RunConfig::default()
        }));
        let mut check = DisjointnessCheck { checked: 0 };
        let result = run_simulation(&mut sim, &[], &operator, &mut check).unwrap();
        assert_eq!(check.checked, result.total_iterations, "{name}");
        assert!(result.total_iterations > 0, "{name}");
    }
}

#[test]
fn same_seed_reproduces_the_run() {
    let params = CatalogParams::default();
    let run = |seed: u64| {
        let protocol = catalog::build(ProtocolName::BidirectionalRumorSpreading, &params).unwrap();
        let mut sim = DiffusionSimulator::new(protocol, mixed_network(), seed);
        let operator = Arc::new(OperatorState::new(&RunConfig {
            max_iterations: 10,
            ..RunConfig::default()
        }));
        let result = run_simulation(&mut sim, &[], &operator, &mut NoOpCallback).unwrap();
        (result.iterations, sim.state().clone())
    };
    assert_eq!(run(11), run(11));
}

#[test]
fn cascade_merges_five_creators_into_one_record() {
    // 0 authors piece 0; 1..=5 follow 0; 6 follows 1..=5.
    let mut b = DataBuilder::new();
    for n in 0..7 {
        b.add_user(uid(n)).unwrap();
    }
    for n in 1..6 {
        b.add_edge(uid(n), uid(0), 1.0, EdgeKind::Regular).unwrap();
        b.add_edge(uid(6), uid(n), 1.0, EdgeKind::Regular).unwrap();
    }
    b.add_piece(InformationPiece {
        id: iid(0),
        creator: uid(0),
        timestamp: 0,
    });
    let data = Arc::new(b.build().unwrap());

    let params = CatalogParams {
        probability: Some(1.0),
        ..CatalogParams::default()
    };
    let protocol = catalog::build(ProtocolName::IndependentCascade, &params).unwrap();
    let mut sim = DiffusionSimulator::new(protocol, data, 3);
    sim.run_iteration().unwrap();
    let second = sim.run_iteration().unwrap();

    let held = sim
        .state()
        .user(uid(6))
        .unwrap()
        .received()
        .get(&iid(0))
        .unwrap();
    assert_eq!(held.received_times, 5);
    assert_eq!(held.creators.len(), 5);
    assert_eq!(held.iteration, 1);
    assert_eq!(second.new_count(), 1);
}

#[test]
fn temporal_replay_releases_pieces_in_timestamp_order() {
    let params = CatalogParams::default();
    let protocol = catalog::build(ProtocolName::TemporalPure, &params).unwrap();
    let data = mixed_network();
    let mut sim = DiffusionSimulator::new(protocol, Arc::clone(&data), 1);
    let operator = Arc::new(OperatorState::new(&RunConfig {
        max_iterations: 30,
        ..RunConfig::default()
    }));
    let result = run_simulation(&mut sim, &[], &operator, &mut NoOpCallback).unwrap();

    for record in &result.iterations {
        for ids in record.propagating.values() {
            for id in ids {
                let piece = data.piece(*id).unwrap();
                assert!(record.timestamp.is_some_and(|now| piece.timestamp <= now));
            }
        }
    }
    // Every piece is released exactly once.
    let released: usize = result.iterations.iter().map(Iteration::propagated_count).sum();
    assert_eq!(released, data.piece_count());
}

#[test]
fn loose_replay_holds_reshares_until_their_real_timestamp() {
    // 1 follows 0 and 2 follows 1. User 1 re-shared piece 0 at timestamp 3.
    let mut b = DataBuilder::new();
    for n in 0..3 {
        b.add_user(uid(n)).unwrap();
    }
    b.add_edge(uid(1), uid(0), 1.0, EdgeKind::Regular).unwrap();
    b.add_edge(uid(2), uid(1), 1.0, EdgeKind::Regular).unwrap();
    b.add_piece(InformationPiece {
        id: iid(0),
        creator: uid(0),
        timestamp: 0,
    });
    // Nobody follows 2; its pieces only fill in timestamps 1 and 2.
    for (id, ts) in [(1, 1), (2, 2)] {
        b.add_piece(InformationPiece {
            id: iid(id),
            creator: uid(2),
            timestamp: ts,
        });
    }
    b.add_real_propagation(uid(1), iid(0), 3);
    let data = Arc::new(b.build().unwrap());

    let protocol = catalog::build(ProtocolName::TemporalLoose, &CatalogParams::default()).unwrap();
    let mut sim = DiffusionSimulator::new(protocol, data, 5);

    let arrival = sim.run_iteration().unwrap();
    assert!(arrival.receiving.get(&uid(1)).unwrap().contains_key(&iid(0)));

    for _ in 1..3 {
        let waiting = sim.run_iteration().unwrap();
        assert!(!waiting.propagating.contains_key(&uid(1)), "{waiting:?}");
        assert!(
            sim.state()
                .user(uid(1))
                .unwrap()
                .contains_received(iid(0))
        );
    }

    let due = sim.run_iteration().unwrap();
    assert_eq!(due.timestamp, Some(3));
    assert_eq!(due.propagating.get(&uid(1)), Some(&vec![iid(0)]));
    assert!(due.receiving.get(&uid(2)).unwrap().contains_key(&iid(0)));
}
