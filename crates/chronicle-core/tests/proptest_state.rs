//! Random event-sequence properties for the world-state reducer.

use std::collections::HashSet;

use chronicle_core::event::{Event, EventKind, Payload};
use chronicle_core::state::{Position, WorldState};
use proptest::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum StateOp {
    Create,
    Move(usize),
    Destroy(usize),
}

fn state_op_strategy() -> impl Strategy<Value = StateOp> {
    prop_oneof![
        Just(StateOp::Create),
        (0usize..8).prop_map(StateOp::Move),
        (0usize..8).prop_map(StateOp::Destroy),
    ]
}

fn created_event(time: f64, entity_id: Uuid) -> Event {
    Event::new(
        time,
        EventKind::EntityCreated,
        Payload::from([
            ("entity_id".to_owned(), serde_json::json!(entity_id.to_string())),
            ("type".to_owned(), serde_json::json!("tank")),
        ]),
    )
}

fn moved_event(time: f64, entity_id: Uuid) -> Event {
    Event::new(
        time,
        EventKind::EntityMoved,
        Payload::from([
            ("entity_id".to_owned(), serde_json::json!(entity_id.to_string())),
            ("position_x".to_owned(), serde_json::json!(time)),
        ]),
    )
}

fn destroyed_event(time: f64, entity_id: Uuid) -> Event {
    Event::new(
        time,
        EventKind::EntityDestroyed,
        Payload::from([("entity_id".to_owned(), serde_json::json!(entity_id.to_string()))]),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    /// Random create/move/destroy sequences keep the reducer's entity
    /// count equal to the number of ids created-but-not-yet-destroyed,
    /// and every live entity's `last_update_time` matches the time of
    /// the most recent event that touched it.
    #[test]
    fn random_event_sequences_preserve_invariants(ops in prop::collection::vec(state_op_strategy(), 1..60)) {
        let mut state = WorldState::new();
        let mut live: Vec<Uuid> = Vec::new();
        let mut last_time_by_id = std::collections::HashMap::new();
        let mut time = 0.0_f64;

        for op in ops {
            time += 1.0;
            match op {
                StateOp::Create => {
                    let entity_id = Uuid::new_v4();
                    state.apply_event(&created_event(time, entity_id));
                    live.push(entity_id);
                    last_time_by_id.insert(entity_id, time);
                }
                StateOp::Move(idx) => {
                    if live.is_empty() {
                        continue;
                    }
                    let entity_id = live[idx % live.len()];
                    state.apply_event(&moved_event(time, entity_id));
                    last_time_by_id.insert(entity_id, time);
                }
                StateOp::Destroy(idx) => {
                    if live.is_empty() {
                        continue;
                    }
                    let pos = idx % live.len();
                    let entity_id = live.remove(pos);
                    state.apply_event(&destroyed_event(time, entity_id));
                    last_time_by_id.remove(&entity_id);
                }
            }

            let live_set: HashSet<Uuid> = live.iter().copied().collect();
            prop_assert_eq!(state.entity_count(), live_set.len());

            for entity_id in &live_set {
                let record = state.get_entity(*entity_id);
                prop_assert!(record.is_some());
                let record = record.unwrap();
                prop_assert_eq!(record.last_update_time, last_time_by_id[entity_id]);
            }
        }
    }
}

#[test]
fn position_default_is_origin() {
    assert_eq!(Position::default(), Position::ORIGIN);
}
