//! The world-state reducer: folds events into entity records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{Event, EventKind};

/// Canonical entity identity.
pub type EntityId = Uuid;

/// A point in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A velocity vector, read in the same units as [`Position`] per simulation second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Velocity {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// An entity as last recorded by the reducer.
///
/// `position` and `velocity` are the values set by the last applied
/// `entity.moved` event -- they are the inputs to interpolation, not
/// themselves continuously updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: EntityId,
    pub entity_type: String,
    pub position: Position,
    pub velocity: Velocity,
    pub heading: Option<f64>,
    pub max_speed: f64,
    pub metadata: crate::event::Payload,
    pub last_update_time: f64,
    pub created_at_sim_time: f64,
}

/// Default speed cap applied to a freshly created entity when the
/// `entity.created` payload doesn't specify one.
pub const DEFAULT_MAX_SPEED: f64 = 10.0;

fn read_str(event: &Event, field: &str) -> Option<String> {
    event.data.get(field)?.as_str().map(str::to_owned)
}

fn read_f64(event: &Event, field: &str) -> Option<f64> {
    event.data.get(field)?.as_f64()
}

fn read_position(event: &Event, prefix: &str, fallback: Position) -> Position {
    Position {
        x: read_f64(event, &format!("{prefix}_x")).unwrap_or(fallback.x),
        y: read_f64(event, &format!("{prefix}_y")).unwrap_or(fallback.y),
        z: read_f64(event, &format!("{prefix}_z")).unwrap_or(fallback.z),
    }
}

fn read_velocity(event: &Event, fallback: Velocity) -> Velocity {
    Velocity {
        x: read_f64(event, "velocity_x").unwrap_or(fallback.x),
        y: read_f64(event, "velocity_y").unwrap_or(fallback.y),
        z: read_f64(event, "velocity_z").unwrap_or(fallback.z),
    }
}

fn read_metadata(event: &Event) -> crate::event::Payload {
    match event.data.get("metadata").and_then(|v| v.as_object()) {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        None => crate::event::Payload::new(),
    }
}

/// The reduced world: every live entity, keyed by id.
///
/// `apply_event` is the sole mutator. It is total over recognized entity
/// kinds and a no-op over everything else (including well-formed events
/// of unrecognized kinds, which may still carry useful data for handlers
/// but do not change reduced state).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    entities: HashMap<EntityId, EntityRecord>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a single event into this state. Events of unrecognized kind,
    /// or recognized kinds missing the fields the reducer needs, are
    /// ignored rather than treated as errors -- validation is a separate,
    /// earlier concern.
    pub fn apply_event(&mut self, event: &Event) {
        match &event.event_kind {
            EventKind::EntityCreated => self.apply_entity_created(event),
            EventKind::EntityMoved => self.apply_entity_moved(event),
            EventKind::EntityDestroyed => self.apply_entity_destroyed(event),
            _ => {}
        }
    }

    fn apply_entity_created(&mut self, event: &Event) {
        let Some(entity_id) = read_str(event, "entity_id").and_then(|s| Uuid::parse_str(&s).ok())
        else {
            return;
        };
        let entity_type = read_str(event, "type").unwrap_or_default();
        let position = read_position(event, "position", Position::ORIGIN);
        let velocity = read_velocity(event, Velocity::ZERO);
        let max_speed = read_f64(event, "max_speed").unwrap_or(DEFAULT_MAX_SPEED);
        let metadata = read_metadata(event);

        self.entities.insert(
            entity_id,
            EntityRecord {
                entity_id,
                entity_type,
                position,
                velocity,
                heading: None,
                max_speed,
                metadata,
                last_update_time: event.simulation_time,
                created_at_sim_time: event.simulation_time,
            },
        );
    }

    fn apply_entity_moved(&mut self, event: &Event) {
        let Some(entity_id) = read_str(event, "entity_id").and_then(|s| Uuid::parse_str(&s).ok())
        else {
            return;
        };
        let Some(record) = self.entities.get_mut(&entity_id) else {
            return;
        };

        record.position = read_position(event, "position", record.position);
        record.velocity = read_velocity(event, record.velocity);
        if let Some(heading) = read_f64(event, "heading") {
            record.heading = Some(heading);
        }
        record.last_update_time = event.simulation_time;
    }

    fn apply_entity_destroyed(&mut self, event: &Event) {
        let Some(entity_id) = read_str(event, "entity_id").and_then(|s| Uuid::parse_str(&s).ok())
        else {
            return;
        };
        self.entities.remove(&entity_id);
    }

    pub fn get_entity(&self, entity_id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&entity_id)
    }

    pub fn get_entities_by_type<'a>(
        &'a self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a EntityRecord> {
        self.entities
            .values()
            .filter(move |record| record.entity_type == entity_type)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}
