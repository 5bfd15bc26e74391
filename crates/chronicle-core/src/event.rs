//! The immutable [`Event`] value type and its recognized kinds.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, hashable event identity.
pub type EventId = Uuid;

/// Groups causally-related events together (e.g. all events emitted while
/// handling a single external command).
pub type CorrelationId = Uuid;

/// A recognized event kind, or an open string slot for kinds the validator
/// and reducer do not recognize. Unrecognized kinds are always accepted --
/// they simply skip validation and leave entity state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EventKind {
    SimulationStarted,
    SimulationPaused,
    SimulationResumed,
    SimulationStopped,
    TimeScaled,
    MarkerCreated,
    EntityCreated,
    EntityMoved,
    EntityDestroyed,
    CheckpointCreated,
    CheckpointRestored,
    /// Any kind not in the fixed enumeration above.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SimulationStarted => "simulation.started",
            Self::SimulationPaused => "simulation.paused",
            Self::SimulationResumed => "simulation.resumed",
            Self::SimulationStopped => "simulation.stopped",
            Self::TimeScaled => "time.scaled",
            Self::MarkerCreated => "marker.created",
            Self::EntityCreated => "entity.created",
            Self::EntityMoved => "entity.moved",
            Self::EntityDestroyed => "entity.destroyed",
            Self::CheckpointCreated => "checkpoint.created",
            Self::CheckpointRestored => "checkpoint.restored",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "simulation.started" => Self::SimulationStarted,
            "simulation.paused" => Self::SimulationPaused,
            "simulation.resumed" => Self::SimulationResumed,
            "simulation.stopped" => Self::SimulationStopped,
            "time.scaled" => Self::TimeScaled,
            "marker.created" => Self::MarkerCreated,
            "entity.created" => Self::EntityCreated,
            "entity.moved" => Self::EntityMoved,
            "entity.destroyed" => Self::EntityDestroyed,
            "checkpoint.created" => Self::CheckpointCreated,
            "checkpoint.restored" => Self::CheckpointRestored,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventKind> for String {
    fn from(k: EventKind) -> Self {
        k.as_str().to_owned()
    }
}

impl TryFrom<String> for EventKind {
    type Error = std::convert::Infallible;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(Self::from(s))
    }
}

/// Schemaless key -> value payload. Implemented over [`serde_json::Value`]
/// so that any JSON-representable data can ride in `data`/`metadata`
/// without the validator needing per-caller generic parameters.
pub type Payload = HashMap<String, serde_json::Value>;

/// An immutable record of a state change.
///
/// Once constructed, an `Event` is never mutated. Equality and hashing are
/// defined over `event_id` alone -- two events with the same id are the
/// same event regardless of payload (the payload cannot change anyway).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub simulation_time: f64,
    pub event_kind: EventKind,
    pub data: Payload,
    pub metadata: Payload,
    pub causation_id: Option<EventId>,
    pub correlation_id: Option<CorrelationId>,
    pub created_at: DateTime<Utc>,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}
impl Eq for Event {}

impl std::hash::Hash for Event {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

impl Event {
    /// Build an event with a fresh id and `created_at = now()`.
    pub fn new(simulation_time: f64, event_kind: impl Into<EventKind>, data: Payload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            simulation_time,
            event_kind: event_kind.into(),
            data,
            metadata: Payload::new(),
            causation_id: None,
            correlation_id: None,
            created_at: Utc::now(),
        }
    }

    /// Build an event caused by another event, inheriting its correlation id.
    pub fn caused_by(
        simulation_time: f64,
        event_kind: impl Into<EventKind>,
        data: Payload,
        cause: &Event,
    ) -> Self {
        let mut event = Self::new(simulation_time, event_kind, data);
        event.causation_id = Some(cause.event_id);
        event.correlation_id = Some(cause.correlation_id.unwrap_or(cause.event_id));
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_through_string() {
        for kind in [
            EventKind::SimulationStarted,
            EventKind::EntityMoved,
            EventKind::Other("custom.thing".to_owned()),
        ] {
            let s = kind.as_str().to_owned();
            assert_eq!(EventKind::from(s), kind);
        }
    }

    #[test]
    fn unknown_kind_round_trips_as_other() {
        let kind = EventKind::from("something.unrecognized");
        assert_eq!(kind, EventKind::Other("something.unrecognized".to_owned()));
    }

    #[test]
    fn equality_and_hash_are_by_event_id_only() {
        let mut a = Event::new(0.0, EventKind::MarkerCreated, Payload::new());
        let b = a.clone();
        a.data.insert("x".into(), serde_json::json!(1));
        // Still equal: payload mutation (on the clone, pre-split) doesn't matter,
        // identity is carried by event_id alone.
        assert_eq!(a, b);
    }

    #[test]
    fn caused_by_inherits_correlation_id() {
        let root = Event::new(0.0, EventKind::SimulationStarted, Payload::new());
        let child = Event::caused_by(1.0, EventKind::MarkerCreated, Payload::new(), &root);
        assert_eq!(child.causation_id, Some(root.event_id));
        assert_eq!(child.correlation_id, Some(root.event_id));
    }

    #[test]
    fn serialization_round_trip() {
        let event = Event::new(
            3.5,
            EventKind::EntityCreated,
            Payload::from([("type".to_owned(), serde_json::json!("tank"))]),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, event.event_id);
        assert_eq!(back.event_kind, event.event_kind);
        assert_eq!(back.data, event.data);
    }
}
