//! Static schema validation for recognized event kinds.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;

use crate::event::{Event, EventKind};

/// An error produced while validating an event against its schema.
#[derive(Debug, thiserror::Error)]
#[error("event {event_kind} failed validation: {reason}")]
pub struct EventValidationError {
    pub event_kind: String,
    pub reason: String,
}

/// The primitive JSON types a schema field may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Bool,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
        }
    }
}

struct Schema {
    required: &'static [(&'static str, FieldType)],
}

fn schema_table() -> &'static HashMap<EventKind, Schema> {
    static TABLE: OnceLock<HashMap<EventKind, Schema>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            (
                EventKind::SimulationStarted,
                Schema {
                    required: &[
                        ("simulation_id", FieldType::String),
                        ("time_scale", FieldType::Number),
                    ],
                },
            ),
            (
                EventKind::SimulationPaused,
                Schema {
                    required: &[
                        ("simulation_id", FieldType::String),
                        ("paused_at", FieldType::Number),
                    ],
                },
            ),
            (
                EventKind::SimulationStopped,
                Schema {
                    required: &[("simulation_id", FieldType::String)],
                },
            ),
            (
                EventKind::TimeScaled,
                Schema {
                    required: &[
                        ("old_scale", FieldType::Number),
                        ("new_scale", FieldType::Number),
                    ],
                },
            ),
            (
                EventKind::MarkerCreated,
                Schema {
                    required: &[("label", FieldType::String)],
                },
            ),
            (
                EventKind::EntityCreated,
                Schema {
                    required: &[
                        ("entity_id", FieldType::String),
                        ("type", FieldType::String),
                    ],
                },
            ),
            (
                EventKind::EntityMoved,
                Schema {
                    required: &[("entity_id", FieldType::String)],
                },
            ),
            (
                EventKind::EntityDestroyed,
                Schema {
                    required: &[("entity_id", FieldType::String)],
                },
            ),
        ])
    })
}

/// Validates events against the static schema table.
///
/// Unrecognized kinds are never rejected -- they simply skip validation,
/// preserving both the acceptance and the skip-on-unknown behavior of the
/// system this engine models.
pub struct EventValidator;

impl EventValidator {
    /// Validate `event`. Returns `Err` on a missing required field or a
    /// type mismatch; unrecognized kinds always pass.
    pub fn validate(event: &Event) -> Result<(), EventValidationError> {
        let Some(schema) = schema_table().get(&event.event_kind) else {
            return Ok(());
        };

        for (field, expected_type) in schema.required {
            let Some(value) = event.data.get(*field) else {
                return Err(EventValidationError {
                    event_kind: event.event_kind.to_string(),
                    reason: format!("missing required field '{field}'"),
                });
            };
            if !expected_type.matches(value) {
                return Err(EventValidationError {
                    event_kind: event.event_kind.to_string(),
                    reason: format!(
                        "field '{field}' has wrong type: expected {}, got {value}",
                        expected_type.name()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Check validity without raising. Calling this repeatedly never
    /// mutates `event` -- validation is a pure read of its payload.
    pub fn is_valid(event: &Event) -> bool {
        Self::validate(event).is_ok()
    }
}
