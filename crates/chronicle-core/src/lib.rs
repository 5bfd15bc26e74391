//! Core domain types for a deterministic, event-sourced simulation engine.
//!
//! This crate defines the immutable [`Event`](event::Event) record, the
//! schema validator that checks recognized event kinds against their
//! required fields, and the [`WorldState`](state::WorldState) reducer that
//! folds a stream of events into live entity records. None of these types
//! touch disk, the clock, or async runtime state -- that lives in the
//! crates built on top of this one.
//!
//! # Quick Start
//!
//! ```
//! use chronicle_core::prelude::*;
//!
//! let entity_id = uuid::Uuid::new_v4();
//! let created = Event::new(
//!     0.0,
//!     EventKind::EntityCreated,
//!     Payload::from([
//!         ("entity_id".to_owned(), serde_json::json!(entity_id.to_string())),
//!         ("type".to_owned(), serde_json::json!("tank")),
//!     ]),
//! );
//! assert!(EventValidator::is_valid(&created));
//!
//! let mut state = WorldState::new();
//! state.apply_event(&created);
//! assert_eq!(state.entity_count(), 1);
//! ```

#![deny(unsafe_code)]

pub mod event;
pub mod state;
pub mod validator;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::event::{CorrelationId, Event, EventId, EventKind, Payload};
    pub use crate::state::{EntityId, EntityRecord, Position, Velocity, WorldState};
    pub use crate::validator::{EventValidationError, EventValidator};
}
