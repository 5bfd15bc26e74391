//! Deterministic, event-sourced simulation engine with time travel.
//!
//! [`orchestrator::SimulationEngine`] binds together:
//! - a scalable, pausable [`clock`]
//! - a durable [`chronicle_log`] event log and checkpoint store
//! - the [`chronicle_core`] event reducer
//! - an R*-tree [`spatial`] index kept in sync via internal handlers
//! - a 60Hz [`movement`] refresh loop for on-read position interpolation
//! - a sequential, typed/wildcard [`handlers`] dispatcher
//!
//! `seek` lets a caller rewind or fast-forward to any past simulation
//! time: the nearest checkpoint at or before the target is restored,
//! the remaining events are replayed into a scratch copy of world
//! state, and only a fully successful replay is swapped into the live
//! state.
//!
//! # Quick Start
//!
//! ```no_run
//! use chronicle_core::state::{Position, Velocity};
//! use chronicle_engine::config::EngineConfig;
//! use chronicle_engine::orchestrator::SimulationEngine;
//!
//! # async fn run() -> Result<(), chronicle_engine::error::ChronicleError> {
//! let engine = SimulationEngine::new(EngineConfig::default()).await?;
//! engine.start().await?;
//! let entity = engine
//!     .create_entity("tank", Position::ORIGIN, Velocity::ZERO)
//!     .await?;
//! engine.seek(0.0).await?;
//! assert!(engine.get_entity(entity).await.is_some());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod movement;
pub mod orchestrator;
pub mod spatial;

pub mod prelude {
    pub use crate::clock::{ClockState, SimulationClock};
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::error::ChronicleError;
    pub use crate::handlers::{EventHandler, FnHandler, HandlerError, HandlerRegistry};
    pub use crate::movement::{get_entity_position, interpolate_position, MovementSystem};
    pub use crate::orchestrator::{SimulationEngine, SimulationStatus};
    pub use crate::spatial::SpatialIndex;
}
