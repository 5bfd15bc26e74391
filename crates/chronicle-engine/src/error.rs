//! Unified error surface for the orchestrator.

use chronicle_core::validator::EventValidationError;
use chronicle_log::checkpoint::CheckpointError;
use chronicle_log::event_log::EventLogError;

use crate::config::ConfigError;
use crate::handlers::HandlerError;

/// Errors that can surface from the public [`SimulationEngine`](crate::orchestrator::SimulationEngine) API.
#[derive(Debug, thiserror::Error)]
pub enum ChronicleError {
    #[error("event validation failed: {0}")]
    Validation(#[from] EventValidationError),

    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("entity {entity_id} not found")]
    EntityNotFound { entity_id: String },

    #[error("seek target {target} is before simulation start (t=0)")]
    InvalidSeekTarget { target: f64 },
}
