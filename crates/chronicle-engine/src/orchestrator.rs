//! The simulation orchestrator: binds the clock, event log, checkpoint
//! store, reducer, spatial index, movement system, and handler registry
//! into one coherent API.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use chronicle_core::event::{Event, EventKind, Payload};
use chronicle_core::state::{DEFAULT_MAX_SPEED, EntityId, EntityRecord, Position, Velocity, WorldState};
use chronicle_core::validator::EventValidator;
use chronicle_log::checkpoint::CheckpointStore;
use chronicle_log::event_log::EventLog;

use crate::clock::{format_time, ClockState, SimulationClock};
use crate::config::{ConfigError, EngineConfig};
use crate::error::ChronicleError;
use crate::handlers::{FnHandler, HandlerRegistry};
use crate::movement::{get_entity_position as interpolated_position, MovementSystem};
use crate::spatial::SpatialIndex;

fn position_from_payload(data: &Payload, prefix: &str, fallback: Position) -> Position {
    let read = |field: &str| data.get(field).and_then(|v| v.as_f64());
    Position::new(
        read(&format!("{prefix}_x")).unwrap_or(fallback.x),
        read(&format!("{prefix}_y")).unwrap_or(fallback.y),
        read(&format!("{prefix}_z")).unwrap_or(fallback.z),
    )
}

fn entity_id_from_payload(data: &Payload) -> Option<EntityId> {
    data.get("entity_id")?.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

/// A snapshot of the orchestrator's current status, as returned by
/// [`SimulationEngine::get_status`].
#[derive(Debug, Clone)]
pub struct SimulationStatus {
    pub simulation_id: Uuid,
    pub simulation_time: f64,
    pub running: bool,
    pub clock_state: ClockState,
    pub time_scale: f64,
    pub event_count: usize,
    pub entity_count: usize,
    pub formatted_time: String,
}

/// Binds every subsystem together behind one deterministic API.
pub struct SimulationEngine {
    simulation_id: Uuid,
    clock: SimulationClock,
    movement: MovementSystem,
    event_log: Arc<Mutex<EventLog>>,
    checkpoints: Arc<Mutex<CheckpointStore>>,
    state: Arc<Mutex<WorldState>>,
    spatial_index: Arc<Mutex<SpatialIndex>>,
    handlers: Arc<Mutex<HandlerRegistry>>,
    fail_fast_handlers: bool,
}

impl SimulationEngine {
    /// Open the event log and checkpoint store at the configured paths,
    /// replaying nothing yet -- callers that want to resume an existing
    /// simulation should follow construction with `seek` to the desired
    /// time. Registers the internal handlers that keep the spatial index
    /// in sync with entity lifecycle events.
    pub async fn new(config: EngineConfig) -> Result<Self, ChronicleError> {
        config.validate()?;
        Self::open(
            config.event_log_path,
            config.checkpoint_dir,
            config.checkpoint_interval,
            config.fail_fast_handlers,
            config.initial_time_scale,
        )
        .await
    }

    async fn open(
        event_log_path: impl AsRef<Path>,
        checkpoint_dir: impl AsRef<Path>,
        checkpoint_interval: f64,
        fail_fast_handlers: bool,
        initial_time_scale: f64,
    ) -> Result<Self, ChronicleError> {
        let event_log = EventLog::open(event_log_path)?;
        let checkpoints = CheckpointStore::open(checkpoint_dir, checkpoint_interval)?;

        let spatial_index = Arc::new(Mutex::new(SpatialIndex::new()));
        let mut handlers = HandlerRegistry::new();
        register_spatial_sync_handlers(&mut handlers, Arc::clone(&spatial_index));

        let engine = Self {
            simulation_id: Uuid::new_v4(),
            clock: SimulationClock::with_time_scale(initial_time_scale),
            movement: MovementSystem::new(),
            event_log: Arc::new(Mutex::new(event_log)),
            checkpoints: Arc::new(Mutex::new(checkpoints)),
            state: Arc::new(Mutex::new(WorldState::new())),
            spatial_index,
            handlers: Arc::new(Mutex::new(handlers)),
            fail_fast_handlers,
        };

        Ok(engine)
    }

    // -- lifecycle -----------------------------------------------------

    pub async fn start(&self) -> Result<Event, ChronicleError> {
        self.clock.start().await;
        self.spawn_movement_loop().await;

        let time_scale = self.clock.time_scale().await;
        self.emit_event(
            EventKind::SimulationStarted,
            Payload::from([
                ("simulation_id".to_owned(), serde_json::json!(self.simulation_id.to_string())),
                ("time_scale".to_owned(), serde_json::json!(time_scale)),
            ]),
        )
        .await
    }

    /// Spawn the movement loop's `on_tick`, which refreshes the spatial
    /// index with every moving entity's interpolated position each frame
    /// -- the index would otherwise go stale between `entity.moved`
    /// events. A no-op if the loop is already running.
    async fn spawn_movement_loop(&self) {
        let state = Arc::clone(&self.state);
        let spatial_index = Arc::clone(&self.spatial_index);
        let clock = self.clock.clone();

        self.movement
            .start(move || {
                let state = Arc::clone(&state);
                let spatial_index = Arc::clone(&spatial_index);
                let clock = clock.clone();
                async move {
                    let current_time = clock.get_time().await;
                    let state = state.lock().await;
                    let mut index = spatial_index.lock().await;
                    for record in state.entities() {
                        if record.velocity != Velocity::ZERO {
                            let position = interpolated_position(record, current_time);
                            index.update(record.entity_id, position);
                        }
                    }
                }
            })
            .await;
    }

    pub async fn pause(&self) -> Result<Event, ChronicleError> {
        self.clock.pause().await;
        let paused_at = self.clock.get_time().await;
        self.emit_event(
            EventKind::SimulationPaused,
            Payload::from([
                ("simulation_id".to_owned(), serde_json::json!(self.simulation_id.to_string())),
                ("paused_at".to_owned(), serde_json::json!(paused_at)),
            ]),
        )
        .await
    }

    pub async fn resume(&self) {
        self.clock.resume().await;
    }

    pub async fn stop(&self) -> Result<Event, ChronicleError> {
        self.movement.stop().await;
        self.clock.stop().await;
        self.emit_event(
            EventKind::SimulationStopped,
            Payload::from([(
                "simulation_id".to_owned(),
                serde_json::json!(self.simulation_id.to_string()),
            )]),
        )
        .await
    }

    /// Stop the simulation, then close the event log. The engine must not
    /// be used again after this returns.
    pub async fn shutdown(&self) -> Result<(), ChronicleError> {
        self.stop().await?;
        self.event_log.lock().await.close()?;
        Ok(())
    }

    pub async fn set_time_scale(&self, new_scale: f64) -> Result<Event, ChronicleError> {
        if new_scale <= 0.0 {
            return Err(ConfigError::InvalidTimeScale(new_scale).into());
        }

        let old_scale = self.clock.time_scale().await;
        self.clock.set_time_scale(new_scale).await;
        self.emit_event(
            EventKind::TimeScaled,
            Payload::from([
                ("old_scale".to_owned(), serde_json::json!(old_scale)),
                ("new_scale".to_owned(), serde_json::json!(new_scale)),
            ]),
        )
        .await
    }

    pub async fn create_marker(&self, label: impl Into<String>) -> Result<Event, ChronicleError> {
        self.emit_event(
            EventKind::MarkerCreated,
            Payload::from([("label".to_owned(), serde_json::json!(label.into()))]),
        )
        .await
    }

    // -- entities --------------------------------------------------------

    pub async fn create_entity(
        &self,
        entity_type: impl Into<String>,
        position: Position,
        velocity: Velocity,
    ) -> Result<EntityId, ChronicleError> {
        self.create_entity_with(entity_type, position, velocity, DEFAULT_MAX_SPEED, Payload::new())
            .await
    }

    /// Full form of [`Self::create_entity`], taking an explicit speed cap
    /// and free-form metadata payload.
    pub async fn create_entity_with(
        &self,
        entity_type: impl Into<String>,
        position: Position,
        velocity: Velocity,
        max_speed: f64,
        metadata: Payload,
    ) -> Result<EntityId, ChronicleError> {
        let entity_id = Uuid::new_v4();
        self.emit_event(
            EventKind::EntityCreated,
            Payload::from([
                ("entity_id".to_owned(), serde_json::json!(entity_id.to_string())),
                ("type".to_owned(), serde_json::json!(entity_type.into())),
                ("position_x".to_owned(), serde_json::json!(position.x)),
                ("position_y".to_owned(), serde_json::json!(position.y)),
                ("position_z".to_owned(), serde_json::json!(position.z)),
                ("velocity_x".to_owned(), serde_json::json!(velocity.x)),
                ("velocity_y".to_owned(), serde_json::json!(velocity.y)),
                ("velocity_z".to_owned(), serde_json::json!(velocity.z)),
                ("max_speed".to_owned(), serde_json::json!(max_speed)),
                ("metadata".to_owned(), serde_json::json!(metadata)),
            ]),
        )
        .await?;
        Ok(entity_id)
    }

    pub async fn destroy_entity(&self, entity_id: EntityId) -> Result<Event, ChronicleError> {
        self.emit_event(
            EventKind::EntityDestroyed,
            Payload::from([(
                "entity_id".to_owned(),
                serde_json::json!(entity_id.to_string()),
            )]),
        )
        .await
    }

    /// Compute the entity's current interpolated position and emit an
    /// `entity.moved` event recording it alongside the new velocity --
    /// position is only ever set via an applied event, never mutated
    /// directly.
    pub async fn set_entity_velocity(
        &self,
        entity_id: EntityId,
        velocity: Velocity,
    ) -> Result<Event, ChronicleError> {
        let current_time = self.clock.get_time().await;
        let position = {
            let state = self.state.lock().await;
            let record = state
                .get_entity(entity_id)
                .ok_or_else(|| ChronicleError::EntityNotFound {
                    entity_id: entity_id.to_string(),
                })?;
            interpolated_position(record, current_time)
        };

        self.emit_event(
            EventKind::EntityMoved,
            Payload::from([
                ("entity_id".to_owned(), serde_json::json!(entity_id.to_string())),
                ("position_x".to_owned(), serde_json::json!(position.x)),
                ("position_y".to_owned(), serde_json::json!(position.y)),
                ("position_z".to_owned(), serde_json::json!(position.z)),
                ("velocity_x".to_owned(), serde_json::json!(velocity.x)),
                ("velocity_y".to_owned(), serde_json::json!(velocity.y)),
                ("velocity_z".to_owned(), serde_json::json!(velocity.z)),
            ]),
        )
        .await
    }

    pub async fn get_entity_position(&self, entity_id: EntityId) -> Option<Position> {
        let current_time = self.clock.get_time().await;
        let state = self.state.lock().await;
        state
            .get_entity(entity_id)
            .map(|record| interpolated_position(record, current_time))
    }

    pub async fn get_entity(&self, entity_id: EntityId) -> Option<EntityRecord> {
        self.state.lock().await.get_entity(entity_id).cloned()
    }

    pub async fn get_entities_by_type(&self, entity_type: &str) -> Vec<EntityRecord> {
        self.state
            .lock()
            .await
            .get_entities_by_type(entity_type)
            .cloned()
            .collect()
    }

    pub async fn query_entities_in_radius(
        &self,
        center: Position,
        radius: f64,
        include_z: bool,
    ) -> Vec<EntityId> {
        self.spatial_index
            .lock()
            .await
            .query_radius(center, radius, include_z)
    }

    // -- handlers --------------------------------------------------------

    pub async fn on_event<F, Fut>(&self, kind: EventKind, name: impl Into<String>, func: F)
    where
        F: Fn(&Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), crate::handlers::HandlerError>> + Send + 'static,
    {
        self.handlers
            .lock()
            .await
            .on(kind, Arc::new(FnHandler::new(name, func)));
    }

    // -- emission ----------------------------------------------------------

    /// Build, validate, persist, apply, and dispatch an event at the
    /// current simulation time, then checkpoint if due.
    pub async fn emit_event(
        &self,
        kind: EventKind,
        data: Payload,
    ) -> Result<Event, ChronicleError> {
        let simulation_time = self.clock.get_time().await;
        let event = Event::new(simulation_time, kind, data);

        EventValidator::validate(&event)?;

        self.event_log.lock().await.append(&event)?;

        {
            let mut state = self.state.lock().await;
            state.apply_event(&event);
        }

        self.handlers
            .lock()
            .await
            .dispatch(&event, self.fail_fast_handlers)
            .await?;

        let should_checkpoint = self
            .checkpoints
            .lock()
            .await
            .should_create_checkpoint(simulation_time);
        if should_checkpoint {
            let state = self.state.lock().await;
            self.checkpoints.lock().await.save(simulation_time, &state)?;
        }

        Ok(event)
    }

    // -- time travel -------------------------------------------------------

    /// Rewind or fast-forward to `target`: find the nearest checkpoint at
    /// or before `target`, replay every event between it and `target`
    /// into a fresh local state, rebuild the spatial index from that
    /// state, and only then swap it into `self.state` -- a failure at
    /// any step leaves the live state untouched.
    pub async fn seek(&self, target: f64) -> Result<(), ChronicleError> {
        if target < 0.0 {
            return Err(ChronicleError::InvalidSeekTarget { target });
        }

        let (replay_from, mut replayed_state) = {
            let checkpoints = self.checkpoints.lock().await;
            match checkpoints.get_nearest_before(target)? {
                Some((time, state)) => (time, state),
                None => (0.0, WorldState::new()),
            }
        };

        let events = self.event_log.lock().await.get_events(replay_from, target)?;
        for event in &events {
            replayed_state.apply_event(event);
        }

        let mut replayed_index = SpatialIndex::new();
        for record in replayed_state.entities() {
            replayed_index.insert(record.entity_id, record.position);
        }

        {
            let mut state = self.state.lock().await;
            *state = replayed_state;
        }
        {
            let mut index = self.spatial_index.lock().await;
            *index = replayed_index;
        }

        self.clock.seek(target).await;

        tracing::info!(target, replay_from, events_replayed = events.len(), "simulation.seek.completed");

        Ok(())
    }

    pub async fn get_status(&self) -> SimulationStatus {
        let simulation_time = self.clock.get_time().await;
        let clock_state = self.clock.state().await;
        SimulationStatus {
            simulation_id: self.simulation_id,
            simulation_time,
            running: matches!(clock_state, ClockState::Running),
            clock_state,
            time_scale: self.clock.time_scale().await,
            event_count: self.event_log.lock().await.event_count(),
            entity_count: self.state.lock().await.entity_count(),
            formatted_time: format_time(simulation_time),
        }
    }

    /// Return every persisted event in `[from_time, to_time]` (open-ended
    /// above when `to_time` is `None`), optionally filtered to one kind,
    /// in canonical (append) order.
    pub async fn query_events(
        &self,
        from_time: f64,
        to_time: Option<f64>,
        kind: Option<EventKind>,
    ) -> Result<Vec<Event>, ChronicleError> {
        let to_time = to_time.unwrap_or(f64::INFINITY);
        let events = self.event_log.lock().await.get_events(from_time, to_time)?;
        Ok(match kind {
            Some(kind) => events.into_iter().filter(|e| e.event_kind == kind).collect(),
            None => events,
        })
    }

    // -- handlers (continued) --------------------------------------------

    /// Subscribe a handler to every event kind, regardless of type.
    pub async fn subscribe_all<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), crate::handlers::HandlerError>> + Send + 'static,
    {
        self.handlers
            .lock()
            .await
            .on_all(Arc::new(FnHandler::new(name, func)));
    }

    /// Remove the named handler previously subscribed to `kind` via
    /// [`Self::on_event`].
    pub async fn unsubscribe(&self, kind: &EventKind, handler_name: &str) {
        self.handlers.lock().await.off(kind, handler_name);
    }

    /// Remove the named handler previously subscribed via
    /// [`Self::subscribe_all`].
    pub async fn unsubscribe_all(&self, handler_name: &str) {
        self.handlers.lock().await.off_all(handler_name);
    }
}

fn register_spatial_sync_handlers(registry: &mut HandlerRegistry, index: Arc<Mutex<SpatialIndex>>) {
    let insert_index = Arc::clone(&index);
    registry.on(
        EventKind::EntityCreated,
        Arc::new(FnHandler::new("spatial_index.sync_created", move |event: &Event| {
            let index = Arc::clone(&insert_index);
            let entity_id = entity_id_from_payload(&event.data);
            let position = position_from_payload(&event.data, "position", Position::ORIGIN);
            async move {
                if let Some(entity_id) = entity_id {
                    index.lock().await.insert(entity_id, position);
                }
                Ok(())
            }
        })),
    );

    let update_index = Arc::clone(&index);
    registry.on(
        EventKind::EntityMoved,
        Arc::new(FnHandler::new("spatial_index.sync_moved", move |event: &Event| {
            let index = Arc::clone(&update_index);
            let entity_id = entity_id_from_payload(&event.data);
            let position = position_from_payload(&event.data, "position", Position::ORIGIN);
            async move {
                if let Some(entity_id) = entity_id {
                    index.lock().await.update(entity_id, position);
                }
                Ok(())
            }
        })),
    );

    let remove_index = Arc::clone(&index);
    registry.on(
        EventKind::EntityDestroyed,
        Arc::new(FnHandler::new("spatial_index.sync_destroyed", move |event: &Event| {
            let index = Arc::clone(&remove_index);
            let entity_id = entity_id_from_payload(&event.data);
            async move {
                if let Some(entity_id) = entity_id {
                    index.lock().await.remove(entity_id);
                }
                Ok(())
            }
        })),
    );
}
