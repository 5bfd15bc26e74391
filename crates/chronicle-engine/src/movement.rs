//! Velocity-driven position interpolation.
//!
//! Entity position is only ever written by applying an `entity.moved`
//! event to [`WorldState`](chronicle_core::state::WorldState); nothing in
//! this module mutates stored state. Instead, [`interpolate_position`]
//! computes where an entity *currently* is by projecting its last known
//! position forward along its last known velocity. The background loop
//! in [`MovementSystem`] uses this to keep the spatial index current
//! between `entity.moved` events, at a fixed 60Hz cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use chronicle_core::state::{EntityRecord, Position, Velocity};

use crate::clock::TICK_HZ;

const TARGET_FRAME_TIME: Duration = Duration::from_nanos(1_000_000_000 / TICK_HZ);

/// `p_new = p_last + v * (current_time - last_update_time)`.
pub fn interpolate_position(
    position: Position,
    velocity: Velocity,
    last_update_time: f64,
    current_time: f64,
) -> Position {
    let dt = current_time - last_update_time;
    Position::new(
        position.x + velocity.x * dt,
        position.y + velocity.y * dt,
        position.z + velocity.z * dt,
    )
}

/// Read an entity's interpolated position as of `current_time`.
pub fn get_entity_position(record: &EntityRecord, current_time: f64) -> Position {
    interpolate_position(
        record.position,
        record.velocity,
        record.last_update_time,
        current_time,
    )
}

/// Drives a periodic refresh of interpolated positions into the spatial
/// index at a fixed 60Hz cadence. The refresh logic itself is supplied by
/// the caller (the orchestrator, which owns both the world state and the
/// spatial index) as an async callback; this type only owns the pacing
/// and the cancellable background task.
pub struct MovementSystem {
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MovementSystem {
    pub fn new() -> Self {
        Self {
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the 60Hz refresh loop. `on_tick` is invoked once per frame;
    /// a frame running more than twice the target duration logs a
    /// slow-frame warning rather than failing.
    pub async fn start<F, Fut>(&self, mut on_tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        if self.task.lock().await.is_some() {
            return;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TARGET_FRAME_TIME);
            loop {
                ticker.tick().await;
                let frame_start = Instant::now();
                on_tick().await;
                let elapsed = frame_start.elapsed();
                if elapsed > TARGET_FRAME_TIME * 2 {
                    warn!(?elapsed, target = ?TARGET_FRAME_TIME, "movement.slow_frame");
                }
            }
        });

        *self.task.lock().await = Some(handle);
    }

    /// Stop the refresh loop by aborting its background task.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }
}

impl Default for MovementSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn interpolates_along_velocity() {
        let position = Position::new(0.0, 0.0, 0.0);
        let velocity = Velocity::new(2.0, 0.0, 0.0);
        let result = interpolate_position(position, velocity, 10.0, 13.0);
        assert_eq!(result, Position::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn zero_velocity_holds_position() {
        let position = Position::new(5.0, 5.0, 5.0);
        let result = interpolate_position(position, Velocity::ZERO, 0.0, 100.0);
        assert_eq!(result, position);
    }

    #[test]
    fn same_time_is_a_no_op() {
        let position = Position::new(1.0, 2.0, 3.0);
        let velocity = Velocity::new(9.0, 9.0, 9.0);
        let result = interpolate_position(position, velocity, 5.0, 5.0);
        assert_eq!(result, position);
    }

    #[tokio::test(start_paused = true)]
    async fn start_invokes_on_tick_repeatedly() {
        let counter = Arc::new(AtomicU32::new(0));
        let system = MovementSystem::new();

        let counter_clone = Arc::clone(&counter);
        system
            .start(move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert!(counter.load(Ordering::SeqCst) >= 30);
        system.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_further_ticks() {
        let counter = Arc::new(AtomicU32::new(0));
        let system = MovementSystem::new();

        let counter_clone = Arc::clone(&counter);
        system
            .start(move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        system.stop().await;

        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }
}
