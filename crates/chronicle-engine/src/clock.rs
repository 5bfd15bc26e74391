//! The simulation clock: a scalable, pausable, seekable time source.
//!
//! The clock advances simulation time at `real_dt * time_scale` on a
//! background `tokio` task ticking at a fixed real-time cadence. Pausing
//! suspends advancement without killing the task; stopping aborts it via
//! [`tokio::task::JoinHandle::abort`], mirroring a cancellable task rather
//! than a polled flag. Seeking jumps `simulation_time` directly -- it does
//! not itself replay anything; that is the orchestrator's job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How often the background task wakes to advance simulation time.
pub const TICK_HZ: u64 = 60;
const TICK_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / TICK_HZ);

/// Lifecycle state of a [`SimulationClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug)]
struct ClockInner {
    simulation_time: f64,
    time_scale: f64,
    state: ClockState,
}

/// A shared, cloneable handle to a running simulation clock.
///
/// Clone shares the same background task and state -- there is exactly
/// one clock per simulation, and every clone observes the same time.
#[derive(Clone)]
pub struct SimulationClock {
    inner: Arc<Mutex<ClockInner>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SimulationClock {
    /// Build a clock at simulation time zero, stopped, at `1.0x` scale.
    pub fn new() -> Self {
        Self::with_time_scale(1.0)
    }

    /// Build a clock at simulation time zero, stopped, at the given scale.
    pub fn with_time_scale(time_scale: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                simulation_time: 0.0,
                time_scale,
                state: ClockState::Stopped,
            })),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the background tick task. A no-op if already running.
    pub async fn start(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == ClockState::Running {
                return;
            }
            inner.state = ClockState::Running;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_PERIOD);
            let mut last = Instant::now();
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let real_dt = (now - last).as_secs_f64();
                last = now;

                let mut inner = inner.lock().await;
                if inner.state != ClockState::Running {
                    continue;
                }
                inner.simulation_time += real_dt * inner.time_scale;
            }
        });

        *self.task.lock().await = Some(handle);
    }

    /// Suspend advancement. The background task keeps running (so resume
    /// is cheap) but skips every tick while paused.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ClockState::Running {
            inner.state = ClockState::Paused;
        }
    }

    /// Resume advancement after a pause.
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ClockState::Paused {
            inner.state = ClockState::Running;
        }
    }

    /// Stop the clock and abort its background task.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = ClockState::Stopped;
        drop(inner);

        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    /// Jump `simulation_time` to `target` without altering run state.
    /// Replaying events to match the new time is the caller's concern.
    pub async fn seek(&self, target: f64) {
        let mut inner = self.inner.lock().await;
        inner.simulation_time = target;
    }

    pub async fn set_time_scale(&self, scale: f64) {
        let mut inner = self.inner.lock().await;
        inner.time_scale = scale;
    }

    pub async fn time_scale(&self) -> f64 {
        self.inner.lock().await.time_scale
    }

    pub async fn get_time(&self) -> f64 {
        self.inner.lock().await.simulation_time
    }

    pub async fn state(&self) -> ClockState {
        self.inner.lock().await.state
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a duration of simulation seconds as `"DdHH:MM:SS"`, dropping the
/// day component when it is zero.
pub fn format_time(total_seconds: f64) -> String {
    let total_seconds = total_seconds.max(0.0) as u64;
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
