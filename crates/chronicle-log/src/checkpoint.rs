//! Periodic world-state checkpoints with BLAKE3 integrity hashing.
//!
//! A checkpoint pairs a `bincode`-serialized [`WorldState`](chronicle_core::state::WorldState)
//! with the simulation time it was captured at and a BLAKE3 digest of the
//! serialized bytes. Rewinding past a checkpoint restores it (after
//! verifying the digest) instead of replaying the full event history from
//! the beginning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bincode::config::Configuration;
use chronicle_core::state::WorldState;
use serde::{Deserialize, Serialize};

const BINCODE_CONFIG: Configuration = bincode::config::standard();

/// Errors produced while saving or restoring checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to serialize world state for checkpoint at t={simulation_time}: {source}")]
    Encode {
        simulation_time: f64,
        #[source]
        source: bincode::error::EncodeError,
    },

    #[error("failed to deserialize checkpoint {checkpoint_id}: {source}")]
    Decode {
        checkpoint_id: String,
        #[source]
        source: bincode::error::DecodeError,
    },

    #[error(
        "checkpoint {checkpoint_id} failed integrity check: recorded hash {recorded} but \
         recomputed {recomputed}"
    )]
    HashMismatch {
        checkpoint_id: String,
        recorded: String,
        recomputed: String,
    },

    #[error("io error on checkpoint {checkpoint_id} at {path}: {source}")]
    Io {
        checkpoint_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {checkpoint_id} not found")]
    NotFound { checkpoint_id: String },
}

/// A single saved checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub simulation_time: f64,
    pub state_bytes: Vec<u8>,
    pub hash: String,
}

fn checkpoint_id_for(simulation_time: f64) -> String {
    format!("checkpoint_{simulation_time:.6}")
}

fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Stores checkpoints on disk, one file per checkpoint, indexed in memory
/// by simulation time so "nearest checkpoint at or before T" is a binary
/// search rather than a directory scan.
pub struct CheckpointStore {
    directory: PathBuf,
    interval: f64,
    by_time: BTreeMap<ordered_float::NotNan<f64>, String>,
}

mod ordered_float {
    use std::cmp::Ordering;

    /// A minimal total-ordering wrapper for `f64` checkpoint times.
    ///
    /// Checkpoint times are always finite simulation clock readings, so
    /// `NaN` never occurs in practice; this exists only so `BTreeMap` can
    /// order on them.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct NotNan<T>(T);

    impl NotNan<f64> {
        pub fn new(value: f64) -> Self {
            assert!(!value.is_nan(), "checkpoint time must not be NaN");
            Self(value)
        }

        pub fn into_inner(self) -> f64 {
            self.0
        }
    }

    impl Eq for NotNan<f64> {}

    impl PartialOrd for NotNan<f64> {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for NotNan<f64> {
        fn cmp(&self, other: &Self) -> Ordering {
            self.0.partial_cmp(&other.0).expect("checkpoint time is never NaN")
        }
    }
}

impl CheckpointStore {
    /// Open (creating if absent) a checkpoint directory with the given
    /// checkpoint interval in simulation seconds.
    pub fn open(directory: impl AsRef<Path>, interval: f64) -> Result<Self, CheckpointError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|source| CheckpointError::Io {
            checkpoint_id: "<init>".to_owned(),
            path: directory.clone(),
            source,
        })?;

        let mut by_time = BTreeMap::new();
        for entry in fs::read_dir(&directory).map_err(|source| CheckpointError::Io {
            checkpoint_id: "<init>".to_owned(),
            path: directory.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| CheckpointError::Io {
                checkpoint_id: "<init>".to_owned(),
                path: directory.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ckpt") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(time_str) = stem.strip_prefix("checkpoint_") else {
                continue;
            };
            let Ok(time) = time_str.parse::<f64>() else {
                continue;
            };
            by_time.insert(ordered_float::NotNan::new(time), stem.to_owned());
        }

        Ok(Self {
            directory,
            interval,
            by_time,
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn set_interval(&mut self, interval: f64) {
        self.interval = interval;
    }

    /// Mirrors the reference cadence: a checkpoint is due at simulation
    /// time zero and at every multiple of `interval` after it.
    pub fn should_create_checkpoint(&self, simulation_time: f64) -> bool {
        const EPSILON: f64 = 1e-9;
        if simulation_time.abs() < EPSILON {
            return true;
        }
        if self.interval <= 0.0 {
            return false;
        }
        let remainder = simulation_time % self.interval;
        remainder.abs() < EPSILON || (remainder - self.interval).abs() < EPSILON
    }

    fn path_for(&self, checkpoint_id: &str) -> PathBuf {
        self.directory.join(format!("{checkpoint_id}.ckpt"))
    }

    /// Serialize `state`, hash it, and persist it under a name derived
    /// from `simulation_time`.
    pub fn save(
        &mut self,
        simulation_time: f64,
        state: &WorldState,
    ) -> Result<String, CheckpointError> {
        let checkpoint_id = checkpoint_id_for(simulation_time);
        let state_bytes =
            bincode::serde::encode_to_vec(state, BINCODE_CONFIG).map_err(|source| {
                CheckpointError::Encode {
                    simulation_time,
                    source,
                }
            })?;
        let hash = hash_bytes(&state_bytes);

        let checkpoint = Checkpoint {
            checkpoint_id: checkpoint_id.clone(),
            simulation_time,
            state_bytes,
            hash,
        };

        let path = self.path_for(&checkpoint_id);
        let encoded =
            bincode::serde::encode_to_vec(&checkpoint, BINCODE_CONFIG).map_err(|source| {
                CheckpointError::Encode {
                    simulation_time,
                    source,
                }
            })?;
        fs::write(&path, encoded).map_err(|source| CheckpointError::Io {
            checkpoint_id: checkpoint_id.clone(),
            path: path.clone(),
            source,
        })?;

        self.by_time
            .insert(ordered_float::NotNan::new(simulation_time), checkpoint_id.clone());

        tracing::info!(checkpoint_id = %checkpoint_id, simulation_time, "checkpoint.saved");

        Ok(checkpoint_id)
    }

    fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(checkpoint_id);
        let bytes = fs::read(&path).map_err(|source| CheckpointError::Io {
            checkpoint_id: checkpoint_id.to_owned(),
            path: path.clone(),
            source,
        })?;
        let (checkpoint, _): (Checkpoint, usize) =
            bincode::serde::decode_from_slice(&bytes, BINCODE_CONFIG).map_err(|source| {
                CheckpointError::Decode {
                    checkpoint_id: checkpoint_id.to_owned(),
                    source,
                }
            })?;
        Ok(checkpoint)
    }

    /// Load `checkpoint_id` from disk and verify its integrity hash.
    fn load_verified(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = self.load(checkpoint_id)?;
        let recomputed = hash_bytes(&checkpoint.state_bytes);
        if recomputed != checkpoint.hash {
            return Err(CheckpointError::HashMismatch {
                checkpoint_id: checkpoint.checkpoint_id.clone(),
                recorded: checkpoint.hash.clone(),
                recomputed,
            });
        }
        Ok(checkpoint)
    }

    fn decode_state(checkpoint: &Checkpoint) -> Result<WorldState, CheckpointError> {
        let (state, _): (WorldState, usize) =
            bincode::serde::decode_from_slice(&checkpoint.state_bytes, BINCODE_CONFIG).map_err(
                |source| CheckpointError::Decode {
                    checkpoint_id: checkpoint.checkpoint_id.clone(),
                    source,
                },
            )?;
        Ok(state)
    }

    /// Load the checkpoint nearest to, but not after, `simulation_time`,
    /// verifying its hash before returning.
    pub fn get_nearest_before(
        &self,
        simulation_time: f64,
    ) -> Result<Option<(f64, WorldState)>, CheckpointError> {
        let Some((time, checkpoint_id)) = self
            .by_time
            .range(..=ordered_float::NotNan::new(simulation_time))
            .next_back()
        else {
            return Ok(None);
        };

        let checkpoint = self.load_verified(checkpoint_id)?;
        let state = Self::decode_state(&checkpoint)?;

        tracing::info!(checkpoint_id = %checkpoint.checkpoint_id, "checkpoint.restored");

        Ok(Some((time.into_inner(), state)))
    }

    /// Restore the world state recorded under `checkpoint_id` by name,
    /// verifying its integrity hash. Fails with `NotFound` if no such
    /// checkpoint is indexed.
    pub fn restore(&self, checkpoint_id: &str) -> Result<WorldState, CheckpointError> {
        if !self.by_time.values().any(|id| id == checkpoint_id) {
            return Err(CheckpointError::NotFound {
                checkpoint_id: checkpoint_id.to_owned(),
            });
        }

        let checkpoint = self.load_verified(checkpoint_id)?;
        let state = Self::decode_state(&checkpoint)?;

        tracing::info!(checkpoint_id = %checkpoint.checkpoint_id, "checkpoint.restored");

        Ok(state)
    }

    pub fn list_checkpoints(&self) -> Vec<f64> {
        self.by_time.keys().map(|t| t.into_inner()).collect()
    }

    pub fn delete_checkpoint(&mut self, simulation_time: f64) -> Result<(), CheckpointError> {
        let key = ordered_float::NotNan::new(simulation_time);
        if let Some(checkpoint_id) = self.by_time.remove(&key) {
            let path = self.path_for(&checkpoint_id);
            if path.exists() {
                fs::remove_file(&path).map_err(|source| CheckpointError::Io {
                    checkpoint_id,
                    path,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Retain only the `keep_count` most recent checkpoints by time,
    /// deleting the rest.
    pub fn cleanup_old_checkpoints(&mut self, keep_count: usize) -> Result<usize, CheckpointError> {
        let times: Vec<f64> = self.by_time.keys().map(|t| t.into_inner()).collect();
        let stale_count = times.len().saturating_sub(keep_count);
        let removed = stale_count;
        for time in &times[..stale_count] {
            self.delete_checkpoint(*time)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::event::{Event, EventKind, Payload};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn state_with_one_entity() -> WorldState {
        let mut state = WorldState::new();
        let id = Uuid::new_v4();
        state.apply_event(&Event::new(
            0.0,
            EventKind::EntityCreated,
            Payload::from([
                ("entity_id".into(), serde_json::json!(id.to_string())),
                ("type".into(), serde_json::json!("tank")),
            ]),
        ));
        state
    }

    #[test]
    fn should_create_checkpoint_at_zero_and_every_interval() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        assert!(store.should_create_checkpoint(0.0));
        assert!(store.should_create_checkpoint(10.0));
        assert!(store.should_create_checkpoint(20.0));
        assert!(!store.should_create_checkpoint(5.0));
    }

    #[test]
    fn save_and_restore_round_trips_state() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        let state = state_with_one_entity();

        store.save(10.0, &state).unwrap();
        let (time, restored) = store.get_nearest_before(15.0).unwrap().unwrap();

        assert_eq!(time, 10.0);
        assert_eq!(restored.entity_count(), 1);
    }

    #[test]
    fn get_nearest_before_picks_the_closest_not_after() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        store.save(0.0, &WorldState::new()).unwrap();
        store.save(10.0, &state_with_one_entity()).unwrap();
        store.save(20.0, &WorldState::new()).unwrap();

        let (time, _) = store.get_nearest_before(15.0).unwrap().unwrap();
        assert_eq!(time, 10.0);
    }

    #[test]
    fn get_nearest_before_returns_none_when_empty() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        assert!(store.get_nearest_before(100.0).unwrap().is_none());
    }

    #[test]
    fn tampered_checkpoint_bytes_fail_hash_check() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        store.save(0.0, &state_with_one_entity()).unwrap();

        let path = store.path_for("checkpoint_0.000000");
        let mut bytes = fs::read(&path).unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(store.get_nearest_before(0.0).is_err());
    }

    #[test]
    fn reopening_store_rebuilds_index_from_disk() {
        let dir = tempdir().unwrap();
        {
            let mut store = CheckpointStore::open(dir.path(), 10.0).unwrap();
            store.save(5.0, &state_with_one_entity()).unwrap();
        }

        let store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        assert_eq!(store.list_checkpoints(), vec![5.0]);
    }

    #[test]
    fn cleanup_old_checkpoints_keeps_only_the_newest_n() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        store.save(0.0, &WorldState::new()).unwrap();
        store.save(10.0, &WorldState::new()).unwrap();
        store.save(20.0, &WorldState::new()).unwrap();

        let removed = store.cleanup_old_checkpoints(1).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.list_checkpoints(), vec![20.0]);
    }

    #[test]
    fn cleanup_old_checkpoints_is_a_no_op_when_under_the_limit() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        store.save(0.0, &WorldState::new()).unwrap();
        store.save(10.0, &WorldState::new()).unwrap();

        let removed = store.cleanup_old_checkpoints(5).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.list_checkpoints(), vec![0.0, 10.0]);
    }

    #[test]
    fn restore_round_trips_a_named_checkpoint() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 10.0).unwrap();
        store.save(10.0, &state_with_one_entity()).unwrap();

        let state = store.restore("checkpoint_10.000000").unwrap();
        assert_eq!(state.entity_count(), 1);
    }

    #[test]
    fn restore_rejects_unknown_checkpoint_id() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path(), 10.0).unwrap();

        assert!(matches!(
            store.restore("checkpoint_999.000000"),
            Err(CheckpointError::NotFound { .. })
        ));
    }
}
