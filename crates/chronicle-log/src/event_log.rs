//! Append-only, durable event log backed by newline-delimited JSON.
//!
//! Every event is appended as one JSON object per line, followed by an
//! `fsync` so a crash right after a successful `append` call never loses
//! the record. An in-memory index of `(simulation_time, byte_offset)` is
//! rebuilt from the file on [`EventLog::open`], so lookups by time range
//! don't require scanning the whole file on every query.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chronicle_core::event::Event;

/// Errors produced while persisting or retrieving events.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("failed to open event log at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append event {event_id} to {path}: {source}")]
    Append {
        path: PathBuf,
        event_id: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read event log at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("event log at {path} contains a corrupt record at offset {offset}: {source}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize event {event_id}: {source}")]
    Encode {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },
}

struct IndexEntry {
    simulation_time: f64,
    offset: u64,
}

/// An append-only, file-backed log of [`Event`]s.
pub struct EventLog {
    path: PathBuf,
    file: File,
    index: Vec<IndexEntry>,
}

impl EventLog {
    /// Open (creating if absent) the NDJSON file at `path` and rebuild the
    /// in-memory offset index by scanning it once.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| EventLogError::Open {
                path: path.clone(),
                source,
            })?;

        let index = Self::build_index(&path)?;

        Ok(Self { path, file, index })
    }

    fn build_index(path: &Path) -> Result<Vec<IndexEntry>, EventLogError> {
        let read_handle = File::open(path).map_err(|source| EventLogError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(read_handle);
        let mut index = Vec::new();
        let mut offset: u64 = 0;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader
                .read_line(&mut line)
                .map_err(|source| EventLogError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
            if bytes_read == 0 {
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                offset += bytes_read as u64;
                continue;
            }
            let event: Event =
                serde_json::from_str(trimmed).map_err(|source| EventLogError::Corrupt {
                    path: path.to_path_buf(),
                    offset,
                    source,
                })?;
            index.push(IndexEntry {
                simulation_time: event.simulation_time,
                offset,
            });
            offset += bytes_read as u64;
        }

        Ok(index)
    }

    /// Append a single event and fsync before returning.
    pub fn append(&mut self, event: &Event) -> Result<(), EventLogError> {
        let offset = self
            .file
            .seek(SeekFrom::End(0))
            .map_err(|source| EventLogError::Append {
                path: self.path.clone(),
                event_id: event.event_id.to_string(),
                source,
            })?;

        let mut line = serde_json::to_string(event).map_err(|source| EventLogError::Encode {
            event_id: event.event_id.to_string(),
            source,
        })?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .map_err(|source| EventLogError::Append {
                path: self.path.clone(),
                event_id: event.event_id.to_string(),
                source,
            })?;
        self.file.sync_all().map_err(|source| EventLogError::Append {
            path: self.path.clone(),
            event_id: event.event_id.to_string(),
            source,
        })?;

        self.index.push(IndexEntry {
            simulation_time: event.simulation_time,
            offset,
        });

        Ok(())
    }

    /// Append a batch of events, fsyncing once after the whole batch.
    pub fn append_batch(&mut self, events: &[Event]) -> Result<(), EventLogError> {
        for event in events {
            let offset = self
                .file
                .seek(SeekFrom::End(0))
                .map_err(|source| EventLogError::Append {
                    path: self.path.clone(),
                    event_id: event.event_id.to_string(),
                    source,
                })?;

            let mut line =
                serde_json::to_string(event).map_err(|source| EventLogError::Encode {
                    event_id: event.event_id.to_string(),
                    source,
                })?;
            line.push('\n');

            self.file
                .write_all(line.as_bytes())
                .map_err(|source| EventLogError::Append {
                    path: self.path.clone(),
                    event_id: event.event_id.to_string(),
                    source,
                })?;

            self.index.push(IndexEntry {
                simulation_time: event.simulation_time,
                offset,
            });
        }

        self.file.sync_all().map_err(|source| EventLogError::Append {
            path: self.path.clone(),
            event_id: "<batch>".to_owned(),
            source,
        })?;

        Ok(())
    }

    /// Return every event with `start <= simulation_time <= end`, in
    /// append order (which is also simulation-time order, since the clock
    /// only ever moves forward while events are being emitted).
    pub fn get_events(&self, start: f64, end: f64) -> Result<Vec<Event>, EventLogError> {
        let mut reader = BufReader::new(File::open(&self.path).map_err(|source| {
            EventLogError::Read {
                path: self.path.clone(),
                source,
            }
        })?);

        let mut events = Vec::new();
        for entry in &self.index {
            if entry.simulation_time < start || entry.simulation_time > end {
                continue;
            }
            events.push(self.read_at(&mut reader, entry.offset)?);
        }
        Ok(events)
    }

    /// Stream every event in the log, oldest first.
    pub fn stream_events(&self) -> Result<Vec<Event>, EventLogError> {
        self.get_events(f64::NEG_INFINITY, f64::INFINITY)
    }

    fn read_at(
        &self,
        reader: &mut BufReader<File>,
        offset: u64,
    ) -> Result<Event, EventLogError> {
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| EventLogError::Read {
                path: self.path.clone(),
                source,
            })?;
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|source| EventLogError::Read {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(line.trim_end()).map_err(|source| EventLogError::Corrupt {
            path: self.path.clone(),
            offset,
            source,
        })
    }

    pub fn event_count(&self) -> usize {
        self.index.len()
    }

    pub fn latest_time(&self) -> Option<f64> {
        self.index.last().map(|entry| entry.simulation_time)
    }

    /// Flush pending writes to disk. Called once by the orchestrator's
    /// `shutdown`; the log is unusable for further appends in spirit
    /// afterward, though nothing here prevents it -- callers are expected
    /// to drop the `EventLog` right after.
    pub fn close(&mut self) -> Result<(), EventLogError> {
        self.file.sync_all().map_err(|source| EventLogError::Append {
            path: self.path.clone(),
            event_id: "<close>".to_owned(),
            source,
        })
    }

    /// Truncate the log to zero length and drop the index. Used by tests
    /// and by operators resetting a simulation's history; the engine
    /// itself never calls this during normal operation.
    pub fn clear(&mut self) -> Result<(), EventLogError> {
        self.file.set_len(0).map_err(|source| EventLogError::Append {
            path: self.path.clone(),
            event_id: "<clear>".to_owned(),
            source,
        })?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|source| EventLogError::Append {
                path: self.path.clone(),
                event_id: "<clear>".to_owned(),
                source,
            })?;
        self.index.clear();
        Ok(())
    }
}
