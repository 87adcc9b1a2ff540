//! Batch writer: turns a stream of serialized payloads into batch files.
//!
//! `write` never fails toward the producer. Payloads that cannot be persisted
//! (storage failure, oversized payload) are dropped, counted, and logged; the
//! caller only ever pays for an in-memory enqueue plus a local append.

use crate::config::StorageConfig;
use crate::error::{CourierError, Result};
use crate::storage::batch;
use crate::storage::directory::Directory;
use parking_lot::Mutex;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Width of a batch file name: millisecond timestamps zero-padded so that
/// lexicographic order equals numeric order.
const FILE_NAME_WIDTH: usize = 17;

/// Format a millisecond timestamp as a batch file name.
pub fn file_name(millis: u64) -> String {
    format!("{:0width$}", millis, width = FILE_NAME_WIDTH)
}

/// Parse a batch file name back into its millisecond timestamp.
pub fn file_timestamp(name: &str) -> Result<u64> {
    name.parse::<u64>()
        .map_err(|_| CourierError::InvalidFileName(name.to_string()))
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Shared handle naming the file currently open for append, if any.
///
/// The writer updates it on open/rollover/close; the reader filters it out of
/// the pending listing so an open file is never uploaded or deleted.
#[derive(Clone, Default)]
pub struct CurrentFile(Arc<Mutex<Option<String>>>);

impl CurrentFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, name: String) {
        *self.0.lock() = Some(name);
    }

    pub(crate) fn clear(&self) {
        *self.0.lock() = None;
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().clone()
    }
}

/// One batch file open for append.
struct OpenBatch {
    file: File,
    name: String,
    opened_at: Instant,
    events: usize,
    bytes: u64,
}

/// State behind the single writer lock.
struct WriterState {
    open: Option<OpenBatch>,
    /// Highest file name issued so far, as millis. Guarantees strictly
    /// increasing names even when the clock stalls or steps backwards.
    last_name: u64,
}

/// Appends serialized payloads into batch files, rolling over by size, count,
/// or age. Safe to call from any thread; appends are serialized internally.
pub struct BatchWriter {
    directory: Directory,
    config: StorageConfig,
    state: Mutex<WriterState>,
    current: CurrentFile,
    dropped: AtomicU64,
}

impl BatchWriter {
    pub fn new(directory: Directory, config: StorageConfig, current: CurrentFile) -> Self {
        Self {
            directory,
            config,
            state: Mutex::new(WriterState {
                open: None,
                last_name: 0,
            }),
            current,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append one payload. Never fails toward the caller; anything that
    /// cannot be persisted is dropped and counted.
    pub fn write(&self, payload: &[u8]) {
        if batch::framed_len(payload) > self.config.max_file_size {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                len = payload.len(),
                limit = self.config.max_file_size,
                "payload exceeds max batch size, dropping"
            );
            return;
        }

        let mut state = self.state.lock();
        if let Err(e) = self.append_locked(&mut state, payload) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            // A failed append leaves the handle in an unknown state; force a
            // fresh file on the next write.
            state.open = None;
            self.current.clear();
            warn!(error = %e, "failed to persist payload, dropping");
        }
    }

    /// Close the current file, making it visible to the reader.
    pub fn flush_and_close(&self) {
        let mut state = self.state.lock();
        if let Some(open) = state.open.take() {
            debug!(file = %open.name, events = open.events, "closing batch on flush");
        }
        self.current.clear();
    }

    /// Payloads dropped since creation (storage failures + oversized).
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn append_locked(&self, state: &mut WriterState, payload: &[u8]) -> Result<()> {
        let framed = batch::framed_len(payload);

        let needs_new = match &state.open {
            None => true,
            Some(open) => {
                open.events >= self.config.max_events_per_file
                    || open.bytes + framed > self.config.max_file_size
                    || open.opened_at.elapsed() >= self.config.max_file_age_for_write
            }
        };

        if needs_new {
            let batch = self.open_new(state)?;
            if let Some(closed) = state.open.replace(batch) {
                debug!(file = %closed.name, events = closed.events, "batch rolled over");
            }
        }

        let open = state.open.as_mut().unwrap();
        batch::write_event(&mut open.file, payload)?;
        open.events += 1;
        open.bytes += framed;
        Ok(())
    }

    fn open_new(&self, state: &mut WriterState) -> Result<OpenBatch> {
        self.directory.ensure()?;
        let mut millis = now_millis().max(state.last_name + 1);
        let (file, name) = loop {
            let name = file_name(millis);
            // Publish the name before the file exists on disk; the reader
            // lists the directory without taking the writer lock, so a file
            // created first would be drainable for a moment and could be
            // uploaded and deleted out from under the open handle.
            self.current.set(name.clone());
            match self.directory.create_file(&name) {
                Ok(file) => break (file, name),
                // A file left by a previous run can collide when the clock
                // stepped backwards; bump past it.
                Err(CourierError::FileExists(_)) => millis += 1,
                Err(e) => {
                    self.current.clear();
                    return Err(e);
                }
            }
        };
        state.last_name = millis;
        debug!(file = %name, "opened new batch file");
        Ok(OpenBatch {
            file,
            name,
            opened_at: Instant::now(),
            events: 0,
            bytes: 0,
        })
    }
}
