//! Batch reader: supplies closed files to the uploader in FIFO order and
//! finalizes their outcome.
//!
//! The reader never touches the file currently open for append; that file
//! belongs to the writer until it rolls over.

use crate::config::StorageConfig;
use crate::error::Result;
use crate::storage::directory::Directory;
use crate::storage::writer::{file_timestamp, now_millis, CurrentFile};
use std::time::Duration;
use tracing::{debug, warn};

/// One closed batch file waiting for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingBatch {
    pub name: String,
}

/// Final verdict on a pending batch after an upload cycle touched it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Success or permanent give-up; the file is deleted.
    Done,
    /// Transient failure; the file stays for a later cycle.
    Retry,
}

/// Enumerates pending batch files oldest-first and deletes them on
/// instruction.
pub struct BatchReader {
    directory: Directory,
    config: StorageConfig,
    current: CurrentFile,
}

impl BatchReader {
    pub fn new(directory: Directory, config: StorageConfig, current: CurrentFile) -> Self {
        Self {
            directory,
            config,
            current,
        }
    }

    /// All closed batch files, sorted oldest-first.
    ///
    /// Read fresh on every call; the listing excludes the writer's current
    /// file and anything that is not a batch file.
    pub fn pending_files(&self) -> Result<Vec<PendingBatch>> {
        let current = self.current.get();
        let mut pending = Vec::new();
        for name in self.directory.files()? {
            if Some(&name) == current.as_ref() {
                continue;
            }
            if file_timestamp(&name).is_err() {
                warn!(file = %name, "ignoring non-batch file in storage directory");
                continue;
            }
            pending.push(PendingBatch { name });
        }
        Ok(pending)
    }

    /// Raw contents of a pending batch.
    pub fn read(&self, batch: &PendingBatch) -> Result<Vec<u8>> {
        self.directory.read_file(&batch.name)
    }

    /// Apply the upload verdict: delete on `Done`, keep on `Retry`.
    pub fn consume(&self, batch: &PendingBatch, outcome: BatchOutcome) -> Result<()> {
        match outcome {
            BatchOutcome::Done => {
                debug!(file = %batch.name, "deleting resolved batch");
                self.directory.delete_file(&batch.name)
            }
            BatchOutcome::Retry => Ok(()),
        }
    }

    /// Whether a batch is older than the configured give-up age.
    pub fn expired(&self, batch: &PendingBatch) -> bool {
        match file_timestamp(&batch.name) {
            Ok(created) => {
                let age_ms = now_millis().saturating_sub(created);
                Duration::from_millis(age_ms) > self.config.max_file_age
            }
            Err(_) => false,
        }
    }

    /// Enforce the pending-file ceiling by deleting the oldest excess files.
    ///
    /// Bounds storage growth when the network is down for long periods; the
    /// oldest telemetry is dropped first. Returns the number evicted.
    pub fn evict_excess(&self) -> Result<usize> {
        let pending = self.pending_files()?;
        if pending.len() <= self.config.max_pending_files {
            return Ok(0);
        }
        let excess = pending.len() - self.config.max_pending_files;
        let mut evicted = 0;
        for batch in &pending[..excess] {
            // Per-file operation, like the bulk directory helpers: one stuck
            // file must not leave the rest of the excess on disk.
            match self.directory.delete_file(&batch.name) {
                Ok(()) => {
                    warn!(file = %batch.name, "pending ceiling exceeded, evicted oldest batch");
                    evicted += 1;
                }
                Err(e) => warn!(file = %batch.name, error = %e, "failed to evict file, skipping"),
            }
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::writer::file_name;
    use tempfile::TempDir;

    fn reader_in(dir: &TempDir, config: StorageConfig, current: CurrentFile) -> (BatchReader, Directory) {
        let directory = Directory::create(dir.path().join("feature")).unwrap();
        let reader = BatchReader::new(directory.clone(), config, current);
        (reader, directory)
    }

    fn seed_files(directory: &Directory, count: u64) -> Vec<String> {
        (1..=count)
            .map(|i| {
                let name = file_name(i);
                directory.create_file(&name).unwrap();
                name
            })
            .collect()
    }

    #[test]
    fn test_pending_oldest_first_excludes_current() {
        let dir = TempDir::new().unwrap();
        let current = CurrentFile::new();
        let (reader, directory) = reader_in(&dir, StorageConfig::default(), current.clone());

        let names = seed_files(&directory, 3);

        // Simulate the writer holding the newest file open.
        current.set(names[2].clone());

        let pending = reader.pending_files().unwrap();
        let listed: Vec<&str> = pending.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(listed, vec![names[0].as_str(), names[1].as_str()]);
    }

    #[test]
    fn test_consume_done_deletes_retry_keeps() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = reader_in(&dir, StorageConfig::default(), CurrentFile::new());
        seed_files(&directory, 2);

        let pending = reader.pending_files().unwrap();
        reader.consume(&pending[0], BatchOutcome::Done).unwrap();
        reader.consume(&pending[1], BatchOutcome::Retry).unwrap();

        let remaining = reader.pending_files().unwrap();
        assert_eq!(remaining, vec![pending[1].clone()]);
    }

    #[test]
    fn test_evicts_oldest_beyond_ceiling() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            max_pending_files: 3,
            ..StorageConfig::default()
        };
        let (reader, directory) = reader_in(&dir, config, CurrentFile::new());
        let names = seed_files(&directory, 5);

        let evicted = reader.evict_excess().unwrap();
        assert_eq!(evicted, 2);

        let remaining: Vec<String> = reader
            .pending_files()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(remaining, names[2..].to_vec());

        // Under the ceiling now; nothing more to evict.
        assert_eq!(reader.evict_excess().unwrap(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_eviction_skips_undeletable_files() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            max_pending_files: 1,
            ..StorageConfig::default()
        };
        let (reader, directory) = reader_in(&dir, config, CurrentFile::new());
        let names = seed_files(&directory, 3);

        // A read-only parent makes every unlink fail.
        fs::set_permissions(directory.path(), fs::Permissions::from_mode(0o555)).unwrap();
        if fs::remove_file(directory.path().join(&names[2])).is_ok() {
            // Running as root, where permission bits do not bind and the
            // failure cannot be staged this way.
            fs::set_permissions(directory.path(), fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        // Both excess files fail to delete; the call reports zero evicted
        // and leaves the listing intact instead of aborting with an error.
        assert_eq!(reader.evict_excess().unwrap(), 0);
        assert_eq!(reader.pending_files().unwrap().len(), 3);
        fs::set_permissions(directory.path(), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = reader_in(&dir, StorageConfig::default(), CurrentFile::new());
        directory.create_file("not-a-batch").unwrap();
        seed_files(&directory, 1);

        let pending = reader.pending_files().unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_expired_uses_file_age() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            max_file_age: Duration::from_secs(60),
            ..StorageConfig::default()
        };
        let (reader, directory) = reader_in(&dir, config, CurrentFile::new());

        let ancient = PendingBatch {
            name: file_name(1),
        };
        directory.create_file(&ancient.name).unwrap();
        let fresh = PendingBatch {
            name: file_name(now_millis()),
        };
        directory.create_file(&fresh.name).unwrap();

        assert!(reader.expired(&ancient));
        assert!(!reader.expired(&fresh));
    }
}
