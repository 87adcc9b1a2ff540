//! One-shot startup reconciliation of a feature's storage directory.
//!
//! Runs before the writer or reader are active, so it can treat every file in
//! the directory as its own. Both migrators are idempotent and tolerate an
//! empty directory; per-file failures are skipped, never fatal.

use crate::error::Result;
use crate::storage::directory::Directory;
use tracing::info;

/// A startup migration strategy over a feature's storage.
pub trait DataMigrator {
    fn migrate(&self) -> Result<()>;
}

/// Removes every file in the target directory.
///
/// Used when the current configuration is incompatible with whatever a
/// previous run persisted (e.g. a schema change or a disabled feature).
pub struct DeleteAllMigrator {
    directory: Directory,
}

impl DeleteAllMigrator {
    pub fn new(directory: Directory) -> Self {
        Self { directory }
    }
}

impl DataMigrator for DeleteAllMigrator {
    fn migrate(&self) -> Result<()> {
        info!(path = %self.directory.path().display(), "discarding persisted batches");
        self.directory.delete_all_files()
    }
}

/// Relocates every file from a source directory into a destination,
/// preserving names and therefore FIFO order.
///
/// Used when resuming collection across app or SDK version boundaries.
pub struct MoveMigrator {
    source: Directory,
    destination: Directory,
}

impl MoveMigrator {
    pub fn new(source: Directory, destination: Directory) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl DataMigrator for MoveMigrator {
    fn migrate(&self) -> Result<()> {
        info!(
            from = %self.source.path().display(),
            to = %self.destination.path().display(),
            "relocating persisted batches"
        );
        self.source.move_all_files_to(&self.destination)
    }
}
