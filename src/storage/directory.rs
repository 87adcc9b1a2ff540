//! Filesystem primitive shared by every storage component.
//!
//! A `Directory` owns one feature's subdirectory under the app-private
//! storage root. All mutation of that subdirectory goes through this type;
//! nothing else touches the filesystem directly.

use crate::error::{CourierError, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Handle to a feature storage directory.
#[derive(Clone, Debug)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Create the directory (and intermediate components) if absent.
    ///
    /// Idempotent: opening an existing directory returns the same handle.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Create a subdirectory of this one.
    pub fn subdirectory(&self, name: &str) -> Result<Directory> {
        Directory::create(self.path.join(name))
    }

    /// Re-create the directory if something removed it since `create`.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a new empty file, failing if the name is already taken.
    ///
    /// The exists-guard protects the strictly-increasing naming invariant
    /// against clock collisions; the caller must pick a fresh name.
    pub fn create_file(&self, name: &str) -> Result<File> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path.join(name))
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    CourierError::FileExists(name.to_string())
                } else {
                    CourierError::Io(e)
                }
            })
    }

    /// Whether a file with this name exists.
    pub fn has_file(&self, name: &str) -> bool {
        self.path.join(name).is_file()
    }

    /// List file names, sorted ascending (== creation order under the
    /// monotonic naming scheme). Subdirectories are ignored.
    pub fn files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a file's full contents.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path.join(name);
        if !path.is_file() {
            return Err(CourierError::FileNotFound(name.to_string()));
        }
        Ok(fs::read(path)?)
    }

    /// Size of one file in bytes.
    pub fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.path.join(name))?.len())
    }

    /// Delete one file. Deleting a missing file is not an error.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file, preserving the directory itself.
    ///
    /// Best-effort: a file that cannot be removed is logged and skipped.
    pub fn delete_all_files(&self) -> Result<()> {
        for name in self.files()? {
            if let Err(e) = self.delete_file(&name) {
                warn!(file = %name, error = %e, "failed to delete file, skipping");
            }
        }
        Ok(())
    }

    /// Move every file into `destination`, preserving names.
    ///
    /// Per-file operation: one failure does not abort the rest. Skipped
    /// files are logged, not retried.
    pub fn move_all_files_to(&self, destination: &Directory) -> Result<()> {
        for name in self.files()? {
            let from = self.path.join(&name);
            let to = destination.path.join(&name);
            if let Err(e) = fs::rename(&from, &to) {
                warn!(file = %name, error = %e, "failed to move file, skipping");
            }
        }
        Ok(())
    }
}
