//! Configuration for storage, upload, and feature wiring.
//!
//! Every knob has a documented safe default; none of them is persisted.
//! Deployments tune these per feature (logs, traces, session replay) rather
//! than sharing one global set.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CourierError, Result};

/// Controls how batch files are written and retained on disk.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Bytes of framed event data before the current file is rolled over.
    pub max_file_size: u64,

    /// Events per file before rollover, regardless of size.
    pub max_events_per_file: usize,

    /// Wall-clock age of the current file before forced rollover.
    pub max_file_age_for_write: Duration,

    /// Ceiling on closed files kept on disk; oldest are evicted beyond it.
    pub max_pending_files: usize,

    /// Age past which a pending file is given up on and discarded.
    pub max_file_age: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 4 * 1024 * 1024,
            max_events_per_file: 500,
            max_file_age_for_write: Duration::from_secs(5),
            max_pending_files: 50,
            max_file_age: Duration::from_secs(18 * 60 * 60),
        }
    }
}

/// Controls the upload destination and the scheduler's backoff curve.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Intake endpoint the batch bytes are POSTed to.
    pub endpoint_url: String,

    /// Client token sent as the auth header with every request.
    pub client_token: String,

    /// Attempts per file before it is given up on and discarded.
    pub max_upload_attempts: u32,

    /// Delay before the first cycle and after any successful one.
    pub base_interval: Duration,

    /// Multiplier applied to the delay after a cycle with no success.
    pub backoff_factor: f64,

    /// Upper bound on the inter-cycle delay.
    pub max_interval: Duration,

    /// Per-request network timeout; exceeding it is a retriable failure.
    pub request_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            client_token: String::new(),
            max_upload_attempts: 3,
            base_interval: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Full configuration for one feature pipeline.
#[derive(Clone, Debug)]
pub struct FeatureConfig {
    /// Feature name; becomes the subdirectory under the storage root.
    pub name: String,

    /// Root all feature subdirectories live under.
    pub storage_root: PathBuf,

    /// Percent of sessions collected, in `[0, 100]`.
    pub sampling_rate: f64,

    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

impl FeatureConfig {
    pub fn new(name: impl Into<String>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            storage_root: storage_root.into(),
            sampling_rate: 100.0,
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
        }
    }

    /// Reject configurations that would misbehave silently at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(std::path::is_separator) {
            return Err(CourierError::InvalidConfig(format!(
                "feature name must be a plain directory name, got {:?}",
                self.name
            )));
        }
        if !(0.0..=100.0).contains(&self.sampling_rate) {
            return Err(CourierError::InvalidConfig(format!(
                "sampling rate must be within [0, 100], got {}",
                self.sampling_rate
            )));
        }
        if self.storage.max_file_size == 0 || self.storage.max_events_per_file == 0 {
            return Err(CourierError::InvalidConfig(
                "file size and event count limits must be non-zero".into(),
            ));
        }
        if self.upload.backoff_factor < 1.0 {
            return Err(CourierError::InvalidConfig(format!(
                "backoff factor must be >= 1.0, got {}",
                self.upload.backoff_factor
            )));
        }
        Ok(())
    }
}
