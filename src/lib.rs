//! # Courier
//!
//! A durable event-buffering and upload pipeline for telemetry producers on
//! unreliable networks.
//!
//! ## Core Concepts
//!
//! - **Batch files**: payloads are appended to per-feature batch files that
//!   roll over by size, count, or age; file names are time-derived and
//!   strictly increasing, so sorted order is FIFO order
//! - **Background upload**: one scheduler thread per feature drains pending
//!   files oldest-first with multiplicative backoff, retry classification,
//!   and give-up thresholds
//! - **Sampling**: one collect/discard decision per session; excluded
//!   sessions cost nothing
//! - **Crash safety**: no database, only flat files; a crash loses at most
//!   the frame being appended
//!
//! ## Example
//!
//! ```ignore
//! use courier::{Feature, FeatureConfig, FeatureRegistry, StartupPolicy};
//!
//! let mut config = FeatureConfig::new("logs", "/data/app/courier");
//! config.upload.endpoint_url = "https://intake.example.com/v1/logs".into();
//! config.upload.client_token = "abc123".into();
//!
//! let registry = FeatureRegistry::new();
//! let logs = registry.register(Feature::start(config, StartupPolicy::Retain)?)?;
//!
//! // Producers, from any thread:
//! logs.write(br#"{"level":"info","message":"started"}"#);
//!
//! // On app foregrounding:
//! logs.trigger_upload();
//!
//! // On teardown:
//! registry.unregister("logs");
//! ```

pub mod config;
pub mod error;
pub mod feature;
pub mod sampling;
pub mod storage;
pub mod upload;

// Re-exports
pub use config::{FeatureConfig, StorageConfig, UploadConfig};
pub use error::{CourierError, Result};
pub use feature::{Feature, FeatureDiagnostics, FeatureRegistry, StartupPolicy};
pub use sampling::{Sampler, SamplingGate};
pub use storage::{
    BatchOutcome, BatchReader, BatchWriter, CurrentFile, DataMigrator, DeleteAllMigrator,
    Directory, MoveMigrator, PendingBatch,
};
pub use upload::{
    AlwaysUpload, HttpUploader, SchedulerHandle, Upload, UploadConditions, UploadDelay,
    UploadScheduler, UploadStatus,
};
