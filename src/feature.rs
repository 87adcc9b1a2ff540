//! Feature composition: one telemetry pipeline per feature directory.
//!
//! A `Feature` wires the sampling gate, writer, reader, and upload scheduler
//! over its own subdirectory of the storage root. The `FeatureRegistry` is
//! the explicit registration table features live in: constructed at startup,
//! passed by reference to producers, torn down with explicit unregister — no
//! ambient globals.

use crate::config::FeatureConfig;
use crate::error::{CourierError, Result};
use crate::sampling::SamplingGate;
use crate::storage::migrator::{DataMigrator, DeleteAllMigrator, MoveMigrator};
use crate::storage::reader::BatchReader;
use crate::storage::writer::{BatchWriter, CurrentFile};
use crate::storage::Directory;
use crate::upload::scheduler::{SchedulerHandle, UploadScheduler};
use crate::upload::uploader::{AlwaysUpload, HttpUploader, Upload, UploadConditions};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// What to do with batches persisted by a previous run, decided before the
/// writer or reader start.
#[derive(Clone, Debug, Default)]
pub enum StartupPolicy {
    /// Keep pending batches; they upload ahead of new data.
    #[default]
    Retain,
    /// Delete everything (configuration incompatible with what was stored).
    Discard,
    /// Move batches from another directory in, preserving order (resuming
    /// collection across an app or SDK version boundary).
    ImportFrom(PathBuf),
}

/// Point-in-time snapshot of a feature's internal counters, surfaced to the
/// host application's diagnostics rather than thrown at it.
#[derive(Clone, Debug, Serialize)]
pub struct FeatureDiagnostics {
    pub feature: String,
    pub sampled: bool,
    pub dropped_events: u64,
    pub pending_batches: usize,
}

/// One running telemetry pipeline.
pub struct Feature {
    name: String,
    writer: BatchWriter,
    reader: Arc<BatchReader>,
    gate: SamplingGate,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Feature {
    /// Start a feature with the default HTTP uploader and no upload
    /// condition checks.
    pub fn start(config: FeatureConfig, policy: StartupPolicy) -> Result<Feature> {
        let uploader = Arc::new(HttpUploader::new(&config.upload));
        Self::start_with(config, policy, uploader, Arc::new(AlwaysUpload))
    }

    /// Start a feature with a custom uploader and condition gate.
    pub fn start_with(
        config: FeatureConfig,
        policy: StartupPolicy,
        uploader: Arc<dyn Upload>,
        conditions: Arc<dyn UploadConditions>,
    ) -> Result<Feature> {
        config.validate()?;

        let directory = Directory::create(config.storage_root.join(&config.name))?;

        // Startup migration runs before anything else touches the directory.
        match &policy {
            StartupPolicy::Retain => {}
            StartupPolicy::Discard => {
                DeleteAllMigrator::new(directory.clone()).migrate()?;
            }
            StartupPolicy::ImportFrom(source) => {
                let source = Directory::create(source)?;
                MoveMigrator::new(source, directory.clone()).migrate()?;
            }
        }

        let current = CurrentFile::new();
        let writer = BatchWriter::new(directory.clone(), config.storage.clone(), current.clone());
        let reader = Arc::new(BatchReader::new(directory, config.storage.clone(), current));
        let scheduler = UploadScheduler::start(
            &config.name,
            Arc::clone(&reader),
            uploader,
            conditions,
            &config.upload,
        );

        info!(feature = %config.name, "feature pipeline started");
        Ok(Feature {
            name: config.name,
            writer,
            reader,
            gate: SamplingGate::new(config.sampling_rate),
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fire-and-forget ingestion point for producers.
    ///
    /// An excluded session returns immediately; otherwise the payload is
    /// appended to the current batch file. Never blocks on network I/O and
    /// never fails toward the caller.
    pub fn write(&self, payload: &[u8]) {
        if !self.gate.is_sampled() {
            return;
        }
        self.writer.write(payload);
    }

    /// Session boundary: re-draw the sampling decision.
    pub fn renew_session(&self) {
        self.gate.renew();
    }

    /// Whether the current session's telemetry is collected.
    pub fn is_sampled(&self) -> bool {
        self.gate.is_sampled()
    }

    /// Run an upload cycle now (e.g. on app foregrounding).
    pub fn trigger_upload(&self) {
        if let Some(handle) = self.scheduler.lock().as_ref() {
            handle.wake();
        }
    }

    /// Payloads dropped internally since startup.
    pub fn dropped_events(&self) -> u64 {
        self.writer.dropped_events()
    }

    /// Snapshot the feature's internal counters.
    pub fn diagnostics(&self) -> FeatureDiagnostics {
        FeatureDiagnostics {
            feature: self.name.clone(),
            sampled: self.gate.is_sampled(),
            dropped_events: self.writer.dropped_events(),
            pending_batches: self.reader.pending_files().map(|p| p.len()).unwrap_or(0),
        }
    }

    /// Close the current batch and stop the upload loop.
    ///
    /// An upload attempt already in flight completes; nothing further is
    /// scheduled. Idempotent.
    pub fn stop(&self) {
        self.writer.flush_and_close();
        if let Some(handle) = self.scheduler.lock().take() {
            handle.stop();
            info!(feature = %self.name, "feature pipeline stopped");
        }
    }
}

impl Drop for Feature {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Registration table for running features, keyed by name.
#[derive(Default)]
pub struct FeatureRegistry {
    features: RwLock<HashMap<String, Arc<Feature>>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a started feature. Fails if the name is taken.
    pub fn register(&self, feature: Feature) -> Result<Arc<Feature>> {
        let mut features = self.features.write();
        if features.contains_key(feature.name()) {
            return Err(CourierError::FeatureExists(feature.name().to_string()));
        }
        let feature = Arc::new(feature);
        features.insert(feature.name().to_string(), Arc::clone(&feature));
        Ok(feature)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Feature>> {
        self.features.read().get(name).cloned()
    }

    /// Remove and stop a feature. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        match self.features.write().remove(name) {
            Some(feature) => {
                feature.stop();
                true
            }
            None => false,
        }
    }

    /// Stop and remove every feature.
    pub fn stop_all(&self) {
        for (_, feature) in self.features.write().drain() {
            feature.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.features.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.read().is_empty()
    }
}
