//! Background upload loop: one thread per feature draining pending batch
//! files with backoff.
//!
//! The loop sleeps on its control channel, so the inter-cycle delay doubles
//! as the wakeup mechanism: a `Wake` message runs a cycle immediately (app
//! foregrounding), `Stop` or a disconnected channel ends the loop. An attempt
//! already in flight always completes before the loop exits.

use crate::config::UploadConfig;
use crate::storage::reader::{BatchOutcome, BatchReader, PendingBatch};
use crate::upload::delay::UploadDelay;
use crate::upload::uploader::{Upload, UploadConditions, UploadStatus};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Messages accepted by the scheduler loop.
enum Control {
    /// Run a cycle now, independent of the timer.
    Wake,
    /// Finish the current attempt (if any) and exit.
    Stop,
}

/// Owning handle to a running scheduler thread.
pub struct SchedulerHandle {
    control: Sender<Control>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Trigger an upload cycle immediately.
    pub fn wake(&self) {
        let _ = self.control.try_send(Control::Wake);
    }

    /// Stop the loop and wait for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.control.send(Control::Stop);
            let _ = thread.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns and owns the per-feature upload loop.
pub struct UploadScheduler;

impl UploadScheduler {
    pub fn start(
        feature: &str,
        reader: Arc<BatchReader>,
        uploader: Arc<dyn Upload>,
        conditions: Arc<dyn UploadConditions>,
        config: &UploadConfig,
    ) -> SchedulerHandle {
        let (control, inbox) = bounded::<Control>(4);
        let mut worker = Worker::new(reader, uploader, conditions, config);
        let name = format!("courier-upload-{feature}");

        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!("upload loop started");
                loop {
                    match inbox.recv_timeout(worker.delay.current()) {
                        Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Ok(Control::Wake) | Err(RecvTimeoutError::Timeout) => worker.run_cycle(),
                    }
                }
                debug!("upload loop stopped");
            })
            .unwrap_or_else(|e| panic!("failed to spawn {name}: {e}"));

        SchedulerHandle {
            control,
            thread: Some(thread),
        }
    }
}

/// One upload cycle's outcome, for delay adjustment.
struct CycleStats {
    uploaded: usize,
}

/// The loop body: owns the backoff state and the per-file attempt counts.
///
/// Attempt counts are in-memory only; a process restart resets them, which
/// merely delays give-up. The max-age bound still holds either way.
struct Worker {
    reader: Arc<BatchReader>,
    uploader: Arc<dyn Upload>,
    conditions: Arc<dyn UploadConditions>,
    delay: UploadDelay,
    max_attempts: u32,
    attempts: HashMap<String, u32>,
}

impl Worker {
    fn new(
        reader: Arc<BatchReader>,
        uploader: Arc<dyn Upload>,
        conditions: Arc<dyn UploadConditions>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            reader,
            uploader,
            conditions,
            delay: UploadDelay::new(
                config.base_interval,
                config.backoff_factor,
                config.max_interval,
            ),
            max_attempts: config.max_upload_attempts,
            attempts: HashMap::new(),
        }
    }

    /// Run one cycle: evict, then drain pending files in creation order.
    ///
    /// The drain stops at the first retry-deferred file so no later batch
    /// ever overtakes an unresolved earlier one.
    fn run_cycle(&mut self) {
        let stats = self.drain();
        if stats.uploaded > 0 {
            self.delay.reset();
        } else {
            self.delay.increase();
        }
    }

    fn drain(&mut self) -> CycleStats {
        let mut stats = CycleStats { uploaded: 0 };

        if let Err(e) = self.reader.evict_excess() {
            warn!(error = %e, "backpressure eviction failed");
        }

        let pending = match self.reader.pending_files() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "failed to list pending batches");
                return stats;
            }
        };

        // Forget attempt counts for files that are no longer on disk.
        self.attempts
            .retain(|name, _| pending.iter().any(|b| &b.name == name));

        for batch in &pending {
            if self.reader.expired(batch) {
                info!(file = %batch.name, "batch exceeded max age, giving up");
                self.resolve(batch);
                continue;
            }

            if !self.conditions.can_perform_upload() {
                debug!("upload conditions unmet, deferring cycle");
                break;
            }

            let bytes = match self.reader.read(batch) {
                Ok(bytes) => bytes,
                Err(e) => {
                    // An unreadable batch can never upload; discard it so it
                    // does not block the queue.
                    warn!(file = %batch.name, error = %e, "unreadable batch, discarding");
                    self.resolve(batch);
                    continue;
                }
            };

            match self.uploader.upload(&bytes) {
                UploadStatus::Success => {
                    debug!(file = %batch.name, "batch uploaded");
                    self.resolve(batch);
                    stats.uploaded += 1;
                }
                UploadStatus::Rejected(code) => {
                    warn!(file = %batch.name, code, "batch rejected by intake, discarding");
                    self.resolve(batch);
                }
                UploadStatus::Retriable(reason) => {
                    let count = self.attempts.entry(batch.name.clone()).or_insert(0);
                    *count += 1;
                    if *count >= self.max_attempts {
                        warn!(
                            file = %batch.name,
                            attempts = *count,
                            "batch exceeded max upload attempts, giving up"
                        );
                        self.resolve(batch);
                        continue;
                    }
                    debug!(file = %batch.name, attempt = *count, %reason, "upload failed, will retry");
                    let _ = self.reader.consume(batch, BatchOutcome::Retry);
                    break;
                }
            }
        }

        stats
    }

    /// Delete a resolved batch and forget its attempt count.
    fn resolve(&mut self, batch: &PendingBatch) {
        if let Err(e) = self.reader.consume(batch, BatchOutcome::Done) {
            warn!(file = %batch.name, error = %e, "failed to delete resolved batch");
        }
        self.attempts.remove(&batch.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::storage::directory::Directory;
    use crate::storage::writer::{file_name, CurrentFile};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Scripted uploader: pops one status per call, records every call.
    struct MockUpload {
        script: Mutex<VecDeque<UploadStatus>>,
        calls: Mutex<Vec<Vec<u8>>>,
    }

    impl MockUpload {
        fn scripted(statuses: Vec<UploadStatus>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(statuses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl Upload for MockUpload {
        fn upload(&self, batch: &[u8]) -> UploadStatus {
            self.calls.lock().push(batch.to_vec());
            self.script
                .lock()
                .pop_front()
                .unwrap_or(UploadStatus::Success)
        }
    }

    struct Blocked;
    impl UploadConditions for Blocked {
        fn can_perform_upload(&self) -> bool {
            false
        }
    }

    fn test_config() -> UploadConfig {
        UploadConfig {
            max_upload_attempts: 3,
            base_interval: Duration::from_millis(10),
            backoff_factor: 2.0,
            max_interval: Duration::from_millis(80),
            ..UploadConfig::default()
        }
    }

    fn storage_with_files(dir: &TempDir, contents: &[&[u8]]) -> (Arc<BatchReader>, Directory) {
        let directory = Directory::create(dir.path().join("feature")).unwrap();
        let base = crate::storage::writer::now_millis();
        for (i, content) in contents.iter().enumerate() {
            let mut f = directory.create_file(&file_name(base + i as u64)).unwrap();
            f.write_all(content).unwrap();
        }
        let reader = Arc::new(BatchReader::new(
            directory.clone(),
            StorageConfig::default(),
            CurrentFile::new(),
        ));
        (reader, directory)
    }

    fn worker(reader: Arc<BatchReader>, uploader: Arc<MockUpload>) -> Worker {
        Worker::new(
            reader,
            uploader,
            Arc::new(crate::upload::uploader::AlwaysUpload),
            &test_config(),
        )
    }

    #[test]
    fn test_success_deletes_in_fifo_order() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = storage_with_files(&dir, &[b"a", b"b", b"c"]);
        let uploader = MockUpload::scripted(vec![]);
        let mut w = worker(reader, uploader.clone());

        w.run_cycle();

        assert_eq!(uploader.call_count(), 3);
        let calls = uploader.calls.lock();
        assert_eq!(*calls, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(directory.files().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_batch_deleted_and_never_retried() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = storage_with_files(&dir, &[b"bad"]);
        let uploader = MockUpload::scripted(vec![UploadStatus::Rejected(400)]);
        let mut w = worker(reader, uploader.clone());

        w.run_cycle();
        assert!(directory.files().unwrap().is_empty());

        w.run_cycle();
        assert_eq!(uploader.call_count(), 1);
    }

    #[test]
    fn test_server_error_retried_then_given_up() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = storage_with_files(&dir, &[b"unlucky"]);
        let uploader = MockUpload::scripted(vec![
            UploadStatus::Retriable("HTTP 503".into());
            3
        ]);
        let mut w = worker(reader, uploader.clone());

        // First two cycles: file persists for retry.
        w.run_cycle();
        assert_eq!(directory.files().unwrap().len(), 1);
        w.run_cycle();
        assert_eq!(directory.files().unwrap().len(), 1);

        // Third failed attempt hits max_upload_attempts; file is discarded.
        w.run_cycle();
        assert!(directory.files().unwrap().is_empty());
        assert_eq!(uploader.call_count(), 3);
    }

    #[test]
    fn test_retry_blocks_later_files() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = storage_with_files(&dir, &[b"first", b"second"]);
        let uploader = MockUpload::scripted(vec![
            UploadStatus::Retriable("timeout".into()),
            UploadStatus::Success,
            UploadStatus::Success,
        ]);
        let mut w = worker(reader, uploader.clone());

        // Cycle 1 stops at the failing first file; "second" is not attempted.
        w.run_cycle();
        assert_eq!(uploader.call_count(), 1);
        assert_eq!(directory.files().unwrap().len(), 2);

        // Cycle 2 resolves both in order.
        w.run_cycle();
        assert_eq!(uploader.call_count(), 3);
        assert!(directory.files().unwrap().is_empty());
        assert_eq!(uploader.calls.lock()[1], b"first".to_vec());
    }

    #[test]
    fn test_backoff_increases_on_failure_resets_on_success() {
        let dir = TempDir::new().unwrap();
        let (reader, _directory) = storage_with_files(&dir, &[b"a", b"b", b"c", b"d"]);
        let uploader = MockUpload::scripted(vec![
            UploadStatus::Retriable("one".into()),
            UploadStatus::Retriable("two".into()),
            UploadStatus::Success,
        ]);
        let mut w = worker(reader, uploader);

        let base = w.delay.current();
        w.run_cycle();
        let after_first_failure = w.delay.current();
        assert!(after_first_failure > base);

        w.run_cycle();
        assert!(w.delay.current() >= after_first_failure);

        // A cycle with at least one success snaps back to base.
        w.run_cycle();
        assert_eq!(w.delay.current(), base);
    }

    #[test]
    fn test_idle_cycle_backs_off() {
        let dir = TempDir::new().unwrap();
        let (reader, _directory) = storage_with_files(&dir, &[]);
        let uploader = MockUpload::scripted(vec![]);
        let mut w = worker(reader, uploader.clone());

        let base = w.delay.current();
        w.run_cycle();
        assert!(w.delay.current() > base);
        assert_eq!(uploader.call_count(), 0);
    }

    #[test]
    fn test_unmet_conditions_defer_without_network_calls() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = storage_with_files(&dir, &[b"waiting"]);
        let uploader = MockUpload::scripted(vec![]);
        let mut w = Worker::new(reader, uploader.clone(), Arc::new(Blocked), &test_config());

        w.run_cycle();

        assert_eq!(uploader.call_count(), 0);
        assert_eq!(directory.files().unwrap().len(), 1);
    }

    #[test]
    fn test_expired_batch_discarded_without_upload() {
        let dir = TempDir::new().unwrap();
        let directory = Directory::create(dir.path().join("feature")).unwrap();
        // Timestamp 1 is far beyond any max_file_age.
        directory.create_file(&file_name(1)).unwrap();
        let reader = Arc::new(BatchReader::new(
            directory.clone(),
            StorageConfig {
                max_file_age: Duration::from_secs(60),
                ..StorageConfig::default()
            },
            CurrentFile::new(),
        ));
        let uploader = MockUpload::scripted(vec![]);
        let mut w = worker(reader, uploader.clone());

        w.run_cycle();

        assert_eq!(uploader.call_count(), 0);
        assert!(directory.files().unwrap().is_empty());
    }

    #[test]
    fn test_eviction_runs_before_uploads() {
        let dir = TempDir::new().unwrap();
        let directory = Directory::create(dir.path().join("feature")).unwrap();
        let base = crate::storage::writer::now_millis();
        for i in 0..5u64 {
            let mut f = directory.create_file(&file_name(base + i)).unwrap();
            f.write_all(&[i as u8]).unwrap();
        }
        let reader = Arc::new(BatchReader::new(
            directory.clone(),
            StorageConfig {
                max_pending_files: 2,
                ..StorageConfig::default()
            },
            CurrentFile::new(),
        ));
        let uploader = MockUpload::scripted(vec![]);
        let mut w = worker(reader, uploader.clone());

        w.run_cycle();

        // Three oldest evicted, two uploaded.
        assert_eq!(uploader.call_count(), 2);
        assert!(directory.files().unwrap().is_empty());
    }

    #[test]
    fn test_scheduler_thread_drains_and_stops() {
        let dir = TempDir::new().unwrap();
        let (reader, directory) = storage_with_files(&dir, &[b"threaded"]);
        let uploader = MockUpload::scripted(vec![]);

        let handle = UploadScheduler::start(
            "test",
            reader,
            uploader.clone(),
            Arc::new(crate::upload::uploader::AlwaysUpload),
            &test_config(),
        );

        // Wake it rather than waiting out the timer.
        handle.wake();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !directory.files().unwrap().is_empty() {
            assert!(std::time::Instant::now() < deadline, "scheduler never drained");
            std::thread::sleep(Duration::from_millis(5));
        }

        handle.stop();
        assert_eq!(uploader.call_count(), 1);
    }
}
