//! Background upload: single-attempt uploader, backoff curve, and the
//! per-feature scheduler loop.

pub mod delay;
pub mod scheduler;
pub mod uploader;

pub use delay::UploadDelay;
pub use scheduler::{SchedulerHandle, UploadScheduler};
pub use uploader::{AlwaysUpload, HttpUploader, Upload, UploadConditions, UploadStatus};
