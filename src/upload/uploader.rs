//! Single-attempt batch upload and outcome classification.
//!
//! The transport detail is deliberately thin: one POST per batch file, one
//! classified verdict. Everything about scheduling, retries, and give-up
//! lives in the scheduler.

use crate::config::UploadConfig;
use tracing::debug;

/// Verdict of one upload attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    /// 2xx: the intake accepted the batch.
    Success,
    /// 4xx: the intake refused the batch; retrying cannot help.
    Rejected(u16),
    /// 5xx, timeout, or connectivity failure; worth retrying.
    Retriable(String),
}

/// Performs exactly one upload attempt for one batch.
pub trait Upload: Send + Sync {
    fn upload(&self, batch: &[u8]) -> UploadStatus;
}

/// Pre-flight gate checked before any network call is made.
///
/// Deployments plug in reachability or power-state checks here; when the
/// conditions are unmet the attempt is skipped and deferred, costing no
/// bandwidth.
pub trait UploadConditions: Send + Sync {
    fn can_perform_upload(&self) -> bool;
}

/// Conditions that always permit uploading.
pub struct AlwaysUpload;

impl UploadConditions for AlwaysUpload {
    fn can_perform_upload(&self) -> bool {
        true
    }
}

/// HTTP uploader POSTing raw batch bytes to the intake endpoint.
pub struct HttpUploader {
    agent: ureq::Agent,
    endpoint_url: String,
    client_token: String,
}

impl HttpUploader {
    pub fn new(config: &UploadConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .build();
        Self {
            agent,
            endpoint_url: config.endpoint_url.clone(),
            client_token: config.client_token.clone(),
        }
    }

    #[cfg(test)]
    fn with_timeout(endpoint_url: &str, timeout: std::time::Duration) -> Self {
        let config = UploadConfig {
            endpoint_url: endpoint_url.to_string(),
            request_timeout: timeout,
            ..UploadConfig::default()
        };
        Self::new(&config)
    }
}

impl Upload for HttpUploader {
    fn upload(&self, batch: &[u8]) -> UploadStatus {
        let result = self
            .agent
            .post(&self.endpoint_url)
            .set("Content-Type", "application/octet-stream")
            .set("Authorization", &format!("Bearer {}", self.client_token))
            .send_bytes(batch);

        let status = classify(result);
        debug!(len = batch.len(), status = ?status, "upload attempt finished");
        status
    }
}

/// Map a transport result onto the retry taxonomy.
fn classify(result: std::result::Result<ureq::Response, ureq::Error>) -> UploadStatus {
    match result {
        Ok(_) => UploadStatus::Success,
        Err(ureq::Error::Status(code, _)) if (400..500).contains(&code) => {
            UploadStatus::Rejected(code)
        }
        Err(ureq::Error::Status(code, _)) => UploadStatus::Retriable(format!("HTTP {code}")),
        Err(ureq::Error::Transport(t)) => UploadStatus::Retriable(t.to_string()),
    }
}
