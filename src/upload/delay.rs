//! Inter-cycle delay with multiplicative backoff.

use std::time::Duration;

/// Backoff curve for the upload loop: starts at a base interval, multiplies
/// by a fixed factor after every cycle without a success, and snaps back to
/// the base on the first success (full reset, not partial decay).
#[derive(Clone, Debug)]
pub struct UploadDelay {
    base: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl UploadDelay {
    pub fn new(base: Duration, factor: f64, max: Duration) -> Self {
        // A factor below 1.0 would decay instead of back off.
        let factor = factor.max(1.0);
        Self {
            base,
            max,
            factor,
            current: base,
        }
    }

    /// Delay to wait before the next cycle.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// A cycle failed or uploaded nothing: grow toward the maximum.
    pub fn increase(&mut self) {
        self.current = self.current.mul_f64(self.factor).min(self.max);
    }

    /// A cycle uploaded at least one batch: snap back to the base interval.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
