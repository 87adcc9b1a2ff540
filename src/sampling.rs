//! Per-session sampling gate.
//!
//! One boolean decision per session, drawn once and cached; an excluded
//! session costs neither storage nor bandwidth because the writer is never
//! invoked for it.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Draws collect/discard decisions at a configured percentage.
#[derive(Clone, Debug)]
pub struct Sampler {
    /// Percent of sessions collected, clamped to `[0, 100]`.
    rate: f64,
}

impl Sampler {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 100.0),
        }
    }

    /// Draw one decision. Rate 0 always excludes, 100 always includes.
    pub fn draw(&self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        if self.rate >= 100.0 {
            return true;
        }
        rand::rng().random_range(0.0..100.0) < self.rate
    }
}

/// A sampler plus the memoized decision for the current session.
pub struct SamplingGate {
    sampler: Sampler,
    sampled: AtomicBool,
}

impl SamplingGate {
    pub fn new(rate: f64) -> Self {
        let sampler = Sampler::new(rate);
        let sampled = AtomicBool::new(sampler.draw());
        Self { sampler, sampled }
    }

    /// The cached decision for the current session.
    pub fn is_sampled(&self) -> bool {
        self.sampled.load(Ordering::Relaxed)
    }

    /// Re-draw at a session boundary.
    pub fn renew(&self) {
        let decision = self.sampler.draw();
        self.sampled.store(decision, Ordering::Relaxed);
        debug!(sampled = decision, "session sampling decision renewed");
    }
}
