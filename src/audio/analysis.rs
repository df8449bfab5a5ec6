use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Read-only level tap shared between an audio callback and whatever wants to
/// draw it. Stores the RMS of the most recent block as `f32` bits.
#[derive(Debug, Clone, Default)]
pub struct LevelTap {
    level: Arc<AtomicU32>,
}

impl LevelTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum / samples.len() as f32).sqrt();
        self.level.store(rms.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.level.store(0, Ordering::Relaxed);
    }
}
