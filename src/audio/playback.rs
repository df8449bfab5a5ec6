use crate::audio::AudioError;
use crate::audio::codec::{OUTPUT_SAMPLE_RATE, pcm16_to_float, text_to_bytes};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An output device that can start a source at an absolute time on its own
/// clock and report (out of band) when a source finishes.
pub trait PlaybackDevice: Send {
    /// Seconds of audio the device has rendered since it was opened.
    fn current_time(&self) -> f64;

    /// Queue `samples` (mono, 24 kHz) to become audible at `start`.
    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start: f64) -> Result<(), AudioError>;

    /// Silence a source immediately, whether or not it has started.
    fn stop(&mut self, id: SourceId);

    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start: f64,
    pub duration: f64,
}

/// Gapless, arrival-ordered playback of inbound fragments.
///
/// Each fragment starts exactly where the previous one ends, or at the
/// device's current time if the timeline has fallen behind. The timeline and
/// the set of live sources are owned here and only change through
/// [`on_fragment`](Self::on_fragment), [`on_interrupt`](Self::on_interrupt),
/// [`flush_all`](Self::flush_all) and [`on_source_ended`](Self::on_source_ended).
pub struct PlaybackScheduler {
    next_start_time: f64,
    active: BTreeMap<SourceId, ScheduledSource>,
    next_id: u64,
    sample_rate: u32,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(OUTPUT_SAMPLE_RATE)
    }
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            next_start_time: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
            sample_rate,
        }
    }

    /// Decode a base64 PCM16 fragment and queue it behind everything already
    /// scheduled. A malformed fragment is rejected without touching the
    /// timeline.
    pub fn on_fragment(
        &mut self,
        device: &mut dyn PlaybackDevice,
        fragment: &str,
    ) -> Result<ScheduledSource, AudioError> {
        let bytes = text_to_bytes(fragment)?;
        let samples = pcm16_to_float(&bytes, 1)?
            .into_iter()
            .next()
            .unwrap_or_default();
        if samples.is_empty() {
            return Err(AudioError::Decode("empty audio fragment".to_string()));
        }
        self.schedule_samples(device, samples)
    }

    pub fn schedule_samples(
        &mut self,
        device: &mut dyn PlaybackDevice,
        samples: Vec<f32>,
    ) -> Result<ScheduledSource, AudioError> {
        self.next_start_time = self.next_start_time.max(device.current_time());

        let source = ScheduledSource {
            id: SourceId(self.next_id),
            start: self.next_start_time,
            duration: samples.len() as f64 / self.sample_rate as f64,
        };
        self.next_id += 1;

        device.schedule(source.id, samples, source.start)?;
        self.active.insert(source.id, source);
        self.next_start_time += source.duration;

        tracing::debug!(
            fragment = %source.id,
            start = source.start,
            duration = source.duration,
            "fragment scheduled"
        );
        Ok(source)
    }

    /// Natural completion. Returns false for sources already flushed.
    pub fn on_source_ended(&mut self, id: SourceId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Barge-in: stop everything and restart the timeline from the device's
    /// live clock on the next fragment.
    pub fn on_interrupt(&mut self, device: &mut dyn PlaybackDevice) {
        let stopped = self.flush_all(device);
        self.next_start_time = 0.0;
        tracing::debug!(stopped, "playback interrupted");
    }

    /// Stop and forget every scheduled or playing source. Returns how many
    /// were stopped.
    pub fn flush_all(&mut self, device: &mut dyn PlaybackDevice) -> usize {
        let stopped = self.active.len();
        for id in self.active.keys() {
            device.stop(*id);
        }
        self.active.clear();
        stopped
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_sources(&self) -> impl Iterator<Item = &ScheduledSource> {
        self.active.values()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}
