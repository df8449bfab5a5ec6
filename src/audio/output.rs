use crate::audio::AudioError;
use crate::audio::analysis::LevelTap;
use crate::audio::codec::OUTPUT_SAMPLE_RATE;
use crate::audio::playback::{PlaybackDevice, SourceId};
use crate::session::SessionLink;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

struct Voice {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
    /// Source samples advanced per device frame.
    step: f64,
}

impl Voice {
    fn sample_at(&self, frame: u64) -> Option<f32> {
        if frame < self.start_frame {
            return Some(0.0);
        }
        let position = (frame - self.start_frame) as f64 * self.step;
        let index = position as usize;
        let current = *self.samples.get(index)?;
        let next = self.samples.get(index + 1).copied().unwrap_or(current);
        let frac = (position - index as f64) as f32;
        Some(current + (next - current) * frac)
    }

    fn finished_by(&self, frame: u64) -> bool {
        frame >= self.start_frame
            && (frame - self.start_frame) as f64 * self.step >= self.samples.len() as f64
    }
}

/// Sums scheduled sources on a sample-accurate clock counted in device frames.
pub struct Mixer {
    device_rate: u32,
    source_rate: u32,
    frames_rendered: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn new(device_rate: u32, source_rate: u32) -> Self {
        Self {
            device_rate,
            source_rate,
            frames_rendered: 0,
            voices: Vec::new(),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.device_rate as f64
    }

    pub fn add(&mut self, id: SourceId, samples: Vec<f32>, start: f64) {
        let start_frame = (start * self.device_rate as f64).round().max(0.0) as u64;
        self.voices.push(Voice {
            id,
            start_frame: start_frame.max(self.frames_rendered),
            samples,
            step: self.source_rate as f64 / self.device_rate as f64,
        });
    }

    pub fn remove(&mut self, id: SourceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Fill `out` with the next mono frames and return the sources that ran
    /// out during this block.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<SourceId> {
        for (i, sample) in out.iter_mut().enumerate() {
            let frame = self.frames_rendered + i as u64;
            *sample = self
                .voices
                .iter()
                .filter_map(|v| v.sample_at(frame))
                .sum();
        }
        self.frames_rendered += out.len() as u64;

        let now = self.frames_rendered;
        let mut ended = Vec::new();
        self.voices.retain(|v| {
            if v.finished_by(now) {
                ended.push(v.id);
                false
            } else {
                true
            }
        });
        ended
    }
}

/// Speaker output context backed by one long-lived cpal stream.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    shutdown: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    pub async fn open(link: SessionLink, tap: LevelTap) -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown, shutdown_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || run_output_thread(ready_tx, shutdown_rx, link, tap))
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;

        let mixer = ready_rx
            .await
            .map_err(|_| AudioError::DeviceInitFailed("playback thread exited".to_string()))??;

        Ok(CpalOutput {
            mixer,
            shutdown,
            thread: Some(thread),
        })
    }
}

impl PlaybackDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.mixer.lock().map(|m| m.current_time()).unwrap_or(0.0)
    }

    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start: f64) -> Result<(), AudioError> {
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| AudioError::DeviceLost("playback mixer poisoned".to_string()))?;
        mixer.add(id, samples, start);
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.remove(id);
        }
    }

    fn close(&mut self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.clear();
        }
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

type Ready = oneshot::Sender<Result<Arc<Mutex<Mixer>>, AudioError>>;

fn run_output_thread(
    ready: Ready,
    shutdown: std_mpsc::Receiver<()>,
    link: SessionLink,
    tap: LevelTap,
) {
    let opened = open_device().and_then(|(device, config, format)| {
        let mixer = Arc::new(Mutex::new(Mixer::new(
            config.sample_rate.0,
            OUTPUT_SAMPLE_RATE,
        )));
        let stream = build_stream(&device, &config, format, Arc::clone(&mixer), link, tap.clone())?;
        Ok((mixer, stream))
    });

    match opened {
        Ok((mixer, _stream)) => {
            if ready.send(Ok(mixer)).is_err() {
                return;
            }
            // Stream stays alive until the handle is closed or dropped.
            let _ = shutdown.recv();
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
    tap.reset();
}

fn open_device() -> Result<(Device, StreamConfig, SampleFormat), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioError::NoOutputDevice)?;

    let wanted = SampleRate(OUTPUT_SAMPLE_RATE);
    let native = device
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?
        .filter(|c| c.channels() <= 2)
        .find(|c| c.min_sample_rate() <= wanted && c.max_sample_rate() >= wanted)
        .map(|c| c.with_sample_rate(wanted));

    let supported = match native {
        Some(supported) => supported,
        None => device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?,
    };

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = supported.sample_rate().0,
        channels = supported.channels(),
        "playback device opened"
    );

    let format = supported.sample_format();
    Ok((device, supported.into(), format))
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    mixer: Arc<Mutex<Mixer>>,
    link: SessionLink,
    tap: LevelTap,
) -> Result<Stream, AudioError> {
    let stream = match format {
        SampleFormat::F32 => build_typed_stream::<f32>(device, config, mixer, link, tap),
        SampleFormat::I16 => build_typed_stream::<i16>(device, config, mixer, link, tap),
        SampleFormat::U16 => build_typed_stream::<u16>(device, config, mixer, link, tap),
        other => Err(AudioError::DeviceInitFailed(format!(
            "unsupported sample format {other:?}"
        ))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))?;
    Ok(stream)
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    link: SessionLink,
    tap: LevelTap,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut mono = Vec::new();
    let error_link = link.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mono.clear();
                mono.resize(data.len() / channels, 0.0);

                let ended = match mixer.lock() {
                    Ok(mut mixer) => mixer.render(&mut mono),
                    Err(_) => Vec::new(),
                };
                tap.record(&mono);

                for (frame, sample) in data.chunks_mut(channels).zip(&mono) {
                    for out in frame.iter_mut() {
                        *out = T::from_sample(*sample);
                    }
                }
                for id in ended {
                    link.source_ended(id);
                }
            },
            move |err| {
                tracing::error!(error = %err, "audio playback error");
                error_link.device_lost(err.to_string());
            },
            None,
        )
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_back_to_back_sources_when_rendered_then_no_gap_between_them() {
        // Given
        let mut mixer = Mixer::new(24000, 24000);
        mixer.add(SourceId(0), vec![0.25; 4], 0.0);
        mixer.add(SourceId(1), vec![0.5; 4], 4.0 / 24000.0);

        // When
        let mut out = vec![0.0; 8];
        let ended = mixer.render(&mut out);

        // Then
        assert_eq!(out, vec![0.25, 0.25, 0.25, 0.25, 0.5, 0.5, 0.5, 0.5]);
        assert_eq!(ended, vec![SourceId(0), SourceId(1)]);
    }

    #[test]
    fn given_future_source_when_rendered_then_silence_until_start() {
        // Given
        let mut mixer = Mixer::new(24000, 24000);
        mixer.add(SourceId(7), vec![1.0; 2], 2.0 / 24000.0);

        // When
        let mut out = vec![0.0; 3];
        let ended = mixer.render(&mut out);

        // Then
        assert_eq!(out, vec![0.0, 0.0, 1.0]);
        assert!(ended.is_empty());
        assert!((mixer.current_time() - 3.0 / 24000.0).abs() < 1e-12);
    }

    #[test]
    fn given_removed_source_when_rendered_then_silent_and_not_reported() {
        // Given
        let mut mixer = Mixer::new(24000, 24000);
        mixer.add(SourceId(1), vec![1.0; 4], 0.0);

        // When
        assert!(mixer.remove(SourceId(1)));
        let mut out = vec![0.0; 4];
        let ended = mixer.render(&mut out);

        // Then
        assert_eq!(out, vec![0.0; 4]);
        assert!(ended.is_empty());
    }

    #[test]
    fn given_faster_device_when_rendered_then_source_is_stretched() {
        // Given
        let mut mixer = Mixer::new(48000, 24000);
        mixer.add(SourceId(0), vec![0.0, 1.0], 0.0);

        // When
        let mut out = vec![0.0; 4];
        let ended = mixer.render(&mut out);

        // Then
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
        assert_eq!(ended, vec![SourceId(0)]);
    }
}
