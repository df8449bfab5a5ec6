use crate::audio::AudioError;
use crate::audio::analysis::LevelTap;
use crate::audio::codec::{CAPTURE_SAMPLE_RATE, WireAudioPayload};
use crate::audio::resampler::Resampler;
use crate::session::SessionLink;
use crate::session::backend::CaptureDevice;
use crate::session::channel::OutboundSender;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

/// Samples per wire frame at the capture rate.
pub const FRAME_SIZE: usize = 4096;

/// Turns raw mono device audio into fixed-size 16 kHz frames and forwards each
/// completed frame, encoded, to the outbound sink in arrival order.
pub struct CaptureStage {
    resampler: Option<Resampler>,
    frame: Vec<f32>,
    sink: OutboundSender,
    tap: LevelTap,
}

impl CaptureStage {
    pub fn new(device_rate: u32, sink: OutboundSender, tap: LevelTap) -> Result<Self, AudioError> {
        let resampler = if device_rate == CAPTURE_SAMPLE_RATE {
            None
        } else {
            Some(Resampler::new(device_rate, CAPTURE_SAMPLE_RATE)?)
        };

        Ok(CaptureStage {
            resampler,
            frame: Vec::with_capacity(FRAME_SIZE),
            sink,
            tap,
        })
    }

    /// Returns how many frames were forwarded.
    pub fn push(&mut self, samples: &[f32]) -> Result<usize, AudioError> {
        self.tap.record(samples);

        let resampled;
        let samples = match &mut self.resampler {
            Some(resampler) => {
                resampled = resampler.process(samples)?;
                &resampled[..]
            }
            None => samples,
        };

        let mut sent = 0;
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (FRAME_SIZE - self.frame.len()).min(rest.len());
            self.frame.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.frame.len() == FRAME_SIZE {
                let payload = WireAudioPayload::from_samples(&self.frame);
                self.frame.clear();
                if self.sink.send(payload).is_err() {
                    tracing::trace!("outbound channel closed, dropping frame");
                } else {
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }
}

enum CaptureCmd {
    Start(OutboundSender),
    Stop,
}

/// Microphone input context. The cpal stream is not `Send`, so it lives on a
/// dedicated thread that this handle drives with commands.
pub struct CpalCapture {
    commands: std_mpsc::Sender<CaptureCmd>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CpalCapture {
    pub async fn open(link: SessionLink, tap: LevelTap) -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (commands, command_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || run_capture_thread(ready_tx, command_rx, link, tap))
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;

        let sample_rate = ready_rx
            .await
            .map_err(|_| AudioError::DeviceInitFailed("capture thread exited".to_string()))??;

        Ok(CpalCapture {
            commands,
            thread: Some(thread),
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl CaptureDevice for CpalCapture {
    fn start(&mut self, sink: OutboundSender) -> Result<(), AudioError> {
        self.commands
            .send(CaptureCmd::Start(sink))
            .map_err(|_| AudioError::DeviceLost("capture thread exited".to_string()))
    }

    fn close(&mut self) {
        let _ = self.commands.send(CaptureCmd::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_capture_thread(
    ready: oneshot::Sender<Result<u32, AudioError>>,
    commands: std_mpsc::Receiver<CaptureCmd>,
    link: SessionLink,
    tap: LevelTap,
) {
    let host = cpal::default_host();
    let opened = host
        .default_input_device()
        .ok_or(AudioError::NoMicrophoneFound)
        .and_then(|device| {
            let supported = device
                .default_input_config()
                .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;
            Ok((device, supported))
        });

    let (device, supported) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let format = supported.sample_format();
    let config: StreamConfig = supported.into();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        "capture device opened"
    );
    if ready.send(Ok(config.sample_rate.0)).is_err() {
        return;
    }

    // Held only to keep the stream alive until Stop.
    let mut _stream: Option<Stream> = None;
    while let Ok(command) = commands.recv() {
        match command {
            CaptureCmd::Start(sink) => {
                match build_stream(&device, &config, format, sink, link.clone(), tap.clone()) {
                    Ok(stream) => _stream = Some(stream),
                    Err(e) => link.device_lost(e.to_string()),
                }
            }
            CaptureCmd::Stop => break,
        }
    }
    tap.reset();
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    sink: OutboundSender,
    link: SessionLink,
    tap: LevelTap,
) -> Result<Stream, AudioError> {
    let stage = CaptureStage::new(config.sample_rate.0, sink, tap)?;
    let stream = match format {
        SampleFormat::F32 => build_typed_stream::<f32>(device, config, stage, link),
        SampleFormat::I16 => build_typed_stream::<i16>(device, config, stage, link),
        SampleFormat::U16 => build_typed_stream::<u16>(device, config, stage, link),
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
    mut stage: CaptureStage,
    link: SessionLink,
) -> Result<Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut mono = Vec::new();
    let data_link = link.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to mono by averaging
                mono.clear();
                for chunk in data.chunks(channels) {
                    let sum: f32 = chunk.iter().map(|&s| s.to_sample::<f32>()).sum();
                    mono.push(sum / channels as f32);
                }
                if let Err(e) = stage.push(&mono) {
                    data_link.device_lost(e.to_string());
                }
            },
            move |err| link.device_lost(err.to_string()),
            None,
        )
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))
}
