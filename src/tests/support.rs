use crate::audio::AudioError;
use crate::audio::codec::{WireAudioPayload, bytes_to_text, float_to_pcm16};
use crate::audio::playback::{PlaybackDevice, SourceId};
use crate::config::Voice;
use crate::error::prelude::SessionError;
use crate::session::backend::{CaptureDevice, SessionBackend};
use crate::session::channel::{OutboundSender, RemoteChannel};
use crate::session::{SessionLink, SessionSetup};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

/// Base64 PCM16 fragment of `seconds` at 24 kHz.
pub fn fragment(seconds: f64) -> String {
    let samples = vec![0.1f32; (seconds * 24000.0).round() as usize];
    bytes_to_text(&float_to_pcm16(&samples))
}

pub fn setup(api_key: &str) -> SessionSetup {
    SessionSetup {
        api_key: api_key.to_string(),
        model: "test-model".to_string(),
        voice: Voice::Puck,
        system_instruction: "Be brief.".to_string(),
    }
}

#[derive(Debug, Default)]
pub struct FakeDeviceState {
    pub now: f64,
    pub scheduled: Vec<(SourceId, f64, usize)>,
    pub stopped: Vec<SourceId>,
    pub closed: usize,
}

/// Playback device with a hand-driven clock.
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    pub state: Arc<Mutex<FakeDeviceState>>,
}

impl FakeDevice {
    pub fn set_time(&self, now: f64) {
        self.state.lock().unwrap().now = now;
    }

    pub fn scheduled(&self) -> Vec<(SourceId, f64, usize)> {
        self.state.lock().unwrap().scheduled.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }
}

impl PlaybackDevice for FakeDevice {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start: f64) -> Result<(), AudioError> {
        self.state
            .lock()
            .unwrap()
            .scheduled
            .push((id, start, samples.len()));
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        self.state.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed += 1;
    }
}

#[derive(Debug, Default)]
pub struct FakeCaptureState {
    pub sink: Option<OutboundSender>,
    pub closed: usize,
    pub fail_start: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCapture {
    pub state: Arc<Mutex<FakeCaptureState>>,
}

impl FakeCapture {
    pub fn started(&self) -> bool {
        self.state.lock().unwrap().sink.is_some()
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }
}

impl CaptureDevice for FakeCapture {
    fn start(&mut self, sink: OutboundSender) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(AudioError::StreamStartFailed("mic unplugged".to_string()));
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.closed += 1;
        state.sink = None;
    }
}

#[derive(Debug, Clone)]
pub struct FakeChannel {
    outbound: OutboundSender,
    closed: Arc<AtomicUsize>,
}

impl RemoteChannel for FakeChannel {
    fn outbound(&self) -> OutboundSender {
        self.outbound.clone()
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend handing out fakes that share state with the test.
#[derive(Default)]
pub struct FakeBackend {
    pub device: FakeDevice,
    pub capture: FakeCapture,
    pub channel_closed: Arc<AtomicUsize>,
    pub opens: AtomicUsize,
    pub fail_output: bool,
    pub fail_connect: bool,
    pub connect_gate: Option<Arc<Notify>>,
    pub link: Mutex<Option<SessionLink>>,
    pub outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<WireAudioPayload>>>,
}

impl FakeBackend {
    pub fn link(&self) -> SessionLink {
        self.link.lock().unwrap().clone().unwrap()
    }

    pub fn channel_closed(&self) -> usize {
        self.channel_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    async fn open_output(
        &self,
        _link: SessionLink,
    ) -> Result<Box<dyn PlaybackDevice>, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_output {
            return Err(AudioError::NoOutputDevice.into());
        }
        Ok(Box::new(self.device.clone()))
    }

    async fn open_capture(
        &self,
        _link: SessionLink,
    ) -> Result<Box<dyn CaptureDevice>, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.capture.clone()))
    }

    async fn connect(
        &self,
        _setup: &SessionSetup,
        link: SessionLink,
    ) -> Result<Box<dyn RemoteChannel>, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.connect_gate {
            gate.notified().await;
        }
        if self.fail_connect {
            return Err(SessionError::Channel("handshake refused".to_string()));
        }

        *self.link.lock().unwrap() = Some(link);
        let (outbound, rx) = mpsc::unbounded_channel();
        *self.outbound_rx.lock().unwrap() = Some(rx);
        Ok(Box::new(FakeChannel {
            outbound,
            closed: Arc::clone(&self.channel_closed),
        }))
    }
}
