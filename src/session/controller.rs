use crate::audio::playback::{PlaybackDevice, PlaybackScheduler, SourceId};
use crate::conversation::TurnAggregator;
use crate::error::session::SessionError;
use crate::session::backend::{Acquired, CaptureDevice, SessionBackend, acquire};
use crate::session::channel::{InboundMessage, RemoteChannel, RemoteEvent};
use crate::session::{
    EventReceiver, EventSender, SessionEvent, SessionLink, SessionSetup, SessionState, UiEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handles held by a live session. Each is taken exactly once on teardown.
#[derive(Default)]
struct Resources {
    channel: Option<Box<dyn RemoteChannel>>,
    capture: Option<Box<dyn CaptureDevice>>,
    output: Option<Box<dyn PlaybackDevice>>,
}

impl Resources {
    fn is_empty(&self) -> bool {
        self.channel.is_none() && self.capture.is_none() && self.output.is_none()
    }
}

/// Owns the session lifecycle and routes every device and channel callback.
///
/// All mutation happens on the task that drives [`run`](Self::run) (or calls
/// [`handle`](Self::handle) directly), so the playback timeline and the
/// turn buffers have a single writer.
pub struct SessionController {
    state: SessionState,
    setup: SessionSetup,
    backend: Arc<dyn SessionBackend>,
    events: EventSender,
    ui: mpsc::UnboundedSender<UiEvent>,
    attempt: u64,
    resources: Resources,
    playback: PlaybackScheduler,
    turns: TurnAggregator,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        setup: SessionSetup,
        events: EventSender,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            state: SessionState::Disconnected,
            setup,
            backend,
            events,
            ui,
            attempt: 0,
            resources: Resources::default(),
            playback: PlaybackScheduler::default(),
            turns: TurnAggregator::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn turns(&self) -> &TurnAggregator {
        &self.turns
    }

    pub fn holds_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    /// Drive the controller until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        self.stop();
    }

    /// Process one event. Returns false once the loop should exit.
    pub fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Start => self.start(),
            SessionEvent::Stop => self.stop(),
            SessionEvent::Shutdown => {
                self.stop();
                return false;
            }
            SessionEvent::Acquired { attempt, result } => self.on_acquired(attempt, result),
            SessionEvent::Remote { attempt, event } => {
                if self.is_current(attempt) {
                    self.on_remote(event);
                }
            }
            SessionEvent::SourceEnded { id, .. } => self.on_source_ended(id),
            SessionEvent::DeviceLost { attempt, reason } => {
                if self.is_current(attempt) {
                    self.fail(SessionError::Device(reason));
                }
            }
        }
        true
    }

    /// Begin connecting. Device and channel acquisition continue in the
    /// background and report back as `SessionEvent::Acquired`.
    pub fn start(&mut self) {
        if matches!(self.state, SessionState::Connecting | SessionState::Connected) {
            tracing::debug!(state = %self.state, "start ignored");
            return;
        }

        if self.setup.api_key.trim().is_empty() {
            let error = SessionError::Config("API key not set".to_string());
            tracing::warn!(error = %error, "start refused");
            self.set_state(SessionState::Error);
            let _ = self.ui.send(UiEvent::CredentialRequired);
            return;
        }

        self.attempt += 1;
        self.set_state(SessionState::Connecting);

        let attempt = self.attempt;
        let backend = Arc::clone(&self.backend);
        let setup = self.setup.clone();
        let link = SessionLink::new(attempt, self.events.clone());
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = acquire(backend.as_ref(), &setup, link).await;
            // If the controller is gone the handles are dropped, which closes them.
            let _ = events.send(SessionEvent::Acquired { attempt, result });
        });
    }

    /// Release everything and return to `Disconnected`. Safe to call at any
    /// time, any number of times.
    pub fn stop(&mut self) {
        // Anything still in flight for the current attempt is now stale.
        self.attempt += 1;
        self.teardown();
        self.set_state(SessionState::Disconnected);
    }

    fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt
            && matches!(self.state, SessionState::Connecting | SessionState::Connected)
    }

    fn on_acquired(&mut self, attempt: u64, result: Result<Acquired, SessionError>) {
        if attempt != self.attempt || self.state != SessionState::Connecting {
            if let Ok(acquired) = result {
                tracing::debug!(attempt, "releasing resources of abandoned start");
                acquired.release();
            }
            return;
        }

        let Acquired {
            output,
            mut capture,
            channel,
        } = match result {
            Ok(acquired) => acquired,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        let sink = channel.outbound();
        let started = capture.start(sink);
        self.resources = Resources {
            channel: Some(channel),
            capture: Some(capture),
            output: Some(output),
        };

        match started {
            Ok(()) => self.set_state(SessionState::Connected),
            Err(e) => self.fail(e.into()),
        }
    }

    fn on_remote(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Message(message) => self.dispatch(message),
            RemoteEvent::Error(reason) => self.fail(SessionError::Channel(reason)),
            RemoteEvent::Closed => {
                tracing::info!("remote closed the session");
                self.stop();
            }
        }
    }

    fn dispatch(&mut self, message: InboundMessage) {
        if let Some(fragment) = message.audio_fragment.as_deref() {
            if let Some(output) = self.resources.output.as_deref_mut() {
                if let Err(e) = self.playback.on_fragment(output, fragment) {
                    let error = SessionError::from(e);
                    if error.is_terminal() {
                        self.fail(error);
                        return;
                    }
                    tracing::warn!(error = %error, "dropping audio fragment");
                }
            }
        }

        if message.interrupted {
            if let Some(output) = self.resources.output.as_deref_mut() {
                self.playback.on_interrupt(output);
            }
        }

        if let Some(text) = message.input_transcript_delta.as_deref() {
            self.turns.on_input_transcript_delta(text);
        }
        if let Some(text) = message.output_transcript_delta.as_deref() {
            self.turns.on_output_transcript_delta(text);
        }

        if message.turn_complete {
            if let Some(entries) = self.turns.on_turn_complete() {
                for entry in entries {
                    let _ = self.ui.send(UiEvent::Transcript(entry));
                }
            }
        }
    }

    fn on_source_ended(&mut self, id: SourceId) {
        if self.playback.on_source_ended(id) {
            tracing::trace!(fragment = %id, "fragment finished");
        }
    }

    /// Terminal failure: release everything and park in `Error`.
    fn fail(&mut self, error: SessionError) {
        tracing::error!(error = %error, "session failed");
        self.attempt += 1;
        self.teardown();
        self.set_state(SessionState::Error);
        let _ = self.ui.send(UiEvent::Failure(error.to_string()));
    }

    fn teardown(&mut self) {
        if let Some(mut channel) = self.resources.channel.take() {
            channel.close();
        }
        if let Some(mut capture) = self.resources.capture.take() {
            capture.close();
        }
        if let Some(mut output) = self.resources.output.take() {
            let stopped = self.playback.flush_all(output.as_mut());
            output.close();
            tracing::debug!(stopped, "playback released");
        }
        // The next output device starts its clock at zero.
        self.playback = PlaybackScheduler::default();
        self.turns.reset();
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::info!(from = %self.state, to = %state, "session state changed");
        self.state = state;
        let _ = self.ui.send(UiEvent::StateChanged(state));
    }
}
