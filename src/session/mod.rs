pub mod backend;
pub mod channel;
pub mod controller;
pub mod live;
pub mod protocol;

use crate::audio::playback::SourceId;
use crate::config::Voice;
use crate::conversation::TranscriptEntry;
use crate::error::session::SessionError;
use backend::Acquired;
use channel::{InboundMessage, RemoteEvent};
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Everything needed to open a live session.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub api_key: String,
    pub model: String,
    pub voice: Voice,
    pub system_instruction: String,
}

/// Input to the controller's event loop. Device and channel callbacks are
/// tagged with the start attempt they belong to so that stragglers from a
/// torn-down session are ignored.
pub enum SessionEvent {
    Start,
    Stop,
    Shutdown,
    Acquired {
        attempt: u64,
        result: Result<Acquired, SessionError>,
    },
    Remote {
        attempt: u64,
        event: RemoteEvent,
    },
    SourceEnded {
        attempt: u64,
        id: SourceId,
    },
    DeviceLost {
        attempt: u64,
        reason: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Handle given to devices and channels of one start attempt. Sends are
/// fire-and-forget; a closed controller simply drops them.
#[derive(Debug, Clone)]
pub struct SessionLink {
    attempt: u64,
    events: EventSender,
}

impl SessionLink {
    pub fn new(attempt: u64, events: EventSender) -> Self {
        Self { attempt, events }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn inbound(&self, message: InboundMessage) {
        self.remote(RemoteEvent::Message(message));
    }

    pub fn channel_error(&self, reason: impl Into<String>) {
        self.remote(RemoteEvent::Error(reason.into()));
    }

    pub fn channel_closed(&self) {
        self.remote(RemoteEvent::Closed);
    }

    pub fn source_ended(&self, id: SourceId) {
        let _ = self.events.send(SessionEvent::SourceEnded {
            attempt: self.attempt,
            id,
        });
    }

    /// Microphone or speaker stopped delivering. Ends the session.
    pub fn device_lost(&self, reason: impl Into<String>) {
        let _ = self.events.send(SessionEvent::DeviceLost {
            attempt: self.attempt,
            reason: reason.into(),
        });
    }

    fn remote(&self, event: RemoteEvent) {
        let _ = self.events.send(SessionEvent::Remote {
            attempt: self.attempt,
            event,
        });
    }
}

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    StateChanged(SessionState),
    CredentialRequired,
    Transcript(TranscriptEntry),
    Failure(String),
}
