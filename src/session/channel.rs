use crate::audio::codec::WireAudioPayload;
use tokio::sync::mpsc;

/// Outbound path of a live channel. The capture callback pushes encoded frames
/// here without awaiting.
pub type OutboundSender = mpsc::UnboundedSender<WireAudioPayload>;

/// One message from the speech service, already lifted out of the wire shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Base64 PCM16 at 24 kHz.
    pub audio_fragment: Option<String>,
    pub interrupted: bool,
    pub input_transcript_delta: Option<String>,
    pub output_transcript_delta: Option<String>,
    pub turn_complete: bool,
}

impl InboundMessage {
    pub fn is_empty(&self) -> bool {
        self.audio_fragment.is_none()
            && !self.interrupted
            && self.input_transcript_delta.is_none()
            && self.output_transcript_delta.is_none()
            && !self.turn_complete
    }
}

/// What a remote channel reports back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    Message(InboundMessage),
    Error(String),
    Closed,
}

/// An open bidirectional session with the speech service.
pub trait RemoteChannel: Send {
    /// Sender the capture stage feeds. Valid until `close`.
    fn outbound(&self) -> OutboundSender;

    /// Release the connection. Must tolerate repeated calls.
    fn close(&mut self);
}
