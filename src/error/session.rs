use crate::audio::AudioError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Recoverable: the user is asked for the missing value.
    #[error("configuration error: {0}")]
    Config(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("channel error: {0}")]
    Channel(String),
    /// Malformed inbound fragment; dropped without ending the session.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<AudioError> for SessionError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Decode(message) => SessionError::Decode(message),
            other => SessionError::Device(other.to_string()),
        }
    }
}

impl SessionError {
    /// Device and channel failures end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionError::Device(_) | SessionError::Channel(_))
    }
}
