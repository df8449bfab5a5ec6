use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No microphone found. Please check your system audio settings.")]
    NoMicrophoneFound,

    #[error("No audio output device found. Please check your system audio settings.")]
    NoOutputDevice,

    #[error("Failed to initialize audio device: {0}")]
    DeviceInitFailed(String),

    #[error("Failed to start audio stream: {0}")]
    StreamStartFailed(String),

    #[error("Audio device stopped: {0}")]
    DeviceLost(String),

    #[error("Failed to resample audio: {0}")]
    ResampleFailed(String),

    #[error("Malformed audio fragment: {0}")]
    Decode(String),
}
