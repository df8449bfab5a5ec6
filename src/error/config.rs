use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to serialize settings: {0}")]
    Serialize(String),
}
