use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid url: {0}")]
    Url(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0}")]
    Remote(String),
    #[error("{0} is required")]
    MissingInput(&'static str),
    #[error("{0} is outside the current directory")]
    OutsideWorkingDir(String),
    #[error("failed to read {path}: {message}")]
    ReadFile { path: String, message: String },
}
