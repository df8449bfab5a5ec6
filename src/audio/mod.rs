pub mod analysis;
pub mod capture;
pub mod codec;
pub mod error;
pub mod output;
pub mod playback;
pub mod resampler;

pub use error::AudioError;
