use crate::audio::AudioError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Sample rate of microphone audio sent to the speech service.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of synthesized audio received from the speech service.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

const PCM16_SCALE: f32 = 32768.0;

/// One encoded microphone frame, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireAudioPayload {
    pub data: String,
    pub mime_type: String,
}

impl WireAudioPayload {
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            data: bytes_to_text(&float_to_pcm16(samples)),
            mime_type: format!("audio/pcm;rate={CAPTURE_SAMPLE_RATE}"),
        }
    }
}

/// Scale by 32768 and truncate into 16 bits. Out-of-range input wraps
/// around rather than clipping, so `1.0` encodes as `-32768`.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let value = (sample * PCM16_SCALE) as i32 as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode interleaved little-endian PCM16 into one sample vector per channel.
pub fn pcm16_to_float(bytes: &[u8], channels: usize) -> Result<Vec<Vec<f32>>, AudioError> {
    if channels == 0 {
        return Err(AudioError::Decode("channel count must be non-zero".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(AudioError::Decode(format!(
            "odd byte length {} for 16-bit samples",
            bytes.len()
        )));
    }

    let frames = bytes.len() / 2 / channels;
    let mut output = vec![Vec::with_capacity(frames); channels];
    for (i, chunk) in bytes.chunks_exact(2).take(frames * channels).enumerate() {
        let value = i16::from_le_bytes([chunk[0], chunk[1]]);
        output[i % channels].push(f32::from(value) / PCM16_SCALE);
    }
    Ok(output)
}

pub fn bytes_to_text(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn text_to_bytes(text: &str) -> Result<Vec<u8>, AudioError> {
    BASE64
        .decode(text)
        .map_err(|e| AudioError::Decode(e.to_string()))
}
