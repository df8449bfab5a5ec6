use crate::audio::AudioError;
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

/// Input frames handed to rubato per call. Small enough to keep capture latency
/// well under one wire frame.
const CHUNK_SIZE: usize = 1024;

/// Streaming mono resampler. Input arrives in whatever block sizes the device
/// delivers; output is produced whenever a full chunk has accumulated.
pub struct Resampler {
    resampler: SincFixedIn<f32>,
    pending: Vec<f32>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, AudioError> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            2.0, // max_resample_ratio_relative
            params,
            CHUNK_SIZE,
            1, // nbr_channels
        )
        .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;

        Ok(Resampler {
            resampler,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
        })
    }

    /// Feed device-rate samples, returning every target-rate sample that is
    /// ready. Leftover input is held until the next call.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, AudioError> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let waves_in = vec![self.pending.drain(..CHUNK_SIZE).collect::<Vec<f32>>()];
            let waves_out = self
                .resampler
                .process(&waves_in, None)
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
            output.extend_from_slice(&waves_out[0]);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_partial_chunk_when_processed_then_held_until_full() {
        // Given
        let mut resampler = Resampler::new(48000, 16000).unwrap();

        // When
        let first = resampler.process(&vec![0.0; CHUNK_SIZE / 2]).unwrap();
        let second = resampler.process(&vec![0.0; CHUNK_SIZE / 2]).unwrap();

        // Then
        assert!(first.is_empty());
        assert!(!second.is_empty());
    }

    #[test]
    fn given_steady_input_when_processed_then_output_tracks_rate_ratio() {
        // Given
        let mut resampler = Resampler::new(48000, 16000).unwrap();

        // When
        let mut produced = 0;
        for _ in 0..30 {
            produced += resampler.process(&vec![0.1; CHUNK_SIZE]).unwrap().len();
        }

        // Then
        let expected = 30 * CHUNK_SIZE / 3;
        assert!(produced.abs_diff(expected) <= CHUNK_SIZE / 3);
    }
}
