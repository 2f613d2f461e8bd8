//! Root-mean-square energy of an audio chunk.

/// Compute the RMS energy of a chunk of f32 samples.
///
/// Used for the inbound-playback silence detector and UI volume meters; a
/// simple proxy for perceived loudness that is plenty for speech/silence
/// discrimination.
pub fn rms(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = chunk.iter().map(|s| s * s).sum();
    (sum_sq / chunk.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunk_is_zero() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(rms(&[0.0; 480]), 0.0);
    }

    #[test]
    fn test_full_scale_square_wave_is_one() {
        let chunk: Vec<f32> = (0..480).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((rms(&chunk) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_louder_signal_has_higher_rms() {
        let quiet: Vec<f32> = vec![0.1; 480];
        let loud: Vec<f32> = vec![0.5; 480];
        assert!(rms(&loud) > rms(&quiet));
    }
}
