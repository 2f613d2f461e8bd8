//! Silence-inferred playback detection.
//!
//! The transport does not reliably deliver an explicit "playback stopped"
//! event, so while a session is active we sample inbound audio energy on a
//! short fixed interval and declare playback over after a run of consecutive
//! below-threshold samples. The decision kernel here is pure; the controller
//! owns the interval timer and applies the decisions to session state.

use serde::{Deserialize, Serialize};

/// Tunable parameters for the detector.
///
/// The original values were tuned empirically; treat these as configuration,
/// not contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    /// Sampling interval in milliseconds.
    pub interval_ms: u64,
    /// RMS energy below this counts as a silent sample.
    pub energy_threshold: f32,
    /// Consecutive silent samples before playback is declared stopped.
    pub silence_samples: u32,
    /// Exponential smoothing factor applied to audible energy, in (0, 1].
    pub smoothing: f32,
    /// Linear gain mapping smoothed energy to the 0..1 volume scale.
    pub gain: f32,
    /// Lower bound for the reported volume while audible, so UI meters never
    /// flicker to exactly zero during quiet speech.
    pub volume_floor: f32,
    /// Volume reported when a playback-started event arrives, before the
    /// first energy sample lands.
    pub initial_volume: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            energy_threshold: 0.01,
            silence_samples: 5,
            smoothing: 0.3,
            gain: 4.0,
            volume_floor: 0.05,
            initial_volume: 0.3,
        }
    }
}

/// Outcome of one energy sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Audible energy; playback is live at the given volume.
    Audible { volume: f32 },
    /// Below threshold, but the silence run has not reached the bound yet.
    Quiet,
    /// The silence bound was just reached: treat playback as stopped.
    Stopped,
}

/// Consecutive-silence counter with volume smoothing.
#[derive(Debug)]
pub struct SilenceDetector {
    config: DetectorConfig,
    silent_run: u32,
    smoothed: f32,
}

impl SilenceDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            silent_run: 0,
            smoothed: 0.0,
        }
    }

    /// Feed one RMS energy sample and get the playback decision.
    ///
    /// `Stopped` is returned exactly once per silence run, on the sample that
    /// reaches the configured bound; further silent samples are `Quiet`.
    pub fn observe(&mut self, energy: f32) -> Decision {
        if energy >= self.config.energy_threshold {
            self.silent_run = 0;
            self.smoothed += (energy - self.smoothed) * self.config.smoothing;
            let volume = (self.smoothed * self.config.gain)
                .clamp(self.config.volume_floor, 1.0);
            return Decision::Audible { volume };
        }

        self.silent_run = self.silent_run.saturating_add(1);
        if self.silent_run == self.config.silence_samples {
            self.smoothed = 0.0;
            Decision::Stopped
        } else {
            Decision::Quiet
        }
    }

    /// Reset the silence run and smoothing state (session stop or playback
    /// restart).
    pub fn reset(&mut self) {
        self.silent_run = 0;
        self.smoothed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> SilenceDetector {
        SilenceDetector::new(DetectorConfig::default())
    }

    #[test]
    fn test_stop_on_fifth_silent_sample_not_earlier() {
        let mut det = detector();
        assert!(matches!(det.observe(0.2), Decision::Audible { .. }));
        for i in 0..4 {
            assert_eq!(det.observe(0.0), Decision::Quiet, "sample {}", i);
        }
        assert_eq!(det.observe(0.0), Decision::Stopped);
    }

    #[test]
    fn test_stopped_reported_once_per_run() {
        let mut det = detector();
        for _ in 0..4 {
            det.observe(0.0);
        }
        assert_eq!(det.observe(0.0), Decision::Stopped);
        assert_eq!(det.observe(0.0), Decision::Quiet);
    }

    #[test]
    fn test_audible_sample_resets_silence_run() {
        let mut det = detector();
        for _ in 0..4 {
            det.observe(0.0);
        }
        assert!(matches!(det.observe(0.5), Decision::Audible { .. }));
        // A fresh run of five is required again.
        for _ in 0..4 {
            assert_eq!(det.observe(0.0), Decision::Quiet);
        }
        assert_eq!(det.observe(0.0), Decision::Stopped);
    }

    #[test]
    fn test_volume_has_positive_floor_and_unit_cap() {
        let mut det = detector();
        match det.observe(0.011) {
            Decision::Audible { volume } => {
                assert!(volume >= DetectorConfig::default().volume_floor)
            }
            other => panic!("expected audible, got {:?}", other),
        }
        // Loud input saturates at 1.0 after smoothing converges.
        let mut last = 0.0;
        for _ in 0..50 {
            if let Decision::Audible { volume } = det.observe(1.0) {
                last = volume;
            }
        }
        assert!((last - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_volume_monotonic_in_energy() {
        let mut quiet = detector();
        let mut loud = detector();
        let quiet_vol = match quiet.observe(0.02) {
            Decision::Audible { volume } => volume,
            other => panic!("{:?}", other),
        };
        let loud_vol = match loud.observe(0.2) {
            Decision::Audible { volume } => volume,
            other => panic!("{:?}", other),
        };
        assert!(loud_vol > quiet_vol);
    }
}
