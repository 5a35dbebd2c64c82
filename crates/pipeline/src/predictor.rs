//! Generation-to-playback start-time prediction
//!
//! Given per-unit generation costs and audio yields, computes the minimum
//! safe offset at which playback can begin without ever catching up to
//! generation. Throughput and yield are calibrated from the first observed
//! unit only, derated by a configurable guard factor, and held fixed for the
//! whole request.

use speech_stream_config::PredictorConfig;
use speech_stream_core::TextUnit;

/// Minimum safe playback-start offset in seconds.
///
/// For each unit i, generation of units 0..=i (`prefixC[i+1]`) must finish no
/// later than `T` plus the audio produced by units 0..i (`prefixP[i]`). The
/// worst prefix violation determines `T`; a single slow unit anywhere can
/// force a large value. Clamped to at least the first unit's own cost,
/// since playback can never start before any audio exists. Pure function.
pub fn compute_start_time(
    phoneme_counts: &[usize],
    phonemes_per_sec: f64,
    audio_secs_per_phoneme: f64,
) -> f64 {
    if phoneme_counts.is_empty() {
        return 0.0;
    }

    let costs: Vec<f64> = phoneme_counts
        .iter()
        .map(|&n| n as f64 / phonemes_per_sec)
        .collect();
    let yields: Vec<f64> = phoneme_counts
        .iter()
        .map(|&n| n as f64 * audio_secs_per_phoneme)
        .collect();

    let mut t_start: f64 = 0.0;
    let mut prefix_cost = 0.0;
    let mut prefix_yield = 0.0;

    for i in 0..phoneme_counts.len() {
        prefix_cost += costs[i];
        let required = prefix_cost - prefix_yield;
        if required > t_start {
            t_start = required;
        }
        prefix_yield += yields[i];
    }

    t_start.max(costs[0])
}

/// Throughput/yield estimate calibrated from the first synthesized unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Derated generation throughput (phonemes/second).
    pub phonemes_per_sec: f64,
    /// Derated audio yield (seconds of audio per phoneme).
    pub audio_secs_per_phoneme: f64,
}

impl CostModel {
    /// Calibrate from the first unit's measurements.
    ///
    /// Returns `None` when the measurements cannot support an estimate
    /// (empty unit or zero elapsed time).
    pub fn from_first_unit(
        phoneme_count: usize,
        elapsed_secs: f64,
        audio_secs: f64,
        config: &PredictorConfig,
    ) -> Option<Self> {
        if phoneme_count == 0 || elapsed_secs <= 0.0 {
            return None;
        }

        let guard = config.overrun_guard;
        Some(Self {
            phonemes_per_sec: phoneme_count as f64 / elapsed_secs * guard,
            audio_secs_per_phoneme: audio_secs / phoneme_count as f64 * guard,
        })
    }

    /// Uncalibrated model from configured fallback rates.
    pub fn fallback(config: &PredictorConfig) -> Self {
        Self {
            phonemes_per_sec: config.phonemes_per_sec,
            audio_secs_per_phoneme: config.audio_secs_per_phoneme,
        }
    }

    /// Predict the safe start offset for a whole request.
    pub fn predict_start_time(&self, units: &[TextUnit]) -> f64 {
        let counts: Vec<usize> = units.iter().map(|u| u.phoneme_count()).collect();
        compute_start_time(&counts, self.phonemes_per_sec, self.audio_secs_per_phoneme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sequence() {
        assert_eq!(compute_start_time(&[], 30.0, 0.04), 0.0);
    }

    #[test]
    fn test_single_unit_returns_its_cost() {
        // One unit: start exactly when it is ready, C[0] = 12/30.
        let t = compute_start_time(&[12], 30.0, 0.04);
        assert!((t - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_worked_prefix_scenario() {
        // C = [0.2, 0.3], P = [0.4, 0.4]:
        // required[0] = 0.2, required[1] = 0.5 - 0.4 = 0.1 => T = 0.2.
        // Realized with unit sizes [2, 3] at 10 phonemes/sec, 0.2 s/phoneme.
        let t = compute_start_time(&[2, 3], 10.0, 0.2);
        assert!((t - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_slow_late_unit_dominates() {
        // A large unit near the end forces a much earlier cushion.
        let fast_only = compute_start_time(&[10, 10, 10], 10.0, 0.05);
        let with_slow = compute_start_time(&[10, 10, 100], 10.0, 0.05);
        assert!(with_slow > fast_only);
    }

    #[test]
    fn test_calibration_derates_both_rates() {
        let config = PredictorConfig::default();
        let model = CostModel::from_first_unit(30, 1.0, 1.2, &config).unwrap();
        // 30 phonemes in 1s, derated by 0.75.
        assert!((model.phonemes_per_sec - 22.5).abs() < 1e-9);
        // 1.2s of audio over 30 phonemes, derated by 0.75.
        assert!((model.audio_secs_per_phoneme - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_calibration_rejects_degenerate_measurements() {
        let config = PredictorConfig::default();
        assert!(CostModel::from_first_unit(0, 1.0, 1.0, &config).is_none());
        assert!(CostModel::from_first_unit(10, 0.0, 1.0, &config).is_none());
    }
}
