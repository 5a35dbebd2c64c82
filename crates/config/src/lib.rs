//! Configuration for the streaming speech engine
//!
//! Plain serde structs handed to the session by the host. Every field has a
//! default so partial configuration deserializes cleanly.

use serde::{Deserialize, Serialize};

/// Playback scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sample rate of incoming chunks (synthesis engine output)
    #[serde(default = "default_input_sample_rate")]
    pub input_sample_rate: u32,

    /// Keep this much audio scheduled into the future (seconds)
    #[serde(default = "default_schedule_ahead")]
    pub schedule_ahead_secs: f64,

    /// Scheduler tick interval (ms)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Small cushion so chunks are never scheduled in the past (seconds)
    #[serde(default = "default_safety")]
    pub safety_secs: f64,

    /// Gain ramp duration for pause/resume, to avoid clicks (seconds)
    #[serde(default = "default_ramp")]
    pub ramp_secs: f64,

    /// Start-gate initial state; when false, nothing schedules until
    /// `set_start_gate_open(true)`
    #[serde(default = "default_true")]
    pub start_gate_initially_open: bool,
}

fn default_input_sample_rate() -> u32 {
    22050
}
fn default_schedule_ahead() -> f64 {
    0.5
}
fn default_tick_ms() -> u64 {
    50
}
fn default_safety() -> f64 {
    0.02
}
fn default_ramp() -> f64 {
    0.03
}
fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: default_input_sample_rate(),
            schedule_ahead_secs: default_schedule_ahead(),
            tick_ms: default_tick_ms(),
            safety_secs: default_safety(),
            ramp_secs: default_ramp(),
            start_gate_initially_open: true,
        }
    }
}

/// Start-time predictor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Fallback generation throughput before calibration (phonemes/second)
    #[serde(default = "default_phonemes_per_sec")]
    pub phonemes_per_sec: f64,

    /// Fallback audio yield before calibration (seconds of audio per phoneme)
    #[serde(default = "default_audio_secs_per_phoneme")]
    pub audio_secs_per_phoneme: f64,

    /// Derating factor applied to measured throughput and yield.
    ///
    /// Tuning knob calibrated empirically against one engine; lower values
    /// delay playback start further to guard against overrun.
    #[serde(default = "default_overrun_guard")]
    pub overrun_guard: f64,
}

fn default_phonemes_per_sec() -> f64 {
    30.0
}
fn default_audio_secs_per_phoneme() -> f64 {
    0.04
}
fn default_overrun_guard() -> f64 {
    0.75
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            phonemes_per_sec: default_phonemes_per_sec(),
            audio_secs_per_phoneme: default_audio_secs_per_phoneme(),
            overrun_guard: default_overrun_guard(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Playback scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Start-time predictor configuration
    #[serde(default)]
    pub predictor: PredictorConfig,

    /// Capture each finished utterance to a WAV file at this path
    #[serde(default)]
    pub capture_wav: Option<std::path::PathBuf>,
}
