//! Audio chunk type and resampling
//!
//! Chunks are immutable mono PCM buffers at a known sample rate. A chunk is
//! owned by the playback scheduler once enqueued and is either scheduled on
//! the output device or dropped by `clear()`, never mutated in place.

use std::sync::Arc;

/// Callback invoked when a scheduled chunk actually starts playing.
pub type OnStart = Box<dyn FnOnce() + Send>;

/// One unit of synthesized mono PCM audio.
pub struct AudioChunk {
    /// PCM samples (f32, -1.0 to 1.0), already at the output device rate.
    pub samples: Arc<[f32]>,
    /// Sample rate of `samples` in Hz.
    pub sample_rate: u32,
    /// Invoked exactly once when playback of this chunk begins.
    pub on_start: Option<OnStart>,
}

impl AudioChunk {
    /// Wrap samples that are already at the target rate.
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            on_start: None,
        }
    }

    /// Attach a start callback.
    pub fn with_on_start(mut self, on_start: OnStart) -> Self {
        self.on_start = Some(on_start);
        self
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

impl std::fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChunk")
            .field("samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("on_start", &self.on_start.is_some())
            .finish()
    }
}

/// Resample mono PCM with linear interpolation.
///
/// Output length is `round(input.len() * out_rate / in_rate)` (at least 1 for
/// non-empty input); reads past the end clamp to the last input sample.
/// Identity when the rates already match.
pub fn resample_linear(input: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if in_rate == out_rate || input.is_empty() {
        return input.to_vec();
    }

    let ratio = out_rate as f64 / in_rate as f64;
    let out_len = ((input.len() as f64 * ratio).round() as usize).max(1);
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let t = i as f64 / ratio;
        let i0 = t.floor() as usize;
        let i1 = (i0 + 1).min(input.len() - 1);
        let frac = (t - i0 as f64) as f32;
        output.push(input[i0] * (1.0 - frac) + input[i1] * frac);
    }

    output
}
