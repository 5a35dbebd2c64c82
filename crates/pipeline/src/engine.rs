//! Synthesis collaborator contracts
//!
//! The native synthesis engine and the text-preparation step are external
//! collaborators; this module defines only the traits the pipeline consumes,
//! plus deterministic implementations for tests and wiring without a model.

use async_trait::async_trait;

use speech_stream_core::{GenerateRequest, TextUnit};

use crate::PipelineError;

/// Audio produced for one text unit.
#[derive(Debug, Clone)]
pub struct Synthesized {
    /// Mono PCM samples (f32, -1.0 to 1.0).
    pub samples: Vec<f32>,
    /// Sample rate of `samples` in Hz.
    pub sample_rate: u32,
}

/// Native synthesis engine contract.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Load the named model; returns the engine output sample rate.
    async fn load_model(&self, model_id: &str) -> Result<u32, PipelineError>;

    /// Synthesize one unit of cleaned text.
    async fn synthesize(
        &self,
        text: &str,
        speaker_id: u32,
        speed: f32,
    ) -> Result<Synthesized, PipelineError>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}

/// Text preparation contract: split a request into ordered units with
/// display/clean/phoneme views.
#[async_trait]
pub trait TextPreparer: Send + Sync {
    async fn prepare(&self, request: &GenerateRequest) -> Result<Vec<TextUnit>, PipelineError>;
}

/// Deterministic engine for tests and offline wiring.
///
/// Produces a fixed number of samples per input character, so timing-related
/// behavior is reproducible without a model.
pub struct StubEngine {
    sample_rate: u32,
    samples_per_char: usize,
}

impl StubEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            // ~50ms of audio per character.
            samples_per_char: sample_rate as usize / 20,
        }
    }
}

#[async_trait]
impl SynthesisEngine for StubEngine {
    async fn load_model(&self, _model_id: &str) -> Result<u32, PipelineError> {
        Ok(self.sample_rate)
    }

    async fn synthesize(
        &self,
        text: &str,
        _speaker_id: u32,
        _speed: f32,
    ) -> Result<Synthesized, PipelineError> {
        Ok(Synthesized {
            samples: vec![0.0; text.chars().count() * self.samples_per_char],
            sample_rate: self.sample_rate,
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Sentence-boundary text preparer.
///
/// Splits on `.`, `!`, `?` (boundary characters stay with their sentence) and
/// uses the cleaned text itself as the phoneme view, which is adequate for
/// cost estimation when no grapheme-to-phoneme stage is wired in.
pub struct SentenceSplitter;

#[async_trait]
impl TextPreparer for SentenceSplitter {
    async fn prepare(&self, request: &GenerateRequest) -> Result<Vec<TextUnit>, PipelineError> {
        let mut units = Vec::new();
        let mut current = String::new();

        for c in request.text.chars() {
            current.push(c);
            if matches!(c, '.' | '!' | '?') {
                push_unit(&mut units, &mut current);
            }
        }
        push_unit(&mut units, &mut current);

        if units.is_empty() {
            return Err(PipelineError::Preparation(
                "no speakable units in text".to_string(),
            ));
        }
        Ok(units)
    }
}

fn push_unit(units: &mut Vec<TextUnit>, current: &mut String) {
    let sentence = current.trim();
    if !sentence.is_empty() {
        let clean = sentence.to_string();
        units.push(TextUnit {
            display: sentence.to_string(),
            phonemes: clean.to_lowercase(),
            clean,
        });
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use speech_stream_core::GenerateOptions;

    fn request(text: &str) -> GenerateRequest {
        GenerateOptions {
            text: text.to_string(),
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn test_splitter_keeps_boundaries() {
        let units = SentenceSplitter
            .prepare(&request("Hello there. How are you? Good!"))
            .await
            .unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].clean, "Hello there.");
        assert_eq!(units[1].clean, "How are you?");
        assert_eq!(units[2].clean, "Good!");
    }

    #[tokio::test]
    async fn test_splitter_trailing_fragment() {
        let units = SentenceSplitter
            .prepare(&request("One. trailing words"))
            .await
            .unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].clean, "trailing words");
    }

    #[tokio::test]
    async fn test_stub_engine_duration_scales_with_text() {
        let engine = StubEngine::new(22050);
        let short = engine.synthesize("ab", 0, 1.0).await.unwrap();
        let long = engine.synthesize("abcd", 0, 1.0).await.unwrap();
        assert_eq!(long.samples.len(), short.samples.len() * 2);
        assert_eq!(short.sample_rate, 22050);
    }
}
