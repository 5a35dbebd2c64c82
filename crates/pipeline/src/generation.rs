//! Sequential per-unit generation loop
//!
//! Synthesizes prepared text units strictly in order, measures wall-clock
//! generation time, predicts the safe playback start after the first unit,
//! and emits chunk events downstream. Cancellation is cooperative: the
//! signal is checked only between units, so a cancel can lag by up to one
//! unit's synthesis time.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use speech_stream_config::PredictorConfig;
use speech_stream_core::GenerateRequest;

use crate::engine::{SynthesisEngine, TextPreparer};
use crate::predictor::CostModel;
use crate::PipelineError;

/// Pending cancellation, carrying the id of the cancelling request.
///
/// One writer (the worker control loop), one reader (the generation loop) at
/// unit boundaries. Taking the value consumes it so exactly one
/// acknowledgment is produced per cancel.
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<Mutex<Option<u64>>>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation on behalf of request `cancel_id`.
    pub fn request(&self, cancel_id: u64) {
        *self.0.lock() = Some(cancel_id);
    }

    /// Consume a pending cancellation, if any.
    pub fn take(&self) -> Option<u64> {
        self.0.lock().take()
    }

    pub fn is_requested(&self) -> bool {
        self.0.lock().is_some()
    }
}

/// Events emitted by one generation run.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// One synthesized unit.
    Chunk {
        /// Unit index within the request.
        index: usize,
        /// Completion fraction, `(index + 1) / unit_count`.
        progress: f32,
        /// Mono PCM at `sample_rate`.
        samples: Arc<[f32]>,
        sample_rate: u32,
        /// Cumulative wall-clock generation time so far (seconds).
        t_runtime: f64,
        /// Predicted safe playback-start offset for this request (seconds).
        t_play_audio: f64,
    },
    /// The request finished (normally or because it was cancelled).
    Done,
    /// A pending cancellation was honored; carries the cancelling request id.
    Cancelled { cancel_id: u64 },
}

/// Sequential generation loop over a synthesis engine and text preparer.
pub struct GenerationPipeline {
    engine: Arc<dyn SynthesisEngine>,
    preparer: Arc<dyn TextPreparer>,
    config: PredictorConfig,
}

impl GenerationPipeline {
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        preparer: Arc<dyn TextPreparer>,
        config: PredictorConfig,
    ) -> Self {
        Self {
            engine,
            preparer,
            config,
        }
    }

    /// Run one generation request to completion or cancellation.
    ///
    /// Emits a `Chunk` per unit, then `Done`; when a cancellation is observed
    /// at a unit boundary, emits `Done` for this request followed by
    /// `Cancelled` for the cancelling one and stops. A synthesis failure
    /// aborts the loop with an error and emits no terminal event; the caller
    /// reports it on the request instead.
    pub async fn run(
        &self,
        request: &GenerateRequest,
        cancel: &CancelSignal,
        events: &mpsc::Sender<GenerationEvent>,
    ) -> Result<(), PipelineError> {
        let units = self.preparer.prepare(request).await?;
        let unit_count = units.len();

        let mut t_runtime = 0.0;
        let mut t_play_audio: Option<f64> = None;

        for (index, unit) in units.iter().enumerate() {
            if let Some(cancel_id) = cancel.take() {
                tracing::debug!(index, cancel_id, "generation cancelled at unit boundary");
                events
                    .send(GenerationEvent::Done)
                    .await
                    .map_err(|_| PipelineError::ChannelClosed)?;
                events
                    .send(GenerationEvent::Cancelled { cancel_id })
                    .await
                    .map_err(|_| PipelineError::ChannelClosed)?;
                return Ok(());
            }

            let started = Instant::now();
            let synthesized = self
                .engine
                .synthesize(&unit.clean, request.speaker_id, request.speed)
                .await?;
            let elapsed = started.elapsed().as_secs_f64();
            t_runtime += elapsed;

            // Calibrate throughput and yield from the first unit only; the
            // prediction is computed once and held for the whole request.
            if index == 0 {
                let audio_secs =
                    synthesized.samples.len() as f64 / synthesized.sample_rate as f64;
                let model =
                    CostModel::from_first_unit(unit.phoneme_count(), elapsed, audio_secs, &self.config)
                        .unwrap_or_else(|| CostModel::fallback(&self.config));
                let predicted = model.predict_start_time(&units);
                tracing::debug!(
                    phonemes_per_sec = model.phonemes_per_sec,
                    audio_secs_per_phoneme = model.audio_secs_per_phoneme,
                    t_play_audio = predicted,
                    "calibrated start-time prediction"
                );
                t_play_audio = Some(predicted);
            }

            events
                .send(GenerationEvent::Chunk {
                    index,
                    progress: (index + 1) as f32 / unit_count as f32,
                    samples: synthesized.samples.into(),
                    sample_rate: synthesized.sample_rate,
                    t_runtime,
                    t_play_audio: t_play_audio.unwrap_or(0.0),
                })
                .await
                .map_err(|_| PipelineError::ChannelClosed)?;
        }

        events
            .send(GenerationEvent::Done)
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::engine::{SentenceSplitter, StubEngine, Synthesized};
    use speech_stream_core::GenerateOptions;

    fn request(text: &str) -> GenerateRequest {
        GenerateOptions {
            text: text.to_string(),
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    async fn collect(
        pipeline: &GenerationPipeline,
        request: &GenerateRequest,
        cancel: &CancelSignal,
    ) -> (Vec<GenerationEvent>, Result<(), PipelineError>) {
        let (tx, mut rx) = mpsc::channel(64);
        let result = pipeline.run(request, cancel, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (events, result)
    }

    #[tokio::test]
    async fn test_emits_chunk_per_unit_then_done() {
        let pipeline = GenerationPipeline::new(
            Arc::new(StubEngine::new(22050)),
            Arc::new(SentenceSplitter),
            PredictorConfig::default(),
        );

        let (events, result) =
            collect(&pipeline, &request("One. Two. Three."), &CancelSignal::new()).await;
        result.unwrap();

        assert_eq!(events.len(), 4);
        for (i, event) in events[..3].iter().enumerate() {
            let GenerationEvent::Chunk { index, progress, t_play_audio, .. } = event else {
                panic!("expected chunk event");
            };
            assert_eq!(*index, i);
            assert!((progress - (i + 1) as f32 / 3.0).abs() < 1e-6);
            // The prediction is computed once after unit 0 and held.
            assert!(*t_play_audio >= 0.0);
        }
        assert!(matches!(events[3], GenerationEvent::Done));
    }

    #[tokio::test]
    async fn test_prediction_held_constant_across_chunks() {
        let pipeline = GenerationPipeline::new(
            Arc::new(StubEngine::new(22050)),
            Arc::new(SentenceSplitter),
            PredictorConfig::default(),
        );

        let (events, result) =
            collect(&pipeline, &request("Alpha. Beta. Gamma."), &CancelSignal::new()).await;
        result.unwrap();

        let predictions: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::Chunk { t_play_audio, .. } => Some(*t_play_audio),
                _ => None,
            })
            .collect();
        assert_eq!(predictions.len(), 3);
        assert!(predictions.windows(2).all(|w| w[0] == w[1]));
    }

    /// Engine that raises the cancel signal while synthesizing its second
    /// unit, so the boundary check before unit 2 observes it.
    struct CancellingEngine {
        inner: StubEngine,
        cancel: CancelSignal,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SynthesisEngine for CancellingEngine {
        async fn load_model(&self, model_id: &str) -> Result<u32, PipelineError> {
            self.inner.load_model(model_id).await
        }

        async fn synthesize(
            &self,
            text: &str,
            speaker_id: u32,
            speed: f32,
        ) -> Result<Synthesized, PipelineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                self.cancel.request(99);
            }
            self.inner.synthesize(text, speaker_id, speed).await
        }

        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
    }

    #[tokio::test]
    async fn test_cancel_between_units_acknowledges_and_stops() {
        let cancel = CancelSignal::new();
        let pipeline = GenerationPipeline::new(
            Arc::new(CancellingEngine {
                inner: StubEngine::new(22050),
                cancel: cancel.clone(),
                calls: AtomicUsize::new(0),
            }),
            Arc::new(SentenceSplitter),
            PredictorConfig::default(),
        );

        let (events, result) =
            collect(&pipeline, &request("A. B. C. D. E."), &cancel).await;
        result.unwrap();

        // Units 0 and 1 were emitted; the cancel raised during unit 1's
        // synthesis stops the loop before unit 2.
        let chunks = events
            .iter()
            .filter(|e| matches!(e, GenerationEvent::Chunk { .. }))
            .count();
        assert_eq!(chunks, 2);
        assert!(matches!(events[2], GenerationEvent::Done));
        assert!(matches!(events[3], GenerationEvent::Cancelled { cancel_id: 99 }));
        assert_eq!(events.len(), 4);
        // The signal was consumed by the acknowledgment.
        assert!(!cancel.is_requested());
    }

    /// Engine that fails on its second unit.
    struct FailingEngine {
        inner: StubEngine,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SynthesisEngine for FailingEngine {
        async fn load_model(&self, model_id: &str) -> Result<u32, PipelineError> {
            self.inner.load_model(model_id).await
        }

        async fn synthesize(
            &self,
            text: &str,
            speaker_id: u32,
            speed: f32,
        ) -> Result<Synthesized, PipelineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(PipelineError::Synthesis("engine exploded".to_string()));
            }
            self.inner.synthesize(text, speaker_id, speed).await
        }

        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
    }

    #[tokio::test]
    async fn test_synthesis_failure_aborts_without_done() {
        let pipeline = GenerationPipeline::new(
            Arc::new(FailingEngine {
                inner: StubEngine::new(22050),
                calls: AtomicUsize::new(0),
            }),
            Arc::new(SentenceSplitter),
            PredictorConfig::default(),
        );

        let (events, result) =
            collect(&pipeline, &request("A. B. C."), &CancelSignal::new()).await;
        assert!(matches!(result, Err(PipelineError::Synthesis(_))));

        // One chunk made it out; no terminal event was emitted.
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], GenerationEvent::Chunk { .. }));
    }
}
