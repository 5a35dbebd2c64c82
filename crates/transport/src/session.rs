//! Streaming speech session
//!
//! One session owns a playback scheduler, a synthesis worker, and the
//! client between them. `speak` supersedes whatever was playing: the
//! previous generation is cancelled and its audio dropped before the new
//! one starts. Chunks stream into the scheduler as they arrive; the start
//! gate opens as soon as the predictor deems playback safe, or at the
//! latest when the whole generation is buffered.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use speech_stream_audio::{OutputDevice, PlaybackScheduler, PlaybackState};
use speech_stream_config::SessionConfig;
use speech_stream_core::{Error, GenerateOptions, Result};
use speech_stream_pipeline::{SynthesisEngine, TextPreparer};

use crate::client::WorkerClient;
use crate::protocol::{RequestId, WorkerRequest, WorkerResponse};
use crate::worker::SynthesisWorker;

/// A live text-to-speech session.
pub struct SpeechSession {
    id: Uuid,
    scheduler: Arc<PlaybackScheduler>,
    client: WorkerClient,
    /// Generation whose chunks are currently accepted.
    active: Arc<Mutex<Option<RequestId>>>,
    worker: JoinHandle<()>,
    chunk_router: JoinHandle<()>,
}

impl SpeechSession {
    /// Create a session over `device` and spawn its worker and routing
    /// tasks on the current runtime.
    pub fn new(
        config: SessionConfig,
        engine: Arc<dyn SynthesisEngine>,
        preparer: Arc<dyn TextPreparer>,
        device: Arc<dyn OutputDevice>,
    ) -> Self {
        let scheduler = PlaybackScheduler::new(config.scheduler, device);
        scheduler.start();

        let (req_tx, resp_rx, worker) =
            SynthesisWorker::spawn(engine, preparer, config.predictor, config.capture_wav);
        let (client, mut chunks) = WorkerClient::new(req_tx, resp_rx);

        let active: Arc<Mutex<Option<RequestId>>> = Arc::new(Mutex::new(None));
        let id = Uuid::new_v4();

        let chunk_router = tokio::spawn({
            let scheduler = scheduler.clone();
            let active = active.clone();
            async move {
                while let Some((request_id, chunk)) = chunks.recv().await {
                    if *active.lock() != Some(request_id) {
                        tracing::debug!(request_id, "dropping chunk from superseded generation");
                        continue;
                    }

                    if let Err(err) =
                        scheduler.enqueue(&chunk.samples, chunk.sample_rate, None)
                    {
                        tracing::warn!(request_id, %err, "failed to enqueue chunk");
                        continue;
                    }
                    scheduler
                        .update_should_start(chunk.t_runtime >= chunk.t_play_audio);
                }
            }
        });

        tracing::info!(session_id = %id, "speech session started");
        Self {
            id,
            scheduler,
            client,
            active,
            worker,
            chunk_router,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Load the synthesis model; returns its output sample rate.
    pub async fn load_model(&self, model_id: &str) -> Result<u32> {
        Ok(self.client.load_model(model_id).await?)
    }

    /// Speak `options`, superseding any in-flight generation.
    ///
    /// Resolves once the whole generation is buffered (or an error is
    /// reported); audio starts streaming out while this is pending.
    pub async fn speak(&self, options: GenerateOptions) -> Result<()> {
        // Reject bad input before disturbing current playback.
        options.validate().map_err(Error::Validation)?;

        self.cancel().await?;

        // Hold new audio until the predictor clears it.
        self.scheduler.set_start_gate_open(false);

        let id = self.client.allocate_id();
        *self.active.lock() = Some(id);
        let waiter = self
            .client
            .dispatch(WorkerRequest::Generate { id, options })
            .await?;

        let result = WorkerClient::resolve(id, waiter).await;

        // Trailing chunks may still be in flight on the chunk channel, so
        // the generation stays active until the next speak or cancel.
        let still_active = *self.active.lock() == Some(id);

        match result {
            Ok(WorkerResponse::GenerateDone { .. }) => {
                // Everything is buffered, waiting any longer gains nothing.
                if still_active {
                    self.scheduler.set_start_gate_open(true);
                }
                Ok(())
            }
            Ok(other) => Err(Error::Transport(format!("unexpected response {other:?}"))),
            Err(err) => Err(err.into()),
        }
    }

    /// Cancel the in-flight generation, if any, and drop its audio.
    pub async fn cancel(&self) -> Result<()> {
        if self.active.lock().take().is_none() {
            return Ok(());
        }
        self.client.terminate_early().await?;
        self.scheduler.clear();
        Ok(())
    }

    /// Request audible playback.
    pub async fn play(&self) -> Result<()> {
        self.scheduler
            .play()
            .await
            .map_err(|err| Error::Audio(err.to_string()))
    }

    /// Fade out and suspend playback without losing buffered audio.
    pub async fn pause(&self) -> Result<()> {
        self.scheduler
            .pause()
            .await
            .map_err(|err| Error::Audio(err.to_string()))
    }

    /// Drop all buffered and scheduled audio without touching play intent.
    pub fn clear(&self) {
        self.scheduler.clear();
    }

    /// Seconds of audio buffered ahead of the playhead.
    pub fn buffered_secs(&self) -> f64 {
        self.scheduler.buffered_secs()
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub fn state(&self) -> PlaybackState {
        self.scheduler.state()
    }

    /// Tear the session down: stop all tasks and discard buffered audio.
    pub fn shutdown(&self) {
        self.scheduler.dispose();
        self.client.shutdown();
        self.chunk_router.abort();
        self.worker.abort();
        tracing::info!(session_id = %self.id, "speech session stopped");
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        self.chunk_router.abort();
        self.worker.abort();
    }
}
