//! Synthesis worker loop
//!
//! Serves worker requests one generation at a time. While a generation is
//! running the loop keeps listening: a `TerminateEarly` raises the
//! cooperative cancel signal, any other request is deferred until the
//! current generation ends. Cancellation is always acknowledged twice, a
//! `GenerateDone` for the superseded generation followed by a
//! `TerminateEarlyDone` for the cancelling request.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use speech_stream_config::PredictorConfig;
use speech_stream_core::GenerateOptions;
use speech_stream_pipeline::{
    CancelSignal, GenerationEvent, GenerationPipeline, PipelineError, SynthesisEngine, TextPreparer,
};

use crate::protocol::{ChunkMessage, RequestId, WorkerRequest, WorkerResponse};

/// Captured PCM pending a WAV dump, with its sample rate.
struct Capture {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Runs the generation pipeline behind a request/response channel pair.
pub struct SynthesisWorker {
    engine: Arc<dyn SynthesisEngine>,
    preparer: Arc<dyn TextPreparer>,
    config: PredictorConfig,
    capture_wav: Option<PathBuf>,
}

impl SynthesisWorker {
    /// Spawn the worker on the current runtime.
    ///
    /// Returns the request sender, the response receiver, and the task
    /// handle. Dropping the sender shuts the worker down after the current
    /// generation finishes.
    pub fn spawn(
        engine: Arc<dyn SynthesisEngine>,
        preparer: Arc<dyn TextPreparer>,
        config: PredictorConfig,
        capture_wav: Option<PathBuf>,
    ) -> (
        mpsc::Sender<WorkerRequest>,
        mpsc::Receiver<WorkerResponse>,
        JoinHandle<()>,
    ) {
        let (req_tx, req_rx) = mpsc::channel(32);
        let (resp_tx, resp_rx) = mpsc::channel(32);

        let worker = Self {
            engine,
            preparer,
            config,
            capture_wav,
        };
        let handle = tokio::spawn(worker.run(req_rx, resp_tx));
        (req_tx, resp_rx, handle)
    }

    async fn run(
        self,
        mut rx: mpsc::Receiver<WorkerRequest>,
        tx: mpsc::Sender<WorkerResponse>,
    ) {
        let mut loaded_rate: Option<u32> = None;
        let mut pending: VecDeque<WorkerRequest> = VecDeque::new();

        loop {
            let request = match pending.pop_front() {
                Some(request) => request,
                None => match rx.recv().await {
                    Some(request) => request,
                    None => break,
                },
            };

            let delivered = match request {
                WorkerRequest::LoadModel { id, model_id } => {
                    match self.engine.load_model(&model_id).await {
                        Ok(sample_rate) => {
                            loaded_rate = Some(sample_rate);
                            tx.send(WorkerResponse::LoadModelDone { id, sample_rate })
                                .await
                                .is_ok()
                        }
                        Err(err) => {
                            tx.send(WorkerResponse::RequestError {
                                id,
                                error: err.to_string(),
                            })
                            .await
                            .is_ok()
                        }
                    }
                }
                WorkerRequest::Generate { id, options } => {
                    self.handle_generate(id, options, loaded_rate, &mut rx, &tx, &mut pending)
                        .await
                }
                // Nothing is generating, acknowledge immediately.
                WorkerRequest::TerminateEarly { id } => tx
                    .send(WorkerResponse::TerminateEarlyDone { id })
                    .await
                    .is_ok(),
            };

            if !delivered {
                break;
            }
        }

        tracing::debug!("synthesis worker stopped");
    }

    /// Run one generation, listening for control requests concurrently.
    /// Returns false once the response channel is closed.
    async fn handle_generate(
        &self,
        id: RequestId,
        options: GenerateOptions,
        loaded_rate: Option<u32>,
        rx: &mut mpsc::Receiver<WorkerRequest>,
        tx: &mpsc::Sender<WorkerResponse>,
        pending: &mut VecDeque<WorkerRequest>,
    ) -> bool {
        if loaded_rate.is_none() {
            return tx
                .send(WorkerResponse::RequestError {
                    id,
                    error: PipelineError::ModelNotLoaded.to_string(),
                })
                .await
                .is_ok();
        }

        let request = match options.validate() {
            Ok(request) => request,
            Err(err) => {
                return tx
                    .send(WorkerResponse::RequestError {
                        id,
                        error: err.to_string(),
                    })
                    .await
                    .is_ok();
            }
        };

        let cancel = CancelSignal::new();
        let (ev_tx, mut ev_rx) = mpsc::channel(16);
        let pipeline = GenerationPipeline::new(
            self.engine.clone(),
            self.preparer.clone(),
            self.config.clone(),
        );

        let mut capture: Option<Capture> = None;
        let mut cancelled = false;
        let mut rx_open = true;

        let result = {
            let mut generation = pin!(pipeline.run(&request, &cancel, &ev_tx));
            loop {
                tokio::select! {
                    result = &mut generation => break result,
                    event = ev_rx.recv() => {
                        if let Some(event) = event {
                            if !self.forward_event(id, event, tx, &mut capture, &mut cancelled).await {
                                return false;
                            }
                        }
                    }
                    incoming = rx.recv(), if rx_open => {
                        match incoming {
                            Some(WorkerRequest::TerminateEarly { id: cancel_id }) => {
                                cancel.request(cancel_id);
                            }
                            Some(other) => pending.push_back(other),
                            None => {
                                // Caller is gone; stop at the next boundary.
                                // Reusing the generation's own id marks this
                                // as internal, no acknowledgment is owed.
                                rx_open = false;
                                cancel.request(id);
                            }
                        }
                    }
                }
            }
        };

        // Drain events emitted just before the loop finished.
        while let Ok(event) = ev_rx.try_recv() {
            if !self.forward_event(id, event, tx, &mut capture, &mut cancelled).await {
                return false;
            }
        }

        // A cancel that arrived while the final unit was synthesizing was
        // never seen at a unit boundary; honor it now so the cancelling
        // request still gets its acknowledgment.
        if let Some(cancel_id) = cancel.take() {
            cancelled = true;
            if cancel_id != id
                && tx
                    .send(WorkerResponse::TerminateEarlyDone { id: cancel_id })
                    .await
                    .is_err()
            {
                return false;
            }
        }

        match result {
            Ok(()) => {
                // A superseded utterance must not overwrite the capture.
                if !cancelled {
                    if let (Some(path), Some(capture)) = (&self.capture_wav, &capture) {
                        write_capture(path, capture);
                    }
                }
                true
            }
            Err(err) => {
                tracing::warn!(id, %err, "generation failed");
                tx.send(WorkerResponse::RequestError {
                    id,
                    error: err.to_string(),
                })
                .await
                .is_ok()
            }
        }
    }

    async fn forward_event(
        &self,
        id: RequestId,
        event: GenerationEvent,
        tx: &mpsc::Sender<WorkerResponse>,
        capture: &mut Option<Capture>,
        cancelled: &mut bool,
    ) -> bool {
        let response = match event {
            GenerationEvent::Chunk {
                index,
                progress,
                samples,
                sample_rate,
                t_runtime,
                t_play_audio,
            } => {
                if self.capture_wav.is_some() {
                    let capture = capture.get_or_insert_with(|| Capture {
                        samples: Vec::new(),
                        sample_rate,
                    });
                    capture.samples.extend_from_slice(&samples);
                }
                WorkerResponse::GenerateChunk {
                    id,
                    chunk: ChunkMessage {
                        index,
                        progress,
                        samples,
                        sample_rate,
                        t_runtime,
                        t_play_audio,
                    },
                }
            }
            GenerationEvent::Done => WorkerResponse::GenerateDone { id },
            GenerationEvent::Cancelled { cancel_id } => {
                *cancelled = true;
                // An internal cancel (request channel closed) reuses the
                // generation's own id and owes no acknowledgment.
                if cancel_id == id {
                    return true;
                }
                WorkerResponse::TerminateEarlyDone { id: cancel_id }
            }
        };
        tx.send(response).await.is_ok()
    }
}

/// Dump captured PCM as a 32-bit float WAV. Failures are logged, never fatal.
fn write_capture(path: &PathBuf, capture: &Capture) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: capture.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let result = hound::WavWriter::create(path, spec).and_then(|mut writer| {
        for &sample in &capture.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    });

    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "wrote capture WAV"),
        Err(err) => tracing::warn!(path = %path.display(), %err, "failed to write capture WAV"),
    }
}
