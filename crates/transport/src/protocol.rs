//! Worker request/response message types
//!
//! Every request carries a caller-assigned id; the worker echoes it in the
//! response so the client can resolve the matching waiter. Streamed chunks
//! carry the id of the generation they belong to and are routed separately
//! from request completion.

use std::sync::Arc;

use speech_stream_core::GenerateOptions;

/// Correlation id assigned by the client, unique per request.
pub type RequestId = u64;

/// Requests accepted by the synthesis worker.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Load the synthesis model; answered with [`WorkerResponse::LoadModelDone`].
    LoadModel { id: RequestId, model_id: String },
    /// Synthesize `options`; streams chunks, then [`WorkerResponse::GenerateDone`].
    Generate {
        id: RequestId,
        options: GenerateOptions,
    },
    /// Cancel the in-flight generation, if any; answered with
    /// [`WorkerResponse::TerminateEarlyDone`] once honored.
    TerminateEarly { id: RequestId },
}

impl WorkerRequest {
    pub fn id(&self) -> RequestId {
        match self {
            Self::LoadModel { id, .. } | Self::Generate { id, .. } | Self::TerminateEarly { id } => {
                *id
            }
        }
    }
}

/// Responses emitted by the synthesis worker.
#[derive(Debug, Clone)]
pub enum WorkerResponse {
    LoadModelDone { id: RequestId, sample_rate: u32 },
    /// One synthesized chunk of the generation `id`.
    GenerateChunk { id: RequestId, chunk: ChunkMessage },
    /// The generation `id` ended, normally or by cancellation.
    GenerateDone { id: RequestId },
    /// The cancellation request `id` was honored.
    TerminateEarlyDone { id: RequestId },
    /// The request `id` failed; no further responses follow for it.
    RequestError { id: RequestId, error: String },
}

impl WorkerResponse {
    pub fn id(&self) -> RequestId {
        match self {
            Self::LoadModelDone { id, .. }
            | Self::GenerateChunk { id, .. }
            | Self::GenerateDone { id }
            | Self::TerminateEarlyDone { id }
            | Self::RequestError { id, .. } => *id,
        }
    }
}

/// One streamed chunk of synthesized audio with its timing annotations.
#[derive(Debug, Clone)]
pub struct ChunkMessage {
    /// Unit index within the generation.
    pub index: usize,
    /// Completion fraction of the generation after this chunk.
    pub progress: f32,
    /// Mono PCM at `sample_rate`.
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// Cumulative generation wall-clock time so far (seconds).
    pub t_runtime: f64,
    /// Predicted safe playback-start offset for the generation (seconds).
    pub t_play_audio: f64,
}
