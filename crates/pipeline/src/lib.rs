//! Sequential chunk synthesis pipeline
//!
//! This crate provides the generation half of the engine:
//! - Start-time prediction from per-unit generation costs and audio yields
//! - Collaborator traits for the synthesis engine and text preparation
//! - The sequential per-unit generation loop with cooperative cancellation

pub mod engine;
pub mod generation;
pub mod predictor;

pub use engine::{SentenceSplitter, StubEngine, SynthesisEngine, Synthesized, TextPreparer};
pub use generation::{CancelSignal, GenerationEvent, GenerationPipeline};
pub use predictor::{compute_start_time, CostModel};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Native engine failure; fatal to the current request.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Text preparation failure; fatal to the current request.
    #[error("text preparation error: {0}")]
    Preparation(String),

    /// Model not loaded yet.
    #[error("model is not loaded")]
    ModelNotLoaded,

    #[error("channel closed")]
    ChannelClosed,
}

impl From<PipelineError> for speech_stream_core::Error {
    fn from(err: PipelineError) -> Self {
        speech_stream_core::Error::Pipeline(err.to_string())
    }
}
