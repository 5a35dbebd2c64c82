//! Worker protocol, client, and streaming speech session
//!
//! The synthesis worker runs the generation pipeline behind a
//! request/response channel pair; the client correlates responses to
//! requests by id and routes streamed chunks out of band. The session ties
//! the worker to a playback scheduler and owns the speak/cancel lifecycle.

pub mod client;
pub mod protocol;
pub mod session;
pub mod worker;

pub use client::WorkerClient;
pub use protocol::{ChunkMessage, RequestId, WorkerRequest, WorkerResponse};
pub use session::SpeechSession;
pub use worker::SynthesisWorker;

/// Transport-layer failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The worker reported an error for this request.
    #[error("request failed: {0}")]
    Request(String),
    /// The worker channel is closed; no further requests can be served.
    #[error("worker channel closed")]
    ChannelClosed,
    /// The response waiter for this request was dropped before resolving.
    #[error("response for request {0} was dropped")]
    PendingDropped(RequestId),
}

impl From<TransportError> for speech_stream_core::Error {
    fn from(err: TransportError) -> Self {
        speech_stream_core::Error::Transport(err.to_string())
    }
}
