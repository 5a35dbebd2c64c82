//! Worker client with correlation-id request tracking
//!
//! Each request registers a oneshot waiter under its id before it is sent;
//! a router task resolves waiters as responses arrive. Streamed chunks
//! never touch the pending map, they are pushed to a dedicated channel so
//! a slow request waiter cannot stall audio delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::{ChunkMessage, RequestId, WorkerRequest, WorkerResponse};
use crate::TransportError;

/// Resolves with the worker's terminal response for one request.
pub type ResponseWaiter = oneshot::Receiver<Result<WorkerResponse, TransportError>>;

type PendingMap = HashMap<RequestId, oneshot::Sender<Result<WorkerResponse, TransportError>>>;

/// Request/response client over the worker channel pair.
pub struct WorkerClient {
    tx: mpsc::Sender<WorkerRequest>,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
    router: JoinHandle<()>,
}

impl WorkerClient {
    /// Wrap a worker channel pair. Returns the client and the receiver for
    /// streamed chunks, tagged with the id of the generation they belong to.
    pub fn new(
        tx: mpsc::Sender<WorkerRequest>,
        mut responses: mpsc::Receiver<WorkerResponse>,
    ) -> (Self, mpsc::Receiver<(RequestId, ChunkMessage)>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));

        let router = tokio::spawn({
            let pending = pending.clone();
            async move {
                while let Some(response) = responses.recv().await {
                    match response {
                        WorkerResponse::GenerateChunk { id, chunk } => {
                            if chunk_tx.send((id, chunk)).await.is_err() {
                                break;
                            }
                        }
                        WorkerResponse::RequestError { id, error } => {
                            match pending.lock().remove(&id) {
                                Some(waiter) => {
                                    let _ = waiter.send(Err(TransportError::Request(error)));
                                }
                                None => tracing::warn!(id, %error, "error for unknown request"),
                            }
                        }
                        other => {
                            let id = other.id();
                            match pending.lock().remove(&id) {
                                Some(waiter) => {
                                    let _ = waiter.send(Ok(other));
                                }
                                None => tracing::warn!(id, "response for unknown request"),
                            }
                        }
                    }
                }

                // Worker is gone; fail everything still waiting.
                for (_, waiter) in pending.lock().drain() {
                    let _ = waiter.send(Err(TransportError::ChannelClosed));
                }
            }
        });

        let client = Self {
            tx,
            next_id: AtomicU64::new(1),
            pending,
            router,
        };
        (client, chunk_rx)
    }

    /// Allocate the id for a request before dispatching it, so the caller
    /// can record it ahead of any streamed chunk arriving.
    pub fn allocate_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and return the waiter for its terminal response.
    pub async fn dispatch(&self, request: WorkerRequest) -> Result<ResponseWaiter, TransportError> {
        let id = request.id();
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.pending.lock().insert(id, waiter_tx);

        if self.tx.send(request).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(TransportError::ChannelClosed);
        }
        Ok(waiter_rx)
    }

    /// Await a waiter's terminal response.
    pub async fn resolve(
        id: RequestId,
        waiter: ResponseWaiter,
    ) -> Result<WorkerResponse, TransportError> {
        waiter
            .await
            .map_err(|_| TransportError::PendingDropped(id))?
    }

    /// Load the synthesis model; resolves with its output sample rate.
    pub async fn load_model(&self, model_id: &str) -> Result<u32, TransportError> {
        let id = self.allocate_id();
        let waiter = self
            .dispatch(WorkerRequest::LoadModel {
                id,
                model_id: model_id.to_string(),
            })
            .await?;
        match Self::resolve(id, waiter).await? {
            WorkerResponse::LoadModelDone { sample_rate, .. } => Ok(sample_rate),
            other => Err(TransportError::Request(format!(
                "unexpected response {other:?}"
            ))),
        }
    }

    /// Cancel the in-flight generation, if any, and wait for the
    /// acknowledgment.
    pub async fn terminate_early(&self) -> Result<(), TransportError> {
        let id = self.allocate_id();
        let waiter = self.dispatch(WorkerRequest::TerminateEarly { id }).await?;
        match Self::resolve(id, waiter).await? {
            WorkerResponse::TerminateEarlyDone { .. } => Ok(()),
            other => Err(TransportError::Request(format!(
                "unexpected response {other:?}"
            ))),
        }
    }

    /// Stop routing responses. Outstanding waiters resolve with an error.
    pub fn shutdown(&self) {
        self.router.abort();
        for (_, waiter) in self.pending.lock().drain() {
            let _ = waiter.send(Err(TransportError::ChannelClosed));
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.router.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use speech_stream_config::PredictorConfig;
    use speech_stream_core::GenerateOptions;
    use speech_stream_pipeline::{SentenceSplitter, StubEngine};

    use crate::worker::SynthesisWorker;

    fn connect() -> (WorkerClient, mpsc::Receiver<(RequestId, ChunkMessage)>) {
        let (req_tx, resp_rx, _handle) = SynthesisWorker::spawn(
            Arc::new(StubEngine::new(22050)),
            Arc::new(SentenceSplitter),
            PredictorConfig::default(),
            None,
        );
        WorkerClient::new(req_tx, resp_rx)
    }

    #[tokio::test]
    async fn test_load_model_resolves_sample_rate() {
        let (client, _chunks) = connect();
        assert_eq!(client.load_model("stub").await.unwrap(), 22050);
    }

    #[tokio::test]
    async fn test_chunks_routed_separately_from_completion() {
        let (client, mut chunks) = connect();
        client.load_model("stub").await.unwrap();

        let id = client.allocate_id();
        let waiter = client
            .dispatch(WorkerRequest::Generate {
                id,
                options: GenerateOptions {
                    text: "One. Two.".to_string(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let response = WorkerClient::resolve(id, waiter).await.unwrap();
        assert!(matches!(response, WorkerResponse::GenerateDone { .. }));

        // Both chunks are waiting on the chunk channel, tagged with the id.
        for expected in 0..2 {
            let (chunk_id, chunk) = chunks.recv().await.unwrap();
            assert_eq!(chunk_id, id);
            assert_eq!(chunk.index, expected);
        }
    }

    #[tokio::test]
    async fn test_request_error_resolves_waiter() {
        let (client, _chunks) = connect();
        client.load_model("stub").await.unwrap();

        let id = client.allocate_id();
        let waiter = client
            .dispatch(WorkerRequest::Generate {
                id,
                options: GenerateOptions {
                    text: "  ".to_string(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        assert!(matches!(
            WorkerClient::resolve(id, waiter).await,
            Err(TransportError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_worker_shutdown_fails_pending() {
        let (req_tx, resp_rx) = {
            let (req_tx, resp_rx, handle) = SynthesisWorker::spawn(
                Arc::new(StubEngine::new(22050)),
                Arc::new(SentenceSplitter),
                PredictorConfig::default(),
                None,
            );
            handle.abort();
            (req_tx, resp_rx)
        };
        let (client, _chunks) = WorkerClient::new(req_tx, resp_rx);

        let id = client.allocate_id();
        let result = match client.dispatch(WorkerRequest::TerminateEarly { id }).await {
            Ok(waiter) => WorkerClient::resolve(id, waiter).await.map(|_| ()),
            Err(err) => Err(err),
        };
        assert!(matches!(
            result,
            Err(TransportError::ChannelClosed) | Err(TransportError::PendingDropped(_))
        ));
    }
}
