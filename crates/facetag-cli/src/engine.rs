use facetag_core::{Embedder, EmbedderError, Embedding, FaceTensor};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("embedder error: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Message sent from tagging tasks to the engine thread.
struct EmbedRequest {
    tensor: FaceTensor,
    reply: oneshot::Sender<Result<Embedding, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EmbedRequest>,
}

impl EngineHandle {
    /// Request an embedding for one normalized face.
    pub async fn embed(&self, tensor: FaceTensor) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EmbedRequest {
                tensor,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The embedder needs exclusive access for inference, so it lives on one
/// thread and serves requests in arrival order. The thread exits once every
/// handle has been dropped.
pub fn spawn_engine<E>(mut embedder: E, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    E: Embedder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EmbedRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("facetag-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut served = 0usize;
            while let Some(EmbedRequest { tensor, reply }) = rx.blocking_recv() {
                let result = embedder.embed(&tensor).map_err(EngineError::from);
                if let Err(err) = &result {
                    tracing::warn!(error = %err, "embedding failed");
                }
                served += 1;
                let _ = reply.send(result);
            }
            tracing::info!(served, "engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
