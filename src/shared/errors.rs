use crate::delivery::DeliveryError;
use crate::queue::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to create runtime path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve home directory for runtime state root")]
    HomeDirectoryUnavailable,
    #[error("failed to write stop signal {path}: {source}")]
    WriteStopSignal {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker thread `{0}` panicked")]
    WorkerPanicked(String),
    #[error("failed to spawn worker thread `{worker_id}`: {source}")]
    SpawnWorker {
        worker_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
