use std::io;

use thiserror::Error;

use crate::context::OpKind;

/// Errors returned by the ringserve driver and event loop.
#[derive(Debug, Error)]
pub enum Error {
    /// io_uring setup or operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Ring setup failed (e.g., unsupported kernel or bad config).
    #[error("ring setup: {0}")]
    RingSetup(String),
    /// An intent could not be enqueued, even after flushing the
    /// submission queue once to make room.
    #[error("{op} submission failed: {source}")]
    Submission { op: OpKind, source: io::Error },
    /// A completion arrived with a negative result. Connection-scoped:
    /// only the offending descriptor is closed.
    #[error("{op} failed: errno {errno}")]
    Operation { op: OpKind, errno: i32 },
    /// No free request-context slots. Total in-flight intents are bounded
    /// by the configured queue depth.
    #[error("context table full")]
    ContextTableFull,
}
