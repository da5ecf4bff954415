//! Engine error types.

/// Errors that prevent a sync run from making forward progress.
///
/// Per-file failures are not errors at this level; they are recorded in
/// the run report and the batch continues.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] mpsync_transport::TransportError),

    #[error("local path not found: {0}")]
    RootNotFound(String),

    #[error("connection lost after {attempted} of {total} files")]
    ConnectionLost {
        attempted: usize,
        total: usize,
        /// Relative paths that were never attempted.
        not_attempted: Vec<String>,
    },
}
