//! Error types for legalflow-sync.

use thiserror::Error;

/// Failure reported by a [`crate::RemoteStore`] implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote could not be reached or answered with a failure.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The remote answered with a payload that is not an AppState.
    #[error("remote payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Errors surfaced by the sync engine handle.
///
/// Remote and persistence failures are not returned here: the engine
/// reports them through [`crate::SyncStatus::Error`] and the log.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The engine task has stopped.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}
