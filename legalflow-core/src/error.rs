//! Error types for legalflow-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SheetId;

/// Validation rejections raised by [`crate::store::SheetStore`].
///
/// Lookup misses are not errors: updates and deletes that reference an
/// unknown id are silent no-ops.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A sheet or team member name was empty after trimming.
    #[error("name must not be empty")]
    EmptyName,

    /// Deleting the only remaining sheet is refused.
    #[error("cannot delete '{name}': it is the last remaining sheet")]
    LastSheet { name: String },

    /// The sheet to copy does not exist.
    #[error("sheet not found: {id}")]
    SheetNotFound { id: SheetId },
}

/// Failures of the key-value persistence adapter.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored blob could not be encoded or decoded.
    #[error("JSON error for key '{key}': {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The blob under `key` could not be read at startup and was not backed
    /// up, so writes to it are refused.
    #[error("refusing to overwrite unreadable blob '{key}'")]
    Locked { key: String },

    /// `dirs::home_dir()` returned `None` and `$LEGALFLOW_HOME` is unset.
    #[error("cannot determine home directory; set $LEGALFLOW_HOME or $HOME")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.into(),
        source,
    }
}
