//! # legalflow-sync
//!
//! Best-effort mirroring of the local [`legalflow_core::AppState`] to a
//! remote store keyed by a shared team code.
//!
//! Call [`SyncEngine::spawn`] with the shared store, the persistence adapter
//! and a [`RemoteStore`]; drive it through the returned [`SyncHandle`].

pub mod engine;
pub mod error;
pub mod merge;
pub mod remote;
pub mod team_code;

pub use engine::{
    lock_store, shared, Enabled, RequestOutcome, SharedStore, SyncConfig, SyncEngine,
    SyncHandle, SyncStatus,
};
pub use error::{RemoteError, SyncError};
pub use merge::MergeDecision;
pub use remote::{MemoryRemote, RemoteStore};
