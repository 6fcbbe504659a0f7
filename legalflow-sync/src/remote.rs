//! Remote store contract and an in-process implementation.
//!
//! The transport is up to the implementor; the engine only relies on the
//! two calls below and never retries them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use legalflow_core::{AppState, TeamCode};

use crate::error::RemoteError;

#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Replace the state stored under `code`.
    async fn push(&self, code: &TeamCode, state: &AppState) -> Result<(), RemoteError>;

    /// Fetch the state stored under `code`; `None` if nothing was pushed yet.
    async fn pull(&self, code: &TeamCode) -> Result<Option<AppState>, RemoteError>;
}

#[derive(Debug, Default)]
struct MemoryRemoteInner {
    states: Mutex<HashMap<TeamCode, AppState>>,
    latency: Mutex<Duration>,
    failing: AtomicBool,
    pushes: AtomicUsize,
    pulls: AtomicUsize,
}

/// Shared in-memory remote. Clones talk to the same storage, so several
/// engines can sync through one instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<MemoryRemoteInner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before completing.
    pub fn set_latency(&self, latency: Duration) {
        *self
            .inner
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// While set, every call fails with [`RemoteError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    pub fn push_count(&self) -> usize {
        self.inner.pushes.load(Ordering::SeqCst)
    }

    pub fn pull_count(&self) -> usize {
        self.inner.pulls.load(Ordering::SeqCst)
    }

    pub fn stored(&self, code: &TeamCode) -> Option<AppState> {
        self.inner
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned()
    }

    /// Store a state directly, as if another client had pushed it.
    pub fn seed(&self, code: &TeamCode, state: AppState) {
        self.inner
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.clone(), state);
    }

    async fn delay(&self) -> Result<(), RemoteError> {
        let latency = *self
            .inner
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("memory remote set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn push(&self, code: &TeamCode, state: &AppState) -> Result<(), RemoteError> {
        self.inner.pushes.fetch_add(1, Ordering::SeqCst);
        self.delay().await?;
        self.seed(code, state.clone());
        Ok(())
    }

    async fn pull(&self, code: &TeamCode) -> Result<Option<AppState>, RemoteError> {
        self.inner.pulls.fetch_add(1, Ordering::SeqCst);
        self.delay().await?;
        Ok(self.stored(code))
    }
}
