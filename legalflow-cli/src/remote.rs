//! HTTP remote store: one JSON document per team code.
//!
//! `PUT <base>/<code>` stores the AppState, `GET <base>/<code>` returns it
//! (404 means nothing was pushed yet). Any key-value HTTP service with
//! those semantics works, e.g. a small JSON bucket server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use legalflow_core::{AppState, TeamCode};
use legalflow_sync::{RemoteError, RemoteStore};

/// Environment fallback for `--remote-url`.
pub const REMOTE_URL_ENV: &str = "LEGALFLOW_REMOTE_URL";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct HttpRemote {
    base: String,
    agent: ureq::Agent,
}

impl HttpRemote {
    pub fn new(base: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn url_for(&self, code: &TeamCode) -> String {
        format!("{}/{}", self.base, code)
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn push(&self, code: &TeamCode, state: &AppState) -> Result<(), RemoteError> {
        let url = self.url_for(code);
        let body = serde_json::to_value(state)?;
        let agent = self.agent.clone();
        tracing::debug!(%url, version = state.version, "PUT team state");

        run_blocking(move || {
            agent
                .put(&url)
                .send_json(body)
                .map(|_| ())
                .map_err(|err| RemoteError::Unavailable(err.to_string()))
        })
        .await
    }

    async fn pull(&self, code: &TeamCode) -> Result<Option<AppState>, RemoteError> {
        let url = self.url_for(code);
        let agent = self.agent.clone();
        tracing::debug!(%url, "GET team state");

        run_blocking(move || match agent.get(&url).call() {
            Ok(response) => {
                let body = response
                    .into_string()
                    .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(err) => Err(RemoteError::Unavailable(err.to_string())),
        })
        .await
    }
}

/// Stand-in used when no URL is configured: every call fails, so the engine
/// reports `error` instead of pretending to sync.
pub struct UnconfiguredRemote;

#[async_trait]
impl RemoteStore for UnconfiguredRemote {
    async fn push(&self, _code: &TeamCode, _state: &AppState) -> Result<(), RemoteError> {
        Err(not_configured())
    }

    async fn pull(&self, _code: &TeamCode) -> Result<Option<AppState>, RemoteError> {
        Err(not_configured())
    }
}

pub fn from_url(url: Option<&str>) -> Arc<dyn RemoteStore> {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Arc::new(HttpRemote::new(url)),
        None => Arc::new(UnconfiguredRemote),
    }
}

fn not_configured() -> RemoteError {
    RemoteError::Unavailable(format!(
        "no remote configured; pass --remote-url or set ${REMOTE_URL_ENV}"
    ))
}

async fn run_blocking<T, F>(call: F) -> Result<T, RemoteError>
where
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| RemoteError::Unavailable(format!("remote call panicked: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_code() {
        let remote = HttpRemote::new("https://sync.example.org/teams/");
        assert_eq!(
            remote.url_for(&TeamCode::from("TEAM-AB12CD3")),
            "https://sync.example.org/teams/TEAM-AB12CD3"
        );
    }

    #[tokio::test]
    async fn unconfigured_remote_always_fails() {
        let remote = from_url(Some("   "));
        let err = remote.pull(&TeamCode::from("TEAM-X")).await.unwrap_err();
        assert!(err.to_string().contains("--remote-url"));
    }
}
