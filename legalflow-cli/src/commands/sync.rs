//! `legalflow sync`: team code management and one-shot or foreground sync.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;

use legalflow_core::{
    paths,
    persistence::{KeyValueStore, TEAM_CODE_KEY},
    FileStore, SheetStore,
};
use legalflow_sync::{
    lock_store, shared, team_code, Enabled, RemoteStore, RequestOutcome, SharedStore,
    SyncConfig, SyncEngine, SyncHandle, SyncStatus,
};

use super::format_timestamp;
use crate::remote::{self, REMOTE_URL_ENV};

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: SyncCommand,

    /// Base URL of the remote store.
    #[arg(long, env = REMOTE_URL_ENV, global = true)]
    pub remote_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum SyncCommand {
    /// Turn on cloud sync, generating a team code if none is set.
    Enable,

    /// Turn on cloud sync with a code shared by a colleague.
    Join {
        /// Team code, e.g. TEAM-K3X9Q2M.
        code: String,
    },

    /// Turn off cloud sync and forget the team code.
    Disable,

    /// Show the team code and local state version.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Push the local state now.
    Push,

    /// Pull the remote state now; it replaces local state only if newer.
    Pull,

    /// Keep syncing in the foreground until Ctrl-C.
    Run,
}

#[derive(Serialize)]
struct StatusJson {
    enabled: bool,
    team_code: Option<String>,
    remote_url: Option<String>,
    version: i64,
    sheets: usize,
    team: usize,
}

struct Session {
    store: SharedStore<FileStore>,
    handle: SyncHandle,
}

impl SyncArgs {
    /// `sync run` logs at info by default; everything else stays quiet.
    pub fn is_long_running(&self) -> bool {
        matches!(self.command, SyncCommand::Run)
    }

    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        runtime.block_on(self.execute())
    }

    async fn execute(self) -> Result<()> {
        let home = paths::home().context("could not determine home directory")?;
        let persistence = FileStore::new(paths::data_dir(&home));
        let remote_url = self
            .remote_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        if let SyncCommand::Status { json } = self.command {
            return status(&persistence, remote_url, json);
        }

        let remote = remote::from_url(remote_url.as_deref());
        let session = Session::start(persistence, remote);
        let result = match self.command {
            SyncCommand::Enable => enable(&session, remote_url.is_some()).await,
            SyncCommand::Join { code } => join(&session, &code).await,
            SyncCommand::Disable => disable(&session).await,
            SyncCommand::Push => push(&session).await,
            SyncCommand::Pull => pull(&session).await,
            SyncCommand::Run => run_foreground(&session, remote_url.is_some()).await,
            SyncCommand::Status { .. } => Ok(()),
        };
        session.handle.shutdown().await.context("sync engine did not stop cleanly")?;
        result
    }
}

impl Session {
    fn start(persistence: FileStore, remote: Arc<dyn RemoteStore>) -> Self {
        let store = shared(SheetStore::open(persistence.clone()));
        let handle = SyncEngine::spawn(store.clone(), persistence, remote, SyncConfig::default());
        Self { store, handle }
    }
}

fn status(persistence: &FileStore, remote_url: Option<String>, json: bool) -> Result<()> {
    let code = persistence
        .get(TEAM_CODE_KEY)
        .context("failed to read team code")?
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let store = SheetStore::open(persistence.clone());

    if json {
        let payload = StatusJson {
            enabled: code.is_some(),
            team_code: code,
            remote_url,
            version: store.version(),
            sheets: store.sheets().len(),
            team: store.team().len(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
        );
        return Ok(());
    }

    match &code {
        Some(code) => println!("Cloud: {}", code.green().bold()),
        None => println!("Cloud: {}", "local only".dimmed()),
    }
    match &remote_url {
        Some(url) => println!("Remote: {url}"),
        None => println!("Remote: not configured (--remote-url or ${REMOTE_URL_ENV})"),
    }
    println!(
        "Local state: {} sheet(s), {} member(s), last change {}",
        store.sheets().len(),
        store.team().len(),
        format_timestamp(store.version())
    );
    Ok(())
}

async fn enable(session: &Session, remote_configured: bool) -> Result<()> {
    match session.handle.enable().await? {
        Enabled::Created(code) => {
            println!("{} Cloud sync enabled.", "✓".green());
            println!("Team code: {}", code.0.bold());
            println!("Share it with colleagues: legalflow sync join {code}");
        }
        Enabled::Existing(code) | Enabled::Joined(code) => {
            println!("Cloud sync is already enabled.");
            println!("Team code: {}", code.0.bold());
            return Ok(());
        }
    }

    if remote_configured {
        push(session).await?;
    } else {
        println!("No remote configured yet; run `legalflow sync run --remote-url <url>` to start syncing.");
    }
    Ok(())
}

async fn join(session: &Session, input: &str) -> Result<()> {
    let code = team_code::parse(input)
        .ok_or_else(|| anyhow!("'{input}' is not a team code (expected TEAM-XXXXXXX)"))?;

    match session.handle.join(code.clone()).await? {
        Enabled::Joined(joined) => {
            let status = session.handle.settled().await;
            println!("{} Joined team {}", "✓".green(), joined.0.bold());
            if status == SyncStatus::Error {
                eprintln!("warning: initial pull failed; local state was kept");
            }
            Ok(())
        }
        Enabled::Existing(current) | Enabled::Created(current) => bail!(
            "sync is already enabled with {current}; run `legalflow sync disable` first"
        ),
    }
}

async fn disable(session: &Session) -> Result<()> {
    match session.handle.disable().await? {
        Some(code) => println!("{} Cloud sync disabled (was {}).", "✓".green(), code),
        None => println!("Cloud sync was not enabled."),
    }
    Ok(())
}

async fn push(session: &Session) -> Result<()> {
    let outcome = session.handle.push_now().await?;
    check_started(outcome)?;
    match session.handle.settled().await {
        SyncStatus::Error => bail!("push failed; see log output (RUST_LOG=warn)"),
        _ => {
            println!("{} Pushed local state.", "✓".green());
            Ok(())
        }
    }
}

async fn pull(session: &Session) -> Result<()> {
    let before = lock_store(&session.store).version();
    let outcome = session.handle.pull_now().await?;
    check_started(outcome)?;
    if session.handle.settled().await == SyncStatus::Error {
        bail!("pull failed; see log output (RUST_LOG=warn)");
    }

    let after = lock_store(&session.store).version();
    if after != before {
        println!(
            "{} Adopted remote state from {}.",
            "✓".green(),
            format_timestamp(after)
        );
    } else {
        println!("Local state is up to date.");
    }
    Ok(())
}

async fn run_foreground(session: &Session, remote_configured: bool) -> Result<()> {
    let Some(code) = session.handle.team_code() else {
        bail!("sync is not enabled; run `legalflow sync enable` first");
    };
    if !remote_configured {
        bail!("no remote configured; pass --remote-url or set ${REMOTE_URL_ENV}");
    }

    println!("Syncing team {} (Ctrl-C to stop)", code.0.bold());
    let mut status = session.handle.subscribe_status();
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("{}", paint(current));
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                println!("Stopping.");
                break;
            }
        }
    }
    Ok(())
}

fn check_started(outcome: RequestOutcome) -> Result<()> {
    match outcome {
        RequestOutcome::Started => Ok(()),
        RequestOutcome::Disabled => {
            bail!("sync is not enabled; run `legalflow sync enable` first")
        }
        RequestOutcome::Dropped => bail!("another sync is already in progress"),
        RequestOutcome::Refused => {
            bail!("local changes could not be saved; fix storage before syncing")
        }
    }
}

fn paint(status: SyncStatus) -> String {
    let label = status.to_string();
    match status {
        SyncStatus::Idle => label.dimmed().to_string(),
        SyncStatus::Syncing => label.yellow().to_string(),
        SyncStatus::Success => label.green().to_string(),
        SyncStatus::Error => label.red().to_string(),
    }
}
