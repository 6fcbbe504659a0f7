//! The sync engine: debounced push, interval pull, status reporting.
//!
//! One tokio task owns every piece of sync state (team code, status, the
//! in-flight guard, both timers) and reacts to four event sources:
//!
//! 1. commands from [`SyncHandle`]
//! 2. change notifications from the [`SheetStore`]
//! 3. timer expiries (debounce deadline, pull interval, success linger)
//! 4. completions of remote calls, which run in their own tasks
//!
//! Because only this task touches the guard, a plain `Idle | InFlight`
//! value is enough to keep push and pull from overlapping. A request that
//! arrives while a call is in flight is dropped, not queued. In-flight calls
//! cannot be aborted; a completion for a team code that is no longer active
//! is ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use legalflow_core::persistence::{KeyValueStore, TEAM_CODE_KEY};
use legalflow_core::{AppState, Revision, SheetStore, TeamCode};

use crate::error::{RemoteError, SyncError};
use crate::merge::{self, MergeDecision};
use crate::remote::RemoteStore;
use crate::team_code;

/// The store shared between the presentation layer and the engine.
///
/// Locks are held only for synchronous reads and writes, never across an
/// `.await`.
pub type SharedStore<P> = Arc<Mutex<SheetStore<P>>>;

pub fn shared<P: KeyValueStore>(store: SheetStore<P>) -> SharedStore<P> {
    Arc::new(Mutex::new(store))
}

pub fn lock_store<P: KeyValueStore>(store: &SharedStore<P>) -> MutexGuard<'_, SheetStore<P>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error,
    Success,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
            SyncStatus::Success => "success",
        })
    }
}

/// Engine timing.
///
/// A debounce that expires while a call is in flight is dropped like any
/// other request and is not rescheduled. An edit made in this process then
/// waits for the next change or an explicit push; an edit saved by another
/// process is picked up again at the next pull tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last change before a push. Expiring during an
    /// in-flight call does not requeue it.
    pub debounce: Duration,
    /// Period between pulls while a team code is set.
    pub pull_interval: Duration,
    /// How long `Success` is shown before reverting to `Idle`.
    pub success_linger: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            pull_interval: Duration::from_secs(15),
            success_linger: Duration::from_secs(2),
        }
    }
}

/// Result of [`SyncHandle::enable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enabled {
    /// No code was set; this one was generated and activated.
    Created(TeamCode),
    /// A code was already active and is left unchanged.
    Existing(TeamCode),
    /// No code was set; the given one was activated and a pull started.
    Joined(TeamCode),
}

impl Enabled {
    pub fn code(&self) -> &TeamCode {
        match self {
            Enabled::Created(code) | Enabled::Existing(code) | Enabled::Joined(code) => code,
        }
    }
}

/// Result of an explicit push or pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The remote call was started.
    Started,
    /// Another call is in flight; the request was discarded.
    Dropped,
    /// No team code is set.
    Disabled,
    /// Local persistence is failing; nothing is pushed until it recovers.
    Refused,
}

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

enum Command {
    Enable {
        respond_to: oneshot::Sender<Enabled>,
    },
    Join {
        code: TeamCode,
        respond_to: oneshot::Sender<Enabled>,
    },
    Disable {
        respond_to: oneshot::Sender<Option<TeamCode>>,
    },
    Push {
        respond_to: oneshot::Sender<RequestOutcome>,
    },
    Pull {
        respond_to: oneshot::Sender<RequestOutcome>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Push,
    Pull,
    /// First pull after `join`; adopts the team state unconditionally.
    JoinPull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Idle,
    InFlight(Operation),
}

struct Completion {
    code: TeamCode,
    outcome: Outcome,
}

enum Outcome {
    Pushed(Result<(), RemoteError>),
    Pulled(Result<Option<AppState>, RemoteError>),
}

enum Event {
    Command(Command),
    StateChanged,
    Completed(Completion),
    DebounceElapsed,
    PullTick,
    LingerElapsed,
    Shutdown,
}

/// Timers that exist only while a team code is set. Dropping the value
/// releases both.
struct SyncTimers {
    debounce_at: Option<Instant>,
    pull: Interval,
}

impl SyncTimers {
    fn acquire(config: &SyncConfig) -> Self {
        let now = Instant::now();
        let mut pull = tokio::time::interval_at(now + config.pull_interval, config.pull_interval);
        pull.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            debounce_at: Some(now + config.debounce),
            pull,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Client side of a running engine. Dropping it stops the engine.
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SyncStatus>,
    team_code: watch::Receiver<Option<TeamCode>>,
    in_flight: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Activate sync. Generates a code only when none is set.
    pub async fn enable(&self) -> Result<Enabled, SyncError> {
        self.request(|respond_to| Command::Enable { respond_to })
            .await
    }

    /// Activate sync with a code shared by another client, then pull its
    /// state. An active code is never replaced; disable first.
    pub async fn join(&self, code: TeamCode) -> Result<Enabled, SyncError> {
        self.request(|respond_to| Command::Join { code, respond_to })
            .await
    }

    /// Deactivate sync and forget the code. Returns the code that was set.
    pub async fn disable(&self) -> Result<Option<TeamCode>, SyncError> {
        self.request(|respond_to| Command::Disable { respond_to })
            .await
    }

    pub async fn push_now(&self) -> Result<RequestOutcome, SyncError> {
        self.request(|respond_to| Command::Push { respond_to }).await
    }

    pub async fn pull_now(&self) -> Result<RequestOutcome, SyncError> {
        self.request(|respond_to| Command::Pull { respond_to }).await
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub fn team_code(&self) -> Option<TeamCode> {
        self.team_code.borrow().clone()
    }

    /// Wait until no remote call is in flight and return the status then.
    pub async fn settled(&self) -> SyncStatus {
        let mut in_flight = self.in_flight.clone();
        let _ = in_flight.wait_for(|busy| !*busy).await;
        self.status()
    }

    /// Stop the engine and release its timers.
    pub async fn shutdown(self) -> Result<(), SyncError> {
        let _ = self.commands.send(Command::Shutdown).await;
        self.task
            .await
            .map_err(|_| SyncError::ChannelClosed("sync engine task"))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SyncError::ChannelClosed("sync commands"))?;
        rx.await
            .map_err(|_| SyncError::ChannelClosed("sync response"))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SyncEngine<P: KeyValueStore> {
    store: SharedStore<P>,
    persistence: P,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    team_code: Option<TeamCode>,
    guard: Guard,
    timers: Option<SyncTimers>,
    linger_until: Option<Instant>,
    commands: mpsc::Receiver<Command>,
    changes: watch::Receiver<Revision>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    status_tx: watch::Sender<SyncStatus>,
    code_tx: watch::Sender<Option<TeamCode>>,
    in_flight_tx: watch::Sender<bool>,
}

impl<P: KeyValueStore> SyncEngine<P> {
    /// Start the engine on the current tokio runtime.
    ///
    /// `persistence` holds the team code; a code found there activates sync
    /// immediately.
    pub fn spawn(
        store: SharedStore<P>,
        persistence: P,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> SyncHandle {
        let changes = {
            let mut guard = lock_store(&store);
            let (tx, rx) = watch::channel(guard.revision());
            guard.subscribe(Box::new(move |revision| {
                tx.send_replace(revision);
            }));
            rx
        };

        let team_code = load_team_code(&persistence);
        let timers = team_code.as_ref().map(|_| SyncTimers::acquire(&config));

        let (command_tx, commands) = mpsc::channel(32);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SyncStatus::Idle);
        let (code_tx, code_rx) = watch::channel(team_code.clone());
        let (in_flight_tx, in_flight) = watch::channel(false);

        let engine = SyncEngine {
            store,
            persistence,
            remote,
            config,
            team_code,
            guard: Guard::Idle,
            timers,
            linger_until: None,
            commands,
            changes,
            completions_tx,
            completions,
            status_tx,
            code_tx,
            in_flight_tx,
        };
        let task = tokio::spawn(engine.run());

        SyncHandle {
            commands: command_tx,
            status,
            team_code: code_rx,
            in_flight,
            task,
        }
    }

    async fn run(mut self) {
        tracing::info!(
            team_code = ?self.team_code.as_ref().map(|c| c.0.as_str()),
            "sync engine started",
        );

        loop {
            let event = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => Event::Shutdown,
                    Some(cmd) => Event::Command(cmd),
                },
                changed = self.changes.changed() => match changed {
                    Ok(()) => Event::StateChanged,
                    Err(_) => Event::Shutdown,
                },
                Some(done) = self.completions.recv() => Event::Completed(done),
                event = next_timer(&mut self.timers) => event,
                _ = sleep_until(self.linger_until) => Event::LingerElapsed,
            };

            match event {
                Event::Command(cmd) => self.handle_command(cmd),
                Event::StateChanged => self.handle_state_changed(),
                Event::Completed(done) => self.handle_completion(done),
                Event::DebounceElapsed => {
                    if let Some(timers) = self.timers.as_mut() {
                        timers.debounce_at = None;
                    }
                    let outcome = self.request_push();
                    tracing::debug!(?outcome, "debounced push");
                }
                Event::PullTick => {
                    let outcome = self.request_pull();
                    tracing::debug!(?outcome, "interval pull");
                }
                Event::LingerElapsed => {
                    self.linger_until = None;
                    if *self.status_tx.borrow() == SyncStatus::Success {
                        self.set_status(SyncStatus::Idle);
                    }
                }
                Event::Shutdown => break,
            }
        }

        self.timers = None;
        tracing::info!("sync engine stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Enable { respond_to } => {
                let _ = respond_to.send(self.enable());
            }
            Command::Join { code, respond_to } => {
                let _ = respond_to.send(self.join(code));
            }
            Command::Disable { respond_to } => {
                let _ = respond_to.send(self.disable());
            }
            Command::Push { respond_to } => {
                let _ = respond_to.send(self.request_push());
            }
            Command::Pull { respond_to } => {
                let _ = respond_to.send(self.request_pull());
            }
            Command::Shutdown => {}
        }
    }

    fn enable(&mut self) -> Enabled {
        if let Some(code) = &self.team_code {
            return Enabled::Existing(code.clone());
        }

        let code = team_code::generate();
        self.persist_code(&code);
        tracing::info!(team_code = %code, "cloud sync enabled");
        self.activate(Some(code.clone()));
        Enabled::Created(code)
    }

    fn join(&mut self, code: TeamCode) -> Enabled {
        if let Some(current) = &self.team_code {
            return Enabled::Existing(current.clone());
        }

        self.persist_code(&code);
        tracing::info!(team_code = %code, "joined team");
        self.activate(Some(code.clone()));
        // No push until the team state has been pulled.
        if let Some(timers) = self.timers.as_mut() {
            timers.debounce_at = None;
        }
        let outcome = self.start_pull(Operation::JoinPull);
        tracing::debug!(?outcome, "initial pull after join");
        Enabled::Joined(code)
    }

    fn persist_code(&self, code: &TeamCode) {
        if let Err(err) = self.persistence.set(TEAM_CODE_KEY, &code.0) {
            tracing::warn!(error = %err, "failed to persist team code; sync active for this session only");
            self.set_status(SyncStatus::Error);
        }
    }

    fn disable(&mut self) -> Option<TeamCode> {
        let previous = self.team_code.clone()?;
        if let Err(err) = self.persistence.remove(TEAM_CODE_KEY) {
            tracing::warn!(error = %err, "failed to remove persisted team code");
        }
        tracing::info!(team_code = %previous, "cloud sync disabled");
        self.activate(None);
        self.linger_until = None;
        self.set_status(SyncStatus::Idle);
        Some(previous)
    }

    /// Swap the team code and tear down / re-acquire the timers with it.
    fn activate(&mut self, code: Option<TeamCode>) {
        self.timers = None;
        if code.is_some() {
            self.timers = Some(SyncTimers::acquire(&self.config));
        }
        self.team_code = code.clone();
        self.code_tx.send_replace(code);
    }

    fn handle_state_changed(&mut self) {
        self.arm_debounce();
    }

    fn arm_debounce(&mut self) {
        if let Some(timers) = self.timers.as_mut() {
            timers.debounce_at = Some(Instant::now() + self.config.debounce);
        }
    }

    /// Reload state another process saved. Returns whether it changed.
    fn reload_store(&self) -> bool {
        lock_store(&self.store).reload_if_stale()
    }

    fn request_push(&mut self) -> RequestOutcome {
        let Some(code) = self.team_code.clone() else {
            return RequestOutcome::Disabled;
        };
        if let Guard::InFlight(op) = self.guard {
            tracing::debug!(in_flight = ?op, "push dropped");
            return RequestOutcome::Dropped;
        }

        let (snapshot, healthy) = {
            let mut store = lock_store(&self.store);
            store.reload_if_stale();
            (store.snapshot(), store.persistence_healthy())
        };
        if !healthy {
            tracing::warn!("local persistence failing, push refused");
            self.set_status(SyncStatus::Error);
            return RequestOutcome::Refused;
        }

        self.begin(Operation::Push);
        let remote = self.remote.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = remote.push(&code, &snapshot).await;
            let _ = completions.send(Completion {
                code,
                outcome: Outcome::Pushed(result),
            });
        });
        RequestOutcome::Started
    }

    fn request_pull(&mut self) -> RequestOutcome {
        self.start_pull(Operation::Pull)
    }

    fn start_pull(&mut self, op: Operation) -> RequestOutcome {
        let Some(code) = self.team_code.clone() else {
            return RequestOutcome::Disabled;
        };
        if let Guard::InFlight(current) = self.guard {
            tracing::debug!(in_flight = ?current, "pull dropped");
            return RequestOutcome::Dropped;
        }

        // Edits saved by another process since the last sync need a push.
        if self.reload_store() && op == Operation::Pull {
            self.arm_debounce();
        }

        self.begin(op);
        let remote = self.remote.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = remote.pull(&code).await;
            let _ = completions.send(Completion {
                code,
                outcome: Outcome::Pulled(result),
            });
        });
        RequestOutcome::Started
    }

    fn begin(&mut self, op: Operation) {
        self.guard = Guard::InFlight(op);
        self.linger_until = None;
        self.set_status(SyncStatus::Syncing);
        self.in_flight_tx.send_replace(true);
    }

    fn handle_completion(&mut self, done: Completion) {
        let finished = std::mem::replace(&mut self.guard, Guard::Idle);

        if self.team_code.as_ref() != Some(&done.code) {
            tracing::debug!(team_code = %done.code, "ignoring result for inactive team code");
            if *self.status_tx.borrow() == SyncStatus::Syncing {
                self.set_status(SyncStatus::Idle);
            }
            self.in_flight_tx.send_replace(false);
            return;
        }

        match done.outcome {
            Outcome::Pushed(Ok(())) => {
                tracing::info!(team_code = %done.code, "pushed state to cloud");
                self.set_status(SyncStatus::Success);
                self.linger_until = Some(Instant::now() + self.config.success_linger);
            }
            Outcome::Pushed(Err(err)) => {
                tracing::warn!(team_code = %done.code, error = %err, "cloud push failed");
                self.set_status(SyncStatus::Error);
            }
            Outcome::Pulled(Ok(Some(remote))) => {
                let remote_version = remote.version;
                let joining = finished == Guard::InFlight(Operation::JoinPull);
                let (decision, reloaded) = {
                    let mut store = lock_store(&self.store);
                    let reloaded = store.reload_if_stale();
                    let decision = if joining {
                        merge::resolve_join(&remote)
                    } else {
                        merge::resolve(store.version(), &remote)
                    };
                    if decision == MergeDecision::TakeRemote {
                        store.apply_remote(remote);
                    }
                    (decision, reloaded)
                };
                tracing::debug!(?decision, remote_version, joining, "pulled state from cloud");
                if reloaded && decision == MergeDecision::KeepLocal {
                    self.arm_debounce();
                }
                self.set_status(SyncStatus::Idle);
            }
            Outcome::Pulled(Ok(None)) => {
                tracing::debug!(team_code = %done.code, "nothing stored remotely yet");
                if finished == Guard::InFlight(Operation::JoinPull) {
                    // First client on this code: seed the team with local state.
                    self.arm_debounce();
                }
                self.set_status(SyncStatus::Idle);
            }
            Outcome::Pulled(Err(err)) => {
                tracing::warn!(team_code = %done.code, error = %err, "cloud pull failed");
                self.set_status(SyncStatus::Error);
            }
        }
        self.in_flight_tx.send_replace(false);
    }

    fn set_status(&self, status: SyncStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "sync status");
        }
    }
}

fn load_team_code(persistence: &impl KeyValueStore) -> Option<TeamCode> {
    match persistence.get(TEAM_CODE_KEY) {
        Ok(code) => code
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .map(TeamCode),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read team code, sync stays off");
            None
        }
    }
}

async fn next_timer(timers: &mut Option<SyncTimers>) -> Event {
    let Some(timers) = timers else {
        return std::future::pending().await;
    };
    match timers.debounce_at {
        Some(at) => tokio::select! {
            _ = tokio::time::sleep_until(at) => Event::DebounceElapsed,
            _ = timers.pull.tick() => Event::PullTick,
        },
        None => {
            timers.pull.tick().await;
            Event::PullTick
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
