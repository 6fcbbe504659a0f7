//! In-memory authoritative state for sheets and the team roster.
//!
//! [`SheetStore`] is the only mutator of sheets and team. Every mutation is
//! written through to the persistence adapter before change listeners run,
//! so anything a listener schedules observes the persisted state.
//!
//! Lookup misses (unknown sheet or task id) are silent no-ops. Validation
//! rejections come back as [`StoreError`] and leave state untouched.

use chrono::Utc;
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::error::{PersistenceError, StoreError};
use serde::Serialize;

use crate::persistence::{
    load_state, read_json, write_json, KeyValueStore, PersistedState, ACTIVE_SHEET_KEY,
    SHEETS_KEY, TEAM_KEY, VERSION_KEY,
};
use crate::types::{
    AppState, Assignee, AssigneeId, Sheet, SheetData, SheetId, SheetType, Task, TaskId,
    TaskPatch, TaskStatus, Timestamp, MEMBER_PALETTE,
};

/// Counter bumped on every local mutation of sheets or team.
pub type Revision = u64;

/// Called with the new revision after each local mutation.
pub type ChangeListener = Box<dyn Fn(Revision) + Send>;

/// Millisecond clock that never repeats a value.
#[derive(Debug, Clone, Copy, Default)]
struct MonotonicClock {
    last: Timestamp,
}

impl MonotonicClock {
    fn tick(&mut self) -> Timestamp {
        self.last = now_millis().max(self.last + 1);
        self.last
    }

    fn observe(&mut self, seen: Timestamp) {
        self.last = self.last.max(seen);
    }
}

pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

pub struct SheetStore<P: KeyValueStore> {
    persistence: P,
    sheets: Vec<Sheet>,
    team: Vec<Assignee>,
    active_sheet_id: SheetId,
    version: Timestamp,
    clock: MonotonicClock,
    revision: Revision,
    listeners: Vec<ChangeListener>,
    persistence_healthy: bool,
    locked_keys: Vec<&'static str>,
}

impl<P: KeyValueStore> SheetStore<P> {
    /// Load state from `persistence`, falling back to the default layout.
    ///
    /// A default layout with no saved version starts at version 0, so any
    /// saved or remote state wins over it.
    pub fn open(persistence: P) -> Self {
        let now = now_millis();
        let loaded = load_state(&persistence, now);
        let mut store = Self {
            persistence,
            sheets: Vec::new(),
            team: Vec::new(),
            active_sheet_id: SheetId::from("sheet-1"),
            version: 0,
            clock: MonotonicClock::default(),
            revision: 0,
            listeners: Vec::new(),
            persistence_healthy: true,
            locked_keys: Vec::new(),
        };
        store.install(loaded, now);

        tracing::debug!(
            sheets = store.sheets.len(),
            team = store.team.len(),
            version = store.version,
            "sheet store opened",
        );
        store
    }

    /// Pick up state another process saved since this store loaded.
    ///
    /// Compares the persisted `legal_version` with the in-memory one and
    /// reloads everything when they differ. Skipped while the store is
    /// unhealthy, since its in-memory state may then be newer than disk.
    /// Listeners are not notified. Returns whether state was replaced.
    pub fn reload_if_stale(&mut self) -> bool {
        if !self.persistence_healthy() {
            return false;
        }
        let persisted = match read_json::<Timestamp>(&self.persistence, VERSION_KEY) {
            Ok(Some(version)) => version,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read state version");
                return false;
            }
        };
        if persisted == self.version {
            return false;
        }

        let loaded = load_state(&self.persistence, now_millis());
        let previous = self.version;
        self.install(loaded, now_millis());
        tracing::info!(previous, version = self.version, "reloaded state saved elsewhere");
        true
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, id: &SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| &s.id == id)
    }

    pub fn team(&self) -> &[Assignee] {
        &self.team
    }

    pub fn member(&self, id: &AssigneeId) -> Option<&Assignee> {
        self.team.iter().find(|m| &m.id == id)
    }

    pub fn active_sheet_id(&self) -> &SheetId {
        &self.active_sheet_id
    }

    pub fn active_sheet(&self) -> Option<&Sheet> {
        self.sheet(&self.active_sheet_id)
    }

    /// Timestamp of the last local mutation (or of the adopted remote state).
    pub fn version(&self) -> Timestamp {
        self.version
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// `false` once a write-through failed, until a later write succeeds.
    /// Always `false` while a blob is locked.
    pub fn persistence_healthy(&self) -> bool {
        self.persistence_healthy && self.locked_keys.is_empty()
    }

    /// Keys whose unreadable blob is protected from overwrites.
    pub fn locked_keys(&self) -> &[&'static str] {
        &self.locked_keys
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn subscribe(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    /// The state to push to the remote store.
    pub fn snapshot(&self) -> AppState {
        AppState {
            sheets: self.sheets.clone(),
            team: self.team.clone(),
            version: self.version,
        }
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Select a tab. Unknown ids are ignored.
    pub fn set_active_sheet(&mut self, id: &SheetId) -> bool {
        if self.sheet(id).is_none() {
            return false;
        }
        self.active_sheet_id = id.clone();
        self.persistence_healthy = true;
        self.persist_active_sheet();
        true
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Append a default task to `sheet_id`. `None` if the sheet is missing.
    pub fn add_task(&mut self, sheet_id: &SheetId) -> Option<TaskId> {
        let stamp = self.clock.tick();
        let sheet = self.sheets.iter_mut().find(|s| &s.id == sheet_id)?;
        let Some(tasks) = sheet.data.tasks_mut() else {
            tracing::warn!(sheet = %sheet_id, "sheet rows are not tasks, nothing added");
            return None;
        };

        let task = Task {
            id: TaskId(Uuid::new_v4().to_string()),
            pratica: format!("Nuova Pratica {}", tasks.len() + 1),
            assegnatari: vec![],
            altri: String::new(),
            scadenza: Some(Utc::now().date_naive()),
            stato: TaskStatus::InCorso,
            note: String::new(),
        };
        let id = task.id.clone();
        tasks.push(task);
        sheet.last_updated = stamp;

        tracing::debug!(sheet = %sheet_id, task = %id, "task added");
        self.commit_sheets(stamp);
        Some(id)
    }

    /// Merge-patch the task. Returns whether the task was found.
    ///
    /// A known sheet has its `lastUpdated` refreshed even when the task id
    /// misses. Sheets whose rows are not tasks never match.
    pub fn update_task(&mut self, sheet_id: &SheetId, task_id: &TaskId, patch: TaskPatch) -> bool {
        let stamp = self.clock.tick();
        let Some(sheet) = self.sheets.iter_mut().find(|s| &s.id == sheet_id) else {
            return false;
        };
        sheet.last_updated = stamp;
        let found = match sheet
            .data
            .tasks_mut()
            .and_then(|tasks| tasks.iter_mut().find(|t| &t.id == task_id))
        {
            Some(task) => {
                patch.apply(task);
                true
            }
            None => false,
        };
        self.commit_sheets(stamp);
        found
    }

    /// Add `member` to the task's assignees, or remove it if already there.
    pub fn toggle_assignee(
        &mut self,
        sheet_id: &SheetId,
        task_id: &TaskId,
        member: &AssigneeId,
    ) -> bool {
        let Some(next) = self
            .sheet(sheet_id)
            .and_then(|s| s.task(task_id))
            .map(|t| t.with_assignee_toggled(member))
        else {
            return false;
        };
        self.update_task(
            sheet_id,
            task_id,
            TaskPatch {
                assegnatari: Some(next),
                ..Default::default()
            },
        )
    }

    /// Remove a task. Confirmation is the caller's concern.
    pub fn delete_task(&mut self, sheet_id: &SheetId, task_id: &TaskId) -> bool {
        let stamp = self.clock.tick();
        let Some(sheet) = self.sheets.iter_mut().find(|s| &s.id == sheet_id) else {
            return false;
        };
        let removed = match sheet.data.tasks_mut() {
            Some(tasks) => {
                let before = tasks.len();
                tasks.retain(|t| &t.id != task_id);
                tasks.len() != before
            }
            None => false,
        };
        sheet.last_updated = stamp;
        self.commit_sheets(stamp);
        removed
    }

    // -----------------------------------------------------------------------
    // Sheets
    // -----------------------------------------------------------------------

    /// Append an empty custom sheet named `name` (upper-cased) and select it.
    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        let stamp = self.clock.tick();
        let sheet = Sheet {
            id: SheetId(Uuid::new_v4().to_string()),
            name: name.to_uppercase(),
            sheet_type: SheetType::Custom,
            data: SheetData::default(),
            last_updated: stamp,
        };
        let id = sheet.id.clone();
        tracing::debug!(sheet = %id, name = %sheet.name, "sheet added");
        self.sheets.push(sheet);
        self.active_sheet_id = id.clone();
        self.commit_sheets(stamp);
        self.persist_active_sheet();
        Ok(id)
    }

    /// Deep-copy a sheet as `"<name> (COPIA)"` and select the copy.
    pub fn copy_sheet(&mut self, sheet_id: &SheetId) -> Result<SheetId, StoreError> {
        let source = self
            .sheet(sheet_id)
            .ok_or_else(|| StoreError::SheetNotFound {
                id: sheet_id.clone(),
            })?;
        let name = format!("{} (COPIA)", source.name);
        let sheet_type = source.sheet_type;
        let data = source.data.clone();

        let stamp = self.clock.tick();
        let copy = Sheet {
            id: SheetId(Uuid::new_v4().to_string()),
            name,
            sheet_type,
            data,
            last_updated: stamp,
        };
        let id = copy.id.clone();
        self.sheets.push(copy);
        self.active_sheet_id = id.clone();
        self.commit_sheets(stamp);
        self.persist_active_sheet();
        Ok(id)
    }

    /// Remove a sheet. The last remaining sheet cannot be deleted.
    ///
    /// If the active sheet is removed, the selection moves to the new head
    /// of the sheet list. Returns whether a sheet was removed.
    pub fn delete_sheet(&mut self, sheet_id: &SheetId) -> Result<bool, StoreError> {
        if self.sheets.len() <= 1 {
            let name = self
                .sheets
                .first()
                .map(|s| s.name.clone())
                .unwrap_or_default();
            return Err(StoreError::LastSheet { name });
        }
        let before = self.sheets.len();
        self.sheets.retain(|s| &s.id != sheet_id);
        if self.sheets.len() == before {
            return Ok(false);
        }

        let stamp = self.clock.tick();
        let was_active = &self.active_sheet_id == sheet_id;
        if was_active {
            if let Some(head) = self.sheets.first() {
                self.active_sheet_id = head.id.clone();
            }
        }
        tracing::debug!(sheet = %sheet_id, "sheet deleted");
        self.commit_sheets(stamp);
        if was_active {
            self.persist_active_sheet();
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Team
    // -----------------------------------------------------------------------

    /// Append a member with a colour tag drawn from [`MEMBER_PALETTE`].
    pub fn add_team_member(&mut self, name: &str) -> Result<AssigneeId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        let color = MEMBER_PALETTE
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(MEMBER_PALETTE[0]);
        let member = Assignee {
            id: AssigneeId(Uuid::new_v4().to_string()),
            name: name.to_owned(),
            color_tag: color.to_owned(),
        };
        let id = member.id.clone();
        self.team.push(member);

        let stamp = self.clock.tick();
        self.version = stamp;
        self.persistence_healthy = true;
        let result = self.write_blob(TEAM_KEY, &self.team);
        self.record_persist(TEAM_KEY, result);
        self.persist_version();
        self.notify();
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Remote
    // -----------------------------------------------------------------------

    /// Replace sheets, team and version with a state pulled from the remote.
    ///
    /// Persisted like a local edit, but listeners are not notified: the
    /// state already exists remotely and must not echo back as a push.
    pub fn apply_remote(&mut self, state: AppState) {
        if state.sheets.is_empty() {
            tracing::warn!("ignoring remote state without sheets");
            return;
        }
        self.sheets = state.sheets;
        self.team = state.team;
        self.version = state.version;
        self.persistence_healthy = true;
        let newest = self
            .sheets
            .iter()
            .map(|s| s.last_updated)
            .max()
            .unwrap_or(state.version);
        self.clock.observe(state.version.max(newest));

        if self.sheet(&self.active_sheet_id).is_none() {
            if let Some(head) = self.sheets.first() {
                self.active_sheet_id = head.id.clone();
            }
            self.persist_active_sheet();
        }

        let result = self.write_blob(SHEETS_KEY, &self.sheets);
        self.record_persist(SHEETS_KEY, result);
        let result = self.write_blob(TEAM_KEY, &self.team);
        self.record_persist(TEAM_KEY, result);
        self.persist_version();
        tracing::info!(version = self.version, "adopted remote state");
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Replace in-memory state with `loaded`.
    fn install(&mut self, loaded: PersistedState, now: Timestamp) {
        let newest_sheet = loaded
            .sheets
            .iter()
            .map(|s| s.last_updated)
            .max()
            .unwrap_or(now);
        let version = match loaded.version {
            Some(version) => version,
            None if loaded.default_layout => 0,
            None => newest_sheet,
        };

        self.active_sheet_id = loaded
            .active_sheet
            .filter(|id| loaded.sheets.iter().any(|s| &s.id == id))
            .or_else(|| loaded.sheets.first().map(|s| s.id.clone()))
            .unwrap_or_else(|| SheetId::from("sheet-1"));
        self.clock.observe(version.max(newest_sheet));
        self.sheets = loaded.sheets;
        self.team = loaded.team;
        self.version = version;
        self.persistence_healthy = true;
        self.locked_keys = loaded.locked_keys;
    }

    fn commit_sheets(&mut self, stamp: Timestamp) {
        self.version = stamp;
        self.persistence_healthy = true;
        let result = self.write_blob(SHEETS_KEY, &self.sheets);
        self.record_persist(SHEETS_KEY, result);
        self.persist_version();
        self.notify();
    }

    fn write_blob<T: Serialize>(
        &self,
        key: &'static str,
        value: &T,
    ) -> Result<(), PersistenceError> {
        if self.locked_keys.contains(&key) {
            return Err(PersistenceError::Locked {
                key: key.to_owned(),
            });
        }
        write_json(&self.persistence, key, value)
    }

    fn persist_version(&mut self) {
        let result = write_json(&self.persistence, VERSION_KEY, &self.version);
        self.record_persist(VERSION_KEY, result);
    }

    fn persist_active_sheet(&mut self) {
        let result = self
            .persistence
            .set(ACTIVE_SHEET_KEY, &self.active_sheet_id.0);
        self.record_persist(ACTIVE_SHEET_KEY, result);
    }

    /// Any failed key in a write batch leaves the store unhealthy until the
    /// next batch succeeds in full.
    fn record_persist(&mut self, key: &str, result: Result<(), PersistenceError>) {
        if let Err(err) = result {
            tracing::warn!(key, error = %err, "write-through failed, keeping in-memory state");
            self.persistence_healthy = false;
        }
    }

    fn notify(&mut self) {
        self.revision += 1;
        for listener in &self.listeners {
            listener(self.revision);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[test]
    fn clock_never_repeats() {
        let mut clock = MonotonicClock::default();
        let a = clock.tick();
        let b = clock.tick();
        let c = clock.tick();
        assert!(a < b && b < c);
    }

    #[test]
    fn clock_respects_observed_future_values() {
        let mut clock = MonotonicClock::default();
        let future = now_millis() + 60_000;
        clock.observe(future);
        assert_eq!(clock.tick(), future + 1);
    }

    #[test]
    fn listeners_see_increasing_revisions() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = SheetStore::open(MemoryStore::new());
        let sink = seen.clone();
        store.subscribe(Box::new(move |rev| sink.lock().unwrap().push(rev)));

        let sheet = store.active_sheet_id().clone();
        store.add_task(&sheet);
        store.add_team_member("Chiara Neri").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn selection_is_not_a_state_change() {
        let mut store = SheetStore::open(MemoryStore::new());
        assert!(store.set_active_sheet(&SheetId::from("sheet-3")));
        assert!(!store.set_active_sheet(&SheetId::from("nope")));
        assert_eq!(store.revision(), 0);
        assert_eq!(store.active_sheet_id(), &SheetId::from("sheet-3"));
    }
}
