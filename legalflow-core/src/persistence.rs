//! Persistence adapter: a string-keyed blob store.
//!
//! Two backends:
//! - [`MemoryStore`]: shared in-process map; clones see the same data.
//! - [`FileStore`]: one file per key under a directory. Writes use the
//!   `.tmp` sibling + `rename` pattern so a crash never leaves a torn blob.
//!
//! Absent keys are normal (first run); callers fall back to built-in
//! defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, PersistenceError};
use crate::types::{default_sheets, default_team, Assignee, Sheet, SheetId, Timestamp};

/// JSON array of sheets.
pub const SHEETS_KEY: &str = "legal_sheets";
/// JSON array of team members.
pub const TEAM_KEY: &str = "legal_team";
/// Plain-string team code.
pub const TEAM_CODE_KEY: &str = "legal_team_id";
/// JSON number, the AppState version of the last local mutation.
pub const VERSION_KEY: &str = "legal_version";
/// Plain-string id of the selected sheet.
pub const ACTIVE_SHEET_KEY: &str = "legal_active_sheet";

/// A durable string-keyed store.
pub trait KeyValueStore: Clone + Send + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// Directory-backed store: key `k` lives at `<root>/k`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob for `key`. No I/O.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(io_err(
                &self.root,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid storage key '{key}'"),
                ),
            ));
        }
        Ok(self.root.join(key))
    }

    fn ensure_root(&self) -> Result<(), PersistenceError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
            set_dir_permissions(&self.root)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(path, err)),
        }
    }

    /// Write flow: `<key>.tmp` sibling → `chmod 0600` → `rename`.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        self.ensure_root()?;
        let tmp = self.root.join(format!("{key}.tmp"));
        std::fs::write(&tmp, value).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(path, err)),
        }
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), PersistenceError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), PersistenceError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), PersistenceError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), PersistenceError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Read and decode a JSON blob. `Ok(None)` when the key is absent.
pub fn read_json<T: DeserializeOwned>(
    store: &impl KeyValueStore,
    key: &str,
) -> Result<Option<T>, PersistenceError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| PersistenceError::Json {
            key: key.to_owned(),
            source,
        })
}

pub fn write_json<T: Serialize>(
    store: &impl KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string(value).map_err(|source| PersistenceError::Json {
        key: key.to_owned(),
        source,
    })?;
    store.set(key, &json)
}

/// State recovered from the adapter at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub sheets: Vec<Sheet>,
    pub team: Vec<Assignee>,
    pub version: Option<Timestamp>,
    pub active_sheet: Option<SheetId>,
    /// `sheets` is the built-in layout rather than anything a user saved.
    pub default_layout: bool,
    /// Keys holding a blob that could be neither decoded nor backed up.
    /// Writing defaults over them would destroy the only copy.
    pub locked_keys: Vec<&'static str>,
}

/// Key a corrupt blob is moved aside to, e.g. `legal_sheets.corrupt-1700000000000`.
pub fn backup_key(key: &str, now: Timestamp) -> String {
    format!("{key}.corrupt-{now}")
}

/// Load persisted state, substituting defaults for anything absent or
/// unreadable. Never fails: a broken adapter yields the default layout.
///
/// A blob that exists but does not decode is copied to [`backup_key`]
/// first. If that copy fails too, the key is reported in
/// [`PersistedState::locked_keys`].
pub fn load_state(store: &impl KeyValueStore, now: Timestamp) -> PersistedState {
    let mut locked_keys = Vec::new();

    let loaded_sheets = load_blob::<Vec<Sheet>>(store, SHEETS_KEY, now, &mut locked_keys);
    let default_layout = !matches!(&loaded_sheets, Some(sheets) if !sheets.is_empty());
    let sheets = match loaded_sheets {
        Some(sheets) if !sheets.is_empty() => sheets,
        Some(_) => {
            tracing::warn!("persisted sheet list is empty, using default layout");
            default_sheets(now)
        }
        None => default_sheets(now),
    };

    let team = load_blob::<Vec<Assignee>>(store, TEAM_KEY, now, &mut locked_keys)
        .unwrap_or_else(default_team);

    let version = read_json::<Timestamp>(store, VERSION_KEY).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to load state version");
        None
    });

    let active_sheet = match store.get(ACTIVE_SHEET_KEY) {
        Ok(id) => id.map(SheetId::from),
        Err(err) => {
            tracing::warn!(error = %err, "failed to load active sheet");
            None
        }
    };

    PersistedState {
        sheets,
        team,
        version,
        active_sheet,
        default_layout,
        locked_keys,
    }
}

/// Read one blob. `None` means "use the default": the key is absent, or it
/// was unreadable and has been backed up or locked.
fn load_blob<T: DeserializeOwned>(
    store: &impl KeyValueStore,
    key: &'static str,
    now: Timestamp,
    locked_keys: &mut Vec<&'static str>,
) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read blob, leaving it untouched");
            locked_keys.push(key);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            let backup = backup_key(key, now);
            match store.set(&backup, &raw) {
                Ok(()) => {
                    tracing::warn!(
                        key,
                        %backup,
                        error = %err,
                        "unreadable blob backed up, using defaults",
                    );
                }
                Err(backup_err) => {
                    tracing::warn!(
                        key,
                        error = %err,
                        backup_error = %backup_err,
                        "unreadable blob could not be backed up, leaving it untouched",
                    );
                    locked_keys.push(key);
                }
            }
            None
        }
    }
}
