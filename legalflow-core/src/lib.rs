//! LegalFlow core library: domain types, persistence adapter, sheet store.
//!
//! - [`types`]: newtypes, entities and the built-in defaults
//! - [`persistence`]: [`KeyValueStore`] and its memory/file backends
//! - [`store`]: [`SheetStore`], the sole mutator of sheets and team
//! - [`query`]: task table search/filter/sort
//! - [`error`]: [`StoreError`], [`PersistenceError`]

pub mod error;
pub mod paths;
pub mod persistence;
pub mod query;
pub mod store;
pub mod types;

pub use error::{PersistenceError, StoreError};
pub use persistence::{FileStore, KeyValueStore, MemoryStore};
pub use query::{SortField, SortOrder, TaskQuery};
pub use store::{ChangeListener, Revision, SheetStore};
pub use types::{
    AppState, Assignee, AssigneeId, Sheet, SheetData, SheetId, SheetType, Task, TaskId, TaskPatch,
    TaskStatus, TeamCode, Timestamp,
};
