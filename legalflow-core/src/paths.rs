//! On-disk layout.
//!
//! ```text
//! <home>/.legalflow/
//!   data/
//!     legal_sheets        JSON array of sheets
//!     legal_team          JSON array of members
//!     legal_team_id       raw team code
//!     legal_version       last mutation timestamp
//!     legal_active_sheet  raw sheet id
//! ```

use std::path::{Path, PathBuf};

use crate::error::PersistenceError;

/// Overrides the home directory; used by tests and portable installs.
pub const HOME_ENV: &str = "LEGALFLOW_HOME";

pub fn legalflow_root(home: &Path) -> PathBuf {
    home.join(".legalflow")
}

pub fn data_dir(home: &Path) -> PathBuf {
    legalflow_root(home).join("data")
}

/// `$LEGALFLOW_HOME` if set, otherwise the user's home directory.
pub fn home() -> Result<PathBuf, PersistenceError> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir().ok_or(PersistenceError::HomeNotFound)
}
