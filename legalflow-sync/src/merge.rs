//! Whole-state last-writer-wins.
//!
//! The side with the strictly greater version wins in full; there is no
//! field-level merge. Ties keep the local state. The first pull after
//! joining a team is the exception: see [`resolve_join`].

use legalflow_core::{AppState, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    KeepLocal,
    TakeRemote,
}

pub fn resolve(local_version: Timestamp, remote: &AppState) -> MergeDecision {
    if remote.sheets.is_empty() {
        return MergeDecision::KeepLocal;
    }
    if remote.version > local_version {
        MergeDecision::TakeRemote
    } else {
        MergeDecision::KeepLocal
    }
}

/// Decision for the first pull after joining: the team's state replaces
/// whatever this client had, regardless of version.
pub fn resolve_join(remote: &AppState) -> MergeDecision {
    if remote.sheets.is_empty() {
        MergeDecision::KeepLocal
    } else {
        MergeDecision::TakeRemote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalflow_core::types::{default_sheets, default_team};

    fn remote(version: Timestamp) -> AppState {
        AppState {
            sheets: default_sheets(version),
            team: default_team(),
            version,
        }
    }

    #[test]
    fn newer_remote_wins() {
        assert_eq!(resolve(100, &remote(101)), MergeDecision::TakeRemote);
    }

    #[test]
    fn tie_and_older_keep_local() {
        assert_eq!(resolve(100, &remote(100)), MergeDecision::KeepLocal);
        assert_eq!(resolve(100, &remote(99)), MergeDecision::KeepLocal);
    }

    #[test]
    fn remote_without_sheets_never_wins() {
        let mut state = remote(500);
        state.sheets.clear();
        assert_eq!(resolve(100, &state), MergeDecision::KeepLocal);
        assert_eq!(resolve_join(&state), MergeDecision::KeepLocal);
    }

    #[test]
    fn joining_takes_older_team_state() {
        assert_eq!(resolve_join(&remote(1)), MergeDecision::TakeRemote);
    }
}
