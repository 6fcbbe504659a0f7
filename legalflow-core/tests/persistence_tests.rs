//! File-backed persistence and query integration tests.

use assert_fs::prelude::*;
use chrono::NaiveDate;
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;

use legalflow_core::{
    paths,
    persistence::{self, FileStore, KeyValueStore},
    types::default_team,
    AssigneeId, SheetStore, SortField, SortOrder, Task, TaskId, TaskQuery, TaskStatus,
};

// ---------------------------------------------------------------------------
// 1. FileStore
// ---------------------------------------------------------------------------

#[test]
fn file_store_writes_one_blob_per_key() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = FileStore::new(paths::data_dir(home.path()));
    store.set(persistence::TEAM_CODE_KEY, "TEAM-AB12CD3").expect("set");

    home.child(".legalflow/data/legal_team_id")
        .assert(predicate::str::diff("TEAM-AB12CD3"));
    assert_eq!(
        store.get(persistence::TEAM_CODE_KEY).unwrap().as_deref(),
        Some("TEAM-AB12CD3")
    );
}

#[test]
fn file_store_cleans_up_tmp_and_sets_perms() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = FileStore::new(paths::data_dir(home.path()));
    store.set(persistence::SHEETS_KEY, "[]").expect("set");

    home.child(".legalflow/data/legal_sheets.tmp")
        .assert(predicate::path::missing());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = store.path_for(persistence::SHEETS_KEY).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let dir_mode = fs::metadata(store.root()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}

#[test]
fn interrupted_write_leaves_previous_blob_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = FileStore::new(paths::data_dir(home.path()));
    store.set(persistence::TEAM_KEY, "[]").expect("set");

    // Crash between tmp write and rename: orphan tmp, original untouched.
    home.child(".legalflow/data/legal_team.tmp")
        .write_str("CRASH - INCOMPLETE")
        .unwrap();
    assert_eq!(store.get(persistence::TEAM_KEY).unwrap().as_deref(), Some("[]"));
}

#[test]
fn store_state_survives_restart_on_disk() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let backing = FileStore::new(paths::data_dir(home.path()));

    let mut store = SheetStore::open(backing.clone());
    let sheet = store.active_sheet_id().clone();
    store.add_task(&sheet).unwrap();
    store.add_team_member("Chiara Neri").unwrap();

    let reopened = SheetStore::open(backing);
    assert_eq!(reopened.sheets(), store.sheets());
    assert_eq!(reopened.team().len(), 6);
}

#[test]
fn browser_blob_loads_unchanged() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let backing = FileStore::new(paths::data_dir(home.path()));
    backing
        .set(
            persistence::SHEETS_KEY,
            r#"[{"id":"sheet-1","name":"TASKS","type":"TASKS","lastUpdated":1700000000000,
                "data":[{"id":"a","pratica":"Fallimento Orsi","assegnatari":["2"],"altri":"",
                         "scadenza":"2024-05-02","stato":"Completato","note":""}]}]"#,
        )
        .unwrap();

    let store = SheetStore::open(backing);
    assert_eq!(store.sheets().len(), 1);
    let task = &store.sheets()[0].tasks()[0];
    assert_eq!(task.stato, TaskStatus::Completato);
    assert_eq!(task.scadenza, NaiveDate::from_ymd_opt(2024, 5, 2));
    assert_eq!(store.version(), 1_700_000_000_000);
}

#[test]
fn blank_dates_and_panel_rows_survive_an_edit() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let backing = FileStore::new(paths::data_dir(home.path()));
    backing
        .set(
            persistence::SHEETS_KEY,
            r#"[{"id":"sheet-1","name":"TASKS","type":"TASKS","lastUpdated":1700000000000,
                "data":[{"id":"a","pratica":"Fallimento Orsi","assegnatari":[],"altri":"",
                         "scadenza":"","stato":"In attesa","note":""}]},
               {"id":"sheet-4","name":"LEXOLOGY","type":"LEXOLOGY","lastUpdated":1700000000000,
                "data":[{"fonte":"GU","anno":2024},{"fonte":"EUR-Lex"}]}]"#,
        )
        .unwrap();

    let mut store = SheetStore::open(backing.clone());
    assert_eq!(store.sheets().len(), 2, "blob is used, not replaced by defaults");
    assert_eq!(store.sheets()[0].tasks()[0].scadenza, None);
    let tasks = store.sheets()[0].id.clone();
    store.add_task(&tasks).unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&backing.get(persistence::SHEETS_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(saved[0]["data"][0]["pratica"], "Fallimento Orsi");
    assert_eq!(saved[0]["data"][0]["scadenza"], "");
    assert_eq!(saved[0]["data"].as_array().unwrap().len(), 2);
    assert_eq!(saved[1]["data"][0]["fonte"], "GU");
    assert_eq!(saved[1]["data"][1]["fonte"], "EUR-Lex");
}

#[test]
fn unreadable_sheets_are_backed_up_before_the_first_write() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let backing = FileStore::new(paths::data_dir(home.path()));
    backing.set(persistence::SHEETS_KEY, r#"[{"id":"sheet-1""#).unwrap();

    let mut store = SheetStore::open(backing);
    let sheet = store.active_sheet_id().clone();
    store.add_task(&sheet).unwrap();

    let data = home.child(".legalflow/data");
    let backups: Vec<_> = fs::read_dir(data.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("legal_sheets.corrupt-"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), r#"[{"id":"sheet-1""#);
}

#[cfg(unix)]
#[test]
fn unreadable_blob_without_backup_is_never_overwritten() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let backing = FileStore::new(paths::data_dir(home.path()));
    // Reading a directory fails with an I/O error, so there is nothing to back up.
    let sheets = home.child(".legalflow/data/legal_sheets");
    sheets.create_dir_all().unwrap();

    let mut store = SheetStore::open(backing);
    assert_eq!(store.locked_keys(), &[persistence::SHEETS_KEY]);
    assert!(!store.persistence_healthy());
    let sheet = store.active_sheet_id().clone();
    store.add_task(&sheet).unwrap();
    assert!(!store.persistence_healthy());
    assert!(sheets.path().is_dir(), "locked key left untouched");
}

// ---------------------------------------------------------------------------
// 2. Query
// ---------------------------------------------------------------------------

fn task(id: &str, pratica: &str, scadenza: (i32, u32, u32), assignees: &[&str]) -> Task {
    Task {
        id: TaskId::from(id),
        pratica: pratica.into(),
        assegnatari: assignees.iter().map(|a| AssigneeId::from(*a)).collect(),
        altri: String::new(),
        scadenza: NaiveDate::from_ymd_opt(scadenza.0, scadenza.1, scadenza.2),
        stato: TaskStatus::InCorso,
        note: if id == "c" { "urgente".into() } else { String::new() },
    }
}

fn sample() -> Vec<Task> {
    vec![
        // team: 1 Aurora, 3 Alessandro, 5 Beatrice
        task("a", "marchi Lupo", (2026, 2, 1), &["5"]),
        task("b", "Appalto Sud", (2026, 1, 9), &["3", "1"]),
        task("c", "Cessione Verdi", (2026, 3, 20), &["1"]),
    ]
}

#[rstest]
#[case(SortField::Pratica, SortOrder::Asc, &["b", "c", "a"])]
#[case(SortField::Pratica, SortOrder::Desc, &["a", "c", "b"])]
#[case(SortField::Scadenza, SortOrder::Asc, &["b", "a", "c"])]
#[case(SortField::Assegnatario, SortOrder::Asc, &["b", "c", "a"])]
#[case(SortField::Assegnatario, SortOrder::Desc, &["a", "c", "b"])]
fn query_sorts(#[case] sort: SortField, #[case] order: SortOrder, #[case] expected: &[&str]) {
    let tasks = sample();
    let query = TaskQuery {
        sort,
        order,
        ..Default::default()
    };
    let ids: Vec<&str> = query
        .apply(&tasks, &default_team())
        .iter()
        .map(|t| t.id.0.as_str())
        .collect();
    assert_eq!(ids, expected);
}

#[rstest]
#[case("VERDI", None, &["c"])]
#[case("urgente", None, &["c"])]
#[case("", Some("1"), &["b", "c"])]
#[case("sud", Some("1"), &["b"])]
#[case("", Some("nobody"), &[])]
fn query_filters(#[case] search: &str, #[case] assignee: Option<&str>, #[case] expected: &[&str]) {
    let tasks = sample();
    let query = TaskQuery {
        search: search.into(),
        assignee: assignee.map(AssigneeId::from),
        ..Default::default()
    };
    let ids: Vec<&str> = query
        .apply(&tasks, &default_team())
        .iter()
        .map(|t| t.id.0.as_str())
        .collect();
    assert_eq!(ids, expected);
}
