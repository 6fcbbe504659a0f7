use std::path::Path;
use assert_cmd::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn legalflow_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("legalflow"));
    cmd.env("LEGALFLOW_HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("LEGALFLOW_REMOTE_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn task_list_json(home: &Path) -> Value {
    let output = legalflow_cmd(home)
        .args(["task", "list", "--json"])
        .output()
        .expect("run task list");
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("task list JSON")
}

fn status_json(home: &Path) -> Value {
    let output = legalflow_cmd(home)
        .args(["sync", "status", "--json"])
        .output()
        .expect("run sync status");
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("status JSON")
}

// ---------------------------------------------------------------------------
// sheets
// ---------------------------------------------------------------------------

#[test]
fn first_run_lists_default_sheets() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["sheet", "list"])
        .assert()
        .success()
        .stdout(contains("sheet-1"))
        .stdout(contains("DUE DILIGENCE"))
        .stdout(contains("NORMATIVA"));
}

#[test]
fn added_sheet_is_uppercased_and_selected() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["sheet", "add", "  contenzioso  "])
        .assert()
        .success()
        .stdout(contains("CONTENZIOSO"));

    let list = task_list_json(home.path());
    assert_eq!(list["name"], "CONTENZIOSO");
}

#[test]
fn blank_sheet_name_is_rejected() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["sheet", "add", "   "])
        .assert()
        .failure()
        .stderr(contains("name must not be empty"));
}

#[test]
fn last_sheet_cannot_be_deleted() {
    let home = TempDir::new().expect("home");
    for n in 1..=7 {
        legalflow_cmd(home.path())
            .args(["sheet", "delete", &format!("sheet-{n}"), "--yes"])
            .assert()
            .success();
    }
    legalflow_cmd(home.path())
        .args(["sheet", "delete", "sheet-8", "--yes"])
        .assert()
        .failure()
        .stderr(contains("last remaining sheet"));
}

#[test]
fn copy_sheet_by_name_duplicates_tasks() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["task", "add", "--pratica", "Fallimento Orsi"])
        .assert()
        .success();
    legalflow_cmd(home.path())
        .args(["sheet", "copy", "tasks"])
        .assert()
        .success()
        .stdout(contains("TASKS (COPIA)"));

    let copy = task_list_json(home.path());
    assert_eq!(copy["name"], "TASKS (COPIA)");
    assert_eq!(copy["tasks"][0]["pratica"], "Fallimento Orsi");
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

#[test]
fn task_fields_round_trip_through_the_cli() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args([
            "task",
            "add",
            "--pratica",
            "Cessione Verdi",
            "--stato",
            "completato",
            "--scadenza",
            "2026-05-02",
            "--assign",
            "2",
            "--assign",
            "4",
        ])
        .assert()
        .success();

    let list = task_list_json(home.path());
    let task = &list["tasks"][0];
    assert_eq!(task["pratica"], "Cessione Verdi");
    assert_eq!(task["stato"], "Completato");
    assert_eq!(task["scadenza"], "2026-05-02");
    assert_eq!(task["assegnatari"], serde_json::json!(["2", "4"]));
}

#[test]
fn browser_data_with_blank_dates_is_kept() {
    let home = TempDir::new().expect("home");
    let data = home.path().join(".legalflow/data");
    std::fs::create_dir_all(&data).expect("data dir");
    std::fs::write(
        data.join("legal_sheets"),
        r#"[{"id":"sheet-1","name":"TASKS","type":"TASKS","lastUpdated":1700000000000,
            "data":[{"id":"a1","pratica":"Fallimento Orsi","assegnatari":[],"altri":"",
                     "scadenza":"","stato":"In attesa","note":""}]},
           {"id":"sheet-3","name":"INSIGHT","type":"INSIGHT","lastUpdated":1700000000000,
            "data":[{"titolo":"Nuova direttiva"}]}]"#,
    )
    .expect("seed sheets");

    legalflow_cmd(home.path())
        .args(["task", "add", "--pratica", "Appalto Sud"])
        .assert()
        .success();

    let list = task_list_json(home.path());
    let tasks = list["tasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 2);
    let orsi = tasks
        .iter()
        .find(|t| t["pratica"] == "Fallimento Orsi")
        .expect("existing task kept");
    assert_eq!(orsi["scadenza"], "");
    assert!(tasks.iter().any(|t| t["pratica"] == "Appalto Sud"));

    let saved = std::fs::read_to_string(data.join("legal_sheets")).expect("sheets");
    assert!(saved.contains("Nuova direttiva"));
}

#[test]
fn clear_scadenza_blanks_the_date() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["task", "add", "--pratica", "Cessione Verdi"])
        .assert()
        .success();
    let id = task_list_json(home.path())["tasks"][0]["id"]
        .as_str()
        .expect("id")
        .to_string();
    legalflow_cmd(home.path())
        .args(["task", "update", &id, "--clear-scadenza"])
        .assert()
        .success();
    assert_eq!(task_list_json(home.path())["tasks"][0]["scadenza"], "");
}

#[test]
fn toggle_accepts_task_prefix() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["task", "add"])
        .assert()
        .success();
    let id = task_list_json(home.path())["tasks"][0]["id"]
        .as_str()
        .expect("id")
        .to_string();

    legalflow_cmd(home.path())
        .args(["task", "toggle", &id[..8], "3"])
        .assert()
        .success()
        .stdout(contains("Assigned Alessandro Carlini"));
    assert_eq!(
        task_list_json(home.path())["tasks"][0]["assegnatari"],
        serde_json::json!(["3"])
    );

    legalflow_cmd(home.path())
        .args(["task", "toggle", &id, "3"])
        .assert()
        .success()
        .stdout(contains("Unassigned"));
}

#[test]
fn declined_delete_keeps_the_task() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["task", "add", "--pratica", "Appalto Sud"])
        .assert()
        .success();
    let id = task_list_json(home.path())["tasks"][0]["id"]
        .as_str()
        .expect("id")
        .to_string();

    legalflow_cmd(home.path())
        .args(["task", "delete", &id])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(contains("Aborted"));
    assert_eq!(task_list_json(home.path())["tasks"].as_array().unwrap().len(), 1);

    legalflow_cmd(home.path())
        .args(["task", "delete", &id])
        .write_stdin("y\n")
        .assert()
        .success();
    assert!(task_list_json(home.path())["tasks"].as_array().unwrap().is_empty());
}

#[test]
fn search_filters_task_list() {
    let home = TempDir::new().expect("home");
    for pratica in ["Fallimento Orsi", "Appalto Sud"] {
        legalflow_cmd(home.path())
            .args(["task", "add", "--pratica", pratica])
            .assert()
            .success();
    }

    legalflow_cmd(home.path())
        .args(["task", "list", "--search", "orsi"])
        .assert()
        .success()
        .stdout(contains("Fallimento Orsi"))
        .stdout(contains("Appalto Sud").not());
}

// ---------------------------------------------------------------------------
// team
// ---------------------------------------------------------------------------

#[test]
fn team_member_is_added_and_listed() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["team", "add", "Chiara Neri"])
        .assert()
        .success()
        .stdout(contains("Chiara Neri"));

    legalflow_cmd(home.path())
        .args(["team", "list"])
        .assert()
        .success()
        .stdout(contains("Aurora Agostini"))
        .stdout(contains("Chiara Neri"))
        .stdout(contains("CN"));
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

#[test]
fn enable_is_idempotent_and_disable_forgets_the_code() {
    let home = TempDir::new().expect("home");
    assert_eq!(status_json(home.path())["enabled"], false);

    legalflow_cmd(home.path())
        .args(["sync", "enable"])
        .assert()
        .success()
        .stdout(contains("Team code: TEAM-"));
    let code = status_json(home.path())["team_code"]
        .as_str()
        .expect("code")
        .to_string();
    assert!(home.path().join(".legalflow/data/legal_team_id").exists());

    legalflow_cmd(home.path())
        .args(["sync", "enable"])
        .assert()
        .success()
        .stdout(contains("already enabled"))
        .stdout(contains(code.as_str()));

    legalflow_cmd(home.path())
        .args(["sync", "disable"])
        .assert()
        .success()
        .stdout(contains(code.as_str()));
    assert_eq!(status_json(home.path())["enabled"], false);
}

#[test]
fn push_without_team_code_fails() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["sync", "push"])
        .assert()
        .failure()
        .stderr(contains("sync is not enabled"));
}

#[test]
fn push_without_remote_reports_failure() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["sync", "enable"])
        .assert()
        .success();
    legalflow_cmd(home.path())
        .args(["sync", "push"])
        .assert()
        .failure()
        .stderr(contains("push failed"));
}

#[test]
fn join_rejects_malformed_code() {
    let home = TempDir::new().expect("home");
    legalflow_cmd(home.path())
        .args(["sync", "join", "not-a-code"])
        .assert()
        .failure()
        .stderr(contains("is not a team code"));
    assert_eq!(status_json(home.path())["enabled"], false);
}
