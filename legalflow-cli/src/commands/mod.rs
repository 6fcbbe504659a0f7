pub mod sheet;
pub mod sync;
pub mod task;
pub mod team;

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};

use legalflow_core::{paths, FileStore, Sheet, SheetId, SheetStore, TaskId, Timestamp};

/// Open the on-disk store under `$LEGALFLOW_HOME` (or the home directory).
pub fn open_store() -> Result<SheetStore<FileStore>> {
    let home = paths::home().context("could not determine home directory")?;
    Ok(SheetStore::open(FileStore::new(paths::data_dir(&home))))
}

/// Warn once per command if the last write-through failed.
pub fn report_persistence(store: &SheetStore<FileStore>) {
    for key in store.locked_keys() {
        eprintln!(
            "warning: {key} in {} is unreadable and was left untouched; move it aside to save again",
            store.persistence().root().display()
        );
    }
    if !store.persistence_healthy() {
        eprintln!(
            "warning: changes could not be saved to {}; they are lost on exit",
            store.persistence().root().display()
        );
    }
}

/// Resolve a sheet by id, or by case-insensitive name.
pub fn resolve_sheet(store: &SheetStore<FileStore>, key: &str) -> Result<SheetId> {
    if let Some(sheet) = store.sheet(&SheetId::from(key)) {
        return Ok(sheet.id.clone());
    }
    let matches: Vec<&Sheet> = store
        .sheets()
        .iter()
        .filter(|s| s.name.eq_ignore_ascii_case(key.trim()))
        .collect();
    match matches.as_slice() {
        [sheet] => Ok(sheet.id.clone()),
        [] => Err(anyhow!("no sheet with id or name '{key}'")),
        _ => Err(anyhow!("several sheets are named '{key}'; use the sheet id")),
    }
}

/// The `--sheet` argument, or the active sheet when omitted.
pub fn target_sheet(store: &SheetStore<FileStore>, key: Option<&str>) -> Result<SheetId> {
    match key {
        Some(key) => resolve_sheet(store, key),
        None => Ok(store.active_sheet_id().clone()),
    }
}

/// Resolve a task by full id or unique id prefix.
pub fn resolve_task(sheet: &Sheet, prefix: &str) -> Result<TaskId> {
    if let Some(task) = sheet.task(&TaskId::from(prefix)) {
        return Ok(task.id.clone());
    }
    let matches: Vec<&TaskId> = sheet
        .tasks()
        .iter()
        .map(|t| &t.id)
        .filter(|id| id.0.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).clone()),
        [] => Err(anyhow!("no task '{prefix}' in sheet '{}'", sheet.name)),
        _ => Err(anyhow!(
            "task prefix '{prefix}' is ambiguous ({} matches)",
            matches.len()
        )),
    }
}

/// Ask a y/N question on stdin. Anything but an explicit yes declines.
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "s" | "si"
    ))
}

/// Version 0 is the untouched default layout.
pub fn format_timestamp(ms: Timestamp) -> String {
    if ms == 0 {
        return "never".to_string();
    }
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
