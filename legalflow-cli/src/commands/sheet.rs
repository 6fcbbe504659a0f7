//! `legalflow sheet list|add|copy|delete|use`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use legalflow_core::StoreError;

use super::{confirm, format_timestamp, open_store, report_persistence, resolve_sheet};

#[derive(Subcommand, Debug)]
pub enum SheetCommand {
    /// List all sheets; the active one is marked with `*`.
    List,

    /// Create a custom sheet and make it active.
    Add(AddArgs),

    /// Duplicate a sheet with all its tasks.
    Copy(SheetRef),

    /// Delete a sheet and every task in it.
    Delete(DeleteArgs),

    /// Make a sheet the active one.
    Use(SheetRef),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Sheet name; stored upper-case.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct SheetRef {
    /// Sheet id (e.g. `sheet-1`) or name.
    pub sheet: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Sheet id or name.
    pub sheet: String,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Tabled)]
struct SheetRow {
    #[tabled(rename = "")]
    active: &'static str,
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "type")]
    sheet_type: String,
    #[tabled(rename = "tasks")]
    tasks: usize,
    #[tabled(rename = "last updated")]
    last_updated: String,
}

pub fn run(cmd: SheetCommand) -> Result<()> {
    match cmd {
        SheetCommand::List => list(),
        SheetCommand::Add(args) => add(args),
        SheetCommand::Copy(args) => copy(args),
        SheetCommand::Delete(args) => delete(args),
        SheetCommand::Use(args) => select(args),
    }
}

fn list() -> Result<()> {
    let store = open_store()?;
    let active = store.active_sheet_id();
    let rows: Vec<SheetRow> = store
        .sheets()
        .iter()
        .map(|s| SheetRow {
            active: if &s.id == active { "*" } else { "" },
            id: s.id.0.clone(),
            name: s.name.clone(),
            sheet_type: s.sheet_type.label().to_string(),
            tasks: s.data.len(),
            last_updated: format_timestamp(s.last_updated),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let mut store = open_store()?;
    let id = store.add_sheet(&args.name).context("failed to add sheet")?;
    report_persistence(&store);

    let name = store.sheet(&id).map(|s| s.name.clone()).unwrap_or_default();
    println!("{} Added sheet '{}' ({})", "✓".green(), name, id);
    Ok(())
}

fn copy(args: SheetRef) -> Result<()> {
    let mut store = open_store()?;
    let source = resolve_sheet(&store, &args.sheet)?;
    let id = store.copy_sheet(&source).context("failed to copy sheet")?;
    report_persistence(&store);

    let name = store.sheet(&id).map(|s| s.name.clone()).unwrap_or_default();
    println!("{} Copied to '{}' ({})", "✓".green(), name, id);
    Ok(())
}

fn delete(args: DeleteArgs) -> Result<()> {
    let mut store = open_store()?;
    let id = resolve_sheet(&store, &args.sheet)?;
    let (name, tasks) = store
        .sheet(&id)
        .map(|s| (s.name.clone(), s.data.len()))
        .unwrap_or_default();

    if store.sheets().len() <= 1 {
        return Err(StoreError::LastSheet { name }.into());
    }
    if !args.yes
        && !confirm(&format!(
            "Delete sheet '{name}' and its {tasks} task(s)? This cannot be undone."
        ))?
    {
        println!("Aborted.");
        return Ok(());
    }

    store.delete_sheet(&id).context("failed to delete sheet")?;
    report_persistence(&store);
    println!(
        "{} Deleted '{}'; active sheet is now '{}'",
        "✓".green(),
        name,
        store.active_sheet_id()
    );
    Ok(())
}

fn select(args: SheetRef) -> Result<()> {
    let mut store = open_store()?;
    let id = resolve_sheet(&store, &args.sheet)?;
    store.set_active_sheet(&id);
    report_persistence(&store);
    println!("Active sheet: {id}");
    Ok(())
}
