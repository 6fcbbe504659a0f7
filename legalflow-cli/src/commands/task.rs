//! `legalflow task list|add|update|toggle|delete`
//!
//! Every subcommand works on the active sheet unless `--sheet` is given.
//! Task ids may be abbreviated to any unique prefix.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use legalflow_core::{
    AssigneeId, FileStore, Sheet, SheetId, SheetStore, SortOrder, Task, TaskPatch, TaskQuery,
    TaskStatus,
};

use super::{confirm, open_store, report_persistence, resolve_task, short_id, target_sheet};
use crate::{SortFieldArg, TaskStatusArg};

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Show the task table.
    List(ListArgs),

    /// Append a task; optional fields are applied right after creation.
    Add(AddArgs),

    /// Change fields of an existing task.
    Update(UpdateArgs),

    /// Assign a team member to a task, or unassign if already assigned.
    Toggle(ToggleArgs),

    /// Remove a task.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct SheetArg {
    /// Sheet id or name. Defaults to the active sheet.
    #[arg(long, short = 's')]
    pub sheet: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub sheet: SheetArg,

    /// Case-insensitive text matched against pratica and note.
    #[arg(long, default_value = "")]
    pub search: String,

    /// Keep only tasks assigned to this member id.
    #[arg(long)]
    pub assignee: Option<String>,

    /// Sort column: pratica | scadenza | assegnatario.
    #[arg(long, value_name = "FIELD")]
    pub sort: Option<SortFieldArg>,

    /// Sort descending.
    #[arg(long)]
    pub desc: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct FieldArgs {
    /// Case / matter title.
    #[arg(long)]
    pub pratica: Option<String>,

    /// Free-text external assignees.
    #[arg(long)]
    pub altri: Option<String>,

    /// Due date, YYYY-MM-DD.
    #[arg(long, value_name = "DATE")]
    pub scadenza: Option<NaiveDate>,

    /// Remove the due date.
    #[arg(long, conflicts_with = "scadenza")]
    pub clear_scadenza: bool,

    /// in-corso | completato | in-attesa
    #[arg(long, value_name = "STATUS")]
    pub stato: Option<TaskStatusArg>,

    #[arg(long)]
    pub note: Option<String>,

    /// Replace the assignee list (repeatable, member ids).
    #[arg(long = "assign", value_name = "MEMBER")]
    pub assign: Vec<String>,

    /// Remove every assignee.
    #[arg(long, conflicts_with = "assign")]
    pub unassign_all: bool,
}

impl FieldArgs {
    fn into_patch(self) -> TaskPatch {
        let assegnatari = if self.unassign_all {
            Some(Vec::new())
        } else if self.assign.is_empty() {
            None
        } else {
            Some(self.assign.into_iter().map(AssigneeId::from).collect())
        };
        TaskPatch {
            pratica: self.pratica,
            assegnatari,
            altri: self.altri,
            scadenza: if self.clear_scadenza {
                Some(None)
            } else {
                self.scadenza.map(Some)
            },
            stato: self.stato.map(|s| s.0),
            note: self.note,
        }
    }
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub sheet: SheetArg,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Task id or unique prefix.
    pub task: String,

    #[command(flatten)]
    pub sheet: SheetArg,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug)]
pub struct ToggleArgs {
    /// Task id or unique prefix.
    pub task: String,

    /// Team member id.
    pub member: String,

    #[command(flatten)]
    pub sheet: SheetArg,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Task id or unique prefix.
    pub task: String,

    #[command(flatten)]
    pub sheet: SheetArg,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::List(args) => list(args),
        TaskCommand::Add(args) => add(args),
        TaskCommand::Update(args) => update(args),
        TaskCommand::Toggle(args) => toggle(args),
        TaskCommand::Delete(args) => delete(args),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "pratica")]
    pratica: String,
    #[tabled(rename = "assegnatari")]
    assegnatari: String,
    #[tabled(rename = "altri")]
    altri: String,
    #[tabled(rename = "scadenza")]
    scadenza: String,
    #[tabled(rename = "stato")]
    stato: String,
    #[tabled(rename = "note")]
    note: String,
}

#[derive(Serialize)]
struct TaskListJson<'a> {
    sheet: &'a str,
    name: &'a str,
    tasks: Vec<&'a Task>,
}

fn list(args: ListArgs) -> Result<()> {
    let store = open_store()?;
    let sheet = sheet_for(&store, args.sheet.sheet.as_deref())?;

    let query = TaskQuery {
        search: args.search,
        assignee: args.assignee.map(AssigneeId::from),
        sort: args.sort.unwrap_or_default().0,
        order: if args.desc { SortOrder::Desc } else { SortOrder::Asc },
    };
    let view = query.apply(sheet.tasks(), store.team());

    if args.json {
        let payload = TaskListJson {
            sheet: &sheet.id.0,
            name: &sheet.name,
            tasks: view,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to render task JSON")?
        );
        return Ok(());
    }

    println!("{} ({})", sheet.name.bold(), sheet.sheet_type);
    if view.is_empty() {
        if sheet.data.is_empty() {
            println!("No tasks yet. Run: legalflow task add --pratica <title>");
        } else if sheet.tasks().is_empty() {
            println!("{} row(s) that are not tasks.", sheet.data.len());
        } else {
            println!("No task matches the current filters.");
        }
        return Ok(());
    }

    let rows: Vec<TaskRow> = view
        .into_iter()
        .map(|task| TaskRow {
            id: short_id(&task.id.0).to_string(),
            pratica: task.pratica.clone(),
            assegnatari: task
                .assegnatari
                .iter()
                .filter_map(|id| store.member(id))
                .map(|m| m.first_name().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            altri: task.altri.clone(),
            scadenza: task
                .scadenza
                .map(|date| date.format("%d/%m/%Y").to_string())
                .unwrap_or_default(),
            stato: paint_status(task.stato),
            note: task.note.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn paint_status(status: TaskStatus) -> String {
    match status {
        TaskStatus::InCorso => status.label().blue().to_string(),
        TaskStatus::Completato => status.label().green().to_string(),
        TaskStatus::InAttesa => status.label().yellow().to_string(),
    }
}

// ---------------------------------------------------------------------------
// mutations
// ---------------------------------------------------------------------------

fn add(args: AddArgs) -> Result<()> {
    let mut store = open_store()?;
    let sheet_id = target_sheet(&store, args.sheet.sheet.as_deref())?;
    let task_id = store
        .add_task(&sheet_id)
        .ok_or_else(|| anyhow!("sheet '{sheet_id}' does not hold tasks"))?;

    let patch = args.fields.into_patch();
    if !patch.is_empty() {
        store.update_task(&sheet_id, &task_id, patch);
    }
    report_persistence(&store);

    println!("{} Added task {}", "✓".green(), task_id);
    Ok(())
}

fn update(args: UpdateArgs) -> Result<()> {
    let mut store = open_store()?;
    let sheet = sheet_for(&store, args.sheet.sheet.as_deref())?;
    let sheet_id = sheet.id.clone();
    let task_id = resolve_task(sheet, &args.task)?;

    let patch = args.fields.into_patch();
    if patch.is_empty() {
        println!("Nothing to update.");
        return Ok(());
    }
    store.update_task(&sheet_id, &task_id, patch);
    report_persistence(&store);

    println!("{} Updated task {}", "✓".green(), short_id(&task_id.0));
    Ok(())
}

fn toggle(args: ToggleArgs) -> Result<()> {
    let mut store = open_store()?;
    let sheet = sheet_for(&store, args.sheet.sheet.as_deref())?;
    let sheet_id = sheet.id.clone();
    let task_id = resolve_task(sheet, &args.task)?;
    let member = AssigneeId::from(args.member);
    let name = store
        .member(&member)
        .map(|m| m.name.clone())
        .ok_or_else(|| anyhow!("no team member with id '{member}'"))?;

    store.toggle_assignee(&sheet_id, &task_id, &member);
    report_persistence(&store);

    let assigned = store
        .sheet(&sheet_id)
        .and_then(|s| s.task(&task_id))
        .is_some_and(|t| t.assegnatari.contains(&member));
    let verb = if assigned { "Assigned" } else { "Unassigned" };
    println!("{} {} {} on {}", "✓".green(), verb, name, short_id(&task_id.0));
    Ok(())
}

fn delete(args: DeleteArgs) -> Result<()> {
    let mut store = open_store()?;
    let sheet = sheet_for(&store, args.sheet.sheet.as_deref())?;
    let sheet_id = sheet.id.clone();
    let task_id = resolve_task(sheet, &args.task)?;
    let pratica = sheet
        .task(&task_id)
        .map(|t| t.pratica.clone())
        .unwrap_or_default();

    if !args.yes && !confirm(&format!("Delete task '{pratica}'?"))? {
        println!("Aborted.");
        return Ok(());
    }

    store.delete_task(&sheet_id, &task_id);
    report_persistence(&store);
    println!("{} Deleted task '{}'", "✓".green(), pratica);
    Ok(())
}

fn sheet_for<'a>(store: &'a SheetStore<FileStore>, key: Option<&str>) -> Result<&'a Sheet> {
    let id: SheetId = target_sheet(store, key)?;
    store
        .sheet(&id)
        .ok_or_else(|| anyhow!("no sheet with id '{id}'"))
}
