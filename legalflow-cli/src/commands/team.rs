//! `legalflow team list` and `legalflow team add <name>`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use super::{open_store, report_persistence};

#[derive(Subcommand, Debug)]
pub enum TeamCommand {
    /// List team members.
    List,

    /// Add a team member with a colour from the fixed palette.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Full name, e.g. "Chiara Neri".
    pub name: String,
}

#[derive(Tabled)]
struct MemberRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "")]
    initials: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "color")]
    color: String,
}

pub fn run(cmd: TeamCommand) -> Result<()> {
    match cmd {
        TeamCommand::List => list(),
        TeamCommand::Add(args) => add(args),
    }
}

fn list() -> Result<()> {
    let store = open_store()?;
    let rows: Vec<MemberRow> = store
        .team()
        .iter()
        .map(|m| MemberRow {
            id: m.id.0.clone(),
            initials: m.initials(),
            name: m.name.clone(),
            color: m.color_tag.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let mut store = open_store()?;
    let id = store
        .add_team_member(&args.name)
        .context("failed to add team member")?;
    report_persistence(&store);

    println!("{} Added '{}' ({})", "✓".green(), args.name.trim(), id);
    Ok(())
}
