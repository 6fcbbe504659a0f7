//! LegalFlow: shared task sheets for a legal team.
//!
//! # Usage
//!
//! ```text
//! legalflow sheet list | add <name> | copy <sheet> | delete <sheet> [--yes] | use <sheet>
//! legalflow task list [--sheet <sheet>] [--search <text>] [--assignee <id>] [--sort <field>] [--desc] [--json]
//! legalflow task add | update <task> | toggle <task> <member> | delete <task> [--yes]
//! legalflow team list | add <name>
//! legalflow sync enable | join <code> | disable | status [--json] | push | pull | run [--remote-url <url>]
//! ```

mod commands;
mod remote;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{sheet::SheetCommand, sync::SyncArgs, task::TaskCommand, team::TeamCommand};
use legalflow_core::{SortField, TaskStatus};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "legalflow",
    version,
    about = "Track legal practice tasks across shared sheets",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage sheets (tabs).
    Sheet {
        #[command(subcommand)]
        command: SheetCommand,
    },

    /// Manage tasks in a sheet.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Manage the team roster.
    Team {
        #[command(subcommand)]
        command: TeamCommand,
    },

    /// Cloud sync through a shared team code.
    Sync(SyncArgs),
}

// ---------------------------------------------------------------------------
// Shared argument types
// ---------------------------------------------------------------------------

/// Task status parsed from CLI strings (`in-corso`, `completato`, `in-attesa`).
#[derive(Debug, Clone, Copy)]
pub struct TaskStatusArg(pub TaskStatus);

impl FromStr for TaskStatusArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.label().to_lowercase() == normalized)
            .map(Self)
            .ok_or_else(|| {
                format!("unknown status '{s}'; expected: in-corso, completato, in-attesa")
            })
    }
}

impl fmt::Display for TaskStatusArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sort column for `task list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortFieldArg(pub SortField);

impl FromStr for SortFieldArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pratica" => Ok(Self(SortField::Pratica)),
            "scadenza" => Ok(Self(SortField::Scadenza)),
            "assegnatario" | "assegnatari" => Ok(Self(SortField::Assegnatario)),
            other => Err(format!(
                "unknown sort field '{other}'; expected: pratica, scadenza, assegnatario"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let long_running = matches!(&cli.command, Commands::Sync(args) if args.is_long_running());
    init_tracing(if long_running { "info" } else { "warn" });

    match cli.command {
        Commands::Sheet { command } => commands::sheet::run(command),
        Commands::Task { command } => commands::task::run(command),
        Commands::Team { command } => commands::team::run(command),
        Commands::Sync(args) => args.run(),
    }
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_arg_accepts_labels_and_slugs() {
        assert_eq!("in-corso".parse::<TaskStatusArg>().unwrap().0, TaskStatus::InCorso);
        assert_eq!("Completato".parse::<TaskStatusArg>().unwrap().0, TaskStatus::Completato);
        assert_eq!("in attesa".parse::<TaskStatusArg>().unwrap().0, TaskStatus::InAttesa);
        assert!("done".parse::<TaskStatusArg>().is_err());
    }

    #[test]
    fn sort_arg_parses_known_fields() {
        assert_eq!("Scadenza".parse::<SortFieldArg>().unwrap().0, SortField::Scadenza);
        assert!("nome".parse::<SortFieldArg>().is_err());
    }
}
