/*!
rewind CLI - Command-line interface for the rewind rollback engine.

Provides the `undo` entry point that restores a processed library to its
pre-run state, plus utilities for inspecting and verifying a pending
journal before committing to a rollback.
*/

use anyhow::Context;
use clap::{Parser, Subcommand};
use rewind_core::{
    journal::read_records, undo_run, BackupStore, DirBackupStore, OpKind, RunLayout, UndoOutcome,
};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use tracing::info;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "Journal-based rollback for library processing runs")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll back the most recent run over a library root
    Undo {
        /// Root of the processed directory tree
        root: PathBuf,
    },
    /// Show the pending journal for a library root
    Status {
        /// Root of the processed directory tree
        root: PathBuf,
    },
    /// Check that every recorded pre-image is present and intact
    Verify {
        /// Root of the processed directory tree
        root: PathBuf,
    },
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Seq")]
    sequence: u64,
    #[tabled(rename = "Op")]
    op: &'static str,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Backup")]
    backup: String,
    #[tabled(rename = "Recorded")]
    recorded: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Undo { root } => undo(&root),
        Commands::Status { root } => status(&root),
        Commands::Verify { root } => verify(&root),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn undo(root: &Path) -> Result<(), anyhow::Error> {
    let layout = RunLayout::new(root).context("cannot resolve library root")?;

    match undo_run(&layout)? {
        UndoOutcome::NothingToUndo => {
            println!("Nothing to undo for {}", layout.root().display());
            Ok(())
        }
        UndoOutcome::Succeeded { entries_undone } => {
            println!(
                "✓ Restored {} to its pre-run state ({} entries undone)",
                layout.root().display(),
                entries_undone
            );
            Ok(())
        }
        UndoOutcome::PartiallyFailed(report) => {
            eprintln!(
                "✗ Undo partially failed: {} restored, {} failed",
                report.entries_undone,
                report.failures.len()
            );
            for failure in &report.failures {
                eprintln!("  [{}] {}: {}", failure.sequence, failure.path.display(), failure.reason);
            }
            eprintln!("Journal and backups were kept; fix the causes above and retry.");
            std::process::exit(1);
        }
    }
}

fn status(root: &Path) -> Result<(), anyhow::Error> {
    let layout = RunLayout::new(root).context("cannot resolve library root")?;
    let journal_path = layout.journal_path();

    if !journal_path.exists() {
        println!("No pending journal for {}", layout.root().display());
        return Ok(());
    }

    let contents = read_records(&journal_path)?;
    if let Some(header) = &contents.header {
        println!("Run {}", header.run_id);
        println!("  Root:    {}", header.root.display());
        println!("  Started: {}", header.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Entries: {}", contents.entries.len());

    if contents.entries.is_empty() {
        return Ok(());
    }

    let rows: Vec<EntryRow> = contents
        .entries
        .iter()
        .map(|entry| EntryRow {
            sequence: entry.sequence,
            op: match entry.kind {
                OpKind::Create => "create",
                OpKind::Modify => "modify",
            },
            target: entry.target_path.display().to_string(),
            backup: entry
                .backup_ref
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            recorded: entry.timestamp.format("%H:%M:%S%.3f").to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));

    Ok(())
}

fn verify(root: &Path) -> Result<(), anyhow::Error> {
    let layout = RunLayout::new(root).context("cannot resolve library root")?;
    let journal_path = layout.journal_path();

    if !journal_path.exists() {
        println!("No pending journal for {}", layout.root().display());
        return Ok(());
    }

    let contents = read_records(&journal_path)?;
    let backups = DirBackupStore::new(layout.backup_dir());

    let mut problems = 0usize;
    let mut checked = 0usize;
    for entry in &contents.entries {
        let Some(backup_ref) = entry.backup_ref else {
            continue;
        };
        checked += 1;

        match backups.fetch(backup_ref) {
            Ok(bytes) => {
                if let Err(e) = entry.verify_integrity(&bytes) {
                    eprintln!("✗ [{}] {}: {}", entry.sequence, entry.target_path.display(), e);
                    problems += 1;
                }
            }
            Err(e) => {
                eprintln!("✗ [{}] {}: {}", entry.sequence, entry.target_path.display(), e);
                problems += 1;
            }
        }
    }

    info!(checked, problems, "verify pass finished");
    if problems > 0 {
        anyhow::bail!("{problems} of {checked} backups are missing or corrupt");
    }
    println!("✓ All {checked} recorded pre-images are present and intact");
    Ok(())
}
