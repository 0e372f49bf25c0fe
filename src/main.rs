use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roam2md::doctor::{check_graph, print_check_report};
use roam2md::pipeline::MigrationReport;
use roam2md::{
    Config, ConfigError, OrgRoamDatabase, SourceError, StructureError, VaultWriter, convert,
    logging, write_report,
};

/// roam2md - migrate an org-roam graph into a Markdown vault
#[derive(Parser)]
#[command(name = "roam2md")]
#[command(about = "Convert an org-roam database into an Obsidian-style Markdown vault")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Convert every note into the destination vault
    Convert(ConvertCommand),
    /// Report problems in the source graph without converting
    Check(CheckCommand),
}

#[derive(Parser)]
struct ConvertCommand {
    /// Path to org-roam.db
    #[arg(short, long, value_name = "DB")]
    source: PathBuf,

    /// Vault root directory
    #[arg(short, long, value_name = "DIR")]
    destination: PathBuf,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Convert and report without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Human-readable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write a JSON report of the run to FILE
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Exit with an error if any note failed to convert
    #[arg(long)]
    strict: bool,
}

#[derive(Parser)]
struct CheckCommand {
    /// Path to org-roam.db
    #[arg(short, long, value_name = "DB")]
    source: PathBuf,

    /// Human-readable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Raised by `--strict` when some notes failed.
#[derive(Debug, thiserror::Error)]
#[error("{0} note(s) failed to convert")]
struct StrictFailure(usize);

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Convert(cmd) => cmd.verbose,
        Commands::Check(cmd) => cmd.verbose,
    };
    logging::init(verbose);

    let result = match &cli.command {
        Commands::Convert(cmd) => handle_convert(cmd),
        Commands::Check(cmd) => handle_check(cmd),
    };

    if let Err(e) = result {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are problems the user can fix by changing arguments or
/// configuration: a missing database, an unreadable config, a base path
/// that does not contain the notes. Everything else is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<SourceError>()
            || cause.is::<ConfigError>()
            || cause.is::<StructureError>()
            || cause.is::<StrictFailure>()
    })
}

/// Handles the convert command.
fn handle_convert(cmd: &ConvertCommand) -> Result<()> {
    let config = Config::load(cmd.config.as_deref())?;
    let db = OrgRoamDatabase::open(&cmd.source)?;
    let notes = db.read_notes().context("Failed to read org-roam notes")?;

    let converter = convert::build(&config.converter);
    let mut outcome = roam2md::run(&notes, &config, converter)?;
    outcome.report.dry_run = cmd.dry_run;

    let summary = VaultWriter::new(&cmd.destination, cmd.dry_run)
        .write(&outcome)
        .context("Failed to write vault")?;

    if let Some(path) = &cmd.report {
        write_report(&outcome.report, path)?;
    }

    print_summary(&outcome.report, &cmd.destination, summary.documents);
    for missing in &summary.missing_attachments {
        println!("  missing attachment: {}", missing.display());
    }

    let failed = outcome.report.failures.len();
    if cmd.strict && failed > 0 {
        return Err(StrictFailure(failed).into());
    }
    Ok(())
}

/// Handles the check command.
fn handle_check(cmd: &CheckCommand) -> Result<()> {
    let db = OrgRoamDatabase::open(&cmd.source)?;
    let report = check_graph(&db)?;
    print_check_report(&report);
    Ok(())
}

fn print_summary(report: &MigrationReport, destination: &Path, documents: usize) {
    let verb = if report.dry_run { "Would write" } else { "Wrote" };
    println!("{verb} {documents} note(s) to {}", destination.display());
    if !report.collisions.is_empty() {
        println!("  {} path collision(s) disambiguated", report.collisions.len());
    }
    if !report.unresolved_links.is_empty() {
        println!("  {} unresolved link(s) kept as text", report.unresolved_links.len());
    }
    if !report.failures.is_empty() {
        println!("  {} note(s) failed:", report.failures.len());
        for failure in &report.failures {
            println!("    {}: {}", failure.note_id, failure.reason);
        }
    }
}
