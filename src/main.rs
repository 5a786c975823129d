//! Batch consolidation driver.
//!
//! Control flow: load sources (the only concurrent stage) -> validate ->
//! merge -> safety scan -> write artifacts. Every stage after acquisition is
//! a pure function of the collected record list, so a run's artifacts depend
//! only on source content and configuration, never on fetch timing.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod local;
mod merge;
mod record;
mod remote;
mod report;
mod safety;
mod util;
mod validate;

use config::BuildConfig;
use report::RunSummary;

#[derive(Parser, Debug)]
#[command(
    name = "codex-sync",
    version,
    about = "Multi-source codex dataset consolidation engine",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consolidate all configured sources into one canonical dataset
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the build configuration JSON
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Output directory for the build artifacts
    #[arg(long, value_name = "DIR")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(&args),
    }
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    // Configuration problems are the only fatal class; resolve them all
    // before touching the output directory.
    let config = BuildConfig::load(&args.config)?;
    let blocklist = config.compile_blocklist()?;
    let token = config::read_token();

    let mut raw = Vec::new();
    if let Some(local) = &config.local {
        raw.extend(local::load_local(local));
    }
    if let Some(remote) = &config.remote {
        raw.extend(remote::load_remote(
            remote,
            token.as_deref(),
            config.concurrency,
            Duration::from_secs(config.request_timeout_secs),
        ));
    }
    let input_count = raw.len();

    let (valid, errors) = validate::validate(raw);
    let outcome = merge::merge(&valid);
    let findings = safety::scan(&outcome.records, &blocklist);

    report::write_artifacts(
        &args.out,
        &RunSummary {
            input_count,
            outcome: &outcome,
            findings: &findings,
            errors: &errors,
        },
    )?;

    println!(
        "{} built: {} identities from {} inputs; {} conflicts, {} validation errors, {} safety findings.",
        report::DATASET_FILE,
        outcome.records.len(),
        input_count,
        outcome.conflicts.len(),
        errors.len(),
        findings.len(),
    );
    Ok(())
}
