use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::archiver::config::{load_config, resolve_config_path};
use crate::archiver::paths::{ArchivePaths, resolve_workdir};
use crate::commands::{self, CommandContext, CommandReport};
use crate::error::ArchiveErrorCode;
use crate::logging::{self, LogConfig};

#[derive(Debug, Parser)]
#[command(
    name = "simarchive",
    version,
    about = "Archive simulation output from a run directory to remote storage"
)]
struct Cli {
    /// Simulation run directory (defaults to SIMARCHIVE_WORKDIR, then the current directory)
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Archive new output, polling until stopped
    Watch {
        /// Remote base directory; items land under <REMOTE_BASE>/<workdir name>/
        remote_base: String,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Show what the next cycle would archive
    Scan,
    /// Report lock, daemon and ledger state
    Status,
    /// Stop the archiver recorded in the lock file
    Stop,
}

fn build_context(workdir: Option<PathBuf>) -> Result<CommandContext> {
    let workdir = resolve_workdir(workdir.as_deref())?;
    let cfg = load_config(&workdir)
        .with_context(|| ArchiveErrorCode::E002ConfigInvalid.as_str().to_string())?;
    let paths = ArchivePaths::new(&workdir, &cfg);
    Ok(CommandContext {
        config_path: resolve_config_path(&workdir),
        workdir,
        cfg,
        paths,
    })
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("command={}", report.command);
    println!("ok={}", report.ok);
    for detail in &report.details {
        println!("{detail}");
    }
    for issue in &report.issues {
        println!("issue={issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let ctx = build_context(cli.workdir)?;
    logging::init(LogConfig {
        debug: cli.verbose || ctx.cfg.watcher.debug,
        json_report: cli.json,
    });

    let report = match cli.command {
        Command::Watch { remote_base, once } => commands::watch::run(
            &ctx,
            &commands::watch::WatchOptions { remote_base, once },
        )?,
        Command::Scan => commands::scan::run(&ctx)?,
        Command::Status => commands::status::run(&ctx)?,
        Command::Stop => commands::stop::run(&ctx)?,
    };

    render(&report, cli.json)?;
    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}
