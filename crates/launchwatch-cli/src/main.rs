//! launchwatch - run a launcher and game pipeline from the command line.
//!
//! Settings come from a JSON file (see `launchwatch init`); the run logs to
//! stderr and can print its report as JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use launchwatch_core::orchestrator::{
    Collaborators, LaunchOrchestrator, LaunchPlan, LogPresenter, Presenter,
};
use launchwatch_core::{decode_affinity_expression, CoreTopology, Settings, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "launchwatch")]
#[command(about = "Start a game launcher and game, watch them, and clean up afterwards")]
#[command(version)]
struct Args {
    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the configured pipeline (default)
    Run {
        /// Print the run report as JSON when done
        #[arg(long)]
        json: bool,
    },
    /// Write a settings file with every field at its default
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Decode an affinity expression and print its cores and mask
    Affinity {
        /// Core list, preset (DualCore, QuadCore, DisableHT), decimal or 0x hex
        expression: String,
    },
}

fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

fn settings_store(path: Option<PathBuf>) -> Result<SettingsStore> {
    match path {
        Some(path) => Ok(SettingsStore::new(path)),
        None => SettingsStore::at_default_location().context("locating settings file"),
    }
}

async fn run(store: &SettingsStore, json: bool) -> Result<()> {
    let loaded = store
        .load()
        .with_context(|| format!("loading {}", store.path().display()))?;
    if loaded.created {
        warn!(
            "No settings file at {}; run `launchwatch init` to create one",
            store.path().display()
        );
    }
    for issue in &loaded.issues {
        warn!("{} = {} ignored: {}", issue.field, issue.value, issue.message);
    }

    let plan = LaunchPlan::from_settings(&loaded.settings);
    let presenter = Arc::new(LogPresenter);
    let orchestrator = LaunchOrchestrator::new(plan, Collaborators::system(presenter.clone()));

    let report = tokio::select! {
        result = orchestrator.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, stopping monitors");
            presenter.release();
            return Ok(());
        }
    };

    if json {
        // Intentional stdout: the report is the command's output.
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn init(store: &SettingsStore, force: bool) -> Result<()> {
    if store.path().exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            store.path().display()
        );
    }
    store.save(&Settings::default())?;
    println!("{}", store.path().display());
    Ok(())
}

fn affinity(expression: &str) -> Result<()> {
    let topology = CoreTopology::detect();
    let (mask, ok) = decode_affinity_expression(expression, topology);
    if !ok {
        bail!("'{}' is not a valid affinity expression", expression);
    }
    println!("cores: {}", mask);
    println!("mask:  {}", mask.to_hex());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    match args.command.unwrap_or(Command::Run { json: false }) {
        Command::Run { json } => {
            info!("Starting launchwatch {}", env!("CARGO_PKG_VERSION"));
            run(&settings_store(args.settings)?, json).await
        }
        Command::Init { force } => init(&settings_store(args.settings)?, force),
        Command::Affinity { expression } => affinity(&expression),
    }
}
