// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use convergefs::db::paths::{hashdb_path, statsdb_path};
use convergefs::hashdb::HashDb;
use convergefs::statsdb::StatsDb;
use convergefs::{combined_outcome, evaluate, EngineContext, Promise};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn load_promise(path: &Path) -> Result<Promise> {
    let text = fs::read_to_string(path).with_context(|| format!("reading promise file {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text).context("parsing promise JSON"),
        _ => toml::from_str(&text).context("parsing promise TOML"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    fs::create_dir_all(&cli.state_dir).with_context(|| format!("creating state dir {}", cli.state_dir.display()))?;

    let hashdb = HashDb::open(hashdb_path(&cli.state_dir.to_string_lossy()))?;
    let statsdb = StatsDb::open(statsdb_path(&cli.state_dir.to_string_lossy()))?;
    let ctx = EngineContext::new(hashdb, statsdb);

    let (promise_file, force_warn) = match &cli.command {
        Command::Apply { promise_file } => (promise_file.clone(), false),
        Command::DryRun { promise_file } => (promise_file.clone(), true),
    };

    let mut promise = load_promise(&promise_file)?;
    if force_warn {
        promise.attrs.action = convergefs::Action::Warn;
    }

    let reports = evaluate(&promise, &ctx)?;
    for report in &reports {
        println!("{report}");
    }

    let outcome = combined_outcome(&reports);
    println!("overall: {outcome}");

    if outcome.is_problem() {
        std::process::exit(1);
    }
    Ok(())
}
