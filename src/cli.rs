// src/cli.rs

//! Command-line surface. Parses one subcommand, loads a promise file, and
//! hands it to [`crate::dispatcher::evaluate`] — the CLI itself carries no
//! promise-language logic, only enough structure to drive
//! the engine for a single manual run or an integration test.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "convergefs", version, about = "Convergent file-promise engine")]
pub struct Cli {
    /// Directory holding hashdb.sqlite / statsdb.sqlite. Created if missing.
    #[arg(long, global = true, default_value = "/var/lib/convergefs")]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a single promise described in a TOML or JSON file.
    Apply {
        /// Path to a promise file (see `src/promise.rs::Promise`).
        promise_file: PathBuf,
    },
    /// Evaluate a promise but only report divergence, mutating nothing
    /// (equivalent to forcing `transaction.action = warn`).
    DryRun {
        promise_file: PathBuf,
    },
}
