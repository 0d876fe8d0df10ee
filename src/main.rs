//! # Keepsake command-line entry point
//!
//! ```bash
//! keepsake preserve --catalog Conservation
//! keepsake preserve --catalog Conservation --update
//! keepsake validate --catalog Conservation --tier full
//! keepsake run
//! ```
//!
//! Logging goes to stderr and to rotating files under `--log-dir` (see
//! [`keepsake::logging`]); set `RUST_LOG=keepsake=debug` for per-object detail.

#![expect(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    if let Err(e) = keepsake::logging::init(cli.log_dir.as_deref()) {
        eprintln!("Warning: file logging unavailable: {e:#}");
    }

    cli::run_command(cli)
}
