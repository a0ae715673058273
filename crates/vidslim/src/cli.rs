//! Command-line surface.
//!
//! `run` keeps every loop in one process; the per-worker subcommands
//! mirror the one-process-per-worker deployment where each loop runs
//! (and restarts) independently against the shared store file.

use clap::{Parser, Subcommand};
use vidslim_workers::Config;

#[derive(Parser, Debug)]
#[command(name = "vidslim", about = "AI-assisted video compression pipeline", version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run every worker loop in one process (default)
    Run,
    /// Run only the directory scanner
    Scan,
    /// Run only the auto-approver
    Approve,
    /// Run only the command synthesizer
    Synthesize,
    /// Run only the transcoder
    Transcode,
    /// Run only the file mover
    Move,
    /// Print queue counts and reclaimed bytes
    Status,
}
