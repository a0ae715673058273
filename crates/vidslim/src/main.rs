//! vidslim: AI-assisted video compression pipeline.
//!
//! Usage:
//!     vidslim                 # run every worker loop
//!     vidslim transcode       # run a single loop
//!     vidslim status          # queue overview

mod cli;
mod status;
mod supervisor;

use clap::Parser;

use cli::{Cli, Command};
use supervisor::{Role, ALL_ROLES};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Keep the flush guard alive until the process exits so buffered
    // file-log events reach disk.
    let _log_guard = vidslim_logging::init("vidslim", cli.config.log_dir.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => supervisor::run(&cli.config, &ALL_ROLES).await,
        Command::Scan => supervisor::run(&cli.config, &[Role::Scanner]).await,
        Command::Approve => supervisor::run(&cli.config, &[Role::Approver]).await,
        Command::Synthesize => supervisor::run(&cli.config, &[Role::Synthesizer]).await,
        Command::Transcode => supervisor::run(&cli.config, &[Role::Transcoder]).await,
        Command::Move => supervisor::run(&cli.config, &[Role::Mover]).await,
        Command::Status => status::print(&cli.config).await,
    }
}
