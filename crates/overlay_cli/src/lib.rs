//! The overlay's command-line entry point: one subcommand per role
//! (`broker`, `publisher`, `subscriber`, `backup-pool`, `load-balancer`).

use clap::Parser;

mod cli;
pub(crate) use crate::cli::Args;
pub(crate) mod commands;
pub mod result;

pub async fn run() -> result::Result<()> {
    let args = Args::parse();
    commands::exec(args).await
}
