// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use h2::attach::{self, AttachArgs};
use h2::config::Config;
use h2::send_raw::{self, SendRawArgs};

#[derive(Parser)]
#[command(name = "h2", version, about = "Per-agent session daemon for interactive AI coding agents.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Attach an interactive terminal to a running agent.
    Attach(AttachArgs),
    /// One-shot raw-input injection against a running agent.
    SendRaw(SendRawArgs),
    /// Hidden re-exec target: runs the long-lived daemon body.
    #[command(name = "_daemon", hide = true)]
    Daemon,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.subcommand {
        Some(Commands::Attach(args)) => {
            std::process::exit(attach::run(args, cli.config.h2_dir()).await);
        }
        Some(Commands::SendRaw(args)) => {
            std::process::exit(send_raw::run(args, cli.config.h2_dir()).await);
        }
        Some(Commands::Daemon) => match h2::daemon::run_daemon(cli.config).await {
            Ok(status) => std::process::exit(status.code.unwrap_or(1)),
            Err(e) => {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        },
        None => {
            if let Err(e) = h2::daemon::launch(cli.config).await {
                eprintln!("error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
