//! Medley: command line client for the medley media daemon.
//!
//! # Usage
//!
//! ```text
//! medley info [pattern…]
//! medley server import [--non-recursive] <path>…
//! medley server browse <url>
//! medley server remove <pattern>…
//! medley server rehash [pattern…]
//! medley server config [name [value]]
//! medley server property [--delete] [--int|--string] [--source s] <id> [name [value]]
//! medley server plugins | stats | sync | shutdown
//! medley server volume [--channel c] [volume]
//! medley daemon start|stop|status|logs
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, info::InfoArgs, server::ServerCommand};

#[derive(Parser, Debug)]
#[command(
    name = "medley",
    version,
    about = "Control the medley media daemon",
    long_about = None,
)]
struct Cli {
    /// Daemon socket (default: ~/.medley/medley.sock).
    #[arg(long, global = true, env = "MEDLEY_PATH")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print all properties of matching media library entries.
    Info(InfoArgs),

    /// Manage the media library and daemon settings.
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },

    /// Start, stop and inspect the daemon process.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket;
    match cli.command {
        Commands::Info(args) => args.run(socket),
        Commands::Server { command } => commands::server::run(command, socket),
        Commands::Daemon { command } => commands::daemon::run(command, socket),
    }
}
