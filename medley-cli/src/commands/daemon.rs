//! `medley daemon`: daemon process lifecycle and logs.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Subcommand};
use colored::Colorize;

use medley_daemon::paths::{logs_dir, stderr_log_path, stdout_log_path};
use medley_daemon::{start_blocking, DaemonError, DaemonOptions, SyncClient};

use super::{home, socket_or_default, CLIENT_NAME};

/// How long `--detach` waits for the daemon to answer.
const DETACH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground, or in the background with --detach.
    Start(StartArgs),
    /// Ask the running daemon to shut down.
    Stop,
    /// Report whether the daemon is running.
    Status,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Raise log verbosity (repeatable).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable logging.
    #[arg(short = 'n', long)]
    pub no_log: bool,

    /// Output plugin to use instead of `output.plugin`.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Directory with shared-object plugins.
    #[arg(short = 'p', long)]
    pub plugin_dir: Option<PathBuf>,

    /// Write log lines as JSON.
    #[arg(long)]
    pub json_logs: bool,

    /// Start in the background and return once the daemon answers.
    #[arg(short, long)]
    pub detach: bool,
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand, socket: Option<PathBuf>) -> Result<()> {
    let home = home()?;

    match command {
        DaemonCommand::Start(args) if args.detach => {
            detach(&home, &args, &socket_or_default(socket)?)?;
        }
        DaemonCommand::Start(args) => {
            let options = DaemonOptions {
                verbosity: args.verbose,
                no_log: args.no_log,
                json_logs: args.json_logs,
                output: args.output,
                plugin_dir: args.plugin_dir,
                socket,
            };
            start_blocking(&home, options).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => {
            let socket = socket_or_default(socket)?;
            match SyncClient::connect(&socket, CLIENT_NAME) {
                Ok(mut client) => {
                    client.quit().context("failed to stop daemon")?;
                    println!("daemon stop requested");
                }
                Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
                Err(err) => return Err(err).context("failed to stop daemon"),
            }
        }
        DaemonCommand::Status => {
            let socket = socket_or_default(socket)?;
            match SyncClient::connect(&socket, CLIENT_NAME) {
                Ok(mut client) => {
                    let stats = client.stats().context("failed to query daemon stats")?;
                    println!(
                        "{} (version {}, up {}s, socket {})",
                        "running".green(),
                        stats.version,
                        stats.uptime,
                        socket.display()
                    );
                }
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    println!("{} (socket {})", "not running".yellow(), socket.display());
                }
                Err(err) => return Err(err).context("failed to query daemon status"),
            }
        }
        DaemonCommand::Logs(args) => {
            if args.stderr_only {
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            } else {
                print_tail(&stdout_log_path(&home), args.lines)
                    .context("failed to read daemon stdout log")?;
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            }
        }
    }

    Ok(())
}

/// Re-run ourselves as `daemon start` with output going to the log files.
///
/// The child listens on `socket`, the same path we wait on.
fn detach(home: &Path, args: &StartArgs, socket: &Path) -> Result<()> {
    let logs = logs_dir(home);
    std::fs::create_dir_all(&logs).with_context(|| format!("create {}", logs.display()))?;
    let open_log = |path: PathBuf| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))
    };

    let exe = std::env::current_exe().context("could not locate medley executable")?;
    let mut command = Command::new(exe);
    command.args(["daemon", "start", "--json-logs"]);
    command.arg("--socket").arg(socket);
    if args.verbose > 0 {
        command.arg(format!("-{}", "v".repeat(usize::from(args.verbose))));
    }
    if args.no_log {
        command.arg("--no-log");
    }
    if let Some(output) = &args.output {
        command.args(["--output", output]);
    }
    if let Some(dir) = &args.plugin_dir {
        command.arg("--plugin-dir").arg(dir);
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(open_log(stdout_log_path(home))?)
        .stderr(open_log(stderr_log_path(home))?)
        .spawn()
        .context("failed to spawn daemon")?;

    let deadline = Instant::now() + DETACH_TIMEOUT;
    loop {
        if let Some(status) = child.try_wait().context("failed to wait for daemon")? {
            bail!(
                "daemon exited during startup ({status}); see `medley daemon logs --stderr-only`"
            );
        }
        match SyncClient::connect(socket, CLIENT_NAME) {
            Ok(_) => {
                println!("daemon started (pid {})", child.id());
                return Ok(());
            }
            Err(DaemonError::DaemonNotRunning { .. }) if Instant::now() < deadline => {
                sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err).context("daemon did not answer"),
        }
    }
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        tail.push_back(line);
        if tail.len() > lines {
            tail.pop_front();
        }
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
