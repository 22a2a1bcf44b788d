use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};

use medley_core::{ConfigStore, MediaLib};
use medley_plugins::PluginRegistry;

use crate::error::{io_err, DaemonError};
use crate::paths;
use crate::protocol::{DaemonResponse, Request};
use crate::scripts;
use crate::server::{
    self, After, MediaServer, CORE_IPCSOCKET, CORE_SHUTDOWNPATH, CORE_STARTUPPATH, OUTPUT_PLUGIN,
};

type SharedServer = Arc<Mutex<MediaServer>>;

/// Command-line options of `medley daemon start`.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    /// Each step raises the default log level: info, debug, trace.
    pub verbosity: u8,
    pub no_log: bool,
    /// Log lines as JSON, used when output goes to the log files.
    pub json_logs: bool,
    /// Output plugin overriding `output.plugin`.
    pub output: Option<String>,
    /// Directory scanned for shared-object plugins instead of `~/.medley/plugins`.
    pub plugin_dir: Option<PathBuf>,
    /// Socket to listen on instead of `core.ipcsocket`. Not written to config.
    pub socket: Option<PathBuf>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, options: DaemonOptions) -> Result<(), DaemonError> {
    init_tracing(&options);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), options))
}

/// Run the daemon until `quit`, ctrl-c or SIGTERM, then save state and clean up.
pub async fn run(home: PathBuf, options: DaemonOptions) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let server = bootstrap(&home, &options)?;

    let socket = listen_socket(&server, &options);
    let startup_dir = server.config_path_value(CORE_STARTUPPATH);
    let shutdown_dir = server.config_path_value(CORE_SHUTDOWNPATH);

    prepare_socket_for_bind(&socket)?;
    if let Some(parent) = socket.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    let started = scripts::spawn_all(&startup_dir, &socket, &home);
    tracing::debug!(count = started.len(), "startup scripts launched");

    let server: SharedServer = Arc::new(Mutex::new(server));
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    // Every receiver exists before any task can send.
    let socket_rx = shutdown_tx.subscribe();
    let rotation_rx = shutdown_tx.subscribe();
    let signal_rx = shutdown_tx.subscribe();

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let server = server.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(listener, socket, server, shutdown.clone(), socket_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, rotation_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move { signal_task(shutdown, signal_rx).await })
    };

    let (socket_result, rotation_result, signal_result) =
        tokio::join!(socket_handle, rotation_handle, signal_handle);

    let cleanup = {
        let server = server.clone();
        let socket = socket.clone();
        let home = home.clone();
        tokio::task::spawn_blocking(move || {
            tracing::info!("shutting down");
            scripts::run_all(&shutdown_dir, &socket, &home);
            server.blocking_lock().shutdown();
        })
    };
    let cleanup_result = cleanup
        .await
        .map_err(|e| DaemonError::Protocol(format!("shutdown task join failure: {e}")));
    remove_socket(&socket);

    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    cleanup_result
}

fn listen_socket(server: &MediaServer, options: &DaemonOptions) -> PathBuf {
    options
        .socket
        .clone()
        .unwrap_or_else(|| server.config_path_value(CORE_IPCSOCKET))
}

/// Load config, plugins and the media library and pick the output.
fn bootstrap(home: &Path, options: &DaemonOptions) -> Result<MediaServer, DaemonError> {
    let mut config = ConfigStore::load_at(&paths::config_path(home))?;
    server::register_core_config(&mut config, home);
    if let Some(output) = &options.output {
        config.set(OUTPUT_PLUGIN, output)?;
    }

    let plugin_dir = options
        .plugin_dir
        .clone()
        .unwrap_or_else(|| paths::plugins_dir(home));
    let mut plugins = PluginRegistry::new();
    plugins.init(&plugin_dir);

    let medialib = MediaLib::load_at(&paths::medialib_path(home))?;
    tracing::info!(entries = medialib.len(), "media library loaded");
    MediaServer::new(home.to_path_buf(), config, plugins, medialib)
}

async fn socket_server_task(
    listener: UnixListener,
    socket: PathBuf,
    server: SharedServer,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let server = server.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, server, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    server: SharedServer,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request: {err}")),
                )
                .await?;
                continue;
            }
        };
        let cmd = request.name();
        tracing::debug!(cmd, "request");

        let (response, after) = match dispatch(&server, request).await {
            Ok((data, after)) => (DaemonResponse::ok(data), after),
            Err(err) => {
                tracing::debug!(cmd, error = %err, "request failed");
                (DaemonResponse::error(err.to_string()), After::Continue)
            }
        };
        write_response(&mut writer, &response).await?;
        if after == After::Shutdown {
            let _ = shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

/// Requests touch files and plugins, so they run on the blocking pool.
async fn dispatch(server: &SharedServer, request: Request) -> Result<(Value, After), DaemonError> {
    let server = server.clone();
    tokio::task::spawn_blocking(move || server.blocking_lock().handle(request))
        .await
        .map_err(|e| DaemonError::Protocol(format!("request task join failure: {e}")))?
}

async fn signal_task(
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| DaemonError::Protocol(format!("SIGTERM handler failed: {e}")))?;
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down daemon");
            let _ = shutdown.send(());
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::info!("received ctrl-c, shutting down daemon");
                    let _ = shutdown.send(());
                    Ok(())
                }
                Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
            }
        }
    }
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // Failures are logged inside rotate_logs.
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&home))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn remove_socket(socket: &Path) {
    match fs::remove_file(socket) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(socket = %socket.display(), error = %err, "could not remove socket"),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [
        paths::logs_dir(home),
        paths::startup_dir(home),
        paths::shutdown_dir(home),
    ] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn init_tracing(options: &DaemonOptions) {
    use tracing_subscriber::{fmt, EnvFilter};

    if options.no_log {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(options.verbosity)));
    let _ = if options.json_logs {
        fmt().json().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener as StdUnixListener;
    use tempfile::TempDir;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_level(0), "info");
        assert_eq!(default_level(1), "debug");
        assert_eq!(default_level(5), "trace");
    }

    #[test]
    fn stale_socket_is_removed() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("medley.sock");
        drop(StdUnixListener::bind(&socket).unwrap());
        assert!(socket.exists());

        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }

    #[test]
    fn live_socket_is_refused() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("medley.sock");
        let _listener = StdUnixListener::bind(&socket).unwrap();

        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn bootstrap_rejects_unknown_output() {
        let tmp = TempDir::new().unwrap();
        ensure_runtime_dirs(tmp.path()).unwrap();
        let options = DaemonOptions {
            output: Some("jack".into()),
            ..Default::default()
        };
        let err = match bootstrap(tmp.path(), &options) {
            Err(err) => err,
            Ok(_) => panic!("unknown output must be fatal"),
        };
        assert!(matches!(err, DaemonError::UnknownOutput(ref n) if n == "jack"));
    }

    #[test]
    fn socket_option_overrides_config() {
        let tmp = TempDir::new().unwrap();
        ensure_runtime_dirs(tmp.path()).unwrap();
        let server = bootstrap(tmp.path(), &DaemonOptions::default()).unwrap();
        assert_eq!(
            listen_socket(&server, &DaemonOptions::default()),
            paths::socket_path(tmp.path())
        );

        let options = DaemonOptions {
            socket: Some(tmp.path().join("elsewhere.sock")),
            ..Default::default()
        };
        assert_eq!(
            listen_socket(&server, &options),
            tmp.path().join("elsewhere.sock")
        );
        assert_eq!(
            server.config().lookup(CORE_IPCSOCKET),
            Some(paths::socket_path(tmp.path()).to_str().unwrap())
        );
    }

    #[test]
    fn shutdown_sent_before_tasks_run_is_seen() {
        tokio_test::block_on(async {
            let tmp = TempDir::new().unwrap();
            let (tx, _) = broadcast::channel::<()>(16);
            let rx = tx.subscribe();
            tx.send(()).unwrap();
            log_rotation_task(tmp.path().to_path_buf(), rx).await.unwrap();
        });
    }

    #[test]
    fn runtime_dirs_are_created() {
        let tmp = TempDir::new().unwrap();
        ensure_runtime_dirs(tmp.path()).unwrap();
        assert!(paths::logs_dir(tmp.path()).is_dir());
        assert!(paths::startup_dir(tmp.path()).is_dir());
        assert!(paths::shutdown_dir(tmp.path()).is_dir());
    }

    #[test]
    fn response_is_one_line() {
        tokio_test::block_on(async {
            let (a, b) = UnixStream::pair().unwrap();
            let (_, mut writer) = a.into_split();
            write_response(&mut writer, &DaemonResponse::error("boom"))
                .await
                .unwrap();
            drop(writer);
            let mut lines = BufReader::new(b).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, r#"{"ok":false,"error":"boom"}"#);
        });
    }
}
