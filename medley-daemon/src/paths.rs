use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "medley.sock";
pub const CONFIG_FILE: &str = "medley.conf";
pub const DAEMON_STDOUT_LOG: &str = "medleyd.log";
pub const DAEMON_STDERR_LOG: &str = "medleyd-err.log";

pub fn medley_root(home: &Path) -> PathBuf {
    home.join(".medley")
}

pub fn config_path(home: &Path) -> PathBuf {
    medley_root(home).join(CONFIG_FILE)
}

pub fn medialib_path(home: &Path) -> PathBuf {
    medley_core::medialib::medialib_path_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    medley_root(home).join(DAEMON_SOCKET)
}

pub fn plugins_dir(home: &Path) -> PathBuf {
    medley_root(home).join("plugins")
}

pub fn startup_dir(home: &Path) -> PathBuf {
    medley_root(home).join("startup.d")
}

pub fn shutdown_dir(home: &Path) -> PathBuf {
    medley_root(home).join("shutdown.d")
}

pub fn logs_dir(home: &Path) -> PathBuf {
    medley_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
