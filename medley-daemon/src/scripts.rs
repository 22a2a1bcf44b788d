//! Startup and shutdown script directories.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use tracing::{debug, info, warn};

/// Executable regular files in `dir`, sorted by name. A missing directory is empty.
pub fn executables(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "no script directory");
        return Vec::new();
    };
    let mut scripts: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .collect();
    scripts.sort();
    scripts
}

/// Start every script in `dir` with `MEDLEY_PATH` pointing at the daemon socket.
pub fn spawn_all(dir: &Path, socket: &Path, home: &Path) -> Vec<Child> {
    executables(dir)
        .into_iter()
        .filter_map(|script| {
            match Command::new(&script)
                .env("MEDLEY_PATH", socket)
                .env("HOME", home)
                .spawn()
            {
                Ok(child) => {
                    info!(script = %script.display(), pid = child.id(), "started script");
                    Some(child)
                }
                Err(e) => {
                    warn!(script = %script.display(), error = %e, "could not start script");
                    None
                }
            }
        })
        .collect()
}

/// Run every script in `dir` and wait for each to exit.
pub fn run_all(dir: &Path, socket: &Path, home: &Path) {
    for mut child in spawn_all(dir, socket, home) {
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(pid = child.id(), %status, "script exited with failure"),
            Err(e) => warn!(pid = child.id(), error = %e, "waiting for script failed"),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn only_executables_are_listed_in_order() {
        let tmp = TempDir::new().unwrap();
        let b = script(tmp.path(), "20-b", "#!/bin/sh\n", 0o755);
        let a = script(tmp.path(), "10-a", "#!/bin/sh\n", 0o700);
        script(tmp.path(), "notes.txt", "hello", 0o644);
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        assert_eq!(executables(tmp.path()), vec![a, b]);
    }

    #[test]
    fn missing_dir_has_no_scripts() {
        let tmp = TempDir::new().unwrap();
        assert!(executables(&tmp.path().join("startup.d")).is_empty());
    }

    #[test]
    fn scripts_see_socket_path() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out.txt");
        script(
            tmp.path(),
            "record",
            &format!("#!/bin/sh\necho \"$MEDLEY_PATH\" > {}\n", out.display()),
            0o755,
        );
        run_all(tmp.path(), Path::new("/run/medley.sock"), tmp.path());
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "/run/medley.sock");
    }
}
