//! Size-based rotation of the detached daemon's log files.
//!
//! `medleyd.log` is copied to `medleyd.log.1` and truncated in place, older
//! copies shift up by one and the copy past the limit is deleted. The daemon's
//! stdout and stderr stay open on the live file in append mode, so the next
//! write lands at the start of the truncated log.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// When and how far to rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    /// 10 MiB per file, 5 rotated copies.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log_path` once it reaches `max_bytes`. Returns whether it rotated.
    ///
    /// A missing log is not an error.
    pub fn rotate(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.max_files == 0 {
            return Ok(false);
        }

        let oldest = numbered_path(log_path, self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let src = numbered_path(log_path, n);
            if src.exists() {
                fs::rename(&src, numbered_path(log_path, n + 1))?;
            }
        }
        fs::copy(log_path, numbered_path(log_path, 1))?;
        fs::OpenOptions::new().write(true).open(log_path)?.set_len(0)?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `home` with the default policy.
pub fn rotate_logs(home: &Path) {
    let policy = RotationPolicy::default();
    for log_path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ] {
        match policy.rotate(&log_path) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: RotationPolicy = RotationPolicy {
        max_bytes: 16,
        max_files: 3,
    };

    #[test]
    fn small_log_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("medleyd.log");
        fs::write(&log, "short").unwrap();
        assert!(!SMALL.rotate(&log).unwrap());
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn missing_log_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!SMALL.rotate(&dir.path().join("medleyd.log")).unwrap());
    }

    #[test]
    fn oversized_log_moves_to_first_copy() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("medleyd.log");
        fs::write(&log, "x".repeat(32)).unwrap();

        assert!(SMALL.rotate(&log).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read_to_string(numbered_path(&log, 1)).unwrap().len(), 32);
    }

    #[test]
    fn open_append_handle_keeps_writing_to_live_log() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let log = dir.path().join("medleyd.log");
        let mut handle = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .unwrap();
        handle.write_all(&[b'a'; 32]).unwrap();

        assert!(SMALL.rotate(&log).unwrap());
        handle.write_all(&[b'b'; 64]).unwrap();
        handle.flush().unwrap();

        assert_eq!(fs::read(&log).unwrap(), vec![b'b'; 64]);
        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap(), vec![b'a'; 32]);
        // The live log keeps growing, so the next check rotates again.
        assert!(SMALL.rotate(&log).unwrap());
        assert_eq!(fs::read(numbered_path(&log, 2)).unwrap(), vec![b'a'; 32]);
    }

    #[test]
    fn copies_shift_and_oldest_is_dropped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("medleyd-err.log");
        for round in 1..=5u8 {
            fs::write(&log, vec![b'0' + round; 20]).unwrap();
            SMALL.rotate(&log).unwrap();
        }
        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap()[0], b'5');
        assert_eq!(fs::read(numbered_path(&log, 3)).unwrap()[0], b'3');
        assert!(!numbered_path(&log, 4).exists());
    }

    #[test]
    fn default_policy_matches_daemon_limits() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.max_files, 5);
        assert_eq!(
            numbered_path(Path::new("/tmp/medleyd.log"), 2),
            PathBuf::from("/tmp/medleyd.log.2")
        );
    }
}
