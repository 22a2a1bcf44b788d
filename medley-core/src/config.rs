//! Daemon configuration store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.medley/
//!   medley.conf   (flat YAML map `key: value`, mode 0600)
//! ```
//!
//! Properties only become visible once something registers them with a
//! default. Values read from disk for keys that are not (yet) registered are
//! held back and picked up on registration, and are written back on save so
//! settings of currently absent plugins survive a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{config_io_err, ConfigError};

/// Registered and pending configuration values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    registered: BTreeMap<String, String>,
    pending: BTreeMap<String, String>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from `path`; a missing file yields an empty store.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| config_io_err(path, e))?;
        if contents.trim().is_empty() {
            return Ok(Self::new());
        }
        let raw: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        let mut pending = BTreeMap::new();
        for (key, value) in raw {
            let value = scalar_to_string(&value).ok_or_else(|| ConfigError::InvalidValue {
                path: path.to_path_buf(),
                key: key.clone(),
            })?;
            pending.insert(key, value);
        }
        Ok(Self {
            registered: BTreeMap::new(),
            pending,
        })
    }

    /// Atomically write every known value (registered and pending) to `path`.
    ///
    /// Write flow: serialize → `<name>.tmp` sibling → `chmod 0600` → `rename`.
    pub fn save_at(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| config_io_err(dir, e))?;
        }
        let mut all = self.pending.clone();
        all.extend(self.registered.clone());
        let yaml = serde_yaml::to_string(&all)?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, yaml).map_err(|e| config_io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, path).map_err(|e| config_io_err(path, e))?;
        Ok(())
    }

    /// Register `key` with `default`, returning the effective value.
    ///
    /// Registering an already registered key keeps its current value.
    pub fn register(&mut self, key: &str, default: &str) -> &str {
        let pending = self.pending.remove(key);
        self.registered
            .entry(key.to_string())
            .or_insert_with(|| pending.unwrap_or_else(|| default.to_string()))
            .as_str()
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.registered.get(key).map(String::as_str)
    }

    /// Set a registered property, returning its previous value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<String, ConfigError> {
        let current = self
            .registered
            .get_mut(key)
            .ok_or_else(|| ConfigError::UnknownProperty(key.to_string()))?;
        Ok(std::mem::replace(current, value.to_string()))
    }

    /// All registered properties with their current values.
    pub fn list(&self) -> BTreeMap<String, String> {
        self.registered.clone()
    }
}

// Config values are strings, but hand-edited files often leave numbers and
// booleans unquoted.
fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("medley.conf");
    path.with_file_name(format!("{name}.tmp"))
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| config_io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn register_returns_default_when_unset() {
        let mut store = ConfigStore::new();
        assert_eq!(store.register("output.plugin", "null"), "null");
        assert_eq!(store.lookup("output.plugin"), Some("null"));
    }

    #[test]
    fn reregister_keeps_current_value() {
        let mut store = ConfigStore::new();
        store.register("null.volume.left", "100");
        store.set("null.volume.left", "40").unwrap();
        assert_eq!(store.register("null.volume.left", "100"), "40");
    }

    #[test]
    fn set_unknown_property_fails() {
        let mut store = ConfigStore::new();
        let err = store.set("nope.nothing", "1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProperty(ref k) if k == "nope.nothing"));
    }

    #[test]
    fn set_returns_previous_value() {
        let mut store = ConfigStore::new();
        store.register("core.startuppath", "/a");
        assert_eq!(store.set("core.startuppath", "/b").unwrap(), "/a");
    }

    #[test]
    fn loaded_values_win_over_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("medley.conf");
        std::fs::write(&path, "output.plugin: pulse\nnull.volume.left: '55'\n").unwrap();

        let mut store = ConfigStore::load_at(&path).unwrap();
        assert_eq!(store.lookup("output.plugin"), None, "pending until registered");
        assert_eq!(store.register("output.plugin", "null"), "pulse");
        assert_eq!(store.register("null.volume.left", "100"), "55");
    }

    #[test]
    fn save_keeps_unregistered_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("medley.conf");
        std::fs::write(&path, "vorbis.buffer: '4096'\n").unwrap();

        let mut store = ConfigStore::load_at(&path).unwrap();
        store.register("core.ipcsocket", "/tmp/medley.sock");
        store.save_at(&path).unwrap();

        let mut reloaded = ConfigStore::load_at(&path).unwrap();
        assert_eq!(reloaded.register("vorbis.buffer", "0"), "4096");
        assert_eq!(reloaded.register("core.ipcsocket", "x"), "/tmp/medley.sock");
        assert!(!tmp.path().join("medley.conf.tmp").exists());
    }

    #[test]
    fn unquoted_scalars_are_accepted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("medley.conf");
        std::fs::write(&path, "decoder.buffersize: 32768\nnull.enabled: true\n").unwrap();
        let mut store = ConfigStore::load_at(&path).unwrap();
        assert_eq!(store.register("decoder.buffersize", "0"), "32768");
        assert_eq!(store.register("null.enabled", "false"), "true");
    }

    #[test]
    fn nested_values_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("medley.conf");
        std::fs::write(&path, "output:\n  plugin: null\n").unwrap();
        let err = ConfigStore::load_at(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "output"));
    }

    #[test]
    fn list_only_contains_registered() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("medley.conf");
        std::fs::write(&path, "ghost.key: boo\n").unwrap();
        let mut store = ConfigStore::load_at(&path).unwrap();
        store.register("a.b", "1");
        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed.get("a.b").map(String::as_str), Some("1"));
    }

    #[test]
    fn missing_and_empty_files_are_empty_stores() {
        let tmp = TempDir::new().unwrap();
        let missing = ConfigStore::load_at(&tmp.path().join("none.conf")).unwrap();
        assert!(missing.list().is_empty());

        let empty = tmp.path().join("empty.conf");
        std::fs::write(&empty, "").unwrap();
        assert!(ConfigStore::load_at(&empty).unwrap().list().is_empty());
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("medley.conf");
        std::fs::write(&path, "- not: [a map").unwrap();
        let err = ConfigStore::load_at(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("medley.conf"));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("medley.conf");
        let mut store = ConfigStore::new();
        store.register("k", "v");
        store.save_at(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
