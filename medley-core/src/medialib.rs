//! Media library: entries, their multi-source properties, and persistence.
//!
//! # Storage layout
//!
//! ```text
//! ~/.medley/
//!   medialib.json   ({ "next_id": n, "entries": [...] })
//! ```
//!
//! Writes use the same atomic `.tmp` + rename pattern as the config store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{medialib_io_err, MedialibError};
use crate::query::Query;
use crate::types::{status, MediaId, PropDict, PropertyValue, SERVER_SOURCE};
use crate::wildcard;

/// Properties clients may never overwrite or remove.
const READ_ONLY_KEYS: [&str; 2] = ["id", "url"];

/// One media library entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub id: MediaId,
    pub url: String,
    #[serde(default)]
    pub properties: PropDict,
}

impl MediaEntry {
    /// Resolve `key` through `prefs`, returning the preferred source's value.
    pub fn resolve(&self, key: &str, prefs: &SourcePreference) -> Option<&PropertyValue> {
        let sources = self.properties.get(key)?;
        prefs.patterns.iter().find_map(|pattern| {
            sources
                .iter()
                .find(|(source, _)| wildcard::matches(pattern, source))
                .map(|(_, value)| value)
        })
    }

    fn set(&mut self, source: &str, key: &str, value: PropertyValue) {
        self.properties
            .entry(key.to_string())
            .or_default()
            .insert(source.to_string(), value);
    }
}

/// Ordered source patterns deciding which value of a property wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePreference {
    pub patterns: Vec<String>,
}

impl Default for SourcePreference {
    fn default() -> Self {
        Self {
            patterns: vec![
                SERVER_SOURCE.to_string(),
                "client/*".to_string(),
                "plugin/*".to_string(),
            ],
        }
    }
}

impl SourcePreference {
    /// Parse a colon separated preference list (`server:client/*:plugin/*`).
    pub fn parse(list: &str) -> Self {
        Self {
            patterns: list
                .split(':')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// In-memory media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLib {
    next_id: u32,
    #[serde(with = "entries_as_list")]
    entries: BTreeMap<MediaId, MediaEntry>,
}

impl Default for MediaLib {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }
}

impl MediaLib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the library from `path`; a missing file yields an empty library.
    pub fn load_at(path: &Path) -> Result<Self, MedialibError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| medialib_io_err(path, e))?;
        let mut lib: MediaLib = serde_json::from_str(&contents)?;
        // Never hand out an id that is already taken, even if the file was edited.
        let max = lib.entries.keys().map(|id| id.0).max().unwrap_or(0);
        lib.next_id = lib.next_id.max(max + 1).max(1);
        Ok(lib)
    }

    /// Save the library atomically (`<path>.tmp` then rename).
    pub fn save_at(&self, path: &Path) -> Result<(), MedialibError> {
        let Some(dir) = path.parent() else {
            return Err(medialib_io_err(
                path,
                std::io::Error::other("invalid media library path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| medialib_io_err(dir, e))?;

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| medialib_io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| medialib_io_err(path, e))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `url`, or return the id it already has.
    pub fn add_entry(&mut self, url: &str) -> MediaId {
        if let Some(id) = self.find_by_url(url) {
            return id;
        }
        let id = MediaId(self.next_id);
        self.next_id += 1;

        let mut entry = MediaEntry {
            id,
            url: url.to_string(),
            properties: PropDict::new(),
        };
        entry.set(SERVER_SOURCE, "id", PropertyValue::Int(i64::from(id.0)));
        entry.set(SERVER_SOURCE, "url", PropertyValue::Str(url.to_string()));
        entry.set(SERVER_SOURCE, "added", PropertyValue::Int(Utc::now().timestamp()));
        entry.set(SERVER_SOURCE, "status", PropertyValue::Int(status::NEW));
        self.entries.insert(id, entry);
        id
    }

    pub fn find_by_url(&self, url: &str) -> Option<MediaId> {
        self.entries
            .values()
            .find(|entry| entry.url == url)
            .map(|entry| entry.id)
    }

    pub fn remove_entry(&mut self, id: MediaId) -> Result<MediaEntry, MedialibError> {
        self.entries
            .remove(&id)
            .ok_or(MedialibError::NoSuchEntry(id))
    }

    pub fn entry(&self, id: MediaId) -> Result<&MediaEntry, MedialibError> {
        self.entries.get(&id).ok_or(MedialibError::NoSuchEntry(id))
    }

    pub fn get_info(&self, id: MediaId) -> Result<PropDict, MedialibError> {
        self.entry(id).map(|entry| entry.properties.clone())
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<MediaId> {
        self.entries.keys().copied().collect()
    }

    /// Set a property from a client or plugin source.
    pub fn property_set(
        &mut self,
        id: MediaId,
        source: &str,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), MedialibError> {
        if READ_ONLY_KEYS.contains(&key) {
            return Err(MedialibError::ReadOnlyProperty(key.to_string()));
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(MedialibError::NoSuchEntry(id))?;
        entry.set(source, key, value);
        Ok(())
    }

    /// Remove one source's value of a property; the key goes once no source is left.
    pub fn property_remove(
        &mut self,
        id: MediaId,
        source: &str,
        key: &str,
    ) -> Result<(), MedialibError> {
        if READ_ONLY_KEYS.contains(&key) {
            return Err(MedialibError::ReadOnlyProperty(key.to_string()));
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(MedialibError::NoSuchEntry(id))?;
        let missing = || MedialibError::NoSuchProperty {
            id,
            source_name: source.to_string(),
            key: key.to_string(),
        };
        let sources = entry.properties.get_mut(key).ok_or_else(missing)?;
        sources.remove(source).ok_or_else(missing)?;
        if sources.is_empty() {
            entry.properties.remove(key);
        }
        Ok(())
    }

    /// Server-side property update used by the resolver (bypasses read-only keys).
    pub fn server_property_set(
        &mut self,
        id: MediaId,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), MedialibError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(MedialibError::NoSuchEntry(id))?;
        entry.set(SERVER_SOURCE, key, value);
        Ok(())
    }

    /// Ids of entries matching `query`, ascending.
    pub fn query_ids(&self, query: &Query, prefs: &SourcePreference) -> Vec<MediaId> {
        self.entries
            .values()
            .filter(|entry| query.matches(&|key: &str| entry.resolve(key, prefs).cloned()))
            .map(|entry| entry.id)
            .collect()
    }
}

/// `~/.medley/medialib.json` under `home`.
pub fn medialib_path_at(home: &Path) -> PathBuf {
    home.join(".medley").join("medialib.json")
}

mod entries_as_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::MediaEntry;
    use crate::types::MediaId;

    pub fn serialize<S: Serializer>(
        entries: &BTreeMap<MediaId, MediaEntry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&MediaEntry> = entries.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<MediaId, MediaEntry>, D::Error> {
        let list = Vec::<MediaEntry>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|entry| (entry.id, entry)).collect())
    }
}
