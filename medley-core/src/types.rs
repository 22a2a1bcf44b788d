//! Domain types shared by the daemon, its plugins and clients.
//!
//! Everything here travels over the wire, so all types are serde-friendly and
//! use the same key names the protocol exposes (`isdir`, `realpath`, ...).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a media library entry. `0` never names an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub u32);

impl MediaId {
    /// Placeholder id meaning "every entry" (rehash) or "nothing" (current id).
    pub const NONE: MediaId = MediaId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for MediaId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Property values
// ---------------------------------------------------------------------------

/// A single media property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Str(String),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(n) => Some(*n),
            PropertyValue::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            PropertyValue::Int(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(n) => n.fmt(f),
            PropertyValue::Str(s) => s.fmt(f),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Values of one property keyed by the source that set them.
pub type SourceMap = BTreeMap<String, PropertyValue>;

/// Per-entry property dictionary: `key -> source -> value`.
pub type PropDict = BTreeMap<String, SourceMap>;

/// Source name used for properties the daemon itself maintains.
pub const SERVER_SOURCE: &str = "server";

/// Entry status values stored in the `status` property.
pub mod status {
    pub const NEW: i64 = 0;
    pub const OK: i64 = 1;
    pub const RESOLVING: i64 = 2;
    pub const NOT_AVAILABLE: i64 = 3;
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// Plugin category. `All` is only meaningful as a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    #[default]
    All,
    Output,
    Xform,
}

impl PluginType {
    /// True when a plugin of type `other` passes this filter.
    pub fn accepts(self, other: PluginType) -> bool {
        self == PluginType::All || self == other
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginType::All => write!(f, "all"),
            PluginType::Output => write!(f, "output"),
            PluginType::Xform => write!(f, "xform"),
        }
    }
}

/// Client-facing description of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub shortname: String,
    pub version: String,
    pub description: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    /// Free-form key/values added by the plugin (author, website, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Browsing
// ---------------------------------------------------------------------------

/// One entry produced by browsing a url (directory listing, feed items, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseEntry {
    pub path: String,
    /// Target url when the entry is a symlink (feed enclosures, playlist items).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realpath: Option<String>,
    #[serde(default)]
    pub isdir: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl BrowseEntry {
    pub fn file(path: impl Into<String>, isdir: bool) -> Self {
        Self {
            path: path.into(),
            realpath: None,
            isdir,
            properties: BTreeMap::new(),
        }
    }

    /// The url an entry actually points at.
    pub fn target(&self) -> &str {
        self.realpath.as_deref().unwrap_or(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Daemon stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub version: String,
    /// Seconds since the daemon started.
    pub uptime: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
