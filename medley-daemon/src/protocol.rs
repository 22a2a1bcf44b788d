//! Newline-delimited JSON protocol spoken over the daemon socket.
//!
//! Each request is one JSON object tagged by `cmd`; each response is one
//! `{ "ok": bool, "data"?: any, "error"?: string }` object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use medley_core::{MediaId, PluginType, PropertyValue, Query};

use crate::error::DaemonError;

/// Bumped whenever a request or response shape changes.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Hello {
        protocol_version: u32,
        client: String,
    },
    Quit,
    Stats,
    ListPlugins {
        #[serde(rename = "type", default)]
        plugin_type: PluginType,
    },
    ConfigList,
    ConfigSet {
        key: String,
        value: String,
    },
    Browse {
        url: String,
    },
    MedialibAddEntry {
        url: String,
    },
    MedialibImportPath {
        url: String,
    },
    MedialibRemoveEntry {
        id: MediaId,
    },
    /// `id` 0 rehashes every entry.
    MedialibRehash {
        id: MediaId,
    },
    MedialibGetInfo {
        id: MediaId,
    },
    MedialibPropertySet {
        id: MediaId,
        source: String,
        key: String,
        value: PropertyValue,
    },
    MedialibPropertyRemove {
        id: MediaId,
        source: String,
        key: String,
    },
    QueryIds {
        query: Query,
    },
    PlaybackCurrentId,
    VolumeGet,
    VolumeSet {
        channel: String,
        volume: u32,
    },
    CollSync,
}

impl Request {
    /// Command name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::Quit => "quit",
            Request::Stats => "stats",
            Request::ListPlugins { .. } => "list_plugins",
            Request::ConfigList => "config_list",
            Request::ConfigSet { .. } => "config_set",
            Request::Browse { .. } => "browse",
            Request::MedialibAddEntry { .. } => "medialib_add_entry",
            Request::MedialibImportPath { .. } => "medialib_import_path",
            Request::MedialibRemoveEntry { .. } => "medialib_remove_entry",
            Request::MedialibRehash { .. } => "medialib_rehash",
            Request::MedialibGetInfo { .. } => "medialib_get_info",
            Request::MedialibPropertySet { .. } => "medialib_property_set",
            Request::MedialibPropertyRemove { .. } => "medialib_property_remove",
            Request::QueryIds { .. } => "query_ids",
            Request::PlaybackCurrentId => "playback_current_id",
            Request::VolumeGet => "volume_get",
            Request::VolumeSet { .. } => "volume_set",
            Request::CollSync => "coll_sync",
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Turn an error response into [`DaemonError::Remote`].
    pub fn into_data(self) -> Result<Value, DaemonError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(DaemonError::Remote(
                self.error
                    .unwrap_or_else(|| "unknown daemon error".to_string()),
            ))
        }
    }
}
