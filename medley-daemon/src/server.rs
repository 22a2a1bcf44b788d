//! The daemon's main object: configuration, plugins, media library and the
//! selected output, plus request dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use medley_core::{
    ConfigStore, MediaId, MediaLib, PluginType, Query, SourcePreference, Stats, SERVER_SOURCE,
};
use medley_plugins::output::volume_property;
use medley_plugins::{Plugin, PluginRegistry};

use crate::error::DaemonError;
use crate::paths;
use crate::protocol::{Request, PROTOCOL_VERSION};
use crate::resolver::{self, BufferSizes};

pub const CORE_IPCSOCKET: &str = "core.ipcsocket";
pub const CORE_STARTUPPATH: &str = "core.startuppath";
pub const CORE_SHUTDOWNPATH: &str = "core.shutdownpath";
pub const OUTPUT_PLUGIN: &str = "output.plugin";
pub const DECODER_BUFFERSIZE: &str = "decoder.buffersize";
pub const TRANSPORT_BUFFERSIZE: &str = "transport.buffersize";
pub const MEDIALIB_SOURCEPREF: &str = "medialib.sourcepreference";

pub const DEFAULT_OUTPUT: &str = "null";
const DEFAULT_BUFFERSIZE: &str = "32768";
const DEFAULT_SOURCEPREF: &str = "server:client/*:plugin/*";

/// Largest accepted channel volume.
pub const MAX_VOLUME: u32 = 100;

/// Register the daemon's own config properties.
pub fn register_core_config(config: &mut ConfigStore, home: &Path) {
    let path_default = |p: PathBuf| p.display().to_string();
    config.register(CORE_IPCSOCKET, &path_default(paths::socket_path(home)));
    config.register(CORE_STARTUPPATH, &path_default(paths::startup_dir(home)));
    config.register(CORE_SHUTDOWNPATH, &path_default(paths::shutdown_dir(home)));
    config.register(OUTPUT_PLUGIN, DEFAULT_OUTPUT);
    config.register(DECODER_BUFFERSIZE, DEFAULT_BUFFERSIZE);
    config.register(TRANSPORT_BUFFERSIZE, DEFAULT_BUFFERSIZE);
    config.register(MEDIALIB_SOURCEPREF, DEFAULT_SOURCEPREF);
}

/// What the connection loop should do after answering a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum After {
    Continue,
    Shutdown,
}

pub struct MediaServer {
    home: PathBuf,
    config: ConfigStore,
    plugins: PluginRegistry,
    medialib: MediaLib,
    output: Arc<Plugin>,
    started: Instant,
}

impl MediaServer {
    /// Assemble the server from loaded parts; fails when the configured output is unknown.
    pub fn new(
        home: PathBuf,
        mut config: ConfigStore,
        plugins: PluginRegistry,
        medialib: MediaLib,
    ) -> Result<Self, DaemonError> {
        plugins.register_config(&mut config);
        let name = config.lookup(OUTPUT_PLUGIN).unwrap_or(DEFAULT_OUTPUT).to_string();
        let output = plugins
            .find(PluginType::Output, &name)
            .ok_or(DaemonError::UnknownOutput(name))?;
        info!(output = %output.shortname(), "output selected");
        Ok(Self {
            home,
            config,
            plugins,
            medialib,
            output,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn medialib(&self) -> &MediaLib {
        &self.medialib
    }

    pub fn config_path_value(&self, key: &str) -> PathBuf {
        PathBuf::from(self.config.lookup(key).unwrap_or_default())
    }

    fn buffer_sizes(&self) -> BufferSizes {
        let size = |key: &str, fallback: usize| {
            self.config
                .lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(fallback)
        };
        let defaults = BufferSizes::default();
        BufferSizes {
            transport: size(TRANSPORT_BUFFERSIZE, defaults.transport),
            decoder: size(DECODER_BUFFERSIZE, defaults.decoder),
        }
    }

    fn source_preference(&self) -> SourcePreference {
        self.config
            .lookup(MEDIALIB_SOURCEPREF)
            .map(SourcePreference::parse)
            .unwrap_or_default()
    }

    /// Answer one request.
    pub fn handle(&mut self, request: Request) -> Result<(Value, After), DaemonError> {
        let data = match request {
            Request::Hello {
                protocol_version,
                client,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(DaemonError::Protocol(format!(
                        "client '{client}' speaks protocol {protocol_version}, server speaks {PROTOCOL_VERSION}"
                    )));
                }
                info!(%client, protocol_version, "client connected");
                json!(PROTOCOL_VERSION)
            }
            Request::Quit => {
                info!("quit requested");
                return Ok((Value::Null, After::Shutdown));
            }
            Request::Stats => json!(Stats {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime: self.started.elapsed().as_secs(),
            }),
            Request::ListPlugins { plugin_type } => json!(self.plugins.client_list(plugin_type)),
            Request::ConfigList => json!(self.config.list()),
            Request::ConfigSet { key, value } => {
                self.config_set(&key, &value)?;
                Value::Null
            }
            Request::Browse { url } => {
                json!(resolver::browse(&self.plugins, &url, self.buffer_sizes())?.entries)
            }
            Request::MedialibAddEntry { url } => {
                let id = self.medialib.add_entry(&url);
                resolver::resolve(&self.plugins, &mut self.medialib, id)?;
                json!(id)
            }
            Request::MedialibImportPath { url } => {
                let sizes = self.buffer_sizes();
                json!(resolver::import(&self.plugins, &mut self.medialib, &url, sizes)?)
            }
            Request::MedialibRemoveEntry { id } => {
                self.medialib.remove_entry(id)?;
                Value::Null
            }
            Request::MedialibRehash { id } => {
                json!(resolver::rehash(&self.plugins, &mut self.medialib, id)?)
            }
            Request::MedialibGetInfo { id } => json!(self.medialib.get_info(id)?),
            Request::MedialibPropertySet {
                id,
                source,
                key,
                value,
            } => {
                reject_server_source(&source)?;
                self.medialib.property_set(id, &source, &key, value)?;
                Value::Null
            }
            Request::MedialibPropertyRemove { id, source, key } => {
                reject_server_source(&source)?;
                self.medialib.property_remove(id, &source, &key)?;
                Value::Null
            }
            Request::QueryIds { query } => json!(self.query_ids(&query)),
            Request::PlaybackCurrentId => json!(MediaId::NONE),
            Request::VolumeGet => json!(self.volumes()),
            Request::VolumeSet { channel, volume } => {
                self.volume_set(&channel, volume)?;
                Value::Null
            }
            Request::CollSync => {
                self.save()?;
                Value::Null
            }
        };
        Ok((data, After::Continue))
    }

    fn config_set(&mut self, key: &str, value: &str) -> Result<(), DaemonError> {
        if key == OUTPUT_PLUGIN {
            let output = self
                .plugins
                .find(PluginType::Output, value)
                .ok_or_else(|| DaemonError::UnknownOutput(value.to_string()))?;
            info!(from = %self.output.shortname(), to = %output.shortname(), "switching output");
            self.output = output;
        }
        let volume = self.volume_in_config(key, value)?;
        let old = self.config.set(key, value)?;
        debug!(key, %old, new = value, "config changed");
        if let Some((channel, volume)) = volume {
            if let Some(methods) = self.output.output() {
                methods.volume_changed(&channel, volume);
            }
        }
        Ok(())
    }

    /// Range check for `<output>.volume.<channel>` keys.
    ///
    /// Returns the channel and volume when the key belongs to the active output.
    fn volume_in_config(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<(String, u32)>, DaemonError> {
        let Some((shortname, property)) = key.split_once('.') else {
            return Ok(None);
        };
        let Some(channel) = property.strip_prefix(&volume_property("")) else {
            return Ok(None);
        };
        if self.plugins.find(PluginType::Output, shortname).is_none() {
            return Ok(None);
        }
        let volume = match value.trim().parse::<u32>() {
            Ok(volume) if volume <= MAX_VOLUME => volume,
            _ => {
                return Err(DaemonError::Protocol(format!(
                    "{key}: volume '{value}' out of range 0-{MAX_VOLUME}"
                )))
            }
        };
        Ok((shortname == self.output.shortname()).then(|| (channel.to_string(), volume)))
    }

    fn query_ids(&self, query: &Query) -> Vec<MediaId> {
        self.medialib.query_ids(query, &self.source_preference())
    }

    /// Channel volumes of the current output.
    pub fn volumes(&self) -> std::collections::BTreeMap<String, u32> {
        let Some(methods) = self.output.output() else {
            return Default::default();
        };
        methods
            .channels()
            .into_iter()
            .map(|channel| {
                let volume = self
                    .output
                    .config_lookup(&self.config, &volume_property(&channel))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(MAX_VOLUME);
                (channel, volume)
            })
            .collect()
    }

    fn volume_set(&mut self, channel: &str, volume: u32) -> Result<(), DaemonError> {
        if volume > MAX_VOLUME {
            return Err(DaemonError::Protocol(format!(
                "volume {volume} out of range 0-{MAX_VOLUME}"
            )));
        }
        let methods = self
            .output
            .output()
            .ok_or_else(|| DaemonError::UnknownOutput(self.output.shortname().to_string()))?;
        if !methods.channels().iter().any(|c| c == channel) {
            return Err(DaemonError::Protocol(format!(
                "output '{}' has no channel '{channel}'",
                self.output.shortname()
            )));
        }
        let key = self.output.config_key(&volume_property(channel));
        self.config.set(&key, &volume.to_string())?;
        methods.volume_changed(channel, volume);
        Ok(())
    }

    /// Persist config and media library.
    pub fn save(&self) -> Result<(), DaemonError> {
        self.config.save_at(&paths::config_path(&self.home))?;
        self.medialib.save_at(&paths::medialib_path(&self.home))?;
        debug!("config and media library saved");
        Ok(())
    }

    /// Save state and drop all plugins.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "failed to save state on shutdown");
        }
        self.plugins.shutdown();
    }
}

fn reject_server_source(source: &str) -> Result<(), DaemonError> {
    if source == SERVER_SOURCE {
        return Err(DaemonError::Protocol(
            "properties of source 'server' are read-only".to_string(),
        ));
    }
    Ok(())
}
