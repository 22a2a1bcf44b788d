//! Blocking client for the daemon socket.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;

use medley_core::{
    BrowseEntry, MediaId, PluginInfo, PluginType, PropDict, PropertyValue, Query, Stats,
};

use crate::error::{io_err, DaemonError};
use crate::protocol::{DaemonResponse, Request, PROTOCOL_VERSION};

/// One connection to the daemon; every call sends a request and waits for its response.
#[derive(Debug)]
pub struct SyncClient {
    socket: PathBuf,
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl SyncClient {
    /// Connect to `socket` and introduce ourselves as `client_name`.
    pub fn connect(socket: &Path, client_name: &str) -> Result<Self, DaemonError> {
        if !socket.exists() {
            return Err(DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            });
        }
        let stream = UnixStream::connect(socket).map_err(|err| {
            if matches!(
                err.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
            ) {
                DaemonError::DaemonNotRunning {
                    socket: socket.to_path_buf(),
                }
            } else {
                io_err(socket, err)
            }
        })?;
        let writer = stream.try_clone().map_err(|e| io_err(socket, e))?;

        let mut client = Self {
            socket: socket.to_path_buf(),
            reader: BufReader::new(stream),
            writer,
        };
        client.hello(client_name)?;
        Ok(client)
    }

    /// Keep trying to connect until the daemon answers or `timeout` passes.
    pub fn connect_with_retry(
        socket: &Path,
        client_name: &str,
        timeout: Duration,
    ) -> Result<Self, DaemonError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::connect(socket, client_name) {
                Err(DaemonError::DaemonNotRunning { .. }) if Instant::now() < deadline => {
                    sleep(Duration::from_millis(100));
                }
                other => return other,
            }
        }
    }

    /// Send one request and return the response data.
    pub fn call(&mut self, request: &Request) -> Result<Value, DaemonError> {
        let payload = serde_json::to_string(request)?;
        self.writer
            .write_all(payload.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .map_err(|e| io_err(&self.socket, e))?;

        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| io_err(&self.socket, e))?;
        if read == 0 {
            return Err(DaemonError::Protocol(format!(
                "daemon closed connection before answering '{}'",
                request.name()
            )));
        }
        let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
        response.into_data()
    }

    fn call_as<T: DeserializeOwned>(&mut self, request: &Request) -> Result<T, DaemonError> {
        let data = self.call(request)?;
        Ok(serde_json::from_value(data)?)
    }

    fn hello(&mut self, client_name: &str) -> Result<(), DaemonError> {
        self.call(&Request::Hello {
            protocol_version: PROTOCOL_VERSION,
            client: client_name.to_string(),
        })
        .map(|_| ())
    }

    pub fn quit(&mut self) -> Result<(), DaemonError> {
        self.call(&Request::Quit).map(|_| ())
    }

    pub fn stats(&mut self) -> Result<Stats, DaemonError> {
        self.call_as(&Request::Stats)
    }

    pub fn list_plugins(&mut self, plugin_type: PluginType) -> Result<Vec<PluginInfo>, DaemonError> {
        self.call_as(&Request::ListPlugins { plugin_type })
    }

    pub fn config_list(&mut self) -> Result<BTreeMap<String, String>, DaemonError> {
        self.call_as(&Request::ConfigList)
    }

    pub fn config_set(&mut self, key: &str, value: &str) -> Result<(), DaemonError> {
        self.call(&Request::ConfigSet {
            key: key.to_string(),
            value: value.to_string(),
        })
        .map(|_| ())
    }

    pub fn browse(&mut self, url: &str) -> Result<Vec<BrowseEntry>, DaemonError> {
        self.call_as(&Request::Browse {
            url: url.to_string(),
        })
    }

    pub fn medialib_add_entry(&mut self, url: &str) -> Result<MediaId, DaemonError> {
        self.call_as(&Request::MedialibAddEntry {
            url: url.to_string(),
        })
    }

    pub fn medialib_import_path(&mut self, url: &str) -> Result<Vec<MediaId>, DaemonError> {
        self.call_as(&Request::MedialibImportPath {
            url: url.to_string(),
        })
    }

    pub fn medialib_remove_entry(&mut self, id: MediaId) -> Result<(), DaemonError> {
        self.call(&Request::MedialibRemoveEntry { id }).map(|_| ())
    }

    /// Rehash `id`, or every entry for [`MediaId::NONE`].
    pub fn medialib_rehash(&mut self, id: MediaId) -> Result<(), DaemonError> {
        self.call(&Request::MedialibRehash { id }).map(|_| ())
    }

    pub fn medialib_get_info(&mut self, id: MediaId) -> Result<PropDict, DaemonError> {
        self.call_as(&Request::MedialibGetInfo { id })
    }

    pub fn medialib_property_set(
        &mut self,
        id: MediaId,
        source: &str,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), DaemonError> {
        self.call(&Request::MedialibPropertySet {
            id,
            source: source.to_string(),
            key: key.to_string(),
            value,
        })
        .map(|_| ())
    }

    pub fn medialib_property_remove(
        &mut self,
        id: MediaId,
        source: &str,
        key: &str,
    ) -> Result<(), DaemonError> {
        self.call(&Request::MedialibPropertyRemove {
            id,
            source: source.to_string(),
            key: key.to_string(),
        })
        .map(|_| ())
    }

    pub fn query_ids(&mut self, query: &Query) -> Result<Vec<MediaId>, DaemonError> {
        self.call_as(&Request::QueryIds {
            query: query.clone(),
        })
    }

    pub fn playback_current_id(&mut self) -> Result<MediaId, DaemonError> {
        self.call_as(&Request::PlaybackCurrentId)
    }

    pub fn volume_get(&mut self) -> Result<BTreeMap<String, u32>, DaemonError> {
        self.call_as(&Request::VolumeGet)
    }

    pub fn volume_set(&mut self, channel: &str, volume: u32) -> Result<(), DaemonError> {
        self.call(&Request::VolumeSet {
            channel: channel.to_string(),
            volume,
        })
        .map(|_| ())
    }

    pub fn coll_sync(&mut self) -> Result<(), DaemonError> {
        self.call(&Request::CollSync).map(|_| ())
    }
}
