pub mod daemon;
pub mod info;
pub mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};

use medley_core::{PropDict, PropertyValue};
use medley_daemon::{paths, SyncClient};

/// Name sent in `hello`; also the default property source `client/medley-cli`.
pub const CLIENT_NAME: &str = "medley-cli";

/// `--socket` if given, else the socket under the user's home.
pub fn socket_or_default(socket: Option<PathBuf>) -> Result<PathBuf> {
    match socket {
        Some(socket) => Ok(socket),
        None => Ok(paths::socket_path(&home()?)),
    }
}

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub fn connect(socket: Option<PathBuf>) -> Result<SyncClient> {
    let socket = socket_or_default(socket)?;
    SyncClient::connect(&socket, CLIENT_NAME).context("could not connect to medley daemon")
}

pub fn format_property(source: &str, key: &str, value: &PropertyValue) -> String {
    format!("[{source}] {key} = {value}")
}

/// One `[source] key = value` line per property value.
pub fn print_properties(props: &PropDict) {
    for (key, sources) in props {
        for (source, value) in sources {
            println!("{}", format_property(source, key, value));
        }
    }
}
