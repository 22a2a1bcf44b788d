//! Medley daemon: unix-socket server, request dispatch, transports and the
//! blocking client used by the command line tool.

pub mod client;
mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
pub mod resolver;
mod runtime;
pub mod scripts;
pub mod server;
pub mod transport;

pub use client::SyncClient;
pub use error::DaemonError;
pub use protocol::{DaemonResponse, Request, PROTOCOL_VERSION};
pub use runtime::{run, start_blocking, DaemonOptions};
