//! Medley core library: domain types, configuration, media library, queries.
//!
//! - [`types`]: ids, property values, plugin info, browse entries
//! - [`config`]: registered/pending configuration store
//! - [`medialib`]: entries, multi-source properties, JSON persistence
//! - [`query`]: collection pattern parser and evaluator
//! - [`error`]: [`ConfigError`], [`MedialibError`], [`QueryError`]

pub mod config;
pub mod error;
pub mod medialib;
pub mod query;
pub mod types;
pub mod wildcard;

pub use config::ConfigStore;
pub use error::{ConfigError, MedialibError, QueryError};
pub use medialib::{MediaEntry, MediaLib, SourcePreference};
pub use query::Query;
pub use types::{
    BrowseEntry, MediaId, PluginInfo, PluginType, PropDict, PropertyValue, SourceMap, Stats,
    SERVER_SOURCE,
};
