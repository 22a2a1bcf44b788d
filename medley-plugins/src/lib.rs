//! Medley plugin system: descriptors, registry, stream type detection and
//! the builtin `rss`, `file` and `null` plugins.
//!
//! Plugins describe themselves with a [`PluginDescriptor`] whose `setup`
//! fills a [`PluginBuilder`]. The [`PluginRegistry`] checks the api version,
//! runs setup, verifies the result and prepends the plugin to its list.

pub mod builtin;
pub mod dynamic;
pub mod error;
pub mod magic;
pub mod output;
pub mod plugin;
pub mod registry;
pub mod xform;

pub use error::{ErrorKind, PluginError, XformError};
pub use magic::MagicTable;
pub use output::Output;
pub use plugin::{Plugin, PluginBuilder, PluginDescriptor, PluginKind};
pub use registry::PluginRegistry;
pub use xform::{BrowseContext, Xform};
