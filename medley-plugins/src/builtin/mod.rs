//! Plugins compiled into the daemon.

pub mod file;
pub mod null;
pub mod rss;

use crate::plugin::PluginDescriptor;

/// Builtin descriptors in load order.
pub fn descriptors() -> [PluginDescriptor; 3] {
    [file::DESCRIPTOR, null::DESCRIPTOR, rss::DESCRIPTOR]
}
