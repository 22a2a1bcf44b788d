//! Output that discards everything but remembers its volume.

use medley_core::PluginType;
use tracing::debug;

use crate::output::{volume_property, Output};
use crate::plugin::{PluginBuilder, PluginDescriptor, OUTPUT_API_VERSION};

pub const CHANNELS: [&str; 2] = ["left", "right"];
pub const DEFAULT_VOLUME: &str = "100";

pub const DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    plugin_type: PluginType::Output,
    api_version: OUTPUT_API_VERSION,
    shortname: "null",
    name: "Null Output",
    version: env!("CARGO_PKG_VERSION"),
    description: "Output that goes nowhere",
    setup,
};

fn setup(builder: &mut PluginBuilder) -> Result<(), String> {
    builder.output(NullOutput);
    for channel in CHANNELS {
        builder.config_property_register(&volume_property(channel), DEFAULT_VOLUME);
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl Output for NullOutput {
    fn channels(&self) -> Vec<String> {
        CHANNELS.iter().map(|c| c.to_string()).collect()
    }

    fn volume_changed(&self, channel: &str, volume: u32) {
        debug!(channel, volume, "null output volume changed");
    }
}
