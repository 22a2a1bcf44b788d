//! Output plugins. Medley has no audio pipeline, so an output only owns a
//! set of volume channels whose levels live in the config store.

/// Volume capability of an output plugin.
pub trait Output: Send + Sync {
    /// Channel names, e.g. `left` and `right`.
    fn channels(&self) -> Vec<String>;

    /// Notification after a channel volume was changed.
    fn volume_changed(&self, _channel: &str, _volume: u32) {}
}

/// Config property holding the volume of `channel`, relative to the plugin.
pub fn volume_property(channel: &str) -> String {
    format!("volume.{channel}")
}
