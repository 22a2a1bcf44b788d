//! Flat plugin registry.
//!
//! Plugins are prepended as they load, so lookups find the most recently
//! loaded plugin first. There is no ordering, retry or dedup beyond that.

use std::path::Path;
use std::sync::Arc;

use medley_core::{wildcard, ConfigStore, PluginInfo, PluginType};
use tracing::{debug, error, info, warn};

use crate::builtin;
use crate::dynamic::{self, LoadedLibrary};
use crate::error::{io_err, PluginError};
use crate::magic::MagicTable;
use crate::plugin::{api_version_for, Plugin, PluginBuilder, PluginDescriptor, PluginKind};
use crate::xform::Xform;

#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<Plugin>>,
    magic: MagicTable,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` for shared-object plugins, then add the builtin ones.
    ///
    /// A failed scan is logged and does not stop the builtins from loading.
    pub fn init(&mut self, dir: &Path) {
        if let Err(e) = self.scan_directory(dir) {
            warn!(dir = %dir.display(), error = %e, "plugin directory scan failed");
        }
        for desc in builtin::descriptors() {
            if let Err(e) = self.load(&desc, None) {
                error!(plugin = desc.shortname, error = %e, "builtin plugin rejected");
            }
        }
        info!(count = self.plugins.len(), "plugins initialised");
    }

    /// Validate `desc`, run its setup and verification, and add the plugin.
    pub fn load(
        &mut self,
        desc: &PluginDescriptor,
        library: Option<LoadedLibrary>,
    ) -> Result<Arc<Plugin>, PluginError> {
        let shortname = desc.shortname.to_string();

        let Some(expected) = api_version_for(desc.plugin_type) else {
            debug!(plugin = %shortname, "unknown plugin type");
            return Err(PluginError::UnknownType { shortname });
        };
        if desc.api_version != expected {
            debug!(plugin = %shortname, found = desc.api_version, expected, "bad api version");
            return Err(PluginError::ApiVersion {
                shortname,
                expected,
                found: desc.api_version,
            });
        }

        let mut builder = PluginBuilder::default();
        if let Err(reason) = (desc.setup)(&mut builder) {
            debug!(plugin = %shortname, %reason, "setup failed");
            return Err(PluginError::Setup { shortname, reason });
        }
        let magic = builder.parse_magic().map_err(|reason| PluginError::Setup {
            shortname: shortname.clone(),
            reason,
        })?;

        let kind = verify(desc.plugin_type, &mut builder).map_err(|reason| {
            debug!(plugin = %shortname, %reason, "verify failed");
            PluginError::Verify {
                shortname: shortname.clone(),
                reason,
            }
        })?;

        for rule in magic {
            self.magic.add(rule);
        }
        for rule in builder.extensions {
            self.magic.extension_add(rule);
        }

        let plugin = Arc::new(Plugin {
            shortname,
            name: desc.name.to_string(),
            version: desc.version.to_string(),
            description: desc.description.to_string(),
            info: builder.info,
            config: builder.config,
            kind,
            _library: library,
        });
        debug!(plugin = %plugin.shortname, kind = %plugin.plugin_type(), "plugin loaded");
        self.plugins.insert(0, Arc::clone(&plugin));
        Ok(plugin)
    }

    /// Load every `lib*<suffix>` regular file in `dir`. Returns how many loaded.
    pub fn scan_directory(&mut self, dir: &Path) -> Result<usize, PluginError> {
        debug!(dir = %dir.display(), "scanning plugin directory");
        let entries = std::fs::read_dir(dir).map_err(|e| {
            error!(dir = %dir.display(), error = %e, "failed to open plugin directory");
            io_err(dir, e)
        })?;

        let mut count = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !dynamic::is_plugin_file_name(name) {
                continue;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            debug!(path = %path.display(), "trying to load plugin file");
            let loaded = dynamic::open(&path)
                .and_then(|(library, desc)| self.load(&desc, Some(library)));
            match loaded {
                Ok(plugin) => {
                    info!(plugin = %plugin.shortname(), path = %path.display(), "loaded plugin");
                    count += 1;
                }
                Err(e) => error!(path = %path.display(), error = %e, "failed to open plugin"),
            }
        }
        Ok(count)
    }

    /// Case-insensitive lookup by shortname; first (most recent) match wins.
    pub fn find(&self, plugin_type: PluginType, shortname: &str) -> Option<Arc<Plugin>> {
        self.plugins
            .iter()
            .find(|p| {
                plugin_type.accepts(p.plugin_type()) && p.shortname.eq_ignore_ascii_case(shortname)
            })
            .cloned()
    }

    pub fn list(&self, plugin_type: PluginType) -> Vec<Arc<Plugin>> {
        self.plugins
            .iter()
            .filter(|p| plugin_type.accepts(p.plugin_type()))
            .cloned()
            .collect()
    }

    /// Call `f` for each plugin of `plugin_type` until it returns `false`.
    pub fn foreach<F>(&self, plugin_type: PluginType, mut f: F)
    where
        F: FnMut(&Arc<Plugin>) -> bool,
    {
        for plugin in self
            .plugins
            .iter()
            .filter(|p| plugin_type.accepts(p.plugin_type()))
        {
            if !f(plugin) {
                break;
            }
        }
    }

    pub fn client_list(&self, plugin_type: PluginType) -> Vec<PluginInfo> {
        self.list(plugin_type).iter().map(|p| p.info()).collect()
    }

    pub fn magic(&self) -> &MagicTable {
        &self.magic
    }

    /// First xform whose input globs accept `mime`.
    pub fn find_xform_for(&self, mime: &str) -> Option<(Arc<Plugin>, Arc<dyn Xform>)> {
        let mut found = None;
        self.foreach(PluginType::Xform, |plugin| {
            let accepts = plugin
                .input_types()
                .iter()
                .any(|glob| wildcard::matches(glob, mime));
            match plugin.xform() {
                Some(xform) if accepts => {
                    found = Some((Arc::clone(plugin), xform));
                    false
                }
                _ => true,
            }
        });
        found
    }

    /// Register every plugin's config properties with `store`.
    pub fn register_config(&self, store: &mut ConfigStore) {
        for plugin in &self.plugins {
            for (key, default) in plugin.config_properties() {
                store.register(&key, default);
            }
        }
    }

    /// Drop all plugins, logging those still referenced elsewhere.
    pub fn shutdown(&mut self) {
        for plugin in self.plugins.drain(..) {
            let refs = Arc::strong_count(&plugin);
            if refs > 1 {
                warn!(plugin = %plugin.shortname(), refs, "plugin still in use at shutdown");
            }
        }
        self.magic = MagicTable::new();
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

fn verify(plugin_type: PluginType, builder: &mut PluginBuilder) -> Result<PluginKind, String> {
    match plugin_type {
        PluginType::Xform => {
            let methods = builder.xform.take().ok_or("no xform methods set")?;
            if builder.input_types.is_empty() {
                return Err("no input types registered".to_string());
            }
            Ok(PluginKind::Xform {
                methods,
                input_types: std::mem::take(&mut builder.input_types),
            })
        }
        PluginType::Output => {
            let methods = builder.output.take().ok_or("no output methods set")?;
            if methods.channels().is_empty() {
                return Err("no volume channels".to_string());
            }
            Ok(PluginKind::Output { methods })
        }
        PluginType::All => Err("unknown plugin type".to_string()),
    }
}
