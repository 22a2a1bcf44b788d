//! Plugin descriptors, the setup builder and loaded plugins.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use medley_core::{ConfigStore, PluginInfo, PluginType};

use crate::dynamic::LoadedLibrary;
use crate::magic::{ExtensionRule, MagicRule, MagicTest};
use crate::output::Output;
use crate::xform::Xform;

/// API version xform plugins must be built against.
pub const XFORM_API_VERSION: u32 = 1;
/// API version output plugins must be built against.
pub const OUTPUT_API_VERSION: u32 = 1;

/// Fills a [`PluginBuilder`] with the plugin's methods and metadata.
pub type SetupFn = fn(&mut PluginBuilder) -> Result<(), String>;

/// Static description of a plugin. Shared objects export one as
/// `MEDLEY_PLUGIN_DESC`.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    pub plugin_type: PluginType,
    pub api_version: u32,
    pub shortname: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub setup: SetupFn,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("plugin_type", &self.plugin_type)
            .field("api_version", &self.api_version)
            .field("shortname", &self.shortname)
            .finish()
    }
}

/// Expected api version for plugins of `plugin_type`, `None` for `All`.
pub fn api_version_for(plugin_type: PluginType) -> Option<u32> {
    match plugin_type {
        PluginType::Xform => Some(XFORM_API_VERSION),
        PluginType::Output => Some(OUTPUT_API_VERSION),
        PluginType::All => None,
    }
}

/// Collects what a plugin's setup function declares.
#[derive(Default)]
pub struct PluginBuilder {
    pub(crate) xform: Option<Arc<dyn Xform>>,
    pub(crate) output: Option<Arc<dyn Output>>,
    pub(crate) input_types: Vec<String>,
    pub(crate) magic: Vec<(String, String, String)>,
    pub(crate) extensions: Vec<ExtensionRule>,
    pub(crate) info: BTreeMap<String, String>,
    pub(crate) config: Vec<(String, String)>,
}

impl PluginBuilder {
    pub fn xform(&mut self, methods: impl Xform + 'static) -> &mut Self {
        self.xform = Some(Arc::new(methods));
        self
    }

    pub fn output(&mut self, methods: impl Output + 'static) -> &mut Self {
        self.output = Some(Arc::new(methods));
        self
    }

    /// Accept streams whose mime type matches the glob `mime`.
    pub fn input_type(&mut self, mime: &str) -> &mut Self {
        self.input_types.push(mime.to_string());
        self
    }

    /// Add a magic rule in `"<offset> string[/c] <pattern>"` form.
    pub fn magic_add(&mut self, description: &str, mime: &str, test: &str) -> &mut Self {
        self.magic
            .push((description.to_string(), mime.to_string(), test.to_string()));
        self
    }

    pub fn extension_add(&mut self, mime: &str, glob: &str) -> &mut Self {
        self.extensions.push(ExtensionRule {
            mime: mime.to_string(),
            glob: glob.to_string(),
        });
        self
    }

    pub fn info_add(&mut self, key: &str, value: &str) -> &mut Self {
        self.info.insert(key.to_string(), value.to_string());
        self
    }

    /// Declare a config property; it is registered as `<shortname>.<name>`.
    pub fn config_property_register(&mut self, name: &str, default: &str) -> &mut Self {
        self.config.push((name.to_string(), default.to_string()));
        self
    }

    pub(crate) fn parse_magic(&self) -> Result<Vec<MagicRule>, String> {
        self.magic
            .iter()
            .map(|(description, mime, test)| {
                let test = MagicTest::parse(test).map_err(|e| e.to_string())?;
                Ok(MagicRule {
                    description: description.clone(),
                    mime: mime.clone(),
                    test,
                })
            })
            .collect()
    }
}

/// Type specific part of a loaded plugin.
#[derive(Clone)]
pub enum PluginKind {
    Xform {
        methods: Arc<dyn Xform>,
        input_types: Vec<String>,
    },
    Output {
        methods: Arc<dyn Output>,
    },
}

/// A plugin that passed setup and verification.
pub struct Plugin {
    pub(crate) shortname: String,
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) description: String,
    pub(crate) info: BTreeMap<String, String>,
    pub(crate) config: Vec<(String, String)>,
    pub(crate) kind: PluginKind,
    // Declared last: the methods above may point into this library.
    pub(crate) _library: Option<LoadedLibrary>,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("shortname", &self.shortname)
            .field("type", &self.plugin_type())
            .field("version", &self.version)
            .finish()
    }
}

impl Plugin {
    pub fn shortname(&self) -> &str {
        &self.shortname
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin_type(&self) -> PluginType {
        match self.kind {
            PluginKind::Xform { .. } => PluginType::Xform,
            PluginKind::Output { .. } => PluginType::Output,
        }
    }

    pub fn kind(&self) -> &PluginKind {
        &self.kind
    }

    pub fn xform(&self) -> Option<Arc<dyn Xform>> {
        match &self.kind {
            PluginKind::Xform { methods, .. } => Some(Arc::clone(methods)),
            PluginKind::Output { .. } => None,
        }
    }

    pub fn output(&self) -> Option<Arc<dyn Output>> {
        match &self.kind {
            PluginKind::Output { methods } => Some(Arc::clone(methods)),
            PluginKind::Xform { .. } => None,
        }
    }

    /// Mime globs this plugin accepts (empty for outputs).
    pub fn input_types(&self) -> &[String] {
        match &self.kind {
            PluginKind::Xform { input_types, .. } => input_types,
            PluginKind::Output { .. } => &[],
        }
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            shortname: self.shortname.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            plugin_type: self.plugin_type(),
            info: self.info.clone(),
        }
    }

    /// Full config key for a plugin property.
    pub fn config_key(&self, name: &str) -> String {
        format!("{}.{}", self.shortname, name)
    }

    /// Declared config properties as `(full key, default)`.
    pub fn config_properties(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.config
            .iter()
            .map(|(name, default)| (self.config_key(name), default.as_str()))
    }

    pub fn config_lookup<'s>(&self, store: &'s ConfigStore, name: &str) -> Option<&'s str> {
        store.lookup(&self.config_key(name))
    }
}
