//! Registry load/verify rules, lookup order and directory scanning.

use medley_core::{ConfigStore, PluginType};
use medley_plugins::plugin::{OUTPUT_API_VERSION, XFORM_API_VERSION};
use medley_plugins::xform::BrowseContext;
use medley_plugins::{
    Output, PluginBuilder, PluginDescriptor, PluginError, PluginRegistry, Xform, XformError,
};

struct Nothing;

impl Xform for Nothing {
    fn browse(&self, _ctx: &mut BrowseContext<'_>) -> Result<(), XformError> {
        Ok(())
    }
}

struct Mono;

impl Output for Mono {
    fn channels(&self) -> Vec<String> {
        vec!["mono".to_string()]
    }
}

fn xform_setup(builder: &mut PluginBuilder) -> Result<(), String> {
    builder
        .xform(Nothing)
        .input_type("audio/x-test")
        .info_add("author", "Test Author")
        .config_property_register("buffer", "4096");
    Ok(())
}

fn failing_setup(_builder: &mut PluginBuilder) -> Result<(), String> {
    Err("no device".to_string())
}

fn no_inputs_setup(builder: &mut PluginBuilder) -> Result<(), String> {
    builder.xform(Nothing);
    Ok(())
}

fn bad_magic_setup(builder: &mut PluginBuilder) -> Result<(), String> {
    builder
        .xform(Nothing)
        .input_type("audio/x-test")
        .magic_add("broken", "audio/x-test", "zero string x");
    Ok(())
}

fn output_setup(builder: &mut PluginBuilder) -> Result<(), String> {
    builder.output(Mono);
    Ok(())
}

fn desc(shortname: &'static str, setup: fn(&mut PluginBuilder) -> Result<(), String>) -> PluginDescriptor {
    PluginDescriptor {
        plugin_type: PluginType::Xform,
        api_version: XFORM_API_VERSION,
        shortname,
        name: "Test plugin",
        version: "1.0",
        description: "plugin used by tests",
        setup,
    }
}

// ---------------------------------------------------------------------------
// 1. Rejections
// ---------------------------------------------------------------------------

#[test]
fn unknown_type_is_rejected() {
    let mut registry = PluginRegistry::new();
    let d = PluginDescriptor {
        plugin_type: PluginType::All,
        ..desc("odd", xform_setup)
    };
    let err = registry.load(&d, None).unwrap_err();
    assert!(matches!(err, PluginError::UnknownType { .. }), "got: {err}");
    assert!(registry.is_empty());
}

#[test]
fn api_version_mismatch_is_rejected() {
    let mut registry = PluginRegistry::new();
    let d = PluginDescriptor {
        api_version: XFORM_API_VERSION + 1,
        ..desc("future", xform_setup)
    };
    let err = registry.load(&d, None).unwrap_err();
    assert!(
        matches!(err, PluginError::ApiVersion { expected, found, .. } if expected == XFORM_API_VERSION && found == XFORM_API_VERSION + 1),
        "got: {err}"
    );
}

#[test]
fn setup_failure_is_rejected() {
    let mut registry = PluginRegistry::new();
    let err = registry.load(&desc("broken", failing_setup), None).unwrap_err();
    assert!(err.to_string().contains("no device"), "got: {err}");
}

#[test]
fn xform_without_input_types_fails_verify() {
    let mut registry = PluginRegistry::new();
    let err = registry.load(&desc("bare", no_inputs_setup), None).unwrap_err();
    assert!(matches!(err, PluginError::Verify { .. }), "got: {err}");
}

#[test]
fn invalid_magic_fails_setup() {
    let mut registry = PluginRegistry::new();
    let err = registry.load(&desc("magic", bad_magic_setup), None).unwrap_err();
    assert!(matches!(err, PluginError::Setup { .. }), "got: {err}");
}

#[test]
fn output_type_with_xform_methods_fails_verify() {
    let mut registry = PluginRegistry::new();
    let d = PluginDescriptor {
        plugin_type: PluginType::Output,
        api_version: OUTPUT_API_VERSION,
        ..desc("confused", xform_setup)
    };
    assert!(matches!(
        registry.load(&d, None),
        Err(PluginError::Verify { .. })
    ));
}

// ---------------------------------------------------------------------------
// 2. Lookup
// ---------------------------------------------------------------------------

#[test]
fn last_loaded_plugin_is_found_first() {
    let mut registry = PluginRegistry::new();
    let first = PluginDescriptor {
        version: "1.0",
        ..desc("dup", xform_setup)
    };
    let second = PluginDescriptor {
        version: "2.0",
        ..desc("dup", xform_setup)
    };
    registry.load(&first, None).unwrap();
    registry.load(&second, None).unwrap();

    let found = registry.find(PluginType::Xform, "DUP").expect("case-insensitive");
    assert_eq!(found.info().version, "2.0");
    assert_eq!(registry.len(), 2);
}

#[test]
fn list_and_foreach_filter_by_type() {
    let mut registry = PluginRegistry::new();
    registry.load(&desc("a", xform_setup), None).unwrap();
    let out = PluginDescriptor {
        plugin_type: PluginType::Output,
        api_version: OUTPUT_API_VERSION,
        ..desc("mono", output_setup)
    };
    registry.load(&out, None).unwrap();
    registry.load(&desc("b", xform_setup), None).unwrap();

    assert_eq!(registry.list(PluginType::All).len(), 3);
    assert_eq!(registry.list(PluginType::Output).len(), 1);
    assert!(registry.find(PluginType::Output, "a").is_none());

    let mut seen = Vec::new();
    registry.foreach(PluginType::Xform, |p| {
        seen.push(p.shortname().to_string());
        false
    });
    assert_eq!(seen, vec!["b"]);
}

#[test]
fn client_list_carries_info_and_type() {
    let mut registry = PluginRegistry::new();
    registry.load(&desc("tagged", xform_setup), None).unwrap();
    let infos = registry.client_list(PluginType::All);
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].shortname, "tagged");
    assert_eq!(infos[0].plugin_type, PluginType::Xform);
    assert_eq!(infos[0].info.get("author").map(String::as_str), Some("Test Author"));
}

#[test]
fn config_properties_are_namespaced() {
    let mut registry = PluginRegistry::new();
    let plugin = registry.load(&desc("vorbis", xform_setup), None).unwrap();
    let mut store = ConfigStore::new();
    registry.register_config(&mut store);
    assert_eq!(store.lookup("vorbis.buffer"), Some("4096"));
    assert_eq!(plugin.config_lookup(&store, "buffer"), Some("4096"));
}

#[test]
fn builtins_register_null_volumes() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut registry = PluginRegistry::new();
    registry.init(dir.path());
    let mut store = ConfigStore::new();
    registry.register_config(&mut store);
    assert_eq!(store.lookup("null.volume.left"), Some("100"));
    assert_eq!(store.lookup("null.volume.right"), Some("100"));
    let names: Vec<_> = registry
        .client_list(PluginType::All)
        .into_iter()
        .map(|i| i.shortname)
        .collect();
    assert_eq!(names, vec!["rss", "null", "file"]);
}

#[test]
fn shutdown_drops_everything() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut registry = PluginRegistry::new();
    registry.init(dir.path());
    let held = registry.find(PluginType::Output, "null").unwrap();
    registry.shutdown();
    assert!(registry.is_empty());
    assert_eq!(held.shortname(), "null");
}

// ---------------------------------------------------------------------------
// 3. Directory scan
// ---------------------------------------------------------------------------

#[test]
fn scan_missing_directory_is_io_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut registry = PluginRegistry::new();
    let err = registry.scan_directory(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, PluginError::Io { .. }), "got: {err}");
}

#[test]
fn scan_skips_non_plugin_files() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("README"), b"not a plugin").unwrap();
    std::fs::write(dir.path().join("rss.so.txt"), b"").unwrap();
    std::fs::create_dir(dir.path().join(format!("libdir{}", medley_plugins::dynamic::LIB_SUFFIX)))
        .unwrap();
    let mut registry = PluginRegistry::new();
    assert_eq!(registry.scan_directory(dir.path()).unwrap(), 0);
}

#[test]
fn scan_logs_and_skips_broken_libraries() {
    let dir = tempfile::TempDir::new().unwrap();
    let name = format!("libgarbage{}", medley_plugins::dynamic::LIB_SUFFIX);
    std::fs::write(dir.path().join(name), b"\x7fELF not really").unwrap();
    let mut registry = PluginRegistry::new();
    assert_eq!(registry.scan_directory(dir.path()).unwrap(), 0);
    assert!(registry.is_empty());
}
