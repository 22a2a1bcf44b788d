//! Shared-object plugins.
//!
//! A plugin library exports its descriptor as
//!
//! ```ignore
//! #[no_mangle]
//! pub static MEDLEY_PLUGIN_DESC: PluginDescriptor = PluginDescriptor { .. };
//! ```
//!
//! and must be built with the same compiler and `medley-plugins` version as
//! the daemon. Loading is only compiled in with the `dynamic-plugins` feature.

use std::path::Path;

use crate::error::PluginError;
use crate::plugin::PluginDescriptor;

/// Name of the exported descriptor symbol.
pub const DESCRIPTOR_SYMBOL: &str = "MEDLEY_PLUGIN_DESC";

/// Platform suffix of loadable plugin files.
#[cfg(target_os = "macos")]
pub const LIB_SUFFIX: &str = ".dylib";
#[cfg(windows)]
pub const LIB_SUFFIX: &str = ".dll";
#[cfg(not(any(target_os = "macos", windows)))]
pub const LIB_SUFFIX: &str = ".so";

/// A shared object kept open for as long as its plugin lives.
pub struct LoadedLibrary {
    #[cfg(feature = "dynamic-plugins")]
    _library: libloading::Library,
}

/// True for names like `librss.so`: `lib` prefix and the platform suffix.
pub fn is_plugin_file_name(name: &str) -> bool {
    name.starts_with("lib") && name.contains(LIB_SUFFIX)
}

/// Open `path` and copy out its descriptor.
#[cfg(feature = "dynamic-plugins")]
pub fn open(path: &Path) -> Result<(LoadedLibrary, PluginDescriptor), PluginError> {
    let library_err = |message: String| PluginError::Library {
        path: path.to_path_buf(),
        message,
    };

    // SAFETY: loading runs the library's initialisers; plugin directories are
    // trusted the same way the daemon binary is.
    let library =
        unsafe { libloading::Library::new(path) }.map_err(|e| library_err(e.to_string()))?;

    // SAFETY: the symbol is a `PluginDescriptor` static built against this crate.
    let descriptor = unsafe {
        let symbol: libloading::Symbol<'_, *const PluginDescriptor> = library
            .get(DESCRIPTOR_SYMBOL.as_bytes())
            .map_err(|_| library_err(format!("missing symbol {DESCRIPTOR_SYMBOL}")))?;
        let ptr: *const PluginDescriptor = *symbol;
        if ptr.is_null() {
            return Err(library_err(format!("{DESCRIPTOR_SYMBOL} is null")));
        }
        *ptr
    };

    Ok((LoadedLibrary { _library: library }, descriptor))
}

/// Without the `dynamic-plugins` feature every candidate is rejected.
#[cfg(not(feature = "dynamic-plugins"))]
pub fn open(path: &Path) -> Result<(LoadedLibrary, PluginDescriptor), PluginError> {
    Err(PluginError::Library {
        path: path.to_path_buf(),
        message: "dynamic plugin support not compiled in".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_file_names() {
        assert!(is_plugin_file_name(&format!("librss{LIB_SUFFIX}")));
        assert!(is_plugin_file_name(&format!("libfoo{LIB_SUFFIX}.1")));
        assert!(!is_plugin_file_name(&format!("rss{LIB_SUFFIX}")));
        assert!(!is_plugin_file_name("libnotes.txt"));
    }

    #[cfg(not(feature = "dynamic-plugins"))]
    #[test]
    fn open_without_feature_fails() {
        let err = match open(Path::new("/nowhere/librss.so")) {
            Err(err) => err,
            Ok(_) => panic!("open must fail without dynamic-plugins"),
        };
        assert!(err.to_string().contains("not compiled in"));
    }
}
