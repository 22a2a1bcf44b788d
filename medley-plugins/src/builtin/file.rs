//! Local directory listing.

use std::path::{Path, PathBuf};

use medley_core::PluginType;
use tracing::debug;

use crate::error::XformError;
use crate::magic::DIRECTORY_MIME;
use crate::plugin::{PluginBuilder, PluginDescriptor, XFORM_API_VERSION};
use crate::xform::{BrowseContext, Xform};

pub const DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    plugin_type: PluginType::Xform,
    api_version: XFORM_API_VERSION,
    shortname: "file",
    name: "File transport",
    version: env!("CARGO_PKG_VERSION"),
    description: "Browse local directories",
    setup,
};

fn setup(builder: &mut PluginBuilder) -> Result<(), String> {
    builder.xform(FileXform).input_type(DIRECTORY_MIME);
    Ok(())
}

/// Local path named by a `file://` url or a bare absolute path.
pub fn url_to_path(url: &str) -> Option<PathBuf> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    let path = Path::new(path);
    path.is_absolute().then(|| path.to_path_buf())
}

/// `file://` url of an absolute path.
pub fn path_to_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileXform;

impl Xform for FileXform {
    fn browse(&self, ctx: &mut BrowseContext<'_>) -> Result<(), XformError> {
        let dir = url_to_path(ctx.url())
            .ok_or_else(|| XformError::Parse(format!("not a local url: {}", ctx.url())))?;
        let mut children = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(XformError::Read)? {
            let entry = entry.map_err(XformError::Read)?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            // Follows symlinks, so a link to a directory is browsable.
            let metadata = match std::fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            children.push((name, metadata));
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, metadata) in children {
            ctx.add_entry(path_to_url(&dir.join(&name)), metadata.is_dir());
            if metadata.is_file() {
                ctx.add_entry_property("size", i64::try_from(metadata.len()).unwrap_or(i64::MAX));
            }
        }
        Ok(())
    }
}
