//! Browsing urls through xforms, importing them into the media library and
//! refreshing entry metadata.

use std::collections::{HashSet, VecDeque};
use std::io::{BufReader, Cursor, Read};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use medley_core::types::status;
use medley_core::{BrowseEntry, MediaId, MediaLib, MedialibError, PropertyValue};
use medley_plugins::builtin::file::{path_to_url, url_to_path};
use medley_plugins::magic::{DIRECTORY_MIME, HEAD_SIZE};
use medley_plugins::xform::{self, BrowseContext};
use medley_plugins::PluginRegistry;

use crate::error::DaemonError;
use crate::transport;

/// Buffer sizes taken from `transport.buffersize` and `decoder.buffersize`.
#[derive(Debug, Clone, Copy)]
pub struct BufferSizes {
    pub transport: usize,
    pub decoder: usize,
}

impl Default for BufferSizes {
    fn default() -> Self {
        Self {
            transport: 32768,
            decoder: 32768,
        }
    }
}

/// Entries found by one xform.
#[derive(Debug)]
pub struct Browsed {
    pub xform: String,
    pub entries: Vec<BrowseEntry>,
}

/// Browse `url` with the first xform that accepts its type.
pub fn browse(
    plugins: &PluginRegistry,
    url: &str,
    sizes: BufferSizes,
) -> Result<Browsed, DaemonError> {
    if let Some(path) = url_to_path(url).filter(|p| p.is_dir()) {
        let url = path_to_url(&path);
        let (plugin, methods) =
            plugins
                .find_xform_for(DIRECTORY_MIME)
                .ok_or_else(|| DaemonError::NoXform {
                    url: url.clone(),
                    mime: DIRECTORY_MIME.to_string(),
                })?;
        let entries = xform::browse(methods.as_ref(), BrowseContext::new(url))?;
        return Ok(Browsed {
            xform: plugin.shortname().to_string(),
            entries,
        });
    }

    let mut stream = transport::open(url, sizes.transport)?;
    let head = transport::read_head(&mut stream, HEAD_SIZE).map_err(|e| DaemonError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let mime = plugins.magic().detect(&head, url);
    let (plugin, methods) = plugins
        .find_xform_for(&mime)
        .ok_or_else(|| DaemonError::NoXform {
            url: url.to_string(),
            mime: mime.clone(),
        })?;
    debug!(url, %mime, xform = plugin.shortname(), "browsing");

    // The xform sees the whole stream, including the bytes used for detection.
    let input = BufReader::with_capacity(sizes.decoder, Cursor::new(head).chain(stream));
    let entries = xform::browse(methods.as_ref(), BrowseContext::with_input(url, input))?;
    Ok(Browsed {
        xform: plugin.shortname().to_string(),
        entries,
    })
}

/// Add `url` to the library, descending into anything browsable.
///
/// Directories found while browsing are visited breadth first; every other
/// entry is added together with the properties its xform reported. A
/// top-level url no xform can browse is added as a single entry.
pub fn import(
    plugins: &PluginRegistry,
    medialib: &mut MediaLib,
    url: &str,
    sizes: BufferSizes,
) -> Result<Vec<MediaId>, DaemonError> {
    let mut added = Vec::new();
    let top = match browse(plugins, url, sizes) {
        Ok(browsed) => browsed,
        Err(DaemonError::NoXform { mime, .. }) => {
            debug!(url, %mime, "not browsable, adding as a single entry");
            let id = medialib.add_entry(url);
            resolve(plugins, medialib, id)?;
            return Ok(vec![id]);
        }
        Err(e) => return Err(e),
    };

    let mut queue = VecDeque::from([top]);
    let mut visited = HashSet::from([url.to_string()]);
    while let Some(browsed) = queue.pop_front() {
        let source = format!("plugin/{}", browsed.xform);
        for entry in browsed.entries {
            let target = entry.target().to_string();
            if entry.isdir {
                if !visited.insert(target.clone()) {
                    continue;
                }
                match browse(plugins, &target, sizes) {
                    Ok(next) => queue.push_back(next),
                    Err(e) => warn!(url = %target, error = %e, "skipping unbrowsable directory"),
                }
                continue;
            }
            let id = add_browsed(medialib, &source, &target, entry.properties)?;
            resolve(plugins, medialib, id)?;
            added.push(id);
        }
    }
    info!(url, count = added.len(), "import finished");
    Ok(added)
}

/// Add `url` with the properties its xform reported under `source`.
///
/// Keys the media library keeps to itself (`id`, `url`) are dropped.
fn add_browsed(
    medialib: &mut MediaLib,
    source: &str,
    url: &str,
    properties: impl IntoIterator<Item = (String, PropertyValue)>,
) -> Result<MediaId, DaemonError> {
    let id = medialib.add_entry(url);
    for (key, value) in properties {
        match medialib.property_set(id, source, &key, value) {
            Ok(()) => {}
            Err(MedialibError::ReadOnlyProperty(key)) => {
                debug!(%url, %source, %key, "read-only property from xform dropped");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(id)
}

/// Refresh server-owned metadata of one entry.
///
/// Local files get `size`, `lmod`, `mime` and `status`; a missing file is
/// marked not available. Remote urls are trusted.
pub fn resolve(
    plugins: &PluginRegistry,
    medialib: &mut MediaLib,
    id: MediaId,
) -> Result<(), DaemonError> {
    let url = medialib.entry(id)?.url.clone();
    medialib.server_property_set(id, "status", PropertyValue::Int(status::RESOLVING))?;

    let Some(path) = url_to_path(&url) else {
        medialib.server_property_set(id, "status", PropertyValue::Int(status::OK))?;
        return Ok(());
    };
    let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!(id = %id, path = %path.display(), error = %e, "entry not available");
            medialib.server_property_set(
                id,
                "status",
                PropertyValue::Int(status::NOT_AVAILABLE),
            )?;
            return Ok(());
        }
    };

    let mime = if metadata.is_dir() {
        DIRECTORY_MIME.to_string()
    } else {
        let head = std::fs::File::open(&path)
            .and_then(|mut file| transport::read_head(&mut file, HEAD_SIZE))
            .unwrap_or_default();
        plugins.magic().detect(&head, &url)
    };
    let size = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
    medialib.server_property_set(id, "size", PropertyValue::Int(size))?;
    if let Ok(modified) = metadata.modified() {
        let lmod = DateTime::<Utc>::from(modified).timestamp();
        medialib.server_property_set(id, "lmod", PropertyValue::Int(lmod))?;
    }
    medialib.server_property_set(id, "mime", PropertyValue::Str(mime))?;
    medialib.server_property_set(id, "status", PropertyValue::Int(status::OK))?;
    Ok(())
}

/// Resolve `id`, or every entry for [`MediaId::NONE`].
pub fn rehash(
    plugins: &PluginRegistry,
    medialib: &mut MediaLib,
    id: MediaId,
) -> Result<usize, DaemonError> {
    let ids = if id.is_none() {
        medialib.ids()
    } else {
        vec![id]
    };
    for id in &ids {
        resolve(plugins, medialib, *id)?;
    }
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FEED: &str = r#"<rss version="2.0"><channel>
        <item><title>One</title><enclosure url="http://example.com/1.mp3"/></item>
        <item><title>Two</title><enclosure url="http://example.com/2.mp3"/></item>
        </channel></rss>"#;

    fn registry(tmp: &TempDir) -> PluginRegistry {
        let mut plugins = PluginRegistry::new();
        plugins.init(&tmp.path().join("plugins"));
        plugins
    }

    fn prop<'a>(lib: &'a MediaLib, id: MediaId, key: &str, source: &str) -> Option<&'a PropertyValue> {
        lib.entry(id).ok()?.properties.get(key)?.get(source)
    }

    #[test]
    fn browse_feed_file() {
        let tmp = TempDir::new().unwrap();
        let feed = tmp.path().join("podcast.xml");
        std::fs::write(&feed, FEED).unwrap();

        let browsed = browse(&registry(&tmp), &path_to_url(&feed), BufferSizes::default()).unwrap();
        assert_eq!(browsed.xform, "rss");
        assert_eq!(browsed.entries.len(), 2);
        assert_eq!(browsed.entries[1].target(), "http://example.com/2.mp3");
    }

    #[test]
    fn browse_unknown_type_names_mime() {
        let tmp = TempDir::new().unwrap();
        let song = tmp.path().join("song.ogg");
        std::fs::write(&song, b"OggS\0\0\0").unwrap();
        let err = browse(&registry(&tmp), &path_to_url(&song), BufferSizes::default()).unwrap_err();
        assert!(
            err.to_string().contains("application/octet-stream"),
            "got: {err}"
        );
    }

    #[test]
    fn import_walks_directories_and_feeds_properties() {
        let tmp = TempDir::new().unwrap();
        let music = tmp.path().join("music");
        std::fs::create_dir_all(music.join("album")).unwrap();
        std::fs::write(music.join("album/01.ogg"), b"OggS").unwrap();
        std::fs::write(music.join("top.ogg"), b"OggS").unwrap();
        std::fs::write(music.join(".DS_Store"), b"").unwrap();

        let plugins = registry(&tmp);
        let mut lib = MediaLib::new();
        let ids = import(&plugins, &mut lib, &path_to_url(&music), BufferSizes::default()).unwrap();
        assert_eq!(ids.len(), 2);
        let urls: Vec<_> = ids.iter().map(|id| lib.entry(*id).unwrap().url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                path_to_url(&music.join("top.ogg")),
                path_to_url(&music.join("album/01.ogg")),
            ]
        );
        assert_eq!(
            prop(&lib, ids[0], "status", "server"),
            Some(&PropertyValue::Int(status::OK))
        );
        assert_eq!(
            prop(&lib, ids[0], "size", "plugin/file"),
            Some(&PropertyValue::Int(4))
        );

        let feed = tmp.path().join("feed.rss");
        std::fs::write(&feed, FEED).unwrap();
        let ids = import(&plugins, &mut lib, &path_to_url(&feed), BufferSizes::default()).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(
            prop(&lib, ids[0], "title", "plugin/rss"),
            Some(&PropertyValue::Str("One".into()))
        );
    }

    #[test]
    fn xform_properties_skip_read_only_keys() {
        let mut lib = MediaLib::new();
        let first = add_browsed(
            &mut lib,
            "plugin/rss",
            "http://example.com/1.mp3",
            [
                ("url".to_string(), PropertyValue::from("http://evil/")),
                ("title".to_string(), PropertyValue::from("One")),
                ("id".to_string(), PropertyValue::Int(42)),
            ],
        )
        .unwrap();
        let second = add_browsed(
            &mut lib,
            "plugin/rss",
            "http://example.com/2.mp3",
            Vec::<(String, PropertyValue)>::new(),
        )
        .unwrap();

        assert_eq!(lib.len(), 2);
        assert_eq!(lib.entry(first).unwrap().url, "http://example.com/1.mp3");
        assert_eq!(
            prop(&lib, first, "title", "plugin/rss"),
            Some(&PropertyValue::Str("One".into()))
        );
        assert!(prop(&lib, first, "url", "plugin/rss").is_none());
        assert_eq!(second, MediaId(2));
    }

    #[test]
    fn import_single_file() {
        let tmp = TempDir::new().unwrap();
        let song = tmp.path().join("song.ogg");
        std::fs::write(&song, b"OggS").unwrap();
        let mut lib = MediaLib::new();
        let ids = import(&registry(&tmp), &mut lib, &path_to_url(&song), BufferSizes::default())
            .unwrap();
        assert_eq!(ids, vec![MediaId(1)]);
        assert_eq!(
            prop(&lib, ids[0], "mime", "server"),
            Some(&PropertyValue::Str("application/octet-stream".into()))
        );
    }

    #[test]
    fn rehash_marks_missing_files() {
        let tmp = TempDir::new().unwrap();
        let song = tmp.path().join("gone.ogg");
        std::fs::write(&song, b"OggS").unwrap();
        let plugins = registry(&tmp);
        let mut lib = MediaLib::new();
        let id = lib.add_entry(&path_to_url(&song));
        let remote = lib.add_entry("http://example.com/stream.mp3");

        std::fs::remove_file(&song).unwrap();
        assert_eq!(rehash(&plugins, &mut lib, MediaId::NONE).unwrap(), 2);
        assert_eq!(
            prop(&lib, id, "status", "server"),
            Some(&PropertyValue::Int(status::NOT_AVAILABLE))
        );
        assert_eq!(
            prop(&lib, remote, "status", "server"),
            Some(&PropertyValue::Int(status::OK))
        );
    }
}
