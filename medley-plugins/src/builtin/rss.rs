//! RSS podcast reader: lists the enclosure of every feed item.

use std::borrow::Cow;

use medley_core::PluginType;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use crate::error::XformError;
use crate::plugin::{PluginBuilder, PluginDescriptor, XFORM_API_VERSION};
use crate::xform::{BrowseContext, Xform};

/// Longest item title kept, in bytes.
pub const TITLE_MAX: usize = 4095;

pub const DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    plugin_type: PluginType::Xform,
    api_version: XFORM_API_VERSION,
    shortname: "rss",
    name: "reader for rss podcasts",
    version: env!("CARGO_PKG_VERSION"),
    description: "reader for rss podcasts",
    setup,
};

fn setup(builder: &mut PluginBuilder) -> Result<(), String> {
    builder
        .xform(RssXform)
        .input_type("application/x-medley-xml+rss")
        .input_type("application/rss+xml*")
        .magic_add("rss tag", "application/x-medley-xml+rss", "0 string/c <rss ")
        .magic_add(
            "rss tag after prolog",
            "application/x-medley-xml+rss",
            "0 search/1024/c <rss ",
        )
        .extension_add("application/rss+xml", "*.rss");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nav {
    Rss,
    Channel,
    Item,
    ItemTitle,
}

#[derive(Debug)]
struct FeedState {
    nav: Nav,
    item_url: Option<String>,
    item_title: String,
}

impl FeedState {
    // Qualified names are compared, so `<itunes:title>` is not an item title.
    fn start(&mut self, name: &[u8]) {
        self.nav = match (name, self.nav) {
            (b"rss", _) => Nav::Rss,
            (b"channel", Nav::Rss) => Nav::Channel,
            (b"item", Nav::Channel) => Nav::Item,
            (b"title", Nav::Item) => Nav::ItemTitle,
            (_, nav) => nav,
        };
    }

    // Pieces are joined untrimmed; only the ends of the whole title are trimmed.
    fn text(&mut self, text: &str) {
        if self.nav != Nav::ItemTitle {
            return;
        }
        let text = if self.item_title.is_empty() {
            text.trim_start()
        } else {
            text
        };
        let room = TITLE_MAX.saturating_sub(self.item_title.len());
        if text.len() <= room {
            self.item_title.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.item_title.push_str(&text[..cut]);
    }

    fn end(&mut self, name: &[u8], ctx: &mut BrowseContext<'_>) {
        match (name, self.nav) {
            (b"item", Nav::Item) => {
                self.nav = Nav::Channel;
                let mut title = std::mem::take(&mut self.item_title);
                title.truncate(title.trim_end().len());
                match self.item_url.take() {
                    Some(url) => {
                        ctx.add_symlink(url);
                        if !title.is_empty() {
                            ctx.add_entry_property("title", title);
                        }
                    }
                    None => debug!(%title, "item without enclosure skipped"),
                }
            }
            (b"title", Nav::ItemTitle) => self.nav = Nav::Item,
            (b"channel", Nav::Channel) => self.nav = Nav::Rss,
            (_, nav) => debug!(
                element = %String::from_utf8_lossy(name),
                state = ?nav,
                "end element ignored"
            ),
        }
    }
}

/// Streaming feed parser behind the `rss` plugin.
#[derive(Debug, Default, Clone, Copy)]
pub struct RssXform;

impl Xform for RssXform {
    fn browse(&self, ctx: &mut BrowseContext<'_>) -> Result<(), XformError> {
        let input = ctx.take_input()?;
        // The declared encoding (e.g. ISO-8859-1) is picked up from the prolog.
        let mut reader = Reader::from_reader(input);

        let mut state = FeedState {
            nav: Nav::Rss,
            item_url: None,
            item_title: String::new(),
        };
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut seen_root = false;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| match e {
                quick_xml::Error::Io(io) => {
                    XformError::Read(std::io::Error::new(io.kind(), io.to_string()))
                }
                other => parse_error(&reader, other),
            })?;
            match event {
                Event::Start(e) => {
                    depth += 1;
                    seen_root = true;
                    state.start(e.name().as_ref());
                    enclosure_url(&e, reader.decoder(), &mut state)?;
                }
                Event::Empty(e) => {
                    seen_root = true;
                    // `<item/>` opens and closes in one event.
                    state.start(e.name().as_ref());
                    enclosure_url(&e, reader.decoder(), &mut state)?;
                    state.end(e.name().as_ref(), ctx);
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    state.end(e.name().as_ref(), ctx);
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(|err| parse_error(&reader, err))?;
                    state.text(&text);
                }
                Event::CData(e) => {
                    let text = e
                        .decode()
                        .map_err(|err| parse_error(&reader, err.into()))?;
                    state.text(&text);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !seen_root {
            return Err(XformError::Parse(format!("{}: empty document", ctx.url())));
        }
        if depth > 0 {
            return Err(XformError::Parse(format!(
                "{}: document ends with {depth} unclosed element(s)",
                ctx.url()
            )));
        }
        Ok(())
    }
}

fn enclosure_url(
    e: &BytesStart<'_>,
    decoder: Decoder,
    state: &mut FeedState,
) -> Result<(), XformError> {
    if e.name().as_ref() != b"enclosure" {
        return Ok(());
    }
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XformError::Parse(format!("bad attribute: {err}")))?;
        if attr.key.as_ref() != b"url" {
            continue;
        }
        let value: Cow<'_, str> = attr
            .decode_and_unescape_value(decoder)
            .map_err(|err| XformError::Parse(format!("bad url attribute: {err}")))?;
        debug!(url = %value, "found enclosure url");
        state.item_url = Some(value.into_owned());
        return Ok(());
    }
    debug!("enclosure without url attribute");
    Ok(())
}

fn parse_error<R>(reader: &Reader<R>, err: quick_xml::Error) -> XformError {
    XformError::Parse(format!(
        "XML error at byte {}: {err}",
        reader.buffer_position()
    ))
}
