//! Xform plugins: turn a stream (or a directory) into browse entries.

use std::io::BufRead;

use medley_core::{BrowseEntry, PropertyValue};
use tracing::debug;

use crate::error::XformError;

/// Browse capability of an xform plugin.
pub trait Xform: Send + Sync {
    /// List the entries reachable from `ctx.url()`, adding them to `ctx`.
    fn browse(&self, ctx: &mut BrowseContext<'_>) -> Result<(), XformError>;
}

/// Input stream and collected entries of one browse call.
pub struct BrowseContext<'a> {
    url: String,
    input: Option<Box<dyn BufRead + 'a>>,
    entries: Vec<BrowseEntry>,
}

impl<'a> BrowseContext<'a> {
    /// Context without a stream (directory listings).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            input: None,
            entries: Vec::new(),
        }
    }

    pub fn with_input(url: impl Into<String>, input: impl BufRead + 'a) -> Self {
        Self {
            url: url.into(),
            input: Some(Box::new(input)),
            entries: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Hand the input stream to the xform. Can only be taken once.
    pub fn take_input(&mut self) -> Result<Box<dyn BufRead + 'a>, XformError> {
        self.input
            .take()
            .ok_or_else(|| XformError::NoInput(self.url.clone()))
    }

    pub fn add_entry(&mut self, path: impl Into<String>, isdir: bool) {
        self.entries.push(BrowseEntry::file(path, isdir));
    }

    /// Add an entry that points at another url.
    pub fn add_symlink(&mut self, target: impl Into<String>) {
        let target = target.into();
        let mut entry = BrowseEntry::file(target.clone(), false);
        entry.realpath = Some(target);
        self.entries.push(entry);
    }

    /// Attach a property to the most recently added entry.
    pub fn add_entry_property(&mut self, key: &str, value: impl Into<PropertyValue>) {
        match self.entries.last_mut() {
            Some(entry) => {
                entry.properties.insert(key.to_string(), value.into());
            }
            None => debug!(url = %self.url, key, "property without an entry, ignored"),
        }
    }

    pub fn into_entries(self) -> Vec<BrowseEntry> {
        self.entries
    }
}

/// Run `xform` over `ctx`; entries are only returned when the whole browse succeeded.
pub fn browse(xform: &dyn Xform, mut ctx: BrowseContext<'_>) -> Result<Vec<BrowseEntry>, XformError> {
    xform.browse(&mut ctx)?;
    Ok(ctx.into_entries())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Xform for Failing {
        fn browse(&self, ctx: &mut BrowseContext<'_>) -> Result<(), XformError> {
            ctx.add_entry("file:///half", false);
            Err(XformError::Parse("boom".into()))
        }
    }

    #[test]
    fn failed_browse_returns_no_entries() {
        let err = browse(&Failing, BrowseContext::new("file:///x")).unwrap_err();
        assert!(matches!(err, XformError::Parse(_)));
    }

    #[test]
    fn input_can_only_be_taken_once() {
        let mut ctx = BrowseContext::with_input("http://a/feed", &b"<rss />"[..]);
        assert!(ctx.take_input().is_ok());
        assert!(matches!(ctx.take_input(), Err(XformError::NoInput(_))));
    }

    #[test]
    fn properties_attach_to_last_entry() {
        let mut ctx = BrowseContext::new("feed");
        ctx.add_entry_property("title", "orphan");
        ctx.add_symlink("http://a/1.mp3");
        ctx.add_entry_property("title", "One");
        let entries = ctx.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].realpath.as_deref(), Some("http://a/1.mp3"));
        assert_eq!(entries[0].properties["title"], PropertyValue::Str("One".into()));
    }
}
