//! Stream type detection from leading bytes and file name extensions.

use medley_core::wildcard;

use crate::error::PluginError;

/// Fallback mime type when nothing matches.
pub const OCTET_STREAM: &str = "application/octet-stream";
/// Mime type of local directories.
pub const DIRECTORY_MIME: &str = "inode/directory";
/// How many leading bytes detection looks at.
pub const HEAD_SIZE: usize = 1024;

/// Byte test of a magic rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicTest {
    /// `pattern` found exactly at `offset`.
    Prefix {
        offset: usize,
        pattern: Vec<u8>,
        case_insensitive: bool,
    },
    /// `pattern` found anywhere in the `range` bytes starting at `offset`.
    Contains {
        offset: usize,
        range: usize,
        pattern: Vec<u8>,
        case_insensitive: bool,
    },
}

impl MagicTest {
    /// Parse a rule in `file(1)` style:
    ///
    /// * `"<offset> string[/c] <pattern>"` matches at `offset`;
    /// * `"<offset> search/<n>[/c] <pattern>"` matches within the `n` bytes from `offset`.
    ///
    /// The pattern is everything after the second space, trailing blanks included.
    pub fn parse(rule: &str) -> Result<Self, PluginError> {
        let invalid = || PluginError::Magic(rule.to_string());
        let (offset, rest) = rule.split_once(' ').ok_or_else(invalid)?;
        let (kind, pattern) = rest.split_once(' ').ok_or_else(invalid)?;
        let offset: usize = offset.parse().map_err(|_| invalid())?;
        if pattern.is_empty() {
            return Err(invalid());
        }
        let pattern = pattern.as_bytes().to_vec();

        let (kind, case_insensitive) = match kind.strip_suffix("/c") {
            Some(kind) => (kind, true),
            None => (kind, false),
        };
        if kind == "string" {
            return Ok(MagicTest::Prefix {
                offset,
                pattern,
                case_insensitive,
            });
        }
        let range = kind.strip_prefix("search/").ok_or_else(invalid)?;
        let range: usize = range.parse().map_err(|_| invalid())?;
        Ok(MagicTest::Contains {
            offset,
            range,
            pattern,
            case_insensitive,
        })
    }

    pub fn matches(&self, head: &[u8]) -> bool {
        match self {
            MagicTest::Prefix {
                offset,
                pattern,
                case_insensitive,
            } => head
                .get(*offset..offset + pattern.len())
                .is_some_and(|window| bytes_eq(window, pattern, *case_insensitive)),
            MagicTest::Contains {
                offset,
                range,
                pattern,
                case_insensitive,
            } => {
                if pattern.is_empty() {
                    return false;
                }
                let end = head.len().min(offset.saturating_add(*range));
                let Some(area) = head.get(*offset..end) else {
                    return false;
                };
                area
                    .windows(pattern.len())
                    .any(|window| bytes_eq(window, pattern, *case_insensitive))
            }
        }
    }
}

fn bytes_eq(a: &[u8], b: &[u8], case_insensitive: bool) -> bool {
    if case_insensitive {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicRule {
    pub description: String,
    pub mime: String,
    pub test: MagicTest,
}

/// File name glob mapped to a mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRule {
    pub mime: String,
    pub glob: String,
}

/// All magic and extension rules registered by plugins.
#[derive(Debug, Clone, Default)]
pub struct MagicTable {
    rules: Vec<MagicRule>,
    extensions: Vec<ExtensionRule>,
}

impl MagicTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: MagicRule) {
        self.rules.push(rule);
    }

    pub fn extension_add(&mut self, rule: ExtensionRule) {
        self.extensions.push(rule);
    }

    /// Detect the mime type of a stream from its first bytes and its url.
    pub fn detect(&self, head: &[u8], url: &str) -> String {
        if let Some(rule) = self.rules.iter().find(|rule| rule.test.matches(head)) {
            tracing::debug!(url, rule = %rule.description, mime = %rule.mime, "magic match");
            return rule.mime.clone();
        }
        let name = file_name(url);
        self.extensions
            .iter()
            .find(|ext| wildcard::matches_ignore_case(&ext.glob, name))
            .map(|ext| ext.mime.clone())
            .unwrap_or_else(|| OCTET_STREAM.to_string())
    }
}

// Last path component, without query string or fragment.
fn file_name(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.rsplit('/').next().unwrap_or(url)
}
