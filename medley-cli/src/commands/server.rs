//! `medley server`: media library and daemon settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use medley_core::{wildcard, MediaId, PluginType, PropertyValue, Query};
use medley_daemon::SyncClient;
use medley_plugins::builtin::file::{path_to_url, url_to_path};

use super::{connect, format_property, CLIENT_NAME};

/// Highest volume a channel accepts.
const MAX_VOLUME: i64 = 100;

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// Add files, directories or urls to the media library.
    Import(ImportArgs),
    /// List what the daemon finds at a url.
    Browse {
        url: String,
    },
    /// Remove matching entries from the media library.
    Remove {
        pattern: Vec<String>,
    },
    /// Refresh metadata of matching entries, or of the whole library.
    Rehash {
        pattern: Vec<String>,
    },
    /// List config values, or set one.
    Config {
        /// Key, or a `*`/`?` pattern when listing.
        name: Option<String>,
        value: Option<String>,
    },
    /// Show, set or delete entry properties.
    Property(PropertyArgs),
    /// List loaded plugins.
    Plugins,
    /// Show or change output volume.
    Volume(VolumeArgs),
    /// Print daemon uptime and version.
    Stats,
    /// Save the media library and config now.
    Sync,
    /// Stop the daemon.
    Shutdown,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Add directories as single entries instead of importing their contents.
    #[arg(short = 'N', long)]
    pub non_recursive: bool,

    /// Paths or urls; the last path component may contain `*` and `?`.
    pub paths: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PropertyArgs {
    /// Remove the property instead of setting it.
    #[arg(short = 'D', long)]
    pub delete: bool,

    /// Store the value as an integer.
    #[arg(short = 'i', long)]
    pub int: bool,

    /// Store the value as a string even when it looks like a number.
    #[arg(short = 's', long)]
    pub string: bool,

    /// Property source (default: client/medley-cli).
    #[arg(short = 'S', long)]
    pub source: Option<String>,

    pub id: u32,
    pub name: Option<String>,
    pub value: Option<String>,
}

#[derive(Args, Debug)]
pub struct VolumeArgs {
    /// Only this channel.
    #[arg(short, long)]
    pub channel: Option<String>,

    /// Absolute volume, or a relative change like `+5` / `-10`.
    #[arg(allow_hyphen_values = true)]
    pub volume: Option<String>,
}

pub fn run(command: ServerCommand, socket: Option<PathBuf>) -> Result<()> {
    match command {
        ServerCommand::Import(args) => import(args, socket),
        ServerCommand::Browse { url } => {
            let entries = connect(socket)?
                .browse(&url)
                .with_context(|| format!("failed to browse {url}"))?;
            for entry in entries {
                let path = entry.realpath.as_deref().unwrap_or(&entry.path);
                if entry.isdir {
                    println!("{path}/");
                } else {
                    println!("{path}");
                }
            }
            Ok(())
        }
        ServerCommand::Remove { pattern } => {
            if pattern.is_empty() {
                bail!("you must provide a pattern");
            }
            let query = parse_pattern(&pattern)?;
            let mut client = connect(socket)?;
            for id in client.query_ids(&query).context("query failed")? {
                client
                    .medialib_remove_entry(id)
                    .with_context(|| format!("failed to remove entry {id}"))?;
            }
            Ok(())
        }
        ServerCommand::Rehash { pattern } => {
            let query = (!pattern.is_empty())
                .then(|| parse_pattern(&pattern))
                .transpose()?;
            let mut client = connect(socket)?;
            let ids = match query {
                Some(query) => client.query_ids(&query).context("query failed")?,
                None => vec![MediaId::NONE],
            };
            for id in ids {
                client
                    .medialib_rehash(id)
                    .with_context(|| format!("failed to rehash entry {id}"))?;
            }
            Ok(())
        }
        ServerCommand::Config { name, value } => {
            let mut client = connect(socket)?;
            match (name, value) {
                (Some(name), Some(value)) => client
                    .config_set(&name, &value)
                    .with_context(|| format!("failed to set {name}")),
                (name, _) => {
                    let config = client.config_list().context("failed to list config")?;
                    for (key, value) in config {
                        if name.as_deref().map_or(true, |n| wildcard::matches(n, &key)) {
                            println!("{key} = {value}");
                        }
                    }
                    Ok(())
                }
            }
        }
        ServerCommand::Property(args) => property(args, socket),
        ServerCommand::Plugins => {
            let mut plugins = connect(socket)?
                .list_plugins(PluginType::All)
                .context("failed to list plugins")?;
            plugins.sort_by(|a, b| a.shortname.cmp(&b.shortname));
            for plugin in plugins {
                println!("{:<15} - {}", plugin.shortname, plugin.description);
            }
            Ok(())
        }
        ServerCommand::Volume(args) => volume(args, socket),
        ServerCommand::Stats => {
            let stats = connect(socket)?.stats().context("failed to get stats")?;
            println!("uptime = {}", stats.uptime);
            println!("version = {}", stats.version);
            Ok(())
        }
        ServerCommand::Sync => connect(socket)?.coll_sync().context("sync failed"),
        ServerCommand::Shutdown => connect(socket)?.quit().context("shutdown failed"),
    }
}

fn parse_pattern(words: &[String]) -> Result<Query> {
    let pattern = words.join(" ");
    Query::parse(&pattern).with_context(|| format!("failed to parse pattern '{pattern}'"))
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

fn import(args: ImportArgs, socket: Option<PathBuf>) -> Result<()> {
    if args.paths.is_empty() {
        bail!("no path to import");
    }
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    let mut client = connect(socket)?;

    for arg in &args.paths {
        let Some(url) = format_url(arg, &cwd) else {
            eprintln!("{} skipping invalid url: '{arg}'", "warning:".yellow());
            continue;
        };
        for (target, isdir) in matching_browse(&mut client, &url)? {
            if args.non_recursive || !isdir {
                client
                    .medialib_add_entry(&target)
                    .with_context(|| format!("failed to add {target}"))?;
            } else {
                client
                    .medialib_import_path(&target)
                    .with_context(|| format!("failed to import {target}"))?;
            }
        }
    }
    Ok(())
}

/// Turn a command line path into a url. Local paths must exist unless their
/// last component is a wildcard pattern.
fn format_url(arg: &str, cwd: &Path) -> Option<String> {
    if arg.contains("://") {
        return Some(arg.to_string());
    }
    let path = cwd.join(arg);
    let pattern = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(wildcard::has_wildcard);
    (pattern || path.exists()).then(|| path_to_url(&path))
}

/// Expand a wildcard in the last url component by browsing its parent.
fn matching_browse(client: &mut SyncClient, url: &str) -> Result<Vec<(String, bool)>> {
    let (parent, last) = split_last(url);
    if !wildcard::has_wildcard(last) {
        let isdir = url_to_path(url).is_some_and(|p| p.is_dir());
        return Ok(vec![(url.to_string(), isdir)]);
    }
    let entries = client
        .browse(&parent)
        .with_context(|| format!("failed to browse {parent}"))?;
    Ok(entries
        .into_iter()
        .filter(|entry| {
            let (_, name) = split_last(entry.path.trim_end_matches('/'));
            wildcard::matches(last, name)
        })
        .map(|entry| (entry.target().to_string(), entry.isdir))
        .collect())
}

fn split_last(url: &str) -> (String, &str) {
    match url.rsplit_once('/') {
        Some((parent, last)) if parent.ends_with(':') || parent.ends_with("//") => {
            (format!("{parent}/"), last)
        }
        Some((parent, last)) => (parent.to_string(), last),
        None => (String::new(), url),
    }
}

// ---------------------------------------------------------------------------
// property
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum PropertyAction {
    Print { source: Option<String>, name: Option<String> },
    Set { source: String, name: String, value: PropertyValue },
    Delete { source: String, name: String },
}

impl PropertyArgs {
    fn action(self) -> Result<PropertyAction> {
        if self.delete && (self.int || self.string) {
            bail!("--int and --string flags are invalid with --delete");
        }
        if self.int && self.string {
            bail!("--int and --string flags are mutually exclusive");
        }
        let default_source = format!("client/{CLIENT_NAME}");

        if self.delete {
            let Some(name) = self.name else {
                bail!("you must provide a property to delete");
            };
            return Ok(PropertyAction::Delete {
                source: self.source.unwrap_or(default_source),
                name,
            });
        }
        match (self.name, self.value) {
            (Some(name), Some(value)) => {
                let value = match (parse_int(&value), self.string) {
                    (Some(n), false) => PropertyValue::Int(n),
                    (None, false) if self.int => {
                        bail!("'{value}' is not an integer")
                    }
                    _ => PropertyValue::Str(value),
                };
                Ok(PropertyAction::Set {
                    source: self.source.unwrap_or(default_source),
                    name,
                    value,
                })
            }
            (name, _) => Ok(PropertyAction::Print {
                source: self.source,
                name,
            }),
        }
    }
}

fn property(args: PropertyArgs, socket: Option<PathBuf>) -> Result<()> {
    let id = MediaId(args.id);
    let action = args.action()?;
    let mut client = connect(socket)?;
    match action {
        PropertyAction::Delete { source, name } => client
            .medialib_property_remove(id, &source, &name)
            .with_context(|| format!("failed to remove {name} from entry {id}")),
        PropertyAction::Set {
            source,
            name,
            value,
        } => client
            .medialib_property_set(id, &source, &name, value)
            .with_context(|| format!("failed to set {name} on entry {id}")),
        PropertyAction::Print { source, name } => {
            let props = client
                .medialib_get_info(id)
                .with_context(|| format!("failed to get info for entry {id}"))?;
            for (key, sources) in &props {
                if name.as_deref().is_some_and(|n| n != key) {
                    continue;
                }
                for (src, value) in sources {
                    if source.as_deref().is_some_and(|s| s != src) {
                        continue;
                    }
                    println!("{}", format_property(src, key, value));
                }
            }
            Ok(())
        }
    }
}

/// Integer in C notation: decimal, `0x` hex or leading-`0` octal, with optional sign.
fn parse_int(text: &str) -> Option<i64> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, digits) = if let Some(hex) = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
    {
        (16, hex)
    } else if rest.len() > 1 && rest.starts_with('0') {
        (8, &rest[1..])
    } else {
        (10, rest)
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let n = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -n } else { n })
}

// ---------------------------------------------------------------------------
// volume
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeChange {
    Absolute(i64),
    Relative(i64),
}

impl VolumeChange {
    fn parse(text: &str) -> Result<Self> {
        let n: i64 = text
            .parse()
            .with_context(|| format!("invalid volume '{text}'"))?;
        Ok(if text.starts_with(['+', '-']) {
            VolumeChange::Relative(n)
        } else {
            VolumeChange::Absolute(n)
        })
    }

    fn apply(self, current: u32) -> u32 {
        let target = match self {
            VolumeChange::Absolute(n) => n,
            VolumeChange::Relative(delta) => i64::from(current) + delta,
        };
        // Clamped to 0..=100, so the cast is lossless.
        target.clamp(0, MAX_VOLUME) as u32
    }
}

/// New volume per channel; without `channel` every channel changes.
fn plan_volume(
    current: &BTreeMap<String, u32>,
    channel: Option<&str>,
    change: VolumeChange,
) -> Result<Vec<(String, u32)>> {
    if let Some(channel) = channel {
        let Some(&volume) = current.get(channel) else {
            bail!("no such channel '{channel}'");
        };
        return Ok(vec![(channel.to_string(), change.apply(volume))]);
    }
    Ok(current
        .iter()
        .map(|(channel, &volume)| (channel.clone(), change.apply(volume)))
        .collect())
}

fn volume(args: VolumeArgs, socket: Option<PathBuf>) -> Result<()> {
    let change = args.volume.as_deref().map(VolumeChange::parse).transpose()?;
    let mut client = connect(socket)?;
    let current = client.volume_get().context("failed to get volume")?;

    let Some(change) = change else {
        for (channel, volume) in &current {
            if args.channel.as_deref().map_or(true, |c| c == channel) {
                println!("{channel} = {volume}");
            }
        }
        return Ok(());
    };
    for (channel, volume) in plan_volume(&current, args.channel.as_deref(), change)? {
        client
            .volume_set(&channel, volume)
            .with_context(|| format!("failed to set volume of {channel}"))?;
    }
    Ok(())
}
