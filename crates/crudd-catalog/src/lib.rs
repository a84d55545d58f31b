// SPDX-License-Identifier: MIT OR Apache-2.0
//! crudd-catalog
//!
//! The fixed set of diagnostic commands the dashboard can run, together with
//! the filesystem probing that decides which of them are available on this
//! host.
//!
//! A [`Catalog`] is built once at startup, probed once, and then shared
//! read-only by every request handler.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Whitespace argument tokenizing.
pub mod args;
/// Executable path resolution and existence checks.
pub mod probe;

pub use args::split_args;
pub use probe::{executable_exists, resolve_path};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Built-in Linux diagnostics: `(name, executable path, argument string)`.
const BUILTIN_COMMANDS: &[(&str, &str, &str)] = &[
    ("top", "/usr/bin/top", "-bn1 -w256"),
    ("free", "/usr/bin/free", "-hw"),
    ("df", "/bin/df", "-h"),
    ("ipaddr", "/usr/bin/ip", "addr"),
    ("iplink", "/usr/bin/ip", "link"),
    ("netstat", "/usr/bin/netstat", "-taupen"),
    ("sstu", "/usr/bin/ss", "-tu"),
    ("sstul", "/usr/bin/ss", "-tul"),
    ("pingv4", "/bin/ping", "-4 -c3 www.google.com"),
    ("pingv6", "/bin/ping", "-6 -c3 www.google.com"),
    ("uname", "/usr/bin/uname", "-a"),
    ("uptime", "/usr/bin/uptime", ""),
    ("systemctlstatus", "/usr/bin/systemctl", "status"),
];

/// Names that collide with fixed dashboard routes.
const RESERVED_NAMES: &[&str] = &["static", "health"];

/// Errors raised while assembling a catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Two entries share a name, so they would share a route.
    #[error("duplicate command name '{0}'")]
    DuplicateName(String),

    /// The name cannot be used as a single URL path segment.
    #[error("invalid command name '{name}': {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The executable path is empty.
    #[error("command '{0}' has an empty executable path")]
    EmptyPath(String),
}

/// A named, pre-configured external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Logical name, also the URL path segment (`/<name>`).
    pub name: String,
    /// Absolute executable path, before any filesystem-root prefix.
    pub path: String,
    /// Whitespace-separated argument string.
    pub args: String,
    /// Whether the executable was found when the catalog was probed.
    #[serde(default)]
    pub exists: bool,
}

impl CommandSpec {
    /// Create an unprobed entry (`exists == false`).
    pub fn new(name: impl Into<String>, path: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args: args.into(),
            exists: false,
        }
    }

    /// Human-readable title shown above the command output.
    pub fn title(&self) -> String {
        if self.args.trim().is_empty() {
            self.path.clone()
        } else {
            format!("{} {}", self.path, self.args)
        }
    }

    /// Tokenized argument list.
    pub fn argv(&self) -> Vec<String> {
        split_args(&self.args)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let reason = if self.name.is_empty() {
            Some("name must not be empty")
        } else if self.name.contains('/') {
            Some("name must not contain '/'")
        } else if self.name.chars().any(char::is_whitespace) {
            Some("name must not contain whitespace")
        } else if self.name.starts_with([':', '*']) || self.name.contains(['{', '}']) {
            Some("name must not start with ':' or '*' or contain braces")
        } else if RESERVED_NAMES.contains(&self.name.as_str()) {
            Some("name is reserved by the dashboard")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(CatalogError::InvalidName {
                name: self.name.clone(),
                reason,
            });
        }
        if self.path.trim().is_empty() {
            return Err(CatalogError::EmptyPath(self.name.clone()));
        }
        Ok(())
    }
}

/// Ordered, immutable set of [`CommandSpec`]s, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    commands: Vec<CommandSpec>,
}

impl Catalog {
    /// Build a catalog from arbitrary entries.
    ///
    /// Entries are validated and sorted by name; duplicate names are rejected.
    pub fn new(entries: impl IntoIterator<Item = CommandSpec>) -> Result<Self, CatalogError> {
        let mut commands: Vec<CommandSpec> = entries.into_iter().collect();
        for command in &commands {
            command.validate()?;
        }
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(dup) = commands.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(CatalogError::DuplicateName(dup[0].name.clone()));
        }
        Ok(Self { commands })
    }

    /// The built-in diagnostics catalog, unprobed.
    pub fn builtin() -> Self {
        let mut commands: Vec<CommandSpec> = BUILTIN_COMMANDS
            .iter()
            .map(|(name, path, args)| CommandSpec::new(*name, *path, *args))
            .collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        Self { commands }
    }

    /// Compute `exists` for every entry against the filesystem.
    ///
    /// `fs_root` is prepended to each executable path when set.
    pub fn probe(mut self, fs_root: Option<&Path>) -> Self {
        for command in &mut self.commands {
            let resolved = resolve_path(fs_root, &command.path);
            command.exists = executable_exists(&resolved);
            debug!(
                target: "crudd.catalog",
                command = %command.name,
                path = %resolved.display(),
                exists = command.exists,
                "probed command"
            );
        }
        self
    }

    /// All entries in name order.
    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// Look an entry up by name.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands
            .binary_search_by(|c| c.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.commands[idx])
    }

    /// Entries whose executable was found.
    pub fn existing(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter().filter(|c| c.exists)
    }

    /// Entries whose executable was not found.
    pub fn missing(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter().filter(|c| !c.exists)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
