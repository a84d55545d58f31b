// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executable resolution against an optional fake filesystem root.

use std::path::{Path, PathBuf};

/// Resolve a catalog path, prefixing it with `fs_root` when one is set.
///
/// The prefix is a plain string concatenation because catalog paths are
/// absolute (`/usr/bin/top`) and [`Path::join`] would discard the root.
/// Windows-style roots (containing `\`) get their forward slashes rewritten.
pub fn resolve_path(fs_root: Option<&Path>, path: &str) -> PathBuf {
    let Some(root) = fs_root.filter(|r| !r.as_os_str().is_empty()) else {
        return PathBuf::from(path);
    };
    let root = root.to_string_lossy();
    let joined = format!("{}{}", root.trim_end_matches(['/', '\\']), path);
    if root.contains('\\') {
        PathBuf::from(joined.replace('/', "\\"))
    } else {
        PathBuf::from(joined)
    }
}

/// Return `true` when `path` names an existing regular file.
pub fn executable_exists(path: &Path) -> bool {
    path.is_file()
}
