// SPDX-License-Identifier: MIT OR Apache-2.0
//! Argument strings are split on whitespace only.
//!
//! There is no quoting or escaping: an argument that itself contains
//! whitespace cannot be expressed in a catalog entry.

/// Split an argument string into an argument list.
///
/// Empty or whitespace-only input yields no arguments rather than a single
/// empty one. Runs of whitespace collapse.
pub fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_owned).collect()
}
