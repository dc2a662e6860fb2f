//! Filesystem access for `include` resolution
//!
//! [`FsLoader`] expands include patterns with `glob`, optionally rewriting
//! path segments first so that a configuration copied out of `/etc/nginx`
//! can still find its included files.

use glob::{GlobError, glob};
use nginx_conf_parser::Loader;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rewrites the path segments `from` to `to` in include patterns.
///
/// Matching works on whole segments: `sites-enabled` does not match
/// `my-sites-enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathMapping {
    pub from: String,
    pub to: String,
}

impl PathMapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    fn apply(&self, pattern: &str) -> String {
        let from = segments(&self.from);
        if from.is_empty() {
            return pattern.to_string();
        }
        let to = segments(&self.to);
        let input = segments(pattern);

        let mut output: Vec<&str> = Vec::with_capacity(input.len());
        let mut replaced_head = false;
        let mut i = 0;
        while i < input.len() {
            if input[i..].starts_with(&from) {
                replaced_head |= i == 0;
                output.extend_from_slice(&to);
                i += from.len();
            } else {
                output.push(input[i]);
                i += 1;
            }
        }

        let absolute = if replaced_head {
            self.to.starts_with('/') || (!to.is_empty() && pattern.starts_with('/'))
        } else {
            pattern.starts_with('/')
        };
        let joined = output.join("/");
        if absolute { format!("/{}", joined) } else { joined }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// [`Loader`] reading from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    path_mappings: Vec<PathMapping>,
}

impl FsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mappings are applied in order, each to the output of the previous one.
    pub fn with_path_mappings(mut self, mappings: impl IntoIterator<Item = PathMapping>) -> Self {
        self.path_mappings.extend(mappings);
        self
    }

    fn map_pattern(&self, pattern: &Path) -> String {
        let pattern = pattern.to_string_lossy().replace('\\', "/");
        self.path_mappings
            .iter()
            .fold(pattern, |pattern, mapping| mapping.apply(&pattern))
    }
}

impl Loader for FsLoader {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn glob(&self, pattern: &Path) -> io::Result<Vec<PathBuf>> {
        let pattern = self.map_pattern(pattern);

        let mut paths: Vec<PathBuf> = match glob(&pattern) {
            Ok(entries) => {
                let mut paths = Vec::new();
                for entry in entries {
                    let path = entry.map_err(GlobError::into_error)?;
                    if path.is_file() {
                        paths.push(path);
                    }
                }
                paths
            }
            Err(e) => {
                // Not a valid glob, but it may still name a file.
                let literal = PathBuf::from(&pattern);
                if !literal.is_file() {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()));
                }
                vec![literal]
            }
        };
        paths.sort();
        Ok(paths)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}
