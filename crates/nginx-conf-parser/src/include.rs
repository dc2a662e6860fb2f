//! File access used to resolve `include` directives.
//!
//! The parser never touches the filesystem itself. It asks a [`Loader`] to
//! expand include patterns and read files, which keeps this crate usable in
//! sandboxes and tests. [`MemoryLoader`] serves files from a map; a real
//! filesystem loader lives in the `nginx-conf` crate.

use crate::ast::Config;
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

/// Source of configuration files.
pub trait Loader {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Expands a glob pattern into the matching file paths, sorted.
    ///
    /// A pattern matching nothing yields an empty list, not an error.
    fn glob(&self, pattern: &Path) -> io::Result<Vec<PathBuf>>;

    /// Identity used to detect files that were already parsed.
    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Loader for string input: no file exists and every pattern matches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilesystem;

impl Loader for NoFilesystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no filesystem available to read {}", path.display()),
        ))
    }

    fn glob(&self, _pattern: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Loader serving files from memory.
///
/// Patterns use `glob` syntax (`*`, `?`, `[ab]`); wildcards never match `/`.
///
/// ```
/// use nginx_conf_parser::{MemoryLoader, ParseOptions, parse_file};
/// use std::path::Path;
///
/// let loader = MemoryLoader::new()
///     .with_file("/etc/nginx/nginx.conf", "http { include conf.d/*.conf; }")
///     .with_file("/etc/nginx/conf.d/app.conf", "server { listen 8080; }");
/// let options = ParseOptions::default().with_include_parsing();
///
/// let config = parse_file(Path::new("/etc/nginx/nginx.conf"), &options, &loader).unwrap();
/// assert_eq!(config.find_directives("listen").len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }
}

impl Loader for MemoryLoader {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
        })
    }

    fn glob(&self, pattern: &Path) -> io::Result<Vec<PathBuf>> {
        let compiled = match Pattern::new(&pattern.to_string_lossy()) {
            Ok(compiled) => compiled,
            Err(e) => {
                // Not a valid glob, but it may still name a file.
                let literal = pattern.to_path_buf();
                if !self.files.contains_key(&literal) {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()));
                }
                return Ok(vec![literal]);
            }
        };
        let match_options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        Ok(self
            .files
            .keys()
            .filter(|path| compiled.matches_path_with(path, match_options))
            .cloned()
            .collect())
    }
}

/// Parse state of one file in an [`IncludeRegistry`].
#[derive(Debug, Clone)]
pub enum IncludeState {
    /// The file is being parsed further up the include chain.
    InProgress,
    Parsed(Config),
}

/// Files seen during one top-level parse, shared by the parsers of all
/// included files.
///
/// A file that is [`InProgress`](IncludeState::InProgress) when it is
/// included again is skipped, which breaks include cycles. A file that was
/// already parsed is reused.
#[derive(Debug, Default)]
pub struct IncludeRegistry {
    files: HashMap<PathBuf, IncludeState>,
}

impl IncludeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, path: &Path) -> Option<&IncludeState> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub(crate) fn begin(&mut self, path: PathBuf) {
        self.files.insert(path, IncludeState::InProgress);
    }

    pub(crate) fn finish(&mut self, path: PathBuf, config: Config) {
        self.files.insert(path, IncludeState::Parsed(config));
    }

    pub(crate) fn abandon(&mut self, path: &Path) {
        self.files.remove(path);
    }
}

/// Dotfiles are never included (editor swap files, `.bak` copies, ...).
pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Include path without its quote delimiters, if it has matching ones.
pub(crate) fn unquote(path: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = path
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::{ParseOptions, parse_file};

    fn include_options() -> ParseOptions {
        ParseOptions::default().with_include_parsing()
    }

    #[test]
    fn test_memory_glob() {
        let loader = MemoryLoader::new()
            .with_file("/etc/nginx/a.conf", "")
            .with_file("/etc/nginx/b.conf", "")
            .with_file("/etc/nginx/c.types", "")
            .with_file("/etc/nginx/sites/d.conf", "");
        let glob = |pattern: &str| loader.glob(Path::new(pattern)).unwrap();

        assert_eq!(
            glob("/etc/nginx/*.conf"),
            vec![PathBuf::from("/etc/nginx/a.conf"), PathBuf::from("/etc/nginx/b.conf")]
        );
        assert_eq!(glob("/etc/nginx/?.types"), vec![PathBuf::from("/etc/nginx/c.types")]);
        assert_eq!(glob("/etc/*/d.conf"), vec![PathBuf::from("/etc/nginx/sites/d.conf")]);
        assert_eq!(
            glob("/etc/nginx/[ab].conf"),
            vec![PathBuf::from("/etc/nginx/a.conf"), PathBuf::from("/etc/nginx/b.conf")]
        );
        assert_eq!(glob("/etc/nginx/c.types"), vec![PathBuf::from("/etc/nginx/c.types")]);
    }

    #[test]
    fn test_memory_glob_invalid_pattern() {
        let loader = MemoryLoader::new().with_file("/etc/nginx/app[.conf", "");
        assert_eq!(
            loader.glob(Path::new("/etc/nginx/app[.conf")).unwrap(),
            vec![PathBuf::from("/etc/nginx/app[.conf")]
        );
        let err = loader.glob(Path::new("/etc/nginx/missing[.conf")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(Path::new("/etc/nginx/conf.d/.default.conf")));
        assert!(!is_hidden(Path::new("/etc/nginx/conf.d/default.conf")));
    }

    #[test]
    fn test_include_is_resolved_relative_to_root() {
        let loader = MemoryLoader::new()
            .with_file("/etc/nginx/nginx.conf", "events {}\nhttp {\n    include conf.d/*.conf;\n}\n")
            .with_file("/etc/nginx/conf.d/a.conf", "server { listen 80; }")
            .with_file("/etc/nginx/conf.d/b.conf", "server { listen 81; }")
            .with_file("/etc/nginx/conf.d/.swap.conf", "this is not nginx");

        let config = parse_file(Path::new("/etc/nginx/nginx.conf"), &include_options(), &loader).unwrap();
        let include = config.find_directives("include").remove(0);
        let include = include.as_include().unwrap();
        assert_eq!(include.include_path, "conf.d/*.conf");

        let files: Vec<&Path> = include
            .resolved_configs
            .iter()
            .map(|c| c.file_path())
            .collect();
        assert_eq!(
            files,
            vec![
                Path::new("/etc/nginx/conf.d/a.conf"),
                Path::new("/etc/nginx/conf.d/b.conf"),
            ]
        );

        let ports: Vec<Vec<String>> = config
            .find_directives("listen")
            .iter()
            .map(|d| d.parameter_values())
            .collect();
        assert_eq!(ports, vec![vec!["80".to_string()], vec!["81".to_string()]]);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"conf.d/*.conf\""), "conf.d/*.conf");
        assert_eq!(unquote("'mime.types'"), "mime.types");
        assert_eq!(unquote("\"a.conf'"), "\"a.conf'");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("a.conf"), "a.conf");
    }

    #[test]
    fn test_quoted_include_path() {
        let loader = MemoryLoader::new()
            .with_file("/etc/nginx/nginx.conf", "include \"other.conf\";\ninclude 'mime.types';\n")
            .with_file("/etc/nginx/other.conf", "user nginx;")
            .with_file("/etc/nginx/mime.types", "types { text/html html; }");
        let config = parse_file(Path::new("/etc/nginx/nginx.conf"), &include_options(), &loader).unwrap();

        assert_eq!(config.find_directives("user").len(), 1);
        assert_eq!(config.find_directives("types").len(), 1);
        // The directive keeps the path as written.
        let include = config.find_directives("include").remove(0);
        assert_eq!(include.as_include().unwrap().include_path, "\"other.conf\"");
    }

    #[test]
    fn test_includes_are_not_parsed_by_default() {
        let loader = MemoryLoader::new()
            .with_file("/nginx.conf", "include other.conf;")
            .with_file("/other.conf", "worker_processes 1;");
        let config = parse_file(Path::new("/nginx.conf"), &ParseOptions::default(), &loader).unwrap();
        let include = config.find_directives("include").remove(0);
        assert!(include.as_include().unwrap().resolved_configs.is_empty());
    }

    #[test]
    fn test_self_include_terminates() {
        let loader = MemoryLoader::new()
            .with_file("/conf/a.conf", "worker_processes 1;\ninclude /conf/*.conf;\n")
            .with_file("/conf/b.conf", "include /conf/a.conf;\nuser nginx;\n");

        let config = parse_file(Path::new("/conf/a.conf"), &include_options(), &loader).unwrap();
        let include = config.find_directives("include").remove(0);
        let resolved = &include.as_include().unwrap().resolved_configs;
        // a.conf is in progress, only b.conf is parsed; b's include of a is skipped.
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].file_path(), Path::new("/conf/b.conf"));
        assert_eq!(config.find_directives("user").len(), 1);
    }

    #[test]
    fn test_file_included_twice_is_reused() {
        let loader = MemoryLoader::new()
            .with_file("/nginx.conf", "http { include /mime.types; server { include /mime.types; } }")
            .with_file("/mime.types", "types { text/html html; }");
        let config = parse_file(Path::new("/nginx.conf"), &include_options(), &loader).unwrap();
        assert_eq!(config.find_directives("types").len(), 2);
    }

    #[test]
    fn test_empty_match_is_not_an_error() {
        let loader = MemoryLoader::new().with_file("/nginx.conf", "include /sites-enabled/*;");
        let config = parse_file(Path::new("/nginx.conf"), &include_options(), &loader).unwrap();
        let include = config.find_directives("include").remove(0);
        assert!(include.as_include().unwrap().resolved_configs.is_empty());
    }

    #[test]
    fn test_included_file_error_is_propagated() {
        let loader = MemoryLoader::new()
            .with_file("/nginx.conf", "http {\n    include /broken.conf;\n}\n")
            .with_file("/broken.conf", "server {\n    listen 80;\n");
        let err = parse_file(Path::new("/nginx.conf"), &include_options(), &loader).unwrap_err();
        match err {
            ParseError::IncludedFile { path, source } => {
                assert_eq!(path, PathBuf::from("/broken.conf"));
                assert!(matches!(*source, ParseError::UnexpectedEof { .. }));
            }
            e => panic!("expected IncludedFile error, got {:?}", e),
        }
    }

    #[test]
    fn test_skip_include_errors() {
        let loader = MemoryLoader::new()
            .with_file("/nginx.conf", "include /broken.conf;\ninclude /ok.conf;\n")
            .with_file("/broken.conf", "server {")
            .with_file("/ok.conf", "user nginx;");
        let options = include_options().with_skip_include_errors();
        let config = parse_file(Path::new("/nginx.conf"), &options, &loader).unwrap();

        let includes = config.find_directives("include");
        assert!(includes[0].as_include().unwrap().resolved_configs.is_empty());
        assert_eq!(includes[1].as_include().unwrap().resolved_configs.len(), 1);
    }

    #[test]
    fn test_missing_main_file() {
        let err = parse_file(Path::new("/nope.conf"), &ParseOptions::default(), &MemoryLoader::new())
            .unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
        assert!(err.position().is_none());
    }

    #[test]
    fn test_nested_includes_use_the_same_root() {
        let loader = MemoryLoader::new()
            .with_file("/etc/nginx/nginx.conf", "include sites/*.conf;")
            .with_file("/etc/nginx/sites/app.conf", "include snippets/ssl.conf;")
            .with_file("/etc/nginx/snippets/ssl.conf", "ssl_protocols TLSv1.3;");
        let config = parse_file(Path::new("/etc/nginx/nginx.conf"), &include_options(), &loader).unwrap();
        let protocols = config.find_directives("ssl_protocols");
        assert_eq!(protocols.len(), 1);
        assert_eq!(
            protocols[0].config().file_path(),
            Path::new("/etc/nginx/snippets/ssl.conf")
        );
    }
}
