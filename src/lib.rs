//! Parse, edit and re-format nginx configuration files.
//!
//! The syntax layer lives in [`nginx_conf_parser`]; this crate adds the
//! filesystem: include expansion on disk, the dumper, writing files back and
//! `.nginx-conf.toml` settings.
//!
//! ```no_run
//! use nginx_conf::{ParseOptions, Style, dump_config, parse_config};
//! use std::path::Path;
//!
//! let options = ParseOptions::default().with_include_parsing();
//! let config = parse_config(Path::new("/etc/nginx/nginx.conf"), &options)?;
//!
//! for listen in config.find_directives("listen") {
//!     println!("{:?}", listen.parameter_values());
//! }
//! println!("{}", dump_config(&config, &Style::indented()));
//! # Ok::<(), nginx_conf::ParseError>(())
//! ```

pub mod dumper;
pub mod loader;
pub mod settings;
pub mod writer;

pub use nginx_conf_parser;
pub use nginx_conf_parser::{
    Config, Dialect, Loader, MemoryLoader, NodeId, NodeKind, NodeRef, ParseError, ParseOptions,
    ParseResult, ast, error, parse_file,
};

pub use dumper::{Style, dump_block, dump_config, dump_directive, dump_include, dump_includes};
pub use loader::{FsLoader, PathMapping};
pub use settings::{Settings, SettingsError};
pub use writer::write_config;

use std::path::Path;

/// Parse an nginx configuration file from disk
pub fn parse_config(path: &Path, options: &ParseOptions) -> ParseResult<Config> {
    parse_file(path, options, &FsLoader::new())
}

/// Parse nginx configuration from a string.
///
/// Relative include patterns resolve against [`ParseOptions::root_dir`], or
/// the working directory when it is unset.
pub fn parse_string(source: &str, options: &ParseOptions) -> ParseResult<Config> {
    nginx_conf_parser::parse_source(source, options, &FsLoader::new())
}

/// Serialize a parsed document to pretty-printed JSON
pub fn to_json(config: &Config) -> serde_json::Result<String> {
    serde_json::to_string_pretty(config)
}
