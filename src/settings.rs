use crate::dumper::{ExternalFormatter, Style};
use crate::loader::{FsLoader, PathMapping};
use nginx_conf_parser::ParseOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the settings file looked up by [`Settings::find_and_load`].
pub const SETTINGS_FILE_NAME: &str = ".nginx-conf.toml";

/// Settings loaded from `.nginx-conf.toml`
///
/// ```toml
/// [parser]
/// parse_includes = true
/// custom_directives = ["my_module_directive"]
///
/// [[parser.path_map]]
/// from = "sites-enabled"
/// to = "sites-available"
///
/// [style]
/// indent = 2
///
/// [style.code_formatter]
/// command = ["stylua", "-"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub parser: ParserSettings,
    #[serde(default)]
    pub style: StyleSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserSettings {
    pub parse_includes: bool,
    pub skip_include_errors: bool,
    pub skip_validation: bool,
    pub skip_comments: bool,
    pub root_dir: Option<PathBuf>,
    pub custom_directives: Vec<String>,
    pub skip_validation_blocks: Vec<String>,
    /// Replaces the default `_by_lua_block` when set.
    pub foreign_code_suffixes: Option<Vec<String>>,
    pub path_map: Vec<PathMapping>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleSettings {
    pub indent: usize,
    pub start_indent: usize,
    pub sort_directives: bool,
    pub space_before_blocks: bool,
    pub debug: bool,
    /// External program formatting `*_by_lua_block` bodies.
    pub code_formatter: Option<ExternalFormatter>,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            indent: 4,
            start_indent: 0,
            sort_directives: false,
            space_before_blocks: false,
            debug: false,
            code_formatter: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Settings {
    /// Load settings from a file
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find and load `.nginx-conf.toml` from the given directory or its parents.
    ///
    /// The nearest file wins. A file that can not be loaded is reported and
    /// treated as missing.
    pub fn find_and_load(dir: &Path) -> Option<Self> {
        let mut current = dir.to_path_buf();

        loop {
            let path = current.join(SETTINGS_FILE_NAME);
            if path.is_file() {
                log::debug!("loading settings from {}", path.display());
                return match Self::from_file(&path) {
                    Ok(settings) => Some(settings),
                    Err(e) => {
                        log::warn!("{}", e);
                        None
                    }
                };
            }

            if !current.pop() {
                return None;
            }
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        let parser = &self.parser;
        let mut options = ParseOptions::default()
            .with_custom_directives(parser.custom_directives.iter().cloned())
            .with_skip_validation_blocks(parser.skip_validation_blocks.iter().cloned());
        if let Some(suffixes) = &parser.foreign_code_suffixes {
            options = options.with_foreign_code_suffixes(suffixes.iter().cloned());
        }
        if let Some(dir) = &parser.root_dir {
            options = options.with_root_dir(dir.clone());
        }
        options.parse_includes = parser.parse_includes;
        options.skip_include_errors = parser.skip_include_errors;
        options.skip_validation = parser.skip_validation;
        options.skip_comments = parser.skip_comments;
        options
    }

    /// Loader honouring the configured path mappings
    pub fn loader(&self) -> FsLoader {
        FsLoader::new().with_path_mappings(self.parser.path_map.iter().cloned())
    }

    pub fn style(&self) -> Style {
        let settings = &self.style;
        let style = Style {
            indent: settings.indent,
            start_indent: settings.start_indent,
            sort_directives: settings.sort_directives,
            space_before_blocks: settings.space_before_blocks,
            debug: settings.debug,
            ..Style::indented()
        };
        match &settings.code_formatter {
            Some(formatter) => style.with_code_formatter(formatter.clone()),
            None => style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_settings(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        let options = settings.parse_options();
        assert!(!options.parse_includes);
        assert!(options.dialect.is_foreign_code("content_by_lua_block"));

        let style = settings.style();
        assert_eq!(style.indent, 4);
        assert!(!style.sort_directives);
    }

    #[test]
    fn test_empty_settings() {
        let file = write_settings("");
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.style.indent, 4);
        assert!(settings.parser.path_map.is_empty());
    }

    #[test]
    fn test_parse_settings() {
        let file = write_settings(
            r#"
[parser]
parse_includes = true
skip_include_errors = true
root_dir = "/etc/nginx"
custom_directives = ["my_directive"]
skip_validation_blocks = ["my_map"]
foreign_code_suffixes = ["_by_js_block"]

[[parser.path_map]]
from = "sites-enabled"
to = "sites-available"

[style]
indent = 2
sort_directives = true
"#,
        );
        let settings = Settings::from_file(file.path()).unwrap();

        let options = settings.parse_options();
        assert!(options.parse_includes);
        assert!(options.skip_include_errors);
        assert!(!options.skip_validation);
        assert_eq!(options.root_dir, Some(PathBuf::from("/etc/nginx")));
        assert!(options.dialect.is_known("my_directive"));
        assert!(options.dialect.is_known("listen"));
        assert!(options.dialect.skips_validation("my_map"));
        assert!(options.dialect.skips_validation("map"));
        assert!(options.dialect.is_foreign_code("content_by_js_block"));
        assert!(!options.dialect.is_foreign_code("content_by_lua_block"));

        assert_eq!(
            settings.parser.path_map,
            vec![PathMapping::new("sites-enabled", "sites-available")]
        );

        let style = settings.style();
        assert_eq!(style.indent, 2);
        assert!(style.sort_directives);
        assert!(!style.space_before_blocks);
        assert_eq!(style.code_formatter.comment_marker(), "#");
    }

    #[test]
    fn test_code_formatter_settings() {
        let file = write_settings(
            r#"
[style.code_formatter]
command = ["stylua", "--indent-type", "Spaces", "-"]
"#,
        );
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(
            settings.style.code_formatter,
            Some(ExternalFormatter::new(["stylua", "--indent-type", "Spaces", "-"]))
        );
        assert_eq!(settings.style().code_formatter.comment_marker(), "--");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let file = write_settings("[style]\nindent_size = 2\n");
        match Settings::from_file(file.path()) {
            Err(SettingsError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::from_file(Path::new("/nonexistent/.nginx-conf.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
        assert!(err.to_string().starts_with("Failed to read settings file"));
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(SETTINGS_FILE_NAME), "[style]\nindent = 8\n").unwrap();
        let nested = temp.path().join("sites").join("conf.d");
        fs::create_dir_all(&nested).unwrap();

        let settings = Settings::find_and_load(&nested).unwrap();
        assert_eq!(settings.style.indent, 8);
    }

    #[test]
    fn test_find_and_load_prefers_nearest_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(SETTINGS_FILE_NAME), "[style]\nindent = 8\n").unwrap();
        let nested = temp.path().join("sites");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(SETTINGS_FILE_NAME), "[style]\nindent = 1\n").unwrap();

        let settings = Settings::find_and_load(&nested).unwrap();
        assert_eq!(settings.style.indent, 1);
    }

    #[test]
    fn test_find_and_load_invalid_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(SETTINGS_FILE_NAME), "[style\n").unwrap();
        assert!(Settings::find_and_load(temp.path()).is_none());
    }
}
