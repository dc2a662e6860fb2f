use crate::dialect::Dialect;
use std::path::PathBuf;
use std::sync::Arc;

/// Settings for one parse.
///
/// ```
/// use nginx_conf_parser::ParseOptions;
///
/// let options = ParseOptions::default()
///     .with_include_parsing()
///     .with_skip_include_errors()
///     .with_custom_directives(["my_module_directive"]);
/// assert!(options.parse_includes);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Grammar profile: known names, wrappers and embedded code markers.
    pub dialect: Arc<Dialect>,
    /// Load and parse the files matched by `include` directives.
    pub parse_includes: bool,
    /// Treat unreadable or invalid included files as matching nothing.
    pub skip_include_errors: bool,
    /// Accept any directive name.
    pub skip_validation: bool,
    /// Drop comments instead of attaching them to directives.
    pub skip_comments: bool,
    /// Directory relative include patterns are resolved against.
    ///
    /// Defaults to the directory of the parsed file.
    pub root_dir: Option<PathBuf>,
}

impl ParseOptions {
    pub fn with_include_parsing(mut self) -> Self {
        self.parse_includes = true;
        self
    }

    pub fn with_skip_include_errors(mut self) -> Self {
        self.skip_include_errors = true;
        self
    }

    pub fn with_skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    pub fn with_skip_comments(mut self) -> Self {
        self.skip_comments = true;
        self
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(dir.into());
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Arc::new(dialect);
        self
    }

    /// Accepts extra directive names on top of the dialect's.
    pub fn with_custom_directives<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.dialect).add_custom_directives(names);
        self
    }

    /// Blocks whose contents are not name-checked, in addition to `map`,
    /// `types` and the other defaults.
    pub fn with_skip_validation_blocks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.dialect).add_skip_validation_blocks(names);
        self
    }

    pub fn with_foreign_code_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.dialect).set_foreign_code_suffixes(suffixes);
        self
    }
}
