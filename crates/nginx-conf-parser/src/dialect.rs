//! Grammar profile used by the parser.
//!
//! A [`Dialect`] decides which directive names are valid, which blocks skip
//! name validation, which directives hold embedded script code, and which
//! names are turned into typed [`NodeKind`] variants. It is plain data handed
//! to the parser through [`ParseOptions`](crate::ParseOptions), so two parses
//! with different extensions never interfere.
//!
//! ```
//! use nginx_conf_parser::{Dialect, ParseOptions, parse_string_with};
//!
//! let mut dialect = Dialect::default();
//! dialect.add_custom_directives(["my_directive"]);
//! let options = ParseOptions::default().with_dialect(dialect);
//!
//! assert!(parse_string_with("my_directive on;", &options).is_ok());
//! ```

use crate::ast::{Block, Directive, Location, NodeKind, Position, Upstream, UpstreamServer};
use crate::directives::is_known_directive;
use crate::error::{ParseError, ParseResult};
use crate::lexer::LUA_BLOCK_SUFFIX;
use std::collections::{HashMap, HashSet};

/// Converts a parsed `name params { … }` into a typed node.
///
/// May take the directive's parameters; typed variants own their values.
pub type BlockWrapper = fn(&mut Directive, Block, Position) -> ParseResult<NodeKind>;

/// Converts a parsed `name params;` into a typed node.
pub type DirectiveWrapper = fn(&mut Directive, Position) -> ParseResult<NodeKind>;

/// Blocks whose bodies are data rather than directives.
pub const DEFAULT_SKIP_VALIDATION_BLOCKS: &[&str] =
    &["charset_map", "geo", "map", "match", "split_clients", "types"];

#[derive(Debug, Clone)]
pub struct Dialect {
    use_known_directives: bool,
    custom_directives: HashSet<String>,
    skip_validation_blocks: HashSet<String>,
    foreign_code_suffixes: Vec<String>,
    block_wrappers: HashMap<String, BlockWrapper>,
    directive_wrappers: HashMap<String, DirectiveWrapper>,
    include_directives: HashSet<String>,
}

impl Default for Dialect {
    fn default() -> Self {
        let mut dialect = Self::bare();
        dialect.use_known_directives = true;
        dialect.add_skip_validation_blocks(DEFAULT_SKIP_VALIDATION_BLOCKS.iter().copied());
        dialect.foreign_code_suffixes = vec![LUA_BLOCK_SUFFIX.to_string()];
        dialect.register_block_wrapper("http", wrap_http);
        dialect.register_block_wrapper("server", wrap_server);
        dialect.register_block_wrapper("location", wrap_location);
        dialect.register_block_wrapper("upstream", wrap_upstream);
        dialect.register_directive_wrapper("server", wrap_upstream_server);
        dialect.register_include_directive("include");
        dialect
    }
}

impl Dialect {
    /// A dialect that knows no directive names, wrappers or includes.
    ///
    /// Every name must be registered with
    /// [`add_custom_directives`](Dialect::add_custom_directives).
    pub fn bare() -> Self {
        Self {
            use_known_directives: false,
            custom_directives: HashSet::new(),
            skip_validation_blocks: HashSet::new(),
            foreign_code_suffixes: Vec::new(),
            block_wrappers: HashMap::new(),
            directive_wrappers: HashMap::new(),
            include_directives: HashSet::new(),
        }
    }

    pub fn add_custom_directives<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_directives
            .extend(names.into_iter().map(Into::into));
    }

    /// Registers block names whose descendants are not name-checked.
    pub fn add_skip_validation_blocks<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_validation_blocks
            .extend(names.into_iter().map(Into::into));
    }

    /// Replaces the directive suffixes whose blocks hold verbatim code.
    pub fn set_foreign_code_suffixes<I, S>(&mut self, suffixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_code_suffixes = suffixes.into_iter().map(Into::into).collect();
    }

    pub fn register_block_wrapper(&mut self, name: impl Into<String>, wrapper: BlockWrapper) {
        self.block_wrappers.insert(name.into(), wrapper);
    }

    pub fn register_directive_wrapper(
        &mut self,
        name: impl Into<String>,
        wrapper: DirectiveWrapper,
    ) {
        self.directive_wrappers.insert(name.into(), wrapper);
    }

    pub fn register_include_directive(&mut self, name: impl Into<String>) {
        self.include_directives.insert(name.into());
    }

    /// Check if `name` passes directive-name validation
    pub fn is_known(&self, name: &str) -> bool {
        (self.use_known_directives && is_known_directive(name))
            || self.custom_directives.contains(name)
    }

    pub fn skips_validation(&self, name: &str) -> bool {
        self.skip_validation_blocks.contains(name)
    }

    pub fn is_foreign_code(&self, name: &str) -> bool {
        self.foreign_code_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
    }

    pub fn foreign_code_suffixes(&self) -> &[String] {
        &self.foreign_code_suffixes
    }

    pub fn is_include(&self, name: &str) -> bool {
        self.include_directives.contains(name)
    }

    pub fn block_wrapper(&self, name: &str) -> Option<BlockWrapper> {
        self.block_wrappers.get(name).copied()
    }

    pub fn directive_wrapper(&self, name: &str) -> Option<DirectiveWrapper> {
        self.directive_wrappers.get(name).copied()
    }
}

fn take_values(directive: &mut Directive) -> impl Iterator<Item = String> {
    std::mem::take(&mut directive.parameters)
        .into_iter()
        .map(|p| p.value)
}

fn wrap_http(_: &mut Directive, block: Block, _: Position) -> ParseResult<NodeKind> {
    Ok(NodeKind::Http(block))
}

fn wrap_server(_: &mut Directive, block: Block, _: Position) -> ParseResult<NodeKind> {
    Ok(NodeKind::Server(block))
}

fn wrap_location(directive: &mut Directive, block: Block, position: Position) -> ParseResult<NodeKind> {
    let (modifier, pattern) = match directive.parameters.len() {
        0 => return Err(ParseError::LocationMissingParameter { position }),
        1 => {
            let mut values = take_values(directive);
            (None, values.next().unwrap_or_default())
        }
        2 => {
            let mut values = take_values(directive);
            (values.next(), values.next().unwrap_or_default())
        }
        _ => return Err(ParseError::LocationTooManyParameters { position }),
    };
    Ok(NodeKind::Location(Location {
        modifier,
        pattern,
        block,
    }))
}

fn wrap_upstream(directive: &mut Directive, block: Block, position: Position) -> ParseResult<NodeKind> {
    let count = directive.parameters.len();
    if count != 1 {
        return Err(ParseError::UpstreamParameters { count, position });
    }
    let name = take_values(directive).next().unwrap_or_default();
    Ok(NodeKind::Upstream(Upstream { name, block }))
}

fn wrap_upstream_server(directive: &mut Directive, position: Position) -> ParseResult<NodeKind> {
    let server = UpstreamServer::from_values(directive.parameters.iter().map(|p| p.value.as_str()))
        .ok_or_else(|| ParseError::MissingParameter {
            directive: directive.name.clone(),
            position,
        })?;
    directive.parameters.clear();
    Ok(NodeKind::UpstreamServer(server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Parameter;

    fn directive(name: &str, params: &[&str]) -> Directive {
        Directive::new(name).with_parameters(params.iter().copied())
    }

    #[test]
    fn test_default_dialect() {
        let dialect = Dialect::default();
        assert!(dialect.is_known("listen"));
        assert!(!dialect.is_known("a_directive"));
        assert!(dialect.skips_validation("map"));
        assert!(dialect.skips_validation("types"));
        assert!(dialect.is_foreign_code("content_by_lua_block"));
        assert!(!dialect.is_foreign_code("content_by_lua_file"));
        assert!(dialect.is_include("include"));
        assert!(dialect.block_wrapper("location").is_some());
        assert!(dialect.directive_wrapper("server").is_some());
        assert!(dialect.directive_wrapper("listen").is_none());
    }

    #[test]
    fn test_bare_dialect_knows_only_custom_names() {
        let mut dialect = Dialect::bare();
        assert!(!dialect.is_known("listen"));
        dialect.add_custom_directives(["listen"]);
        assert!(dialect.is_known("listen"));
        assert!(dialect.block_wrapper("http").is_none());
    }

    #[test]
    fn test_location_arity() {
        let position = Position::new(1, 1, 0);
        let mut d = directive("location", &[]);
        assert!(matches!(
            wrap_location(&mut d, Block::new(), position),
            Err(ParseError::LocationMissingParameter { .. })
        ));

        let mut d = directive("location", &["a", "b", "c"]);
        assert!(matches!(
            wrap_location(&mut d, Block::new(), position),
            Err(ParseError::LocationTooManyParameters { .. })
        ));

        let mut d = directive("location", &["^~", "/static/"]);
        match wrap_location(&mut d, Block::new(), position).unwrap() {
            NodeKind::Location(location) => {
                assert_eq!(location.modifier.as_deref(), Some("^~"));
                assert_eq!(location.pattern, "/static/");
            }
            other => panic!("expected location, got {:?}", other),
        }
        assert!(d.parameters.is_empty());
    }

    #[test]
    fn test_upstream_arity() {
        let position = Position::new(3, 5, 0);
        let mut d = directive("upstream", &["a", "b"]);
        match wrap_upstream(&mut d, Block::new(), position) {
            Err(ParseError::UpstreamParameters { count, position }) => {
                assert_eq!(count, 2);
                assert_eq!(position.line, 3);
            }
            other => panic!("expected UpstreamParameters, got {:?}", other),
        }
    }

    #[test]
    fn test_upstream_server_needs_address() {
        let position = Position::new(1, 1, 0);
        let mut d = directive("server", &[]);
        assert!(matches!(
            wrap_upstream_server(&mut d, position),
            Err(ParseError::MissingParameter { .. })
        ));

        let mut d = Directive::new("server");
        d.parameters.push(Parameter::new("unix:/tmp/backend.sock"));
        d.parameters.push(Parameter::new("backup"));
        match wrap_upstream_server(&mut d, position).unwrap() {
            NodeKind::UpstreamServer(server) => {
                assert_eq!(server.address, "unix:/tmp/backend.sock");
                assert_eq!(server.flags, vec!["backup"]);
            }
            other => panic!("expected upstream server, got {:?}", other),
        }
    }
}
