//! nginx configuration file parser
//!
//! This crate turns nginx-style configuration text into a mutable document
//! model that keeps comments and multi-line parameter layout, so the tree can
//! be edited and written back. Directive names are checked against the
//! directives nginx knows unless validation is relaxed through
//! [`ParseOptions`].
//!
//! # Quick Start
//!
//! ```
//! use nginx_conf_parser::parse_string;
//!
//! let config = parse_string("http { server { listen 80; } }").unwrap();
//!
//! for directive in config.all_directives() {
//!     println!("{} at line {}", directive.name(), directive.directive.line);
//! }
//! ```
//!
//! Files are read through a [`Loader`], which is also used to resolve
//! `include` directives:
//!
//! ```
//! use nginx_conf_parser::{MemoryLoader, ParseOptions, parse_file};
//! use std::path::Path;
//!
//! let loader = MemoryLoader::new().with_file("/etc/nginx/nginx.conf", "worker_processes 4;");
//! let config = parse_file(Path::new("/etc/nginx/nginx.conf"), &ParseOptions::default(), &loader).unwrap();
//! assert_eq!(config.directives().count(), 1);
//! ```
//!
//! # Modules
//!
//! - [`ast`]: the document model, [`ast::Config`], [`ast::Node`], [`ast::NodeKind`], [`ast::Block`]
//! - [`dialect`]: known directives, skip-validation blocks and typed-node wrappers
//! - [`error`]: [`error::ParseError`], [`error::LexerError`]
//! - [`include`]: the [`Loader`] trait and include bookkeeping
//! - [`lexer`]: [`lexer::Lexer`], [`lexer::Token`], [`lexer::TokenKind`]
//!
//! # Common Patterns
//!
//! ## Iterating over directives
//!
//! [`Config::directives()`](ast::Config::directives) yields only top-level directives.
//! [`Config::all_directives()`](ast::Config::all_directives) recurses into blocks:
//!
//! ```
//! # use nginx_conf_parser::parse_string;
//! let config = parse_string("http { gzip on; server { listen 80; } }").unwrap();
//!
//! let top: Vec<String> = config.directives().map(|d| d.name().to_string()).collect();
//! assert_eq!(top, vec!["http"]);
//!
//! let all: Vec<String> = config.all_directives().map(|d| d.name().to_string()).collect();
//! assert_eq!(all, vec!["http", "gzip", "server", "listen"]);
//! ```
//!
//! ## Typed nodes
//!
//! ```
//! # use nginx_conf_parser::parse_string;
//! let config = parse_string("upstream backend { server 127.0.0.1:8080 weight=2 backup; }").unwrap();
//! let upstream = config.find_upstreams().remove(0);
//!
//! assert_eq!(upstream.as_upstream().unwrap().name, "backend");
//! for server in upstream.upstream_servers() {
//!     let server = server.as_upstream_server().unwrap();
//!     assert_eq!(server.address, "127.0.0.1:8080");
//!     assert_eq!(server.flags, vec!["backup"]);
//! }
//! ```

pub mod ast;
pub mod dialect;
pub mod directives;
pub mod error;
pub mod include;
pub mod lexer;
mod options;

pub use ast::{
    Block, Config, Directive, ForeignCodeBlock, Include, InlineComment, Location, Node, NodeId,
    NodeKind, NodeRef, Parameter, Position, Upstream, UpstreamServer,
};
pub use dialect::Dialect;
pub use error::{LexerError, ParseError, ParseResult};
pub use include::{IncludeRegistry, IncludeState, Loader, MemoryLoader, NoFilesystem};
pub use options::ParseOptions;

use include::{is_hidden, unquote};
use lexer::{Lexer, Token, TokenKind};
use std::path::{Path, PathBuf};

/// Parse nginx configuration from a string with default options
pub fn parse_string(source: &str) -> ParseResult<Config> {
    parse_string_with(source, &ParseOptions::default())
}

/// Parse nginx configuration from a string. `include` patterns match
/// nothing because there is no filesystem; use [`parse_source`] with a
/// [`Loader`] to resolve them.
pub fn parse_string_with(source: &str, options: &ParseOptions) -> ParseResult<Config> {
    parse_source(source, options, &NoFilesystem)
}

/// Parse nginx configuration from a string, resolving includes through `loader`
pub fn parse_source(source: &str, options: &ParseOptions, loader: &dyn Loader) -> ParseResult<Config> {
    let mut registry = IncludeRegistry::new();
    Parser::new(source, options, loader, &mut registry)?.parse()
}

/// Parse the file at `path`, reading it (and its includes) through `loader`.
///
/// Relative include patterns are resolved against
/// [`ParseOptions::root_dir`], or the directory of `path` when unset.
pub fn parse_file(path: &Path, options: &ParseOptions, loader: &dyn Loader) -> ParseResult<Config> {
    let source = loader
        .read_to_string(path)
        .map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let root_dir = options
        .root_dir
        .clone()
        .unwrap_or_else(|| path.parent().map(Path::to_path_buf).unwrap_or_default());

    let mut registry = IncludeRegistry::new();
    registry.begin(loader.canonicalize(path));
    Parser::new(&source, options, loader, &mut registry)?
        .with_file_path(path)
        .with_root_dir(root_dir)
        .parse()
}

/// Recursive-descent parser for nginx configuration.
///
/// Keeps two tokens of lookahead (`current` and `following`) pulled from
/// the [`Lexer`]; line breaks are skipped here because every token carries
/// its own line.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    following: Token,
    options: &'a ParseOptions,
    loader: &'a dyn Loader,
    registry: &'a mut IncludeRegistry,
    root_dir: PathBuf,
    config: Config,
    comment_buffer: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &'a str,
        options: &'a ParseOptions,
        loader: &'a dyn Loader,
        registry: &'a mut IncludeRegistry,
    ) -> ParseResult<Self> {
        let lexer = Lexer::new(source)
            .with_foreign_code_suffixes(options.dialect.foreign_code_suffixes().iter().cloned());
        let eof = Token::new(TokenKind::Eof, "", Position::default());
        let mut parser = Self {
            lexer,
            current: eof.clone(),
            following: eof,
            options,
            loader,
            registry,
            root_dir: options.root_dir.clone().unwrap_or_default(),
            config: Config::default(),
            comment_buffer: Vec::new(),
        };
        parser.next_token()?;
        parser.next_token()?;
        Ok(parser)
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.file_path = path.into();
        self
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = dir.into();
        self
    }

    /// Parses the whole input. On error no partial config is returned.
    pub fn parse(mut self) -> ParseResult<Config> {
        self.config.root = self.parse_block(false, false, None)?;
        Ok(self.config)
    }

    /// Shifts the lookahead by one token and returns the old `current`.
    fn next_token(&mut self) -> ParseResult<Token> {
        let mut next = self.lexer.scan()?;
        while next.is(TokenKind::EndOfLine) {
            next = self.lexer.scan()?;
        }
        let following = std::mem::replace(&mut self.following, next);
        Ok(std::mem::replace(&mut self.current, following))
    }

    fn unexpected_current(&self) -> ParseError {
        ParseError::UnexpectedToken {
            kind: self.current.kind,
            literal: self.current.literal.clone(),
            position: self.current.position,
        }
    }

    fn parse_block(
        &mut self,
        in_nested_block: bool,
        skip_validation: bool,
        owner: Option<NodeId>,
    ) -> ParseResult<Block> {
        let mut block = Block::new();
        // Last sibling and the line it ended on, for inline comments.
        let mut last: Option<(NodeId, usize)> = None;

        loop {
            match self.current.kind {
                TokenKind::Eof if in_nested_block => {
                    return Err(ParseError::UnexpectedEof {
                        position: self.current.position,
                    });
                }
                TokenKind::Eof => break,
                TokenKind::BlockEnd if in_nested_block => break,
                TokenKind::Comment => {
                    let comment = self.next_token()?;
                    if self.options.skip_comments {
                        continue;
                    }
                    match last {
                        Some((id, end_line)) if end_line == comment.line() => {
                            let directive = &mut self.config.node_mut(id).directive;
                            let index = end_line.saturating_sub(directive.line);
                            directive
                                .inline_comments
                                .push(InlineComment::new(comment.literal, index));
                        }
                        _ => self.comment_buffer.push(comment.literal),
                    }
                }
                kind if kind.is_parameter() => {
                    let (id, end_line) = self.parse_statement(skip_validation, owner)?;
                    block.directives.push(id);
                    last = Some((id, end_line));
                }
                _ => return Err(self.unexpected_current()),
            }
        }

        block.trailing_comments = std::mem::take(&mut self.comment_buffer);
        Ok(block)
    }

    /// Parses one directive and returns its id with the line it ended on.
    fn parse_statement(
        &mut self,
        skip_validation: bool,
        parent: Option<NodeId>,
    ) -> ParseResult<(NodeId, usize)> {
        let options = self.options;
        let start = self.next_token()?;
        let position = start.position;

        if !skip_validation && !options.skip_validation && !options.dialect.is_known(&start.literal) {
            return Err(ParseError::UnknownDirective {
                name: start.literal,
                position,
            });
        }

        let mut directive = Directive {
            name: start.literal,
            parameters: Vec::new(),
            comment: std::mem::take(&mut self.comment_buffer),
            inline_comments: Vec::new(),
            parent,
            line: position.line,
        };
        let mut header_comments = Vec::new();
        let mut end_line = position.line;

        loop {
            match self.current.kind {
                kind if kind.is_parameter() => {
                    let token = self.next_token()?;
                    end_line = token.line();
                    directive
                        .parameters
                        .push(Parameter::on_line(token.literal, end_line - position.line));
                }
                TokenKind::Comment => {
                    let token = self.next_token()?;
                    let line = token.line();
                    if !options.skip_comments {
                        header_comments.push(InlineComment::new(token.literal, line - position.line));
                    }
                }
                TokenKind::Semicolon => {
                    let semicolon = self.next_token()?;
                    directive.inline_comments = header_comments;
                    let id = self.finish_statement(directive, position)?;
                    return Ok((id, semicolon.line()));
                }
                TokenKind::BlockStart => {
                    return self.parse_block_statement(
                        directive,
                        header_comments,
                        position,
                        skip_validation,
                    );
                }
                TokenKind::BlockEnd => {
                    // `listen 80 }`: keep what was read and let the block close.
                    directive.inline_comments = header_comments;
                    let id = self
                        .config
                        .alloc(Node::new(directive, NodeKind::Directive(None)));
                    return Ok((id, end_line));
                }
                _ => return Err(self.unexpected_current()),
            }
        }
    }

    /// Builds the node for a `;`-terminated directive. Include handling wins
    /// over directive wrappers.
    fn finish_statement(&mut self, mut directive: Directive, position: Position) -> ParseResult<NodeId> {
        let options = self.options;
        let dialect = &options.dialect;
        let kind = if dialect.is_include(&directive.name) {
            NodeKind::Include(self.build_include(&mut directive, position)?)
        } else if let Some(wrapper) = dialect.directive_wrapper(&directive.name) {
            wrapper(&mut directive, position)?
        } else {
            NodeKind::Directive(None)
        };
        Ok(self.config.alloc(Node::new(directive, kind)))
    }

    fn parse_block_statement(
        &mut self,
        mut directive: Directive,
        header_comments: Vec<InlineComment>,
        position: Position,
        skip_validation: bool,
    ) -> ParseResult<(NodeId, usize)> {
        let options = self.options;
        if options.dialect.is_include(&directive.name) {
            return Err(ParseError::IncludeBlock { position });
        }

        // Comments between parameters stay inline; the ones after the last
        // parameter go to the first child. Foreign code has no children, so
        // they are kept above the directive.
        let is_foreign_code = self.following.is(TokenKind::ForeignCode);
        let last_index = directive
            .parameters
            .last()
            .map_or(0, |p| p.relative_line_index);
        for comment in header_comments {
            if comment.relative_line_index < last_index {
                directive.inline_comments.push(comment);
            } else if is_foreign_code {
                directive.comment.push(comment.value);
            } else {
                self.comment_buffer.push(comment.value);
            }
        }

        let skip_children = skip_validation || options.dialect.skips_validation(&directive.name);
        self.next_token()?;
        let id = self
            .config
            .alloc(Node::new(directive, NodeKind::Directive(None)));

        let block = if is_foreign_code {
            Block::foreign(self.next_token()?.literal)
        } else {
            self.parse_block(true, skip_children, Some(id))?
        };
        if !self.current.is(TokenKind::BlockEnd) {
            return Err(self.unexpected_current());
        }
        let close = self.next_token()?;

        let node = self.config.node_mut(id);
        let kind = if block.is_foreign_code() && options.dialect.is_foreign_code(&node.directive.name) {
            NodeKind::ForeignCode(ForeignCodeBlock {
                code: block.foreign_code.unwrap_or_default(),
            })
        } else if let Some(wrapper) = options.dialect.block_wrapper(&node.directive.name) {
            wrapper(&mut node.directive, block, position)?
        } else {
            NodeKind::Directive(Some(block))
        };
        node.kind = kind;
        Ok((id, close.line()))
    }

    fn build_include(&mut self, directive: &mut Directive, position: Position) -> ParseResult<Include> {
        let include_path = match directive.parameters.len() {
            0 => {
                return Err(ParseError::MissingParameter {
                    directive: directive.name.clone(),
                    position,
                });
            }
            1 => directive.parameters.remove(0).value,
            count => return Err(ParseError::IncludeParameters { count, position }),
        };

        let mut include = Include {
            include_path,
            resolved_configs: Vec::new(),
        };
        if self.options.parse_includes {
            self.resolve_include(&mut include)?;
        }
        Ok(include)
    }

    fn resolve_include(&mut self, include: &mut Include) -> ParseResult<()> {
        let pattern = self.root_dir.join(unquote(&include.include_path));
        let paths = match self.loader.glob(&pattern) {
            Ok(paths) => paths,
            Err(source) if self.options.skip_include_errors => {
                log::warn!("ignoring include {}: {}", pattern.display(), source);
                return Ok(());
            }
            Err(source) => {
                return Err(ParseError::IncludeGlob {
                    pattern: pattern.display().to_string(),
                    source,
                });
            }
        };
        log::debug!("include {} matched {} file(s)", pattern.display(), paths.len());

        for path in paths {
            if is_hidden(&path) {
                log::debug!("skipping hidden file {}", path.display());
                continue;
            }

            let key = self.loader.canonicalize(&path);
            match self.registry.state(&key) {
                Some(IncludeState::InProgress) => {
                    log::debug!("{} is already being parsed, skipping", path.display());
                    continue;
                }
                Some(IncludeState::Parsed(config)) => {
                    log::debug!("reusing parsed {}", path.display());
                    include.resolved_configs.push(config.clone());
                    continue;
                }
                None => {}
            }

            match self.parse_included(&path, key) {
                Ok(config) => include.resolved_configs.push(config),
                Err(e) if self.options.skip_include_errors => {
                    log::warn!("ignoring included file {}: {}", path.display(), e);
                }
                Err(e) => {
                    return Err(ParseError::IncludedFile {
                        path,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(())
    }

    fn parse_included(&mut self, path: &Path, key: PathBuf) -> ParseResult<Config> {
        let source = self
            .loader
            .read_to_string(path)
            .map_err(|source| ParseError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        self.registry.begin(key.clone());
        let root_dir = self.root_dir.clone();
        let result = Parser::new(&source, self.options, self.loader, &mut *self.registry)
            .and_then(|parser| parser.with_file_path(path).with_root_dir(root_dir).parse());

        match &result {
            Ok(config) => self.registry.finish(key, config.clone()),
            Err(_) => self.registry.abandon(&key),
        }
        result
    }
}
