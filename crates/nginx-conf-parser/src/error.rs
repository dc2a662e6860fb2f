//! Error types for the nginx configuration parser.
//!
//! Errors are split into two stages:
//!
//! - [`LexerError`]: tokenization failures that abort the whole parse
//!   (unterminated strings, unterminated foreign code).
//! - [`ParseError`]: everything found while building the document, including
//!   validation failures and problems resolving `include` directives.
//!
//! Positional variants carry a [`Position`] so that error messages can point
//! to the exact line and column in the source.

use crate::ast::Position;
use crate::lexer::TokenKind;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// An error that occurs during tokenization (lexing).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    /// A quoted string was opened but never closed before end-of-file.
    #[error("unterminated string starting on line {}, column {}", .position.line, .position.column)]
    UnterminatedString { position: Position },

    /// A foreign code block (e.g. `content_by_lua_block`) never reached its closing brace.
    #[error("unterminated foreign code block starting on line {}, column {}", .position.line, .position.column)]
    UnterminatedForeignCode { position: Position },
}

impl LexerError {
    /// Returns the source position where this error occurred.
    pub fn position(&self) -> Position {
        match self {
            LexerError::UnterminatedString { position } => *position,
            LexerError::UnterminatedForeignCode { position } => *position,
        }
    }
}

/// An error that occurs during parsing.
///
/// Includes forwarded [`LexerError`]s and failures of included files.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A tokenization error propagated from the lexer.
    #[error("{0}")]
    Lexer(#[from] LexerError),

    /// A token showed up where the grammar does not allow it.
    #[error("unexpected token {kind} ({literal}) on line {}, column {}", .position.line, .position.column)]
    UnexpectedToken {
        kind: TokenKind,
        literal: String,
        position: Position,
    },

    /// The input ended inside a block.
    #[error("unexpected end of file in block on line {}, column {}", .position.line, .position.column)]
    UnexpectedEof { position: Position },

    /// The directive name is neither known nor registered as a custom directive.
    #[error("unknown directive '{name}' on line {}, column {}", .position.line, .position.column)]
    UnknownDirective { name: String, position: Position },

    #[error("no enough parameter for location on line {}, column {}", .position.line, .position.column)]
    LocationMissingParameter { position: Position },

    #[error("too many arguments for location directive on line {}, column {}", .position.line, .position.column)]
    LocationTooManyParameters { position: Position },

    /// `upstream` blocks take exactly one name.
    #[error("upstream directive expects exactly one parameter, found {count} on line {}, column {}", .position.line, .position.column)]
    UpstreamParameters { count: usize, position: Position },

    /// A directive that needs at least one parameter had none.
    #[error("{directive} directive requires a parameter on line {}, column {}", .position.line, .position.column)]
    MissingParameter {
        directive: String,
        position: Position,
    },

    #[error("include directive can not have multiple parameters, found {count} on line {}, column {}", .position.line, .position.column)]
    IncludeParameters { count: usize, position: Position },

    #[error("include can not have a block, or missing semicolon at the end of include statement on line {}, column {}", .position.line, .position.column)]
    IncludeBlock { position: Position },

    /// The include pattern could not be expanded.
    #[error("failed to expand include pattern '{pattern}': {source}")]
    IncludeGlob {
        pattern: String,
        #[source]
        source: io::Error,
    },

    /// An included file failed to parse.
    #[error("in included file {}: {source}", .path.display())]
    IncludedFile {
        path: PathBuf,
        #[source]
        source: Box<ParseError>,
    },

    /// A file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ParseError {
    /// Returns the source position where this error occurred, if available.
    ///
    /// Errors coming from included files report the position inside the
    /// included file.
    pub fn position(&self) -> Option<Position> {
        match self {
            ParseError::Lexer(e) => Some(e.position()),
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEof { position }
            | ParseError::UnknownDirective { position, .. }
            | ParseError::LocationMissingParameter { position }
            | ParseError::LocationTooManyParameters { position }
            | ParseError::UpstreamParameters { position, .. }
            | ParseError::MissingParameter { position, .. }
            | ParseError::IncludeParameters { position, .. }
            | ParseError::IncludeBlock { position } => Some(*position),
            ParseError::IncludedFile { source, .. } => source.position(),
            ParseError::IncludeGlob { .. } | ParseError::Io { .. } => None,
        }
    }
}

/// Result type alias for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Display implementation for user-friendly error messages
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
