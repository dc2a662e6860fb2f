use crate::ast::Position;
use crate::error::{LexerError, ParseResult};
use std::fmt;

/// Directive suffix that marks an embedded Lua block.
pub const LUA_BLOCK_SUFFIX: &str = "_by_lua_block";

/// Token types for nginx configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// End of input
    Eof,
    /// Bare word: directive names and unquoted arguments (`listen`, `80`, `/var/www`)
    Keyword,
    /// Quoted string, delimiters and escapes kept verbatim (`"a \"b\""`)
    QuotedString,
    /// Bare word starting with `$` (`$host`, `${scheme}://x`)
    Variable,
    /// Open brace {
    BlockStart,
    /// Close brace }
    BlockEnd,
    /// Semicolon ;
    Semicolon,
    /// Comment (# ...), the `#` is part of the literal
    Comment,
    /// `\n` or `\r`
    EndOfLine,
    /// Bare word holding a regex quantifier or escaped brace (`^/\d{3}$`)
    Regex,
    /// Verbatim body of an embedded script block
    ForeignCode,
    /// Control character that can not start any token
    Illegal,
}

impl TokenKind {
    /// Returns a human-readable name for this token kind, used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            TokenKind::Eof => "Eof",
            TokenKind::Keyword => "Keyword",
            TokenKind::QuotedString => "QuotedString",
            TokenKind::Variable => "Variable",
            TokenKind::BlockStart => "BlockStart",
            TokenKind::BlockEnd => "BlockEnd",
            TokenKind::Semicolon => "Semicolon",
            TokenKind::Comment => "Comment",
            TokenKind::EndOfLine => "EndOfLine",
            TokenKind::Regex => "Regex",
            TokenKind::ForeignCode => "ForeignCode",
            TokenKind::Illegal => "Illegal",
        }
    }

    /// Whether a token of this kind can be a directive name or parameter.
    pub fn is_parameter(&self) -> bool {
        matches!(
            self,
            TokenKind::Keyword | TokenKind::QuotedString | TokenKind::Variable | TokenKind::Regex
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A token with the position where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text of the token (quoted strings keep their quotes).
    pub literal: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            literal: literal.into(),
            position,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn line(&self) -> usize {
        self.position.line
    }
}

/// Lexer for tokenizing nginx configuration files.
///
/// Produces one [`Token`] per [`scan`](Lexer::scan) call. Line endings are
/// reported as [`TokenKind::EndOfLine`] so callers can track layout.
///
/// The lexer remembers the first word of the statement being scanned. When
/// that word ends with one of the foreign code suffixes (`_by_lua_block` by
/// default), the body of the following `{` is captured verbatim as a single
/// [`TokenKind::ForeignCode`] token.
pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
    offset: usize,
    foreign_code_suffixes: Vec<String>,
    expect_statement_head: bool,
    head_is_foreign: bool,
    capture_foreign_code: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            offset: 0,
            foreign_code_suffixes: vec![LUA_BLOCK_SUFFIX.to_string()],
            expect_statement_head: true,
            head_is_foreign: false,
            capture_foreign_code: false,
        }
    }

    /// Replaces the directive suffixes whose blocks are captured verbatim.
    pub fn with_foreign_code_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_code_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.offset)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((idx, ch)) = self.chars.next() {
            self.offset = idx + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            Some((idx, ch))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn skip_whitespace_same_line(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == ' ' || ch == '\t' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Returns the next token. Once the input is exhausted every call
    /// returns an [`TokenKind::Eof`] token.
    pub fn scan(&mut self) -> ParseResult<Token> {
        if self.capture_foreign_code {
            self.capture_foreign_code = false;
            return self.scan_foreign_code();
        }

        self.skip_whitespace_same_line();
        let position = self.position();

        let Some(ch) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, "", position));
        };

        let token = match ch {
            '\n' | '\r' => {
                self.advance();
                Token::new(TokenKind::EndOfLine, ch, position)
            }
            ';' => {
                self.advance();
                self.end_statement();
                Token::new(TokenKind::Semicolon, ";", position)
            }
            '{' => {
                self.advance();
                self.capture_foreign_code = self.head_is_foreign;
                self.end_statement();
                Token::new(TokenKind::BlockStart, "{", position)
            }
            '}' => {
                self.advance();
                self.end_statement();
                Token::new(TokenKind::BlockEnd, "}", position)
            }
            '#' => self.scan_comment(position),
            '"' | '\'' | '`' => self.scan_quoted_string(ch, position)?,
            c if c.is_control() && c != '\t' => {
                self.advance();
                Token::new(TokenKind::Illegal, c, position)
            }
            _ => self.scan_keyword(position),
        };

        Ok(token)
    }

    /// Scans the whole input. The terminating `Eof` (or the first `Illegal`
    /// token) is not included.
    pub fn scan_all(&mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan()?;
            if matches!(token.kind, TokenKind::Eof | TokenKind::Illegal) {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn end_statement(&mut self) {
        self.expect_statement_head = true;
        self.head_is_foreign = false;
    }

    fn note_word(&mut self, literal: &str, is_keyword: bool) {
        if self.expect_statement_head {
            self.expect_statement_head = false;
            self.head_is_foreign = is_keyword
                && self
                    .foreign_code_suffixes
                    .iter()
                    .any(|suffix| literal.ends_with(suffix.as_str()));
        }
    }

    fn scan_comment(&mut self, position: Position) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            text.push(c);
            self.advance();
        }
        Token::new(TokenKind::Comment, text, position)
    }

    fn scan_quoted_string(&mut self, delimiter: char, position: Position) -> ParseResult<Token> {
        let mut literal = String::new();
        if let Some((_, open)) = self.advance() {
            literal.push(open);
        }

        loop {
            match self.advance() {
                Some((_, ch)) if ch == delimiter => {
                    literal.push(ch);
                    break;
                }
                Some((_, '\\')) => {
                    // Escapes stay verbatim; the escaped char never closes the string.
                    literal.push('\\');
                    match self.advance() {
                        Some((_, c)) => literal.push(c),
                        None => return Err(LexerError::UnterminatedString { position }.into()),
                    }
                }
                Some((_, ch)) => literal.push(ch),
                None => return Err(LexerError::UnterminatedString { position }.into()),
            }
        }

        self.note_word(&literal, false);
        Ok(Token::new(TokenKind::QuotedString, literal, position))
    }

    fn scan_keyword(&mut self, position: Position) -> Token {
        let mut literal = String::new();
        let mut is_regex = false;
        let mut in_variable_ref = false;
        let mut prev = '\0';

        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | ';' | '\n' | '\r' => break,
                '{' if prev == '$' || in_variable_ref => {
                    in_variable_ref = true;
                }
                '{' => {
                    // Regex quantifier like {8} or {1,3}
                    let Some(quantifier) = self.peek_regex_quantifier() else {
                        break;
                    };
                    for _ in 0..quantifier.chars().count() {
                        self.advance();
                    }
                    literal.push_str(&quantifier);
                    is_regex = true;
                    prev = '}';
                    continue;
                }
                '}' if in_variable_ref => {
                    in_variable_ref = false;
                }
                '}' => break,
                '\\' => {
                    if let Some(escaped) = self.peek_escaped_brace() {
                        self.advance();
                        self.advance();
                        literal.push('\\');
                        literal.push(escaped);
                        is_regex = true;
                        prev = escaped;
                        continue;
                    }
                }
                _ => {}
            }
            literal.push(ch);
            self.advance();
            prev = ch;
        }

        let kind = if is_regex {
            TokenKind::Regex
        } else if literal.starts_with('$') {
            TokenKind::Variable
        } else {
            TokenKind::Keyword
        };
        self.note_word(&literal, kind == TokenKind::Keyword);
        Token::new(kind, literal, position)
    }

    /// Captures everything up to the `}` that closes the current block.
    ///
    /// Nested braces are balanced with a depth counter. `#` comments are
    /// copied through to the end of their line without touching the counter.
    /// The closing `}` is left in the input so the next scan yields `BlockEnd`.
    fn scan_foreign_code(&mut self) -> ParseResult<Token> {
        let position = self.position();
        let mut code = String::new();
        let mut depth = 0usize;

        loop {
            match self.peek() {
                None => return Err(LexerError::UnterminatedForeignCode { position }.into()),
                Some('}') if depth == 0 => break,
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        code.push(c);
                        self.advance();
                    }
                    continue;
                }
                Some('{') => depth += 1,
                Some('}') => depth -= 1,
                Some(_) => {}
            }
            if let Some((_, ch)) = self.advance() {
                code.push(ch);
            }
        }

        Ok(Token::new(TokenKind::ForeignCode, code, position))
    }

    /// Peek ahead to check if we have an escaped brace (\{ or \})
    /// Returns the brace character if found
    fn peek_escaped_brace(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        if chars.next() != Some('\\') {
            return None;
        }
        match chars.next() {
            Some(c @ ('{' | '}')) => Some(c),
            _ => None,
        }
    }

    /// Peek ahead to check if we have a regex quantifier pattern like {8}, {8,}, {1,3}
    /// This doesn't consume any characters, just looks ahead in the source
    fn peek_regex_quantifier(&self) -> Option<String> {
        let remaining = &self.source[self.offset..];
        let mut chars = remaining.chars().peekable();
        if chars.next() != Some('{') {
            return None;
        }

        let mut quantifier = String::from("{");

        // Must have at least one digit
        match chars.peek() {
            Some(ch) if ch.is_ascii_digit() => {}
            _ => return None,
        }
        while let Some(&ch) = chars.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            quantifier.push(ch);
            chars.next();
        }

        if chars.peek() == Some(&',') {
            quantifier.push(',');
            chars.next();
            while let Some(&ch) = chars.peek() {
                if !ch.is_ascii_digit() {
                    break;
                }
                quantifier.push(ch);
                chars.next();
            }
        }

        if chars.peek() == Some(&'}') {
            quantifier.push('}');
            Some(quantifier)
        } else {
            None
        }
    }
}
