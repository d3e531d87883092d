use std::rc::Rc;

use crate::diagnostics::{Diagnostic, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Const,
    Fn,
    Type,
    If,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    Return,
    True,
    False,
    Null,
    Try,
    Catch,
    Throw,
    Import,
    As,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Let => "let",
            Keyword::Const => "const",
            Keyword::Fn => "fn",
            Keyword::Type => "type",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Return => "return",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
            Keyword::Try => "try",
            Keyword::Catch => "catch",
            Keyword::Throw => "throw",
            Keyword::Import => "import",
            Keyword::As => "as",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Int,
    Double,
    String,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    ColonColon,
    Semicolon,
    Question,
    Arrow,
    FatArrow,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Pipe,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Eof,
}

/// A lexed token. For string literals `lexeme` holds the decoded text.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: Location,
}

/// Streaming tokenizer. Construct a new lexer over the same source to restart.
pub struct Lexer<'a> {
    source: &'a str,
    file: Rc<str>,
    chars: std::str::CharIndices<'a>,
    current: usize,
    peeked: Option<(usize, char)>,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: impl Into<Rc<str>>) -> Self {
        Self {
            source,
            file: file.into(),
            chars: source.char_indices(),
            current: 0,
            peeked: None,
            line: 1,
            column: 1,
            finished: false,
        }
    }

    fn location(&self) -> Location {
        Location::new(Rc::clone(&self.file), self.line, self.column)
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = match self.peeked.take() {
            Some(pair) => Some(pair),
            None => self.chars.next(),
        };
        if let Some((idx, ch)) = next {
            self.current = idx + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    /// Looks one character past `peek` without consuming anything.
    fn peek_second(&mut self) -> Option<char> {
        self.peek();
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        match self.peek() {
            Some((_, ch)) if ch == expected => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        loop {
            while let Some((_, ch)) = self.peek() {
                if ch.is_whitespace() {
                    self.bump();
                } else {
                    break;
                }
            }

            match (self.peek(), self.peek_second()) {
                (Some((_, '/')), Some('/')) => {
                    while let Some((_, ch)) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some((_, '/')), Some('*')) => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    let mut depth = 1;
                    while depth > 0 {
                        match self.bump() {
                            Some((_, '/')) if self.match_next('*') => depth += 1,
                            Some((_, '*')) if self.match_next('/') => depth -= 1,
                            Some(_) => {}
                            None => {
                                return Err(Diagnostic::syntax_error(
                                    "unterminated block comment",
                                    start,
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier_or_keyword(&mut self, start: usize, location: Location) -> Token {
        while let Some((_, ch)) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let lexeme = self.source[start..self.current].to_string();
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            location,
        }
    }

    fn number_literal(&mut self, start: usize, location: Location) -> Token {
        let mut is_double = false;
        while let Some((_, ch)) = self.peek() {
            match ch {
                '0'..='9' | '_' => {
                    self.bump();
                }
                '.' if !is_double && self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                    is_double = true;
                    self.bump();
                }
                'e' | 'E' => {
                    let after = self.peek_second();
                    let signed = matches!(after, Some('+' | '-'));
                    if !signed && !after.is_some_and(|c| c.is_ascii_digit()) {
                        break;
                    }
                    is_double = true;
                    self.bump();
                    if signed {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        Token {
            kind: if is_double {
                TokenKind::Double
            } else {
                TokenKind::Int
            },
            lexeme: self.source[start..self.current].replace('_', ""),
            location,
        }
    }

    fn string_literal(&mut self, location: Location) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        loop {
            let escape_at = self.location();
            match self.bump() {
                Some((_, '"')) => {
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        location,
                    });
                }
                Some((_, '\\')) => match self.bump() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '0')) => value.push('\0'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\'')) => value.push('\''),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'u')) => value.push(self.unicode_escape(escape_at)?),
                    Some((_, other)) => {
                        return Err(Diagnostic::syntax_error(
                            format!("unknown escape sequence `\\{other}`"),
                            escape_at,
                        ));
                    }
                    None => break,
                },
                Some((_, ch)) => value.push(ch),
                None => break,
            }
        }
        Err(Diagnostic::syntax_error(
            "unterminated string literal",
            location,
        ))
    }

    fn unicode_escape(&mut self, escape_at: Location) -> Result<char, Diagnostic> {
        let invalid = |at: Location| Diagnostic::syntax_error("invalid unicode escape", at);
        if !self.match_next('{') {
            return Err(invalid(escape_at));
        }
        let mut digits = String::new();
        loop {
            match self.bump() {
                Some((_, '}')) => break,
                Some((_, ch)) if ch.is_ascii_hexdigit() && digits.len() < 6 => digits.push(ch),
                _ => return Err(invalid(escape_at)),
            }
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| invalid(escape_at))
    }

    fn simple_token(&self, start: usize, kind: TokenKind, location: Location) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.current].to_string(),
            location,
        }
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_whitespace_and_comments()?;
        let location = self.location();
        let (start, ch) = match self.bump() {
            Some(pair) => pair,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    location,
                });
            }
        };

        let kind = match ch {
            c if c.is_alphabetic() || c == '_' => {
                return Ok(self.identifier_or_keyword(start, location));
            }
            '0'..='9' => return Ok(self.number_literal(start, location)),
            '"' => return self.string_literal(location),
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '?' => TokenKind::Question,
            ':' => {
                if self.match_next(':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            '+' => {
                if self.match_next('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.match_next('>') {
                    TokenKind::Arrow
                } else if self.match_next('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.match_next('*') {
                    TokenKind::StarStar
                } else if self.match_next('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.match_next('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.match_next('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.match_next('>') {
                    TokenKind::FatArrow
                } else if self.match_next('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.match_next('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                }
            }
            '&' if self.match_next('&') => TokenKind::DoubleAmpersand,
            '|' => {
                if self.match_next('|') {
                    TokenKind::DoublePipe
                } else {
                    TokenKind::Pipe
                }
            }
            '<' => {
                if self.match_next('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.match_next('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            other => {
                return Err(Diagnostic::syntax_error(
                    format!("unexpected character `{other}`"),
                    location,
                ));
            }
        };
        Ok(self.simple_token(start, kind, location))
    }

    pub fn tokenize(self) -> Result<Vec<Token>, Diagnostic> {
        self.collect()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Diagnostic>;

    /// Yields tokens up to and including `Eof`, or stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        match &token {
            Ok(tok) if tok.kind != TokenKind::Eof => {}
            _ => self.finished = true,
        }
        Some(token)
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "let" => Kw::Let,
        "const" => Kw::Const,
        "fn" => Kw::Fn,
        "type" => Kw::Type,
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "for" => Kw::For,
        "in" => Kw::In,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "return" => Kw::Return,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        "try" => Kw::Try,
        "catch" => Kw::Catch,
        "throw" => Kw::Throw,
        "import" => Kw::Import,
        "as" => Kw::As,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorKind;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, "<test>")
            .tokenize()
            .expect("lexing should succeed")
            .into_iter()
            .map(|tok| tok.kind)
            .collect()
    }

    #[test]
    fn classifies_keywords_and_identifiers() {
        assert_eq!(
            kinds("let letter = null; throw"),
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Keyword(Keyword::Null),
                TokenKind::Semicolon,
                TokenKind::Keyword(Keyword::Throw),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_int_and_double() {
        let tokens = Lexer::new("12 1.5 2e3 7.foo 1_000", "<test>")
            .tokenize()
            .expect("lexing should succeed");
        let summary: Vec<_> = tokens
            .iter()
            .map(|tok| (tok.kind.clone(), tok.lexeme.as_str()))
            .collect();
        assert_eq!(summary[0], (TokenKind::Int, "12"));
        assert_eq!(summary[1], (TokenKind::Double, "1.5"));
        assert_eq!(summary[2], (TokenKind::Double, "2e3"));
        assert_eq!(summary[3], (TokenKind::Int, "7"));
        assert_eq!(summary[4], (TokenKind::Dot, "."));
        assert_eq!(summary[6], (TokenKind::Int, "1000"));
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = Lexer::new("let a = 1;\n  a += 2;", "main.ks")
            .tokenize()
            .expect("lexing should succeed");
        let plus_assign = tokens
            .iter()
            .find(|tok| tok.kind == TokenKind::PlusAssign)
            .expect("`+=` token");
        assert_eq!(plus_assign.location.line, 2);
        assert_eq!(plus_assign.location.column, 5);
        assert_eq!(&*plus_assign.location.file, "main.ks");
    }

    #[test]
    fn skips_line_and_nested_block_comments() {
        assert_eq!(
            kinds("1 // one\n/* a /* b */ c */ 2"),
            vec![TokenKind::Int, TokenKind::Int, TokenKind::Eof]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        let tokens = Lexer::new(r#""a\tb\n\u{41}""#, "<test>")
            .tokenize()
            .expect("lexing should succeed");
        assert_eq!(tokens[0].lexeme, "a\tb\nA");
    }

    #[test]
    fn reports_unterminated_string_at_start() {
        let err = Lexer::new("let s = \"abc", "<test>")
            .tokenize()
            .expect_err("unterminated string");
        assert_eq!(err.kind, ErrorKind::Syntax);
        let location = err.location.expect("location");
        assert_eq!((location.line, location.column), (1, 9));
    }

    #[test]
    fn restarts_from_the_beginning() {
        let source = "a + b";
        let first: Vec<_> = Lexer::new(source, "<test>").map(|t| t.map(|t| t.kind)).collect();
        let second: Vec<_> = Lexer::new(source, "<test>").map(|t| t.map(|t| t.kind)).collect();
        assert_eq!(first.len(), 4);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }
}
