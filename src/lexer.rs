use std::collections::VecDeque;

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, SourceLoc, SourceRange};
use crate::token::{Token, TokenKind};

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Keywords are matched case-insensitively; `lexeme` must already be
/// lowercased. `true`/`false` are handled separately because they carry a
/// boolean payload.
fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    let kind = match lexeme {
        "begin" => TokenKind::Begin,
        "call" => TokenKind::Call,
        "const" => TokenKind::Const,
        "do" => TokenKind::Do,
        "else" => TokenKind::Else,
        "end" => TokenKind::End,
        "if" => TokenKind::If,
        "odd" => TokenKind::Odd,
        "procedure" => TokenKind::Procedure,
        "then" => TokenKind::Then,
        "var" => TokenKind::Var,
        "while" => TokenKind::While,
        "repeat" => TokenKind::Repeat,
        "until" => TokenKind::Until,
        "read" => TokenKind::Read,
        "write" => TokenKind::Write,
        "writeln" => TokenKind::Writeln,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => return None,
    };
    Some(kind)
}

/// Buffered scanner over UTF-8 source text.
///
/// Tokens are produced lazily; `peek` fills an internal buffer to support
/// arbitrary non-negative lookahead. Lexical errors are reported to the
/// diagnostic sink and scanning continues; the stream always terminates in
/// an end-of-file token.
pub struct Lexer<'a> {
    source: &'a str,
    index: usize,
    location: SourceLoc,
    buffer: VecDeque<Token>,
    diagnostics: &'a mut DiagnosticSink,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, diagnostics: &'a mut DiagnosticSink) -> Self {
        Self {
            source,
            index: 0,
            location: SourceLoc::default(),
            buffer: VecDeque::new(),
            diagnostics,
        }
    }

    /// Returns the `lookahead`-th upcoming token without consuming it.
    pub fn peek(&mut self, lookahead: usize) -> &Token {
        while self.buffer.len() <= lookahead {
            let token = self.scan_token();
            self.buffer.push_back(token);
        }
        &self.buffer[lookahead]
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> Token {
        if let Some(token) = self.buffer.pop_front() {
            return token;
        }
        self.scan_token()
    }

    /// Rewinds the scanner to the start of the source.
    pub fn reset(&mut self) {
        self.index = 0;
        self.location = SourceLoc::default();
        self.buffer.clear();
    }

    /// The sink shared with the parser, which drives this lexer.
    pub fn diagnostics(&mut self) -> &mut DiagnosticSink {
        self.diagnostics
    }

    fn scan_token(&mut self) -> Token {
        loop {
            self.skip_whitespace_and_comments();
            let start = self.location;

            let Some(ch) = self.peek_char() else {
                return Token::new(TokenKind::EndOfFile, "", SourceRange::new(start, start));
            };

            if ch.is_ascii_digit() {
                return self.lex_number(start);
            }
            if is_identifier_start(ch) {
                return self.lex_identifier_or_keyword(start);
            }
            if let Some(token) = self.lex_symbol(start) {
                return token;
            }
            // Bad character already reported; keep scanning.
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.peek_char() {
                if ch == ' ' || ch == '\t' || ch == '\r' || ch == '\n' {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.peek_char() != Some('/') {
                return;
            }
            match self.peek_char_at(1) {
                Some('/') => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('*') => {
                    let start = self.location;
                    self.advance();
                    self.advance();
                    let mut terminated = false;
                    while let Some(ch) = self.peek_char() {
                        if ch == '*' && self.peek_char_at(1) == Some('/') {
                            self.advance();
                            self.advance();
                            terminated = true;
                            break;
                        }
                        self.advance();
                    }
                    if !terminated {
                        self.diagnostics.report(Diagnostic::error(
                            DiagnosticCode::UnterminatedComment,
                            "unterminated block comment",
                            SourceRange::new(start, self.location),
                        ));
                    }
                }
                _ => return,
            }
        }
    }

    fn lex_number(&mut self, start: SourceLoc) -> Token {
        let begin = self.index;
        while let Some(ch) = self.peek_char() {
            if !ch.is_ascii_digit() {
                break;
            }
            self.advance();
        }
        let text = &self.source[begin..self.index];
        let range = SourceRange::new(start, self.location);
        let value = match text.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                self.diagnostics.report(Diagnostic::error(
                    DiagnosticCode::InvalidNumber,
                    format!("integer literal '{text}' out of range"),
                    range,
                ));
                0
            }
        };
        let mut token = Token::new(TokenKind::Number, text, range);
        token.number = Some(value);
        token
    }

    fn lex_identifier_or_keyword(&mut self, start: SourceLoc) -> Token {
        let begin = self.index;
        self.advance();
        while let Some(ch) = self.peek_char() {
            if !is_identifier_part(ch) {
                break;
            }
            self.advance();
        }
        let text = &self.source[begin..self.index];
        let range = SourceRange::new(start, self.location);
        let lower = text.to_ascii_lowercase();

        if lower == "true" || lower == "false" {
            let mut token = Token::new(TokenKind::Boolean, text, range);
            token.boolean = Some(lower == "true");
            return token;
        }
        if let Some(kind) = keyword_kind(&lower) {
            return Token::new(kind, text, range);
        }
        Token::new(TokenKind::Identifier, text, range)
    }

    fn lex_symbol(&mut self, start: SourceLoc) -> Option<Token> {
        let begin = self.index;
        let ch = self.advance().unwrap_or('\0');
        let kind = match ch {
            '+' => {
                if self.eat_char('=') {
                    TokenKind::PlusAssign
                } else if self.eat_char('+') {
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat_char('=') {
                    TokenKind::MinusAssign
                } else if self.eat_char('-') {
                    TokenKind::MinusMinus
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat_char('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.eat_char('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.eat_char('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            ':' => {
                if self.eat_char('=') {
                    TokenKind::Assign
                } else {
                    TokenKind::Colon
                }
            }
            '=' => TokenKind::Equal,
            '#' => TokenKind::NotEqual,
            '!' => {
                if self.eat_char('=') {
                    TokenKind::NotEqual
                } else {
                    self.diagnostics.report(Diagnostic::error(
                        DiagnosticCode::UnexpectedToken,
                        "unexpected '!'",
                        SourceRange::new(start, self.location),
                    ));
                    return None;
                }
            }
            '<' => {
                if self.eat_char('=') {
                    TokenKind::LessEqual
                } else if self.eat_char('>') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Period,
            _ => {
                self.diagnostics.report(Diagnostic::error(
                    DiagnosticCode::UnexpectedToken,
                    format!("unexpected character '{ch}'"),
                    SourceRange::new(start, self.location),
                ));
                return None;
            }
        };

        let range = SourceRange::new(start, self.location);
        Some(Token::new(kind, &self.source[begin..self.index], range))
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.index..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        let mut chars = self.source[self.index..].chars();
        for _ in 0..offset {
            chars.next()?;
        }
        chars.next()
    }

    fn eat_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.index += ch.len_utf8();
        if ch == '\n' {
            self.location.line += 1;
            self.location.column = 1;
        } else {
            self.location.column += 1;
        }
        Some(ch)
    }
}

/// Scans the whole source into a token vector ending in end-of-file.
pub fn tokenize(source: &str, diagnostics: &mut DiagnosticSink) -> Vec<Token> {
    let mut lexer = Lexer::new(source, diagnostics);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next();
        let is_eof = token.kind == TokenKind::EndOfFile;
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    tokens
}
