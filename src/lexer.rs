//! Scans cbuf schema text into a flat token stream.
//!
//! Whitespace and comments (including nested `/* */` block comments) are
//! dropped here; `line`/`column` are attached to every token and carried
//! forward into the AST so a struct descriptor can report where its name
//! token sat in the source.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Semicolon,
    Comma,
    Eq,
    Star,
    Plus,
    Minus,
    Slash,
    ColonColon,
    At,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub pos: Position,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.pos)
    }
}

impl std::error::Error for LexError {}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        };
        lexer.run()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn here(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn err(&self, pos: Position, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            pos,
        }
    }

    fn run(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let pos = self.here();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                });
                break;
            };
            let kind = if c.is_ascii_digit() {
                self.lex_number()?
            } else if c == '"' {
                self.lex_string()?
            } else if is_ident_start(c) {
                TokenKind::Ident(self.lex_ident())
            } else {
                self.lex_punct()?
            };
            tokens.push(Token { kind, pos });
        }
        Ok(tokens)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.skip_block_comment()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start = self.here();
        self.bump(); // '/'
        self.bump(); // '*'
        let mut depth = 1usize;
        while depth > 0 {
            match (self.peek(), self.peek_at(1)) {
                (Some('/'), Some('*')) => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                (Some('*'), Some('/')) => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                }
                (Some(_), _) => {
                    self.bump();
                }
                (None, _) => return Err(self.err(start, "unterminated block comment")),
            }
        }
        Ok(())
    }

    fn lex_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexError> {
        let start_pos = self.here();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                return Err(self.err(start_pos, "hex literal with no digits"));
            }
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|e| self.err(start_pos, format!("bad hex literal: {e}")))?;
            return Ok(TokenKind::Int(value));
        }

        let mut s = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            s.push(self.bump().unwrap());
        }

        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            s.push(self.bump().unwrap()); // '.'
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                s.push(self.bump().unwrap());
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = (self.pos, self.line, self.column);
            let mut exp = String::new();
            exp.push(self.bump().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                exp.push(self.bump().unwrap());
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    exp.push(self.bump().unwrap());
                }
                s.push_str(&exp);
                is_float = true;
            } else {
                (self.pos, self.line, self.column) = save;
            }
        }

        if is_float {
            let value = s
                .parse::<f64>()
                .map_err(|e| self.err(start_pos, format!("bad float literal: {e}")))?;
            Ok(TokenKind::Float(value))
        } else {
            let value = s
                .parse::<i64>()
                .map_err(|e| self.err(start_pos, format!("bad integer literal: {e}")))?;
            Ok(TokenKind::Int(value))
        }
    }

    fn lex_string(&mut self) -> Result<TokenKind, LexError> {
        let start_pos = self.here();
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err(start_pos, "unterminated string literal")),
                Some('"') => break,
                Some('\\') => {
                    let esc_pos = self.here();
                    match self.bump() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        Some('0') => s.push('\0'),
                        Some('x') => {
                            let mut hex = String::new();
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(c) if c.is_ascii_hexdigit() => {
                                        hex.push(c);
                                        self.bump();
                                    }
                                    _ => return Err(self.err(esc_pos, "bad \\x escape")),
                                }
                            }
                            let byte = u8::from_str_radix(&hex, 16)
                                .map_err(|e| self.err(esc_pos, format!("bad \\x escape: {e}")))?;
                            s.push(byte as char);
                        }
                        _ => return Err(self.err(esc_pos, "unknown escape sequence")),
                    }
                }
                Some(c) => s.push(c),
            }
        }
        Ok(TokenKind::Str(s))
    }

    fn lex_punct(&mut self) -> Result<TokenKind, LexError> {
        let pos = self.here();
        let c = self.bump().unwrap();
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Eq,
            '*' => TokenKind::Star,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '@' => TokenKind::At,
            ':' if self.peek() == Some(':') => {
                self.bump();
                TokenKind::ColonColon
            }
            other => return Err(self.err(pos, format!("unexpected character '{other}'"))),
        };
        Ok(kind)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
