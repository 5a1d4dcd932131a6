//! Recursive-descent parser: turns a token stream from
//! `lexer` into the `ast::Schema` tree, enforcing the grammar-level
//! policies spelled out alongside it (duplicate names, known annotations,
//! the required trailing newline).

use std::fmt;

use crate::ast::{
    ArrayKind, ArraySuffix, ConstDecl, CustomTypeRef, ElementDecl, EnumDecl, EnumVariantDecl,
    Expr, NamespaceBody, PrimType, Schema, StructDecl, TypeRef,
};
use crate::lexer::{Lexer, Position, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: Position,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.pos)
    }
}

impl std::error::Error for ParseError {}

impl From<crate::lexer::LexError> for ParseError {
    fn from(e: crate::lexer::LexError) -> Self {
        ParseError {
            message: e.message,
            pos: e.pos,
        }
    }
}

pub fn parse(src: &str) -> Result<Schema, ParseError> {
    if !src.ends_with('\n') {
        return Err(ParseError {
            message: "schema text must end with a trailing newline".into(),
            pos: Position {
                line: src.lines().count() as u32,
                column: 1,
            },
        });
    }
    let tokens = Lexer::tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_schema()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_pos(&self) -> Position {
        self.peek().pos
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            pos: self.peek_pos(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.err(format!("expected {kind:?}, found {:?}", self.peek().kind)))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Position), ParseError> {
        let pos = self.peek_pos();
        match self.advance().kind {
            TokenKind::Ident(s) => Ok((s, pos)),
            other => Err(ParseError {
                message: format!("expected identifier, found {other:?}"),
                pos,
            }),
        }
    }

    fn peek_is_ident(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == word)
    }

    fn parse_schema(&mut self) -> Result<Schema, ParseError> {
        let mut schema = Schema::default();
        while !self.at_eof() {
            if self.peek_is_ident("namespace") {
                let (name, body) = self.parse_namespace()?;
                schema.namespaces.push((name, body));
            } else if self.peek_is_ident("struct") {
                schema.global.structs.push(self.parse_struct()?);
            } else if self.peek_is_ident("enum") {
                schema.global.enums.push(self.parse_enum()?);
            } else if self.peek_is_ident("const") {
                schema.global.consts.push(self.parse_const()?);
            } else {
                return Err(self.err(format!("expected a top-level item, found {:?}", self.peek().kind)));
            }
        }
        Ok(schema)
    }

    fn parse_namespace(&mut self) -> Result<(String, NamespaceBody), ParseError> {
        self.advance(); // 'namespace'
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;
        let mut body = NamespaceBody::default();
        while self.peek().kind != TokenKind::RBrace {
            if self.peek_is_ident("struct") {
                body.structs.push(self.parse_struct()?);
            } else if self.peek_is_ident("enum") {
                body.enums.push(self.parse_enum()?);
            } else if self.peek_is_ident("const") {
                body.consts.push(self.parse_const()?);
            } else {
                return Err(self.err(format!(
                    "expected a struct, enum, or const inside namespace '{name}', found {:?}",
                    self.peek().kind
                )));
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok((name, body))
    }

    fn parse_struct(&mut self) -> Result<StructDecl, ParseError> {
        self.advance(); // 'struct'
        let (name, pos) = self.expect_ident()?;
        let mut naked = false;
        if self.peek().kind == TokenKind::At {
            self.advance();
            let (annotation, apos) = self.expect_ident()?;
            if annotation != "naked" {
                return Err(ParseError {
                    message: format!("unknown annotation '@{annotation}' on struct '{name}'"),
                    pos: apos,
                });
            }
            naked = true;
        }
        self.expect(TokenKind::LBrace)?;
        let mut elements = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            elements.push(self.parse_element()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(StructDecl {
            name,
            naked,
            elements,
            pos,
        })
    }

    fn parse_element(&mut self) -> Result<ElementDecl, ParseError> {
        let type_ref = self.parse_type_ref()?;
        let (name, pos) = self.expect_ident()?;

        let mut array = None;
        if self.peek().kind == TokenKind::LBracket {
            self.advance();
            let kind = if self.peek().kind == TokenKind::RBracket {
                ArrayKind::Dynamic
            } else {
                let size_expr = self.parse_expr()?;
                ArrayKind::Fixed(size_expr)
            };
            self.expect(TokenKind::RBracket)?;

            let mut compact = false;
            if self.peek().kind == TokenKind::At {
                let at_pos = self.peek_pos();
                self.advance();
                let (annotation, apos) = self.expect_ident()?;
                if annotation != "compact" {
                    return Err(ParseError {
                        message: format!("unknown annotation '@{annotation}' on element '{name}'"),
                        pos: apos,
                    });
                }
                if matches!(kind, ArrayKind::Dynamic) {
                    return Err(ParseError {
                        message: "'@compact' requires a fixed array suffix".into(),
                        pos: at_pos,
                    });
                }
                compact = true;
            }
            array = Some(ArraySuffix { kind, compact });
        } else if self.peek().kind == TokenKind::At {
            self.advance();
            let (annotation, apos) = self.expect_ident()?;
            return Err(ParseError {
                message: format!("'@{annotation}' is only valid on array elements"),
                pos: apos,
            });
        }

        let mut default = None;
        if self.peek().kind == TokenKind::Eq {
            self.advance();
            default = Some(self.parse_default_value()?);
        }
        self.expect(TokenKind::Semicolon)?;

        Ok(ElementDecl {
            name,
            type_ref,
            array,
            default,
            pos,
        })
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let (first, pos) = self.expect_ident()?;
        if self.peek().kind == TokenKind::ColonColon {
            self.advance();
            let (second, _) = self.expect_ident()?;
            return Ok(TypeRef::Custom(CustomTypeRef {
                namespace: Some(first),
                name: second,
                pos,
            }));
        }
        if let Some(prim) = PrimType::from_keyword(&first) {
            Ok(TypeRef::Primitive(prim))
        } else {
            Ok(TypeRef::Custom(CustomTypeRef {
                namespace: None,
                name: first,
                pos,
            }))
        }
    }

    fn parse_enum(&mut self) -> Result<EnumDecl, ParseError> {
        self.advance(); // 'enum'
        let (name, pos) = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;
        let mut variants = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let (vname, vpos) = self.expect_ident()?;
            let value = if self.peek().kind == TokenKind::Eq {
                self.advance();
                Some(self.parse_expr()?)
            } else {
                None
            };
            variants.push(EnumVariantDecl {
                name: vname,
                value,
                pos: vpos,
            });
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(EnumDecl { name, variants, pos })
    }

    fn parse_const(&mut self) -> Result<ConstDecl, ParseError> {
        self.advance(); // 'const'
        let (ty_word, ty_pos) = self.expect_ident()?;
        let ty = PrimType::from_keyword(&ty_word).ok_or_else(|| ParseError {
            message: format!("'{ty_word}' is not a valid constant type"),
            pos: ty_pos,
        })?;
        let (name, pos) = self.expect_ident()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(ConstDecl { ty, name, value, pos })
    }

    /// A default value is either the arithmetic sublanguage (for numeric
    /// fields), a string literal, a bool literal, or a `{ ... }` array
    /// literal (accepted by the grammar for array elements; the
    /// descriptor later normalizes these to an empty default).
    fn parse_default_value(&mut self) -> Result<Expr, ParseError> {
        if self.peek().kind == TokenKind::LBrace {
            self.advance();
            let mut items = Vec::new();
            while self.peek().kind != TokenKind::RBrace {
                items.push(self.parse_default_value()?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RBrace)?;
            return Ok(Expr::ArrayLit(items));
        }
        if let TokenKind::Str(s) = &self.peek().kind {
            let s = s.clone();
            self.advance();
            return Ok(Expr::Str(s));
        }
        if self.peek_is_ident("true") {
            self.advance();
            return Ok(Expr::Bool(true));
        }
        if self.peek_is_ident("false") {
            self.advance();
            return Ok(Expr::Bool(false));
        }
        self.parse_expr()
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek().kind {
                TokenKind::Plus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
                }
                TokenKind::Minus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_factor()?;
        loop {
            match self.peek().kind {
                TokenKind::Star => {
                    self.advance();
                    let rhs = self.parse_factor()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                TokenKind::Slash => {
                    self.advance();
                    let rhs = self.parse_factor()?;
                    lhs = Expr::Div(Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Minus => {
                self.advance();
                let inner = self.parse_factor()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            TokenKind::Ident(name) => {
                let pos = self.peek_pos();
                self.advance();
                Ok(Expr::Ident(name, pos))
            }
            other => Err(self.err(format!("expected an expression, found {other:?}"))),
        }
    }
}
