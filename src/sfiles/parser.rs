//! Recursive-descent parser: token stream → [`LinearModel`].
//!
//! The parser is strict: malformed input fails with a [`ParseError`] naming
//! the offending token index and reason. Kind names are not resolved here;
//! the conversion engine checks them against the registry.

use smol_str::SmolStr;
use thiserror::Error;

use super::lexer::{Token, TokenKind, tokenize};
use crate::model::{LinearModel, ModelMetadata};

/// A malformed token stream.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("parse error at token {token_index} (offset {offset}): {reason}")]
pub struct ParseError {
    /// Index into the significant (non-whitespace) token stream.
    pub token_index: usize,
    /// Byte offset into the source.
    pub offset: u32,
    pub reason: String,
}

/// Parse an SFILES string into a linear model.
pub fn parse(input: &str) -> Result<LinearModel, ParseError> {
    let tokens = tokenize(input);
    let mut parser = Parser {
        tokens,
        pos: 0,
        end_offset: input.len() as u32,
        model: LinearModel::new(ModelMetadata::default()),
    };
    parser.parse_document()?;
    Ok(parser.model)
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    end_offset: u32,
    model: LinearModel,
}

impl<'a> Parser<'a> {
    // ── Token plumbing ──────────────────────────────────────────────

    fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<&Token<'a>> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            token_index: self.pos,
            offset: self
                .tokens
                .get(self.pos)
                .map(|t| u32::from(t.offset))
                .unwrap_or(self.end_offset),
            reason: reason.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token<'a>, ParseError> {
        match self.peek() {
            Some(found) if found == kind => Ok(self.bump().expect("peeked")),
            Some(found) => Err(self.error(format!(
                "expected {}, found {}",
                kind.describe(),
                found.describe()
            ))),
            None => Err(self.error(format!("expected {}, found end of input", kind.describe()))),
        }
    }

    fn expect_ident(&mut self) -> Result<SmolStr, ParseError> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(SmolStr::new(token.text))
    }

    // ── Grammar ─────────────────────────────────────────────────────

    fn parse_document(&mut self) -> Result<(), ParseError> {
        if self.peek().is_none() {
            return Ok(());
        }
        loop {
            self.parse_chain()?;
            match self.peek() {
                Some(TokenKind::Semicolon) => {
                    self.bump();
                    if self.peek().is_none() {
                        break;
                    }
                }
                Some(other) => {
                    return Err(self.error(format!("unexpected {}", other.describe())));
                }
                None => break,
            }
        }
        Ok(())
    }

    fn parse_chain(&mut self) -> Result<(), ParseError> {
        let head = self.parse_node()?;
        self.parse_continuations(head)
    }

    /// Arrows, branches, and controls following a unit.
    fn parse_continuations(&mut self, mut current: SmolStr) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(TokenKind::Arrow) => {
                    current = self.parse_edge(&current)?;
                }
                Some(TokenKind::LParen) => {
                    self.bump();
                    self.parse_branch(&current)?;
                }
                Some(TokenKind::LBrace) => {
                    self.parse_control(&current)?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Inside `(...)`: a connector-started sub-chain off `from`.
    fn parse_branch(&mut self, from: &SmolStr) -> Result<(), ParseError> {
        if self.peek() != Some(TokenKind::Arrow) {
            return Err(self.error("branch must start with `->`"));
        }
        let mut current = self.parse_edge(from)?;
        loop {
            match self.peek() {
                Some(TokenKind::Arrow) => {
                    current = self.parse_edge(&current)?;
                }
                Some(TokenKind::LParen) => {
                    self.bump();
                    self.parse_branch(&current)?;
                }
                Some(TokenKind::LBrace) => {
                    self.parse_control(&current)?;
                }
                Some(TokenKind::RParen) => {
                    self.bump();
                    return Ok(());
                }
                Some(other) => {
                    return Err(self.error(format!("unexpected {} in branch", other.describe())));
                }
                None => return Err(self.error("unterminated branch, expected `)`")),
            }
        }
    }

    /// `-> {tags}? node` — records a stream from `from` to the node.
    fn parse_edge(&mut self, from: &SmolStr) -> Result<SmolStr, ParseError> {
        self.expect(TokenKind::Arrow)?;

        let mut tags = Vec::new();
        if self.peek() == Some(TokenKind::LBrace) {
            self.bump();
            loop {
                tags.push(self.expect_ident()?);
                match self.peek() {
                    Some(TokenKind::Comma) => {
                        self.bump();
                    }
                    Some(TokenKind::RBrace) => {
                        self.bump();
                        break;
                    }
                    _ => return Err(self.error("expected `,` or `}` in stream tags")),
                }
            }
        }

        let to = self.parse_node()?;
        self.model
            .add_stream(from, &to)
            .map_err(|e| self.error(e.to_string()))?;
        if let Some(stream) = self.model.streams.last_mut() {
            stream.tags = tags;
        }
        Ok(to)
    }

    /// `name[kind]` declares a unit; a bare `name` references one.
    fn parse_node(&mut self) -> Result<SmolStr, ParseError> {
        let name = self.expect_ident()?;
        if self.peek() == Some(TokenKind::LBracket) {
            self.bump();
            let kind = self.expect_ident()?;
            self.expect(TokenKind::RBracket)?;
            self.model
                .add_unit(&name, &kind)
                .map_err(|_| self.error(format!("unit `{name}` declared twice")))?;
        } else if !self.model.units.contains_key(&name) {
            return Err(self.error(format!("reference to undeclared unit `{name}`")));
        }
        Ok(name)
    }

    /// `{TC}` after a unit.
    fn parse_control(&mut self, unit: &SmolStr) -> Result<(), ParseError> {
        self.expect(TokenKind::LBrace)?;
        let kind = self.expect_ident()?;
        self.expect(TokenKind::RBrace)?;
        self.model
            .add_control(unit, &kind)
            .map_err(|e| self.error(e.to_string()))?;
        Ok(())
    }
}
