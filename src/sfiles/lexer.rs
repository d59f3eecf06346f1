//! Logos-based lexer for the SFILES notation.

use logos::Logos;
use text_size::TextSize;

/// A token with its kind, text, and byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: TextSize,
}

/// Lexer wrapping the logos-generated tokenizer.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, LogosToken>,
    offset: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: LogosToken::lexer(input),
            offset: 0,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let logos_token = self.inner.next()?;
        let text = self.inner.slice();
        let offset = TextSize::new(self.offset);
        self.offset += text.len() as u32;

        let kind = match logos_token {
            Ok(t) => t.into(),
            Err(()) => TokenKind::Error,
        };

        Some(Token { kind, text, offset })
    }
}

/// Tokenize an entire string, dropping whitespace.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input)
        .filter(|t| t.kind != TokenKind::Whitespace)
        .collect()
}

/// Logos token enum - maps to [`TokenKind`].
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
pub(crate) enum LogosToken {
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    #[token("->")]
    Arrow,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,
}

/// Public token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Ident,
    Arrow,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Error,
}

impl From<LogosToken> for TokenKind {
    fn from(token: LogosToken) -> Self {
        use LogosToken::*;
        match token {
            Whitespace => Self::Whitespace,
            Ident => Self::Ident,
            Arrow => Self::Arrow,
            LBracket => Self::LBracket,
            RBracket => Self::RBracket,
            LBrace => Self::LBrace,
            RBrace => Self::RBrace,
            LParen => Self::LParen,
            RParen => Self::RParen,
            Comma => Self::Comma,
            Semicolon => Self::Semicolon,
        }
    }
}

impl TokenKind {
    /// Human-readable token name for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Ident => "identifier",
            Self::Arrow => "`->`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::Comma => "`,`",
            Self::Semicolon => "`;`",
            Self::Error => "unrecognized input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_unit_chain() {
        let tokens = tokenize("tank[tank]->pump[pump]");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::LBracket,
                TokenKind::Ident,
                TokenKind::RBracket,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::LBracket,
                TokenKind::Ident,
                TokenKind::RBracket,
            ]
        );
        assert_eq!(tokens[4].text, "->");
    }

    #[test]
    fn offsets_track_source_positions() {
        let tokens = tokenize("a[x] -> b[y]");
        let arrow = tokens.iter().find(|t| t.kind == TokenKind::Arrow).unwrap();
        assert_eq!(u32::from(arrow.offset), 5);
    }

    #[test]
    fn rejects_stray_characters() {
        let tokens = tokenize("tank[tank]@pump");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Error));
    }
}
