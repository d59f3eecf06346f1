//! The SFILES linear notation.
//!
//! Tokens of the form `name[kind]` declare units in flow order; `->`
//! connectors encode streams (optionally tagged `->{hot}`); `{TC}` after a
//! unit's closing bracket attaches a control; parenthesised groups encode
//! branches; a bare unit name is a back-reference closing a cycle or
//! convergence; `;` separates disconnected chains.
//!
//! ```text
//! tank[tank]->pump[pump]->splitter[separator](->heater[heater])(->cooler[cooler]->mixer[mixer]);...
//! ```
//!
//! The canonical form is a function of topology alone: [`canonical`]
//! re-emits any parsed model deterministically, and reparsing a canonical
//! string yields an isomorphic model.

mod canon;
mod lexer;
mod parser;

pub use canon::canonical;
pub use lexer::{Lexer, Token, TokenKind, tokenize};
pub use parser::{ParseError, parse};
