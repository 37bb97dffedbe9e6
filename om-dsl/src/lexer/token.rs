//! Lexer token types

use om_core::{Diagnostic, PhysicalUnit, SourceLocation, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// TOKENS
// ============================================================================

/// Token kinds for Om source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Keywords
    Const,
    Let,
    Pattern,
    Field,
    Type,
    Fn,
    Async,
    Try,
    Catch,
    Return,
    Wave,
    True,
    False,

    // Operators
    Pipe,
    Range,
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    Arrow,
    At,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LAngle,
    RAngle,
    Colon,
    Semicolon,
    Comma,
    Dot,

    // Literals
    Number(f64),
    String(String),
    Identifier(String),

    // Special
    Eof,
}

impl TokenKind {
    /// Keyword lookup for a scanned word.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "const" => TokenKind::Const,
            "let" => TokenKind::Let,
            "pattern" => TokenKind::Pattern,
            "field" => TokenKind::Field,
            "type" => TokenKind::Type,
            "fn" => TokenKind::Fn,
            "async" => TokenKind::Async,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "return" => TokenKind::Return,
            "wave" => TokenKind::Wave,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }

    /// Tokens that begin a declaration. Doc comments attach only to these,
    /// and parser recovery stops in front of them.
    pub fn starts_declaration(&self) -> bool {
        matches!(
            self,
            TokenKind::Const
                | TokenKind::Let
                | TokenKind::Pattern
                | TokenKind::Field
                | TokenKind::Type
                | TokenKind::Fn
                | TokenKind::Async
                | TokenKind::Try
                | TokenKind::At
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Const => "const",
            TokenKind::Let => "let",
            TokenKind::Pattern => "pattern",
            TokenKind::Field => "field",
            TokenKind::Type => "type",
            TokenKind::Fn => "fn",
            TokenKind::Async => "async",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::Return => "return",
            TokenKind::Wave => "wave",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Pipe => "|",
            TokenKind::Range => "..",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Assign => "=",
            TokenKind::Arrow => "->",
            TokenKind::At => "@",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LAngle => "<",
            TokenKind::RAngle => ">",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Number(_) => "number",
            TokenKind::String(_) => "string",
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Eof => "end of input",
        };
        write!(f, "{}", text)
    }
}

/// A token with its kind, exact source text and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source slice, including any unit suffix or wave marker.
    pub text: String,
    pub location: SourceLocation,
    /// Unit attached to a number literal.
    pub unit: Option<PhysicalUnit>,
    /// Identifier was written with the `~` wave marker.
    pub wave_marker: bool,
    /// Doc comment (`/** ... */`) immediately preceding a declaration.
    pub doc: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            text: text.into(),
            location,
            unit: None,
            wave_marker: false,
            doc: None,
        }
    }
}

/// Output of a full lexing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream {
    /// Always ends with an `Eof` token.
    pub tokens: Vec<Token>,
    pub warnings: Vec<LexWarning>,
}

// ============================================================================
// LEX ERRORS
// ============================================================================

/// Fatal lexing errors. Lexing stops at the first one.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LexError {
    #[error("unknown unit suffix `{suffix}` at {location}")]
    UnknownUnit {
        suffix: String,
        location: SourceLocation,
    },

    #[error("unterminated comment starting at {location}")]
    UnterminatedComment { location: SourceLocation },

    #[error("invalid character `{character}` at {location}")]
    InvalidCharacter {
        character: char,
        location: SourceLocation,
    },

    #[error("unterminated string starting at {location}")]
    UnterminatedString { location: SourceLocation },

    #[error("number `{text}` is too large at {location}")]
    NumberOutOfRange {
        text: String,
        location: SourceLocation,
    },
}

impl LexError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            LexError::UnknownUnit { .. } => "UnknownUnit",
            LexError::UnterminatedComment { .. } => "UnterminatedComment",
            LexError::InvalidCharacter { .. } => "InvalidCharacter",
            LexError::UnterminatedString { .. } => "UnterminatedString",
            LexError::NumberOutOfRange { .. } => "NumberOutOfRange",
        }
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            LexError::UnknownUnit { location, .. }
            | LexError::UnterminatedComment { location }
            | LexError::InvalidCharacter { location, .. }
            | LexError::UnterminatedString { location }
            | LexError::NumberOutOfRange { location, .. } => *location,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic =
            Diagnostic::error(Stage::Lexer, self.kind_name(), self.to_string(), self.location());
        match self {
            LexError::UnknownUnit { suffix, .. } => {
                diagnostic.with_suggestions(unit_suggestions(suffix))
            }
            _ => diagnostic,
        }
    }
}

/// Canonical symbols that differ from `suffix` only by case, or every
/// canonical symbol when nothing is close.
fn unit_suggestions(suffix: &str) -> Vec<String> {
    const ALL: [&str; 11] = [
        "Hz", "kHz", "MHz", "GHz", "deg", "rad", "ms", "s", "min", "mW", "W",
    ];
    let close: Vec<String> = ALL
        .iter()
        .filter(|s| s.eq_ignore_ascii_case(suffix))
        .map(|s| s.to_string())
        .collect();
    if close.is_empty() {
        ALL.iter().map(|s| s.to_string()).collect()
    } else {
        close
    }
}

/// Non-fatal lexer findings.
#[derive(Debug, Clone, PartialEq)]
pub enum LexWarning {
    DeprecatedUnit {
        spelling: String,
        canonical: PhysicalUnit,
        location: SourceLocation,
    },
}

impl LexWarning {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LexWarning::DeprecatedUnit {
                spelling,
                canonical,
                location,
            } => Diagnostic::warning(
                Stage::Lexer,
                "DeprecatedUnit",
                format!(
                    "unit spelling `{}` is deprecated, write `{}`",
                    spelling,
                    canonical.symbol()
                ),
                *location,
            )
            .with_suggestions(vec![canonical.symbol().to_string()]),
        }
    }
}
