//! Om DSL - Unit-Aware Compiler Front-End
//!
//! This crate turns Om source text into a validated AST. Every numeric
//! literal carries a physical unit, and units are checked all the way
//! through wave construction and pipe chains.
//!
//! Architecture:
//! ```text
//! Om Source (.om text)
//!     ↓
//! Lexer (tokens + unit suffixes, deprecated-spelling warnings)
//!     ↓
//! Parser (recovering recursive descent → Program)
//!     ↓
//! Type Checker (unit categories, inference, constant folding)
//!     ↓
//! Validator (structure, scopes, @context rule-sets)
//!     ↓
//! ValidatedAst (ready for code generation)
//!     ↓
//! Pretty Printer (for round-trip testing)
//! ```
//!
//! ```
//! use om_core::RuleSetConfig;
//!
//! let ast = om_dsl::compile_unit("const w~ = wave(440Hz) | phase(90deg);", &RuleSetConfig::new())
//!     .expect("compiles");
//! assert_eq!(ast.program.statements.len(), 1);
//! ```

pub mod checker;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod pretty_printer;
pub mod types;
pub mod validator;

// Re-export key types for convenience
pub use checker::{check, CheckOutput, TypeChecker, TypeEnvironment, TypeError};
pub use compiler::{compile_unit, compile_units, sha256_hex, CompileOutcome, FrontEnd, ValidatedAst};
pub use lexer::{LexError, LexWarning, Lexer, Token, TokenKind, TokenStream};
pub use parser::ast::*;
pub use parser::{parse, parse_source};
pub use pretty_printer::{pretty_print, round_trip};
pub use types::*;
pub use validator::{validate, SemanticError, ValidateOutput, Validator};
