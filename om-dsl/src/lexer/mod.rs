//! Lexer module for Om source

pub mod scanner;
pub mod token;

pub use scanner::*;
pub use token::*;
