//! Abstract Syntax Tree types

use crate::lexer::{Token, TokenKind};
use crate::types::{Relationship, Ty, Value};
use om_core::{CancellationToken, Diagnostic, PhysicalUnit, SourceLocation, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// AST TYPES
// ============================================================================

/// The root AST node for one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A statement with the metadata that precedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub location: SourceLocation,
}

impl Statement {
    /// Argument of the `@context("...")` annotation, if present.
    pub fn context(&self) -> Option<&str> {
        self.annotations
            .iter()
            .find(|a| a.name == "context")
            .and_then(|a| a.argument.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    /// `const` / `let` binding.
    Wave(WaveDeclaration),
    Pattern(PatternDeclaration),
    Field(FieldDeclaration),
    Type(TypeDeclaration),
    Function(FunctionDeclaration),
    Expression(Expr),
    Try(TryStatement),
    Return(Option<Expr>),
}

/// `@name` or `@name("argument")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    pub argument: Option<String>,
    pub location: SourceLocation,
}

/// A declared or referenced name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub wave_marker: bool,
    pub location: SourceLocation,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wave_marker {
            write!(f, "{}~", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutability {
    Const,
    Let,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveDeclaration {
    pub mutability: Mutability,
    pub name: Ident,
    pub annotation: Option<TypeExpr>,
    pub value: Option<Expr>,
    /// Declared or inferred type of the binding.
    #[serde(default)]
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDeclaration {
    pub name: Ident,
    pub relationship: Relationship,
    /// `matrix(rows, cols)` arrangement.
    pub arrangement: Option<Arrangement>,
    pub members: Vec<Expr>,
    #[serde(default)]
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub rows: f64,
    pub cols: f64,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub name: Ident,
    /// Declared rank, `field f(2) { ... }`.
    pub rank: Option<f64>,
    pub dimensions: Option<Expr>,
    pub waves: Option<Expr>,
    pub boundary: Option<Ident>,
    pub interference: Option<Ident>,
    #[serde(default)]
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub name: Ident,
    pub target: TypeExpr,
}

/// A type as written in source, e.g. `Vector<3>` or `Wave~`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeExpr {
    pub name: String,
    pub wave_marker: bool,
    pub args: Vec<TypeArg>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeArg {
    Number(f64),
    Type(TypeExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: Ident,
    pub is_async: bool,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    #[serde(default)]
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: Ident,
    pub annotation: Option<TypeExpr>,
    #[serde(default)]
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStatement {
    pub body: Block,
    pub binding: Option<Ident>,
    pub handler: Block,
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// An expression node. `ty` starts as `Dynamic` and `value` as `None`;
/// the type checker fills both in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: SourceLocation,
    #[serde(default)]
    pub ty: Ty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Expr {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location,
            ty: Ty::Dynamic,
            value: None,
        }
    }

    /// Direct sub-expressions, in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Number { .. }
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Identifier { .. } => Vec::new(),
            ExprKind::Wave(wave) => std::iter::once(wave.frequency.as_ref())
                .chain(wave.phase.as_deref())
                .chain(wave.amplitude.as_deref())
                .collect(),
            ExprKind::Pipe(pipe) => std::iter::once(pipe.input.as_ref())
                .chain(pipe.args.iter())
                .collect(),
            ExprKind::Vector(elements) | ExprKind::Pattern(elements) => elements.iter().collect(),
            ExprKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExprKind::Range { start, end } => vec![start.as_ref(), end.as_ref()],
            ExprKind::Neg(operand) => vec![operand.as_ref()],
            ExprKind::Call { callee, args } => std::iter::once(callee.as_ref())
                .chain(args.iter())
                .collect(),
            ExprKind::Member { object, .. } => vec![object.as_ref()],
            ExprKind::Assign { value, .. } => vec![value.as_ref()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Number {
        value: f64,
        unit: Option<PhysicalUnit>,
    },
    Str(String),
    Bool(bool),
    Identifier {
        name: String,
        wave_marker: bool,
    },
    Wave(WaveExpression),
    Pipe(PipeExpression),
    Vector(Vec<Expr>),
    Pattern(Vec<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    Neg(Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        member: String,
    },
    Assign {
        target: Ident,
        value: Box<Expr>,
    },
}

/// `wave(frequency, phase, amplitude)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveExpression {
    pub frequency: Box<Expr>,
    pub phase: Option<Box<Expr>>,
    pub amplitude: Option<Box<Expr>>,
}

/// `input | stage(args)`. The stage receives `input` as its first argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeExpression {
    pub input: Box<Expr>,
    pub stage: Ident,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

// ============================================================================
// PARSE ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseErrorKind {
    UnexpectedToken,
    AmbiguousBracket,
    UnterminatedBlock,
}

impl ParseErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ParseErrorKind::UnexpectedToken => "UnexpectedToken",
            ParseErrorKind::AmbiguousBracket => "AmbiguousBracket",
            ParseErrorKind::UnterminatedBlock => "UnterminatedBlock",
        }
    }
}

/// Parse error with source location.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("Parse error at {location}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(Stage::Parser, self.kind.name(), &self.message, self.location)
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Everything one parser run produced. `errors` holds one entry per
/// malformed statement; `program` holds every statement that parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub program: Program,
    pub errors: Vec<ParseError>,
    pub cancelled: bool,
}

/// Recursive-descent parser for Om.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) errors: Vec<ParseError>,
    /// Nesting of `{}` blocks; recovery never skips a closing brace inside one.
    pub(crate) depth: usize,
    pub(crate) fn_depth: usize,
    cancel: Option<CancellationToken>,
}

impl Parser {
    /// Create a new parser from a vector of tokens.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let location = tokens.last().map(|t| t.location).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", location));
        }
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            depth: 0,
            fn_depth: 0,
            cancel: None,
        }
    }

    /// Stop before the next top-level statement once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Parse every statement, recovering from syntax errors.
    pub fn parse(mut self) -> ParseOutput {
        let mut statements = Vec::new();
        let mut cancelled = false;

        while !self.is_at_end() {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                tracing::info!(parsed = statements.len(), "Parse cancelled");
                cancelled = true;
                break;
            }

            let start = self.pos;
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize(start);
                }
            }
        }

        tracing::debug!(
            statements = statements.len(),
            errors = self.errors.len(),
            "Parsed program"
        );

        ParseOutput {
            program: Program { statements },
            errors: self.errors,
            cancelled,
        }
    }

    /// Parse a single statement, including leading annotations.
    pub(crate) fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let location = self.current().location;
        let doc = self.current().doc.clone();
        let annotations = self.parse_annotations()?;

        let kind = match &self.current().kind {
            TokenKind::Const | TokenKind::Let => StatementKind::Wave(self.parse_binding()?),
            TokenKind::Pattern => StatementKind::Pattern(self.parse_pattern()?),
            TokenKind::Field => StatementKind::Field(self.parse_field()?),
            TokenKind::Type => StatementKind::Type(self.parse_type_declaration()?),
            TokenKind::Fn | TokenKind::Async => StatementKind::Function(self.parse_function()?),
            TokenKind::Try => StatementKind::Try(self.parse_try()?),
            TokenKind::Return => self.parse_return()?,
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Expression(expr)
            }
        };

        Ok(Statement {
            kind,
            annotations,
            doc,
            location,
        })
    }

    /// Skip the rest of a malformed statement.
    ///
    /// Stops just past a `;`, or in front of a declaration keyword, `@`,
    /// `return`, or the `}` closing the enclosing block. Always consumes at
    /// least one token when the failed statement consumed none.
    pub(crate) fn synchronize(&mut self, start: usize) {
        let closes_block = self.depth > 0 && self.check(&TokenKind::RBrace);
        if self.pos == start && !self.is_at_end() && !closes_block {
            self.advance();
        }

        let mut skipped = 0usize;
        while !self.is_at_end() {
            match &self.current().kind {
                TokenKind::Semicolon => {
                    self.advance();
                    skipped += 1;
                    break;
                }
                TokenKind::RBrace if self.depth > 0 => break,
                kind if kind.starts_declaration() || *kind == TokenKind::Return => break,
                _ => {
                    self.advance();
                    skipped += 1;
                }
            }
        }

        tracing::warn!(
            skipped,
            location = %self.current().location,
            "Recovered from syntax error"
        );
    }
}
