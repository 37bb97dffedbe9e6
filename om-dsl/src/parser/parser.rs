//! Parser implementation

use super::ast::*;
use crate::lexer::*;
use crate::types::Relationship;
use om_core::Diagnostic;

impl Parser {
    // ========================================================================
    // Declarations
    // ========================================================================

    /// Parse `@name("argument")` annotations.
    pub(crate) fn parse_annotations(&mut self) -> Result<Vec<Annotation>, ParseError> {
        let mut annotations = Vec::new();
        while self.check(&TokenKind::At) {
            let location = self.current().location;
            self.advance();
            let name = self.expect_identifier()?;
            let argument = if self.check(&TokenKind::LParen) {
                self.advance();
                let argument = self.expect_string()?;
                self.expect(TokenKind::RParen)?;
                Some(argument)
            } else {
                None
            };
            annotations.push(Annotation {
                name,
                argument,
                location,
            });
        }
        Ok(annotations)
    }

    /// Parse a `const` / `let` binding.
    pub(crate) fn parse_binding(&mut self) -> Result<WaveDeclaration, ParseError> {
        let mutability = if self.check(&TokenKind::Const) {
            Mutability::Const
        } else {
            Mutability::Let
        };
        self.advance();

        let name = self.expect_ident()?;
        let annotation = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        let value = if self.check(&TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;

        Ok(WaveDeclaration {
            mutability,
            name,
            annotation,
            value,
            ty: Default::default(),
        })
    }

    /// Parse `pattern name: relationship = [ ... ];`.
    pub(crate) fn parse_pattern(&mut self) -> Result<PatternDeclaration, ParseError> {
        self.expect(TokenKind::Pattern)?;
        let name = self.expect_ident()?;

        let (relationship, arrangement) = if self.check(&TokenKind::Colon) {
            self.advance();
            self.parse_relationship()?
        } else {
            (Relationship::default(), None)
        };

        self.expect(TokenKind::Assign)?;
        self.expect(TokenKind::LBracket)?;
        let members = self.parse_expr_list(TokenKind::RBracket)?;
        self.expect(TokenKind::Semicolon)?;

        Ok(PatternDeclaration {
            name,
            relationship,
            arrangement,
            members,
            ty: Default::default(),
        })
    }

    fn parse_relationship(&mut self) -> Result<(Relationship, Option<Arrangement>), ParseError> {
        let location = self.current().location;
        let name = self.expect_identifier()?;
        let relationship = Relationship::from_name(&name).ok_or_else(|| {
            self.error_at(
                ParseErrorKind::UnexpectedToken,
                &format!(
                    "Unknown relationship `{}` (expected sequence, parallel or matrix)",
                    name
                ),
                location,
            )
        })?;

        if !self.check(&TokenKind::LParen) {
            return Ok((relationship, None));
        }
        if relationship != Relationship::Matrix {
            return Err(self.error("Only `matrix` takes an arrangement"));
        }

        let location = self.current().location;
        self.advance();
        let rows = self.expect_number()?;
        self.expect(TokenKind::Comma)?;
        let cols = self.expect_number()?;
        self.expect(TokenKind::RParen)?;

        Ok((
            relationship,
            Some(Arrangement {
                rows,
                cols,
                location,
            }),
        ))
    }

    /// Parse `field name(rank) { dimensions: ..., waves: ..., ... }`.
    pub(crate) fn parse_field(&mut self) -> Result<FieldDeclaration, ParseError> {
        self.expect(TokenKind::Field)?;
        let name = self.expect_ident()?;

        let rank = if self.check(&TokenKind::LParen) {
            self.advance();
            let rank = self.expect_number()?;
            self.expect(TokenKind::RParen)?;
            Some(rank)
        } else {
            None
        };

        let mut field = FieldDeclaration {
            name,
            rank,
            dimensions: None,
            waves: None,
            boundary: None,
            interference: None,
            ty: Default::default(),
        };

        let open = self.current().location;
        self.expect(TokenKind::LBrace)?;

        while !self.check(&TokenKind::RBrace) {
            if self.is_at_end() {
                return Err(self.error_at(
                    ParseErrorKind::UnterminatedBlock,
                    "Field body is never closed",
                    open,
                ));
            }

            let location = self.current().location;
            let key = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;

            let duplicate = match key.as_str() {
                "dimensions" => field
                    .dimensions
                    .replace(self.parse_expression()?)
                    .is_some(),
                "waves" => field.waves.replace(self.parse_expression()?).is_some(),
                "boundary" => field.boundary.replace(self.expect_ident()?).is_some(),
                "interference" => field
                    .interference
                    .replace(self.expect_ident()?)
                    .is_some(),
                _ => {
                    return Err(self.error_at(
                        ParseErrorKind::UnexpectedToken,
                        &format!(
                            "Unknown field key `{}` (expected dimensions, waves, boundary, interference)",
                            key
                        ),
                        location,
                    ))
                }
            };
            if duplicate {
                return Err(self.error_at(
                    ParseErrorKind::UnexpectedToken,
                    &format!("Field key `{}` given twice", key),
                    location,
                ));
            }

            self.optional_comma();
        }
        self.expect(TokenKind::RBrace)?;
        self.optional_semicolon();

        Ok(field)
    }

    /// Parse `type Name = Type;`.
    pub(crate) fn parse_type_declaration(&mut self) -> Result<TypeDeclaration, ParseError> {
        self.expect(TokenKind::Type)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Assign)?;
        let target = self.parse_type()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(TypeDeclaration { name, target })
    }

    /// Parse a type expression. In type position `<` always opens generic
    /// arguments.
    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let ident = self.expect_ident()?;
        let mut args = Vec::new();

        if self.check(&TokenKind::LAngle) {
            self.advance();
            loop {
                if let TokenKind::Number(n) = self.current().kind {
                    self.advance();
                    args.push(TypeArg::Number(n));
                } else {
                    args.push(TypeArg::Type(self.parse_type()?));
                }
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RAngle)?;
        }

        Ok(TypeExpr {
            name: ident.name,
            wave_marker: ident.wave_marker,
            args,
            location: ident.location,
        })
    }

    /// Parse `async? fn name(params) -> Type { ... }`.
    pub(crate) fn parse_function(&mut self) -> Result<FunctionDeclaration, ParseError> {
        let is_async = self.check(&TokenKind::Async);
        if is_async {
            self.advance();
        }
        self.expect(TokenKind::Fn)?;
        let name = self.expect_ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let name = self.expect_ident()?;
            let annotation = if self.check(&TokenKind::Colon) {
                self.advance();
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(Param {
                name,
                annotation,
                ty: Default::default(),
            });
            if !self.check(&TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if self.check(&TokenKind::Arrow) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        self.fn_depth += 1;
        let body = self.parse_block();
        self.fn_depth -= 1;

        Ok(FunctionDeclaration {
            name,
            is_async,
            params,
            return_type,
            body: body?,
            ty: Default::default(),
        })
    }

    /// Parse `try { ... } catch e { ... }`.
    pub(crate) fn parse_try(&mut self) -> Result<TryStatement, ParseError> {
        self.expect(TokenKind::Try)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::Catch)?;
        let binding = if matches!(self.current().kind, TokenKind::Identifier(_)) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        let handler = self.parse_block()?;
        Ok(TryStatement {
            body,
            binding,
            handler,
        })
    }

    pub(crate) fn parse_return(&mut self) -> Result<StatementKind, ParseError> {
        if self.fn_depth == 0 {
            return Err(self.error("`return` outside of a function"));
        }
        self.expect(TokenKind::Return)?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(StatementKind::Return(value))
    }

    /// Parse a `{ ... }` block. Malformed statements inside are recorded
    /// and skipped; only a block left open at end of input fails.
    pub(crate) fn parse_block(&mut self) -> Result<Block, ParseError> {
        let location = self.current().location;
        self.expect(TokenKind::LBrace)?;
        self.depth += 1;

        let mut statements = Vec::new();
        let closed = loop {
            if self.check(&TokenKind::RBrace) {
                self.advance();
                break true;
            }
            if self.is_at_end() {
                break false;
            }
            let start = self.pos;
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize(start);
                }
            }
        };

        self.depth -= 1;
        if !closed {
            return Err(self.error_at(
                ParseErrorKind::UnterminatedBlock,
                "Block is never closed",
                location,
            ));
        }

        Ok(Block {
            statements,
            location,
        })
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    /// Assignment binds loosest and is right-associative.
    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_pipe()?;
        if !self.check(&TokenKind::Assign) {
            return Ok(expr);
        }

        let location = expr.location;
        match expr.kind {
            ExprKind::Identifier { name, wave_marker } => {
                self.advance();
                let value = self.parse_assignment()?;
                Ok(Expr::new(
                    ExprKind::Assign {
                        target: Ident {
                            name,
                            wave_marker,
                            location,
                        },
                        value: Box::new(value),
                    },
                    location,
                ))
            }
            _ => Err(self.error("Invalid assignment target")),
        }
    }

    /// Left-associative pipe chain: each stage is applied to the
    /// accumulated left-hand expression.
    fn parse_pipe(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_range()?;

        while self.check(&TokenKind::Pipe) {
            self.advance();
            let stage = self.expect_ident()?;
            let args = if self.check(&TokenKind::LParen) {
                self.advance();
                self.parse_expr_list(TokenKind::RParen)?
            } else {
                Vec::new()
            };
            let location = expr.location;
            expr = Expr::new(
                ExprKind::Pipe(PipeExpression {
                    input: Box::new(expr),
                    stage,
                    args,
                }),
                location,
            );
        }

        Ok(expr)
    }

    fn parse_range(&mut self) -> Result<Expr, ParseError> {
        let start = self.parse_additive()?;
        if !self.check(&TokenKind::Range) {
            return Ok(start);
        }
        self.advance();
        let end = self.parse_additive()?;
        let location = start.location;
        Ok(Expr::new(
            ExprKind::Range {
                start: Box::new(start),
                end: Box::new(end),
            },
            location,
        ))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.check(&TokenKind::Minus) {
            let location = self.current().location;
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Neg(Box::new(operand)), location));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let location = expr.location;
            match self.current().kind {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_expr_list(TokenKind::RParen)?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        location,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_identifier()?;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            member,
                        },
                        location,
                    );
                }
                TokenKind::LAngle => {
                    return Err(self.error_at(
                        ParseErrorKind::AmbiguousBracket,
                        "`<` after an expression is neither a vector literal nor a comparison; generic arguments belong in type annotations",
                        self.current().location,
                    ));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        let kind = match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                ExprKind::Number {
                    value,
                    unit: token.unit,
                }
            }
            TokenKind::String(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                ExprKind::Identifier {
                    name,
                    wave_marker: token.wave_marker,
                }
            }
            TokenKind::Wave => ExprKind::Wave(self.parse_wave()?),
            TokenKind::LBracket => {
                self.advance();
                ExprKind::Pattern(self.parse_expr_list(TokenKind::RBracket)?)
            }
            TokenKind::LAngle => ExprKind::Vector(self.parse_vector()?),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.error(&format!("Expected expression, found {}", self.found()))),
        };
        Ok(Expr::new(kind, token.location))
    }

    /// Parse `wave(...)` with positional `(frequency, phase, amplitude)` or
    /// named `frequency:` / `phase:` / `amplitude:` arguments.
    fn parse_wave(&mut self) -> Result<WaveExpression, ParseError> {
        let location = self.current().location;
        self.expect(TokenKind::Wave)?;
        self.expect(TokenKind::LParen)?;

        let mut slots: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut positional = 0usize;

        while !self.check(&TokenKind::RParen) {
            let arg_location = self.current().location;
            let named = match (&self.current().kind, self.peek()) {
                (TokenKind::Identifier(name), TokenKind::Colon) => Some(name.clone()),
                _ => None,
            };

            let index = match named {
                Some(name) => {
                    self.advance();
                    self.advance();
                    match name.as_str() {
                        "frequency" => 0,
                        "phase" => 1,
                        "amplitude" => 2,
                        _ => {
                            return Err(self.error_at(
                                ParseErrorKind::UnexpectedToken,
                                &format!(
                                    "Unknown wave argument `{}` (expected frequency, phase, amplitude)",
                                    name
                                ),
                                arg_location,
                            ))
                        }
                    }
                }
                None => {
                    positional += 1;
                    positional - 1
                }
            };

            if index >= slots.len() {
                return Err(self.error_at(
                    ParseErrorKind::UnexpectedToken,
                    "wave() takes at most three arguments",
                    arg_location,
                ));
            }
            let value = self.parse_expression()?;
            if slots[index].replace(Box::new(value)).is_some() {
                return Err(self.error_at(
                    ParseErrorKind::UnexpectedToken,
                    "wave() argument given twice",
                    arg_location,
                ));
            }

            if !self.check(&TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;

        let [frequency, phase, amplitude] = slots;
        let frequency = frequency.ok_or_else(|| {
            self.error_at(
                ParseErrorKind::UnexpectedToken,
                "wave() requires a frequency",
                location,
            )
        })?;

        Ok(WaveExpression {
            frequency,
            phase,
            amplitude,
        })
    }

    /// Parse `<a, b, c>`. One token of lookahead decides whether `<` opens a
    /// vector; elements must be numbers or identifiers.
    fn parse_vector(&mut self) -> Result<Vec<Expr>, ParseError> {
        let location = self.current().location;
        self.expect(TokenKind::LAngle)?;

        if !matches!(
            self.current().kind,
            TokenKind::Number(_) | TokenKind::Identifier(_) | TokenKind::Minus
        ) {
            return Err(self.error_at(
                ParseErrorKind::AmbiguousBracket,
                "Cannot tell whether `<` opens a vector literal or generic arguments; vector elements must be numbers or identifiers",
                location,
            ));
        }

        let mut elements = Vec::new();
        loop {
            elements.push(self.parse_vector_element()?);
            match self.current().kind {
                TokenKind::Comma => self.advance(),
                TokenKind::RAngle => {
                    self.advance();
                    break;
                }
                _ => {
                    return Err(self.error_at(
                        ParseErrorKind::AmbiguousBracket,
                        &format!(
                            "Expected `,` or `>` in vector literal, found {}",
                            self.found()
                        ),
                        self.current().location,
                    ))
                }
            }
        }
        Ok(elements)
    }

    fn parse_vector_element(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Number {
                        value,
                        unit: token.unit,
                    },
                    token.location,
                ))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Identifier {
                        name,
                        wave_marker: token.wave_marker,
                    },
                    token.location,
                ))
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_vector_element()?;
                Ok(Expr::new(ExprKind::Neg(Box::new(operand)), token.location))
            }
            _ => Err(self.error_at(
                ParseErrorKind::AmbiguousBracket,
                &format!(
                    "Vector elements must be numbers or identifiers, found {}",
                    self.found()
                ),
                token.location,
            )),
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_expr_list(&mut self, close: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.parse_expression()?);
            if !self.check(&close) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    pub(crate) fn peek(&self) -> &TokenKind {
        let index = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    pub(crate) fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected `{}`, found {}", kind, self.found())))
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let token = self.current();
        match &token.kind {
            TokenKind::Identifier(name) => {
                let ident = Ident {
                    name: name.clone(),
                    wave_marker: token.wave_marker,
                    location: token.location,
                };
                self.advance();
                Ok(ident)
            }
            _ => Err(self.error(&format!("Expected identifier, found {}", self.found()))),
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        self.expect_ident().map(|ident| ident.name)
    }

    pub(crate) fn expect_string(&mut self) -> Result<String, ParseError> {
        match &self.current().kind {
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error(&format!("Expected string, found {}", self.found()))),
        }
    }

    pub(crate) fn expect_number(&mut self) -> Result<f64, ParseError> {
        match self.current().kind {
            TokenKind::Number(n) if self.current().unit.is_none() => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.error(&format!(
                "Expected unitless number, found {}",
                self.found()
            ))),
        }
    }

    pub(crate) fn optional_comma(&mut self) {
        if self.check(&TokenKind::Comma) {
            self.advance();
        }
    }

    pub(crate) fn optional_semicolon(&mut self) {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Description of the current token for error messages.
    pub(crate) fn found(&self) -> String {
        match &self.current().kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("`{}`", self.current().text),
        }
    }

    pub(crate) fn error(&self, msg: &str) -> ParseError {
        self.error_at(ParseErrorKind::UnexpectedToken, msg, self.current().location)
    }

    pub(crate) fn error_at(
        &self,
        kind: ParseErrorKind,
        msg: &str,
        location: om_core::SourceLocation,
    ) -> ParseError {
        ParseError::new(kind, msg, location)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let location = left.location;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        location,
    )
}

// ============================================================================
// CONVENIENCE FUNCTIONS
// ============================================================================

/// Lex and parse Om source, recovering from syntax errors.
///
/// Lexer errors are fatal and returned as the only error.
pub fn parse_source(source: &str) -> Result<(ParseOutput, Vec<LexWarning>), LexError> {
    let stream = Lexer::new(source).tokenize()?;
    let output = Parser::new(stream.tokens).parse();
    Ok((output, stream.warnings))
}

/// Parse Om source into a program, failing on any lexer or parser error.
pub fn parse(source: &str) -> Result<Program, Vec<Diagnostic>> {
    let (output, _) = parse_source(source).map_err(|e| vec![e.to_diagnostic()])?;
    if output.errors.is_empty() {
        Ok(output.program)
    } else {
        Err(output.errors.iter().map(ParseError::to_diagnostic).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use om_core::{CancellationToken, FrequencyUnit, PhysicalUnit, SourceLocation};

    fn parse_ok(source: &str) -> Program {
        match parse(source) {
            Ok(program) => program,
            Err(diagnostics) => panic!("unexpected diagnostics: {:?}", diagnostics),
        }
    }

    fn parse_with_errors(source: &str) -> ParseOutput {
        parse_source(source).expect("lexes").0
    }

    fn expr_at(program: &Program, index: usize) -> &Expr {
        match &program.statements[index].kind {
            StatementKind::Expression(expr) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_binding_with_marker_and_annotation() {
        let program = parse_ok("const carrier~: Wave = wave(41.5kHz);");
        let StatementKind::Wave(decl) = &program.statements[0].kind else {
            panic!("expected binding");
        };
        assert_eq!(decl.mutability, Mutability::Const);
        assert_eq!(decl.name.name, "carrier");
        assert!(decl.name.wave_marker);
        assert_eq!(decl.annotation.as_ref().map(|t| t.name.as_str()), Some("Wave"));
        let Some(Expr {
            kind: ExprKind::Wave(wave),
            ..
        }) = &decl.value
        else {
            panic!("expected wave expression");
        };
        assert_eq!(
            wave.frequency.kind,
            ExprKind::Number {
                value: 41.5,
                unit: Some(PhysicalUnit::Frequency(FrequencyUnit::Kilohertz)),
            }
        );
        assert!(wave.phase.is_none());
    }

    #[test]
    fn test_parse_wave_named_arguments() {
        let program = parse_ok("let w = wave(1Hz, amplitude: 0.5, phase: 90deg);");
        let StatementKind::Wave(decl) = &program.statements[0].kind else {
            panic!("expected binding");
        };
        let Some(ExprKind::Wave(wave)) = decl.value.as_ref().map(|e| &e.kind) else {
            panic!("expected wave");
        };
        assert!(wave.phase.is_some());
        assert!(wave.amplitude.is_some());
    }

    #[test]
    fn test_parse_wave_argument_errors() {
        assert!(parse("let w = wave(1Hz, 2deg, 0.5, 1);").is_err());
        assert!(parse("let w = wave(1Hz, phase: 1deg, phase: 2deg);").is_err());
        assert!(parse("let w = wave(phase: 1deg);").is_err());
        assert!(parse("let w = wave(1Hz, shape: 1);").is_err());
    }

    #[test]
    fn test_pipe_is_left_associative() {
        let program = parse_ok("wave(41.5kHz) | phase(45deg) | amplitude(0.8);");
        let ExprKind::Pipe(outer) = &expr_at(&program, 0).kind else {
            panic!("expected pipe");
        };
        assert_eq!(outer.stage.name, "amplitude");
        let ExprKind::Pipe(inner) = &outer.input.kind else {
            panic!("expected nested pipe");
        };
        assert_eq!(inner.stage.name, "phase");
        assert!(matches!(inner.input.kind, ExprKind::Wave(_)));
    }

    #[test]
    fn test_pipe_binds_looser_than_arithmetic_tighter_than_assignment() {
        let program = parse_ok("x = a + b | normalize;");
        let ExprKind::Assign { target, value } = &expr_at(&program, 0).kind else {
            panic!("expected assignment");
        };
        assert_eq!(target.name, "x");
        let ExprKind::Pipe(pipe) = &value.kind else {
            panic!("expected pipe");
        };
        assert!(pipe.args.is_empty());
        assert!(matches!(pipe.input.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        let program = parse_ok("1 + 2 * 3;");
        let ExprKind::Binary { op, right, .. } = &expr_at(&program, 0).kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_parse_range_and_member_call() {
        let program = parse_ok("let band = 20Hz..20kHz;\nsignal.filter(band);");
        let StatementKind::Wave(decl) = &program.statements[0].kind else {
            panic!("expected binding");
        };
        assert!(matches!(
            decl.value.as_ref().map(|e| &e.kind),
            Some(ExprKind::Range { .. })
        ));
        let ExprKind::Call { callee, args } = &expr_at(&program, 1).kind
        else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_parse_pattern_declarations() {
        let program = parse_ok(
            "pattern chord: parallel = [wave(440Hz), wave(550Hz)];\n\
             pattern grid: matrix(2, 2) = [a, b, c, d];\n\
             pattern seq = [wave(1Hz)];",
        );
        let StatementKind::Pattern(chord) = &program.statements[0].kind else {
            panic!("expected pattern");
        };
        assert_eq!(chord.relationship, Relationship::Parallel);
        assert_eq!(chord.members.len(), 2);

        let StatementKind::Pattern(grid) = &program.statements[1].kind else {
            panic!("expected pattern");
        };
        assert_eq!(grid.relationship, Relationship::Matrix);
        let arrangement = grid.arrangement.as_ref().expect("arrangement");
        assert_eq!((arrangement.rows, arrangement.cols), (2.0, 2.0));

        let StatementKind::Pattern(seq) = &program.statements[2].kind else {
            panic!("expected pattern");
        };
        assert_eq!(seq.relationship, Relationship::Sequence);
    }

    #[test]
    fn test_parse_pattern_unknown_relationship() {
        let output = parse_with_errors("pattern p: braided = [a];");
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].message.contains("braided"));
    }

    #[test]
    fn test_parse_field_declaration() {
        let program = parse_ok(
            "field room(2) {\n  dimensions: <4, 3>,\n  waves: chord,\n  boundary: reflective,\n  interference: mixed\n}",
        );
        let StatementKind::Field(field) = &program.statements[0].kind else {
            panic!("expected field");
        };
        assert_eq!(field.rank, Some(2.0));
        assert!(matches!(
            field.dimensions.as_ref().map(|e| &e.kind),
            Some(ExprKind::Vector(v)) if v.len() == 2
        ));
        assert_eq!(field.boundary.as_ref().map(|b| b.name.as_str()), Some("reflective"));
        assert_eq!(field.interference.as_ref().map(|b| b.name.as_str()), Some("mixed"));
    }

    #[test]
    fn test_parse_field_rejects_unknown_and_duplicate_keys() {
        let output = parse_with_errors("field f { colour: red }");
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].message.contains("colour"));

        let output = parse_with_errors("field f { boundary: open, boundary: periodic }");
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].message.contains("twice"));
    }

    #[test]
    fn test_parse_function_declaration() {
        let program = parse_ok(
            "async fn shift~(w: Wave, by: Phase) -> Wave {\n  return w | phase(by);\n}",
        );
        let StatementKind::Function(func) = &program.statements[0].kind else {
            panic!("expected function");
        };
        assert!(func.is_async);
        assert!(func.name.wave_marker);
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.params[1].annotation.as_ref().map(|t| t.name.as_str()), Some("Phase"));
        assert_eq!(func.return_type.as_ref().map(|t| t.name.as_str()), Some("Wave"));
        assert!(matches!(func.body.statements[0].kind, StatementKind::Return(Some(_))));
    }

    #[test]
    fn test_parse_try_catch() {
        let program = parse_ok("try { let x = 1; } catch err { log(err); }");
        let StatementKind::Try(stmt) = &program.statements[0].kind else {
            panic!("expected try");
        };
        assert_eq!(stmt.body.statements.len(), 1);
        assert_eq!(stmt.binding.as_ref().map(|b| b.name.as_str()), Some("err"));
        assert_eq!(stmt.handler.statements.len(), 1);
    }

    #[test]
    fn test_parse_type_declaration_generics() {
        let program = parse_ok("type Position = Vector<3>;\ntype Band = Range<Frequency>;");
        let StatementKind::Type(decl) = &program.statements[0].kind else {
            panic!("expected type");
        };
        assert_eq!(decl.target.name, "Vector");
        assert_eq!(decl.target.args, vec![TypeArg::Number(3.0)]);
        let StatementKind::Type(decl) = &program.statements[1].kind else {
            panic!("expected type");
        };
        assert!(matches!(&decl.target.args[0], TypeArg::Type(t) if t.name == "Frequency"));
    }

    #[test]
    fn test_parse_vector_literal() {
        let program = parse_ok("let p = <1, -2.5, depth>;");
        let StatementKind::Wave(decl) = &program.statements[0].kind else {
            panic!("expected binding");
        };
        let Some(ExprKind::Vector(elements)) = decl.value.as_ref().map(|e| &e.kind) else {
            panic!("expected vector");
        };
        assert_eq!(elements.len(), 3);
        assert!(matches!(elements[1].kind, ExprKind::Neg(_)));
    }

    #[test]
    fn test_ambiguous_brackets() {
        for source in [
            "let v = <\"a\", 1>;",
            "let v = <1 + 2>;",
            "let v = a < b;",
            "let v = <>;",
        ] {
            let output = parse_with_errors(source);
            assert_eq!(output.errors.len(), 1, "{}", source);
            assert_eq!(output.errors[0].kind, ParseErrorKind::AmbiguousBracket, "{}", source);
        }
    }

    #[test]
    fn test_two_malformed_statements_then_valid() {
        let output = parse_with_errors("let = 5;\nconst x~ = ;\nlet ok = wave(1Hz);");
        assert_eq!(output.errors.len(), 2);
        assert_eq!(output.program.statements.len(), 1);
        let StatementKind::Wave(decl) = &output.program.statements[0].kind else {
            panic!("expected binding");
        };
        assert_eq!(decl.name.name, "ok");
        assert_eq!(output.errors[0].location.line, 1);
        assert_eq!(output.errors[1].location.line, 2);
    }

    #[test]
    fn test_recovery_stops_before_declaration_keyword() {
        let output = parse_with_errors("let x = 1 2 3\nconst y = 2;");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.program.statements.len(), 1);
    }

    #[test]
    fn test_recovery_inside_block_keeps_function() {
        let output = parse_with_errors("fn f() {\n  let = 1;\n  let ok = 2;\n}\nlet after = 3;");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.program.statements.len(), 2);
        let StatementKind::Function(func) = &output.program.statements[0].kind else {
            panic!("expected function");
        };
        assert_eq!(func.body.statements.len(), 1);
    }

    #[test]
    fn test_stray_closing_brace_is_skipped() {
        let output = parse_with_errors("}\nlet x = 1;");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.program.statements.len(), 1);
    }

    #[test]
    fn test_unterminated_block() {
        let output = parse_with_errors("fn f() {\n  let x = 1;\n");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].kind, ParseErrorKind::UnterminatedBlock);
        assert_eq!(output.errors[0].location, SourceLocation::new(1, 8, 7));
    }

    #[test]
    fn test_return_outside_function() {
        let output = parse_with_errors("return 1;");
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].message.contains("return"));
    }

    #[test]
    fn test_annotations_and_doc_comment() {
        let program = parse_ok(
            "/** Therapy carrier. */\n@context(\"medical\")\nconst carrier~ = wave(40Hz);",
        );
        let statement = &program.statements[0];
        assert_eq!(statement.doc.as_deref(), Some("Therapy carrier."));
        assert_eq!(statement.context(), Some("medical"));
        assert_eq!(statement.location.line, 2);
    }

    #[test]
    fn test_node_locations_are_first_token() {
        let program = parse_ok("let a = 1;\n  b | f(2);");
        assert_eq!(program.statements[1].location, SourceLocation::new(2, 3, 13));
        let ExprKind::Pipe(pipe) = &expr_at(&program, 1).kind
        else {
            panic!("expected pipe");
        };
        assert_eq!(pipe.stage.location, SourceLocation::new(2, 7, 17));
        assert_eq!(pipe.args[0].location, SourceLocation::new(2, 9, 19));
    }

    #[test]
    fn test_every_expression_starts_dynamic() {
        let program = parse_ok("let x = 1Hz + 2Hz;");
        let StatementKind::Wave(decl) = &program.statements[0].kind else {
            panic!("expected binding");
        };
        assert!(decl.value.as_ref().map(|e| e.ty.is_dynamic()).unwrap_or(false));
    }

    #[test]
    fn test_cancelled_parser_stops_before_first_statement() {
        let token = CancellationToken::new();
        token.cancel();
        let stream = Lexer::new("let a = 1; let b = 2;").tokenize().expect("lexes");
        let output = Parser::new(stream.tokens).with_cancellation(token).parse();
        assert!(output.cancelled);
        assert!(output.program.statements.is_empty());
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_lexer_error_becomes_diagnostic() {
        let diagnostics = parse("let x = 3parsecs;").unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, "UnknownUnit");
    }
}
