//! Unit & Type Checker
//!
//! One top-to-bottom pass over the program that assigns a [`Ty`] to every
//! expression node, folds statically known quantities and waves, and checks
//! physical-unit compatibility. Checking never stops at the first error:
//! a failed node is typed `Dynamic` so nothing downstream cascades.
//!
//! Function signatures and type aliases are hoisted per block, so calls may
//! precede declarations.

pub mod env;

pub use env::*;

use crate::parser::ast::*;
use crate::types::*;
use om_core::{
    convert, CancellationToken, Diagnostic, Quantity, SourceLocation, Stage, UnitCategory,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

// ============================================================================
// TYPE ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    #[error("cannot combine {left} with {right}: units belong to different categories")]
    UnitMismatch {
        left: String,
        right: String,
        location: SourceLocation,
    },

    #[error("{expected} value must specify a unit")]
    MissingUnit {
        expected: UnitCategory,
        suggestions: Vec<String>,
        location: SourceLocation,
    },

    #[error("pipe stage `{stage}` expects {expected}, got {found}")]
    PipeTypeMismatch {
        stage: String,
        expected: String,
        found: String,
        location: SourceLocation,
    },

    #[error("undeclared identifier `{name}`")]
    UndeclaredIdentifier {
        name: String,
        location: SourceLocation,
    },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        location: SourceLocation,
    },

    #[error("operator `{op}` cannot be applied to {operands}")]
    InvalidOperand {
        op: String,
        operands: String,
        location: SourceLocation,
    },

    #[error("`{name}` takes {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        location: SourceLocation,
    },

    #[error("type alias `{name}` refers to itself")]
    RecursiveAlias {
        name: String,
        location: SourceLocation,
    },
}

impl TypeError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeError::UnitMismatch { .. } => "UnitMismatch",
            TypeError::MissingUnit { .. } => "MissingUnit",
            TypeError::PipeTypeMismatch { .. } => "PipeTypeMismatch",
            TypeError::UndeclaredIdentifier { .. } => "UndeclaredIdentifier",
            TypeError::TypeMismatch { .. } => "TypeMismatch",
            TypeError::InvalidOperand { .. } => "InvalidOperand",
            TypeError::ArityMismatch { .. } => "ArityMismatch",
            TypeError::RecursiveAlias { .. } => "RecursiveAlias",
        }
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            TypeError::UnitMismatch { location, .. }
            | TypeError::MissingUnit { location, .. }
            | TypeError::PipeTypeMismatch { location, .. }
            | TypeError::UndeclaredIdentifier { location, .. }
            | TypeError::TypeMismatch { location, .. }
            | TypeError::InvalidOperand { location, .. }
            | TypeError::ArityMismatch { location, .. }
            | TypeError::RecursiveAlias { location, .. } => *location,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(
            Stage::TypeChecker,
            self.kind_name(),
            self.to_string(),
            self.location(),
        );
        match self {
            TypeError::MissingUnit { suggestions, .. } => {
                diagnostic.with_suggestions(suggestions.clone())
            }
            _ => diagnostic,
        }
    }
}

// ============================================================================
// CHECKER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutput {
    pub errors: Vec<TypeError>,
    pub cancelled: bool,
}

/// Annotates a program in place with types and folded values.
pub struct TypeChecker {
    env: TypeEnvironment,
    errors: Vec<TypeError>,
    seen: HashSet<(SourceLocation, &'static str)>,
    /// Declared return types of the enclosing functions.
    returns: Vec<Ty>,
    cancel: Option<CancellationToken>,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            env: TypeEnvironment::new(),
            errors: Vec::new(),
            seen: HashSet::new(),
            returns: Vec::new(),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn check(mut self, program: &mut Program) -> CheckOutput {
        let mut cancelled = false;
        self.hoist(&mut program.statements);

        for statement in program.statements.iter_mut() {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                tracing::info!("Type check cancelled");
                cancelled = true;
                break;
            }
            self.check_statement(statement);
        }

        tracing::debug!(errors = self.errors.len(), "Type checked program");
        CheckOutput {
            errors: self.errors,
            cancelled,
        }
    }

    /// Record an error once per (location, kind).
    fn report(&mut self, error: TypeError) {
        if self.seen.insert((error.location(), error.kind_name())) {
            tracing::trace!(kind = error.kind_name(), location = %error.location(), "Type error");
            self.errors.push(error);
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Register type aliases, then function signatures, for one block.
    fn hoist(&mut self, statements: &mut [Statement]) {
        let pending: HashMap<&str, &TypeExpr> = statements
            .iter()
            .filter_map(|statement| match &statement.kind {
                StatementKind::Type(decl) => Some((decl.name.name.as_str(), &decl.target)),
                _ => None,
            })
            .collect();
        let mut resolving = Vec::new();
        for name in statements.iter().filter_map(|statement| match &statement.kind {
            StatementKind::Type(decl) => Some(decl.name.name.as_str()),
            _ => None,
        }) {
            self.hoist_alias(name, &pending, &mut resolving);
        }

        for statement in statements.iter_mut() {
            if let StatementKind::Function(func) = &mut statement.kind {
                let mut params = Vec::with_capacity(func.params.len());
                for param in func.params.iter_mut() {
                    param.ty = match &param.annotation {
                        Some(annotation) => self.resolve_or_dynamic(annotation),
                        None if param.name.wave_marker => Ty::Wave(WaveType::default()),
                        None => Ty::Dynamic,
                    };
                    params.push(param.ty.clone());
                }
                let ret = match &func.return_type {
                    Some(annotation) => self.resolve_or_dynamic(annotation),
                    None => Ty::Dynamic,
                };
                func.ty = Ty::Function(FnSig {
                    params,
                    ret: Box::new(ret),
                    is_async: func.is_async,
                });
                self.env.define(
                    func.name.name.clone(),
                    Binding::new(func.ty.clone(), BindingKind::Function, func.name.location),
                );
            }
        }
    }

    /// Resolve one alias of the current block after the block-local aliases
    /// its target names. A cycle resolves to `Dynamic`.
    fn hoist_alias<'s>(
        &mut self,
        name: &'s str,
        pending: &HashMap<&'s str, &'s TypeExpr>,
        resolving: &mut Vec<&'s str>,
    ) {
        if self.env.local_alias(name).is_some() {
            return;
        }
        let Some(target) = pending.get(name).copied() else {
            return;
        };
        if resolving.contains(&name) {
            self.report(TypeError::RecursiveAlias {
                name: name.to_string(),
                location: target.location,
            });
            self.env.define_alias(name, Ty::Dynamic);
            return;
        }

        resolving.push(name);
        let mut referenced = Vec::new();
        referenced_names(target, &mut referenced);
        for dependency in referenced {
            if pending.contains_key(dependency) {
                self.hoist_alias(dependency, pending, resolving);
            }
        }
        resolving.pop();

        if self.env.local_alias(name).is_none() {
            let ty = self.resolve_or_dynamic(target);
            self.env.define_alias(name, ty);
        }
    }

    fn check_statement(&mut self, statement: &mut Statement) {
        let location = statement.location;
        match &mut statement.kind {
            StatementKind::Wave(decl) => self.check_binding(decl),
            StatementKind::Pattern(decl) => self.check_pattern(decl),
            StatementKind::Field(decl) => self.check_field(decl),
            StatementKind::Type(_) => {}
            StatementKind::Function(func) => self.check_function(func),
            StatementKind::Expression(expr) => self.check_expr(expr),
            StatementKind::Try(stmt) => {
                self.check_block(&mut stmt.body, None);
                let binding = stmt.binding.as_ref().map(|b| {
                    (
                        b.name.clone(),
                        Binding::new(Ty::Dynamic, BindingKind::Let, b.location),
                    )
                });
                self.check_block(&mut stmt.handler, binding);
            }
            StatementKind::Return(value) => self.check_return(value.as_mut(), location),
        }
    }

    fn check_block(&mut self, block: &mut Block, binding: Option<(String, Binding)>) {
        self.env.push_scope();
        if let Some((name, binding)) = binding {
            self.env.define(name, binding);
        }
        self.hoist(&mut block.statements);
        for statement in block.statements.iter_mut() {
            self.check_statement(statement);
        }
        self.env.pop_scope();
    }

    fn check_binding(&mut self, decl: &mut WaveDeclaration) {
        let declared = decl
            .annotation
            .as_ref()
            .map(|annotation| self.resolve_or_dynamic(annotation));
        if let Some(value) = decl.value.as_mut() {
            self.check_expr(value);
        }

        let ty = match (declared, decl.value.as_ref()) {
            (Some(declared), Some(value)) => {
                if self.expect_type(value, &declared) && !value.ty.is_dynamic() {
                    value.ty.clone()
                } else {
                    declared
                }
            }
            (Some(declared), None) => declared,
            (None, Some(value)) => value.ty.clone(),
            (None, None) => Ty::Dynamic,
        };

        let ty = if decl.name.wave_marker {
            match ty {
                Ty::Dynamic => Ty::Wave(WaveType::default()),
                Ty::Wave(wave) => Ty::Wave(wave),
                other => {
                    let location = decl
                        .value
                        .as_ref()
                        .map(|v| v.location)
                        .unwrap_or(decl.name.location);
                    self.report(TypeError::TypeMismatch {
                        expected: "Wave".to_string(),
                        found: other.to_string(),
                        location,
                    });
                    Ty::Dynamic
                }
            }
        } else {
            ty
        };

        let kind = match decl.mutability {
            Mutability::Const => BindingKind::Const,
            Mutability::Let => BindingKind::Let,
        };
        let value = decl.value.as_ref().and_then(|v| v.value.clone());
        decl.ty = ty.clone();
        self.env.define(
            decl.name.name.clone(),
            Binding::new(ty, kind, decl.name.location).with_value(value),
        );
    }

    fn check_pattern(&mut self, decl: &mut PatternDeclaration) {
        for member in decl.members.iter_mut() {
            self.check_expr(member);
        }
        decl.ty = Ty::Pattern(PatternType {
            waves: member_waves(&decl.members),
            relationship: decl.relationship,
        });
        self.env.define(
            decl.name.name.clone(),
            Binding::new(decl.ty.clone(), BindingKind::Pattern, decl.name.location),
        );
    }

    fn check_field(&mut self, decl: &mut FieldDeclaration) {
        if let Some(dimensions) = decl.dimensions.as_mut() {
            self.check_expr(dimensions);
        }
        let mut waves = Vec::new();
        if let Some(expr) = decl.waves.as_mut() {
            self.check_expr(expr);
            match &expr.ty {
                Ty::Pattern(pattern) => waves = pattern.waves.clone(),
                Ty::Wave(wave) => waves.push(wave.clone()),
                Ty::Dynamic => {}
                other => self.report(TypeError::TypeMismatch {
                    expected: "Pattern".to_string(),
                    found: other.to_string(),
                    location: expr.location,
                }),
            }
        }

        let dimensions = match decl.dimensions.as_ref().map(|d| &d.kind) {
            Some(ExprKind::Vector(elements)) => elements
                .iter()
                .filter_map(|e| e.value.as_ref().and_then(Value::as_number))
                .filter(|n| *n >= 1.0 && n.fract() == 0.0)
                .map(|n| n as u64)
                .collect(),
            _ => Vec::new(),
        };

        decl.ty = Ty::Field(FieldType {
            dimensions,
            waves,
            boundary: decl
                .boundary
                .as_ref()
                .and_then(|b| BoundaryMode::from_name(&b.name))
                .unwrap_or_default(),
            interference: decl
                .interference
                .as_ref()
                .and_then(|i| InterferenceMode::from_name(&i.name))
                .unwrap_or_default(),
        });
        self.env.define(
            decl.name.name.clone(),
            Binding::new(decl.ty.clone(), BindingKind::Field, decl.name.location),
        );
    }

    fn check_function(&mut self, func: &mut FunctionDeclaration) {
        let ret = match &func.ty {
            Ty::Function(sig) => (*sig.ret).clone(),
            _ => Ty::Dynamic,
        };

        self.env.push_scope();
        for param in &func.params {
            self.env.define(
                param.name.name.clone(),
                Binding::new(param.ty.clone(), BindingKind::Param, param.name.location),
            );
        }
        self.returns.push(ret);
        self.hoist(&mut func.body.statements);
        for statement in func.body.statements.iter_mut() {
            self.check_statement(statement);
        }
        self.returns.pop();
        self.env.pop_scope();
    }

    fn check_return(&mut self, value: Option<&mut Expr>, location: SourceLocation) {
        let expected = self.returns.last().cloned().unwrap_or(Ty::Dynamic);
        match value {
            Some(expr) => {
                self.check_expr(expr);
                self.expect_type(expr, &expected);
            }
            None => {
                if !expected.is_compatible_with(&Ty::Void) {
                    self.report(TypeError::TypeMismatch {
                        expected: expected.to_string(),
                        found: Ty::Void.to_string(),
                        location,
                    });
                }
            }
        }
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn resolve_or_dynamic(&mut self, annotation: &TypeExpr) -> Ty {
        match self.resolve_type(annotation) {
            Ok(ty) => ty,
            Err(err) => {
                self.report(err);
                Ty::Dynamic
            }
        }
    }

    /// Resolve a written type. Unit categories are spelled by their type
    /// names (`Frequency`, `Phase`, `Time`, `Power`).
    fn resolve_type(&self, annotation: &TypeExpr) -> Result<Ty, TypeError> {
        let location = annotation.location;
        let generic = matches!(annotation.name.as_str(), "Vector" | "Range");
        if !generic && !annotation.args.is_empty() {
            return Err(TypeError::ArityMismatch {
                name: annotation.name.clone(),
                expected: 0,
                found: annotation.args.len(),
                location,
            });
        }

        let ty = match annotation.name.as_str() {
            "Number" => Ty::Number,
            "Bool" => Ty::Bool,
            "String" => Ty::Str,
            "Void" => Ty::Void,
            "Dynamic" => Ty::Dynamic,
            "Wave" => Ty::Wave(WaveType::default()),
            "Pattern" => Ty::Pattern(PatternType::default()),
            "Field" => Ty::Field(FieldType::default()),
            "Vector" => match annotation.args.as_slice() {
                [TypeArg::Number(n)] if *n >= 0.0 && n.fract() == 0.0 => Ty::Vector(*n as usize),
                _ => {
                    return Err(TypeError::TypeMismatch {
                        expected: "Vector<length>".to_string(),
                        found: format!("Vector with {} argument(s)", annotation.args.len()),
                        location,
                    })
                }
            },
            "Range" => match annotation.args.as_slice() {
                [TypeArg::Type(inner)] => Ty::Range(Box::new(self.resolve_type(inner)?)),
                _ => {
                    return Err(TypeError::TypeMismatch {
                        expected: "Range<Type>".to_string(),
                        found: format!("Range with {} argument(s)", annotation.args.len()),
                        location,
                    })
                }
            },
            name => {
                if let Some(category) = UnitCategory::from_type_name(name) {
                    Ty::quantity(category)
                } else if let Some(alias) = self.env.alias(name) {
                    alias.clone()
                } else {
                    return Err(TypeError::UndeclaredIdentifier {
                        name: name.to_string(),
                        location,
                    });
                }
            }
        };

        if annotation.wave_marker && !ty.is_compatible_with(&Ty::Wave(WaveType::default())) {
            return Err(TypeError::TypeMismatch {
                expected: "Wave".to_string(),
                found: ty.to_string(),
                location,
            });
        }
        Ok(ty)
    }

    /// Check `expr` against `expected`, reporting `MissingUnit` for a
    /// unitless literal in a unit-bearing position.
    fn expect_type(&mut self, expr: &Expr, expected: &Ty) -> bool {
        if expr.ty.is_compatible_with(expected) {
            return true;
        }
        if let Some(category) = expected.category() {
            if expr.ty == Ty::Number && is_unitless_literal(expr) {
                self.report(missing_unit(category, expr.location));
                return false;
            }
        }
        self.report(TypeError::TypeMismatch {
            expected: expected.to_string(),
            found: expr.ty.to_string(),
            location: expr.location,
        });
        false
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub(crate) fn check_expr(&mut self, expr: &mut Expr) {
        let location = expr.location;
        let (ty, value) = match &mut expr.kind {
            ExprKind::Number { value, unit } => match unit {
                Some(unit) => (
                    Ty::of_unit(*unit),
                    Some(Value::Quantity(Quantity::new(*value, *unit))),
                ),
                None => (Ty::Number, Some(Value::Number(*value))),
            },
            ExprKind::Str(s) => (Ty::Str, Some(Value::Str(s.clone()))),
            ExprKind::Bool(b) => (Ty::Bool, Some(Value::Bool(*b))),
            ExprKind::Identifier { name, .. } => self.check_identifier(name, location),
            ExprKind::Wave(wave) => self.check_wave(wave),
            ExprKind::Pipe(pipe) => self.check_pipe(pipe),
            ExprKind::Vector(elements) => {
                for element in elements.iter_mut() {
                    self.check_expr(element);
                    if !matches!(
                        element.ty,
                        Ty::Number | Ty::Quantity { .. } | Ty::Dynamic
                    ) {
                        self.report(TypeError::TypeMismatch {
                            expected: "Number".to_string(),
                            found: element.ty.to_string(),
                            location: element.location,
                        });
                    }
                }
                (Ty::Vector(elements.len()), None)
            }
            ExprKind::Pattern(members) => {
                for member in members.iter_mut() {
                    self.check_expr(member);
                }
                let pattern = PatternType {
                    waves: member_waves(members),
                    relationship: Relationship::Sequence,
                };
                (Ty::Pattern(pattern), None)
            }
            ExprKind::Binary { op, left, right } => {
                self.check_expr(left);
                self.check_expr(right);
                self.check_binary(*op, left, right, location)
            }
            ExprKind::Range { start, end } => {
                self.check_expr(start);
                self.check_expr(end);
                (self.check_range(start, end, location), None)
            }
            ExprKind::Neg(operand) => {
                self.check_expr(operand);
                self.check_neg(operand, location)
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args),
            ExprKind::Member { object, member } => {
                self.check_expr(object);
                member_type(&object.ty, member)
            }
            ExprKind::Assign { target, value } => {
                self.check_expr(value);
                self.check_assign(target, value)
            }
        };
        expr.ty = ty;
        expr.value = value;
    }

    fn check_identifier(&mut self, name: &str, location: SourceLocation) -> (Ty, Option<Value>) {
        if let Some(binding) = self.env.lookup(name) {
            return (binding.ty.clone(), binding.value.clone());
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return (Ty::Function(builtin.stage_signature()), None);
        }
        self.report(TypeError::UndeclaredIdentifier {
            name: name.to_string(),
            location,
        });
        (Ty::Dynamic, None)
    }

    fn check_wave(&mut self, wave: &mut WaveExpression) -> (Ty, Option<Value>) {
        self.check_expr(&mut wave.frequency);
        let frequency = self
            .component(&wave.frequency, Some(UnitCategory::Frequency))
            .and_then(|v| v.as_quantity());

        let mut phase = None;
        if let Some(expr) = wave.phase.as_mut() {
            self.check_expr(expr);
            phase = self
                .component(expr, Some(UnitCategory::Phase))
                .and_then(|v| v.as_quantity());
        }

        let mut amplitude = None;
        if let Some(expr) = wave.amplitude.as_mut() {
            self.check_expr(expr);
            amplitude = self.component(expr, None).and_then(|v| v.as_number());
        }

        (
            Ty::Wave(WaveType {
                frequency,
                phase,
                amplitude,
            }),
            None,
        )
    }

    /// Folded value of a wave component, if it has the right type.
    fn component(&mut self, expr: &Expr, category: Option<UnitCategory>) -> Option<Value> {
        let expected = category.map(Ty::quantity).unwrap_or(Ty::Number);
        if self.expect_type(expr, &expected) {
            expr.value.clone()
        } else {
            None
        }
    }

    fn check_pipe(&mut self, pipe: &mut PipeExpression) -> (Ty, Option<Value>) {
        self.check_expr(&mut pipe.input);
        for arg in pipe.args.iter_mut() {
            self.check_expr(arg);
        }

        let stage = &pipe.stage;
        if let Some(binding) = self.env.lookup(&stage.name).cloned() {
            return self.apply_function(
                &stage.name,
                &binding.ty,
                Some(pipe.input.as_ref()),
                &pipe.args,
                stage.location,
            );
        }
        if let Some(builtin) = Builtin::lookup(&stage.name) {
            return self.apply_builtin(
                builtin,
                Some(pipe.input.as_ref()),
                &pipe.args,
                stage.location,
                true,
            );
        }
        self.report(TypeError::UndeclaredIdentifier {
            name: stage.name.clone(),
            location: stage.location,
        });
        (Ty::Dynamic, None)
    }

    fn check_call(&mut self, callee: &mut Expr, args: &mut [Expr]) -> (Ty, Option<Value>) {
        for arg in args.iter_mut() {
            self.check_expr(arg);
        }

        if let ExprKind::Identifier { name, .. } = &callee.kind {
            if self.env.lookup(name).is_none() {
                if let Some(builtin) = Builtin::lookup(name) {
                    callee.ty = Ty::Function(builtin.stage_signature());
                    let location = callee.location;
                    return match &*args {
                        [subject, rest @ ..] if rest.len() == 1 => {
                            self.apply_builtin(builtin, Some(subject), rest, location, false)
                        }
                        _ => self.apply_builtin(builtin, None, args, location, false),
                    };
                }
            }
        }

        self.check_expr(callee);
        let name = match &callee.kind {
            ExprKind::Identifier { name, .. } => name.clone(),
            ExprKind::Member { member, .. } => member.clone(),
            _ => "expression".to_string(),
        };
        let callee_ty = callee.ty.clone();
        match callee_ty {
            Ty::Function(_) | Ty::Dynamic => {
                self.apply_function(&name, &callee_ty, None, args, callee.location)
            }
            other => {
                self.report(TypeError::TypeMismatch {
                    expected: "function".to_string(),
                    found: other.to_string(),
                    location: callee.location,
                });
                (Ty::Dynamic, None)
            }
        }
    }

    /// Apply a built-in, either as a pipe stage / two-argument call with a
    /// wave subject, or as a direct one-argument call returning the unit.
    fn apply_builtin(
        &mut self,
        builtin: Builtin,
        subject: Option<&Expr>,
        args: &[Expr],
        location: SourceLocation,
        piped: bool,
    ) -> (Ty, Option<Value>) {
        let fallback = if subject.is_some() {
            Ty::Wave(WaveType::default())
        } else {
            builtin.argument_type()
        };
        let [arg] = args else {
            self.report(TypeError::ArityMismatch {
                name: builtin.name().to_string(),
                expected: 1,
                found: args.len(),
                location,
            });
            return (fallback, None);
        };

        let argument = if self.expect_type(arg, &builtin.argument_type()) {
            arg.value.clone()
        } else {
            None
        };

        let Some(subject) = subject else {
            let ty = match (&arg.ty, builtin.category()) {
                (Ty::Quantity { .. }, Some(_)) => arg.ty.clone(),
                (_, Some(category)) => Ty::quantity(category),
                (_, None) => Ty::Number,
            };
            return (ty, argument);
        };

        let wave = match &subject.ty {
            Ty::Wave(wave) => wave.clone(),
            Ty::Dynamic => WaveType::default(),
            other => {
                let found = other.to_string();
                self.report(if piped {
                    TypeError::PipeTypeMismatch {
                        stage: builtin.name().to_string(),
                        expected: "Wave".to_string(),
                        found,
                        location,
                    }
                } else {
                    TypeError::TypeMismatch {
                        expected: "Wave".to_string(),
                        found,
                        location: subject.location,
                    }
                });
                return (Ty::Dynamic, None);
            }
        };
        (Ty::Wave(builtin.apply(wave, argument.as_ref())), None)
    }

    /// Apply a user function (or anything bound to a function type). With a
    /// pipe subject, the subject fills the first parameter.
    fn apply_function(
        &mut self,
        name: &str,
        callee: &Ty,
        subject: Option<&Expr>,
        args: &[Expr],
        location: SourceLocation,
    ) -> (Ty, Option<Value>) {
        let sig = match callee {
            Ty::Function(sig) => sig,
            Ty::Dynamic => return (Ty::Dynamic, None),
            other => {
                let found = other.to_string();
                self.report(match subject {
                    Some(_) => TypeError::PipeTypeMismatch {
                        stage: name.to_string(),
                        expected: "a function".to_string(),
                        found,
                        location,
                    },
                    None => TypeError::TypeMismatch {
                        expected: "function".to_string(),
                        found,
                        location,
                    },
                });
                return (Ty::Dynamic, None);
            }
        };

        let mut params = sig.params.iter();
        if let Some(subject) = subject {
            match params.next() {
                Some(param) if subject.ty.is_compatible_with(param) => {}
                Some(param) => self.report(TypeError::PipeTypeMismatch {
                    stage: name.to_string(),
                    expected: param.to_string(),
                    found: subject.ty.to_string(),
                    location,
                }),
                None => {
                    self.report(TypeError::PipeTypeMismatch {
                        stage: name.to_string(),
                        expected: "no subject".to_string(),
                        found: subject.ty.to_string(),
                        location,
                    });
                    return ((*sig.ret).clone(), None);
                }
            }
        }

        let remaining = params.as_slice();
        if remaining.len() != args.len() {
            self.report(TypeError::ArityMismatch {
                name: name.to_string(),
                expected: remaining.len(),
                found: args.len(),
                location,
            });
        }
        for (arg, param) in args.iter().zip(remaining) {
            self.expect_type(arg, param);
        }
        ((*sig.ret).clone(), None)
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        location: SourceLocation,
    ) -> (Ty, Option<Value>) {
        use BinaryOp::*;

        match (op, &left.ty, &right.ty) {
            (_, Ty::Dynamic, _) | (_, _, Ty::Dynamic) => (Ty::Dynamic, None),

            (Add | Sub, Ty::Quantity { category: lc, unit }, Ty::Quantity { category: rc, .. }) => {
                if lc != rc {
                    self.report(TypeError::UnitMismatch {
                        left: unit_label(left),
                        right: unit_label(right),
                        location,
                    });
                    return (Ty::Dynamic, None);
                }
                let ty = Ty::Quantity {
                    category: *lc,
                    unit: *unit,
                };
                (ty, fold_sum(op, left.value.as_ref(), right.value.as_ref()))
            }
            (Add | Sub, Ty::Number, Ty::Number) => {
                let value = fold_numbers(left, right, |a, b| if op == Add { a + b } else { a - b });
                (Ty::Number, value)
            }
            (Add | Sub, Ty::Quantity { category, .. }, Ty::Number) => {
                self.unitless_operand(op, *category, left, right, right, location)
            }
            (Add | Sub, Ty::Number, Ty::Quantity { category, .. }) => {
                self.unitless_operand(op, *category, left, right, left, location)
            }
            (Add | Sub, Ty::Wave(_), Ty::Wave(_)) => (Ty::Wave(WaveType::default()), None),

            (Mul | Div, Ty::Quantity { .. }, Ty::Number) => {
                let value = match (left.value.as_ref(), right.value.as_ref()) {
                    (Some(Value::Quantity(q)), Some(Value::Number(n))) => {
                        scale(q.value, *n, op).map(|v| Value::Quantity(Quantity::new(v, q.unit)))
                    }
                    _ => None,
                };
                (left.ty.clone(), value)
            }
            (Mul, Ty::Number, Ty::Quantity { .. }) => {
                let value = match (left.value.as_ref(), right.value.as_ref()) {
                    (Some(Value::Number(n)), Some(Value::Quantity(q))) => {
                        Some(Value::Quantity(Quantity::new(q.value * n, q.unit)))
                    }
                    _ => None,
                };
                (right.ty.clone(), value)
            }
            (Mul | Div, Ty::Number, Ty::Number) => {
                let value = match (left.value.as_ref(), right.value.as_ref()) {
                    (Some(Value::Number(a)), Some(Value::Number(b))) => {
                        scale(*a, *b, op).map(Value::Number)
                    }
                    _ => None,
                };
                (Ty::Number, value)
            }
            (Div, Ty::Quantity { category: lc, .. }, Ty::Quantity { category: rc, .. }) => {
                if lc != rc {
                    self.report(TypeError::UnitMismatch {
                        left: unit_label(left),
                        right: unit_label(right),
                        location,
                    });
                    return (Ty::Dynamic, None);
                }
                let value = match (left.value.as_ref(), right.value.as_ref()) {
                    (Some(Value::Quantity(a)), Some(Value::Quantity(b))) if b.base_value() != 0.0 => {
                        Some(Value::Number(a.base_value() / b.base_value()))
                    }
                    _ => None,
                };
                (Ty::Number, value)
            }
            (Mul, Ty::Wave(wave), Ty::Number) | (Mul, Ty::Number, Ty::Wave(wave)) => {
                let factor = if matches!(left.ty, Ty::Wave(_)) {
                    right.value.as_ref().and_then(Value::as_number)
                } else {
                    left.value.as_ref().and_then(Value::as_number)
                };
                let mut wave = wave.clone();
                wave.amplitude = match (wave.amplitude, factor) {
                    (Some(a), Some(f)) => Some(a * f),
                    _ => None,
                };
                (Ty::Wave(wave), None)
            }

            (op, l, r) => {
                self.report(TypeError::InvalidOperand {
                    op: op.symbol().to_string(),
                    operands: format!("{} and {}", l, r),
                    location,
                });
                (Ty::Dynamic, None)
            }
        }
    }

    /// A quantity combined with a plain number: a unitless literal is a
    /// missing unit, anything else is an invalid operand.
    fn unitless_operand(
        &mut self,
        op: BinaryOp,
        category: UnitCategory,
        left: &Expr,
        right: &Expr,
        number: &Expr,
        location: SourceLocation,
    ) -> (Ty, Option<Value>) {
        if is_unitless_literal(number) {
            self.report(missing_unit(category, number.location));
        } else {
            self.report(TypeError::InvalidOperand {
                op: op.symbol().to_string(),
                operands: format!("{} and {}", left.ty, right.ty),
                location,
            });
        }
        (Ty::Dynamic, None)
    }

    fn check_range(&mut self, start: &Expr, end: &Expr, location: SourceLocation) -> Ty {
        let elem = match (&start.ty, &end.ty) {
            (Ty::Dynamic, _) | (_, Ty::Dynamic) => Ty::Dynamic,
            (Ty::Quantity { category: a, unit }, Ty::Quantity { category: b, .. }) => {
                if a != b {
                    self.report(TypeError::UnitMismatch {
                        left: unit_label(start),
                        right: unit_label(end),
                        location,
                    });
                    return Ty::Dynamic;
                }
                Ty::Quantity {
                    category: *a,
                    unit: *unit,
                }
            }
            (Ty::Number, Ty::Number) => Ty::Number,
            (Ty::Quantity { category, .. }, Ty::Number) if is_unitless_literal(end) => {
                self.report(missing_unit(*category, end.location));
                return Ty::Dynamic;
            }
            (Ty::Number, Ty::Quantity { category, .. }) if is_unitless_literal(start) => {
                self.report(missing_unit(*category, start.location));
                return Ty::Dynamic;
            }
            (a, b) => {
                self.report(TypeError::InvalidOperand {
                    op: "..".to_string(),
                    operands: format!("{} and {}", a, b),
                    location,
                });
                return Ty::Dynamic;
            }
        };
        Ty::Range(Box::new(elem))
    }

    fn check_neg(&mut self, operand: &Expr, location: SourceLocation) -> (Ty, Option<Value>) {
        let value = match operand.value.as_ref() {
            Some(Value::Number(n)) => Some(Value::Number(-n)),
            Some(Value::Quantity(q)) => Some(Value::Quantity(Quantity::new(-q.value, q.unit))),
            _ => None,
        };
        match &operand.ty {
            Ty::Number | Ty::Quantity { .. } => (operand.ty.clone(), value),
            Ty::Dynamic => (Ty::Dynamic, None),
            other => {
                self.report(TypeError::InvalidOperand {
                    op: "-".to_string(),
                    operands: other.to_string(),
                    location,
                });
                (Ty::Dynamic, None)
            }
        }
    }

    fn check_assign(&mut self, target: &Ident, value: &Expr) -> (Ty, Option<Value>) {
        let Some(binding) = self.env.lookup(&target.name).cloned() else {
            self.report(TypeError::UndeclaredIdentifier {
                name: target.name.clone(),
                location: target.location,
            });
            return (value.ty.clone(), None);
        };

        let compatible = self.expect_type(value, &binding.ty);
        // A binding from an enclosing scope may be reassigned on a path
        // that never runs, so its folded state is dropped.
        let local = self.env.is_local(&target.name);
        if let Some(slot) = self.env.lookup_mut(&target.name) {
            if local {
                slot.value = value.value.clone();
                if compatible && !slot.ty.is_dynamic() && !value.ty.is_dynamic() {
                    slot.ty = value.ty.clone();
                }
            } else {
                slot.value = None;
                slot.ty = slot.ty.without_folded_values();
            }
        }
        (value.ty.clone(), value.value.clone())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn missing_unit(category: UnitCategory, location: SourceLocation) -> TypeError {
    TypeError::MissingUnit {
        expected: category,
        suggestions: category.symbols(),
        location,
    }
}

/// A number literal written without a unit suffix, possibly negated.
fn is_unitless_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Number { unit: None, .. } => true,
        ExprKind::Neg(inner) => is_unitless_literal(inner),
        _ => false,
    }
}

/// Name of an operand's unit for diagnostics: the symbol when known,
/// otherwise the category.
fn unit_label(expr: &Expr) -> String {
    match &expr.ty {
        Ty::Quantity {
            unit: Some(unit), ..
        } => unit.symbol().to_string(),
        Ty::Quantity { category, .. } => category.type_name().to_string(),
        other => other.to_string(),
    }
}

/// Every type name written in `annotation`, including generic arguments.
fn referenced_names<'a>(annotation: &'a TypeExpr, names: &mut Vec<&'a str>) {
    names.push(annotation.name.as_str());
    for arg in &annotation.args {
        if let TypeArg::Type(inner) = arg {
            referenced_names(inner, names);
        }
    }
}

fn member_waves(members: &[Expr]) -> Vec<WaveType> {
    members
        .iter()
        .filter_map(|m| match &m.ty {
            Ty::Wave(wave) => Some(wave.clone()),
            _ => None,
        })
        .collect()
}

fn member_type(object: &Ty, member: &str) -> (Ty, Option<Value>) {
    let Ty::Wave(wave) = object else {
        return (Ty::Dynamic, None);
    };
    let component = |q: Option<Quantity>, category: UnitCategory| match q {
        Some(q) => (Ty::of_unit(q.unit), Some(Value::Quantity(q))),
        None => (Ty::quantity(category), None),
    };
    match member {
        "frequency" => component(wave.frequency, UnitCategory::Frequency),
        "phase" => component(wave.phase, UnitCategory::Phase),
        "amplitude" => (Ty::Number, wave.amplitude.map(Value::Number)),
        _ => (Ty::Dynamic, None),
    }
}

/// Fold `left ± right`, normalizing to the left operand's unit.
fn fold_sum(op: BinaryOp, left: Option<&Value>, right: Option<&Value>) -> Option<Value> {
    let (Some(Value::Quantity(l)), Some(Value::Quantity(r))) = (left, right) else {
        return None;
    };
    let r = convert(r.value, r.unit, l.unit).ok()?;
    let value = if op == BinaryOp::Add {
        l.value + r
    } else {
        l.value - r
    };
    Some(Value::Quantity(Quantity::new(value, l.unit)))
}

fn fold_numbers(left: &Expr, right: &Expr, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    match (left.value.as_ref(), right.value.as_ref()) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => Some(Value::Number(f(*a, *b))),
        _ => None,
    }
}

fn scale(value: f64, factor: f64, op: BinaryOp) -> Option<f64> {
    match op {
        BinaryOp::Div if factor == 0.0 => None,
        BinaryOp::Div => Some(value / factor),
        _ => Some(value * factor),
    }
}

/// Type check a parsed program in place.
pub fn check(program: &mut Program) -> Vec<TypeError> {
    TypeChecker::new().check(program).errors
}

// ============================================================================
// TESTS
// ============================================================================
