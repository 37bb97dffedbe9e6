//! Semantic Validator
//!
//! Runs on a fully typed program and enforces the rules that are not about
//! types: amplitude bounds, pattern and field structure, declaration
//! uniqueness, const-ness, and context rule-sets. Every error is recorded
//! and validation carries on.

pub mod rules;

pub use rules::RuleCheck;

use crate::parser::ast::*;
use crate::types::{BoundaryMode, InterferenceMode, Relationship, Ty, Value};
use om_core::{CancellationToken, Diagnostic, RuleSetConfig, SourceLocation, Stage};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

// ============================================================================
// SEMANTIC ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SemanticError {
    #[error("amplitude {amplitude} is outside [0, 1]")]
    AmplitudeOutOfRange {
        amplitude: f64,
        location: SourceLocation,
    },

    #[error("invalid pattern `{pattern}`: {reason}")]
    PatternStructureInvalid {
        pattern: String,
        reason: String,
        location: SourceLocation,
    },

    #[error("invalid dimensions for field `{field}`: {reason}")]
    FieldDimensionInvalid {
        field: String,
        reason: String,
        location: SourceLocation,
    },

    #[error("invalid {setting} `{value}` for field `{field}`")]
    FieldBoundaryInvalid {
        field: String,
        setting: String,
        value: String,
        allowed: Vec<String>,
        location: SourceLocation,
    },

    #[error("`{name}` is already declared in this scope (first declared at {previous})")]
    DuplicateDeclaration {
        name: String,
        previous: SourceLocation,
        location: SourceLocation,
    },

    #[error("cannot assign to {kind} `{name}`")]
    AssignToConst {
        name: String,
        kind: String,
        location: SourceLocation,
    },

    #[error("rule-set `{context}` violated ({rule}): {detail}")]
    RuleViolation {
        context: String,
        rule: String,
        detail: String,
        location: SourceLocation,
    },
}

impl SemanticError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SemanticError::AmplitudeOutOfRange { .. } => "AmplitudeOutOfRange",
            SemanticError::PatternStructureInvalid { .. } => "PatternStructureInvalid",
            SemanticError::FieldDimensionInvalid { .. } => "FieldDimensionInvalid",
            SemanticError::FieldBoundaryInvalid { .. } => "FieldBoundaryInvalid",
            SemanticError::DuplicateDeclaration { .. } => "DuplicateDeclaration",
            SemanticError::AssignToConst { .. } => "AssignToConst",
            SemanticError::RuleViolation { .. } => "RuleViolation",
        }
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            SemanticError::AmplitudeOutOfRange { location, .. }
            | SemanticError::PatternStructureInvalid { location, .. }
            | SemanticError::FieldDimensionInvalid { location, .. }
            | SemanticError::FieldBoundaryInvalid { location, .. }
            | SemanticError::DuplicateDeclaration { location, .. }
            | SemanticError::AssignToConst { location, .. }
            | SemanticError::RuleViolation { location, .. } => *location,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(
            Stage::Validator,
            self.kind_name(),
            self.to_string(),
            self.location(),
        );
        match self {
            SemanticError::FieldBoundaryInvalid { allowed, .. } => {
                diagnostic.with_suggestions(allowed.clone())
            }
            _ => diagnostic,
        }
    }
}

// ============================================================================
// SCOPE REGISTRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Const,
    Let,
    Param,
    Function,
    Pattern,
    Field,
}

impl DeclKind {
    fn name(self) -> &'static str {
        match self {
            DeclKind::Const => "constant",
            DeclKind::Let => "variable",
            DeclKind::Param => "parameter",
            DeclKind::Function => "function",
            DeclKind::Pattern => "pattern",
            DeclKind::Field => "field",
        }
    }

    fn is_assignable(self) -> bool {
        matches!(self, DeclKind::Let | DeclKind::Param)
    }
}

#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, (DeclKind, SourceLocation)>,
    types: HashMap<String, SourceLocation>,
}

/// Tracks declared names per lexical scope to detect duplicates.
/// Shadowing an outer scope is allowed.
#[derive(Debug)]
struct ScopeRegistry {
    scopes: Vec<Scope>,
}

impl ScopeRegistry {
    fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn register(&mut self, kind: DeclKind, ident: &Ident) -> Result<(), SemanticError> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if let Some((_, previous)) = scope.values.get(&ident.name) {
            return Err(SemanticError::DuplicateDeclaration {
                name: ident.name.clone(),
                previous: *previous,
                location: ident.location,
            });
        }
        scope
            .values
            .insert(ident.name.clone(), (kind, ident.location));
        Ok(())
    }

    fn register_type(&mut self, ident: &Ident) -> Result<(), SemanticError> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if let Some(previous) = scope.types.get(&ident.name) {
            return Err(SemanticError::DuplicateDeclaration {
                name: ident.name.clone(),
                previous: *previous,
                location: ident.location,
            });
        }
        scope.types.insert(ident.name.clone(), ident.location);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<DeclKind> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.values.get(name))
            .map(|(kind, _)| *kind)
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidateOutput {
    pub errors: Vec<SemanticError>,
    pub cancelled: bool,
}

pub struct Validator<'a> {
    config: &'a RuleSetConfig,
    names: ScopeRegistry,
    /// Innermost configured `@context`, if any.
    contexts: Vec<RuleCheck<'a>>,
    errors: Vec<SemanticError>,
    seen: HashSet<(SourceLocation, String)>,
    cancel: Option<CancellationToken>,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a RuleSetConfig) -> Self {
        Self {
            config,
            names: ScopeRegistry::new(),
            contexts: Vec::new(),
            errors: Vec::new(),
            seen: HashSet::new(),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn validate(mut self, program: &Program) -> ValidateOutput {
        let mut cancelled = false;
        self.declare_hoisted(&program.statements);

        for statement in &program.statements {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                tracing::info!("Validation cancelled");
                cancelled = true;
                break;
            }
            self.validate_statement(statement);
        }

        tracing::debug!(errors = self.errors.len(), "Validated program");
        ValidateOutput {
            errors: self.errors,
            cancelled,
        }
    }

    fn report(&mut self, error: SemanticError) {
        if self.seen.insert((error.location(), error.to_string())) {
            self.errors.push(error);
        }
    }

    fn register(&mut self, kind: DeclKind, ident: &Ident) {
        if let Err(err) = self.names.register(kind, ident) {
            self.report(err);
        }
    }

    /// Functions and types are visible before their declaration.
    fn declare_hoisted(&mut self, statements: &[Statement]) {
        for statement in statements {
            match &statement.kind {
                StatementKind::Function(func) => self.register(DeclKind::Function, &func.name),
                StatementKind::Type(decl) => {
                    if let Err(err) = self.names.register_type(&decl.name) {
                        self.report(err);
                    }
                }
                _ => {}
            }
        }
    }

    fn validate_block(&mut self, block: &Block, binding: Option<&Ident>) {
        self.names.push();
        if let Some(ident) = binding {
            self.register(DeclKind::Let, ident);
        }
        self.declare_hoisted(&block.statements);
        for statement in &block.statements {
            self.validate_statement(statement);
        }
        self.names.pop();
    }

    fn validate_statement(&mut self, statement: &Statement) {
        let config = self.config;
        let entered = match statement.context() {
            Some(context) => match config.rule_sets.get_key_value(context) {
                Some((name, rules)) => {
                    self.contexts.push(RuleCheck::new(name, rules));
                    true
                }
                None => {
                    tracing::debug!(context, "No rule-set configured for context");
                    false
                }
            },
            None => false,
        };

        match &statement.kind {
            StatementKind::Wave(decl) => {
                if let Some(value) = &decl.value {
                    self.validate_expr(value);
                }
                let kind = match decl.mutability {
                    Mutability::Const => DeclKind::Const,
                    Mutability::Let => DeclKind::Let,
                };
                self.register(kind, &decl.name);
            }
            StatementKind::Pattern(decl) => {
                for member in &decl.members {
                    self.validate_expr(member);
                }
                self.validate_pattern(decl);
                self.register(DeclKind::Pattern, &decl.name);
            }
            StatementKind::Field(decl) => {
                for expr in decl.dimensions.iter().chain(decl.waves.iter()) {
                    self.validate_expr(expr);
                }
                self.validate_field(decl);
                self.register(DeclKind::Field, &decl.name);
            }
            StatementKind::Type(_) => {}
            StatementKind::Function(func) => {
                self.names.push();
                for param in &func.params {
                    self.register(DeclKind::Param, &param.name);
                }
                self.validate_block(&func.body, None);
                self.names.pop();
            }
            StatementKind::Expression(expr) => self.validate_expr(expr),
            StatementKind::Try(stmt) => {
                self.validate_block(&stmt.body, None);
                self.validate_block(&stmt.handler, stmt.binding.as_ref());
            }
            StatementKind::Return(value) => {
                if let Some(expr) = value {
                    self.validate_expr(expr);
                }
            }
        }

        if entered {
            self.contexts.pop();
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Structural checks over `expr` and its sub-expressions, then the
    /// active rule-set, if any.
    fn validate_expr(&mut self, expr: &Expr) {
        self.walk_expr(expr);
        if let Some(check) = self.contexts.last().copied() {
            let mut violations = Vec::new();
            check.check_expr(expr, &mut violations);
            if !violations.is_empty() {
                tracing::debug!(
                    context = check.context(),
                    count = violations.len(),
                    "Rule-set violations"
                );
            }
            for violation in violations {
                self.report(violation);
            }
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        let mut explicit = false;
        match &expr.kind {
            ExprKind::Wave(wave) => {
                if let Some(amplitude) = &wave.amplitude {
                    explicit = self.check_amplitude(amplitude);
                }
            }
            ExprKind::Pipe(pipe) => {
                if self.is_builtin_amplitude(&pipe.stage.name) {
                    if let [amplitude] = pipe.args.as_slice() {
                        explicit = self.check_amplitude(amplitude);
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                if let ExprKind::Identifier { name, .. } = &callee.kind {
                    if self.is_builtin_amplitude(name) {
                        if let [_, amplitude] = args.as_slice() {
                            explicit = self.check_amplitude(amplitude);
                        }
                    }
                }
            }
            ExprKind::Pattern(members) => {
                for member in members {
                    self.check_pattern_member("pattern literal", member);
                }
            }
            ExprKind::Assign { target, .. } => {
                if let Some(kind) = self.names.lookup(&target.name) {
                    if !kind.is_assignable() {
                        self.report(SemanticError::AssignToConst {
                            name: target.name.clone(),
                            kind: kind.name().to_string(),
                            location: target.location,
                        });
                    }
                }
            }
            _ => {}
        }
        if !explicit {
            self.check_derived_amplitude(expr);
        }

        for child in expr.children() {
            self.walk_expr(child);
        }
    }

    /// A wave whose folded amplitude leaves [0, 1] here, rather than
    /// inheriting it from a sub-expression or a named binding.
    fn check_derived_amplitude(&mut self, expr: &Expr) {
        if matches!(expr.kind, ExprKind::Identifier { .. }) {
            return;
        }
        let Some(amplitude) = out_of_range_amplitude(expr) else {
            return;
        };
        if expr
            .children()
            .into_iter()
            .any(|child| out_of_range_amplitude(child).is_some())
        {
            return;
        }
        self.report(SemanticError::AmplitudeOutOfRange {
            amplitude,
            location: expr.location,
        });
    }

    fn is_builtin_amplitude(&self, name: &str) -> bool {
        name == "amplitude" && self.names.lookup(name).is_none()
    }

    /// Check an explicit amplitude argument. Returns whether it was out of
    /// range.
    fn check_amplitude(&mut self, expr: &Expr) -> bool {
        match expr.value {
            Some(Value::Number(amplitude)) if !(0.0..=1.0).contains(&amplitude) => {
                self.report(SemanticError::AmplitudeOutOfRange {
                    amplitude,
                    location: expr.location,
                });
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Patterns and fields
    // ========================================================================

    fn check_pattern_member(&mut self, pattern: &str, member: &Expr) {
        if !matches!(member.ty, Ty::Wave(_) | Ty::Dynamic) {
            self.report(SemanticError::PatternStructureInvalid {
                pattern: pattern.to_string(),
                reason: format!("members must be waves, found {}", member.ty),
                location: member.location,
            });
        }
    }

    fn validate_pattern(&mut self, decl: &PatternDeclaration) {
        let name = &decl.name.name;
        for member in &decl.members {
            self.check_pattern_member(name, member);
        }

        let count = decl.members.len();
        let invalid = |reason: String, location| SemanticError::PatternStructureInvalid {
            pattern: name.clone(),
            reason,
            location,
        };

        let error = match decl.relationship {
            Relationship::Sequence if count < 1 => Some(invalid(
                "a sequence needs at least one wave".to_string(),
                decl.name.location,
            )),
            Relationship::Parallel if count < 2 => Some(invalid(
                format!("a parallel pattern needs at least two waves, found {}", count),
                decl.name.location,
            )),
            Relationship::Matrix => match &decl.arrangement {
                None => Some(invalid(
                    "a matrix pattern needs a (rows, cols) arrangement".to_string(),
                    decl.name.location,
                )),
                Some(a) if !is_positive_integer(a.rows) || !is_positive_integer(a.cols) => {
                    Some(invalid(
                        "matrix rows and cols must be positive integers".to_string(),
                        a.location,
                    ))
                }
                Some(a) if a.rows * a.cols != count as f64 => Some(invalid(
                    format!(
                        "a {}x{} matrix needs {} waves, found {}",
                        a.rows,
                        a.cols,
                        a.rows * a.cols,
                        count
                    ),
                    a.location,
                )),
                Some(_) => None,
            },
            _ => None,
        };

        if let Some(error) = error {
            self.report(error);
        }
    }

    fn validate_field(&mut self, decl: &FieldDeclaration) {
        let name = &decl.name.name;
        let invalid = |reason: String, location| SemanticError::FieldDimensionInvalid {
            field: name.clone(),
            reason,
            location,
        };
        let mut errors = Vec::new();

        let rank = match decl.rank {
            Some(rank) if !is_positive_integer(rank) => {
                errors.push(invalid(
                    format!("rank must be a positive integer, found {}", rank),
                    decl.name.location,
                ));
                None
            }
            rank => rank,
        };

        match &decl.dimensions {
            None => errors.push(invalid(
                "missing `dimensions`".to_string(),
                decl.name.location,
            )),
            Some(expr) => match &expr.kind {
                ExprKind::Vector(elements) => {
                    if elements.is_empty() {
                        errors.push(invalid("dimensions must not be empty".to_string(), expr.location));
                    }
                    for element in elements {
                        let constant = element.value.as_ref().and_then(Value::as_number);
                        if !constant.is_some_and(is_positive_integer) {
                            errors.push(invalid(
                                "each dimension must be a positive integer constant".to_string(),
                                element.location,
                            ));
                        }
                    }
                    if let Some(rank) = rank {
                        if elements.len() as f64 != rank {
                            errors.push(invalid(
                                format!(
                                    "rank {} field declares {} dimension(s)",
                                    rank,
                                    elements.len()
                                ),
                                expr.location,
                            ));
                        }
                    }
                }
                _ => errors.push(invalid(
                    "dimensions must be a vector literal such as <64, 64>".to_string(),
                    expr.location,
                )),
            },
        }

        if let Some(boundary) = &decl.boundary {
            if BoundaryMode::from_name(&boundary.name).is_none() {
                errors.push(setting_error(name, "boundary", boundary, &BoundaryMode::NAMES));
            }
        }
        if let Some(interference) = &decl.interference {
            if InterferenceMode::from_name(&interference.name).is_none() {
                errors.push(setting_error(
                    name,
                    "interference",
                    interference,
                    &InterferenceMode::NAMES,
                ));
            }
        }

        for error in errors {
            self.report(error);
        }
    }
}

fn setting_error(field: &str, setting: &str, value: &Ident, allowed: &[&str]) -> SemanticError {
    SemanticError::FieldBoundaryInvalid {
        field: field.to_string(),
        setting: setting.to_string(),
        value: value.name.clone(),
        allowed: allowed.iter().map(|s| s.to_string()).collect(),
        location: value.location,
    }
}

/// Folded amplitude of a wave-typed expression, when it lies outside [0, 1].
fn out_of_range_amplitude(expr: &Expr) -> Option<f64> {
    match &expr.ty {
        Ty::Wave(wave) => wave.amplitude.filter(|a| !(0.0..=1.0).contains(a)),
        _ => None,
    }
}

fn is_positive_integer(n: f64) -> bool {
    n >= 1.0 && n.fract() == 0.0
}

/// Validate a typed program against `config`.
pub fn validate(program: &Program, config: &RuleSetConfig) -> Vec<SemanticError> {
    Validator::new(config).validate(program).errors
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::check;
    use crate::parser::parse;
    use om_core::{FrequencyUnit, PhysicalUnit, Quantity, RuleSet};

    fn validate_source(source: &str) -> Vec<SemanticError> {
        validate_with(source, &RuleSetConfig::default())
    }

    fn validate_with(source: &str, config: &RuleSetConfig) -> Vec<SemanticError> {
        let mut program = parse(source).expect("parses");
        let type_errors = check(&mut program);
        assert!(type_errors.is_empty(), "{:?}", type_errors);
        validate(&program, config)
    }

    fn kinds(errors: &[SemanticError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.kind_name()).collect()
    }

    fn medical() -> RuleSetConfig {
        let hz = |v| Quantity::new(v, PhysicalUnit::Frequency(FrequencyUnit::Hertz));
        RuleSetConfig::new().with_rule_set(
            "medical",
            RuleSet::default()
                .with_frequency_range(hz(1.0), hz(100_000.0))
                .with_amplitude_max(0.6),
        )
    }

    #[test]
    fn test_amplitude_bounds() {
        let errors = validate_source("const w = wave(440Hz, 0deg, 1.5);");
        assert_eq!(kinds(&errors), vec!["AmplitudeOutOfRange"]);
        assert_eq!(errors[0].location(), SourceLocation::new(1, 29, 28));

        assert!(validate_source("const w = wave(440Hz, 0deg, 0.8);").is_empty());
    }

    #[test]
    fn test_amplitude_stage_bounds() {
        let errors = validate_source("const w = wave(1Hz) | amplitude(-0.1);");
        assert_eq!(kinds(&errors), vec!["AmplitudeOutOfRange"]);

        let errors = validate_source("const w = amplitude(wave(1Hz), 2);");
        assert_eq!(kinds(&errors), vec!["AmplitudeOutOfRange"]);
    }

    #[test]
    fn test_derived_amplitude_bounds() {
        let errors = validate_source("const w~ = wave(1Hz, 0deg, 0.8) * 2;");
        assert_eq!(kinds(&errors), vec!["AmplitudeOutOfRange"]);
        assert_eq!(errors[0].location().column, 12);

        let errors = validate_source(
            "const w~ = (wave(1Hz) | amplitude(0.5)) * 3 | phase(90deg);\nconst v~ = w | phase(1deg);\npattern p = [w, v];",
        );
        assert_eq!(kinds(&errors), vec!["AmplitudeOutOfRange"]);

        let errors = validate_source("const w~ = wave(1Hz, 0deg, 1.5) * 0.5;");
        assert_eq!(kinds(&errors), vec!["AmplitudeOutOfRange"]);
        assert_eq!(errors[0].location().column, 28);

        let errors = validate_source("const w~ = wave(1Hz, 0deg, 2) * 0.9;");
        assert_eq!(kinds(&errors), vec!["AmplitudeOutOfRange"]);
    }

    #[test]
    fn test_pattern_structure() {
        let source = "const a = wave(1Hz);\nconst b = wave(2Hz);\n";
        assert!(validate_source(&format!("{}pattern p: parallel = [a, b];", source)).is_empty());

        let errors = validate_source(&format!("{}pattern p: parallel = [a];", source));
        assert_eq!(kinds(&errors), vec!["PatternStructureInvalid"]);

        let errors = validate_source(&format!("{}pattern p = [a, 5Hz];", source));
        assert_eq!(kinds(&errors), vec!["PatternStructureInvalid"]);

        let errors = validate_source("pattern p = [];");
        assert_eq!(kinds(&errors), vec!["PatternStructureInvalid"]);
    }

    #[test]
    fn test_matrix_pattern_arrangement() {
        let source = "const a = wave(1Hz);\n";
        assert!(validate_source(&format!("{}pattern m: matrix(2, 2) = [a, a, a, a];", source))
            .is_empty());

        let errors = validate_source(&format!("{}pattern m: matrix(2, 2) = [a, a, a];", source));
        assert_eq!(kinds(&errors), vec!["PatternStructureInvalid"]);
        assert!(errors[0].to_string().contains("2x2"));

        let errors = validate_source(&format!("{}pattern m: matrix = [a];", source));
        assert_eq!(kinds(&errors), vec!["PatternStructureInvalid"]);
    }

    #[test]
    fn test_field_dimensions() {
        assert!(validate_source("field f(2) { dimensions: <64, 64>, boundary: periodic }").is_empty());

        let errors = validate_source("field f(3) { dimensions: <64, 64> }");
        assert_eq!(kinds(&errors), vec!["FieldDimensionInvalid"]);

        let errors = validate_source("field f { dimensions: <64, 0> }");
        assert_eq!(kinds(&errors), vec!["FieldDimensionInvalid"]);

        let errors = validate_source("field f { boundary: open }");
        assert_eq!(kinds(&errors), vec!["FieldDimensionInvalid"]);
    }

    #[test]
    fn test_field_boundary_names() {
        let errors =
            validate_source("field f { dimensions: <8>, boundary: sticky, interference: loud }");
        assert_eq!(
            kinds(&errors),
            vec!["FieldBoundaryInvalid", "FieldBoundaryInvalid"]
        );
        let diagnostic = errors[0].to_diagnostic();
        assert_eq!(
            diagnostic.suggestions,
            vec!["reflective", "absorbing", "periodic", "open"]
        );
    }

    #[test]
    fn test_duplicate_declarations() {
        let errors = validate_source("const a = 1;\nlet a = 2;");
        assert_eq!(kinds(&errors), vec!["DuplicateDeclaration"]);
        assert_eq!(errors[0].location(), SourceLocation::new(2, 5, 17));

        // Shadowing in a nested scope is fine.
        assert!(validate_source("const a = 1;\nfn f(a) { let b = a; }").is_empty());

        let errors = validate_source("fn f() { }\nfn f() { }");
        assert_eq!(kinds(&errors), vec!["DuplicateDeclaration"]);
    }

    #[test]
    fn test_assign_to_const() {
        let errors = validate_source("const a = 1;\na = 2;");
        assert_eq!(kinds(&errors), vec!["AssignToConst"]);

        assert!(validate_source("let a = 1;\na = 2;").is_empty());

        let errors = validate_source("fn f() { }\nfn g() { }\nf = g;");
        assert_eq!(kinds(&errors), vec!["AssignToConst"]);
        assert!(errors[0].to_string().contains("function"));
    }

    #[test]
    fn test_context_rule_set() {
        let config = medical();
        let errors = validate_with(
            "@context(\"medical\")\nconst w = wave(200kHz, 0deg, 0.5);",
            &config,
        );
        assert_eq!(kinds(&errors), vec!["RuleViolation"]);
        assert!(errors[0].to_string().contains("frequency_max"));

        let errors = validate_with(
            "@context(\"medical\")\nconst w = wave(40kHz, 0deg, 0.7);",
            &config,
        );
        assert_eq!(kinds(&errors), vec!["RuleViolation"]);
        assert!(errors[0].to_string().contains("amplitude_max"));

        assert!(validate_with(
            "@context(\"medical\")\nconst w = wave(40kHz, 0deg, 0.5);",
            &config
        )
        .is_empty());
    }

    #[test]
    fn test_unknown_context_adds_no_checks() {
        let errors = validate_with(
            "@context(\"industrial\")\nconst w = wave(200kHz, 0deg, 0.9);",
            &medical(),
        );
        assert!(errors.is_empty());

        let errors = validate_source("const w = wave(200kHz, 0deg, 0.9);");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_context_applies_inside_functions() {
        let errors = validate_with(
            "@context(\"medical\")\nfn f() { let w = wave(1MHz); }",
            &medical(),
        );
        assert_eq!(kinds(&errors), vec!["RuleViolation"]);
    }

    #[test]
    fn test_cancelled_validator_stops() {
        let token = CancellationToken::new();
        token.cancel();
        let program = parse("const a = 1;\nlet a = 2;").expect("parses");
        let config = RuleSetConfig::default();
        let output = Validator::new(&config)
            .with_cancellation(token)
            .validate(&program);
        assert!(output.cancelled);
        assert!(output.errors.is_empty());
    }
}
