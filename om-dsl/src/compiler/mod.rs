//! Front-end driver
//!
//! Runs lexer → parser → type checker → validator over one compilation unit
//! and collects every diagnostic along the way. A stage only runs when the
//! stages before it produced no errors; warnings never stop the pipeline.

use crate::checker::TypeChecker;
use crate::lexer::{LexWarning, Lexer};
use crate::parser::ast::{ParseError, Parser, Program};
use crate::validator::Validator;
use om_core::{
    has_errors, CancellationToken, Diagnostic, FrontEndOptions, RuleSetConfig, SourceLocation,
    Stage,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// A program that passed every front-end stage, ready for code generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedAst {
    pub program: Program,
    /// Non-fatal diagnostics, such as deprecated unit spellings.
    pub warnings: Vec<Diagnostic>,
    /// Hex SHA-256 of the source text.
    pub source_hash: String,
}

/// Everything one front-end run produced, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutcome {
    /// The program as far as it was built. `None` only when lexing failed.
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
    /// Last stage that ran.
    pub stage: Stage,
    pub cancelled: bool,
    pub source_hash: String,
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.program.is_some() && !has_errors(&self.diagnostics)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn into_result(self) -> Result<ValidatedAst, Vec<Diagnostic>> {
        let success = self.is_success();
        match self.program {
            Some(program) if success => Ok(ValidatedAst {
                program,
                warnings: self.diagnostics,
                source_hash: self.source_hash,
            }),
            _ => Err(self.diagnostics),
        }
    }
}

// ============================================================================
// FRONT END
// ============================================================================

/// Configured front-end. Holds no per-unit state, so one instance can
/// compile any number of units, including in parallel.
#[derive(Debug, Clone)]
pub struct FrontEnd<'a> {
    rules: &'a RuleSetConfig,
    options: FrontEndOptions,
    cancel: Option<CancellationToken>,
}

impl<'a> FrontEnd<'a> {
    pub fn new(rules: &'a RuleSetConfig) -> Self {
        Self {
            rules,
            options: FrontEndOptions::default(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: FrontEndOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Compile one unit to a validated AST or the diagnostics explaining why not.
    pub fn compile(&self, source: &str) -> Result<ValidatedAst, Vec<Diagnostic>> {
        self.run(source).into_result()
    }

    /// Compile independent units in parallel. Results keep input order.
    pub fn compile_many<S>(&self, sources: &[S]) -> Vec<Result<ValidatedAst, Vec<Diagnostic>>>
    where
        S: AsRef<str> + Sync,
    {
        sources
            .par_iter()
            .map(|source| self.compile(source.as_ref()))
            .collect()
    }

    /// Run the pipeline, keeping partial results.
    pub fn run(&self, source: &str) -> CompileOutcome {
        let _span = tracing::debug_span!("compile_unit", bytes = source.len()).entered();
        let mut run = Run {
            diagnostics: Vec::new(),
            source_hash: sha256_hex(source),
            max_diagnostics: self.options.max_diagnostics,
        };

        let stream = {
            let _span = tracing::debug_span!("lex").entered();
            match Lexer::new(source).tokenize() {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::debug!(kind = err.kind_name(), "Lexing failed");
                    run.diagnostics.push(err.to_diagnostic());
                    return run.finish(None, Stage::Lexer, false);
                }
            }
        };
        tracing::debug!(tokens = stream.tokens.len(), "Lexed unit");
        run.diagnostics
            .extend(stream.warnings.iter().map(LexWarning::to_diagnostic));

        let parsed = {
            let _span = tracing::debug_span!("parse").entered();
            let mut parser = Parser::new(stream.tokens);
            if let Some(token) = &self.cancel {
                parser = parser.with_cancellation(token.clone());
            }
            parser.parse()
        };
        run.diagnostics
            .extend(parsed.errors.iter().map(ParseError::to_diagnostic));
        let mut program = parsed.program;
        if parsed.cancelled || has_errors(&run.diagnostics) {
            return run.finish(Some(program), Stage::Parser, parsed.cancelled);
        }

        let checked = {
            let _span = tracing::debug_span!("check").entered();
            let mut checker = TypeChecker::new();
            if let Some(token) = &self.cancel {
                checker = checker.with_cancellation(token.clone());
            }
            checker.check(&mut program)
        };
        run.diagnostics
            .extend(checked.errors.iter().map(|e| e.to_diagnostic()));
        if checked.cancelled || has_errors(&run.diagnostics) {
            return run.finish(Some(program), Stage::TypeChecker, checked.cancelled);
        }

        let validated = {
            let _span = tracing::debug_span!("validate").entered();
            let mut validator = Validator::new(self.rules);
            if let Some(token) = &self.cancel {
                validator = validator.with_cancellation(token.clone());
            }
            validator.validate(&program)
        };
        run.diagnostics
            .extend(validated.errors.iter().map(|e| e.to_diagnostic()));
        run.finish(Some(program), Stage::Validator, validated.cancelled)
    }
}

/// Diagnostics accumulated by one run.
struct Run {
    diagnostics: Vec<Diagnostic>,
    source_hash: String,
    max_diagnostics: usize,
}

impl Run {
    fn finish(mut self, program: Option<Program>, stage: Stage, cancelled: bool) -> CompileOutcome {
        if cancelled {
            tracing::info!(%stage, "Compilation cancelled");
            self.diagnostics.push(Diagnostic::error(
                stage,
                "Cancelled",
                format!("compilation cancelled during {}", stage),
                SourceLocation::default(),
            ));
        }

        if self.max_diagnostics > 0 && self.diagnostics.len() > self.max_diagnostics {
            tracing::debug!(
                total = self.diagnostics.len(),
                kept = self.max_diagnostics,
                "Truncating diagnostics"
            );
            // Errors first.
            self.diagnostics.sort_by_key(|d| !d.is_error());
            self.diagnostics.truncate(self.max_diagnostics);
        }

        tracing::debug!(
            %stage,
            diagnostics = self.diagnostics.len(),
            errors = has_errors(&self.diagnostics),
            "Front-end run finished"
        );
        CompileOutcome {
            program,
            diagnostics: self.diagnostics,
            stage,
            cancelled,
            source_hash: self.source_hash,
        }
    }
}

/// Compute SHA-256 hash of content, returning hex-encoded string.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compile one unit with default options.
pub fn compile_unit(
    source: &str,
    rules: &RuleSetConfig,
) -> Result<ValidatedAst, Vec<Diagnostic>> {
    FrontEnd::new(rules).compile(source)
}

/// Compile independent units in parallel with default options.
pub fn compile_units<S>(
    sources: &[S],
    rules: &RuleSetConfig,
) -> Vec<Result<ValidatedAst, Vec<Diagnostic>>>
where
    S: AsRef<str> + Sync,
{
    FrontEnd::new(rules).compile_many(sources)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::StatementKind;
    use crate::types::Ty;
    use om_core::{FrequencyUnit, PhysicalUnit, Quantity, RuleSet, Severity};

    fn kinds(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.kind.as_str()).collect()
    }

    #[test]
    fn test_compile_unit_success() {
        let source = "/** The carrier. */\nconst carrier~ = wave(41.5kHz) | phase(45deg) | amplitude(0.8);";
        let validated = compile_unit(source, &RuleSetConfig::default()).expect("compiles");
        assert!(validated.warnings.is_empty());
        assert_eq!(validated.source_hash, sha256_hex(source));
        assert_eq!(validated.source_hash.len(), 64);

        let statement = &validated.program.statements[0];
        assert_eq!(statement.doc.as_deref(), Some("The carrier."));
        let StatementKind::Wave(decl) = &statement.kind else {
            panic!("expected binding");
        };
        assert!(matches!(decl.ty, Ty::Wave(_)));
    }

    #[test]
    fn test_lex_error_is_fatal() {
        let diagnostics = compile_unit("let x = 5parsecs;", &RuleSetConfig::default())
            .expect_err("unknown unit");
        assert_eq!(kinds(&diagnostics), vec!["UnknownUnit"]);
        assert_eq!(diagnostics[0].stage, Stage::Lexer);
    }

    #[test]
    fn test_parse_errors_stop_before_checking() {
        let outcome = FrontEnd::new(&RuleSetConfig::default())
            .run("let = 1;\nconst y = nope;\nlet z = ;");
        assert_eq!(outcome.stage, Stage::Parser);
        assert_eq!(outcome.errors().count(), 2);
        assert!(outcome.errors().all(|d| d.stage == Stage::Parser));
        assert!(outcome.program.is_some());
    }

    #[test]
    fn test_type_errors_stop_before_validation() {
        let diagnostics = compile_unit(
            "const a = 1;\nconst a = phase(45);",
            &RuleSetConfig::default(),
        )
        .expect_err("missing unit");
        assert_eq!(kinds(&diagnostics), vec!["MissingUnit"]);
        assert_eq!(diagnostics[0].suggestions, vec!["deg", "rad"]);
    }

    #[test]
    fn test_validator_errors() {
        let diagnostics = compile_unit(
            "const w = wave(440Hz, 0deg, 1.5);",
            &RuleSetConfig::default(),
        )
        .expect_err("amplitude out of range");
        assert_eq!(kinds(&diagnostics), vec!["AmplitudeOutOfRange"]);
        assert_eq!(diagnostics[0].stage, Stage::Validator);
    }

    #[test]
    fn test_deprecated_units_are_warnings() {
        let validated = compile_unit("const f = 440hz;", &RuleSetConfig::default())
            .expect("warnings do not fail");
        assert_eq!(validated.warnings.len(), 1);
        assert_eq!(validated.warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_rule_sets_flow_through() {
        let hz = |v| Quantity::new(v, PhysicalUnit::Frequency(FrequencyUnit::Hertz));
        let rules = RuleSetConfig::new().with_rule_set(
            "medical",
            RuleSet::default().with_frequency_range(hz(1.0), hz(100_000.0)),
        );
        let source = "@context(\"medical\")\nconst w = wave(200kHz);";
        let diagnostics = compile_unit(source, &rules).expect_err("rule violation");
        assert_eq!(kinds(&diagnostics), vec!["RuleViolation"]);

        assert!(compile_unit(source, &RuleSetConfig::default()).is_ok());
    }

    #[test]
    fn test_max_diagnostics_truncates() {
        let source = "let a = x1;\nlet b = x2;\nlet c = x3;\nlet d = x4;";
        let outcome = FrontEnd::new(&RuleSetConfig::default())
            .with_options(FrontEndOptions { max_diagnostics: 2 })
            .run(source);
        assert_eq!(outcome.diagnostics.len(), 2);

        let outcome = FrontEnd::new(&RuleSetConfig::default())
            .with_options(FrontEndOptions { max_diagnostics: 0 })
            .run(source);
        assert_eq!(outcome.diagnostics.len(), 4);
    }

    #[test]
    fn test_cancelled_run_reports_stage() {
        let token = CancellationToken::new();
        token.cancel();
        let outcome = FrontEnd::new(&RuleSetConfig::default())
            .with_cancellation(token)
            .run("const a = 1;");
        assert!(outcome.cancelled);
        assert_eq!(outcome.stage, Stage::Parser);
        assert!(!outcome.is_success());
        assert_eq!(kinds(&outcome.diagnostics), vec!["Cancelled"]);
    }

    #[test]
    fn test_compile_units_keeps_order() {
        let sources = vec![
            "const a = 1Hz;".to_string(),
            "const b = 1Hz + 1deg;".to_string(),
            "const c = wave(1Hz);".to_string(),
        ];
        let results = compile_units(&sources, &RuleSetConfig::default());
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
