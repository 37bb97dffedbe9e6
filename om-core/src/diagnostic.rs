//! Source locations and driver-facing diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a token or node in the compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    /// 0-based byte offset.
    pub offset: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Front-end stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lexer,
    Parser,
    TypeChecker,
    Validator,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Stage::Lexer => "lexer",
            Stage::Parser => "parser",
            Stage::TypeChecker => "typechecker",
            Stage::Validator => "validator",
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single report handed to the driver.
///
/// `kind` is the variant name of the stage error (`MissingUnit`,
/// `AmbiguousBracket`, ...) so tools can match on it without parsing
/// `message`. `suggestions` come from static lookup tables only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub kind: String,
    pub message: String,
    pub location: SourceLocation,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(
        stage: Stage,
        kind: impl Into<String>,
        message: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self {
            stage,
            severity: Severity::Error,
            kind: kind.into(),
            message: message.into(),
            location,
            suggestions: Vec::new(),
        }
    }

    pub fn warning(
        stage: Stage,
        kind: impl Into<String>,
        message: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(stage, kind, message, location)
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}[{}::{}] at {}: {}",
            severity, self.stage, self.kind, self.location, self.message
        )?;
        if !self.suggestions.is_empty() {
            write!(f, " (try: {})", self.suggestions.join(", "))?;
        }
        Ok(())
    }
}

/// True if any diagnostic is an error rather than a warning.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error(
            Stage::TypeChecker,
            "MissingUnit",
            "phase angle must specify unit",
            SourceLocation::new(3, 7, 42),
        )
        .with_suggestions(vec!["deg".to_string(), "rad".to_string()]);

        let msg = diag.to_string();
        assert!(msg.starts_with("error[typechecker::MissingUnit] at 3:7"));
        assert!(msg.contains("try: deg, rad"));
    }

    #[test]
    fn test_warnings_do_not_count_as_errors() {
        let warning = Diagnostic::warning(
            Stage::Lexer,
            "DeprecatedUnit",
            "`khz` is deprecated, write `kHz`",
            SourceLocation::default(),
        );
        assert!(!warning.is_error());
        assert!(!has_errors(&[warning.clone()]));

        let error = Diagnostic::error(
            Stage::Parser,
            "UnexpectedToken",
            "expected `;`",
            SourceLocation::default(),
        );
        assert!(has_errors(&[warning, error]));
    }
}
