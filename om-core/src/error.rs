//! Error types shared across the Om front-end

use thiserror::Error;

/// Errors from unit lookup and quantity parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("Unknown unit suffix: {suffix}")]
    UnknownUnit { suffix: String },

    #[error("Quantity '{input}' has no unit")]
    MissingUnit { input: String },

    #[error("Malformed quantity: {input}")]
    Malformed { input: String },

    #[error("Cannot convert {from} to {to}: units belong to different categories")]
    CategoryMismatch { from: String, to: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Rule set '{rule_set}': {field} expects a {expected} quantity, got {value}")]
    WrongCategory {
        rule_set: String,
        field: String,
        expected: String,
        value: String,
    },
}

/// Master error type for Om front-end infrastructure (not source diagnostics).
#[derive(Debug, Clone, Error)]
pub enum OmError {
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Om infrastructure operations.
pub type OmResult<T> = Result<T, OmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_error_display_unknown_unit() {
        let err = UnitError::UnknownUnit {
            suffix: "furlong".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Unknown unit"));
        assert!(msg.contains("furlong"));
    }

    #[test]
    fn test_config_error_display_wrong_category() {
        let err = ConfigError::WrongCategory {
            rule_set: "medical".to_string(),
            field: "frequency_max".to_string(),
            expected: "frequency".to_string(),
            value: "10deg".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("medical"));
        assert!(msg.contains("frequency_max"));
        assert!(msg.contains("10deg"));
    }

    #[test]
    fn test_om_error_from_variants() {
        let unit = OmError::from(UnitError::Malformed {
            input: "x".to_string(),
        });
        assert!(matches!(unit, OmError::Unit(_)));

        let config = OmError::from(ConfigError::Parse {
            reason: "eof".to_string(),
        });
        assert!(matches!(config, OmError::Config(_)));
    }
}
