//! Configuration types
//!
//! Rule-sets are opt-in safety checks selected by a declaration's
//! `@context("...")` annotation. A context with no configured rule-set gets
//! no extra checking.

use crate::error::ConfigError;
use crate::units::{Quantity, UnitCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// RULE SETS
// ============================================================================

/// Limits applied to every wave and quantity inside a matching declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_min: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_max: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_max: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_max: Option<Quantity>,
}

impl RuleSet {
    pub fn with_frequency_range(mut self, min: Quantity, max: Quantity) -> Self {
        self.frequency_min = Some(min);
        self.frequency_max = Some(max);
        self
    }

    pub fn with_amplitude_max(mut self, max: f64) -> Self {
        self.amplitude_max = Some(max);
        self
    }

    pub fn with_power_max(mut self, max: Quantity) -> Self {
        self.power_max = Some(max);
        self
    }

    pub fn with_duration_max(mut self, max: Quantity) -> Self {
        self.duration_max = Some(max);
        self
    }

    /// Validate one rule-set.
    ///
    /// Validates:
    /// - each quantity limit has the category its field names
    /// - amplitude_max in [0.0, 1.0]
    /// - frequency_min <= frequency_max
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let limits = [
            ("frequency_min", self.frequency_min, UnitCategory::Frequency),
            ("frequency_max", self.frequency_max, UnitCategory::Frequency),
            ("power_max", self.power_max, UnitCategory::Power),
            ("duration_max", self.duration_max, UnitCategory::Time),
        ];

        for (field, limit, expected) in limits {
            if let Some(q) = limit {
                if q.category() != expected {
                    return Err(ConfigError::WrongCategory {
                        rule_set: name.to_string(),
                        field: field.to_string(),
                        expected: expected.to_string(),
                        value: q.to_string(),
                    });
                }
            }
        }

        if let Some(max) = self.amplitude_max {
            if !(0.0..=1.0).contains(&max) {
                return Err(ConfigError::InvalidValue {
                    field: format!("rule_sets.{}.amplitude_max", name),
                    value: max.to_string(),
                    reason: "amplitude_max must be between 0.0 and 1.0".to_string(),
                });
            }
        }

        if let (Some(min), Some(max)) = (self.frequency_min, self.frequency_max) {
            if min.base_value() > max.base_value() {
                return Err(ConfigError::InvalidValue {
                    field: format!("rule_sets.{}.frequency_min", name),
                    value: min.to_string(),
                    reason: format!("frequency_min must not exceed frequency_max ({})", max),
                });
            }
        }

        Ok(())
    }
}

/// Named rule-sets available to the semantic validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSetConfig {
    #[serde(default)]
    pub rule_sets: BTreeMap<String, RuleSet>,
}

impl RuleSetConfig {
    /// A configuration with no rule-sets: only the built-in checks apply.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule_set(mut self, name: impl Into<String>, rule_set: RuleSet) -> Self {
        self.rule_sets.insert(name.into(), rule_set);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RuleSet> {
        self.rule_sets.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }

    /// Parse and validate a TOML document of the form
    ///
    /// ```toml
    /// [rule_sets.medical]
    /// frequency_min = "1Hz"
    /// frequency_max = "100kHz"
    /// amplitude_max = 0.6
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: RuleSetConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        tracing::debug!(
            rule_sets = config.rule_sets.len(),
            "Loaded rule-set configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, rule_set) in &self.rule_sets {
            rule_set.validate(name)?;
        }
        Ok(())
    }
}

// ============================================================================
// FRONT-END OPTIONS
// ============================================================================

/// Driver options that do not change language semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontEndOptions {
    /// Upper bound on diagnostics returned per unit; 0 means unlimited.
    pub max_diagnostics: usize,
}

impl Default for FrontEndOptions {
    fn default() -> Self {
        Self {
            max_diagnostics: 256,
        }
    }
}

impl FrontEndOptions {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `OM_MAX_DIAGNOSTICS`: diagnostics cap per unit (default: 256, 0 = unlimited)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_diagnostics: std::env::var("OM_MAX_DIAGNOSTICS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_diagnostics),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
