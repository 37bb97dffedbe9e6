//! Context rule-sets
//!
//! A statement annotated `@context("name")` is held to the limits of the
//! rule-set configured under that name. Each expression path is judged by
//! its outermost folded quantity, so `60kHz + 50kHz` is checked as 110kHz.

use super::SemanticError;
use crate::parser::ast::{Expr, ExprKind};
use crate::types::{Ty, Value, WaveType};
use om_core::{Quantity, RuleSet, SourceLocation, UnitCategory};

/// One active rule-set and the context name it was selected by.
#[derive(Debug, Clone, Copy)]
pub struct RuleCheck<'a> {
    context: &'a str,
    rules: &'a RuleSet,
}

impl<'a> RuleCheck<'a> {
    pub fn new(context: &'a str, rules: &'a RuleSet) -> Self {
        Self { context, rules }
    }

    pub fn context(&self) -> &'a str {
        self.context
    }

    /// Check `expr` and everything beneath it.
    pub fn check_expr(&self, expr: &Expr, out: &mut Vec<SemanticError>) {
        if let Some(Value::Quantity(q)) = &expr.value {
            self.check_quantity(*q, expr.location, out);
            return;
        }

        if let Ty::Wave(wave) = &expr.ty {
            let referenced = matches!(expr.kind, ExprKind::Identifier { .. });
            self.check_wave(wave, referenced, expr.location, out);
        }

        for child in expr.children() {
            self.check_expr(child, out);
        }
    }

    /// Amplitude of every wave. Frequency only for waves referenced by name;
    /// constructed waves have their frequency literal checked directly.
    fn check_wave(
        &self,
        wave: &WaveType,
        referenced: bool,
        location: SourceLocation,
        out: &mut Vec<SemanticError>,
    ) {
        if let (Some(amplitude), Some(max)) = (wave.amplitude, self.rules.amplitude_max) {
            if amplitude > max {
                out.push(self.violation(
                    "amplitude_max",
                    format!("amplitude {} exceeds {}", amplitude, max),
                    location,
                ));
            }
        }
        if referenced {
            if let Some(frequency) = wave.frequency {
                self.check_quantity(frequency, location, out);
            }
        }
    }

    fn check_quantity(&self, q: Quantity, location: SourceLocation, out: &mut Vec<SemanticError>) {
        let limits = match q.category() {
            UnitCategory::Frequency => vec![
                ("frequency_min", self.rules.frequency_min, Bound::Min),
                ("frequency_max", self.rules.frequency_max, Bound::Max),
            ],
            UnitCategory::Power => vec![("power_max", self.rules.power_max, Bound::Max)],
            UnitCategory::Time => vec![("duration_max", self.rules.duration_max, Bound::Max)],
            UnitCategory::Phase => return,
        };

        for (rule, limit, bound) in limits {
            let Some(limit) = limit else { continue };
            let violated = match bound {
                Bound::Min => q.base_value() < limit.base_value(),
                Bound::Max => q.base_value() > limit.base_value(),
            };
            if violated {
                let relation = match bound {
                    Bound::Min => "is below",
                    Bound::Max => "exceeds",
                };
                out.push(self.violation(
                    rule,
                    format!("{} {} {} {}", q.category(), q, relation, limit),
                    location,
                ));
            }
        }
    }

    fn violation(&self, rule: &str, detail: String, location: SourceLocation) -> SemanticError {
        SemanticError::RuleViolation {
            context: self.context.to_string(),
            rule: rule.to_string(),
            detail,
            location,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Min,
    Max,
}

#[cfg(test)]
mod tests {
    use super::*;
    use om_core::{FrequencyUnit, PhysicalUnit, PowerUnit};

    fn hz(value: f64) -> Quantity {
        Quantity::new(value, PhysicalUnit::Frequency(FrequencyUnit::Hertz))
    }

    fn medical() -> RuleSet {
        let khz = PhysicalUnit::Frequency(FrequencyUnit::Kilohertz);
        let mw = PhysicalUnit::Power(PowerUnit::Milliwatts);
        RuleSet::default()
            .with_frequency_range(hz(1.0), Quantity::new(100.0, khz))
            .with_amplitude_max(0.6)
            .with_power_max(Quantity::new(500.0, mw))
    }

    fn literal(q: Quantity) -> Expr {
        let mut expr = Expr::new(
            ExprKind::Number {
                value: q.value,
                unit: Some(q.unit),
            },
            SourceLocation::default(),
        );
        expr.ty = Ty::of_unit(q.unit);
        expr.value = Some(Value::Quantity(q));
        expr
    }

    #[test]
    fn test_frequency_bounds() {
        let rules = medical();
        let check = RuleCheck::new("medical", &rules);
        let mut out = Vec::new();

        check.check_expr(&literal(hz(50.0)), &mut out);
        assert!(out.is_empty());

        check.check_expr(&literal(hz(0.5)), &mut out);
        check.check_expr(&literal(hz(200_000.0)), &mut out);
        assert_eq!(out.len(), 2);
        assert!(out[0].to_string().contains("frequency_min"));
        assert!(out[1].to_string().contains("frequency_max"));
    }

    #[test]
    fn test_power_limit_converts_units() {
        let rules = medical();
        let check = RuleCheck::new("medical", &rules);
        let mut out = Vec::new();
        check.check_expr(
            &literal(Quantity::new(1.0, PhysicalUnit::Power(PowerUnit::Watts))),
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind_name(), "RuleViolation");
    }

    #[test]
    fn test_unset_limits_are_not_checked() {
        let rules = RuleSet::default();
        let check = RuleCheck::new("lab", &rules);
        let mut out = Vec::new();
        check.check_expr(&literal(hz(1e9)), &mut out);
        assert!(out.is_empty());
    }
}
