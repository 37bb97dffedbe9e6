//! Om Test Utilities
//!
//! Centralized test infrastructure for the Om workspace:
//! - Proptest generators for units, quantities and Om source snippets
//! - Test fixtures for common programs and rule-sets
//! - Custom assertions for diagnostics and compile results

// Re-export core types for convenience
pub use om_core::{
    Diagnostic, FrequencyUnit, PhaseUnit, PhysicalUnit, PowerUnit, Quantity, RuleSet,
    RuleSetConfig, Severity, SourceLocation, Stage, TimeUnit, UnitCategory,
};
pub use om_dsl::{CompileOutcome, ValidatedAst};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Om values and source text.

    use super::*;
    use om_dsl::checker::Builtin;
    use om_dsl::lexer::TokenKind;
    use proptest::prelude::*;

    // === Unit Generators ===

    pub fn arb_unit_category() -> impl Strategy<Value = UnitCategory> {
        prop_oneof![
            Just(UnitCategory::Frequency),
            Just(UnitCategory::Phase),
            Just(UnitCategory::Time),
            Just(UnitCategory::Power),
        ]
    }

    /// Any canonical unit.
    pub fn arb_physical_unit() -> impl Strategy<Value = PhysicalUnit> {
        arb_unit_category().prop_flat_map(|category| {
            let units = category.units();
            (0..units.len()).prop_map(move |i| units[i])
        })
    }

    pub fn arb_unit_of(category: UnitCategory) -> impl Strategy<Value = PhysicalUnit> {
        let units = category.units();
        (0..units.len()).prop_map(move |i| units[i])
    }

    /// Non-negative magnitudes with up to three decimals.
    pub fn arb_magnitude() -> impl Strategy<Value = f64> {
        (0u32..100_000, 0u32..1000).prop_map(|(whole, frac)| whole as f64 + frac as f64 / 1000.0)
    }

    pub fn arb_quantity() -> impl Strategy<Value = Quantity> {
        (arb_magnitude(), arb_physical_unit()).prop_map(|(value, unit)| Quantity::new(value, unit))
    }

    pub fn arb_quantity_of(category: UnitCategory) -> impl Strategy<Value = Quantity> {
        (arb_magnitude(), arb_unit_of(category)).prop_map(|(value, unit)| Quantity::new(value, unit))
    }

    /// A literal as written in source, paired with the quantity it denotes.
    pub fn arb_unit_literal() -> impl Strategy<Value = (String, Quantity)> {
        arb_quantity().prop_map(|q| (format!("{}{}", q.value, q.unit), q))
    }

    /// Amplitudes accepted by every wave, `0.0..=1.0` in hundredths.
    pub fn arb_amplitude() -> impl Strategy<Value = f64> {
        (0u32..=100).prop_map(|n| n as f64 / 100.0)
    }

    // === Source Generators ===

    /// Lower-case identifiers that are neither keywords nor built-in stages.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,8}".prop_filter("keywords and built-ins are reserved", |name| {
            TokenKind::keyword(name).is_none() && Builtin::lookup(name).is_none()
        })
    }

    /// `wave(...)` construction with a unit on every component.
    pub fn arb_wave_expression() -> impl Strategy<Value = String> {
        (
            arb_quantity_of(UnitCategory::Frequency),
            arb_quantity_of(UnitCategory::Phase),
            arb_amplitude(),
        )
            .prop_map(|(frequency, phase, amplitude)| {
                format!("wave({}, {}, {})", frequency, phase, amplitude)
            })
    }

    /// A pipe chain starting at a wave and applying one to three stages.
    pub fn arb_pipe_chain() -> impl Strategy<Value = String> {
        let stage = prop_oneof![
            arb_quantity_of(UnitCategory::Frequency).prop_map(|q| format!("frequency({})", q)),
            arb_quantity_of(UnitCategory::Phase).prop_map(|q| format!("phase({})", q)),
            arb_amplitude().prop_map(|a| format!("amplitude({})", a)),
        ];
        (
            arb_quantity_of(UnitCategory::Frequency),
            prop::collection::vec(stage, 1..=3),
        )
            .prop_map(|(frequency, stages)| {
                format!("wave({}) | {}", frequency, stages.join(" | "))
            })
    }

    /// A well-formed, well-typed program of distinct wave bindings.
    pub fn arb_wave_program() -> impl Strategy<Value = String> {
        prop::collection::btree_set(arb_identifier(), 1..6).prop_flat_map(|names| {
            let count = names.len();
            let values = prop::collection::vec(
                prop_oneof![arb_wave_expression(), arb_pipe_chain()],
                count,
            );
            (Just(names), values).prop_map(|(names, values)| {
                names
                    .iter()
                    .zip(values)
                    .map(|(name, value)| format!("const {}~ = {};\n", name, value))
                    .collect::<String>()
            })
        })
    }

    /// Arbitrary printable input, for lexer robustness checks.
    pub fn arb_noise() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                Just("const".to_string()),
                Just("wave(".to_string()),
                Just("Hz".to_string()),
                Just("~".to_string()),
                Just("|".to_string()),
                Just("<".to_string()),
                Just("\"".to_string()),
                Just("/*".to_string()),
                "[ -~]{1,4}",
            ],
            0..24,
        )
        .prop_map(|parts| parts.concat())
    }

    pub fn arb_rule_set() -> impl Strategy<Value = RuleSet> {
        (1u32..1000, 1u32..1000, arb_amplitude()).prop_map(|(min, span, amplitude)| {
            let hz = |v: u32| Quantity::new(v as f64, PhysicalUnit::Frequency(FrequencyUnit::Hertz));
            RuleSet::default()
                .with_frequency_range(hz(min), hz(min + span))
                .with_amplitude_max(amplitude)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built programs and rule-sets for common testing scenarios.

    use super::*;

    /// The carrier from the language tour.
    pub const CARRIER: &str = "const carrier~ = wave(41.5kHz) | phase(45deg) | amplitude(0.8);";

    /// Exercises every declaration form.
    pub const THERAPY_SESSION: &str = r#"
/** Carrier for the therapy session. */
@context("medical")
const carrier~ = wave(41.5kHz) | phase(45deg) | amplitude(0.5);
const modulator~: Wave = wave(frequency: 440Hz, amplitude: 0.3);
let band = 20Hz..20kHz;

type Carrier = Wave;

pattern chord: parallel = [carrier~, modulator~];
pattern grid: matrix(2, 1) = [carrier~, modulator~];

field room(2) {
    dimensions: <8, 8>,
    waves: chord,
    boundary: periodic,
    interference: constructive
}

fn detune(w: Carrier, by: Frequency) -> Wave {
    return w | frequency(w.frequency + by);
}

async fn settle(w: Wave) -> Wave {
    try {
        return w | amplitude(0.1);
    } catch e {
        return w;
    }
}
"#;

    /// A literal phase with no unit.
    pub const MISSING_UNIT: &str = "const w = wave(440Hz) | phase(45);";

    /// Two malformed statements followed by a valid one.
    pub const TWO_SYNTAX_ERRORS: &str = "const a = ;\nlet = 3;\nconst b~ = wave(1Hz);\n";

    /// Medical-grade limits: 1Hz..100kHz, amplitude 0.6, 500mW, 30min.
    pub fn medical_rules() -> RuleSetConfig {
        RuleSetConfig::new().with_rule_set(
            "medical",
            RuleSet::default()
                .with_frequency_range(
                    Quantity::new(1.0, PhysicalUnit::Frequency(FrequencyUnit::Hertz)),
                    Quantity::new(100.0, PhysicalUnit::Frequency(FrequencyUnit::Kilohertz)),
                )
                .with_amplitude_max(0.6)
                .with_power_max(Quantity::new(500.0, PhysicalUnit::Power(PowerUnit::Milliwatts)))
                .with_duration_max(Quantity::new(30.0, PhysicalUnit::Time(TimeUnit::Minutes))),
        )
    }

    pub const MEDICAL_RULES_TOML: &str = r#"
[rule_sets.medical]
frequency_min = "1Hz"
frequency_max = "100kHz"
amplitude_max = 0.6
power_max = "500mW"
duration_max = "30min"
"#;
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for Om-specific validation.

    use super::*;

    /// Assert that compilation succeeded and return the AST.
    #[track_caller]
    pub fn assert_compiles(result: &Result<ValidatedAst, Vec<Diagnostic>>) -> &ValidatedAst {
        match result {
            Ok(ast) => ast,
            Err(diagnostics) => {
                let rendered: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
                panic!("Expected success, got:\n{}", rendered.join("\n"))
            }
        }
    }

    /// Assert that compilation failed and return its diagnostics.
    #[track_caller]
    pub fn assert_rejected(result: &Result<ValidatedAst, Vec<Diagnostic>>) -> &[Diagnostic] {
        match result {
            Ok(ast) => panic!("Expected failure, got program: {:?}", ast.program),
            Err(diagnostics) => diagnostics,
        }
    }

    /// Assert that some diagnostic has the given kind and return it.
    #[track_caller]
    pub fn assert_has_kind<'a>(diagnostics: &'a [Diagnostic], kind: &str) -> &'a Diagnostic {
        match diagnostics.iter().find(|d| d.kind == kind) {
            Some(d) => d,
            None => panic!(
                "Expected a {} diagnostic, got kinds: {:?}",
                kind,
                diagnostics.iter().map(|d| d.kind.as_str()).collect::<Vec<_>>()
            ),
        }
    }

    /// Assert that every diagnostic points inside `source`.
    #[track_caller]
    pub fn assert_locations_in_bounds(source: &str, diagnostics: &[Diagnostic]) {
        let lines = source.lines().count().max(1);
        for d in diagnostics {
            assert!(
                d.location.offset <= source.len(),
                "Offset {} past end of {}-byte source: {}",
                d.location.offset,
                source.len(),
                d
            );
            assert!(
                d.location.line >= 1 && d.location.line <= lines + 1,
                "Line {} outside 1..={}: {}",
                d.location.line,
                lines + 1,
                d
            );
            assert!(d.location.column >= 1, "Column must be 1-based: {}", d);
        }
    }

    /// Assert that a rule-set configuration is valid.
    #[track_caller]
    pub fn assert_rules_valid(config: &RuleSetConfig) {
        if let Err(e) = config.validate() {
            panic!("Rule-set validation failed: {:?}", e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_medical_rules_are_valid() {
        assertions::assert_rules_valid(&fixtures::medical_rules());
    }

    #[test]
    fn test_medical_toml_matches_builder() {
        let parsed = RuleSetConfig::from_toml_str(fixtures::MEDICAL_RULES_TOML).expect("parses");
        assert_eq!(parsed, fixtures::medical_rules());
    }

    #[test]
    fn test_therapy_session_compiles() {
        let result = om_dsl::compile_unit(fixtures::THERAPY_SESSION, &fixtures::medical_rules());
        let ast = assertions::assert_compiles(&result);
        assert!(ast.warnings.is_empty());
    }

    #[test]
    fn test_missing_unit_fixture_is_rejected() {
        let result = om_dsl::compile_unit(fixtures::MISSING_UNIT, &RuleSetConfig::new());
        let diagnostics = assertions::assert_rejected(&result);
        assertions::assert_has_kind(diagnostics, "MissingUnit");
    }

    proptest! {
        #[test]
        fn prop_identifiers_are_not_keywords(name in generators::arb_identifier()) {
            prop_assert!(om_dsl::lexer::TokenKind::keyword(&name).is_none());
        }

        #[test]
        fn prop_generated_units_have_their_category(q in generators::arb_quantity_of(UnitCategory::Phase)) {
            prop_assert_eq!(q.category(), UnitCategory::Phase);
        }

        #[test]
        fn prop_generated_rule_sets_are_valid(rules in generators::arb_rule_set()) {
            prop_assert!(rules.validate("generated").is_ok());
        }
    }
}
