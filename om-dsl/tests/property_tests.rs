//! Property-Based Tests for the Om Front-End
//!
//! Properties:
//! - A unit literal lexes to exactly one token whose text is the literal
//! - Converting A → B → A within a category recovers the value (1e-9)
//! - Generated well-typed programs compile with zero diagnostics
//! - Pretty-printing is a fixed point after one pass
//! - Arbitrary input never panics and diagnostics stay inside the source

use om_core::{convert, RuleSetConfig};
use om_dsl::lexer::{Lexer, TokenKind};
use om_dsl::{compile_unit, parse, pretty_print, round_trip};
use om_test_utils::assertions::assert_locations_in_bounds;
use om_test_utils::generators::*;
use proptest::prelude::*;

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: a number with a known unit is one token that re-serializes
    /// byte-for-byte.
    #[test]
    fn prop_unit_literal_is_one_token((literal, quantity) in arb_unit_literal()) {
        let stream = Lexer::new(&literal).tokenize().expect("unit literal lexes");

        prop_assert_eq!(stream.tokens.len(), 2);
        prop_assert_eq!(&stream.tokens[1].kind, &TokenKind::Eof);
        let token = &stream.tokens[0];
        prop_assert_eq!(&token.kind, &TokenKind::Number(quantity.value));
        prop_assert_eq!(token.unit, Some(quantity.unit));
        prop_assert_eq!(&token.text, &literal);
        prop_assert!(stream.warnings.is_empty());
    }

    /// Property: same-category conversion is invertible within 1e-9.
    #[test]
    fn prop_conversion_round_trips(
        (category, value) in (arb_unit_category(), arb_magnitude()),
        picks in (0usize..4, 0usize..4),
    ) {
        let units = category.units();
        let a = units[picks.0 % units.len()];
        let b = units[picks.1 % units.len()];

        let there = convert(value, a, b).expect("same category");
        let back = convert(there, b, a).expect("same category");
        prop_assert!(
            (back - value).abs() <= 1e-9 * value.abs().max(1.0),
            "{} {} -> {} {} -> {} {}", value, a, there, b, back, a
        );
    }

    /// Property: generated wave programs compile cleanly.
    #[test]
    fn prop_wave_programs_compile(source in arb_wave_program()) {
        let result = compile_unit(&source, &RuleSetConfig::new());
        prop_assert!(result.is_ok(), "{}\n{:?}", source, result.err());
    }

    /// Property: printing a parsed program is stable, and the printed
    /// source keeps every statement.
    #[test]
    fn prop_pretty_print_is_stable(source in arb_wave_program()) {
        let program = parse(&source).expect("generated source parses");
        let printed = pretty_print(&program);
        let reprinted = round_trip(&printed).expect("printed source parses");

        prop_assert_eq!(&printed, &reprinted);
        let reparsed = parse(&printed).expect("printed source parses");
        prop_assert_eq!(reparsed.statements.len(), program.statements.len());
    }

    /// Property: no input panics the front-end, and every diagnostic points
    /// inside the source.
    #[test]
    fn prop_noise_never_panics(source in arb_noise()) {
        if let Err(diagnostics) = compile_unit(&source, &RuleSetConfig::new()) {
            prop_assert!(!diagnostics.is_empty());
            assert_locations_in_bounds(&source, &diagnostics);
        }
    }
}
