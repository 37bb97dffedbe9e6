//! Fuzz test for the full Om front-end
//!
//! Runs lexer → parser → checker → validator on arbitrary UTF-8 looking for:
//! - Panics or crashes
//! - Diagnostics that point outside the input
//! - Successful compiles whose pretty-printed form no longer parses
//!
//! Run with: cargo +nightly fuzz run front_end_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use om_core::RuleSetConfig;
use om_dsl::{compile_unit, parse, pretty_print};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let rules = RuleSetConfig::new();
        match compile_unit(input, &rules) {
            Ok(ast) => {
                assert!(
                    ast.warnings.iter().all(|d| !d.is_error()),
                    "Successful compile should carry warnings only"
                );
                let printed = pretty_print(&ast.program);
                assert!(parse(&printed).is_ok(), "Printed program should parse");
            }
            Err(diagnostics) => {
                assert!(!diagnostics.is_empty(), "Failure should carry diagnostics");
                for d in &diagnostics {
                    assert!(d.location.line >= 1, "Error line should be >= 1");
                    assert!(d.location.column >= 1, "Error column should be >= 1");
                    assert!(d.location.offset <= input.len(), "Error offset past end of input");
                    assert!(!d.message.is_empty(), "Error message should not be empty");
                }
            }
        }
    }
});
