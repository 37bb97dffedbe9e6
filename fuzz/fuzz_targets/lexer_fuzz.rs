//! Fuzz test for the Om lexer
//!
//! Feeds arbitrary UTF-8 to the lexer looking for:
//! - Panics or crashes
//! - Infinite loops
//! - Token locations outside the input
//!
//! Run with: cargo +nightly fuzz run lexer_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use om_dsl::lexer::{Lexer, TokenKind};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        match Lexer::new(input).tokenize() {
            Ok(stream) => {
                // The stream always ends with exactly one Eof
                assert_eq!(
                    stream.tokens.last().map(|t| &t.kind),
                    Some(&TokenKind::Eof),
                    "Last token should always be Eof"
                );

                let mut previous = 0;
                for token in &stream.tokens {
                    let location = token.location;
                    assert!(location.line >= 1, "Line numbers should be >= 1");
                    assert!(location.column >= 1, "Column numbers should be >= 1");
                    assert!(location.offset <= input.len(), "Offset past end of input");
                    assert!(location.offset >= previous, "Tokens should be in source order");
                    previous = location.offset;
                }
            }
            Err(err) => {
                let location = err.location();
                assert!(location.line >= 1, "Error line should be >= 1");
                assert!(location.offset <= input.len(), "Error offset past end of input");
            }
        }
    }
});
