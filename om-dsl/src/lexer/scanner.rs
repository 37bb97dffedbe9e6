//! Lexer implementation

use super::token::*;
use om_core::{PhysicalUnit, SourceLocation};
use std::iter::Peekable;
use std::str::CharIndices;

/// Lexer for Om source.
///
/// Produces a finite token sequence ending in `Eof`, or stops at the first
/// lexical error. Also usable as an iterator; [`Lexer::reset`] restarts it
/// from the beginning of the source.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    pos: usize,
    pending_doc: Option<String>,
    warnings: Vec<LexWarning>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            pos: 0,
            pending_doc: None,
            warnings: Vec::new(),
            finished: false,
        }
    }

    /// Rewind to the start of the source, discarding warnings.
    pub fn reset(&mut self) {
        *self = Lexer::new(self.source);
    }

    /// Warnings gathered so far.
    pub fn warnings(&self) -> &[LexWarning] {
        &self.warnings
    }

    /// Tokenize the entire source from the start.
    pub fn tokenize(&mut self) -> Result<TokenStream, LexError> {
        self.reset();
        let mut tokens = Vec::new();

        for token in self.by_ref() {
            tokens.push(token?);
        }

        tracing::trace!(
            tokens = tokens.len(),
            warnings = self.warnings.len(),
            "Lexed compilation unit"
        );

        Ok(TokenStream {
            tokens,
            warnings: std::mem::take(&mut self.warnings),
        })
    }

    /// Get the next token from the source.
    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments()?;

        let start_pos = self.pos;
        let location = self.location();

        let mut token = match self.peek_char() {
            None => Token::new(TokenKind::Eof, "", location),
            Some(c) => {
                let kind = match c {
                    '(' => self.single(TokenKind::LParen),
                    ')' => self.single(TokenKind::RParen),
                    '{' => self.single(TokenKind::LBrace),
                    '}' => self.single(TokenKind::RBrace),
                    '[' => self.single(TokenKind::LBracket),
                    ']' => self.single(TokenKind::RBracket),
                    '<' => self.single(TokenKind::LAngle),
                    '>' => self.single(TokenKind::RAngle),
                    ':' => self.single(TokenKind::Colon),
                    ';' => self.single(TokenKind::Semicolon),
                    ',' => self.single(TokenKind::Comma),
                    '|' => self.single(TokenKind::Pipe),
                    '+' => self.single(TokenKind::Plus),
                    '*' => self.single(TokenKind::Star),
                    '/' => self.single(TokenKind::Slash),
                    '=' => self.single(TokenKind::Assign),
                    '@' => self.single(TokenKind::At),

                    '.' => {
                        self.advance();
                        if self.peek_char() == Some('.') {
                            self.advance();
                            TokenKind::Range
                        } else {
                            TokenKind::Dot
                        }
                    }

                    '-' => {
                        self.advance();
                        if self.peek_char() == Some('>') {
                            self.advance();
                            TokenKind::Arrow
                        } else {
                            TokenKind::Minus
                        }
                    }

                    '"' => self.scan_string(location)?,

                    c if c.is_ascii_digit() => return self.scan_number(start_pos, location),

                    c if c.is_ascii_alphabetic() || c == '_' => {
                        return Ok(self.scan_identifier(start_pos, location))
                    }

                    c => {
                        return Err(LexError::InvalidCharacter {
                            character: c,
                            location,
                        })
                    }
                };
                Token::new(kind, &self.source[start_pos..self.pos], location)
            }
        };

        self.attach_doc(&mut token);
        Ok(token)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Scan an identifier or keyword, with an optional trailing wave marker.
    fn scan_identifier(&mut self, start: usize, location: SourceLocation) -> Token {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let word = &self.source[start..self.pos];
        let kind = TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.to_string()));

        let wave_marker = matches!(kind, TokenKind::Identifier(_)) && self.peek_char() == Some('~');
        if wave_marker {
            self.advance();
        }

        let mut token = Token::new(kind, &self.source[start..self.pos], location);
        token.wave_marker = wave_marker;
        self.attach_doc(&mut token);
        token
    }

    /// Scan a string literal with escape sequences.
    fn scan_string(&mut self, location: SourceLocation) -> Result<TokenKind, LexError> {
        self.advance(); // opening quote
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None => return Err(LexError::UnterminatedString { location }),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('\\') => {
                            self.advance();
                            value.push('\\');
                        }
                        Some('"') => {
                            self.advance();
                            value.push('"');
                        }
                        _ => value.push('\\'),
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(TokenKind::String(value))
    }

    /// Scan a number literal and its optional unit suffix.
    fn scan_number(&mut self, start: usize, location: SourceLocation) -> Result<Token, LexError> {
        self.consume_digits();

        // `1..5` is a range, not a malformed decimal.
        if self.peek_char() == Some('.')
            && self.peek_next_char().map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            self.advance();
            self.consume_digits();
        }

        let number_end = self.pos;
        let suffix_location = self.location();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphabetic() {
                self.advance();
            } else {
                break;
            }
        }

        let number_text = &self.source[start..number_end];
        // Digits with at most one interior '.' always parse.
        let value: f64 = number_text.parse().unwrap_or_default();
        if !value.is_finite() {
            return Err(LexError::NumberOutOfRange {
                text: number_text.to_string(),
                location,
            });
        }
        let mut token = Token::new(
            TokenKind::Number(value),
            &self.source[start..self.pos],
            location,
        );

        let suffix = &self.source[number_end..self.pos];
        if !suffix.is_empty() {
            let found =
                PhysicalUnit::lookup_suffix(suffix).ok_or_else(|| LexError::UnknownUnit {
                    suffix: suffix.to_string(),
                    location: suffix_location,
                })?;
            if found.deprecated {
                tracing::debug!(spelling = suffix, canonical = found.unit.symbol(), "Deprecated unit spelling");
                self.warnings.push(LexWarning::DeprecatedUnit {
                    spelling: suffix.to_string(),
                    canonical: found.unit,
                    location: suffix_location,
                });
            }
            token.unit = Some(found.unit);
        }

        self.attach_doc(&mut token);
        Ok(token)
    }

    fn consume_digits(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Hand a pending doc comment to a declaration token; any other token
    /// discards it.
    fn attach_doc(&mut self, token: &mut Token) {
        if let Some(doc) = self.pending_doc.take() {
            if token.kind.starts_declaration() {
                token.doc = Some(doc);
            }
        }
    }

    /// Skip whitespace and comments, remembering the last doc comment.
    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => match self.peek_next_char() {
                    Some('/') => {
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => self.skip_block_comment()?,
                    _ => break,
                },
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let location = self.location();
        let start = self.pos;
        self.advance(); // /
        self.advance(); // *

        // `/**/` is an empty block comment, not a doc comment.
        let is_doc = self.peek_char() == Some('*') && self.peek_next_char() != Some('/');

        loop {
            match self.peek_char() {
                None => return Err(LexError::UnterminatedComment { location }),
                Some('*') if self.peek_next_char() == Some('/') => {
                    self.advance();
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }

        if is_doc {
            let body = &self.source[start + 3..self.pos - 2];
            self.pending_doc = Some(clean_doc(body));
        }
        Ok(())
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.pos)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.source[self.pos..].chars();
        iter.next();
        iter.next()
    }

    fn advance(&mut self) -> Option<char> {
        let (i, c) = self.chars.next()?;
        self.pos = i + c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        match &result {
            Ok(token) if token.kind == TokenKind::Eof => self.finished = true,
            Err(_) => self.finished = true,
            Ok(_) => {}
        }
        Some(result)
    }
}

/// Strip the leading `*` decoration from each doc comment line.
fn clean_doc(body: &str) -> String {
    body.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use om_core::{FrequencyUnit, PhaseUnit, TimeUnit};

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().unwrap().tokens
    }

    #[test]
    fn test_lexer_keywords() {
        let tokens = lex("const let pattern field type fn async try catch return wave");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Const,
                TokenKind::Let,
                TokenKind::Pattern,
                TokenKind::Field,
                TokenKind::Type,
                TokenKind::Fn,
                TokenKind::Async,
                TokenKind::Try,
                TokenKind::Catch,
                TokenKind::Return,
                TokenKind::Wave,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_operators() {
        let tokens = lex("| .. + - * / = -> @ . < >");
        assert!(matches!(tokens[0].kind, TokenKind::Pipe));
        assert!(matches!(tokens[1].kind, TokenKind::Range));
        assert!(matches!(tokens[2].kind, TokenKind::Plus));
        assert!(matches!(tokens[3].kind, TokenKind::Minus));
        assert!(matches!(tokens[4].kind, TokenKind::Star));
        assert!(matches!(tokens[5].kind, TokenKind::Slash));
        assert!(matches!(tokens[6].kind, TokenKind::Assign));
        assert!(matches!(tokens[7].kind, TokenKind::Arrow));
        assert!(matches!(tokens[8].kind, TokenKind::At));
        assert!(matches!(tokens[9].kind, TokenKind::Dot));
        assert!(matches!(tokens[10].kind, TokenKind::LAngle));
        assert!(matches!(tokens[11].kind, TokenKind::RAngle));
    }

    #[test]
    fn test_lexer_number_with_unit() {
        let tokens = lex("41.5kHz 45deg 250ms 0.8");
        assert_eq!(tokens[0].kind, TokenKind::Number(41.5));
        assert_eq!(
            tokens[0].unit,
            Some(PhysicalUnit::Frequency(FrequencyUnit::Kilohertz))
        );
        assert_eq!(tokens[0].text, "41.5kHz");
        assert_eq!(tokens[1].unit, Some(PhysicalUnit::Phase(PhaseUnit::Degrees)));
        assert_eq!(
            tokens[2].unit,
            Some(PhysicalUnit::Time(TimeUnit::Milliseconds))
        );
        assert_eq!(tokens[3].kind, TokenKind::Number(0.8));
        assert_eq!(tokens[3].unit, None);
    }

    #[test]
    fn test_lexer_unit_requires_adjacency() {
        // `440 Hz` is a number followed by an identifier.
        let tokens = lex("440 Hz");
        assert_eq!(tokens[0].unit, None);
        assert_eq!(tokens[1].kind, TokenKind::Identifier("Hz".to_string()));
    }

    #[test]
    fn test_lexer_unknown_unit() {
        let err = Lexer::new("let x = 10parsecs;").tokenize().unwrap_err();
        match err {
            LexError::UnknownUnit { suffix, location } => {
                assert_eq!(suffix, "parsecs");
                assert_eq!(location.column, 11);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_lexer_overflowing_number_rejected() {
        let digits = "9".repeat(400);
        let source = format!("const x = {}Hz;", digits);
        let err = Lexer::new(&source).tokenize().unwrap_err();
        match &err {
            LexError::NumberOutOfRange { text, location } => {
                assert_eq!(text, &digits);
                assert_eq!(location.column, 11);
            }
            other => panic!("expected NumberOutOfRange, got {:?}", other),
        }
        assert_eq!(err.to_diagnostic().kind, "NumberOutOfRange");

        let max = lex(&f64::MAX.to_string());
        assert_eq!(max[0].kind, TokenKind::Number(f64::MAX));
    }

    #[test]
    fn test_lexer_unknown_unit_suggests_case_fix() {
        let err = Lexer::new("10HZ").tokenize().unwrap_err();
        let diag = err.to_diagnostic();
        assert_eq!(diag.kind, "UnknownUnit");
        assert_eq!(diag.suggestions, vec!["Hz".to_string()]);
    }

    #[test]
    fn test_lexer_deprecated_unit_warns() {
        let stream = Lexer::new("10khz").tokenize().unwrap();
        assert_eq!(
            stream.tokens[0].unit,
            Some(PhysicalUnit::Frequency(FrequencyUnit::Kilohertz))
        );
        assert_eq!(stream.warnings.len(), 1);
        let diag = stream.warnings[0].to_diagnostic();
        assert!(!diag.is_error());
        assert_eq!(diag.suggestions, vec!["kHz".to_string()]);
    }

    #[test]
    fn test_lexer_range_is_not_decimal() {
        let tokens = lex("20Hz..20kHz 1..5");
        assert_eq!(tokens[0].text, "20Hz");
        assert!(matches!(tokens[1].kind, TokenKind::Range));
        assert_eq!(tokens[2].text, "20kHz");
        assert_eq!(tokens[3].kind, TokenKind::Number(1.0));
        assert!(matches!(tokens[4].kind, TokenKind::Range));
        assert_eq!(tokens[5].kind, TokenKind::Number(5.0));
    }

    #[test]
    fn test_lexer_wave_marker_is_attribute() {
        let tokens = lex("carrier~ carrier");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Identifier("carrier".to_string()));
        assert!(tokens[0].wave_marker);
        assert_eq!(tokens[0].text, "carrier~");
        assert!(!tokens[1].wave_marker);
    }

    #[test]
    fn test_lexer_stray_tilde_is_invalid() {
        let err = Lexer::new("let x = ~5;").tokenize().unwrap_err();
        assert!(matches!(
            err,
            LexError::InvalidCharacter { character: '~', .. }
        ));
    }

    #[test]
    fn test_lexer_quantum_operators_rejected() {
        let err = Lexer::new("a ⊗ b").tokenize().unwrap_err();
        assert!(matches!(err, LexError::InvalidCharacter { character: '⊗', .. }));
    }

    #[test]
    fn test_lexer_comments() {
        let tokens = lex("const // line comment\nlet /* block */ fn");
        assert!(matches!(tokens[0].kind, TokenKind::Const));
        assert!(matches!(tokens[1].kind, TokenKind::Let));
        assert!(matches!(tokens[2].kind, TokenKind::Fn));
        assert_eq!(tokens[1].location.line, 2);
    }

    #[test]
    fn test_lexer_unterminated_comment() {
        let err = Lexer::new("const x = 1; /* never closed").tokenize().unwrap_err();
        match err {
            LexError::UnterminatedComment { location } => assert_eq!(location.column, 14),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_lexer_doc_comment_attaches_to_declaration() {
        let tokens = lex("/**\n * Carrier wave\n */\nconst carrier~ = wave(40kHz);");
        assert!(matches!(tokens[0].kind, TokenKind::Const));
        assert_eq!(tokens[0].doc.as_deref(), Some("Carrier wave"));
    }

    #[test]
    fn test_lexer_doc_comment_dropped_before_expression() {
        let tokens = lex("/** not a declaration */ carrier;");
        assert_eq!(tokens[0].doc, None);
    }

    #[test]
    fn test_lexer_empty_block_comment_is_not_doc() {
        let tokens = lex("/**/ const x = 1;");
        assert_eq!(tokens[0].doc, None);
    }

    #[test]
    fn test_lexer_string_literals() {
        let tokens = lex(r#""medical" "line\nbreak""#);
        assert_eq!(tokens[0].kind, TokenKind::String("medical".to_string()));
        assert_eq!(tokens[1].kind, TokenKind::String("line\nbreak".to_string()));
    }

    #[test]
    fn test_lexer_is_restartable() {
        let mut lexer = Lexer::new("wave(1Hz)");
        let first: Vec<_> = lexer.by_ref().collect::<Result<_, _>>().unwrap();
        assert!(lexer.next().is_none());
        lexer.reset();
        let second: Vec<_> = lexer.collect::<Result<_, _>>().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.last().map(|t| t.kind.clone()), Some(TokenKind::Eof));
    }

    #[test]
    fn test_lexer_locations() {
        let tokens = lex("const x = 1;\n  let y = 2;");
        assert_eq!(tokens[5].location, SourceLocation::new(2, 3, 15));
    }
}
