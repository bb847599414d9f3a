//! Rule-file parser.
//!
//! Grammar (top level is a non-empty, semicolon-terminated rule list):
//!
//! ```text
//! start      := rule ';' | start rule ';'
//! rule       := 'if' condition 'then' action
//! condition  := comparison
//!             | condition 'and' condition
//!             | condition 'or' condition
//!             | 'not' condition
//!             | '(' condition ')'
//! comparison := IDENT '~' STRING | IDENT '=' STRING
//! action     := 'move' STRING
//!             | 'flag' [STRING]
//!             | 'unflag' [STRING]
//!             | 'stream' [CONTENTKIND] STRING [STRING]
//! ```
//!
//! `not` binds tighter than `and`/`or`. `and` and `or` share one precedence
//! level and associate left, so `a or b and c` groups as `(a or b) and c` —
//! deliberately flat, not C-like precedence.
//!
//! Semantic actions run during the parse: regexes compile immediately and
//! field names are validated, so the result is either a complete rule list
//! or no rules at all.

use std::mem;
use std::time::Duration;

use regex::Regex;

use crate::delivery::{DEFAULT_STREAM_TIMEOUT, Deliverer, StreamContent};
use crate::error::ParseError;
use crate::mailbox::FLAGGED;
use crate::parse::lexer::{Lexer, Token, TokenKind};
use crate::rules::{Field, Predicate, Rule, StringMatcher};

/// Knobs applied while constructing rules during the parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Flag used by `flag`/`unflag` actions that name none.
    pub default_flag: String,
    /// Per-message deadline handed to stream deliverers.
    pub stream_timeout: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            default_flag: FLAGGED.to_string(),
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

/// Parse a complete rule file. All-or-nothing: any lexical, grammatical,
/// or semantic error aborts and no rules are returned.
pub fn parse(input: &str, opts: &ParseOptions) -> Result<Vec<Rule>, ParseError> {
    Parser::new(input, opts)?.rule_list()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    /// Lookahead token, comments already skipped.
    tok: Token,
    opts: ParseOptions,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, opts: &ParseOptions) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let tok = next_significant(&mut lexer)?;
        Ok(Self {
            lexer,
            tok,
            opts: opts.clone(),
        })
    }

    fn rule_list(&mut self) -> Result<Vec<Rule>, ParseError> {
        let mut rules = Vec::new();
        loop {
            rules.push(self.rule()?);
            self.expect(TokenKind::Semi, "expected ';' after rule")?;
            if self.tok.kind == TokenKind::Eof {
                return Ok(rules);
            }
        }
    }

    fn rule(&mut self) -> Result<Rule, ParseError> {
        self.expect(TokenKind::If, "expected 'if'")?;
        let predicate = self.condition()?;
        self.expect(TokenKind::Then, "expected 'then'")?;
        self.action(predicate)
    }

    /// Flat left-associative binary chain: `and` and `or` share one
    /// precedence level.
    fn condition(&mut self) -> Result<Predicate, ParseError> {
        let mut left = self.unary()?;
        loop {
            match self.tok.kind {
                TokenKind::And => {
                    self.bump()?;
                    let right = self.unary()?;
                    left = Predicate::And(Box::new(left), Box::new(right));
                }
                TokenKind::Or => {
                    self.bump()?;
                    let right = self.unary()?;
                    left = Predicate::Or(Box::new(left), Box::new(right));
                }
                _ => return Ok(left),
            }
        }
    }

    /// `not` (right-associative, binds tighter than `and`/`or`),
    /// parenthesized condition, or comparison.
    fn unary(&mut self) -> Result<Predicate, ParseError> {
        match self.tok.kind {
            TokenKind::Not => {
                self.bump()?;
                Ok(Predicate::Not(Box::new(self.unary()?)))
            }
            TokenKind::LParen => {
                self.bump()?;
                let inner = self.condition()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                Ok(inner)
            }
            TokenKind::Ident => self.comparison(),
            _ => Err(self.syntax("expected a condition")),
        }
    }

    fn comparison(&mut self) -> Result<Predicate, ParseError> {
        let field_tok = self.expect(TokenKind::Ident, "expected field name")?;
        let field = Field::from_name(&field_tok.text)?;
        match self.tok.kind {
            TokenKind::Tilde => {
                self.bump()?;
                let pattern = self.string()?;
                let regex = Regex::new(&pattern).map_err(|source| ParseError::Regex {
                    pattern,
                    source,
                })?;
                Ok(Predicate::Field {
                    field,
                    matcher: StringMatcher::Regex(regex),
                })
            }
            TokenKind::Equals => {
                self.bump()?;
                let literal = self.string()?;
                Ok(Predicate::Field {
                    field,
                    matcher: StringMatcher::Equals(literal),
                })
            }
            _ => Err(self.syntax("expected '~' or '=' after field name")),
        }
    }

    fn action(&mut self, predicate: Predicate) -> Result<Rule, ParseError> {
        match self.tok.kind {
            TokenKind::Move => {
                self.bump()?;
                let mailbox = self.string()?;
                Ok(Rule::new_move(predicate, mailbox))
            }
            TokenKind::Flag => {
                self.bump()?;
                let flag = self.optional_string()?;
                Ok(Rule::new_flag(predicate, flag, &self.opts.default_flag))
            }
            TokenKind::Unflag => {
                self.bump()?;
                let flag = self.optional_string()?;
                Ok(Rule::new_unflag(predicate, flag, &self.opts.default_flag))
            }
            TokenKind::Stream => {
                self.bump()?;
                let content = if self.tok.kind == TokenKind::Ident {
                    let tok = self.bump()?;
                    StreamContent::from_name(&tok.text).ok_or_else(|| ParseError::Syntax {
                        message: format!("unknown stream content kind '{}'", tok.text),
                        pos: tok.pos,
                    })?
                } else {
                    StreamContent::Rfc822
                };
                let target = self.string()?;
                let secondary = self.optional_string()?;
                Ok(Rule::new_stream(
                    predicate,
                    content,
                    target,
                    secondary,
                    Deliverer::new(self.opts.stream_timeout),
                ))
            }
            _ => Err(self.syntax("expected 'move', 'flag', 'unflag' or 'stream'")),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        let tok = self.expect(TokenKind::Quote, "expected a quoted string")?;
        Ok(unquote(&tok.text))
    }

    fn optional_string(&mut self) -> Result<Option<String>, ParseError> {
        if self.tok.kind == TokenKind::Quote {
            let tok = self.bump()?;
            Ok(Some(unquote(&tok.text)))
        } else {
            Ok(None)
        }
    }

    /// Consume the lookahead, returning it, and pull in the next
    /// significant token.
    fn bump(&mut self) -> Result<Token, ParseError> {
        let next = next_significant(&mut self.lexer)?;
        Ok(mem::replace(&mut self.tok, next))
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.tok.kind == kind {
            self.bump()
        } else {
            Err(self.syntax(message))
        }
    }

    fn syntax(&self, message: &str) -> ParseError {
        ParseError::Syntax {
            message: message.to_string(),
            pos: self.tok.pos,
        }
    }
}

/// Next token that the grammar cares about: comments are skipped, lexing
/// errors abort the parse.
fn next_significant(lexer: &mut Lexer) -> Result<Token, ParseError> {
    loop {
        let tok = lexer.next_token();
        match tok.kind {
            TokenKind::Comment => continue,
            TokenKind::Error => return Err(ParseError::Lex { pos: tok.pos }),
            _ => return Ok(tok),
        }
    }
}

/// Strip the surrounding quotes from a string token and resolve the two
/// legal escapes.
fn unquote(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Vec<Rule> {
        parse(input, &ParseOptions::default()).expect("parse should succeed")
    }

    fn render(rules: &[Rule]) -> Vec<String> {
        rules.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn parses_a_move_rule() {
        let rules = parse_ok(r#"if from = "a@example.com" then move "Archive";"#);
        assert_eq!(
            render(&rules),
            vec![r#"if from = "a@example.com" then move "Archive""#]
        );
    }

    #[test]
    fn parses_multiple_rules_in_order() {
        let rules = parse_ok(
            r#"
            if from = "a@example.com" then move "Archive";
            if subject ~ "^Deal" then flag "Promo";
            "#,
        );
        assert_eq!(
            render(&rules),
            vec![
                r#"if from = "a@example.com" then move "Archive""#,
                r#"if subject ~ "^Deal" then flag "Promo""#,
            ]
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let input = r#"
            // promo sweep
            if subject ~ "^Deal" and not from = "boss@corp.com" then flag;
            if to ~ "@example.com$" then stream html "http://sink.example/h";
            "#;
        let first = render(&parse_ok(input));
        let second = render(&parse_ok(input));
        assert_eq!(first, second);
    }

    #[test]
    fn and_or_share_one_precedence_level_and_left_associate() {
        let rules = parse_ok(r#"if to = "x" or to = "y" and to = "z" then flag;"#);
        // (x or y) and z — flat binary chain, not C-like precedence.
        assert_eq!(
            render(&rules),
            vec![r#"if ((to = "x") or (to = "y")) and (to = "z") then flag "\Flagged""#]
        );
    }

    #[test]
    fn not_binds_tighter_than_and() {
        let rules = parse_ok(r#"if not to = "x" and to = "y" then flag;"#);
        assert_eq!(
            render(&rules),
            vec![r#"if (not (to = "x")) and (to = "y") then flag "\Flagged""#]
        );
    }

    #[test]
    fn parentheses_override_grouping() {
        let rules = parse_ok(r#"if to = "x" or (to = "y" and to = "z") then flag;"#);
        assert_eq!(
            render(&rules),
            vec![r#"if (to = "x") or ((to = "y") and (to = "z")) then flag "\Flagged""#]
        );
    }

    #[test]
    fn not_is_right_associative() {
        let rules = parse_ok(r#"if not not subject = "x" then flag;"#);
        assert_eq!(
            render(&rules),
            vec![r#"if not (not (subject = "x")) then flag "\Flagged""#]
        );
    }

    #[test]
    fn flag_and_unflag_default_to_the_configured_flag() {
        let opts = ParseOptions {
            default_flag: "Starred".to_string(),
            ..ParseOptions::default()
        };
        let rules = parse(
            r#"if from = "a@x.com" then flag; if from = "b@x.com" then unflag;"#,
            &opts,
        )
        .unwrap();
        assert_eq!(
            render(&rules),
            vec![
                r#"if from = "a@x.com" then flag "Starred""#,
                r#"if from = "b@x.com" then unflag "Starred""#,
            ]
        );
    }

    #[test]
    fn stream_defaults_to_rfc822_and_accepts_a_secondary_endpoint() {
        let rules = parse_ok(
            r#"if from = "a@x.com" then stream "http://sink.example/h" "http://backup.example/h";"#,
        );
        assert_eq!(
            render(&rules),
            vec![
                r#"if from = "a@x.com" then stream rfc822 "http://sink.example/h" "http://backup.example/h""#
            ]
        );
    }

    #[test]
    fn stream_html_content_kind() {
        let rules = parse_ok(r#"if from = "a@x.com" then stream html "http://sink.example/h";"#);
        assert_eq!(
            render(&rules),
            vec![r#"if from = "a@x.com" then stream html "http://sink.example/h""#]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let rules = parse_ok(
            "// header comment\nif from = \"a@x.com\" // trailing\nthen move \"A\";",
        );
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn string_escapes_resolve() {
        let rules = parse_ok(r#"if subject = "say \"hi\" \\ bye" then move "A";"#);
        let Rule::Move(r) = &rules[0] else { unreachable!() };
        let Predicate::Field {
            matcher: StringMatcher::Equals(lit),
            ..
        } = &r.predicate
        else {
            unreachable!()
        };
        assert_eq!(lit, r#"say "hi" \ bye"#);
    }

    // ── Failure modes: all-or-nothing ───────────────────────────────

    #[test]
    fn empty_input_is_rejected() {
        assert!(parse("", &ParseOptions::default()).is_err());
    }

    #[test]
    fn missing_semicolon_is_rejected() {
        let err = parse(
            r#"if from = "a@x.com" then move "A""#,
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn unknown_field_aborts_the_whole_parse() {
        let err = parse(
            r#"if from = "a@x.com" then move "A"; if cc = "b@x.com" then flag;"#,
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownField { field } if field == "cc"));
    }

    #[test]
    fn invalid_regex_aborts_with_the_pattern() {
        let err = parse(
            r#"if subject ~ "(unclosed" then flag;"#,
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Regex { pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn unterminated_string_aborts() {
        let err = parse(
            r#"if from = "never closed then flag;"#,
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Lex { .. }));
    }

    #[test]
    fn wrong_keyword_order_is_rejected() {
        assert!(parse(
            r#"if then from = "a@x.com" move "A";"#,
            &ParseOptions::default()
        )
        .is_err());
        assert!(parse(
            r#"move "A" if from = "a@x.com";"#,
            &ParseOptions::default()
        )
        .is_err());
    }

    #[test]
    fn unknown_stream_content_kind_is_rejected() {
        let err = parse(
            r#"if from = "a@x.com" then stream pdf "http://sink.example/h";"#,
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { message, .. } if message.contains("pdf")));
    }

    #[test]
    fn syntax_error_carries_an_offset() {
        let err = parse(r#"if from = "a@x.com" where"#, &ParseOptions::default()).unwrap_err();
        let ParseError::Syntax { pos, .. } = err else {
            panic!("expected syntax error, got {err:?}");
        };
        // Offset of the unexpected token.
        assert_eq!(pos, 20);
    }
}
