//! Predicate AST: boolean expressions evaluated against one message.

use std::fmt;

use regex::Regex;

use crate::error::ParseError;
use crate::mailbox::MessageSummary;

/// Message field a comparison inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    To,
    From,
    Subject,
}

impl Field {
    /// Resolve a field name from the rule file. Anything outside
    /// `to`/`from`/`subject` aborts the parse.
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        match name {
            "to" => Ok(Field::To),
            "from" => Ok(Field::From),
            "subject" => Ok(Field::Subject),
            _ => Err(ParseError::UnknownField {
                field: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::To => "to",
            Field::From => "from",
            Field::Subject => "subject",
        })
    }
}

/// How a comparison matches a string: exact equality or a regex compiled
/// once at parse time.
#[derive(Debug, Clone)]
pub enum StringMatcher {
    Equals(String),
    Regex(Regex),
}

impl StringMatcher {
    pub fn matches(&self, s: &str) -> bool {
        match self {
            StringMatcher::Equals(lit) => lit == s,
            StringMatcher::Regex(re) => re.is_match(s),
        }
    }
}

impl fmt::Display for StringMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringMatcher::Equals(lit) => write!(f, "= \"{lit}\""),
            StringMatcher::Regex(re) => write!(f, "~ \"{}\"", re.as_str()),
        }
    }
}

/// Boolean expression tree over message fields. Combinators are pure;
/// evaluation has no side effects.
#[derive(Debug, Clone)]
pub enum Predicate {
    Field { field: Field, matcher: StringMatcher },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Evaluate against one message summary.
    ///
    /// `to`/`from` match if any address in the header list satisfies the
    /// matcher; `subject` tests the single subject string.
    pub fn matches(&self, msg: &MessageSummary) -> bool {
        match self {
            Predicate::Field { field, matcher } => match field {
                Field::To => msg.to.iter().any(|addr| matcher.matches(addr)),
                Field::From => msg.from.iter().any(|addr| matcher.matches(addr)),
                Field::Subject => matcher.matches(&msg.subject),
            },
            Predicate::And(left, right) => left.matches(msg) && right.matches(msg),
            Predicate::Or(left, right) => left.matches(msg) || right.matches(msg),
            Predicate::Not(inner) => !inner.matches(msg),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Field { field, matcher } => write!(f, "{field} {matcher}"),
            Predicate::And(left, right) => write!(f, "({left}) and ({right})"),
            Predicate::Or(left, right) => write!(f, "({left}) or ({right})"),
            Predicate::Not(inner) => write!(f, "not ({inner})"),
        }
    }
}
