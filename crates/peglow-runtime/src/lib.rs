//! Backtracking combinator runtime for compiled PEG parsers.
//!
//! The backend lowers every grammar rule into a [`combinator::Combinator`]
//! descriptor tree and binds them into a [`Program`]; this crate owns
//! everything that happens at parse time.

pub mod combinator;
pub mod cursor;
pub mod memo;

use std::rc::Rc;

use cranelift_entity::{entity_impl, PrimaryMap};

use combinator::{Combinator, ParseCx};
use cursor::Cursor;

pub type RcString = Rc<str>;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleHandle(u32);

entity_impl! { RuleHandle }

#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Null,
    Str(String),
    Int(i64),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Value {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Value {
        Value::Int(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Value {
        Value::List(value)
    }
}

/// Ordinary non-match. Carries the position where the failing attempt
/// began; consumed by the nearest choice point, never dropped elsewhere.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mismatch {
    pub position: u32,
}

/// Fatal conditions that abort the whole parse instead of backtracking.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Abort {
    /// A repetition body succeeded without consuming input; running the
    /// loop further would never terminate.
    EmptyRepetition { position: u32 },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParseFail {
    Mismatch(Mismatch),
    Abort(Abort),
}

pub type MatchResult = Result<Value, ParseFail>;

/// One compiled grammar rule: its lowered descriptor plus the name kept
/// for diagnostics. The descriptor is built once at compile time and
/// reused unchanged across parses.
#[derive(Debug)]
pub struct CompiledRule {
    pub name: RcString,
    pub body: Combinator,
}

/// An executable parser: the rule table and the parse-time configuration
/// chosen at compile time.
#[derive(Debug)]
pub struct Program {
    pub rules: PrimaryMap<RuleHandle, CompiledRule>,
    pub start: RuleHandle,
    /// memoize (rule, position) results for packrat parsing
    pub cache: bool,
    /// reject input the start rule did not consume
    pub consume_all: bool,
}

impl Program {
    pub fn parse(&self, input: &str) -> Result<Value, ParseError> {
        let mut cx = ParseCx::new(&self.rules, Cursor::new(input), self.cache);

        match cx.eval_rule(self.start) {
            Ok(value) => {
                if self.consume_all && !cx.cursor.is_eof() {
                    return Err(ParseError::TrailingInput {
                        end: cx.cursor.position(),
                        partial: value,
                    });
                }
                Ok(value)
            }
            Err(ParseFail::Mismatch(m)) => Err(ParseError::Mismatch {
                position: m.position,
            }),
            Err(ParseFail::Abort(Abort::EmptyRepetition { position })) => {
                Err(ParseError::EmptyRepetition { position })
            }
        }
    }

    pub fn rule_name(&self, handle: RuleHandle) -> &str {
        &self.rules[handle].name
    }

    pub fn display_into(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        for (_, rule) in self.rules.iter() {
            write!(buf, "\n{} =\n", rule.name)?;
            rule.body.display_into_indent(buf, &self.rules, 1)?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum ParseError {
    /// No rule matched; `position` is where the last attempt began.
    Mismatch { position: u32 },
    /// The start rule succeeded but stopped at `end`, short of the input
    /// end. The partial value is kept for diagnostics only.
    TrailingInput { end: u32, partial: Value },
    /// The zero-width repetition guard fired.
    EmptyRepetition { position: u32 },
}

impl ParseError {
    /// The failure position reported to callers. Trailing input is
    /// reported at position 0.
    pub fn position(&self) -> u32 {
        match *self {
            ParseError::Mismatch { position } => position,
            ParseError::TrailingInput { .. } => 0,
            ParseError::EmptyRepetition { position } => position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Mismatch { position } => {
                write!(f, "Parse failed at position {position}")
            }
            ParseError::TrailingInput { end, .. } => {
                write!(f, "Input left over after position {end}")
            }
            ParseError::EmptyRepetition { position } => {
                write!(f, "Repetition matched empty input at position {position}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[test]
fn test_value_accessors() {
    assert!(Value::Null.is_null());
    assert_eq!(Value::from("ab").as_str(), Some("ab"));
    assert_eq!(Value::from(3).as_int(), Some(3));
    assert_eq!(Value::from("ab").as_int(), None);

    let list = Value::List(vec![Value::from(1), Value::Null]);
    assert_eq!(list.as_list().map(|l| l.len()), Some(2));
}

#[test]
fn test_parse_error_positions() {
    let err = ParseError::TrailingInput {
        end: 7,
        partial: Value::Null,
    };
    assert_eq!(err.position(), 0);
    assert_eq!(ParseError::Mismatch { position: 4 }.position(), 4);
}
