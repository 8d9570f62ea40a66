//! The grammar AST consumed by compilation. It arrives fully formed from
//! the caller; parsing a textual grammar syntax is somebody else's job.

use peglow_runtime::combinator::{ActionFn, ClassPart};
use peglow_runtime::RcString;

#[derive(Clone)]
pub struct Grammar {
    pub rules: Vec<Rule>,
}

impl Grammar {
    pub fn new(rules: Vec<Rule>) -> Grammar {
        Grammar { rules }
    }

    pub fn display_into(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        for rule in &self.rules {
            write!(buf, "\n{} =\n", rule.name)?;
            rule.expression.display_into_indent(buf, 1)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Rule {
    pub name: RcString,
    pub expression: Expression,
}

impl Rule {
    pub fn new(name: &str, expression: Expression) -> Rule {
        Rule {
            name: name.into(),
            expression,
        }
    }
}

/// Closed set of grammar expression kinds. Every variant lowers to a
/// runtime combinator in `lower`.
#[derive(Clone)]
pub enum Expression {
    Literal {
        value: RcString,
        ignore_case: bool,
    },
    Class {
        parts: Vec<ClassPart>,
        ignore_case: bool,
        inverted: bool,
    },
    Sequence(Vec<Expression>),
    Choice(Vec<Expression>),
    OneOrMore(Box<Expression>),
    ZeroOrMore(Box<Expression>),
    Optional(Box<Expression>),
    Group(Box<Expression>),
    /// Attaches a label and/or a pick mark to an element. Transparent for
    /// matching; the metadata is consumed by the enclosing sequence or
    /// action during lowering.
    Labeled {
        label: Option<RcString>,
        pick: bool,
        inner: Box<Expression>,
    },
    /// Diagnostic name, transparent pass-through.
    Named {
        name: RcString,
        inner: Box<Expression>,
    },
    Action {
        inner: Box<Expression>,
        action: ActionFn,
    },
    Text(Box<Expression>),
    PositiveLookahead(Box<Expression>),
    NegativeLookahead(Box<Expression>),
    Any,
    RuleRef(RcString),
}

impl Expression {
    pub fn literal(value: &str) -> Expression {
        Expression::Literal {
            value: value.into(),
            ignore_case: false,
        }
    }

    pub fn literal_ci(value: &str) -> Expression {
        Expression::Literal {
            value: value.into(),
            ignore_case: true,
        }
    }

    pub fn class(parts: Vec<ClassPart>) -> Expression {
        Expression::Class {
            parts,
            ignore_case: false,
            inverted: false,
        }
    }

    pub fn class_range(low: char, high: char) -> Expression {
        Expression::class(vec![ClassPart::Range(low, high)])
    }

    pub fn seq(elements: Vec<Expression>) -> Expression {
        Expression::Sequence(elements)
    }

    pub fn choice(alternatives: Vec<Expression>) -> Expression {
        Expression::Choice(alternatives)
    }

    pub fn one_or_more(self) -> Expression {
        Expression::OneOrMore(Box::new(self))
    }

    pub fn zero_or_more(self) -> Expression {
        Expression::ZeroOrMore(Box::new(self))
    }

    pub fn optional(self) -> Expression {
        Expression::Optional(Box::new(self))
    }

    pub fn group(self) -> Expression {
        Expression::Group(Box::new(self))
    }

    pub fn labeled(self, label: &str) -> Expression {
        Expression::Labeled {
            label: Some(label.into()),
            pick: false,
            inner: Box::new(self),
        }
    }

    pub fn picked(self) -> Expression {
        Expression::Labeled {
            label: None,
            pick: true,
            inner: Box::new(self),
        }
    }

    pub fn named(self, name: &str) -> Expression {
        Expression::Named {
            name: name.into(),
            inner: Box::new(self),
        }
    }

    pub fn action(self, action: ActionFn) -> Expression {
        Expression::Action {
            inner: Box::new(self),
            action,
        }
    }

    pub fn text(self) -> Expression {
        Expression::Text(Box::new(self))
    }

    pub fn positive_lookahead(self) -> Expression {
        Expression::PositiveLookahead(Box::new(self))
    }

    pub fn negative_lookahead(self) -> Expression {
        Expression::NegativeLookahead(Box::new(self))
    }

    pub fn rule_ref(name: &str) -> Expression {
        Expression::RuleRef(name.into())
    }

    pub fn display_into(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        self.display_into_indent(buf, 0)
    }

    pub fn display_into_indent(
        &self,
        buf: &mut dyn std::fmt::Write,
        indent: u32,
    ) -> std::fmt::Result {
        for _ in 0..indent {
            write!(buf, "  ")?;
        }
        let mut children: &[Expression] = &[];
        match self {
            Expression::Literal { value, ignore_case } => {
                write!(buf, "Literal({value:?}")?;
                if *ignore_case {
                    write!(buf, " ignore_case")?;
                }
                write!(buf, ")")?;
            }
            Expression::Class {
                parts,
                ignore_case,
                inverted,
            } => {
                write!(buf, "Class(")?;
                if *inverted {
                    write!(buf, "^")?;
                }
                for part in parts {
                    match *part {
                        ClassPart::Single(c) => write!(buf, "{c}")?,
                        ClassPart::Range(low, high) => write!(buf, "{low}-{high}")?,
                    }
                }
                if *ignore_case {
                    write!(buf, " ignore_case")?;
                }
                write!(buf, ")")?;
            }
            Expression::Sequence(inner) => {
                write!(buf, "Sequence")?;
                children = inner;
            }
            Expression::Choice(inner) => {
                write!(buf, "Choice")?;
                children = inner;
            }
            Expression::OneOrMore(inner) => {
                write!(buf, "OneOrMore")?;
                children = std::slice::from_ref(inner);
            }
            Expression::ZeroOrMore(inner) => {
                write!(buf, "ZeroOrMore")?;
                children = std::slice::from_ref(inner);
            }
            Expression::Optional(inner) => {
                write!(buf, "Optional")?;
                children = std::slice::from_ref(inner);
            }
            Expression::Group(inner) => {
                write!(buf, "Group")?;
                children = std::slice::from_ref(inner);
            }
            Expression::Labeled { label, pick, inner } => {
                write!(buf, "Labeled(")?;
                if *pick {
                    write!(buf, "@")?;
                }
                if let Some(label) = label {
                    write!(buf, "{label}")?;
                }
                write!(buf, ")")?;
                children = std::slice::from_ref(inner);
            }
            Expression::Named { name, inner } => {
                write!(buf, "Named({name})")?;
                children = std::slice::from_ref(inner);
            }
            Expression::Action { inner, .. } => {
                write!(buf, "Action")?;
                children = std::slice::from_ref(inner);
            }
            Expression::Text(inner) => {
                write!(buf, "Text")?;
                children = std::slice::from_ref(inner);
            }
            Expression::PositiveLookahead(inner) => {
                write!(buf, "PositiveLookahead")?;
                children = std::slice::from_ref(inner);
            }
            Expression::NegativeLookahead(inner) => {
                write!(buf, "NegativeLookahead")?;
                children = std::slice::from_ref(inner);
            }
            Expression::Any => write!(buf, "Any")?,
            Expression::RuleRef(name) => write!(buf, "RuleRef({name})")?,
        }
        write!(buf, "\n")?;
        for child in children {
            child.display_into_indent(buf, indent + 1)?;
        }
        Ok(())
    }
}

#[test]
fn test_display() {
    let expr = Expression::seq(vec![
        Expression::literal("a").labeled("head"),
        Expression::class_range('0', '9').one_or_more(),
    ]);

    let mut buf = String::new();
    expr.display_into(&mut buf).unwrap();
    let expected = "\
Sequence
  Labeled(head)
    Literal(\"a\")
  OneOrMore
    Class(0-9)
";
    assert_eq!(buf, expected);
}
