//! Lower grammar expressions into runtime combinator descriptors. The
//! transform is pure and runs exactly once per rule; descriptors are
//! never rebuilt at parse time.

use peglow_runtime::combinator::{
    ActionBinding, ActionFn, CaptureShape, CharClass, ClassPart, Combinator,
};
use peglow_runtime::RcString;

use crate::{
    ast::Expression,
    error::{CompileError, ErrorAccumulator},
    resolve::ResolveCx,
};

pub struct LowerCx<'a> {
    pub err: &'a ErrorAccumulator,
    pub resolve: &'a ResolveCx<'a>,
    /// name of the rule being lowered, for error context
    pub rule: RcString,
}

pub fn lower_expression(expr: &Expression, cx: &LowerCx) -> Combinator {
    match expr {
        Expression::Literal { value, ignore_case } => Combinator::Literal {
            units: value.chars().collect(),
            ignore_case: *ignore_case,
        },
        Expression::Class {
            parts,
            ignore_case,
            inverted,
        } => {
            for part in parts {
                if let ClassPart::Range(low, high) = *part {
                    if low > high {
                        cx.err.push(CompileError::InvertedClassRange {
                            rule: cx.rule.clone(),
                            low,
                            high,
                        });
                    }
                }
            }
            Combinator::Class(CharClass::new(
                parts.as_slice().into(),
                *ignore_case,
                *inverted,
            ))
        }
        Expression::Sequence(children) => lower_sequence(children, cx),
        Expression::Choice(alternatives) => Combinator::Choice(
            alternatives
                .iter()
                .map(|alternative| lower_expression(alternative, cx))
                .collect(),
        ),
        Expression::OneOrMore(inner) => {
            Combinator::OneOrMore(Box::new(lower_expression(inner, cx)))
        }
        Expression::ZeroOrMore(inner) => {
            Combinator::ZeroOrMore(Box::new(lower_expression(inner, cx)))
        }
        Expression::Optional(inner) => {
            Combinator::Optional(Box::new(lower_expression(inner, cx)))
        }
        // groups are a label scope boundary, nothing more; picks inside
        // were already folded into the group's own sequence
        Expression::Group(inner) => lower_expression(inner, cx),
        Expression::Labeled { inner, .. } => lower_expression(inner, cx),
        Expression::Named { inner, .. } => lower_expression(inner, cx),
        Expression::Action { inner, action } => lower_action(inner, action, cx),
        Expression::Text(inner) => Combinator::Text(Box::new(lower_expression(inner, cx))),
        Expression::PositiveLookahead(inner) => {
            Combinator::PositiveLookahead(Box::new(lower_expression(inner, cx)))
        }
        Expression::NegativeLookahead(inner) => {
            Combinator::NegativeLookahead(Box::new(lower_expression(inner, cx)))
        }
        Expression::Any => Combinator::Any,
        Expression::RuleRef(name) => match cx.resolve.lookup(name) {
            Some(handle) => Combinator::Rule(handle),
            None => {
                cx.err.push(CompileError::UndefinedReference {
                    rule: cx.rule.clone(),
                    target: name.clone(),
                });
                // placeholder that can never match; compilation fails anyway
                Combinator::Choice(vec![])
            }
        },
    }
}

/// A sequence yields the list of all element results unless some elements
/// carry a pick mark, in which case only those are surfaced.
fn lower_sequence(children: &[Expression], cx: &LowerCx) -> Combinator {
    let mut keep = Vec::new();
    for (index, child) in children.iter().enumerate() {
        if let Expression::Labeled { pick: true, .. } = child {
            keep.push(index as u32);
        }
    }

    let sequence = Combinator::Sequence(
        children
            .iter()
            .map(|child| lower_expression(child, cx))
            .collect(),
    );

    if keep.is_empty() {
        sequence
    } else {
        Combinator::Pick {
            inner: Box::new(sequence),
            keep: keep.into(),
        }
    }
}

/// The capture shape is decided by the action's immediate inner node:
/// a sequence binds one argument per labeled element, a bare labeled
/// node binds that single value, anything else passes the whole result.
fn lower_action(inner: &Expression, action: &ActionFn, cx: &LowerCx) -> Combinator {
    let (lowered, capture) = match inner {
        Expression::Sequence(children) => {
            let mut indices = Vec::new();
            for (index, child) in children.iter().enumerate() {
                if let Expression::Labeled {
                    label: Some(_), ..
                } = child
                {
                    indices.push(index as u32);
                }
            }

            // captures take precedence over pick re-shaping here, so the
            // sequence is lowered without it
            let sequence = Combinator::Sequence(
                children
                    .iter()
                    .map(|child| lower_expression(child, cx))
                    .collect(),
            );

            let capture = match indices.is_empty() {
                true => CaptureShape::Whole,
                false => CaptureShape::Indices(indices.into()),
            };
            (sequence, capture)
        }
        Expression::Labeled {
            label: Some(_),
            inner,
            ..
        } => (lower_expression(inner, cx), CaptureShape::Single),
        other => (lower_expression(other, cx), CaptureShape::Whole),
    };

    Combinator::Action {
        inner: Box::new(lowered),
        binding: ActionBinding {
            callable: action.clone(),
            capture,
        },
    }
}

#[cfg(test)]
use std::rc::Rc;
#[cfg(test)]
use crate::ast::{Grammar, Rule};
#[cfg(test)]
use peglow_runtime::Value;

#[cfg(test)]
fn lower_one(expr: Expression) -> (Combinator, Vec<CompileError>) {
    let grammar = Grammar::new(vec![Rule::new("Test", expr)]);
    let err = ErrorAccumulator::new();
    let resolve = ResolveCx::new(&grammar, &err);
    let cx = LowerCx {
        err: &err,
        resolve: &resolve,
        rule: "Test".into(),
    };
    let lowered = lower_expression(&grammar.rules[0].expression, &cx);
    drop(cx);
    drop(resolve);
    (lowered, err.into_errors())
}

#[test]
fn test_transparent_wrappers() {
    let expr = Expression::literal("a")
        .labeled("x")
        .named("letter")
        .group();
    let (lowered, errors) = lower_one(expr);
    assert!(errors.is_empty());
    assert!(matches!(lowered, Combinator::Literal { .. }));
}

#[test]
fn test_picks_reshape_sequences() {
    let expr = Expression::seq(vec![
        Expression::literal("("),
        Expression::literal("x").picked(),
        Expression::literal(")"),
    ]);
    let (lowered, errors) = lower_one(expr);
    assert!(errors.is_empty());

    let Combinator::Pick { keep, .. } = lowered else {
        panic!("expected a pick wrapper");
    };
    assert_eq!(&keep[..], &[1]);
}

#[test]
fn test_action_capture_shapes() {
    let noop: ActionFn = Rc::new(|_: &[Value]| Value::Null);

    // labeled sequence elements -> positional indices
    let expr = Expression::seq(vec![
        Expression::literal("a").labeled("a"),
        Expression::literal("-"),
        Expression::literal("b").labeled("b"),
    ])
    .action(noop.clone());
    let (lowered, _) = lower_one(expr);
    let Combinator::Action { binding, .. } = lowered else {
        panic!("expected an action");
    };
    let CaptureShape::Indices(indices) = binding.capture else {
        panic!("expected index captures");
    };
    assert_eq!(&indices[..], &[0, 2]);

    // bare labeled inner -> the single captured value
    let expr = Expression::literal("a").labeled("a").action(noop.clone());
    let (lowered, _) = lower_one(expr);
    let Combinator::Action { binding, .. } = lowered else {
        panic!("expected an action");
    };
    assert!(matches!(binding.capture, CaptureShape::Single));

    // no labels anywhere -> the whole inner result
    let expr = Expression::seq(vec![Expression::literal("a")]).action(noop);
    let (lowered, _) = lower_one(expr);
    let Combinator::Action { binding, .. } = lowered else {
        panic!("expected an action");
    };
    assert!(matches!(binding.capture, CaptureShape::Whole));
}

#[test]
fn test_undefined_reference() {
    let (lowered, errors) = lower_one(Expression::rule_ref("Missing"));
    assert!(matches!(lowered, Combinator::Choice(ref alts) if alts.is_empty()));
    assert_eq!(
        errors,
        vec![CompileError::UndefinedReference {
            rule: "Test".into(),
            target: "Missing".into(),
        }]
    );
}

#[test]
fn test_inverted_class_range() {
    let expr = Expression::class(vec![ClassPart::Range('9', '0')]);
    let (_, errors) = lower_one(expr);
    assert_eq!(
        errors,
        vec![CompileError::InvertedClassRange {
            rule: "Test".into(),
            low: '9',
            high: '0',
        }]
    );
}
