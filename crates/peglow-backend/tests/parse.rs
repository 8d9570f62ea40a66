//! End-to-end tests: build a grammar AST, compile it, parse input.

use std::rc::Rc;

use peglow_backend::ast::{Expression, Grammar, Rule};
use peglow_backend::{compile, CompileOptions};
use peglow_runtime::combinator::ActionFn;
use peglow_runtime::{ParseError, Program, Value};

fn build(rules: Vec<Rule>) -> Program {
    compile(&Grammar::new(rules), &CompileOptions::default()).unwrap()
}

fn build_with(rules: Vec<Rule>, options: &CompileOptions) -> Program {
    compile(&Grammar::new(rules), options).unwrap()
}

fn str_value(s: &str) -> Value {
    Value::Str(s.to_owned())
}

#[test]
fn literal_rule() {
    let program = build(vec![Rule::new("Start", Expression::literal("ab"))]);
    assert_eq!(program.parse("ab"), Ok(str_value("ab")));
    assert!(program.parse("ax").is_err());
}

#[test]
fn ordered_choice() {
    let program = build(vec![Rule::new(
        "Start",
        Expression::choice(vec![Expression::literal("foo"), Expression::literal("bar")]),
    )]);

    assert_eq!(program.parse("bar"), Ok(str_value("bar")));

    // both alternatives start at 0; the last attempt's position is reported
    let err = program.parse("baz").unwrap_err();
    assert_eq!(err, ParseError::Mismatch { position: 0 });
}

#[test]
fn choice_reports_last_alternative_position() {
    // the second alternative consumes "b" before failing inside a sequence
    let program = build(vec![Rule::new(
        "Start",
        Expression::choice(vec![
            Expression::literal("ax"),
            Expression::seq(vec![Expression::literal("b"), Expression::literal("y")]),
        ]),
    )]);

    let err = program.parse("bz").unwrap_err();
    assert_eq!(err.position(), 1);
}

#[test]
fn trailing_input_is_rejected() {
    let program = build(vec![Rule::new("Start", Expression::literal("ab"))]);

    let err = program.parse("abc").unwrap_err();
    assert_eq!(err.position(), 0);
    let ParseError::TrailingInput { end, partial } = err else {
        panic!("expected trailing input");
    };
    assert_eq!(end, 2);
    assert_eq!(partial, str_value("ab"));

    let options = CompileOptions {
        consume_all: false,
        ..CompileOptions::default()
    };
    let program = build_with(vec![Rule::new("Start", Expression::literal("ab"))], &options);
    assert_eq!(program.parse("abc"), Ok(str_value("ab")));
}

#[test]
fn zero_width_repetition_aborts() {
    let program = build(vec![Rule::new(
        "Start",
        Expression::literal("").zero_or_more(),
    )]);

    let err = program.parse("aaa").unwrap_err();
    assert_eq!(err, ParseError::EmptyRepetition { position: 0 });

    // an optional inside a loop matches zero-width as well
    let program = build(vec![Rule::new(
        "Start",
        Expression::literal("a").optional().zero_or_more(),
    )]);
    let err = program.parse("ab").unwrap_err();
    assert!(matches!(err, ParseError::EmptyRepetition { .. }));
}

#[test]
fn repetition_collects_in_order() {
    let program = build(vec![Rule::new(
        "Start",
        Expression::choice(vec![Expression::literal("a"), Expression::literal("b")])
            .one_or_more(),
    )]);

    assert_eq!(
        program.parse("aba"),
        Ok(Value::List(vec![
            str_value("a"),
            str_value("b"),
            str_value("a"),
        ]))
    );
    assert!(program.parse("").is_err());
}

#[test]
fn text_over_sequence() {
    let program = build(vec![Rule::new(
        "Start",
        Expression::seq(vec![Expression::literal("a"), Expression::literal("b")]).text(),
    )]);

    assert_eq!(program.parse("ab"), Ok(str_value("ab")));
}

#[test]
fn negative_lookahead_guards_without_consuming() {
    // Start = !"0" [0-9]+
    let program = build(vec![Rule::new(
        "Start",
        Expression::seq(vec![
            Expression::literal("0").negative_lookahead(),
            Expression::class_range('0', '9').one_or_more().picked(),
        ]),
    )]);

    assert_eq!(
        program.parse("12"),
        Ok(Value::List(vec![str_value("1"), str_value("2")]))
    );
    assert!(program.parse("012").is_err());
}

#[test]
fn positive_lookahead_is_zero_width() {
    // Start = &"ab" . .
    let program = build(vec![Rule::new(
        "Start",
        Expression::seq(vec![
            Expression::literal("ab").positive_lookahead(),
            Expression::Any,
            Expression::Any,
        ]),
    )]);

    assert_eq!(
        program.parse("ab"),
        Ok(Value::List(vec![
            Value::Null,
            str_value("a"),
            str_value("b"),
        ]))
    );
    assert!(program.parse("ba").is_err());
}

#[test]
fn action_receives_captured_label() {
    // Start = digits:$[0-9]+ { int(digits) }
    let to_int: ActionFn = Rc::new(|args: &[Value]| {
        let digits = args[0].as_str().unwrap();
        Value::Int(digits.parse().unwrap())
    });

    let program = build(vec![Rule::new(
        "Start",
        Expression::class_range('0', '9')
            .one_or_more()
            .text()
            .labeled("digits")
            .action(to_int),
    )]);

    assert_eq!(program.parse("12"), Ok(Value::Int(12)));
}

#[test]
fn action_side_effects_are_not_undone() {
    use std::cell::Cell;

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let count: ActionFn = Rc::new(move |args: &[Value]| {
        counter.set(counter.get() + 1);
        args[0].clone()
    });

    // the first alternative runs its action, then fails on the trailing
    // literal; the action call is not rolled back
    let program = build(vec![Rule::new(
        "Start",
        Expression::choice(vec![
            Expression::seq(vec![
                Expression::literal("a").action(count.clone()).picked(),
                Expression::literal("x"),
            ]),
            Expression::literal("ab"),
        ]),
    )]);

    assert_eq!(program.parse("ab"), Ok(str_value("ab")));
    assert_eq!(calls.get(), 1);
}

#[test]
fn rule_references_recurse() {
    // Nested = "(" Nested ")" / ""
    let program = build(vec![Rule::new(
        "Nested",
        Expression::choice(vec![
            Expression::seq(vec![
                Expression::literal("("),
                Expression::rule_ref("Nested").picked(),
                Expression::literal(")"),
            ]),
            Expression::literal(""),
        ]),
    )]);

    assert_eq!(program.parse("((()))"), Ok(str_value("")));
    assert!(program.parse("(()").is_err());
}

#[test]
fn memoization_is_transparent() {
    // Start = A "x" / A; A's result at position 0 is recomputed or replayed
    let rules = || {
        vec![
            Rule::new(
                "Start",
                Expression::choice(vec![
                    Expression::seq(vec![
                        Expression::rule_ref("A"),
                        Expression::literal("x"),
                    ]),
                    Expression::rule_ref("A"),
                ]),
            ),
            Rule::new(
                "A",
                Expression::seq(vec![Expression::literal("a"), Expression::literal("b")]).text(),
            ),
        ]
    };

    let plain = build(rules());
    let cached = build_with(
        rules(),
        &CompileOptions {
            cache: true,
            ..CompileOptions::default()
        },
    );

    for input in ["ab", "abx", "a", "abz", ""] {
        assert_eq!(plain.parse(input), cached.parse(input), "input={input:?}");
    }
}

#[test]
fn case_insensitive_matching() {
    let program = build(vec![Rule::new(
        "Start",
        Expression::seq(vec![
            Expression::literal_ci("select").picked(),
            Expression::Class {
                parts: vec![peglow_runtime::combinator::ClassPart::Range('a', 'z')],
                ignore_case: true,
                inverted: false,
            },
        ]),
    )]);

    // the value keeps the input spelling
    assert_eq!(program.parse("SeLeCtX"), Ok(str_value("SeLeCt")));
    assert!(program.parse("selec1t").is_err());
}
