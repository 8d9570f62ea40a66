//! Assemble lowered rules into an executable [`Program`].

use cranelift_entity::PrimaryMap;

use peglow_runtime::{CompiledRule, Program, RuleHandle};

use crate::{
    ast::Grammar,
    error::{CompileError, ErrorAccumulator},
    lower::{lower_expression, LowerCx},
    resolve::ResolveCx,
};

#[derive(Clone)]
pub struct CompileOptions {
    /// emit a startup diagnostic once the program is ready
    pub trace: bool,
    /// enable per-rule memoization (packrat parsing)
    pub cache: bool,
    /// the first entry selects the start rule; empty means the first
    /// declared rule
    pub allowed_start_rules: Vec<String>,
    /// reject input the start rule did not consume
    pub consume_all: bool,
}

impl Default for CompileOptions {
    fn default() -> CompileOptions {
        CompileOptions {
            trace: false,
            cache: false,
            allowed_start_rules: Vec::new(),
            consume_all: true,
        }
    }
}

pub fn compile(grammar: &Grammar, options: &CompileOptions) -> Result<Program, Vec<CompileError>> {
    if grammar.rules.is_empty() {
        return Err(vec![CompileError::EmptyGrammar]);
    }

    let err = ErrorAccumulator::new();
    let resolve = ResolveCx::new(grammar, &err);

    let mut rules = PrimaryMap::new();
    for rule in &grammar.rules {
        let cx = LowerCx {
            err: &err,
            resolve: &resolve,
            rule: rule.name.clone(),
        };
        let body = lower_expression(&rule.expression, &cx);
        rules.push(CompiledRule {
            name: rule.name.clone(),
            body,
        });
    }

    let start = match options.allowed_start_rules.first() {
        Some(name) => match resolve.lookup(name) {
            Some(handle) => handle,
            None => {
                err.push(CompileError::UnknownStartRule {
                    name: name.as_str().into(),
                });
                RuleHandle::from_u32(0)
            }
        },
        None => RuleHandle::from_u32(0),
    };

    drop(resolve);
    let errors = err.into_errors();
    if !errors.is_empty() {
        return Err(errors);
    }

    if options.trace {
        log::info!(
            "parser ready: {} rules, starting at `{}`",
            rules.len(),
            rules[start].name
        );
    }

    Ok(Program {
        rules,
        start,
        cache: options.cache,
        consume_all: options.consume_all,
    })
}

#[cfg(test)]
use crate::ast::{Expression, Rule};

#[test]
fn test_start_rule_selection() {
    let grammar = Grammar::new(vec![
        Rule::new("A", Expression::literal("a")),
        Rule::new("B", Expression::literal("b")),
    ]);

    let program = compile(&grammar, &CompileOptions::default()).unwrap();
    assert_eq!(program.rule_name(program.start), "A");

    let options = CompileOptions {
        allowed_start_rules: vec!["B".to_owned()],
        ..CompileOptions::default()
    };
    let program = compile(&grammar, &options).unwrap();
    assert_eq!(program.rule_name(program.start), "B");

    let options = CompileOptions {
        allowed_start_rules: vec!["C".to_owned()],
        ..CompileOptions::default()
    };
    let errors = compile(&grammar, &options).unwrap_err();
    assert_eq!(
        errors,
        vec![CompileError::UnknownStartRule { name: "C".into() }]
    );
}

#[test]
fn test_empty_grammar() {
    let errors = compile(&Grammar::new(vec![]), &CompileOptions::default()).unwrap_err();
    assert_eq!(errors, vec![CompileError::EmptyGrammar]);
}

#[test]
fn test_errors_are_batched() {
    let grammar = Grammar::new(vec![
        Rule::new("A", Expression::rule_ref("Missing")),
        Rule::new("A", Expression::literal("a")),
    ]);

    let errors = compile(&grammar, &CompileOptions::default()).unwrap_err();
    assert_eq!(errors.len(), 2);
}
