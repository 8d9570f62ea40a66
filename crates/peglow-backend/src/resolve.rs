//! Resolve rule names into handles. Rule names share one flat namespace;
//! handles are assigned in declaration order so they agree with the rule
//! table the compiler builds.

use std::collections::{hash_map::Entry, HashMap};

use peglow_runtime::{RcString, RuleHandle};

use crate::{
    ast::Grammar,
    error::{CompileError, ErrorAccumulator},
};

pub struct ResolveCx<'a> {
    pub err: &'a ErrorAccumulator,
    name_to_rule: HashMap<RcString, RuleHandle>,
}

impl<'a> ResolveCx<'a> {
    pub fn new(grammar: &Grammar, err: &'a ErrorAccumulator) -> ResolveCx<'a> {
        let mut this = ResolveCx {
            err,
            name_to_rule: HashMap::new(),
        };
        this.populate(grammar);
        this
    }

    fn populate(&mut self, grammar: &Grammar) {
        for (index, rule) in grammar.rules.iter().enumerate() {
            let handle = RuleHandle::from_u32(index as u32);
            match self.name_to_rule.entry(rule.name.clone()) {
                Entry::Occupied(_) => self.err.push(CompileError::DuplicateRule {
                    name: rule.name.clone(),
                }),
                Entry::Vacant(v) => {
                    v.insert(handle);
                }
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<RuleHandle> {
        self.name_to_rule.get(name).copied()
    }
}

#[cfg(test)]
use crate::ast::{Expression, Rule};

#[test]
fn test_declaration_order_handles() {
    let grammar = Grammar::new(vec![
        Rule::new("A", Expression::Any),
        Rule::new("B", Expression::Any),
    ]);
    let err = ErrorAccumulator::new();
    let cx = ResolveCx::new(&grammar, &err);

    assert_eq!(cx.lookup("A"), Some(RuleHandle::from_u32(0)));
    assert_eq!(cx.lookup("B"), Some(RuleHandle::from_u32(1)));
    assert_eq!(cx.lookup("C"), None);
    assert!(err.is_empty());
}

#[test]
fn test_duplicate_names() {
    let grammar = Grammar::new(vec![
        Rule::new("A", Expression::Any),
        Rule::new("A", Expression::Any),
    ]);
    let err = ErrorAccumulator::new();
    let cx = ResolveCx::new(&grammar, &err);

    // the first occurrence wins, the duplicate is reported
    assert_eq!(cx.lookup("A"), Some(RuleHandle::from_u32(0)));
    let errors = err.into_errors();
    assert_eq!(errors, vec![CompileError::DuplicateRule { name: "A".into() }]);
}
