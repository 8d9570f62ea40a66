use std::cell::RefCell;

use peglow_runtime::RcString;

/// Structural failures that abort compilation. None of these can be
/// recovered from; they are collected and returned as a batch.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CompileError {
    EmptyGrammar,
    DuplicateRule { name: RcString },
    UndefinedReference { rule: RcString, target: RcString },
    InvertedClassRange { rule: RcString, low: char, high: char },
    UnknownStartRule { name: RcString },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::EmptyGrammar => {
                write!(f, "Grammar contains no rules")
            }
            CompileError::DuplicateRule { name } => {
                write!(f, "Duplicate rule `{name}`")
            }
            CompileError::UndefinedReference { rule, target } => {
                write!(f, "Rule `{rule}` references undefined rule `{target}`")
            }
            CompileError::InvertedClassRange { rule, low, high } => {
                write!(f, "Inverted class range {low}-{high} in rule `{rule}`")
            }
            CompileError::UnknownStartRule { name } => {
                write!(f, "Start rule `{name}` does not exist")
            }
        }
    }
}

impl std::error::Error for CompileError {}

#[derive(Default)]
pub struct ErrorAccumulator {
    errors: RefCell<Vec<CompileError>>,
}

impl ErrorAccumulator {
    pub fn new() -> ErrorAccumulator {
        ErrorAccumulator::default()
    }

    pub fn push(&self, error: CompileError) {
        self.errors.borrow_mut().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    pub fn into_errors(self) -> Vec<CompileError> {
        self.errors.into_inner()
    }
}

#[test]
fn test_accumulates_in_order() {
    let err = ErrorAccumulator::new();
    assert!(err.is_empty());

    err.push(CompileError::EmptyGrammar);
    err.push(CompileError::DuplicateRule { name: "A".into() });
    assert!(!err.is_empty());

    let errors = err.into_errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], CompileError::EmptyGrammar);
}
