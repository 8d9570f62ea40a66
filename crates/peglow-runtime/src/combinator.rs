//! The fixed library of backtracking operators and the single dispatch
//! routine that interprets descriptor trees against a cursor.

use std::rc::Rc;

use cranelift_bitset::ScalarBitSet;
use cranelift_entity::PrimaryMap;

use crate::{
    cursor::Cursor, memo::MemoCache, Abort, CompiledRule, MatchResult, Mismatch, ParseFail,
    RuleHandle, Value,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClassPart {
    Single(char),
    Range(char, char),
}

/// Membership set over the ASCII range, one bit per code point. Fast path
/// for classes whose parts all lie below 128.
#[derive(Clone, Debug)]
pub struct AsciiSet(ScalarBitSet<u128>);

impl AsciiSet {
    pub fn new() -> AsciiSet {
        AsciiSet(ScalarBitSet::new())
    }

    pub fn insert(&mut self, b: u8) {
        debug_assert!(b < 128);
        self.0.insert(b);
    }

    pub fn contains(&self, b: u8) -> bool {
        b < 128 && self.0.contains(b)
    }
}

impl Default for AsciiSet {
    fn default() -> AsciiSet {
        AsciiSet::new()
    }
}

#[derive(Clone, Debug)]
pub struct CharClass {
    pub parts: Rc<[ClassPart]>,
    pub ignore_case: bool,
    pub inverted: bool,
    ascii: Option<AsciiSet>,
}

impl CharClass {
    pub fn new(parts: Rc<[ClassPart]>, ignore_case: bool, inverted: bool) -> CharClass {
        let ascii = build_ascii_set(&parts, ignore_case);
        CharClass {
            parts,
            ignore_case,
            inverted,
            ascii,
        }
    }

    pub fn matches(&self, c: char) -> bool {
        let hit = match (&self.ascii, c.is_ascii()) {
            (Some(set), true) => set.contains(c as u8),
            _ => self.scan(c),
        };
        hit != self.inverted
    }

    fn scan(&self, c: char) -> bool {
        if self.scan_exact(c) {
            return true;
        }
        if self.ignore_case {
            for alt in [fold_lower(c), fold_upper(c)] {
                if alt != c && self.scan_exact(alt) {
                    return true;
                }
            }
        }
        false
    }

    fn scan_exact(&self, c: char) -> bool {
        self.parts.iter().any(|part| match *part {
            ClassPart::Single(p) => c == p,
            ClassPart::Range(low, high) => low <= c && c <= high,
        })
    }
}

/// All parts must fit in ASCII, otherwise the bit set would answer wrongly
/// for unlisted ASCII inputs and the class falls back to a part scan.
fn build_ascii_set(parts: &[ClassPart], ignore_case: bool) -> Option<AsciiSet> {
    let mut set = AsciiSet::new();
    let mut mark = |c: char| {
        set.insert(c as u8);
        if ignore_case {
            set.insert(c.to_ascii_lowercase() as u8);
            set.insert(c.to_ascii_uppercase() as u8);
        }
    };

    for part in parts {
        match *part {
            ClassPart::Single(c) => {
                if !c.is_ascii() {
                    return None;
                }
                mark(c);
            }
            ClassPart::Range(low, high) => {
                if !low.is_ascii() || !high.is_ascii() {
                    return None;
                }
                for b in (low as u8)..=(high as u8) {
                    mark(b as char);
                }
            }
        }
    }

    Some(set)
}

/// Case folding to a single unit. Multi-character expansions cannot be
/// represented in a unit-for-unit comparison and are left unfolded.
fn fold_lower(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(folded), None) => folded,
        _ => c,
    }
}

fn fold_upper(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(folded), None) => folded,
        _ => c,
    }
}

pub type ActionFn = Rc<dyn Fn(&[Value]) -> Value>;

/// How the arguments of an action callable are extracted from its inner
/// result. The three shapes are fixed at lowering time and are not
/// interchangeable.
#[derive(Clone, Debug)]
pub enum CaptureShape {
    /// One argument per captured label, extracted positionally from the
    /// inner sequence result.
    Indices(Box<[u32]>),
    /// The inner expression is a single bare labeled node; exactly one
    /// argument, its value.
    Single,
    /// No captured labels; the entire inner result as one argument.
    Whole,
}

#[derive(Clone)]
pub struct ActionBinding {
    pub callable: ActionFn,
    pub capture: CaptureShape,
}

impl std::fmt::Debug for ActionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBinding")
            .field("callable", &"<fn>")
            .field("capture", &self.capture)
            .finish()
    }
}

/// Immutable descriptor tree node: operator tag, static arguments, nested
/// descriptors. Built once per grammar node, shared across parses.
#[derive(Clone, Debug)]
pub enum Combinator {
    Literal {
        units: Rc<[char]>,
        ignore_case: bool,
    },
    Class(CharClass),
    Sequence(Vec<Combinator>),
    Choice(Vec<Combinator>),
    OneOrMore(Box<Combinator>),
    ZeroOrMore(Box<Combinator>),
    Optional(Box<Combinator>),
    /// Re-shape a sequence result to the picked element(s).
    Pick {
        inner: Box<Combinator>,
        keep: Box<[u32]>,
    },
    Action {
        inner: Box<Combinator>,
        binding: ActionBinding,
    },
    /// Run inner, discard its structured result, yield the consumed
    /// input substring.
    Text(Box<Combinator>),
    PositiveLookahead(Box<Combinator>),
    NegativeLookahead(Box<Combinator>),
    Any,
    /// Indirect call of a compiled rule, resolved to a handle at compile
    /// time; there is no name lookup at run time.
    Rule(RuleHandle),
}

impl Combinator {
    pub fn display_into(
        &self,
        buf: &mut dyn std::fmt::Write,
        rules: &PrimaryMap<RuleHandle, CompiledRule>,
    ) -> std::fmt::Result {
        self.display_into_indent(buf, rules, 0)
    }

    pub fn display_into_indent(
        &self,
        buf: &mut dyn std::fmt::Write,
        rules: &PrimaryMap<RuleHandle, CompiledRule>,
        indent: u32,
    ) -> std::fmt::Result {
        for _ in 0..indent {
            write!(buf, "  ")?;
        }
        let mut children: &[Combinator] = &[];
        match self {
            Combinator::Literal { units, ignore_case } => {
                let text: String = units.iter().collect();
                write!(buf, "Literal({text:?}")?;
                if *ignore_case {
                    write!(buf, " ignore_case")?;
                }
                write!(buf, ")")?;
            }
            Combinator::Class(class) => {
                write!(buf, "Class(")?;
                if class.inverted {
                    write!(buf, "^")?;
                }
                for part in class.parts.iter() {
                    match *part {
                        ClassPart::Single(c) => write!(buf, "{c}")?,
                        ClassPart::Range(low, high) => write!(buf, "{low}-{high}")?,
                    }
                }
                if class.ignore_case {
                    write!(buf, " ignore_case")?;
                }
                write!(buf, ")")?;
            }
            Combinator::Sequence(inner) => {
                write!(buf, "Sequence")?;
                children = inner;
            }
            Combinator::Choice(inner) => {
                write!(buf, "Choice")?;
                children = inner;
            }
            Combinator::OneOrMore(inner) => {
                write!(buf, "OneOrMore")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::ZeroOrMore(inner) => {
                write!(buf, "ZeroOrMore")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::Optional(inner) => {
                write!(buf, "Optional")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::Pick { inner, keep } => {
                write!(buf, "Pick({keep:?})")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::Action { inner, binding } => {
                let shape = match &binding.capture {
                    CaptureShape::Indices(indices) => format!("captures {indices:?}"),
                    CaptureShape::Single => "single capture".to_owned(),
                    CaptureShape::Whole => "whole".to_owned(),
                };
                write!(buf, "Action({shape})")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::Text(inner) => {
                write!(buf, "Text")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::PositiveLookahead(inner) => {
                write!(buf, "PositiveLookahead")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::NegativeLookahead(inner) => {
                write!(buf, "NegativeLookahead")?;
                children = std::slice::from_ref(inner);
            }
            Combinator::Any => write!(buf, "Any")?,
            Combinator::Rule(handle) => write!(buf, "Rule({})", rules[*handle].name)?,
        }
        write!(buf, "\n")?;
        for child in children {
            child.display_into_indent(buf, rules, indent + 1)?;
        }
        Ok(())
    }
}

/// State of one in-flight parse: the shared cursor, the optional memo
/// cache, and a borrow of the rule table. Exactly one `ParseCx` mutates
/// the cursor at any instant; combinators save and restore its integer
/// position and nothing else.
pub struct ParseCx<'a> {
    rules: &'a PrimaryMap<RuleHandle, CompiledRule>,
    pub cursor: Cursor,
    memo: Option<MemoCache>,
}

impl<'a> ParseCx<'a> {
    pub fn new(
        rules: &'a PrimaryMap<RuleHandle, CompiledRule>,
        cursor: Cursor,
        cache: bool,
    ) -> ParseCx<'a> {
        ParseCx {
            rules,
            cursor,
            memo: cache.then(MemoCache::new),
        }
    }

    /// Compiled entry point of a rule: record the entry position, consult
    /// the cache, evaluate the descriptor, store the outcome.
    pub fn eval_rule(&mut self, handle: RuleHandle) -> MatchResult {
        let start = self.cursor.position();

        if let Some(memo) = &self.memo {
            if let Some(entry) = memo.get(handle, start) {
                self.cursor.set_position(entry.end);
                return entry.outcome.clone().map_err(ParseFail::Mismatch);
            }
        }

        let rules = self.rules;
        let result = self.eval(&rules[handle].body);

        if let Some(memo) = &mut self.memo {
            let outcome = match &result {
                Ok(value) => Ok(value.clone()),
                Err(ParseFail::Mismatch(m)) => Err(*m),
                // aborts poison the whole parse, there is nothing to replay
                Err(ParseFail::Abort(_)) => return result,
            };
            memo.insert(handle, start, outcome, self.cursor.position());
        }

        result
    }

    fn eval(&mut self, node: &Combinator) -> MatchResult {
        match node {
            Combinator::Literal { units, ignore_case } => self.eval_literal(units, *ignore_case),
            Combinator::Class(class) => self.eval_class(class),
            Combinator::Sequence(children) => self.eval_sequence(children),
            Combinator::Choice(alternatives) => self.eval_choice(alternatives),
            Combinator::OneOrMore(inner) => self.eval_repeat(inner, true),
            Combinator::ZeroOrMore(inner) => self.eval_repeat(inner, false),
            Combinator::Optional(inner) => match self.eval(inner) {
                // inner restored the cursor already
                Err(ParseFail::Mismatch(_)) => Ok(Value::Null),
                other => other,
            },
            Combinator::Pick { inner, keep } => self.eval_pick(inner, keep),
            Combinator::Action { inner, binding } => self.eval_action(inner, binding),
            Combinator::Text(inner) => self.eval_text(inner),
            Combinator::PositiveLookahead(inner) => self.eval_lookahead(inner, true),
            Combinator::NegativeLookahead(inner) => self.eval_lookahead(inner, false),
            Combinator::Any => self.eval_any(),
            Combinator::Rule(handle) => self.eval_rule(*handle),
        }
    }

    fn eval_literal(&mut self, units: &[char], ignore_case: bool) -> MatchResult {
        let start = self.cursor.position();
        let len = units.len() as u32;
        if len == 0 {
            return Ok(Value::Str(String::new()));
        }

        let matched = match self.cursor.peek_ahead(len) {
            Some(window) if window.len() == units.len() => {
                if ignore_case {
                    window
                        .iter()
                        .zip(units)
                        .all(|(&a, &b)| fold_lower(a) == fold_lower(b))
                } else {
                    window == units
                }
            }
            _ => false,
        };
        if !matched {
            return Err(ParseFail::Mismatch(Mismatch { position: start }));
        }

        self.cursor.skip(len);
        // positions, not the pattern text, so ignore-case keeps the input spelling
        Ok(Value::Str(self.cursor.substring(start, start + len)))
    }

    fn eval_class(&mut self, class: &CharClass) -> MatchResult {
        let start = self.cursor.position();
        match self.cursor.peek() {
            Some(c) if class.matches(c) => {
                self.cursor.skip(1);
                Ok(Value::Str(c.to_string()))
            }
            _ => Err(ParseFail::Mismatch(Mismatch { position: start })),
        }
    }

    fn eval_any(&mut self) -> MatchResult {
        let start = self.cursor.position();
        match self.cursor.consume() {
            Some(c) => Ok(Value::Str(c.to_string())),
            None => Err(ParseFail::Mismatch(Mismatch { position: start })),
        }
    }

    fn eval_sequence(&mut self, children: &[Combinator]) -> MatchResult {
        let start = self.cursor.position();
        let mut items = Vec::with_capacity(children.len());
        for child in children {
            match self.eval(child) {
                Ok(value) => items.push(value),
                Err(fail) => {
                    if let ParseFail::Mismatch(_) = fail {
                        self.cursor.set_position(start);
                    }
                    return Err(fail);
                }
            }
        }
        Ok(Value::List(items))
    }

    fn eval_choice(&mut self, alternatives: &[Combinator]) -> MatchResult {
        let start = self.cursor.position();
        let mut last = Mismatch { position: start };
        for alternative in alternatives {
            match self.eval(alternative) {
                Ok(value) => return Ok(value),
                Err(ParseFail::Mismatch(m)) => {
                    last = m;
                    self.cursor.set_position(start);
                }
                Err(abort) => return Err(abort),
            }
        }
        // the failure of the last attempted alternative wins
        Err(ParseFail::Mismatch(last))
    }

    fn eval_repeat(&mut self, inner: &Combinator, require_one: bool) -> MatchResult {
        let start = self.cursor.position();
        let mut items = Vec::new();
        loop {
            let before = self.cursor.position();
            match self.eval(inner) {
                Ok(value) => {
                    if self.cursor.position() == before {
                        // a zero-width success would repeat forever
                        return Err(ParseFail::Abort(Abort::EmptyRepetition {
                            position: before,
                        }));
                    }
                    items.push(value);
                }
                Err(ParseFail::Mismatch(m)) => {
                    if require_one && items.is_empty() {
                        self.cursor.set_position(start);
                        return Err(ParseFail::Mismatch(m));
                    }
                    break;
                }
                Err(abort) => return Err(abort),
            }
        }
        Ok(Value::List(items))
    }

    fn eval_pick(&mut self, inner: &Combinator, keep: &[u32]) -> MatchResult {
        let value = self.eval(inner)?;
        let Value::List(mut items) = value else {
            return Ok(value);
        };
        match keep {
            &[index] => Ok(items.swap_remove(index as usize)),
            _ => Ok(Value::List(
                keep.iter().map(|&i| items[i as usize].clone()).collect(),
            )),
        }
    }

    fn eval_action(&mut self, inner: &Combinator, binding: &ActionBinding) -> MatchResult {
        let value = self.eval(inner)?;

        let picked: Vec<Value>;
        let args: &[Value] = match &binding.capture {
            CaptureShape::Indices(indices) => match &value {
                Value::List(items) => {
                    picked = indices.iter().map(|&i| items[i as usize].clone()).collect();
                    &picked
                }
                // lowering only emits index captures over sequences
                _ => std::slice::from_ref(&value),
            },
            CaptureShape::Single | CaptureShape::Whole => std::slice::from_ref(&value),
        };

        Ok((binding.callable)(args))
    }

    fn eval_text(&mut self, inner: &Combinator) -> MatchResult {
        let start = self.cursor.position();
        self.eval(inner)?;
        let end = self.cursor.position();
        Ok(Value::Str(self.cursor.substring(start, end)))
    }

    /// Both lookaheads are zero-width: the cursor is restored no matter
    /// what the inner expression did.
    fn eval_lookahead(&mut self, inner: &Combinator, expect: bool) -> MatchResult {
        let start = self.cursor.position();
        let result = self.eval(inner);
        self.cursor.set_position(start);
        match (result, expect) {
            (Ok(_), true) => Ok(Value::Null),
            (Ok(_), false) => Err(ParseFail::Mismatch(Mismatch { position: start })),
            (Err(ParseFail::Mismatch(_)), false) => Ok(Value::Null),
            (Err(fail @ ParseFail::Mismatch(_)), true) => Err(fail),
            (Err(abort), _) => Err(abort),
        }
    }
}

#[cfg(test)]
fn single_rule(body: Combinator) -> PrimaryMap<RuleHandle, CompiledRule> {
    let mut rules = PrimaryMap::new();
    rules.push(CompiledRule {
        name: "Test".into(),
        body,
    });
    rules
}

#[cfg(test)]
fn literal(text: &str) -> Combinator {
    Combinator::Literal {
        units: text.chars().collect(),
        ignore_case: false,
    }
}

#[test]
fn test_literal_consumes_exactly() {
    let rules = single_rule(literal("ab"));
    let mut cx = ParseCx::new(&rules, Cursor::new("abc"), false);

    let value = cx.eval_rule(RuleHandle::from_u32(0)).unwrap();
    assert_eq!(value, Value::Str("ab".to_owned()));
    assert_eq!(cx.cursor.position(), 2);
}

#[test]
fn test_literal_ignore_case_keeps_input_spelling() {
    let body = Combinator::Literal {
        units: "ab".chars().collect(),
        ignore_case: true,
    };
    let rules = single_rule(body);
    let mut cx = ParseCx::new(&rules, Cursor::new("AB"), false);

    let value = cx.eval_rule(RuleHandle::from_u32(0)).unwrap();
    assert_eq!(value, Value::Str("AB".to_owned()));
}

#[test]
fn test_choice_leaves_no_residue() {
    let body = Combinator::Choice(vec![literal("foo"), literal("bar")]);
    let rules = single_rule(body);

    let mut cx = ParseCx::new(&rules, Cursor::new("bar"), false);
    let value = cx.eval_rule(RuleHandle::from_u32(0)).unwrap();
    assert_eq!(value, Value::Str("bar".to_owned()));
    assert_eq!(cx.cursor.position(), 3);

    // all alternatives fail: the last attempt's position is reported
    let mut cx = ParseCx::new(&rules, Cursor::new("baz"), false);
    let fail = cx.eval_rule(RuleHandle::from_u32(0)).unwrap_err();
    assert_eq!(fail, ParseFail::Mismatch(Mismatch { position: 0 }));
    assert_eq!(cx.cursor.position(), 0);
}

#[test]
fn test_repeat_guard_aborts_on_zero_width() {
    let body = Combinator::ZeroOrMore(Box::new(literal("")));
    let rules = single_rule(body);
    let mut cx = ParseCx::new(&rules, Cursor::new("aaa"), false);

    let fail = cx.eval_rule(RuleHandle::from_u32(0)).unwrap_err();
    assert_eq!(
        fail,
        ParseFail::Abort(Abort::EmptyRepetition { position: 0 })
    );
}

#[test]
fn test_one_or_more_restores_on_failure() {
    let body = Combinator::OneOrMore(Box::new(literal("x")));
    let rules = single_rule(body);
    let mut cx = ParseCx::new(&rules, Cursor::new("yyy"), false);

    assert!(cx.eval_rule(RuleHandle::from_u32(0)).is_err());
    assert_eq!(cx.cursor.position(), 0);
}

#[test]
fn test_lookaheads_never_move_the_cursor() {
    let negative = Combinator::NegativeLookahead(Box::new(literal("a")));
    let rules = single_rule(negative);

    let mut cx = ParseCx::new(&rules, Cursor::new("a"), false);
    assert!(cx.eval_rule(RuleHandle::from_u32(0)).is_err());
    assert_eq!(cx.cursor.position(), 0);

    let mut cx = ParseCx::new(&rules, Cursor::new("b"), false);
    assert_eq!(cx.eval_rule(RuleHandle::from_u32(0)), Ok(Value::Null));
    assert_eq!(cx.cursor.position(), 0);

    let positive = Combinator::PositiveLookahead(Box::new(literal("a")));
    let rules = single_rule(positive);

    let mut cx = ParseCx::new(&rules, Cursor::new("a"), false);
    assert_eq!(cx.eval_rule(RuleHandle::from_u32(0)), Ok(Value::Null));
    assert_eq!(cx.cursor.position(), 0);
}

#[test]
fn test_text_yields_one_substring() {
    let body = Combinator::Text(Box::new(Combinator::Sequence(vec![
        literal("a"),
        literal("b"),
    ])));
    let rules = single_rule(body);
    let mut cx = ParseCx::new(&rules, Cursor::new("ab"), false);

    let value = cx.eval_rule(RuleHandle::from_u32(0)).unwrap();
    assert_eq!(value, Value::Str("ab".to_owned()));
}

#[test]
fn test_class_matching() {
    let digits = CharClass::new(Rc::from([ClassPart::Range('0', '9')]), false, false);
    assert!(digits.matches('5'));
    assert!(!digits.matches('a'));

    let not_digits = CharClass::new(Rc::from([ClassPart::Range('0', '9')]), false, true);
    assert!(!not_digits.matches('5'));
    assert!(not_digits.matches('a'));

    let hex = CharClass::new(
        Rc::from([ClassPart::Range('a', 'f'), ClassPart::Single('x')]),
        true,
        false,
    );
    assert!(hex.matches('B'));
    assert!(hex.matches('X'));
    assert!(!hex.matches('g'));

    // non-ASCII parts disable the bit set but still match by scan
    let greek = CharClass::new(Rc::from([ClassPart::Range('α', 'ω')]), false, false);
    assert!(greek.matches('β'));
    assert!(!greek.matches('b'));
}

#[test]
fn test_memo_replays_outcome_and_position() {
    let body = Combinator::Sequence(vec![
        Combinator::Choice(vec![
            Combinator::Sequence(vec![Combinator::Rule(RuleHandle::from_u32(1)), literal("x")]),
            Combinator::Rule(RuleHandle::from_u32(1)),
        ]),
    ]);

    let mut rules = PrimaryMap::new();
    rules.push(CompiledRule {
        name: "Start".into(),
        body,
    });
    rules.push(CompiledRule {
        name: "Ab".into(),
        body: literal("ab"),
    });

    // the second choice branch re-parses `Ab` at position 0: with the
    // cache on it must replay the first branch's result exactly
    for cache in [false, true] {
        let mut cx = ParseCx::new(&rules, Cursor::new("ab"), cache);
        let value = cx.eval_rule(RuleHandle::from_u32(0)).unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::Str("ab".to_owned())]),
            "cache={cache}"
        );
        assert_eq!(cx.cursor.position(), 2);
    }
}
