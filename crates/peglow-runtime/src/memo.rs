use std::collections::HashMap;

use crate::{Mismatch, RuleHandle, Value};

/// Per-rule result cache for packrat parsing.
///
/// Owned by exactly one parse session and dropped with it, so entries can
/// never leak between cursors. Replaying an entry moves the cursor to `end`
/// and yields the stored outcome unchanged.
#[derive(Default)]
pub struct MemoCache {
    entries: HashMap<(RuleHandle, u32), MemoEntry>,
}

pub struct MemoEntry {
    pub outcome: Result<Value, Mismatch>,
    pub end: u32,
}

impl MemoCache {
    pub fn new() -> MemoCache {
        MemoCache::default()
    }

    pub fn get(&self, rule: RuleHandle, position: u32) -> Option<&MemoEntry> {
        self.entries.get(&(rule, position))
    }

    pub fn insert(
        &mut self,
        rule: RuleHandle,
        position: u32,
        outcome: Result<Value, Mismatch>,
        end: u32,
    ) {
        self.entries.insert((rule, position), MemoEntry { outcome, end });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[test]
fn test_replay() {
    let rule = RuleHandle::from_u32(0);
    let mut cache = MemoCache::new();
    assert!(cache.get(rule, 3).is_none());

    cache.insert(rule, 3, Ok(Value::Str("ab".to_owned())), 5);
    let entry = cache.get(rule, 3).unwrap();
    assert_eq!(entry.end, 5);
    assert_eq!(entry.outcome, Ok(Value::Str("ab".to_owned())));

    // a different position is a different slot
    assert!(cache.get(rule, 4).is_none());
}
