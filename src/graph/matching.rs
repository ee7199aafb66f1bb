//! Prefix-based path matching.
//!
//! Two refs match iff their path arrays are prefix-compatible.
//! Literal segments compare by value at match time; any comparison that
//! involves a computed (memo) segment is deferred, because the memo's
//! value can differ per runtime instance (`obj[i]` where `i` varies by
//! loop iteration). Deferred checks are data, not closures, so they can
//! be re-asserted at drain time against the owning instance's memo
//! store.

use crate::graph::reference::{MemoId, PathStep};
use crate::value::Value;

/// One side of a deferred comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Memo(MemoId),
    Lit(String),
}

/// A comparison postponed to run time. `left` is resolved against the
/// signal-side instance memo store, `right` against the effect-side
/// store (or a literal from a changed path).
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred {
    pub left: Operand,
    pub right: Operand,
}

/// Result of a successful prefix match.
///
/// `remainder` is `len(a) - len(b)`: positive means the signal path is
/// more specific than what changed, so further path-walking continues
/// on the signal side.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatch {
    pub remainder: i32,
    pub deferred: Vec<Deferred>,
}

/// Match the signal-side path `a` against the effect-side path `b`.
pub fn match_refs(a: &[PathStep], b: &[PathStep]) -> Option<PathMatch> {
    let shared = a.len().min(b.len());
    let mut deferred = Vec::new();
    for (left, right) in a[..shared].iter().zip(&b[..shared]) {
        match (left, right) {
            (PathStep::Name(x), PathStep::Name(y)) => {
                if x != y {
                    return None;
                }
            }
            (PathStep::Memo { memo }, PathStep::Name(y)) => deferred.push(Deferred {
                left: Operand::Memo(*memo),
                right: Operand::Lit(y.clone()),
            }),
            (PathStep::Name(x), PathStep::Memo { memo }) => deferred.push(Deferred {
                left: Operand::Lit(x.clone()),
                right: Operand::Memo(*memo),
            }),
            (PathStep::Memo { memo: x }, PathStep::Memo { memo: y }) => deferred.push(Deferred {
                left: Operand::Memo(*x),
                right: Operand::Memo(*y),
            }),
        }
    }
    Some(PathMatch {
        remainder: a.len() as i32 - b.len() as i32,
        deferred,
    })
}

/// Match a ref path against a concrete changed path (literal keys).
/// Returns the match plus deferred checks that only involve the ref
/// side's memo store.
pub fn match_path_keys(path: &[PathStep], keys: &[String]) -> Option<PathMatch> {
    let key_steps: Vec<PathStep> = keys.iter().map(|k| PathStep::Name(k.clone())).collect();
    match_refs(path, &key_steps)
}

/// Re-assert deferred checks. `left`/`right` resolve memo operands
/// against their respective instance memo stores; a check holds when
/// both sides coerce to the same property key.
pub fn deferred_hold(
    deferred: &[Deferred],
    left: &dyn Fn(MemoId) -> Value,
    right: &dyn Fn(MemoId) -> Value,
) -> bool {
    deferred.iter().all(|check| {
        let a = operand_key(&check.left, left);
        let b = operand_key(&check.right, right);
        a == b
    })
}

fn operand_key(operand: &Operand, memo: &dyn Fn(MemoId) -> Value) -> String {
    match operand {
        Operand::Memo(id) => memo(*id).to_key(),
        Operand::Lit(key) => key.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::reference::ref_path;

    #[test]
    fn strict_prefix_reports_positive_remainder() {
        let a = ref_path(&["x", "a", "b"]);
        let b = ref_path(&["x"]);
        let m = match_refs(&a, &b).unwrap();
        assert_eq!(m.remainder, 2);
        assert!(m.deferred.is_empty());
    }

    #[test]
    fn disjoint_paths_do_not_match() {
        let a = ref_path(&["x", "a"]);
        let b = ref_path(&["y", "a"]);
        assert!(match_refs(&a, &b).is_none());
        let c = ref_path(&["x", "b"]);
        assert!(match_refs(&a, &c).is_none());
    }

    #[test]
    fn equal_paths_match_with_zero_remainder() {
        let a = ref_path(&["x", "a"]);
        let m = match_refs(&a, &a).unwrap();
        assert_eq!(m.remainder, 0);
    }

    #[test]
    fn memo_segments_defer_instead_of_failing() {
        let a: Vec<PathStep> = vec![PathStep::name("x"), PathStep::Memo { memo: 2 }];
        let b = ref_path(&["x", "a"]);
        let m = match_refs(&a, &b).unwrap();
        assert_eq!(
            m.deferred,
            vec![Deferred {
                left: Operand::Memo(2),
                right: Operand::Lit("a".to_string()),
            }]
        );
        // Deferred check resolves per-instance.
        let hit = |_: MemoId| Value::string("a");
        let miss = |_: MemoId| Value::string("b");
        let lit = |_: MemoId| Value::Undefined;
        assert!(deferred_hold(&m.deferred, &hit, &lit));
        assert!(!deferred_hold(&m.deferred, &miss, &lit));
    }

    #[test]
    fn changed_key_paths_match_numeric_indices() {
        let path = ref_path(&["list"]);
        let keys = vec!["list".to_string(), "2".to_string()];
        let m = match_path_keys(&path, &keys).unwrap();
        assert_eq!(m.remainder, -1);
    }
}
