//! Branch-membership conditions gating ref liveness.

use serde::Serialize;

use crate::graph::reference::MemoId;
use crate::value::Value;

pub type ConditionId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConditionKind {
    When { when: MemoId },
    WhenNot { when_not: MemoId },
    Switch { switch: MemoId, cases: Vec<MemoId> },
}

/// A branch predicate: `if`/`else` membership keyed by the branch-test
/// memo, or `switch` membership keyed by discriminant and case memos.
/// Nested branches chain through `parent`: a ref is live only when the
/// whole chain holds.
#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub id: ConditionId,
    #[serde(flatten)]
    pub kind: ConditionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ConditionId>,
    /// Reference count; conditions nothing ended up depending on are
    /// pruned from the emitted graph.
    #[serde(skip)]
    pub in_use: u32,
}

impl Condition {
    pub fn new(id: ConditionId, kind: ConditionKind, parent: Option<ConditionId>) -> Self {
        Self {
            id,
            kind,
            parent,
            in_use: 0,
        }
    }

    /// Evaluate this condition (not its parents) against current memo
    /// values.
    pub fn holds(&self, memo: &dyn Fn(MemoId) -> Value) -> bool {
        match &self.kind {
            ConditionKind::When { when } => memo(*when).truthy(),
            ConditionKind::WhenNot { when_not } => !memo(*when_not).truthy(),
            ConditionKind::Switch { switch, cases } => {
                let discriminant = memo(*switch);
                cases.iter().any(|case| memo(*case).strict_eq(&discriminant))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_and_when_not_follow_truthiness() {
        let memo = |_: MemoId| Value::Number(1.0);
        let when = Condition::new(0, ConditionKind::When { when: 0 }, None);
        let when_not = Condition::new(1, ConditionKind::WhenNot { when_not: 0 }, None);
        assert!(when.holds(&memo));
        assert!(!when_not.holds(&memo));
    }

    #[test]
    fn switch_matches_by_strict_equality_on_cases() {
        let memo = |id: MemoId| match id {
            0 => Value::string("b"),
            1 => Value::string("a"),
            _ => Value::string("b"),
        };
        let cond = Condition::new(
            0,
            ConditionKind::Switch {
                switch: 0,
                cases: vec![1, 2],
            },
            None,
        );
        assert!(cond.holds(&memo));
    }

    #[test]
    fn serializes_with_a_flattened_kind() {
        let cond = Condition::new(0, ConditionKind::When { when: 3 }, None);
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["when"], 3);
    }
}
