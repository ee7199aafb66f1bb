//! References and refs: the compile-time record of what depends on what.
//!
//! A `Reference` is opened per expression-level production (one per
//! declarator, one per assignment side); every concrete dependency path
//! met while compiling that production is pushed onto it as a `Ref`.
//! Signal references record reads, effect references record write and
//! declaration targets. A reference that closes with zero refs is
//! discarded rather than emitted.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;

use crate::graph::condition::ConditionId;
use crate::scope::{BindingKind, ScopeId};

pub type ReferenceId = u32;
pub type RefId = u32;
pub type MemoId = u32;

/// One element of a dependency path: a literal property name, or a memo
/// marker standing in for a computed segment whose value is only known
/// per runtime instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathStep {
    Name(String),
    Memo { memo: MemoId },
}

impl PathStep {
    pub fn name(name: impl Into<String>) -> Self {
        PathStep::Name(name.into())
    }
}

/// An ordered dependency path. Most paths are one or two segments deep.
pub type RefPath = SmallVec<[PathStep; 4]>;

pub fn ref_path(parts: &[&str]) -> RefPath {
    parts.iter().map(|p| PathStep::name(*p)).collect()
}

/// Identifies a subscriber reference: the lineage of the unit that owns
/// it plus the reference id inside that unit. Composite, so subscription
/// tables serialize through `serde_json_any_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberKey {
    pub lineage: String,
    pub reference: ReferenceId,
}

impl fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lineage, self.reference)
    }
}

/// One concrete occurrence of a dependency path inside a reference.
#[derive(Debug, Clone, Serialize)]
pub struct Ref {
    pub id: RefId,
    pub path: RefPath,
    /// Extra path segments implied by the destructuring pattern the
    /// containing target belongs to (`let {a: {b}} = x` records
    /// `["a", "b"]` on the ref for `x`).
    #[serde(skip_serializing_if = "SmallVec::is_empty")]
    pub depth: SmallVec<[PathStep; 2]>,
    /// Branch under which this ref is live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionId>,
    /// Matching a change against this ref with a remainder reruns only
    /// the keyed iteration instance named by the remainder, not the
    /// whole driver.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_iteration_contract_target: bool,
    /// Effect refs only: which reflex/ref pairs must be notified when
    /// this ref's value changes.
    #[serde(
        with = "serde_json_any_key::any_key_map",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub subscriptions: IndexMap<SubscriberKey, BTreeSet<RefId>>,
    /// Scope that declares the path's base identifier; `None` for
    /// external (undeclared) state. Used when wiring subscriptions.
    #[serde(skip)]
    pub base_scope: Option<ScopeId>,
}

impl Ref {
    pub fn new(id: RefId, path: RefPath) -> Self {
        Self {
            id,
            path,
            depth: SmallVec::new(),
            condition: None,
            is_iteration_contract_target: false,
            subscriptions: IndexMap::new(),
            base_scope: None,
        }
    }

    pub fn base_name(&self) -> Option<&str> {
        match self.path.first() {
            Some(PathStep::Name(name)) => Some(name),
            _ => None,
        }
    }

    pub fn subscribe(&mut self, subscriber: SubscriberKey, ref_id: RefId) {
        self.subscriptions
            .entry(subscriber)
            .or_default()
            .insert(ref_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Signal,
    Effect,
}

/// A signal (read-side) or effect (write-side) dependency record.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub kind: ReferenceKind,
    pub refs: Vec<Ref>,
    /// Effect references: the signal reference on the opposite side of
    /// the assignment, so effects can be traced from the right-hand
    /// expression to the left-hand target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ReferenceId>,
    /// Effect references on declarations: the declaration kind, used to
    /// reject updates to `const` bindings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl: Option<BindingKind>,
}

impl Reference {
    pub fn new(id: ReferenceId, kind: ReferenceKind) -> Self {
        Self {
            id,
            kind,
            refs: Vec::new(),
            assignee: None,
            decl: None,
        }
    }

    pub fn push_ref(&mut self, r: Ref) -> RefId {
        let id = r.id;
        self.refs.push(r);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn find_ref(&self, id: RefId) -> Option<&Ref> {
        self.refs.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_step_serializes_names_and_memos() {
        let path: RefPath = [PathStep::name("x"), PathStep::Memo { memo: 3 }]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["x",{"memo":3}]"#);
    }

    #[test]
    fn subscriptions_accumulate_ref_ids() {
        let mut r = Ref::new(0, ref_path(&["x"]));
        let key = SubscriberKey {
            lineage: "0/2".to_string(),
            reference: 1,
        };
        r.subscribe(key.clone(), 4);
        r.subscribe(key.clone(), 7);
        r.subscribe(key.clone(), 4);
        assert_eq!(r.subscriptions[&key].len(), 2);
    }
}
