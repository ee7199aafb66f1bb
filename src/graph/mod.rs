//! The compiled dependency graph.
//!
//! One `Unit` per reactive boundary, built once at compile time and
//! immutable afterwards; the runtime instantiates units, possibly many
//! times concurrently (one instance per live loop iteration). The whole
//! graph serializes to JSON with `None`/empty fields omitted.

pub mod condition;
pub mod lineage;
pub mod matching;
pub mod reference;

pub use condition::{Condition, ConditionId, ConditionKind};
pub use reference::{
    MemoId, PathStep, Ref, RefId, RefPath, Reference, ReferenceId, ReferenceKind, SubscriberKey,
    ref_path,
};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ast::Span;
use crate::scope::LocId;

pub type UnitId = u32;

/// What kind of reactive boundary a unit wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    Program,
    Function,
    Block,
    If,
    Switch,
    /// Loop driver: owns init/test/update or the iterated collection.
    Iteration,
    /// One live element of a loop, keyed by index/property key.
    IterationInstance,
    Return,
    Statement,
    Try,
    Labeled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopKind {
    For,
    ForIn,
    ForOf,
    While,
    DoWhile,
}

/// Per-unit compile facts the runtime needs beyond the kind tag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitSpec {
    /// Branch test / switch discriminant memo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_memo: Option<MemoId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_kind: Option<LoopKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Generated binding that carries the iteration key inside the
    /// driver's emitted loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iter_var: Option<String>,
    /// True when the unit sits in a non-live region and never reruns.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_static: bool,
}

impl UnitSpec {
    pub fn is_empty(&self) -> bool {
        self.test_memo.is_none()
            && self.loop_kind.is_none()
            && self.label.is_none()
            && self.iter_var.is_none()
            && !self.is_static
    }
}

/// One compiled reactive boundary.
#[derive(Debug, Clone, Serialize)]
pub struct Unit {
    pub id: UnitId,
    pub kind: UnitKind,
    /// Slash-joined ancestor id path; the graph's primary ordering key.
    pub lineage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<LocId>,
    #[serde(skip_serializing_if = "UnitSpec::is_empty")]
    pub spec: UnitSpec,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub signals: IndexMap<ReferenceId, Reference>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub effects: IndexMap<ReferenceId, Reference>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: IndexMap<ConditionId, Condition>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub sub_units: IndexMap<UnitId, Unit>,
    /// An `await` somewhere below (short of the nearest function
    /// boundary) forces this unit's closure to be async.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hoisted_await: bool,
    /// Number of memo slots the unit's instances allocate.
    #[serde(skip_serializing_if = "is_zero")]
    pub memo_count: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Unit {
    /// Depth-first walk over this unit and everything below it.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Unit)) {
        visit(self);
        for child in self.sub_units.values() {
            child.walk(visit);
        }
    }

    pub fn reference(&self, id: ReferenceId) -> Option<&Reference> {
        self.signals.get(&id).or_else(|| self.effects.get(&id))
    }

    /// Evaluate a condition chain declared on this unit's ancestry.
    pub fn condition(&self, id: ConditionId) -> Option<&Condition> {
        self.conditions.get(&id)
    }
}

/// The compiled graph: unit tree plus the source-location table.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    pub root: Unit,
    pub locations: Vec<Span>,
    #[serde(skip)]
    index: FxHashMap<UnitId, Vec<UnitId>>,
}

impl Graph {
    pub fn new(root: Unit, locations: Vec<Span>) -> Self {
        let mut index = FxHashMap::default();
        build_index(&root, &mut Vec::new(), &mut index);
        Self {
            root,
            locations,
            index,
        }
    }

    /// Unit-id path from the root down to `id` (root excluded).
    pub fn trail(&self, id: UnitId) -> Option<&[UnitId]> {
        self.index.get(&id).map(Vec::as_slice)
    }

    /// Look a unit up by id.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        let path = self.index.get(&id)?;
        let mut current = &self.root;
        for step in path {
            current = current.sub_units.get(step)?;
        }
        Some(current)
    }

    /// The unit owning a condition, searching from `unit` upwards.
    pub fn condition_owner(&self, unit: UnitId, condition: ConditionId) -> Option<&Unit> {
        let mut current = Some(unit);
        while let Some(id) = current {
            let u = self.unit(id)?;
            if u.conditions.contains_key(&condition) {
                return Some(u);
            }
            current = self.parent_of(id);
        }
        None
    }

    pub fn parent_of(&self, id: UnitId) -> Option<UnitId> {
        let path = self.index.get(&id)?;
        match path.len() {
            0 => None,
            1 => Some(self.root.id),
            n => Some(path[n - 2]),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("graph serialization is infallible")
    }
}

fn build_index(unit: &Unit, trail: &mut Vec<UnitId>, index: &mut FxHashMap<UnitId, Vec<UnitId>>) {
    index.insert(unit.id, trail.clone());
    for child in unit.sub_units.values() {
        trail.push(child.id);
        build_index(child, trail, index);
        trail.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: UnitId, kind: UnitKind, lineage: &str) -> Unit {
        Unit {
            id,
            kind,
            lineage: lineage.to_string(),
            loc: None,
            spec: UnitSpec::default(),
            signals: IndexMap::new(),
            effects: IndexMap::new(),
            conditions: IndexMap::new(),
            sub_units: IndexMap::new(),
            hoisted_await: false,
            memo_count: 0,
        }
    }

    #[test]
    fn lookup_descends_through_nesting() {
        let mut root = unit(0, UnitKind::Program, "0");
        let mut child = unit(1, UnitKind::Block, "0/1");
        child.sub_units.insert(2, unit(2, UnitKind::Statement, "0/1/2"));
        root.sub_units.insert(1, child);
        let graph = Graph::new(root, Vec::new());
        assert_eq!(graph.unit(2).unwrap().lineage, "0/1/2");
        assert_eq!(graph.parent_of(2), Some(1));
        assert_eq!(graph.parent_of(1), Some(0));
        assert_eq!(graph.parent_of(0), None);
    }

    #[test]
    fn empty_fields_are_omitted_from_json() {
        let graph = Graph::new(unit(0, UnitKind::Program, "0"), Vec::new());
        let json = serde_json::to_string(&graph).unwrap();
        assert!(!json.contains("signals"));
        assert!(!json.contains("subUnits"));
        assert!(!json.contains("hoisted_await"));
    }
}
