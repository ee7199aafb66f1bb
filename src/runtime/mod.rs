//! The runtime: live instances, exits, and the notification scheduler.
//!
//! A [`Runtime`] owns the compiled graph, the live instance tree, and
//! the per-invocation exit state shared by the whole tree. Change
//! notifications enter through [`thread`](crate::runtime::Thread) and
//! selectively re-run subscribed instances in lineage order.

mod env;
mod instance;
mod thread;

pub use env::Env;
pub use instance::{Children, Instance};
pub use thread::{Thread, ThreadTrace, TraceStep};

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::Function;
use crate::graph::{Graph, UnitId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Break,
    Continue,
    Return,
}

impl ExitKind {
    pub fn parse(s: &str) -> Option<ExitKind> {
        match s {
            "break" => Some(ExitKind::Break),
            "continue" => Some(ExitKind::Continue),
            "return" => Some(ExitKind::Return),
            _ => None,
        }
    }
}

/// A pending `break`/`continue`/`return`, resolved against its target
/// unit's native keyword guard (or, for `return`, the target function
/// instance finishing its run).
#[derive(Debug, Clone)]
pub struct ExitRecord {
    pub kind: ExitKind,
    pub label: Option<String>,
    pub value: Value,
    pub target: UnitId,
}

impl ExitRecord {
    pub fn status(&self) -> ExitStatus {
        ExitStatus {
            kind: self.kind,
            label: self.label.clone(),
            target: self.target,
        }
    }
}

/// Exit outcome of one instance run, without the carried value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub kind: ExitKind,
    pub label: Option<String>,
    pub target: UnitId,
}

pub struct Runtime {
    pub graph: Rc<Graph>,
    pub globals: Value,
    pub root: RefCell<Option<Rc<Instance>>>,
    /// At most one exit is pending at a time per invocation.
    pub pending_exit: RefCell<Option<ExitRecord>>,
    /// Closure bodies by unit, recorded on first entry; re-runs and
    /// function calls re-invoke these.
    pub closures: RefCell<FxHashMap<UnitId, Rc<Function>>>,
    /// Drain steps of the most recent thread, for introspection.
    pub trace: RefCell<ThreadTrace>,
}

impl Runtime {
    pub fn new(graph: Rc<Graph>, globals: Value) -> Runtime {
        Runtime {
            graph,
            globals,
            root: RefCell::new(None),
            pending_exit: RefCell::new(None),
            closures: RefCell::new(FxHashMap::default()),
            trace: RefCell::new(ThreadTrace::default()),
        }
    }

    pub fn closure(&self, unit: UnitId) -> Option<Rc<Function>> {
        self.closures.borrow().get(&unit).cloned()
    }

    pub fn record_closure(&self, unit: UnitId, function: &Function) -> Rc<Function> {
        self.closures
            .borrow_mut()
            .entry(unit)
            .or_insert_with(|| Rc::new(function.clone()))
            .clone()
    }

    /// All live instances of a unit, fanning out across iteration maps.
    pub fn instances_of(&self, unit: UnitId) -> Vec<Rc<Instance>> {
        let Some(root) = self.root.borrow().clone() else {
            return Vec::new();
        };
        let Some(trail) = self.graph.trail(unit) else {
            return Vec::new();
        };
        root.locate(trail)
    }

    /// Is a run of `instance` currently suppressed by a pending exit
    /// whose target sits above it?
    pub fn suppressed_by_exit(&self, instance: &Rc<Instance>) -> bool {
        let pending = self.pending_exit.borrow();
        let Some(exit) = pending.as_ref() else {
            return false;
        };
        if exit.target == instance.unit {
            return false;
        }
        instance.ancestor_of_unit(exit.target).is_some()
    }
}
