//! Live reflex instances.
//!
//! One instance per entered graph unit; iteration bodies keep a keyed
//! map of instances, one per live element. Instances are created on
//! (re-)entry and disposed when superseded or when an ancestor
//! disposes; invoking a disposed instance is an error.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::ast::Function;
use crate::graph::{MemoId, UnitId, lineage};
use crate::value::Value;

use super::env::Env;
use super::ExitStatus;

pub enum Children {
    Single(Rc<Instance>),
    Keyed(IndexMap<String, Rc<Instance>>),
}

pub struct Instance {
    pub unit: UnitId,
    /// Unit lineage extended with iteration keys; drain order key.
    pub lineage: String,
    pub key: Option<String>,
    pub parent: Weak<Instance>,
    /// Environment the boundary closure captured at creation.
    pub env: Env,
    /// Recorded closure body, re-invoked on selective re-runs.
    pub closure: RefCell<Option<Rc<Function>>>,
    /// Frame created for the most recent run; iteration drivers' frames
    /// seed synthesized instances for appended keys.
    pub run_env: RefCell<Option<Env>>,
    pub memos: RefCell<FxHashMap<MemoId, Value>>,
    pub children: RefCell<FxHashMap<UnitId, Children>>,
    pub args: RefCell<Vec<Value>>,
    pub disposed: Cell<bool>,
    /// Exit outcome of the previous run, compared across re-runs to
    /// decide whether the exit's target must itself re-run.
    pub last_exit: RefCell<Option<ExitStatus>>,
}

impl Instance {
    pub fn root(unit: UnitId, env: Env) -> Rc<Instance> {
        Rc::new(Instance {
            unit,
            lineage: unit.to_string(),
            key: None,
            parent: Weak::new(),
            env,
            closure: RefCell::new(None),
            run_env: RefCell::new(None),
            memos: RefCell::new(FxHashMap::default()),
            children: RefCell::new(FxHashMap::default()),
            args: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
            last_exit: RefCell::new(None),
        })
    }

    pub fn child(parent: &Rc<Instance>, unit: UnitId, key: Option<String>, env: Env) -> Rc<Instance> {
        let lineage = match &key {
            Some(key) => lineage::keyed_child(&parent.lineage, unit, key),
            None => lineage::child(&parent.lineage, unit),
        };
        Rc::new(Instance {
            unit,
            lineage,
            key,
            parent: Rc::downgrade(parent),
            env,
            closure: RefCell::new(None),
            run_env: RefCell::new(None),
            memos: RefCell::new(FxHashMap::default()),
            children: RefCell::new(FxHashMap::default()),
            args: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
            last_exit: RefCell::new(None),
        })
    }

    pub fn memo(&self, id: MemoId) -> Value {
        self.memos.borrow().get(&id).cloned().unwrap_or_default()
    }

    pub fn set_memo(&self, id: MemoId, value: Value) {
        self.memos.borrow_mut().insert(id, value);
    }

    /// Tear down this instance and its whole subtree.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for children in self.children.borrow().values() {
            match children {
                Children::Single(child) => child.dispose(),
                Children::Keyed(map) => {
                    for child in map.values() {
                        child.dispose();
                    }
                }
            }
        }
    }

    /// Install (or supersede) the child slot for a unit. The previous
    /// occupant of the slot is disposed.
    pub fn adopt(self: &Rc<Self>, unit: UnitId, key: Option<String>, env: Env) -> Rc<Instance> {
        let instance = Instance::child(self, unit, key.clone(), env);
        let mut children = self.children.borrow_mut();
        match key {
            Some(key) => {
                let slot = children.entry(unit).or_insert_with(|| {
                    Children::Keyed(IndexMap::new())
                });
                if let Children::Keyed(map) = slot {
                    if let Some(old) = map.insert(key, instance.clone()) {
                        old.dispose();
                    }
                }
            }
            None => {
                if let Some(Children::Single(old)) =
                    children.insert(unit, Children::Single(instance.clone()))
                {
                    old.dispose();
                }
            }
        }
        instance
    }

    /// The live instance(s) of `unit` somewhere below `self`, fanning
    /// out across keyed iteration maps. `trail` is the unit-id path
    /// from this instance's unit down to the target.
    pub fn locate(self: &Rc<Self>, trail: &[UnitId]) -> Vec<Rc<Instance>> {
        let Some((next, rest)) = trail.split_first() else {
            return if self.disposed.get() {
                Vec::new()
            } else {
                vec![self.clone()]
            };
        };
        let children = self.children.borrow();
        let mut found = Vec::new();
        match children.get(next) {
            Some(Children::Single(child)) => found.extend(child.locate(rest)),
            Some(Children::Keyed(map)) => {
                for child in map.values() {
                    found.extend(child.locate(rest));
                }
            }
            None => {}
        }
        found
    }

    /// The keyed child instance of `unit` for `key`, if live.
    pub fn keyed_child_instance(&self, unit: UnitId, key: &str) -> Option<Rc<Instance>> {
        match self.children.borrow().get(&unit) {
            Some(Children::Keyed(map)) => map.get(key).cloned().filter(|i| !i.disposed.get()),
            _ => None,
        }
    }

    /// Walk ancestors (including self) for the one running `unit`.
    pub fn ancestor_of_unit(self: &Rc<Self>, unit: UnitId) -> Option<Rc<Instance>> {
        let mut current = self.clone();
        loop {
            if current.unit == unit {
                return Some(current);
            }
            let parent = current.parent.upgrade()?;
            current = parent;
        }
    }
}
