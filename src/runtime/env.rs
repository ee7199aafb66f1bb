//! Lexical environments for live programs.
//!
//! An `Env` is a shared chain of frames; closures capture the frame
//! handle, so later writes through one capture are visible through
//! every other. The root frame falls back to the caller-supplied
//! globals object: undeclared bases read and write external state
//! there, which is how host mutations become visible before a
//! `thread()` notification.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

#[derive(Clone)]
pub struct Env(Rc<EnvInner>);

struct EnvInner {
    parent: Option<Env>,
    vars: RefCell<FxHashMap<String, Value>>,
    consts: RefCell<FxHashSet<String>>,
    globals: Option<Value>,
}

impl Env {
    pub fn root(globals: Value) -> Env {
        Env(Rc::new(EnvInner {
            parent: None,
            vars: RefCell::new(FxHashMap::default()),
            consts: RefCell::new(FxHashSet::default()),
            globals: Some(globals),
        }))
    }

    pub fn child(&self) -> Env {
        Env(Rc::new(EnvInner {
            parent: Some(self.clone()),
            vars: RefCell::new(FxHashMap::default()),
            consts: RefCell::new(FxHashSet::default()),
            globals: None,
        }))
    }

    pub fn ptr_eq(a: &Env, b: &Env) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Introduce a binding in this frame, shadowing outer ones.
    pub fn declare(&self, name: &str, value: Value) {
        self.0.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Introduce an immutable binding; [`is_const`](Env::is_const)
    /// answers for it until the frame dies.
    pub fn declare_const(&self, name: &str, value: Value) {
        self.declare(name, value);
        self.0.consts.borrow_mut().insert(name.to_string());
    }

    /// Is `name` a `const` binding in its declaring frame?
    pub fn is_const(&self, name: &str) -> bool {
        let mut current = self;
        loop {
            if current.0.vars.borrow().contains_key(name) {
                return current.0.consts.borrow().contains(name);
            }
            match &current.0.parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Read a name; undeclared names resolve to the globals object (a
    /// missing global reads as `Undefined`).
    pub fn get(&self, name: &str) -> Value {
        let mut current = self;
        loop {
            if let Some(value) = current.0.vars.borrow().get(name) {
                return value.clone();
            }
            match &current.0.parent {
                Some(parent) => current = parent,
                None => {
                    return current
                        .0
                        .globals
                        .as_ref()
                        .map(|globals| globals.get(name))
                        .unwrap_or_default();
                }
            }
        }
    }

    /// Assign to the frame that declares `name`; undeclared names write
    /// external state on the globals object.
    pub fn set(&self, name: &str, value: Value) {
        let mut current = self;
        loop {
            if current.0.vars.borrow().contains_key(name) {
                current.0.vars.borrow_mut().insert(name.to_string(), value);
                return;
            }
            match &current.0.parent {
                Some(parent) => current = parent,
                None => {
                    if let Some(globals) = &current.0.globals {
                        globals.set(name, value);
                    }
                    return;
                }
            }
        }
    }

    pub fn globals(&self) -> Value {
        let mut current = self;
        while let Some(parent) = &current.0.parent {
            current = parent;
        }
        current.0.globals.clone().unwrap_or_default()
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Env({} vars)", self.0.vars.borrow().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_and_write_through() {
        let globals = Value::object([("x", Value::Number(1.0))]);
        let root = Env::root(globals.clone());
        let inner = root.child();
        inner.declare("y", Value::Number(2.0));
        assert_eq!(inner.get("x"), Value::Number(1.0));
        assert_eq!(inner.get("y"), Value::Number(2.0));
        inner.set("x", Value::Number(5.0));
        assert_eq!(globals.get("x"), Value::Number(5.0));
        inner.set("y", Value::Number(7.0));
        assert_eq!(inner.get("y"), Value::Number(7.0));
        assert!(root.get("y").is_undefined());
    }
}
