//! The public live-program surface.
//!
//! `LiveProgram` ties a compiled program (instrumented AST + graph) to a
//! globals object: `execute()` runs the cold pass, `thread(paths)`
//! delivers change notifications for selective re-execution, and
//! `dispose()` tears the instance tree down.

use std::rc::Rc;

use crate::ast::{Function, Program, Span};
use crate::error::RuntimeError;
use crate::graph::Graph;
use crate::interpreter::Interpreter;
use crate::printer;
use crate::runtime::{Env, ExitKind, Instance, Runtime, Thread, ThreadTrace};
use crate::transformer::Compiled;
use crate::value::Value;

/// One segment of a changed path. Indices are carried separately so
/// array notifications read naturally; both collapse to string keys
/// against the value heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    Name(String),
    Index(usize),
}

impl PathKey {
    pub fn name(name: impl Into<String>) -> Self {
        PathKey::Name(name.into())
    }

    fn into_key(self) -> String {
        match self {
            PathKey::Name(name) => name,
            PathKey::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        PathKey::Name(name.to_string())
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

pub struct LiveProgram {
    rt: Runtime,
    out: Program,
    source: Option<String>,
}

impl LiveProgram {
    pub fn new(compiled: Compiled, globals: Value) -> Self {
        let Compiled { graph, out } = compiled;
        Self {
            rt: Runtime::new(Rc::new(graph), globals),
            out,
            source: None,
        }
    }

    /// Attach the original source text, returned by `to_string(true)`.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Cold run: instantiate the root and execute the whole tree once.
    /// Returns the program value (a top-level `return`, or `undefined`).
    pub fn execute(&self) -> Result<Value, RuntimeError> {
        if let Some(old) = self.rt.root.borrow().as_ref() {
            old.dispose();
        }
        let root_unit = self.rt.graph.root.id;
        let body = self.rt.record_closure(
            root_unit,
            &Function {
                name: None,
                params: Vec::new(),
                body: self.out.body.clone(),
                is_async: self.rt.graph.root.hoisted_await,
                is_arrow: false,
                live: self.out.live,
                span: Span::default(),
            },
        );
        let root = Instance::root(root_unit, Env::root(self.rt.globals.clone()));
        *root.closure.borrow_mut() = Some(body);
        *self.rt.root.borrow_mut() = Some(root.clone());
        Interpreter::new(&self.rt).run_instance(&root)
    }

    /// Deliver a batch of changed paths and drain the resulting thread.
    /// Returns the new program value if the batch resolved a top-level
    /// `return`.
    pub fn thread(&self, paths: &[Vec<PathKey>]) -> Result<Option<Value>, RuntimeError> {
        let keyed: Vec<Vec<String>> = paths
            .iter()
            .map(|path| path.iter().cloned().map(PathKey::into_key).collect())
            .collect();
        let thread = Thread::build(&self.rt, &keyed);
        let interpreter = Interpreter::new(&self.rt);
        let mut run = |instance: &Rc<Instance>| interpreter.run_instance(instance);
        thread.drain(&self.rt, &mut run)?;

        // Any exit still pending when the sequence empties is resolved
        // now; only a root return carries a value out.
        let leftover = self.rt.pending_exit.borrow_mut().take();
        Ok(leftover
            .filter(|exit| exit.kind == ExitKind::Return && exit.target == self.rt.graph.root.id)
            .map(|exit| exit.value))
    }

    /// Tear down the live instance tree. Further `thread` calls are
    /// no-ops; `execute` starts over.
    pub fn dispose(&self) {
        if let Some(root) = self.rt.root.borrow().as_ref() {
            root.dispose();
        }
    }

    pub fn globals(&self) -> Value {
        self.rt.globals.clone()
    }

    pub fn graph(&self) -> &Graph {
        &self.rt.graph
    }

    /// Drain steps of the most recent thread.
    pub fn trace(&self) -> ThreadTrace {
        self.rt.trace.borrow().clone()
    }

    /// `raw` returns the attached source text; otherwise a canonical
    /// rendering of the instrumented program.
    pub fn to_string(&self, raw: bool) -> String {
        if raw {
            self.source.clone().unwrap_or_default()
        } else {
            printer::print(&self.out)
        }
    }
}

/// Parse a dotted path (`"x.a"`) into keys. Numeric segments become
/// indices.
pub fn path(dotted: &str) -> Vec<PathKey> {
    dotted
        .split('.')
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => PathKey::Index(index),
            Err(_) => PathKey::Name(segment.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_paths_split_names_and_indices() {
        assert_eq!(
            path("items.2.done"),
            vec![
                PathKey::name("items"),
                PathKey::Index(2),
                PathKey::name("done")
            ]
        );
    }
}
