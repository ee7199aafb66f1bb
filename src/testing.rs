//! Test harness for driving live programs without an embedder.
//! Provides mutation + notification shorthand and assertions.

use crate::ast::Program;
use crate::error::RuntimeError;
use crate::program::{path, LiveProgram, PathKey};
use crate::runtime::ThreadTrace;
use crate::transformer::{transform, TransformOptions};
use crate::value::Value;

/// Compile with live mode on, panicking on compile errors (tests build
/// their ASTs by hand, so a compile error is a broken test).
pub fn compile(program: &Program) -> crate::transformer::Compiled {
    transform(
        program,
        &TransformOptions { live_mode: true },
    )
    .unwrap_or_else(|error| panic!("compile failed: {error}"))
}

/// A live program plus its globals, with convenience methods for the
/// mutate-notify-assert cycle tests run.
pub struct TestProgram {
    program: LiveProgram,
    globals: Value,
}

impl TestProgram {
    /// Compile `source`, attach `globals`, and run the cold pass.
    pub fn run(source: &Program, globals: Value) -> Self {
        let program = LiveProgram::new(compile(source), globals.clone());
        program.execute().expect("cold run failed");
        Self { program, globals }
    }

    /// Like [`run`](TestProgram::run), but keeps the cold-run value.
    pub fn run_with_result(source: &Program, globals: Value) -> (Self, Value) {
        let program = LiveProgram::new(compile(source), globals.clone());
        let result = program.execute().expect("cold run failed");
        (Self { program, globals }, result)
    }

    /// Write `value` at a dotted path on the globals and notify.
    pub fn mutate(&self, dotted: &str, value: Value) -> Option<Value> {
        let keys: Vec<String> = dotted.split('.').map(str::to_string).collect();
        self.globals.set_path(&keys, value);
        self.notify(&[dotted])
    }

    /// Notify changed paths without mutating (external writes already
    /// applied by the caller).
    pub fn notify(&self, dotted_paths: &[&str]) -> Option<Value> {
        let paths: Vec<Vec<PathKey>> = dotted_paths.iter().map(|p| path(p)).collect();
        self.program
            .thread(&paths)
            .expect("thread failed")
    }

    pub fn thread(&self, paths: &[Vec<PathKey>]) -> Result<Option<Value>, RuntimeError> {
        self.program.thread(paths)
    }

    /// Read a dotted path off the globals.
    pub fn read(&self, dotted: &str) -> Value {
        let keys: Vec<String> = dotted.split('.').map(str::to_string).collect();
        self.globals.get_path(&keys)
    }

    pub fn assert_eq(&self, dotted: &str, expected: Value) {
        let actual = self.read(dotted);
        assert_eq!(
            actual, expected,
            "path '{dotted}' expected {expected:?} but got {actual:?}"
        );
    }

    /// Lineages of the instances the most recent thread re-ran, in
    /// drain order.
    pub fn reruns(&self) -> Vec<String> {
        self.trace().steps.into_iter().map(|step| step.lineage).collect()
    }

    pub fn trace(&self) -> ThreadTrace {
        self.program.trace()
    }

    pub fn program(&self) -> &LiveProgram {
        &self.program
    }

    pub fn globals(&self) -> Value {
        self.globals.clone()
    }
}
