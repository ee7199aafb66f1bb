//! Reflex: a fine-grained reactive compiler and runtime for a JS-like
//! source language.
//!
//! The transformer rewrites a conventional AST into boundary closures
//! (`$q(id, closure)`) while extracting per-statement read/write
//! property paths into a serializable dependency graph. The runtime
//! instantiates that graph, runs one cold pass, and afterwards
//! re-executes only the instances subscribed to changed paths, in
//! lineage order.

pub mod ast;
pub mod error;
pub mod graph;
pub mod interpreter;
pub mod printer;
pub mod program;
pub mod runtime;
pub mod scope;
pub mod testing;
pub mod transformer;
pub mod value;

pub use error::{CompileError, RuntimeError};
pub use graph::Graph;
pub use program::{path, LiveProgram, PathKey};
pub use transformer::{transform, Compiled, TransformOptions};
pub use value::Value;
