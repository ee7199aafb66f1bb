//! Error taxonomy: compile errors, internal consistency errors, and
//! runtime user errors.
//!
//! Compile errors abort the transform before any runtime object exists.
//! Internal errors indicate a compiler bug (graph and callee tree out of
//! agreement) and are fatal. Runtime errors propagate out of
//! `execute()`/`thread()` to the caller; nothing is silently retried.

use ariadne::{Config, Label, Report, ReportKind, Source};
use std::fmt;
use std::io::Cursor;

use crate::ast::Span;

/// Error raised while transforming a program.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Static assignment to a `const` binding.
    ConstAssignment { name: String, span: Span },
    /// A pattern the transform cannot express (e.g. a default parameter
    /// value on a live function).
    InvalidPattern { message: String, span: Span },
    /// Corrupted production stack or similar compiler invariant. A bug.
    Internal(String),
}

impl CompileError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::ConstAssignment { span, .. }
            | CompileError::InvalidPattern { span, .. } => Some(*span),
            CompileError::Internal(_) => None,
        }
    }

    /// Render a span-labelled report against the original source text.
    pub fn report(&self, filename: &str, source_code: &str) -> String {
        let span = self.span().unwrap_or_default();
        let range = span.start as usize..span.end as usize;
        let mut bytes = Cursor::new(Vec::new());
        Report::build(ReportKind::Error, (filename, range.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(self.to_string())
            .with_label(Label::new((filename, range)).with_message(self.to_string()))
            .finish()
            .write((filename, Source::from(source_code)), &mut bytes)
            .expect("report rendering never fails on an in-memory buffer");
        String::from_utf8(bytes.into_inner()).expect("ariadne emits UTF-8")
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::ConstAssignment { name, .. } => {
                write!(f, "assignment to constant binding '{name}'")
            }
            CompileError::InvalidPattern { message, .. } => write!(f, "{message}"),
            CompileError::Internal(message) => write!(f, "internal compiler error: {message}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Error raised while executing or re-threading a live program.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Invoking an instance that was superseded or explicitly disposed.
    Disposed { lineage: String },
    /// Run-time assignment to a `const` binding.
    ConstAssignment { name: String },
    /// `for-of` over a value that is not iterable.
    NotIterable { type_name: &'static str },
    /// Calling a value that is not a function.
    NotCallable { type_name: &'static str },
    /// Thrown by user code (`throw` statement).
    Thrown(String),
    /// The compiled graph and callee tree disagree. A compiler bug.
    UnknownUnit { id: u32 },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Disposed { lineage } => {
                write!(f, "cannot invoke disposed instance at {lineage}")
            }
            RuntimeError::ConstAssignment { name } => {
                write!(f, "assignment to constant binding '{name}'")
            }
            RuntimeError::NotIterable { type_name } => {
                write!(f, "value of type {type_name} is not iterable")
            }
            RuntimeError::NotCallable { type_name } => {
                write!(f, "value of type {type_name} is not callable")
            }
            RuntimeError::Thrown(message) => write!(f, "uncaught: {message}"),
            RuntimeError::UnknownUnit { id } => {
                write!(f, "graph/callee mismatch: unknown child unit {id}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_report_names_the_binding() {
        let error = CompileError::ConstAssignment {
            name: "total".to_string(),
            span: Span::new(10, 15),
        };
        let report = error.report("main.js", "const total = 1;\ntotal = 2;\n");
        assert!(report.contains("total"));
    }
}
