//! The transformer: whole-program AST rewrite with static dependency
//! analysis.
//!
//! Walks the source AST once, wrapping each reactive boundary (program,
//! block, if, switch, loop, try, labeled statement, bare expression
//! statement, return, function body) in a `$q(childId, closure)` call,
//! recording per-statement read/write property paths on signal and
//! effect references as it goes. The result is the instrumented output
//! AST plus the serializable dependency graph.
//!
//! Compiler state is an explicit [`Ctx`] value threaded through the
//! `transform_*` calls; the only mutable stacks live on the
//! [`Transformer`] itself (the unit arena and the open-production
//! stack).

mod expressions;
mod patterns;
mod resolve;
mod statements;

use indexmap::IndexMap;

use crate::ast::{self, Expr, Program, Span, Stmt};
use crate::error::CompileError;
use crate::graph::{
    Condition, ConditionId, Graph, MemoId, Ref, RefId, RefPath, Reference, ReferenceId,
    ReferenceKind, Unit, UnitId, UnitKind, UnitSpec, lineage,
};
use crate::scope::{BindingKind, LocId, ScopeArena, ScopeId};

/// Injected construct parameter in generated code.
pub const CONSTRUCT: &str = "$q";

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Treat the whole program as a reactive region even without a
    /// `live` annotation on the root node.
    pub live_mode: bool,
}

/// Result of a successful transform.
#[derive(Debug)]
pub struct Compiled {
    pub graph: Graph,
    pub out: Program,
}

/// Compile a source program into an instrumented program plus its
/// dependency graph.
pub fn transform(program: &Program, options: &TransformOptions) -> Result<Compiled, CompileError> {
    let mut transformer = Transformer::new();
    transformer.run(program, options)
}

// ---------------------------------------------------------------------
// Context

/// Immutable per-call compiler context.
#[derive(Debug, Clone)]
pub(super) struct Ctx {
    /// Current lexical scope.
    pub scope: ScopeId,
    /// Boundary whose closure body is being filled.
    pub unit: usize,
    /// Nearest enclosing function (or program) boundary; await hoisting
    /// stops here, `return` targets here.
    pub function: usize,
    /// Branch condition every ref recorded under this context carries.
    pub condition: Option<ConditionId>,
    /// Inside a reactive region. Non-live statements pass through
    /// untouched.
    pub live: bool,
}

impl Ctx {
    fn at_unit(&self, unit: usize) -> Ctx {
        Ctx {
            unit,
            ..self.clone()
        }
    }

    fn with_scope(&self, scope: ScopeId) -> Ctx {
        Ctx {
            scope,
            ..self.clone()
        }
    }

    fn with_condition(&self, condition: ConditionId) -> Ctx {
        Ctx {
            condition: Some(condition),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------
// Exits

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum ExitKind {
    Break,
    Continue,
    Return,
}

impl ExitKind {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            ExitKind::Break => "break",
            ExitKind::Continue => "continue",
            ExitKind::Return => "return",
        }
    }
}

/// An exit escaping a boundary closure, still looking for its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct ExitKey {
    pub kind: ExitKind,
    pub label: Option<String>,
}

// ---------------------------------------------------------------------
// Unit builders

/// A graph unit under construction. Children are arena indices; ids are
/// dense and double as arena positions.
#[derive(Debug)]
pub(super) struct UnitBuilder {
    pub id: UnitId,
    pub kind: UnitKind,
    pub parent: Option<usize>,
    pub lineage: String,
    pub loc: Option<LocId>,
    pub spec: UnitSpec,
    pub signals: IndexMap<ReferenceId, Reference>,
    pub effects: IndexMap<ReferenceId, Reference>,
    pub conditions: IndexMap<ConditionId, Condition>,
    pub children: Vec<usize>,
    pub hoisted_await: bool,
    pub memo_count: u32,
}

/// A signal reference currently open for the production being compiled.
#[derive(Debug)]
pub(super) struct OpenSignal {
    pub unit: usize,
    pub reference: Reference,
}

pub(super) struct Transformer {
    pub scopes: ScopeArena,
    pub units: Vec<UnitBuilder>,
    /// Open-production stack; reads always land on the top entry.
    pub productions: Vec<OpenSignal>,
    next_reference: ReferenceId,
    next_ref: RefId,
    next_condition: ConditionId,
}

impl Transformer {
    fn new() -> Self {
        Self {
            scopes: ScopeArena::new(),
            units: Vec::new(),
            productions: Vec::new(),
            next_reference: 0,
            next_ref: 0,
            next_condition: 0,
        }
    }

    fn run(
        &mut self,
        program: &Program,
        options: &TransformOptions,
    ) -> Result<Compiled, CompileError> {
        let root_scope = self.scopes.push(None, true);
        let root = self.new_unit(None, UnitKind::Program, Some(program.span));
        let ctx = Ctx {
            scope: root_scope,
            unit: root,
            function: root,
            condition: None,
            live: program.live || options.live_mode,
        };

        let mut body = Vec::new();
        let mut escapes = Vec::new();
        self.transform_stmts(&ctx, &program.body, &mut body, &mut escapes)?;
        // Ignore return exits escaping the program root; the runtime
        // resolves them when the root callee finishes.
        escapes.retain(|exit| exit.kind != ExitKind::Return);
        if let Some(stray) = escapes.first() {
            return Err(CompileError::Internal(format!(
                "unresolved {} exit at program root",
                stray.kind.as_str()
            )));
        }

        if !self.productions.is_empty() {
            return Err(CompileError::Internal(
                "open production left on the stack after transform".to_string(),
            ));
        }

        self.resolve()?;

        let graph_root = self.finish_unit(root);
        let locations = std::mem::take(&mut self.scopes).into_locations();
        Ok(Compiled {
            graph: Graph::new(graph_root, locations),
            out: Program {
                body,
                live: program.live || options.live_mode,
                span: program.span,
            },
        })
    }

    // -- unit arena ---------------------------------------------------

    pub(super) fn new_unit(
        &mut self,
        parent: Option<usize>,
        kind: UnitKind,
        span: Option<Span>,
    ) -> usize {
        let id = self.units.len() as UnitId;
        let lineage = match parent {
            Some(p) => lineage::child(&self.units[p].lineage, id),
            None => id.to_string(),
        };
        let loc = span.map(|s| self.scopes.add_location(s));
        if let Some(p) = parent {
            self.units[p].children.push(id as usize);
        }
        self.units.push(UnitBuilder {
            id,
            kind,
            parent,
            lineage,
            loc,
            spec: UnitSpec::default(),
            signals: IndexMap::new(),
            effects: IndexMap::new(),
            conditions: IndexMap::new(),
            children: Vec::new(),
            hoisted_await: false,
            memo_count: 0,
        });
        id as usize
    }

    /// Collapse a finished builder subtree into an immutable graph unit.
    fn finish_unit(&mut self, index: usize) -> Unit {
        let children = std::mem::take(&mut self.units[index].children);
        let mut sub_units = IndexMap::new();
        for child in children {
            let unit = self.finish_unit(child);
            sub_units.insert(unit.id, unit);
        }
        let builder = &mut self.units[index];
        Unit {
            id: builder.id,
            kind: builder.kind,
            lineage: std::mem::take(&mut builder.lineage),
            loc: builder.loc,
            spec: std::mem::take(&mut builder.spec),
            signals: std::mem::take(&mut builder.signals),
            effects: std::mem::take(&mut builder.effects),
            conditions: std::mem::take(&mut builder.conditions),
            sub_units,
            hoisted_await: builder.hoisted_await,
            memo_count: builder.memo_count,
        }
    }

    // -- ids ----------------------------------------------------------

    pub(super) fn next_reference_id(&mut self) -> ReferenceId {
        let id = self.next_reference;
        self.next_reference += 1;
        id
    }

    pub(super) fn next_ref_id(&mut self) -> RefId {
        let id = self.next_ref;
        self.next_ref += 1;
        id
    }

    pub(super) fn new_memo(&mut self, unit: usize) -> MemoId {
        let id = self.units[unit].memo_count;
        self.units[unit].memo_count += 1;
        id
    }

    pub(super) fn new_condition(
        &mut self,
        unit: usize,
        kind: crate::graph::ConditionKind,
        parent: Option<ConditionId>,
    ) -> ConditionId {
        let id = self.next_condition;
        self.next_condition += 1;
        self.units[unit]
            .conditions
            .insert(id, Condition::new(id, kind, parent));
        id
    }

    // -- productions --------------------------------------------------

    /// Open a signal reference for the production being compiled; reads
    /// met while it is on top of the stack register refs on it.
    pub(super) fn open_signal(&mut self, unit: usize) {
        let reference = Reference::new(self.next_reference_id(), ReferenceKind::Signal);
        self.productions.push(OpenSignal { unit, reference });
    }

    /// Close the top production. Empty references are discarded; the id
    /// is only reported for references that actually carry refs, so
    /// assignee links never point at nothing.
    pub(super) fn close_signal(&mut self) -> Result<Option<ReferenceId>, CompileError> {
        let open = self.productions.pop().ok_or_else(|| {
            CompileError::Internal("close_signal with no open production".to_string())
        })?;
        if open.reference.is_empty() {
            return Ok(None);
        }
        let id = open.reference.id;
        self.units[open.unit].signals.insert(id, open.reference);
        Ok(Some(id))
    }

    /// Record a read on the open production, if any. Reads outside any
    /// production (non-live regions, generated code) register nothing.
    pub(super) fn push_signal_ref(&mut self, ctx: &Ctx, path: RefPath) -> Option<RefId> {
        self.push_signal_ref_with(ctx, path, Default::default(), false)
    }

    pub(super) fn push_signal_ref_with(
        &mut self,
        ctx: &Ctx,
        path: RefPath,
        depth: smallvec::SmallVec<[crate::graph::PathStep; 2]>,
        is_iteration_contract_target: bool,
    ) -> Option<RefId> {
        let base_scope = self.base_scope(ctx, &path);
        let id = self.next_ref_id();
        let open = self.productions.last_mut()?;
        let mut r = Ref::new(id, path);
        r.depth = depth;
        r.condition = ctx.condition;
        r.is_iteration_contract_target = is_iteration_contract_target;
        r.base_scope = base_scope;
        open.reference.push_ref(r);
        Some(id)
    }

    /// Open, fill, and install an effect reference on a unit.
    pub(super) fn new_effect(
        &mut self,
        unit: usize,
        decl: Option<BindingKind>,
        assignee: Option<ReferenceId>,
    ) -> ReferenceId {
        let id = self.next_reference_id();
        let mut reference = Reference::new(id, ReferenceKind::Effect);
        reference.decl = decl;
        reference.assignee = assignee;
        self.units[unit].effects.insert(id, reference);
        id
    }

    pub(super) fn push_effect_ref(
        &mut self,
        ctx: &Ctx,
        unit: usize,
        reference: ReferenceId,
        path: RefPath,
    ) -> RefId {
        let base_scope = self.base_scope(ctx, &path);
        let id = self.next_ref_id();
        let mut r = Ref::new(id, path);
        r.condition = ctx.condition;
        r.base_scope = base_scope;
        self.units[unit]
            .effects
            .get_mut(&reference)
            .expect("effect reference exists")
            .push_ref(r);
        id
    }

    fn base_scope(&self, ctx: &Ctx, path: &RefPath) -> Option<ScopeId> {
        use crate::graph::PathStep;
        match path.first() {
            Some(PathStep::Name(name)) => {
                self.scopes.lookup(ctx.scope, name).map(|(scope, _)| scope)
            }
            _ => None,
        }
    }

    // -- const checking -----------------------------------------------

    /// Reject writes through a `const` binding.
    pub(super) fn check_writable(
        &self,
        ctx: &Ctx,
        name: &str,
        span: Span,
    ) -> Result<(), CompileError> {
        if let Some((_, BindingKind::Const)) = self.scopes.lookup(ctx.scope, name) {
            return Err(CompileError::ConstAssignment {
                name: name.to_string(),
                span,
            });
        }
        Ok(())
    }

    pub(super) fn declare(
        &mut self,
        ctx: &Ctx,
        name: &str,
        kind: BindingKind,
        span: Span,
    ) -> Result<(), CompileError> {
        if name == CONSTRUCT {
            return Err(CompileError::InvalidPattern {
                message: format!("'{CONSTRUCT}' is reserved in live code"),
                span,
            });
        }
        self.scopes.declare(ctx.scope, name, kind);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Generated-code builders shared by the statement and expression passes.

/// `$q`
pub(super) fn construct() -> Expr {
    ast::build::ident(CONSTRUCT)
}

/// `$q(id, closure)` or `$q(id, key, closure)`
pub(super) fn construct_call(id: UnitId, key: Option<Expr>, closure: Expr) -> Expr {
    let mut args = vec![ast::build::num(id as f64)];
    if let Some(key) = key {
        args.push(key);
    }
    args.push(closure);
    ast::build::call(construct(), args)
}

/// `$q.memo[id] = value`
pub(super) fn memo_assign(id: MemoId, value: Expr) -> Expr {
    let slot = ast::build::index(
        ast::build::member(construct(), "memo"),
        ast::build::num(id as f64),
    );
    ast::build::assign(ast::Pattern::Member(slot), value)
}

/// `$q.exit(kind, label, value?)`
pub(super) fn exit_call(kind: ExitKind, label: Option<&str>, value: Option<Expr>) -> Expr {
    let mut args = vec![ast::build::str_(kind.as_str())];
    args.push(match label {
        Some(label) => ast::build::str_(label),
        None => ast::build::undefined(),
    });
    if let Some(value) = value {
        args.push(value);
    }
    ast::build::call(ast::build::member(construct(), "exit"), args)
}

/// `if ($q.exiting(kind, label)) <native>;`
pub(super) fn exiting_guard(exit: &ExitKey, native: Stmt) -> Stmt {
    let test = ast::build::call(
        ast::build::member(construct(), "exiting"),
        vec![
            ast::build::str_(exit.kind.as_str()),
            match &exit.label {
                Some(label) => ast::build::str_(label),
                None => ast::build::undefined(),
            },
        ],
    );
    ast::build::if_(test, native, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;

    #[test]
    fn empty_live_program_compiles_to_a_bare_root() {
        let program = build::program(vec![]);
        let compiled = transform(&program, &TransformOptions::default()).unwrap();
        assert_eq!(compiled.graph.root.kind, UnitKind::Program);
        assert!(compiled.graph.root.sub_units.is_empty());
        assert!(compiled.out.body.is_empty());
    }

    #[test]
    fn reserved_construct_name_is_rejected() {
        let program = build::program(vec![build::let_(CONSTRUCT, build::num(1.0))]);
        let error = transform(&program, &TransformOptions::default()).unwrap_err();
        assert!(matches!(error, CompileError::InvalidPattern { .. }));
    }
}
