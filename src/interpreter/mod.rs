//! Tree-walking callee for compiled programs.
//!
//! The interpreter executes the transformer's instrumented output. The
//! injected `$q` construct is the seam between the two sides: `$q(id,
//! closure)` enters a child instance, `$q.memo[i]` reads and writes
//! per-instance memo slots, `$q.exit`/`$q.exiting` emulate non-local
//! control flow across boundary closures. Plain (non-live) code runs
//! through the same evaluator with none of the construct forms present.

mod ops;

use std::rc::Rc;

use crate::ast::{
    AssignOp, CatchClause, DeclKind, Expr, ExprKind, ForTarget, Literal, LogicalOp, ObjectProp,
    Pattern, PropKey, Stmt, StmtKind, SwitchCase, UnaryOp, UpdateOp,
};
use crate::error::RuntimeError;
use crate::graph::{MemoId, UnitId, UnitKind};
use crate::runtime::{Children, Env, ExitKind, ExitRecord, Instance, Runtime};
use crate::transformer::CONSTRUCT;
use crate::value::{FunctionRef, Value};

/// Statement-level control flow.
enum Flow {
    Normal,
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

/// Why evaluation stopped early: a host error, or a user `throw` that
/// may still be caught by an enclosing `try`.
pub enum Interrupt {
    Error(RuntimeError),
    Thrown(Value),
}

impl Interrupt {
    pub fn into_error(self) -> RuntimeError {
        match self {
            Interrupt::Error(error) => error,
            Interrupt::Thrown(value) => RuntimeError::Thrown(value.to_key()),
        }
    }
}

impl From<RuntimeError> for Interrupt {
    fn from(error: RuntimeError) -> Self {
        Interrupt::Error(error)
    }
}

type Exec = Result<Flow, Interrupt>;
type Eval = Result<Value, Interrupt>;

pub struct Interpreter<'rt> {
    rt: &'rt Runtime,
}

impl<'rt> Interpreter<'rt> {
    pub fn new(rt: &'rt Runtime) -> Self {
        Self { rt }
    }

    /// (Re-)run one instance's recorded closure. Used for the cold run
    /// of the root, every `$q` boundary entry, live function calls, and
    /// selective re-runs scheduled by a thread.
    pub fn run_instance(&self, instance: &Rc<Instance>) -> Result<Value, RuntimeError> {
        if instance.disposed.get() {
            return Err(RuntimeError::Disposed {
                lineage: instance.lineage.clone(),
            });
        }
        let Some(closure) = instance.closure.borrow().clone() else {
            return Err(RuntimeError::UnknownUnit { id: instance.unit });
        };
        let env = instance.env.child();
        if let Some(name) = &closure.name {
            env.declare(
                name,
                Value::Function(FunctionRef {
                    unit: Some(instance.unit),
                    env: instance.env.clone(),
                    body: closure.clone(),
                }),
            );
        }
        let args = instance.args.borrow().clone();
        for (index, param) in closure.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or_default();
            self.bind_pattern(instance, &env, param, value, BindMode::Declare(DeclKind::Let))
                .map_err(Interrupt::into_error)?;
        }
        *instance.run_env.borrow_mut() = Some(env.clone());

        // Children re-entered by this run get fresh instances; whatever
        // the previous run created is stale afterwards (untaken
        // branches, removed iteration keys) and is torn down.
        let stale = instance.children.take();
        let flow = self.exec_stmts(instance, &env, &closure.body);
        for children in stale.values() {
            match children {
                Children::Single(child) => child.dispose(),
                Children::Keyed(map) => {
                    for child in map.values() {
                        child.dispose();
                    }
                }
            }
        }
        let flow = flow.map_err(Interrupt::into_error)?;
        let result = match flow {
            Flow::Return(value) => value,
            _ => Value::Undefined,
        };

        // A pending return targeting this boundary resolves here and
        // overrides the native flow value.
        let result = {
            let mut pending = self.rt.pending_exit.borrow_mut();
            match pending.as_ref() {
                Some(exit) if exit.kind == ExitKind::Return && exit.target == instance.unit => {
                    pending.take().map(|exit| exit.value).unwrap_or(result)
                }
                _ => result,
            }
        };
        *instance.last_exit.borrow_mut() = self
            .rt
            .pending_exit
            .borrow()
            .as_ref()
            .map(ExitRecord::status);
        Ok(result)
    }

    // -----------------------------------------------------------------
    // Statements

    fn exec_stmts(&self, instance: &Rc<Instance>, env: &Env, body: &[Stmt]) -> Exec {
        for stmt in body {
            match self.exec_stmt(instance, env, stmt, None)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, instance: &Rc<Instance>, env: &Env, stmt: &Stmt, label: Option<&str>) -> Exec {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval_expr(instance, env, expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::VarDecl { kind, declarators } => {
                for declarator in declarators {
                    let value = match &declarator.init {
                        Some(init) => self.eval_expr(instance, env, init)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(instance, env, &declarator.id, value, BindMode::Declare(*kind))?;
                }
                Ok(Flow::Normal)
            }
            StmtKind::FunctionDecl(function) => {
                let value = Value::Function(FunctionRef {
                    unit: None,
                    env: env.clone(),
                    body: Rc::new((**function).clone()),
                });
                if let Some(name) = &function.name {
                    env.declare(name, value);
                }
                Ok(Flow::Normal)
            }
            StmtKind::Block(body) => self.exec_stmts(instance, &env.child(), body),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(instance, env, test)?.truthy() {
                    self.exec_stmt(instance, env, consequent, None)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(instance, env, alternate, None)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::Switch { discriminant, cases } => {
                self.exec_switch(instance, env, discriminant, cases)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                let env = env.child();
                if let Some(init) = init {
                    self.exec_stmt(instance, &env, init, None)?;
                }
                loop {
                    if let Some(test) = test
                        && !self.eval_expr(instance, &env, test)?.truthy()
                    {
                        break;
                    }
                    match self.loop_body(instance, &env, body, label)? {
                        LoopFlow::Next => {}
                        LoopFlow::Done => break,
                        LoopFlow::Escape(flow) => return Ok(flow),
                    }
                    if let Some(update) = update {
                        self.eval_expr(instance, &env, update)?;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::While { test, body } => {
                while self.eval_expr(instance, env, test)?.truthy() {
                    match self.loop_body(instance, env, body, label)? {
                        LoopFlow::Next => {}
                        LoopFlow::Done => break,
                        LoopFlow::Escape(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    match self.loop_body(instance, env, body, label)? {
                        LoopFlow::Next => {}
                        LoopFlow::Done => break,
                        LoopFlow::Escape(flow) => return Ok(flow),
                    }
                    if !self.eval_expr(instance, env, test)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::ForOf { left, right, body } => {
                let iterated = self.eval_expr(instance, env, right)?;
                let items = match &iterated {
                    Value::Array(items) => items.borrow().clone(),
                    other => {
                        return Err(RuntimeError::NotIterable {
                            type_name: other.type_of(),
                        }
                        .into());
                    }
                };
                for item in items {
                    let env = env.child();
                    self.bind_for_target(instance, &env, left, item)?;
                    match self.loop_body(instance, &env, body, label)? {
                        LoopFlow::Next => {}
                        LoopFlow::Done => break,
                        LoopFlow::Escape(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::ForIn { left, right, body } => {
                let object = self.eval_expr(instance, env, right)?;
                for key in object.keys() {
                    let env = env.child();
                    self.bind_for_target(instance, &env, left, Value::string(key))?;
                    match self.loop_body(instance, &env, body, label)? {
                        LoopFlow::Next => {}
                        LoopFlow::Done => break,
                        LoopFlow::Escape(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Labeled { label, body } => {
                match self.exec_stmt(instance, env, body, Some(label))? {
                    Flow::Break(Some(l)) if l == *label => Ok(Flow::Normal),
                    other => Ok(other),
                }
            }
            StmtKind::Break { label } => Ok(Flow::Break(label.clone())),
            StmtKind::Continue { label } => Ok(Flow::Continue(label.clone())),
            StmtKind::Return { argument } => {
                let value = match argument {
                    Some(argument) => self.eval_expr(instance, env, argument)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => self.exec_try(instance, env, block, handler.as_ref(), finalizer.as_deref()),
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(instance, env, expr)?;
                Err(Interrupt::Thrown(value))
            }
            StmtKind::Empty => Ok(Flow::Normal),
        }
    }

    fn exec_switch(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        discriminant: &Expr,
        cases: &[SwitchCase],
    ) -> Exec {
        let subject = self.eval_expr(instance, env, discriminant)?;
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test
                && self.eval_expr(instance, env, test)?.strict_eq(&subject)
            {
                start = Some(index);
                break;
            }
        }
        let start = match start {
            Some(index) => index,
            None => match cases.iter().position(|c| c.test.is_none()) {
                Some(index) => index,
                None => return Ok(Flow::Normal),
            },
        };
        let env = env.child();
        for case in &cases[start..] {
            for stmt in &case.body {
                match self.exec_stmt(instance, &env, stmt, None)? {
                    Flow::Normal => {}
                    Flow::Break(None) => return Ok(Flow::Normal),
                    other => return Ok(other),
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
    ) -> Exec {
        let result = match (self.exec_stmts(instance, &env.child(), block), handler) {
            (Err(Interrupt::Thrown(value)), Some(handler)) => {
                let catch_env = env.child();
                if let Some(param) = &handler.param {
                    self.bind_pattern(
                        instance,
                        &catch_env,
                        param,
                        value,
                        BindMode::Declare(DeclKind::Let),
                    )?;
                }
                self.exec_stmts(instance, &catch_env, &handler.body)
            }
            (other, _) => other,
        };
        if let Some(finalizer) = finalizer {
            match self.exec_stmts(instance, &env.child(), finalizer)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        result
    }

    fn loop_body(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        body: &Stmt,
        label: Option<&str>,
    ) -> Result<LoopFlow, Interrupt> {
        match self.exec_stmt(instance, env, body, None)? {
            Flow::Normal => Ok(LoopFlow::Next),
            Flow::Break(None) => Ok(LoopFlow::Done),
            Flow::Break(Some(l)) if Some(l.as_str()) == label => Ok(LoopFlow::Done),
            Flow::Continue(None) => Ok(LoopFlow::Next),
            Flow::Continue(Some(l)) if Some(l.as_str()) == label => Ok(LoopFlow::Next),
            other => Ok(LoopFlow::Escape(other)),
        }
    }

    // -----------------------------------------------------------------
    // Expressions

    fn eval_expr(&self, instance: &Rc<Instance>, env: &Env, expr: &Expr) -> Eval {
        match &expr.kind {
            ExprKind::Ident(name) => Ok(env.get(name)),
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Member { .. } => {
                if let Some(memo) = memo_slot(expr) {
                    return Ok(instance.memo(memo));
                }
                if is_construct_member(expr, "args") {
                    return Ok(Value::array(instance.args.borrow().iter().cloned()));
                }
                let (object, key) = self.eval_member(instance, env, expr)?;
                Ok(object.get(&key))
            }
            ExprKind::Assign { op, target, value } => {
                self.eval_assign(instance, env, *op, target, value)
            }
            ExprKind::Update {
                op,
                prefix,
                argument,
            } => self.eval_update(instance, env, *op, *prefix, argument),
            ExprKind::Unary { op, argument } => self.eval_unary(instance, env, *op, argument),
            ExprKind::Binary { op, left, right } => {
                let left = self.eval_expr(instance, env, left)?;
                let right = self.eval_expr(instance, env, right)?;
                Ok(ops::binary(*op, &left, &right))
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval_expr(instance, env, left)?;
                let take_right = match op {
                    LogicalOp::And => left.truthy(),
                    LogicalOp::Or => !left.truthy(),
                    LogicalOp::Nullish => matches!(left, Value::Null | Value::Undefined),
                };
                if take_right {
                    self.eval_expr(instance, env, right)
                } else {
                    Ok(left)
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(instance, env, test)?.truthy() {
                    self.eval_expr(instance, env, consequent)
                } else {
                    self.eval_expr(instance, env, alternate)
                }
            }
            ExprKind::Call { callee, args } => self.eval_call(instance, env, callee, args),
            ExprKind::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval_expr(instance, env, element)?);
                }
                Ok(Value::array(items))
            }
            ExprKind::Object(props) => self.eval_object(instance, env, props),
            ExprKind::Function(function) => Ok(Value::Function(FunctionRef {
                unit: None,
                env: env.clone(),
                body: Rc::new((**function).clone()),
            })),
            ExprKind::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval_expr(instance, env, expr)?;
                }
                Ok(last)
            }
            // Single logical thread: awaited boundaries have already
            // completed by the time their value is observed.
            ExprKind::Await(inner) => self.eval_expr(instance, env, inner),
        }
    }

    fn eval_object(&self, instance: &Rc<Instance>, env: &Env, props: &[ObjectProp]) -> Eval {
        let object = Value::object(std::iter::empty::<(String, Value)>());
        for prop in props {
            let key = self.prop_key(instance, env, &prop.key)?;
            let value = self.eval_expr(instance, env, &prop.value)?;
            object.set(&key, value);
        }
        Ok(object)
    }

    fn prop_key(&self, instance: &Rc<Instance>, env: &Env, key: &PropKey) -> Result<String, Interrupt> {
        Ok(match key {
            PropKey::Ident(name) | PropKey::Str(name) => name.clone(),
            PropKey::Num(n) => crate::value::format_number(*n),
            PropKey::Computed(expr) => self.eval_expr(instance, env, expr)?.to_key(),
        })
    }

    /// Object and string key of a (non-memo) member expression.
    fn eval_member(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        expr: &Expr,
    ) -> Result<(Value, String), Interrupt> {
        let ExprKind::Member {
            object,
            property,
            computed,
        } = &expr.kind
        else {
            return Err(RuntimeError::UnknownUnit { id: instance.unit }.into());
        };
        let object = self.eval_expr(instance, env, object)?;
        let key = if *computed {
            self.eval_expr(instance, env, property)?.to_key()
        } else {
            match &property.kind {
                ExprKind::Ident(name) => name.clone(),
                _ => self.eval_expr(instance, env, property)?.to_key(),
            }
        };
        Ok((object, key))
    }

    fn eval_assign(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        op: AssignOp,
        target: &Pattern,
        value: &Expr,
    ) -> Eval {
        match target {
            Pattern::Ident { name, .. } => {
                let mut next = self.eval_expr(instance, env, value)?;
                if op != AssignOp::Assign {
                    next = compound(op, &env.get(name), &next);
                }
                if env.is_const(name) {
                    return Err(RuntimeError::ConstAssignment { name: name.clone() }.into());
                }
                env.set(name, next.clone());
                Ok(next)
            }
            Pattern::Member(member) => {
                if let Some(memo) = memo_slot(member) {
                    let next = self.eval_expr(instance, env, value)?;
                    instance.set_memo(memo, next.clone());
                    return Ok(next);
                }
                let (object, key) = self.eval_member(instance, env, member)?;
                let mut next = self.eval_expr(instance, env, value)?;
                if op != AssignOp::Assign {
                    next = compound(op, &object.get(&key), &next);
                }
                object.set(&key, next.clone());
                Ok(next)
            }
            pattern => {
                let next = self.eval_expr(instance, env, value)?;
                self.bind_pattern(instance, env, pattern, next.clone(), BindMode::Assign)?;
                Ok(next)
            }
        }
    }

    fn eval_update(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        op: UpdateOp,
        prefix: bool,
        argument: &Expr,
    ) -> Eval {
        let delta = match op {
            UpdateOp::Inc => 1.0,
            UpdateOp::Dec => -1.0,
        };
        match &argument.kind {
            ExprKind::Ident(name) => {
                let old = env.get(name).to_number();
                if env.is_const(name) {
                    return Err(RuntimeError::ConstAssignment { name: name.clone() }.into());
                }
                env.set(name, Value::Number(old + delta));
                Ok(Value::Number(if prefix { old + delta } else { old }))
            }
            ExprKind::Member { .. } => {
                let (object, key) = self.eval_member(instance, env, argument)?;
                let old = object.get(&key).to_number();
                object.set(&key, Value::Number(old + delta));
                Ok(Value::Number(if prefix { old + delta } else { old }))
            }
            _ => Ok(Value::Number(f64::NAN)),
        }
    }

    fn eval_unary(&self, instance: &Rc<Instance>, env: &Env, op: UnaryOp, argument: &Expr) -> Eval {
        if op == UnaryOp::Delete {
            if let ExprKind::Member { .. } = &argument.kind {
                let (object, key) = self.eval_member(instance, env, argument)?;
                object.remove(&key);
            }
            return Ok(Value::Bool(true));
        }
        let value = self.eval_expr(instance, env, argument)?;
        Ok(match op {
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::TypeOf => Value::string(value.type_of()),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Delete => unreachable!("handled above"),
        })
    }

    // -----------------------------------------------------------------
    // Calls and the `$q` construct

    fn eval_call(&self, instance: &Rc<Instance>, env: &Env, callee: &Expr, args: &[Expr]) -> Eval {
        match &callee.kind {
            ExprKind::Ident(name) if name == CONSTRUCT => {
                return self.enter_boundary(instance, env, args);
            }
            ExprKind::Member {
                object, property, ..
            } => {
                if let (ExprKind::Ident(base), ExprKind::Ident(form)) =
                    (&object.kind, &property.kind)
                    && base == CONSTRUCT
                {
                    return self.construct_form(instance, env, form, args);
                }
            }
            _ => {}
        }
        let function = self.eval_expr(instance, env, callee)?;
        let mut argv = Vec::with_capacity(args.len());
        for arg in args {
            argv.push(self.eval_expr(instance, env, arg)?);
        }
        self.call_value(instance, &function, argv)
    }

    /// `$q(id, closure)` / `$q(id, key, closure)`: enter (or create) the
    /// child unit. Function units yield a callable value instead of
    /// running.
    fn enter_boundary(&self, instance: &Rc<Instance>, env: &Env, args: &[Expr]) -> Eval {
        let unit_id = match args.first().map(|a| &a.kind) {
            Some(ExprKind::Literal(Literal::Number(n))) => *n as UnitId,
            _ => return Err(RuntimeError::UnknownUnit { id: u32::MAX }.into()),
        };
        let Some(unit) = self.rt.graph.unit(unit_id) else {
            return Err(RuntimeError::UnknownUnit { id: unit_id }.into());
        };
        let Some(ExprKind::Function(function)) = args.last().map(|a| &a.kind) else {
            return Err(RuntimeError::UnknownUnit { id: unit_id }.into());
        };
        let body = self.rt.record_closure(unit_id, function);
        if unit.kind == UnitKind::Function {
            return Ok(Value::Function(FunctionRef {
                unit: Some(unit_id),
                env: env.clone(),
                body,
            }));
        }
        let key = if args.len() == 3 {
            Some(self.eval_expr(instance, env, &args[1])?.to_key())
        } else {
            None
        };
        let child = instance.adopt(unit_id, key, env.clone());
        *child.closure.borrow_mut() = Some(body);
        self.run_instance(&child)?;
        Ok(Value::Undefined)
    }

    fn construct_form(&self, instance: &Rc<Instance>, env: &Env, form: &str, args: &[Expr]) -> Eval {
        match form {
            "exit" => {
                let Some(first) = args.first() else {
                    return Ok(Value::Undefined);
                };
                let kind = self.eval_expr(instance, env, first)?;
                let Some(kind) = kind.as_str().and_then(ExitKind::parse) else {
                    return Ok(Value::Undefined);
                };
                let label = match args.get(1) {
                    Some(arg) => self
                        .eval_expr(instance, env, arg)?
                        .as_str()
                        .map(str::to_string),
                    None => None,
                };
                let value = match args.get(2) {
                    Some(arg) => self.eval_expr(instance, env, arg)?,
                    None => Value::Undefined,
                };
                let target = self.exit_target(instance, kind, label.as_deref());
                *self.rt.pending_exit.borrow_mut() = Some(ExitRecord {
                    kind,
                    label,
                    value,
                    target,
                });
                Ok(Value::Undefined)
            }
            "exiting" => {
                let Some(first) = args.first() else {
                    return Ok(Value::Bool(false));
                };
                let kind = self.eval_expr(instance, env, first)?;
                let Some(kind) = kind.as_str().and_then(ExitKind::parse) else {
                    return Ok(Value::Bool(false));
                };
                let label = match args.get(1) {
                    Some(arg) => self
                        .eval_expr(instance, env, arg)?
                        .as_str()
                        .map(str::to_string),
                    None => None,
                };
                Ok(Value::Bool(self.exiting(instance, kind, label.as_deref())))
            }
            "keys" => {
                let Some(first) = args.first() else {
                    return Ok(Value::array(std::iter::empty()));
                };
                let value = self.eval_expr(instance, env, first)?;
                Ok(Value::array(value.keys().into_iter().map(Value::string)))
            }
            _ => Ok(Value::Undefined),
        }
    }

    /// Resolve the unit an exit unwinds to, from the innermost live
    /// ancestor outwards.
    fn exit_target(&self, instance: &Rc<Instance>, kind: ExitKind, label: Option<&str>) -> UnitId {
        let mut current = Some(instance.clone());
        while let Some(step) = current {
            if let Some(unit) = self.rt.graph.unit(step.unit) {
                let hit = match (kind, label) {
                    (ExitKind::Return, _) => {
                        matches!(unit.kind, UnitKind::Function | UnitKind::Program)
                    }
                    (ExitKind::Break, None) => {
                        matches!(unit.kind, UnitKind::Iteration | UnitKind::Switch)
                    }
                    (ExitKind::Break, Some(label)) => unit.spec.label.as_deref() == Some(label),
                    (ExitKind::Continue, None) => unit.kind == UnitKind::Iteration,
                    (ExitKind::Continue, Some(label)) => {
                        unit.kind == UnitKind::Iteration
                            && unit.spec.label.as_deref() == Some(label)
                    }
                };
                if hit {
                    return unit.id;
                }
            }
            current = step.parent.upgrade();
        }
        self.rt.graph.root.id
    }

    /// Does the pending exit pass through this instance? Consumes the
    /// record when the native keyword at the target is about to run;
    /// returns unwind past intermediate boundaries without consuming.
    fn exiting(&self, instance: &Rc<Instance>, kind: ExitKind, label: Option<&str>) -> bool {
        let mut pending = self.rt.pending_exit.borrow_mut();
        let Some(exit) = pending.as_ref() else {
            return false;
        };
        if exit.kind != kind || exit.label.as_deref() != label {
            return false;
        }
        if instance.ancestor_of_unit(exit.target).is_none() {
            return false;
        }
        if exit.target == instance.unit && kind != ExitKind::Return {
            pending.take();
        }
        true
    }

    fn call_value(&self, instance: &Rc<Instance>, function: &Value, argv: Vec<Value>) -> Eval {
        let Value::Function(fref) = function else {
            return Err(RuntimeError::NotCallable {
                type_name: function.type_of(),
            }
            .into());
        };
        match fref.unit {
            None => self.call_plain(instance, fref, argv),
            Some(unit) => {
                // Live call: spawn an instance under the function's
                // lexical parent so change notifications can find it.
                let attach = self
                    .rt
                    .graph
                    .parent_of(unit)
                    .and_then(|parent| instance.ancestor_of_unit(parent))
                    .or_else(|| {
                        self.rt
                            .graph
                            .parent_of(unit)
                            .and_then(|parent| self.rt.instances_of(parent).into_iter().next())
                    })
                    .unwrap_or_else(|| instance.clone());
                let child = attach.adopt(unit, None, fref.env.clone());
                *child.closure.borrow_mut() = Some(fref.body.clone());
                *child.args.borrow_mut() = argv;
                Ok(self.run_instance(&child)?)
            }
        }
    }

    fn call_plain(&self, instance: &Rc<Instance>, fref: &FunctionRef, argv: Vec<Value>) -> Eval {
        let env = fref.env.child();
        if let Some(name) = &fref.body.name {
            env.declare(name, Value::Function(fref.clone()));
        }
        for (index, param) in fref.body.params.iter().enumerate() {
            let value = argv.get(index).cloned().unwrap_or_default();
            self.bind_pattern(instance, &env, param, value, BindMode::Declare(DeclKind::Let))?;
        }
        match self.exec_stmts(instance, &env, &fref.body.body)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    // -----------------------------------------------------------------
    // Pattern binding

    fn bind_for_target(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        target: &ForTarget,
        value: Value,
    ) -> Result<(), Interrupt> {
        match target {
            ForTarget::Decl { kind, pattern } => {
                self.bind_pattern(instance, env, pattern, value, BindMode::Declare(*kind))
            }
            ForTarget::Pattern(pattern) => {
                self.bind_pattern(instance, env, pattern, value, BindMode::Assign)
            }
        }
    }

    fn bind_pattern(
        &self,
        instance: &Rc<Instance>,
        env: &Env,
        pattern: &Pattern,
        value: Value,
        mode: BindMode,
    ) -> Result<(), Interrupt> {
        match pattern {
            Pattern::Ident { name, .. } => match mode {
                BindMode::Declare(DeclKind::Const) => env.declare_const(name, value),
                BindMode::Declare(_) => env.declare(name, value),
                BindMode::Assign => {
                    if env.is_const(name) {
                        return Err(RuntimeError::ConstAssignment { name: name.clone() }.into());
                    }
                    env.set(name, value);
                }
            },
            Pattern::Member(member) => {
                let (object, key) = self.eval_member(instance, env, member)?;
                object.set(&key, value);
            }
            Pattern::Default { pattern, default } => {
                let value = if value.is_undefined() {
                    self.eval_expr(instance, env, default)?
                } else {
                    value
                };
                self.bind_pattern(instance, env, pattern, value, mode)?;
            }
            Pattern::Object { props, rest, .. } => {
                let mut taken = Vec::with_capacity(props.len());
                for prop in props {
                    let key = self.prop_key(instance, env, &prop.key)?;
                    self.bind_pattern(instance, env, &prop.value, value.get(&key), mode)?;
                    taken.push(key);
                }
                if let Some(rest) = rest {
                    let remainder = Value::object(
                        value
                            .keys()
                            .into_iter()
                            .filter(|key| !taken.contains(key))
                            .map(|key| {
                                let item = value.get(&key);
                                (key, item)
                            }),
                    );
                    self.bind_pattern(instance, env, rest, remainder, mode)?;
                }
            }
            Pattern::Array { elements, rest, .. } => {
                for (index, element) in elements.iter().enumerate() {
                    if let Some(element) = element {
                        let item = value.get(&index.to_string());
                        self.bind_pattern(instance, env, element, item, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    let length = value.get("length").to_number() as usize;
                    let remainder = Value::array(
                        (elements.len()..length).map(|index| value.get(&index.to_string())),
                    );
                    self.bind_pattern(instance, env, rest, remainder, mode)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum BindMode {
    Declare(DeclKind),
    Assign,
}

enum LoopFlow {
    Next,
    Done,
    Escape(Flow),
}

fn compound(op: AssignOp, old: &Value, rhs: &Value) -> Value {
    match op {
        AssignOp::Assign => rhs.clone(),
        AssignOp::Add => ops::binary(crate::ast::BinaryOp::Add, old, rhs),
        AssignOp::Sub => Value::Number(old.to_number() - rhs.to_number()),
        AssignOp::Mul => Value::Number(old.to_number() * rhs.to_number()),
        AssignOp::Div => Value::Number(old.to_number() / rhs.to_number()),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(s) => Value::string(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
        Literal::Undefined => Value::Undefined,
    }
}

/// Recognize `$q.<field>`.
fn is_construct_member(expr: &Expr, field: &str) -> bool {
    let ExprKind::Member {
        object,
        property,
        computed: false,
    } = &expr.kind
    else {
        return false;
    };
    matches!((&object.kind, &property.kind),
        (ExprKind::Ident(base), ExprKind::Ident(name)) if base == CONSTRUCT && name == field)
}

/// Recognize `$q.memo[<n>]`.
fn memo_slot(expr: &Expr) -> Option<MemoId> {
    let ExprKind::Member {
        object,
        property,
        computed: true,
    } = &expr.kind
    else {
        return None;
    };
    let ExprKind::Member {
        object: base,
        property: field,
        computed: false,
    } = &object.kind
    else {
        return None;
    };
    let (ExprKind::Ident(base), ExprKind::Ident(field)) = (&base.kind, &field.kind) else {
        return None;
    };
    if base != CONSTRUCT || field != "memo" {
        return None;
    }
    match &property.kind {
        ExprKind::Literal(Literal::Number(n)) => Some(*n as MemoId),
        _ => None,
    }
}
