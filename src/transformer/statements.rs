//! Statement-level transform: boundary wrapping and control-flow
//! rewriting.
//!
//! Every statement that introduces a reactive boundary compiles to a
//! `$q(childId, closure)` call in its parent's closure body, followed by
//! hoisted exit guards for any `break`/`continue`/`return` that escapes
//! the child. Loop statements split into a driver boundary plus a keyed
//! per-element instance boundary.

use smallvec::SmallVec;

use crate::ast::{
    self, DeclKind, Expr, ExprKind, ForTarget, Pattern, Span, Stmt, StmtKind, SwitchCase, build,
};
use crate::error::CompileError;
use crate::graph::{ConditionKind, UnitKind, ref_path};
use crate::scope::BindingKind;

use super::{Ctx, ExitKey, ExitKind, Transformer, construct, construct_call, exit_call, exiting_guard, memo_assign};

impl Transformer {
    pub(super) fn transform_stmts(
        &mut self,
        ctx: &Ctx,
        stmts: &[Stmt],
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        for stmt in stmts {
            self.transform_stmt(ctx, stmt, out, escapes)?;
        }
        Ok(())
    }

    pub(super) fn transform_stmt(
        &mut self,
        ctx: &Ctx,
        stmt: &Stmt,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        if !ctx.live {
            out.push(stmt.clone());
            return Ok(());
        }
        match &stmt.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Expr(expr) => self.transform_expr_stmt(ctx, expr, stmt.span, out, escapes),
            StmtKind::VarDecl { kind, declarators } => {
                for declarator in declarators {
                    self.transform_declarator(ctx, *kind, declarator, stmt.span, out)?;
                }
                Ok(())
            }
            StmtKind::FunctionDecl(function) => {
                let name = function
                    .name
                    .clone()
                    .ok_or_else(|| CompileError::InvalidPattern {
                        message: "function declaration without a name".to_string(),
                        span: function.span,
                    })?;
                self.declare(ctx, &name, BindingKind::Let, function.span)?;
                let value = self.transform_function(ctx, function)?;
                let unit = ctx.unit;
                let effect = self.new_effect(unit, Some(BindingKind::Let), None);
                self.push_effect_ref(ctx, unit, effect, ref_path(&[&name]));
                out.push(build::decl(
                    DeclKind::Let,
                    build::pat_ident(&name),
                    Some(value),
                ));
                Ok(())
            }
            StmtKind::Block(body) => {
                let scope = self.scopes.push(Some(ctx.scope), false);
                let (call, child_escapes) =
                    self.child_boundary(ctx, UnitKind::Block, stmt.span, None, |t, inner, body_out, body_escapes| {
                        let inner = inner.with_scope(scope);
                        t.transform_stmts(&inner, body, body_out, body_escapes)
                    })?;
                self.emit_nested(out, escapes, call, child_escapes);
                Ok(())
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => self.transform_if(ctx, test, consequent, alternate.as_deref(), stmt.span, out, escapes),
            StmtKind::Switch { discriminant, cases } => {
                self.transform_switch(ctx, discriminant, cases, stmt.span, out, escapes)
            }
            StmtKind::While { test, body } => {
                self.transform_counter_loop(ctx, stmt.span, None, LoopHead::While { test }, body, out, escapes)
            }
            StmtKind::DoWhile { body, test } => {
                self.transform_counter_loop(ctx, stmt.span, None, LoopHead::DoWhile { test }, body, out, escapes)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.transform_counter_loop(
                ctx,
                stmt.span,
                None,
                LoopHead::For {
                    init: init.as_deref(),
                    test: test.as_ref(),
                    update: update.as_ref(),
                },
                body,
                out,
                escapes,
            ),
            StmtKind::ForOf { left, right, body } => {
                self.transform_keyed_loop(ctx, stmt.span, None, left, right, body, true, out, escapes)
            }
            StmtKind::ForIn { left, right, body } => {
                self.transform_keyed_loop(ctx, stmt.span, None, left, right, body, false, out, escapes)
            }
            StmtKind::Labeled { label, body } => {
                self.transform_labeled(ctx, label, body, stmt.span, out, escapes)
            }
            StmtKind::Break { label } => {
                self.transform_exit(ExitKind::Break, label.clone(), None, out, escapes);
                Ok(())
            }
            StmtKind::Continue { label } => {
                self.transform_exit(ExitKind::Continue, label.clone(), None, out, escapes);
                Ok(())
            }
            StmtKind::Return { argument } => {
                self.transform_return(ctx, argument.as_ref(), stmt.span, out, escapes)
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => self.transform_try(ctx, block, handler.as_ref(), finalizer.as_deref(), stmt.span, out, escapes),
            StmtKind::Throw(argument) => {
                let (call, child_escapes) =
                    self.child_boundary(ctx, UnitKind::Statement, stmt.span, None, |t, inner, body_out, _| {
                        t.open_signal(inner.unit);
                        let argument = t.transform_expr(&inner, argument)?;
                        t.close_signal()?;
                        body_out.push(build::stmt(StmtKind::Throw(argument)));
                        Ok(())
                    })?;
                self.emit_nested(out, escapes, call, child_escapes);
                Ok(())
            }
        }
    }

    // -- boundary plumbing --------------------------------------------

    /// Build a child boundary unit: allocate it, let `fill` populate the
    /// closure body, and return the `$q(id, closure)` call (awaited when
    /// the child hoisted an `await`) plus the exits escaping it.
    pub(super) fn child_boundary(
        &mut self,
        ctx: &Ctx,
        kind: UnitKind,
        span: Span,
        key: Option<Expr>,
        fill: impl FnOnce(&mut Self, &Ctx, &mut Vec<Stmt>, &mut Vec<ExitKey>) -> Result<(), CompileError>,
    ) -> Result<(Expr, Vec<ExitKey>), CompileError> {
        let unit = self.new_unit(Some(ctx.unit), kind, Some(span));
        let inner = ctx.at_unit(unit);
        let mut body = Vec::new();
        let mut child_escapes = Vec::new();
        fill(self, &inner, &mut body, &mut child_escapes)?;
        let is_async = self.units[unit].hoisted_await;
        let closure = build::closure(Vec::new(), body, is_async);
        let mut call = construct_call(self.units[unit].id, key, closure);
        if is_async && kind != UnitKind::Function {
            call = build::expr(ExprKind::Await(Box::new(call)));
        }
        Ok((call, child_escapes))
    }

    /// Emit a child boundary call plus hoisted guards for every exit
    /// that escapes it, propagating those exits to the caller.
    pub(super) fn emit_nested(
        &mut self,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
        call: Expr,
        child_escapes: Vec<ExitKey>,
    ) {
        out.push(build::expr_stmt(call));
        for exit in child_escapes {
            out.push(exiting_guard(&exit, build::return_(None)));
            if !escapes.contains(&exit) {
                escapes.push(exit);
            }
        }
    }

    // -- statement kinds ----------------------------------------------

    fn transform_expr_stmt(
        &mut self,
        ctx: &Ctx,
        expr: &Expr,
        span: Span,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        // Destructuring assignment only makes sense in statement
        // position; route it through the pattern expansion.
        if let ExprKind::Assign { op: ast::AssignOp::Assign, target, value } = &expr.kind
            && matches!(**target, Pattern::Object { .. } | Pattern::Array { .. })
        {
            return self.transform_destructuring_assign(ctx, target, value, span, out, escapes);
        }
        let (call, child_escapes) =
            self.child_boundary(ctx, UnitKind::Statement, span, None, |t, inner, body_out, _| {
                t.open_signal(inner.unit);
                let expr = t.transform_expr(inner, expr)?;
                t.close_signal()?;
                body_out.push(build::expr_stmt(expr));
                Ok(())
            })?;
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    fn transform_if(
        &mut self,
        ctx: &Ctx,
        test: &Expr,
        consequent: &Stmt,
        alternate: Option<&Stmt>,
        span: Span,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        let (call, child_escapes) =
            self.child_boundary(ctx, UnitKind::If, span, None, |t, inner, body_out, body_escapes| {
                let memo = t.new_memo(inner.unit);
                t.units[inner.unit].spec.test_memo = Some(memo);
                t.open_signal(inner.unit);
                let test = t.transform_expr(inner, test)?;
                t.close_signal()?;

                let when = t.new_condition(
                    inner.unit,
                    ConditionKind::When { when: memo },
                    inner.condition,
                );
                let when_not = t.new_condition(
                    inner.unit,
                    ConditionKind::WhenNot { when_not: memo },
                    inner.condition,
                );

                let mut then_body = Vec::new();
                let then_ctx = inner.with_condition(when);
                let (then_call, then_escapes) = t.branch_boundary(&then_ctx, consequent)?;
                t.emit_nested(&mut then_body, body_escapes, then_call, then_escapes);

                let else_body = match alternate {
                    Some(alternate) => {
                        let mut else_out = Vec::new();
                        let else_ctx = inner.with_condition(when_not);
                        let (else_call, else_escapes) = t.branch_boundary(&else_ctx, alternate)?;
                        t.emit_nested(&mut else_out, body_escapes, else_call, else_escapes);
                        Some(build::block(else_out))
                    }
                    None => None,
                };

                body_out.push(build::if_(
                    memo_assign(memo, test),
                    build::block(then_body),
                    else_body,
                ));
                Ok(())
            })?;
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    /// A branch arm as its own block boundary, whatever its statement
    /// shape.
    fn branch_boundary(&mut self, ctx: &Ctx, arm: &Stmt) -> Result<(Expr, Vec<ExitKey>), CompileError> {
        let scope = self.scopes.push(Some(ctx.scope), false);
        let stmts: &[Stmt] = match &arm.kind {
            StmtKind::Block(body) => body,
            _ => std::slice::from_ref(arm),
        };
        self.child_boundary(ctx, UnitKind::Block, arm.span, None, |t, inner, body_out, body_escapes| {
            let inner = inner.with_scope(scope);
            t.transform_stmts(&inner, stmts, body_out, body_escapes)
        })
    }

    fn transform_switch(
        &mut self,
        ctx: &Ctx,
        discriminant: &Expr,
        cases: &[SwitchCase],
        span: Span,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        let (call, child_escapes) =
            self.child_boundary(ctx, UnitKind::Switch, span, None, |t, inner, body_out, body_escapes| {
                let switch_memo = t.new_memo(inner.unit);
                t.units[inner.unit].spec.test_memo = Some(switch_memo);
                t.open_signal(inner.unit);
                let discriminant = t.transform_expr(inner, discriminant)?;
                t.close_signal()?;

                let scope = t.scopes.push(Some(inner.scope), false);
                let mut out_cases = Vec::new();
                // Without a `break`, execution falls through into the
                // next case body, so each arm is reachable from any
                // earlier matching case: its condition accumulates the
                // preceding case memos. Arms at or after a default arm
                // stay unconditioned.
                let mut reachable_memos = Vec::new();
                let mut past_default = false;
                for case in cases {
                    let (test, condition) = match &case.test {
                        Some(test) => {
                            let case_memo = t.new_memo(inner.unit);
                            t.open_signal(inner.unit);
                            let test = t.transform_expr(inner, test)?;
                            t.close_signal()?;
                            reachable_memos.push(case_memo);
                            let condition = if past_default {
                                None
                            } else {
                                Some(t.new_condition(
                                    inner.unit,
                                    ConditionKind::Switch {
                                        switch: switch_memo,
                                        cases: reachable_memos.clone(),
                                    },
                                    inner.condition,
                                ))
                            };
                            (Some(memo_assign(case_memo, test)), condition)
                        }
                        // The default arm cannot be expressed as a memo
                        // comparison.
                        None => {
                            past_default = true;
                            (None, None)
                        }
                    };

                    let mut case_ctx = inner.with_scope(scope);
                    if let Some(condition) = condition {
                        case_ctx = case_ctx.with_condition(condition);
                    }
                    let mut case_body = Vec::new();
                    let mut case_escapes = Vec::new();
                    let (case_call, inner_escapes) =
                        t.child_boundary(&case_ctx, UnitKind::Block, case.span, None, |t, b_ctx, b_out, b_esc| {
                            t.transform_stmts(b_ctx, &case.body, b_out, b_esc)
                        })?;
                    t.emit_nested(&mut case_body, &mut case_escapes, case_call, inner_escapes);
                    // A plain `break` targets the switch itself; consume
                    // it with the native keyword, valid in case position.
                    for exit in case_escapes {
                        if exit.kind == ExitKind::Break && exit.label.is_none() {
                            case_body.push(exiting_guard(&exit, build::break_(None)));
                        } else if !body_escapes.contains(&exit) {
                            body_escapes.push(exit);
                        }
                    }
                    out_cases.push(SwitchCase {
                        test,
                        body: case_body,
                        span: case.span,
                    });
                }
                body_out.push(build::stmt(StmtKind::Switch {
                    discriminant: memo_assign(switch_memo, discriminant),
                    cases: out_cases,
                }));
                Ok(())
            })?;
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    fn transform_labeled(
        &mut self,
        ctx: &Ctx,
        label: &str,
        body: &Stmt,
        span: Span,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        // A label on a loop attaches to the loop driver so labeled
        // break/continue resolve against the native loop.
        match &body.kind {
            StmtKind::While { test, body: loop_body } => {
                return self.transform_counter_loop(ctx, span, Some(label), LoopHead::While { test }, loop_body, out, escapes);
            }
            StmtKind::DoWhile { body: loop_body, test } => {
                return self.transform_counter_loop(ctx, span, Some(label), LoopHead::DoWhile { test }, loop_body, out, escapes);
            }
            StmtKind::For { init, test, update, body: loop_body } => {
                return self.transform_counter_loop(
                    ctx,
                    span,
                    Some(label),
                    LoopHead::For {
                        init: init.as_deref(),
                        test: test.as_ref(),
                        update: update.as_ref(),
                    },
                    loop_body,
                    out,
                    escapes,
                );
            }
            StmtKind::ForOf { left, right, body: loop_body } => {
                return self.transform_keyed_loop(ctx, span, Some(label), left, right, loop_body, true, out, escapes);
            }
            StmtKind::ForIn { left, right, body: loop_body } => {
                return self.transform_keyed_loop(ctx, span, Some(label), left, right, loop_body, false, out, escapes);
            }
            _ => {}
        }

        let label_owned = label.to_string();
        let (call, child_escapes) =
            self.child_boundary(ctx, UnitKind::Labeled, span, None, |t, inner, body_out, body_escapes| {
                t.units[inner.unit].spec.label = Some(label_owned.clone());
                let mut labeled_body = Vec::new();
                let mut inner_escapes = Vec::new();
                t.transform_stmt(inner, body, &mut labeled_body, &mut inner_escapes)?;
                for exit in inner_escapes {
                    if exit.kind == ExitKind::Break && exit.label.as_deref() == Some(&label_owned) {
                        labeled_body.push(exiting_guard(&exit, build::break_(Some(&label_owned))));
                    } else if !body_escapes.contains(&exit) {
                        body_escapes.push(exit);
                    }
                }
                body_out.push(build::stmt(StmtKind::Labeled {
                    label: label_owned.clone(),
                    body: Box::new(build::block(labeled_body)),
                }));
                Ok(())
            })?;
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    fn transform_exit(
        &mut self,
        kind: ExitKind,
        label: Option<String>,
        value: Option<Expr>,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) {
        out.push(build::expr_stmt(exit_call(kind, label.as_deref(), value)));
        out.push(build::return_(None));
        let key = ExitKey { kind, label };
        if !escapes.contains(&key) {
            escapes.push(key);
        }
    }

    fn transform_return(
        &mut self,
        ctx: &Ctx,
        argument: Option<&Expr>,
        span: Span,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        let (call, mut child_escapes) =
            self.child_boundary(ctx, UnitKind::Return, span, None, |t, inner, body_out, body_escapes| {
                let argument = match argument {
                    Some(argument) => {
                        t.open_signal(inner.unit);
                        let argument = t.transform_expr(inner, argument)?;
                        t.close_signal()?;
                        Some(argument)
                    }
                    None => None,
                };
                t.transform_exit(ExitKind::Return, None, argument, body_out, body_escapes);
                Ok(())
            })?;
        // The return exit also escapes the boundary holding the return
        // statement itself.
        if !child_escapes.iter().any(|e| e.kind == ExitKind::Return) {
            child_escapes.push(ExitKey {
                kind: ExitKind::Return,
                label: None,
            });
        }
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    fn transform_try(
        &mut self,
        ctx: &Ctx,
        block: &[Stmt],
        handler: Option<&ast::CatchClause>,
        finalizer: Option<&[Stmt]>,
        span: Span,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        let (call, child_escapes) =
            self.child_boundary(ctx, UnitKind::Try, span, None, |t, inner, body_out, body_escapes| {
                let try_scope = t.scopes.push(Some(inner.scope), false);
                let mut try_body = Vec::new();
                let try_ctx = inner.with_scope(try_scope);
                t.transform_stmts(&try_ctx, block, &mut try_body, body_escapes)?;

                let out_handler = match handler {
                    Some(handler) => {
                        let catch_scope = t.scopes.push(Some(inner.scope), false);
                        let catch_ctx = inner.with_scope(catch_scope);
                        if let Some(Pattern::Ident { name, span }) = &handler.param {
                            t.declare(&catch_ctx, name, BindingKind::Param, *span)?;
                        }
                        let mut catch_body = Vec::new();
                        t.transform_stmts(&catch_ctx, &handler.body, &mut catch_body, body_escapes)?;
                        Some(ast::CatchClause {
                            param: handler.param.clone(),
                            body: catch_body,
                        })
                    }
                    None => None,
                };

                let out_finalizer = match finalizer {
                    Some(finalizer) => {
                        let finally_scope = t.scopes.push(Some(inner.scope), false);
                        let finally_ctx = inner.with_scope(finally_scope);
                        let mut finally_body = Vec::new();
                        t.transform_stmts(&finally_ctx, finalizer, &mut finally_body, body_escapes)?;
                        Some(finally_body)
                    }
                    None => None,
                };

                body_out.push(build::stmt(StmtKind::Try {
                    block: try_body,
                    handler: out_handler,
                    finalizer: out_finalizer,
                }));
                Ok(())
            })?;
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    // -- loops ---------------------------------------------------------

    /// Counter-keyed loops: `for`, `while`, `do-while`. The driver owns
    /// init/test/update; each pass through the body enters a keyed
    /// instance boundary whose key is the iteration count.
    fn transform_counter_loop(
        &mut self,
        ctx: &Ctx,
        span: Span,
        label: Option<&str>,
        head: LoopHead<'_>,
        body: &Stmt,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        let label_owned = label.map(str::to_string);
        let (call, child_escapes) =
            self.child_boundary(ctx, UnitKind::Iteration, span, None, |t, inner, body_out, body_escapes| {
                t.units[inner.unit].spec.loop_kind = Some(head.kind());
                t.units[inner.unit].spec.label = label_owned.clone();
                let counter = format!("$i{}", t.units[inner.unit].id);
                t.units[inner.unit].spec.iter_var = Some(counter.clone());

                let head_scope = t.scopes.push(Some(inner.scope), false);
                let head_ctx = inner.with_scope(head_scope);
                t.open_signal(head_ctx.unit);

                let out_init = match head {
                    LoopHead::For { init: Some(init), .. } => {
                        let mut init_out = Vec::new();
                        t.transform_loop_init(&head_ctx, init, &mut init_out)?;
                        Some(init_out)
                    }
                    _ => None,
                };
                let out_test = match head.test() {
                    Some(test) => Some(t.transform_expr(&head_ctx, test)?),
                    None => None,
                };
                let out_update = match head {
                    LoopHead::For { update: Some(update), .. } => {
                        Some(t.transform_expr(&head_ctx, update)?)
                    }
                    _ => None,
                };
                t.close_signal()?;

                let loop_stmts =
                    t.loop_body_instance(&head_ctx, body, build::expr(ExprKind::Update {
                        op: ast::UpdateOp::Inc,
                        prefix: false,
                        argument: Box::new(build::ident(&counter)),
                    }), None, label_owned.as_deref(), body_escapes)?;

                body_out.push(build::let_(&counter, build::num(0.0)));
                let native = match head {
                    LoopHead::While { .. } => build::while_(
                        out_test.expect("while always has a test"),
                        build::block(loop_stmts),
                    ),
                    LoopHead::DoWhile { .. } => build::stmt(StmtKind::DoWhile {
                        body: Box::new(build::block(loop_stmts)),
                        test: out_test.expect("do-while always has a test"),
                    }),
                    LoopHead::For { .. } => {
                        let init = out_init.map(|mut stmts| {
                            if stmts.len() == 1 {
                                Box::new(stmts.remove(0))
                            } else {
                                Box::new(build::block(stmts))
                            }
                        });
                        build::stmt(StmtKind::For {
                            init,
                            test: out_test,
                            update: out_update,
                            body: Box::new(build::block(loop_stmts)),
                        })
                    }
                };
                body_out.push(wrap_label(label_owned.clone(), native));
                Ok(())
            })?;
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    /// `for-of` / `for-in`: the driver reads the collection (flagged as
    /// the iteration contract target) and enters one keyed instance per
    /// element/property key.
    #[allow(clippy::too_many_arguments)]
    fn transform_keyed_loop(
        &mut self,
        ctx: &Ctx,
        span: Span,
        label: Option<&str>,
        left: &ForTarget,
        right: &Expr,
        body: &Stmt,
        by_value: bool,
        out: &mut Vec<Stmt>,
        escapes: &mut Vec<ExitKey>,
    ) -> Result<(), CompileError> {
        let label_owned = label.map(str::to_string);
        let (call, child_escapes) =
            self.child_boundary(ctx, UnitKind::Iteration, span, None, |t, inner, body_out, body_escapes| {
                let driver_id = t.units[inner.unit].id;
                t.units[inner.unit].spec.loop_kind = Some(if by_value {
                    crate::graph::LoopKind::ForOf
                } else {
                    crate::graph::LoopKind::ForIn
                });
                t.units[inner.unit].spec.label = label_owned.clone();
                let key_var = format!("$k{driver_id}");
                let coll_var = format!("$c{driver_id}");
                t.units[inner.unit].spec.iter_var = Some(key_var.clone());

                let head_scope = t.scopes.push(Some(inner.scope), false);
                let head_ctx = inner.with_scope(head_scope);

                t.open_signal(head_ctx.unit);
                let (right_out, right_path) = t.transform_path_expr(&head_ctx, right)?;
                if let Some(path) = right_path {
                    t.push_signal_ref_with(&head_ctx, path, SmallVec::new(), true);
                }
                t.close_signal()?;

                body_out.push(build::const_(&coll_var, right_out));

                // Element binding recomputed inside the instance closure
                // so a keyed re-run reads the current element.
                let element = if by_value {
                    build::index(build::ident(&coll_var), build::ident(&key_var))
                } else {
                    build::ident(&key_var)
                };
                let loop_stmts = t.loop_body_instance(
                    &head_ctx,
                    body,
                    build::ident(&key_var),
                    Some((left, element)),
                    label_owned.as_deref(),
                    body_escapes,
                )?;

                let native = build::stmt(StmtKind::ForOf {
                    left: ForTarget::Decl {
                        kind: DeclKind::Const,
                        pattern: build::pat_ident(&key_var),
                    },
                    right: build::call(
                        build::member(construct(), "keys"),
                        vec![build::ident(&coll_var)],
                    ),
                    body: Box::new(build::block(loop_stmts)),
                });
                body_out.push(wrap_label(label_owned.clone(), native));
                Ok(())
            })?;
        self.emit_nested(out, escapes, call, child_escapes);
        Ok(())
    }

    /// The statements inside the driver's native loop: the keyed
    /// instance call plus native exit guards consumed at this loop.
    fn loop_body_instance(
        &mut self,
        driver_ctx: &Ctx,
        body: &Stmt,
        key: Expr,
        binding: Option<(&ForTarget, Expr)>,
        label: Option<&str>,
        driver_escapes: &mut Vec<ExitKey>,
    ) -> Result<Vec<Stmt>, CompileError> {
        let body_scope = self.scopes.push(Some(driver_ctx.scope), false);
        let body_stmts: Vec<Stmt> = match &body.kind {
            StmtKind::Block(stmts) => stmts.clone(),
            _ => vec![body.clone()],
        };
        let (instance_call, instance_escapes) = self.child_boundary(
            driver_ctx,
            UnitKind::IterationInstance,
            body.span,
            Some(key),
            |t, inner, body_out, body_escapes| {
                let inner = inner.with_scope(body_scope);
                if let Some((target, element)) = binding {
                    t.bind_loop_target(&inner, target, element, body_out)?;
                }
                t.transform_stmts(&inner, &body_stmts, body_out, body_escapes)
            },
        )?;

        let mut stmts = vec![build::expr_stmt(instance_call)];
        for exit in instance_escapes {
            let consumed_here = match exit.kind {
                ExitKind::Break | ExitKind::Continue => {
                    exit.label.is_none() || exit.label.as_deref() == label
                }
                ExitKind::Return => false,
            };
            if consumed_here {
                let native = match exit.kind {
                    ExitKind::Break => build::break_(exit.label.as_deref()),
                    ExitKind::Continue => build::continue_(exit.label.as_deref()),
                    ExitKind::Return => unreachable!(),
                };
                stmts.push(exiting_guard(&exit, native));
            } else {
                stmts.push(exiting_guard(&exit, build::return_(None)));
                if !driver_escapes.contains(&exit) {
                    driver_escapes.push(exit);
                }
            }
        }
        Ok(stmts)
    }

    /// Bind the loop variable inside an instance closure.
    fn bind_loop_target(
        &mut self,
        ctx: &Ctx,
        target: &ForTarget,
        element: Expr,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CompileError> {
        let (kind, pattern) = match target {
            ForTarget::Decl { kind, pattern } => (BindingKind::from(*kind), pattern),
            ForTarget::Pattern(pattern) => (BindingKind::Let, pattern),
        };
        match pattern {
            Pattern::Ident { name, span } => {
                self.declare(ctx, name, kind, *span)?;
                out.push(build::decl(
                    DeclKind::Let,
                    build::pat_ident(name),
                    Some(element),
                ));
                Ok(())
            }
            Pattern::Object { .. } | Pattern::Array { .. } => {
                self.expand_binding_pattern(ctx, kind, pattern, element, None, out)
            }
            _ => Err(CompileError::InvalidPattern {
                message: "unsupported loop binding pattern".to_string(),
                span: pattern.span(),
            }),
        }
    }

    /// `for` head initializer: a declaration or a bare expression.
    fn transform_loop_init(
        &mut self,
        ctx: &Ctx,
        init: &Stmt,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CompileError> {
        match &init.kind {
            StmtKind::VarDecl { kind, declarators } => {
                for declarator in declarators {
                    match &declarator.id {
                        Pattern::Ident { name, span } => {
                            self.declare(ctx, name, BindingKind::from(*kind), *span)?;
                            let init_expr = match &declarator.init {
                                Some(expr) => Some(self.transform_expr(ctx, expr)?),
                                None => None,
                            };
                            out.push(build::decl(DeclKind::Let, build::pat_ident(name), init_expr));
                        }
                        other => {
                            return Err(CompileError::InvalidPattern {
                                message: "destructuring in a for-loop head is not supported"
                                    .to_string(),
                                span: other.span(),
                            });
                        }
                    }
                }
                Ok(())
            }
            StmtKind::Expr(expr) => {
                let expr = self.transform_expr(ctx, expr)?;
                out.push(build::expr_stmt(expr));
                Ok(())
            }
            _ => Err(CompileError::Internal(
                "unexpected for-loop initializer statement".to_string(),
            )),
        }
    }
}

/// Shape of a counter loop's head pieces.
enum LoopHead<'a> {
    While { test: &'a Expr },
    DoWhile { test: &'a Expr },
    For {
        init: Option<&'a Stmt>,
        test: Option<&'a Expr>,
        update: Option<&'a Expr>,
    },
}

impl LoopHead<'_> {
    fn kind(&self) -> crate::graph::LoopKind {
        match self {
            LoopHead::While { .. } => crate::graph::LoopKind::While,
            LoopHead::DoWhile { .. } => crate::graph::LoopKind::DoWhile,
            LoopHead::For { .. } => crate::graph::LoopKind::For,
        }
    }

    fn test(&self) -> Option<&Expr> {
        match self {
            LoopHead::While { test } | LoopHead::DoWhile { test } => Some(test),
            LoopHead::For { test, .. } => *test,
        }
    }
}

fn wrap_label(label: Option<String>, stmt: Stmt) -> Stmt {
    match label {
        Some(label) => build::stmt(StmtKind::Labeled {
            label,
            body: Box::new(stmt),
        }),
        None => stmt,
    }
}
