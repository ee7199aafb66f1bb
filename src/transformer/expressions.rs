//! Expression-level transform: dependency extraction and rewriting.
//!
//! Reads register refs on the open signal production; write positions
//! (assignment targets, update/delete operands) install effect
//! references on the enclosing boundary. Computed member keys are
//! rewritten to `base[$q.memo[k] = key]` so the key value each instance
//! observed is available to the runtime matcher.

use smallvec::SmallVec;

use crate::ast::{
    self, AssignOp, Expr, ExprKind, Literal, ObjectProp, Pattern, PropKey, UnaryOp, build,
};
use crate::error::CompileError;
use crate::graph::{PathStep, RefPath, UnitKind};
use crate::scope::BindingKind;
use crate::value::format_number;

use super::{Ctx, ExitKind, Transformer, construct_call, memo_assign};

impl Transformer {
    pub(super) fn transform_expr(&mut self, ctx: &Ctx, expr: &Expr) -> Result<Expr, CompileError> {
        match &expr.kind {
            ExprKind::Ident(_) | ExprKind::Member { .. } => {
                let (out, path) = self.transform_path_expr(ctx, expr)?;
                if let Some(path) = path {
                    self.push_signal_ref(ctx, path);
                }
                Ok(out)
            }
            ExprKind::Literal(_) => Ok(expr.clone()),
            ExprKind::Assign { op, target, value } => {
                self.transform_assign(ctx, *op, target, value, expr.span)
            }
            ExprKind::Update {
                op,
                prefix,
                argument,
            } => {
                let (argument, path) = self.transform_path_expr(ctx, argument)?;
                if let Some(path) = path {
                    if let Some(PathStep::Name(base)) = path.first()
                        && path.len() == 1
                    {
                        self.check_writable(ctx, &base.clone(), expr.span)?;
                    }
                    self.push_signal_ref(ctx, path.clone());
                    let effect = self.new_effect(ctx.unit, None, None);
                    self.push_effect_ref(ctx, ctx.unit, effect, path);
                }
                Ok(ast::build::expr(ExprKind::Update {
                    op: *op,
                    prefix: *prefix,
                    argument: Box::new(argument),
                }))
            }
            ExprKind::Unary { op, argument } => {
                if *op == UnaryOp::Delete {
                    let (argument, path) = self.transform_path_expr(ctx, argument)?;
                    if let Some(path) = path {
                        let effect = self.new_effect(ctx.unit, None, None);
                        self.push_effect_ref(ctx, ctx.unit, effect, path);
                    }
                    return Ok(build::unary(UnaryOp::Delete, argument));
                }
                let argument = self.transform_expr(ctx, argument)?;
                Ok(build::unary(*op, argument))
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.transform_expr(ctx, left)?;
                let right = self.transform_expr(ctx, right)?;
                Ok(build::binary(*op, left, right))
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.transform_expr(ctx, left)?;
                let right = self.transform_expr(ctx, right)?;
                Ok(build::logical(*op, left, right))
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.transform_expr(ctx, test)?;
                let consequent = self.transform_expr(ctx, consequent)?;
                let alternate = self.transform_expr(ctx, alternate)?;
                Ok(build::expr(ExprKind::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                }))
            }
            ExprKind::Call { callee, args } => {
                let (callee, callee_path) = self.transform_path_expr(ctx, callee)?;
                if let Some(path) = callee_path {
                    self.push_signal_ref(ctx, path);
                }
                let mut out_args = Vec::with_capacity(args.len());
                for arg in args {
                    out_args.push(self.transform_expr(ctx, arg)?);
                }
                Ok(build::call(callee, out_args))
            }
            ExprKind::Array(elements) => {
                let mut out = Vec::with_capacity(elements.len());
                for element in elements {
                    out.push(self.transform_expr(ctx, element)?);
                }
                Ok(build::array(out))
            }
            ExprKind::Object(props) => {
                let mut out = Vec::with_capacity(props.len());
                for prop in props {
                    let key = match &prop.key {
                        PropKey::Computed(key) => {
                            PropKey::Computed(Box::new(self.transform_expr(ctx, key)?))
                        }
                        other => other.clone(),
                    };
                    out.push(ObjectProp {
                        key,
                        value: self.transform_expr(ctx, &prop.value)?,
                    });
                }
                Ok(build::expr(ExprKind::Object(out)))
            }
            ExprKind::Sequence(exprs) => {
                let mut out = Vec::with_capacity(exprs.len());
                for e in exprs {
                    out.push(self.transform_expr(ctx, e)?);
                }
                Ok(build::expr(ExprKind::Sequence(out)))
            }
            ExprKind::Function(function) => self.transform_function(ctx, function),
            ExprKind::Await(inner) => {
                self.mark_await(ctx);
                let inner = self.transform_expr(ctx, inner)?;
                Ok(build::expr(ExprKind::Await(Box::new(inner))))
            }
        }
    }

    /// Rewrite a possibly path-shaped expression without registering a
    /// top-level ref; the caller decides whether (and how) the path is
    /// recorded. Computed key sub-expressions still register their own
    /// reads and are rewritten through memo slots.
    pub(super) fn transform_path_expr(
        &mut self,
        ctx: &Ctx,
        expr: &Expr,
    ) -> Result<(Expr, Option<RefPath>), CompileError> {
        match &expr.kind {
            ExprKind::Ident(name) => {
                let mut path = RefPath::new();
                path.push(PathStep::name(name.clone()));
                Ok((expr.clone(), Some(path)))
            }
            ExprKind::Member {
                object,
                property,
                computed,
            } => {
                let (object, object_path) = self.transform_path_expr(ctx, object)?;
                if !*computed {
                    let name = match &property.kind {
                        ExprKind::Ident(name) => name.clone(),
                        _ => {
                            return Err(CompileError::Internal(
                                "non-identifier property on a static member access".to_string(),
                            ));
                        }
                    };
                    let out = build::member(object, name.clone());
                    let path = object_path.map(|mut p| {
                        p.push(PathStep::name(name));
                        p
                    });
                    return Ok((out, path));
                }
                // Literal keys stay literal path segments.
                if let ExprKind::Literal(literal) = &property.kind {
                    let segment = match literal {
                        Literal::Str(s) => Some(s.clone()),
                        Literal::Number(n) => Some(format_number(*n)),
                        _ => None,
                    };
                    if let Some(segment) = segment {
                        let out = build::index(object, (**property).clone());
                        let path = object_path.map(|mut p| {
                            p.push(PathStep::name(segment));
                            p
                        });
                        return Ok((out, path));
                    }
                }
                let key = self.transform_expr(ctx, property)?;
                match object_path {
                    Some(mut path) => {
                        let memo = self.new_memo(ctx.unit);
                        path.push(PathStep::Memo { memo });
                        Ok((build::index(object, memo_assign(memo, key)), Some(path)))
                    }
                    None => Ok((build::index(object, key), None)),
                }
            }
            _ => Ok((self.transform_expr(ctx, expr)?, None)),
        }
    }

    fn transform_assign(
        &mut self,
        ctx: &Ctx,
        op: AssignOp,
        target: &Pattern,
        value: &Expr,
        span: ast::Span,
    ) -> Result<Expr, CompileError> {
        match target {
            Pattern::Ident { name, span: id_span } => {
                self.check_writable(ctx, name, *id_span)?;
                self.open_signal(ctx.unit);
                if op != AssignOp::Assign {
                    let mut read = RefPath::new();
                    read.push(PathStep::name(name.clone()));
                    self.push_signal_ref(ctx, read);
                }
                let value = self.transform_expr(ctx, value)?;
                let signal = self.close_signal()?;
                let effect = self.new_effect(ctx.unit, None, signal);
                let mut path = RefPath::new();
                path.push(PathStep::name(name.clone()));
                self.push_effect_ref(ctx, ctx.unit, effect, path);
                Ok(build::expr(ExprKind::Assign {
                    op,
                    target: Box::new(target.clone()),
                    value: Box::new(value),
                }))
            }
            Pattern::Member(member) => {
                self.open_signal(ctx.unit);
                let (member_out, path) = self.transform_path_expr(ctx, member)?;
                if op != AssignOp::Assign
                    && let Some(path) = &path
                {
                    self.push_signal_ref(ctx, path.clone());
                }
                let value = self.transform_expr(ctx, value)?;
                let signal = self.close_signal()?;
                if let Some(path) = path {
                    let effect = self.new_effect(ctx.unit, None, signal);
                    self.push_effect_ref(ctx, ctx.unit, effect, path);
                }
                Ok(build::expr(ExprKind::Assign {
                    op,
                    target: Box::new(Pattern::Member(member_out)),
                    value: Box::new(value),
                }))
            }
            _ => Err(CompileError::InvalidPattern {
                message: "destructuring assignment is only supported as a statement".to_string(),
                span,
            }),
        }
    }

    /// Compile a live function into a Function unit; the `$q` call
    /// yields the function value instead of running the body.
    pub(super) fn transform_function(
        &mut self,
        ctx: &Ctx,
        function: &ast::Function,
    ) -> Result<Expr, CompileError> {
        let unit = self.new_unit(Some(ctx.unit), UnitKind::Function, Some(function.span));
        let scope = self.scopes.push(Some(ctx.scope), true);
        let inner = Ctx {
            scope,
            unit,
            function: unit,
            condition: None,
            live: ctx.live,
        };
        if let Some(name) = &function.name {
            self.scopes.declare(scope, name, BindingKind::SelfRef);
        }
        let mut params = Vec::with_capacity(function.params.len());
        for param in &function.params {
            match param {
                Pattern::Ident { name, span } => {
                    self.declare(&inner, name, BindingKind::Param, *span)?;
                    params.push(param.clone());
                }
                other => {
                    return Err(CompileError::InvalidPattern {
                        message: "live function parameters must be plain identifiers".to_string(),
                        span: other.span(),
                    });
                }
            }
        }

        let mut body = Vec::new();
        let mut escapes = Vec::new();
        self.transform_stmts(&inner, &function.body, &mut body, &mut escapes)?;
        escapes.retain(|exit| exit.kind != ExitKind::Return);
        if let Some(stray) = escapes.first() {
            return Err(CompileError::InvalidPattern {
                message: format!(
                    "{} outside of an enclosing loop",
                    stray.kind.as_str()
                ),
                span: function.span,
            });
        }

        let is_async = function.is_async || self.units[unit].hoisted_await;
        self.units[unit].hoisted_await = is_async;
        let closure = build::expr(ExprKind::Function(Box::new(ast::Function {
            name: function.name.clone(),
            params,
            body,
            is_async,
            is_arrow: function.is_arrow,
            live: false,
            span: function.span,
        })));
        Ok(construct_call(self.units[unit].id, None, closure))
    }

    pub(super) fn mark_await(&mut self, ctx: &Ctx) {
        let mut unit = ctx.unit;
        loop {
            self.units[unit].hoisted_await = true;
            if unit == ctx.function {
                break;
            }
            match self.units[unit].parent {
                Some(parent) => unit = parent,
                None => break,
            }
        }
    }

    /// Record a plain read of `name`; used by the pattern expansion.
    pub(super) fn push_name_read(&mut self, ctx: &Ctx, name: &str) {
        let mut path = RefPath::new();
        path.push(PathStep::name(name));
        self.push_signal_ref(ctx, path);
    }

    pub(super) fn push_depth_read(
        &mut self,
        ctx: &Ctx,
        path: RefPath,
        depth: SmallVec<[PathStep; 2]>,
    ) {
        self.push_signal_ref_with(ctx, path, depth, false);
    }
}
