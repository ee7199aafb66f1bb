//! Binding and destructuring expansion.
//!
//! Declarations hoist their bindings (`let a, b;`) to the enclosing
//! boundary body and assign inside a per-declarator Statement unit, so
//! the assignment stays selectively re-runnable while the binding is
//! visible to sibling statements. Destructuring patterns expand to a
//! flat series of member reads off a temporary, each leaf carrying a
//! destructuring-depth stack on the initializer's ref.

use smallvec::SmallVec;

use crate::ast::{
    self, DeclKind, Declarator, Expr, ExprKind, Pattern, PropKey, Span, Stmt, StmtKind, build,
};
use crate::error::CompileError;
use crate::graph::{PathStep, RefPath, ReferenceId, UnitKind, ref_path};
use crate::scope::BindingKind;
use crate::value::format_number;

use super::{Ctx, ExitKey, Transformer, memo_assign};

/// How an expanded pattern leaf binds its name.
#[derive(Clone, Copy)]
enum BindMode {
    /// Declarator leaf: binding hoisted by the caller, assign here.
    DeclareHoisted(BindingKind),
    /// Loop binding leaf: declare and assign inline.
    DeclareInline(BindingKind),
    /// Destructuring assignment leaf: binding already exists.
    Assign,
}

/// Dependency bookkeeping for a tracked expansion.
struct Tracking {
    path: Option<RefPath>,
    effect: ReferenceId,
}

impl Transformer {
    pub(super) fn transform_declarator(
        &mut self,
        ctx: &Ctx,
        kind: DeclKind,
        declarator: &Declarator,
        span: Span,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CompileError> {
        let binding = BindingKind::from(kind);
        match &declarator.id {
            Pattern::Ident { name, span: id_span } => {
                self.declare(ctx, name, binding, *id_span)?;
                out.push(hoisted_decl(std::slice::from_ref(name)));
                let Some(init) = &declarator.init else {
                    return Ok(());
                };
                let name = name.clone();
                let (call, _) = self.child_boundary(
                    ctx,
                    UnitKind::Statement,
                    span,
                    None,
                    |t, inner, body_out, _| {
                        t.open_signal(inner.unit);
                        let init = t.transform_expr(inner, init)?;
                        let signal = t.close_signal()?;
                        let effect = t.new_effect(inner.unit, Some(binding), signal);
                        t.push_effect_ref(inner, inner.unit, effect, ref_path(&[&name]));
                        body_out.push(build::assign_stmt(&name, init));
                        Ok(())
                    },
                )?;
                out.push(build::expr_stmt(call));
                Ok(())
            }
            Pattern::Object { .. } | Pattern::Array { .. } => {
                let Some(init) = &declarator.init else {
                    return Err(CompileError::InvalidPattern {
                        message: "destructuring declaration requires an initializer".to_string(),
                        span: declarator.id.span(),
                    });
                };
                let names = collect_pattern_names(&declarator.id)?;
                out.push(hoisted_decl(&names));
                let pattern = declarator.id.clone();
                let (call, _) = self.child_boundary(
                    ctx,
                    UnitKind::Statement,
                    span,
                    None,
                    |t, inner, body_out, _| {
                        let temp = format!("$d{}", t.units[inner.unit].id);
                        t.open_signal(inner.unit);
                        let (init, init_path) = t.transform_path_expr(inner, init)?;
                        let effect = t.new_effect(inner.unit, Some(binding), None);
                        body_out.push(build::const_(&temp, init));
                        let tracking = Tracking {
                            path: init_path,
                            effect,
                        };
                        t.expand_pattern(
                            inner,
                            &pattern,
                            build::ident(&temp),
                            BindMode::DeclareHoisted(binding),
                            Some(&tracking),
                            &mut SmallVec::new(),
                            body_out,
                        )?;
                        let signal = t.close_signal()?;
                        t.units[inner.unit]
                            .effects
                            .get_mut(&effect)
                            .expect("effect installed above")
                            .assignee = signal;
                        Ok(())
                    },
                )?;
                out.push(build::expr_stmt(call));
                Ok(())
            }
            other => Err(CompileError::InvalidPattern {
                message: "unsupported declaration target".to_string(),
                span: other.span(),
            }),
        }
    }

    /// `({a, b} = value);` in statement position.
    pub(super) fn transform_destructuring_assign(
        &mut self,
        ctx: &Ctx,
        target: &Pattern,
        value: &Expr,
        span: Span,
        out: &mut Vec<Stmt>,
        _escapes: &mut [ExitKey],
    ) -> Result<(), CompileError> {
        let target = target.clone();
        let (call, _) = self.child_boundary(
            ctx,
            UnitKind::Statement,
            span,
            None,
            |t, inner, body_out, _| {
                let temp = format!("$d{}", t.units[inner.unit].id);
                t.open_signal(inner.unit);
                let (value, value_path) = t.transform_path_expr(inner, value)?;
                let effect = t.new_effect(inner.unit, None, None);
                body_out.push(build::const_(&temp, value));
                let tracking = Tracking {
                    path: value_path,
                    effect,
                };
                t.expand_pattern(
                    inner,
                    &target,
                    build::ident(&temp),
                    BindMode::Assign,
                    Some(&tracking),
                    &mut SmallVec::new(),
                    body_out,
                )?;
                let signal = t.close_signal()?;
                t.units[inner.unit]
                    .effects
                    .get_mut(&effect)
                    .expect("effect installed above")
                    .assignee = signal;
                Ok(())
            },
        )?;
        out.push(build::expr_stmt(call));
        Ok(())
    }

    /// Loop-binding entry: expand a destructured loop variable inline,
    /// without dependency tracking (element notification flows through
    /// the iteration contract target).
    pub(super) fn expand_binding_pattern(
        &mut self,
        ctx: &Ctx,
        kind: BindingKind,
        pattern: &Pattern,
        base: Expr,
        _tracking: Option<()>,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CompileError> {
        let temp = format!("$d{}", self.units[ctx.unit].id);
        out.push(build::const_(&temp, base));
        self.expand_pattern(
            ctx,
            pattern,
            build::ident(&temp),
            BindMode::DeclareInline(kind),
            None,
            &mut SmallVec::new(),
            out,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_pattern(
        &mut self,
        ctx: &Ctx,
        pattern: &Pattern,
        access: Expr,
        mode: BindMode,
        tracking: Option<&Tracking>,
        depth: &mut SmallVec<[PathStep; 2]>,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CompileError> {
        match pattern {
            Pattern::Ident { name, span } => {
                match mode {
                    BindMode::DeclareHoisted(kind) | BindMode::DeclareInline(kind) => {
                        self.declare(ctx, name, kind, *span)?;
                    }
                    BindMode::Assign => self.check_writable(ctx, name, *span)?,
                }
                if let Some(tracking) = tracking {
                    self.push_effect_ref(ctx, ctx.unit, tracking.effect, ref_path(&[name]));
                    if let Some(path) = &tracking.path {
                        self.push_depth_read(ctx, path.clone(), depth.clone());
                    }
                }
                out.push(match mode {
                    BindMode::DeclareInline(_) => {
                        build::decl(DeclKind::Let, build::pat_ident(name), Some(access))
                    }
                    _ => build::assign_stmt(name, access),
                });
                Ok(())
            }
            Pattern::Default {
                pattern: inner,
                default,
            } => {
                let default = self.transform_expr(ctx, default)?;
                let guarded = build::expr(ExprKind::Conditional {
                    test: Box::new(build::binary(
                        ast::BinaryOp::StrictEq,
                        access.clone(),
                        build::undefined(),
                    )),
                    consequent: Box::new(default),
                    alternate: Box::new(access),
                });
                self.expand_pattern(ctx, inner, guarded, mode, tracking, depth, out)
            }
            Pattern::Object { props, rest, span } => {
                if rest.is_some() {
                    return Err(CompileError::InvalidPattern {
                        message: "rest elements are not supported in live bindings".to_string(),
                        span: *span,
                    });
                }
                for prop in props {
                    let (step, child_access) = match &prop.key {
                        PropKey::Ident(name) => (
                            PathStep::name(name.clone()),
                            build::member(access.clone(), name.clone()),
                        ),
                        PropKey::Str(name) => (
                            PathStep::name(name.clone()),
                            build::index(access.clone(), build::str_(name.clone())),
                        ),
                        PropKey::Num(n) => (
                            PathStep::name(format_number(*n)),
                            build::index(access.clone(), build::num(*n)),
                        ),
                        PropKey::Computed(key) => {
                            let key = self.transform_expr(ctx, key)?;
                            let memo = self.new_memo(ctx.unit);
                            (
                                PathStep::Memo { memo },
                                build::index(access.clone(), memo_assign(memo, key)),
                            )
                        }
                    };
                    depth.push(step);
                    self.expand_pattern(ctx, &prop.value, child_access, mode, tracking, depth, out)?;
                    depth.pop();
                }
                Ok(())
            }
            Pattern::Array {
                elements,
                rest,
                span,
            } => {
                if rest.is_some() {
                    return Err(CompileError::InvalidPattern {
                        message: "rest elements are not supported in live bindings".to_string(),
                        span: *span,
                    });
                }
                for (index, element) in elements.iter().enumerate() {
                    let Some(element) = element else { continue };
                    let child_access =
                        build::index(access.clone(), build::num(index as f64));
                    depth.push(PathStep::name(index.to_string()));
                    self.expand_pattern(ctx, element, child_access, mode, tracking, depth, out)?;
                    depth.pop();
                }
                Ok(())
            }
            Pattern::Member(_) => Err(CompileError::InvalidPattern {
                message: "member expressions are not supported inside destructuring patterns"
                    .to_string(),
                span: pattern.span(),
            }),
        }
    }
}

/// `let a, b, c;`
fn hoisted_decl(names: &[String]) -> Stmt {
    build::stmt(StmtKind::VarDecl {
        kind: DeclKind::Let,
        declarators: names
            .iter()
            .map(|name| Declarator {
                id: build::pat_ident(name),
                init: None,
            })
            .collect(),
    })
}

/// Leaf binding names of a pattern, left to right.
fn collect_pattern_names(pattern: &Pattern) -> Result<Vec<String>, CompileError> {
    fn walk(pattern: &Pattern, names: &mut Vec<String>) -> Result<(), CompileError> {
        match pattern {
            Pattern::Ident { name, .. } => {
                names.push(name.clone());
                Ok(())
            }
            Pattern::Default { pattern, .. } => walk(pattern, names),
            Pattern::Object { props, rest, span } => {
                if rest.is_some() {
                    return Err(CompileError::InvalidPattern {
                        message: "rest elements are not supported in live bindings".to_string(),
                        span: *span,
                    });
                }
                for prop in props {
                    walk(&prop.value, names)?;
                }
                Ok(())
            }
            Pattern::Array {
                elements,
                rest,
                span,
            } => {
                if rest.is_some() {
                    return Err(CompileError::InvalidPattern {
                        message: "rest elements are not supported in live bindings".to_string(),
                        span: *span,
                    });
                }
                for element in elements.iter().flatten() {
                    walk(element, names)?;
                }
                Ok(())
            }
            Pattern::Member(expr) => Err(CompileError::InvalidPattern {
                message: "member expressions are not supported inside destructuring patterns"
                    .to_string(),
                span: expr.span,
            }),
        }
    }
    let mut names = Vec::new();
    walk(pattern, &mut names)?;
    Ok(names)
}
