//! AST node shapes for the JS-like source language.
//!
//! The crate does not parse text: an external parser is expected to hand
//! over a tree built from these types (or tests build one directly with
//! the constructor helpers in [`build`]). The same node family is used
//! for the transformer's instrumented output, so a generic AST-to-text
//! printer can consume either side.

use serde::Serialize;

/// Byte offsets into the original source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// A whole source program.
///
/// `live` marks the program as a reactive region (driven by a source
/// directive or the caller's `live_mode` option).
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub live: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl {
        kind: DeclKind,
        declarators: Vec<Declarator>,
    },
    FunctionDecl(Box<Function>),
    Block(Vec<Stmt>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        left: ForTarget,
        right: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        left: ForTarget,
        right: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Return {
        argument: Option<Expr>,
    },
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    Empty,
}

/// Declaration keyword of a `VarDecl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Let,
    Var,
    Const,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub id: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for the `default` case.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Left side of a `for-in`/`for-of` head.
#[derive(Debug, Clone)]
pub enum ForTarget {
    Decl { kind: DeclKind, pattern: Pattern },
    Pattern(Pattern),
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Pattern>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub is_arrow: bool,
    /// Reactive function body (`"use live"` directive or declared-live).
    pub live: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Ident(String),
    Literal(Literal),
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
        computed: bool,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        argument: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        argument: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<ObjectProp>),
    Function(Box<Function>),
    Sequence(Vec<Expr>),
    Await(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct ObjectProp {
    pub key: PropKey,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum PropKey {
    Ident(String),
    Str(String),
    Num(f64),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
}

/// Binding or assignment target.
///
/// `Member` only appears in assignment position (`obj.a = ...`), never in
/// declarations.
#[derive(Debug, Clone)]
pub enum Pattern {
    Ident { name: String, span: Span },
    Member(Expr),
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    Default {
        pattern: Box<Pattern>,
        default: Box<Expr>,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Ident { span, .. } => *span,
            Pattern::Member(expr) => expr.span,
            Pattern::Object { span, .. } | Pattern::Array { span, .. } => *span,
            Pattern::Default { pattern, .. } => pattern.span(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectPatternProp {
    pub key: PropKey,
    pub value: Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Constructor helpers used by tests and by the transformer when it
/// assembles instrumented output nodes. All helpers produce zero spans;
/// parser-produced trees carry real offsets.
pub mod build {
    use super::*;

    pub fn program(body: Vec<Stmt>) -> Program {
        Program {
            body,
            live: true,
            span: Span::default(),
        }
    }

    pub fn stmt(kind: StmtKind) -> Stmt {
        Stmt {
            kind,
            span: Span::default(),
        }
    }

    pub fn expr(kind: ExprKind) -> Expr {
        Expr {
            kind,
            span: Span::default(),
        }
    }

    pub fn ident(name: impl Into<String>) -> Expr {
        expr(ExprKind::Ident(name.into()))
    }

    pub fn num(value: f64) -> Expr {
        expr(ExprKind::Literal(Literal::Number(value)))
    }

    pub fn str_(value: impl Into<String>) -> Expr {
        expr(ExprKind::Literal(Literal::Str(value.into())))
    }

    pub fn bool_(value: bool) -> Expr {
        expr(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn undefined() -> Expr {
        expr(ExprKind::Literal(Literal::Undefined))
    }

    /// `object.name`
    pub fn member(object: Expr, name: impl Into<String>) -> Expr {
        expr(ExprKind::Member {
            object: Box::new(object),
            property: Box::new(ident(name)),
            computed: false,
        })
    }

    /// `object[property]`
    pub fn index(object: Expr, property: Expr) -> Expr {
        expr(ExprKind::Member {
            object: Box::new(object),
            property: Box::new(property),
            computed: true,
        })
    }

    /// Dotted path read: `path(["x", "a"])` is `x.a`.
    pub fn path(parts: &[&str]) -> Expr {
        let mut iter = parts.iter();
        let mut node = ident(*iter.next().expect("path needs at least one part"));
        for part in iter {
            node = member(node, *part);
        }
        node
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        expr(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(op: UnaryOp, argument: Expr) -> Expr {
        expr(ExprKind::Unary {
            op,
            argument: Box::new(argument),
        })
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
        expr(ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn array(elements: Vec<Expr>) -> Expr {
        expr(ExprKind::Array(elements))
    }

    pub fn object(props: Vec<(&str, Expr)>) -> Expr {
        expr(ExprKind::Object(
            props
                .into_iter()
                .map(|(key, value)| ObjectProp {
                    key: PropKey::Ident(key.to_string()),
                    value,
                })
                .collect(),
        ))
    }

    pub fn pat_ident(name: impl Into<String>) -> Pattern {
        Pattern::Ident {
            name: name.into(),
            span: Span::default(),
        }
    }

    pub fn assign(target: Pattern, value: Expr) -> Expr {
        expr(ExprKind::Assign {
            op: AssignOp::Assign,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// `name = value` as a statement.
    pub fn assign_stmt(name: &str, value: Expr) -> Stmt {
        stmt(StmtKind::Expr(assign(pat_ident(name), value)))
    }

    /// `target = value` where the target is a member expression.
    pub fn member_assign_stmt(target: Expr, value: Expr) -> Stmt {
        stmt(StmtKind::Expr(assign(Pattern::Member(target), value)))
    }

    pub fn expr_stmt(e: Expr) -> Stmt {
        stmt(StmtKind::Expr(e))
    }

    pub fn decl(kind: DeclKind, id: Pattern, init: Option<Expr>) -> Stmt {
        stmt(StmtKind::VarDecl {
            kind,
            declarators: vec![Declarator { id, init }],
        })
    }

    /// `let name = init;`
    pub fn let_(name: &str, init: Expr) -> Stmt {
        decl(DeclKind::Let, pat_ident(name), Some(init))
    }

    /// `const name = init;`
    pub fn const_(name: &str, init: Expr) -> Stmt {
        decl(DeclKind::Const, pat_ident(name), Some(init))
    }

    pub fn block(body: Vec<Stmt>) -> Stmt {
        stmt(StmtKind::Block(body))
    }

    pub fn if_(test: Expr, consequent: Stmt, alternate: Option<Stmt>) -> Stmt {
        stmt(StmtKind::If {
            test,
            consequent: Box::new(consequent),
            alternate: alternate.map(Box::new),
        })
    }

    pub fn while_(test: Expr, body: Stmt) -> Stmt {
        stmt(StmtKind::While {
            test,
            body: Box::new(body),
        })
    }

    pub fn for_of(kind: DeclKind, name: &str, right: Expr, body: Stmt) -> Stmt {
        stmt(StmtKind::ForOf {
            left: ForTarget::Decl {
                kind,
                pattern: pat_ident(name),
            },
            right,
            body: Box::new(body),
        })
    }

    pub fn for_in(kind: DeclKind, name: &str, right: Expr, body: Stmt) -> Stmt {
        stmt(StmtKind::ForIn {
            left: ForTarget::Decl {
                kind,
                pattern: pat_ident(name),
            },
            right,
            body: Box::new(body),
        })
    }

    pub fn return_(argument: Option<Expr>) -> Stmt {
        stmt(StmtKind::Return { argument })
    }

    pub fn break_(label: Option<&str>) -> Stmt {
        stmt(StmtKind::Break {
            label: label.map(str::to_string),
        })
    }

    pub fn continue_(label: Option<&str>) -> Stmt {
        stmt(StmtKind::Continue {
            label: label.map(str::to_string),
        })
    }

    pub fn function_decl(name: &str, params: Vec<Pattern>, body: Vec<Stmt>) -> Stmt {
        stmt(StmtKind::FunctionDecl(Box::new(Function {
            name: Some(name.to_string()),
            params,
            body,
            is_async: false,
            is_arrow: false,
            live: true,
            span: Span::default(),
        })))
    }

    pub fn closure(params: Vec<Pattern>, body: Vec<Stmt>, is_async: bool) -> Expr {
        expr(ExprKind::Function(Box::new(Function {
            name: None,
            params,
            body,
            is_async,
            is_arrow: false,
            live: false,
            span: Span::default(),
        })))
    }
}
