//! Minimal AST-to-text rendering.
//!
//! Exists for `LiveProgram::to_string(false)` and test assertions over
//! instrumented output. Canonical, not pretty: one statement per line,
//! two-space indent, no comment or parenthesization minimisation beyond
//! what re-parsing would need.

use crate::ast::{
    AssignOp, BinaryOp, DeclKind, Expr, ExprKind, ForTarget, Function, Literal, LogicalOp,
    ObjectProp, Pattern, Program, PropKey, Stmt, StmtKind, UnaryOp, UpdateOp,
};
use crate::value::format_number;

pub fn print(program: &Program) -> String {
    let mut printer = Printer::default();
    for stmt in &program.body {
        printer.stmt(stmt);
    }
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.line_start();
        self.stmt_inline(stmt);
        self.out.push('\n');
    }

    fn stmt_inline(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(expr);
                self.push(";");
            }
            StmtKind::VarDecl { kind, declarators } => {
                self.push(decl_keyword(*kind));
                self.push(" ");
                for (index, declarator) in declarators.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    self.pattern(&declarator.id);
                    if let Some(init) = &declarator.init {
                        self.push(" = ");
                        self.expr(init);
                    }
                }
                self.push(";");
            }
            StmtKind::FunctionDecl(function) => self.function(function),
            StmtKind::Block(body) => self.block(body),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.push("if (");
                self.expr(test);
                self.push(") ");
                self.stmt_inline(consequent);
                if let Some(alternate) = alternate {
                    self.push(" else ");
                    self.stmt_inline(alternate);
                }
            }
            StmtKind::Switch { discriminant, cases } => {
                self.push("switch (");
                self.expr(discriminant);
                self.push(") {\n");
                self.indent += 1;
                for case in cases {
                    self.line_start();
                    match &case.test {
                        Some(test) => {
                            self.push("case ");
                            self.expr(test);
                            self.push(":\n");
                        }
                        None => self.push("default:\n"),
                    }
                    self.indent += 1;
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.line_start();
                self.push("}");
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.push("for (");
                match init {
                    Some(init) => self.stmt_inline(init),
                    None => self.push(";"),
                }
                self.push(" ");
                if let Some(test) = test {
                    self.expr(test);
                }
                self.push("; ");
                if let Some(update) = update {
                    self.expr(update);
                }
                self.push(") ");
                self.stmt_inline(body);
            }
            StmtKind::ForIn { left, right, body } => {
                self.for_each("in", left, right, body);
            }
            StmtKind::ForOf { left, right, body } => {
                self.for_each("of", left, right, body);
            }
            StmtKind::While { test, body } => {
                self.push("while (");
                self.expr(test);
                self.push(") ");
                self.stmt_inline(body);
            }
            StmtKind::DoWhile { body, test } => {
                self.push("do ");
                self.stmt_inline(body);
                self.push(" while (");
                self.expr(test);
                self.push(");");
            }
            StmtKind::Labeled { label, body } => {
                self.push(label);
                self.push(": ");
                self.stmt_inline(body);
            }
            StmtKind::Break { label } => {
                self.push("break");
                if let Some(label) = label {
                    self.push(" ");
                    self.push(label);
                }
                self.push(";");
            }
            StmtKind::Continue { label } => {
                self.push("continue");
                if let Some(label) = label {
                    self.push(" ");
                    self.push(label);
                }
                self.push(";");
            }
            StmtKind::Return { argument } => {
                self.push("return");
                if let Some(argument) = argument {
                    self.push(" ");
                    self.expr(argument);
                }
                self.push(";");
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.push("try ");
                self.block(block);
                if let Some(handler) = handler {
                    self.push(" catch ");
                    if let Some(param) = &handler.param {
                        self.push("(");
                        self.pattern(param);
                        self.push(") ");
                    }
                    self.block(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.push(" finally ");
                    self.block(finalizer);
                }
            }
            StmtKind::Throw(expr) => {
                self.push("throw ");
                self.expr(expr);
                self.push(";");
            }
            StmtKind::Empty => self.push(";"),
        }
    }

    fn for_each(&mut self, keyword: &str, left: &ForTarget, right: &Expr, body: &Stmt) {
        self.push("for (");
        match left {
            ForTarget::Decl { kind, pattern } => {
                self.push(decl_keyword(*kind));
                self.push(" ");
                self.pattern(pattern);
            }
            ForTarget::Pattern(pattern) => self.pattern(pattern),
        }
        self.push(" ");
        self.push(keyword);
        self.push(" ");
        self.expr(right);
        self.push(") ");
        self.stmt_inline(body);
    }

    fn block(&mut self, body: &[Stmt]) {
        self.push("{\n");
        self.indent += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.line_start();
        self.push("}");
    }

    fn function(&mut self, function: &Function) {
        if function.is_async {
            self.push("async ");
        }
        self.push("function");
        if let Some(name) = &function.name {
            self.push(" ");
            self.push(name);
        }
        self.push("(");
        for (index, param) in function.params.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            self.pattern(param);
        }
        self.push(") ");
        self.block(&function.body);
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => self.push(name),
            ExprKind::Literal(literal) => self.literal(literal),
            ExprKind::Member {
                object,
                property,
                computed,
            } => {
                self.expr(object);
                if *computed {
                    self.push("[");
                    self.expr(property);
                    self.push("]");
                } else {
                    self.push(".");
                    self.expr(property);
                }
            }
            ExprKind::Assign { op, target, value } => {
                self.pattern(target);
                self.push(assign_op(*op));
                self.expr(value);
            }
            ExprKind::Update {
                op,
                prefix,
                argument,
            } => {
                let token = match op {
                    UpdateOp::Inc => "++",
                    UpdateOp::Dec => "--",
                };
                if *prefix {
                    self.push(token);
                    self.expr(argument);
                } else {
                    self.expr(argument);
                    self.push(token);
                }
            }
            ExprKind::Unary { op, argument } => {
                self.push(unary_op(*op));
                self.expr(argument);
            }
            ExprKind::Binary { op, left, right } => {
                self.push("(");
                self.expr(left);
                self.push(" ");
                self.push(binary_op(*op));
                self.push(" ");
                self.expr(right);
                self.push(")");
            }
            ExprKind::Logical { op, left, right } => {
                self.push("(");
                self.expr(left);
                self.push(match op {
                    LogicalOp::And => " && ",
                    LogicalOp::Or => " || ",
                    LogicalOp::Nullish => " ?? ",
                });
                self.expr(right);
                self.push(")");
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.push("(");
                self.expr(test);
                self.push(" ? ");
                self.expr(consequent);
                self.push(" : ");
                self.expr(alternate);
                self.push(")");
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee);
                self.push("(");
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    self.expr(arg);
                }
                self.push(")");
            }
            ExprKind::Array(elements) => {
                self.push("[");
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    self.expr(element);
                }
                self.push("]");
            }
            ExprKind::Object(props) => {
                self.push("{");
                for (index, prop) in props.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    self.prop(prop);
                }
                self.push("}");
            }
            ExprKind::Function(function) => self.function(function),
            ExprKind::Sequence(exprs) => {
                self.push("(");
                for (index, expr) in exprs.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    self.expr(expr);
                }
                self.push(")");
            }
            ExprKind::Await(inner) => {
                self.push("await ");
                self.expr(inner);
            }
        }
    }

    fn prop(&mut self, prop: &ObjectProp) {
        match &prop.key {
            PropKey::Ident(name) => self.push(name),
            PropKey::Str(text) => {
                let quoted = quote(text);
                self.push(&quoted);
            }
            PropKey::Num(n) => {
                let text = format_number(*n);
                self.push(&text);
            }
            PropKey::Computed(expr) => {
                self.push("[");
                self.expr(expr);
                self.push("]");
            }
        }
        self.push(": ");
        self.expr(&prop.value);
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident { name, .. } => self.push(name),
            Pattern::Member(expr) => self.expr(expr),
            Pattern::Default { pattern, default } => {
                self.pattern(pattern);
                self.push(" = ");
                self.expr(default);
            }
            Pattern::Object { props, rest, .. } => {
                self.push("{");
                for (index, prop) in props.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    match &prop.key {
                        PropKey::Ident(name) => self.push(name),
                        PropKey::Str(text) => {
                            let quoted = quote(text);
                            self.push(&quoted);
                        }
                        PropKey::Num(n) => {
                            let text = format_number(*n);
                            self.push(&text);
                        }
                        PropKey::Computed(expr) => {
                            self.push("[");
                            self.expr(expr);
                            self.push("]");
                        }
                    }
                    self.push(": ");
                    self.pattern(&prop.value);
                }
                if let Some(rest) = rest {
                    if !props.is_empty() {
                        self.push(", ");
                    }
                    self.push("...");
                    self.pattern(rest);
                }
                self.push("}");
            }
            Pattern::Array { elements, rest, .. } => {
                self.push("[");
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    if let Some(element) = element {
                        self.pattern(element);
                    }
                }
                if let Some(rest) = rest {
                    if !elements.is_empty() {
                        self.push(", ");
                    }
                    self.push("...");
                    self.pattern(rest);
                }
                self.push("]");
            }
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Number(n) => {
                let text = format_number(*n);
                self.push(&text);
            }
            Literal::Str(text) => {
                let quoted = quote(text);
                self.push(&quoted);
            }
            Literal::Bool(b) => self.push(if *b { "true" } else { "false" }),
            Literal::Null => self.push("null"),
            Literal::Undefined => self.push("undefined"),
        }
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn decl_keyword(kind: DeclKind) -> &'static str {
    match kind {
        DeclKind::Let => "let",
        DeclKind::Var => "var",
        DeclKind::Const => "const",
    }
}

fn assign_op(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => " = ",
        AssignOp::Add => " += ",
        AssignOp::Sub => " -= ",
        AssignOp::Mul => " *= ",
        AssignOp::Div => " /= ",
    }
}

fn unary_op(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Plus => "+",
        UnaryOp::Not => "!",
        UnaryOp::TypeOf => "typeof ",
        UnaryOp::Void => "void ",
        UnaryOp::Delete => "delete ",
    }
}

fn binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::StrictEq => "===",
        BinaryOp::StrictNotEq => "!==",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::In => "in",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;

    #[test]
    fn statements_render_one_per_line() {
        let program = build::program(vec![
            build::let_("x", build::num(1.0)),
            build::if_(
                build::ident("x"),
                build::block(vec![build::assign_stmt("x", build::num(2.0))]),
                None,
            ),
        ]);
        let text = print(&program);
        assert_eq!(text, "let x = 1;\nif (x) {\n  x = 2;\n}\n");
    }

    #[test]
    fn construct_calls_round_trip_through_text() {
        let closure = build::closure(vec![], vec![build::return_(None)], false);
        let program = build::program(vec![build::expr_stmt(build::call(
            build::ident("$q"),
            vec![build::num(3.0), closure],
        ))]);
        let text = print(&program);
        assert!(text.contains("$q(3, function() {"));
    }
}
