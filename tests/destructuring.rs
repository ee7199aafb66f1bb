//! Destructuring declarations re-run as one statement and push their
//! rebound names to downstream readers.

use reflex::ast::{BinaryOp, DeclKind, Pattern, build};
use reflex::testing::TestProgram;
use reflex::value::Value;

fn object_pattern(names: &[&str]) -> Pattern {
    Pattern::Object {
        props: names
            .iter()
            .map(|name| reflex::ast::ObjectPatternProp {
                key: reflex::ast::PropKey::Ident((*name).to_string()),
                value: build::pat_ident(*name),
            })
            .collect(),
        rest: None,
        span: reflex::ast::Span::default(),
    }
}

fn summing() -> reflex::ast::Program {
    // let {a, b} = x; out.s = a + b;
    build::program(vec![
        build::decl(DeclKind::Let, object_pattern(&["a", "b"]), Some(build::ident("x"))),
        build::member_assign_stmt(
            build::path(&["out", "s"]),
            build::binary(BinaryOp::Add, build::ident("a"), build::ident("b")),
        ),
    ])
}

fn globals() -> Value {
    Value::object([
        (
            "x",
            Value::object([("a", Value::Number(1.0)), ("b", Value::Number(2.0))]),
        ),
        ("out", Value::object([] as [(&str, Value); 0])),
    ])
}

#[test]
fn cold_run_binds_and_sums() {
    let t = TestProgram::run(&summing(), globals());
    t.assert_eq("out.s", Value::Number(3.0));
}

#[test]
fn a_source_field_change_flows_through_the_binding() {
    let t = TestProgram::run(&summing(), globals());

    t.mutate("x.a", Value::Number(10.0));
    t.assert_eq("out.s", Value::Number(12.0));
}

#[test]
fn array_patterns_bind_by_index() {
    // let [p, q] = x.pair; out.t = p * q;
    let program = build::program(vec![
        build::decl(
            DeclKind::Let,
            Pattern::Array {
                elements: vec![Some(build::pat_ident("p")), Some(build::pat_ident("q"))],
                rest: None,
                span: reflex::ast::Span::default(),
            },
            Some(build::path(&["x", "pair"])),
        ),
        build::member_assign_stmt(
            build::path(&["out", "t"]),
            build::binary(BinaryOp::Mul, build::ident("p"), build::ident("q")),
        ),
    ]);
    let globals = Value::object([
        (
            "x",
            Value::object([(
                "pair",
                Value::array([Value::Number(3.0), Value::Number(4.0)]),
            )]),
        ),
        ("out", Value::object([] as [(&str, Value); 0])),
    ]);
    let t = TestProgram::run(&program, globals);
    t.assert_eq("out.t", Value::Number(12.0));

    t.mutate("x.pair.0", Value::Number(5.0));
    t.assert_eq("out.t", Value::Number(20.0));
}
