//! Switch arms re-run while their case is live, including bodies
//! reached by falling through from an earlier matching case.

use reflex::ast::{Span, Stmt, StmtKind, SwitchCase, build};
use reflex::testing::TestProgram;
use reflex::value::Value;

fn case(test: Option<&str>, body: Vec<Stmt>) -> SwitchCase {
    SwitchCase {
        test: test.map(build::str_),
        body,
        span: Span::default(),
    }
}

fn switch_on_key(cases: Vec<SwitchCase>) -> reflex::ast::Program {
    build::program(vec![build::stmt(StmtKind::Switch {
        discriminant: build::path(&["x", "k"]),
        cases,
    })])
}

fn globals(k: &str) -> Value {
    Value::object([
        (
            "x",
            Value::object([
                ("k", Value::string(k)),
                ("a", Value::Number(1.0)),
                ("b", Value::Number(2.0)),
            ]),
        ),
        ("out", Value::object([] as [(&str, Value); 0])),
    ])
}

#[test]
fn a_fallen_through_arm_stays_live() {
    // switch (x.k) { case "a": out.p = x.a; case "b": out.q = x.b; }
    let program = switch_on_key(vec![
        case(
            Some("a"),
            vec![build::member_assign_stmt(
                build::path(&["out", "p"]),
                build::path(&["x", "a"]),
            )],
        ),
        case(
            Some("b"),
            vec![build::member_assign_stmt(
                build::path(&["out", "q"]),
                build::path(&["x", "b"]),
            )],
        ),
    ]);
    let t = TestProgram::run(&program, globals("a"));
    t.assert_eq("out.p", Value::Number(1.0));
    t.assert_eq("out.q", Value::Number(2.0));

    t.mutate("x.b", Value::Number(9.0));
    t.assert_eq("out.q", Value::Number(9.0));

    t.mutate("x.a", Value::Number(5.0));
    t.assert_eq("out.p", Value::Number(5.0));
}

#[test]
fn a_broken_out_arm_keeps_later_cases_cold() {
    // switch (x.k) { case "a": out.p = x.a; break; case "b": out.q = x.b; }
    let program = switch_on_key(vec![
        case(
            Some("a"),
            vec![
                build::member_assign_stmt(build::path(&["out", "p"]), build::path(&["x", "a"])),
                build::break_(None),
            ],
        ),
        case(
            Some("b"),
            vec![build::member_assign_stmt(
                build::path(&["out", "q"]),
                build::path(&["x", "b"]),
            )],
        ),
    ]);
    let t = TestProgram::run(&program, globals("a"));
    t.assert_eq("out.p", Value::Number(1.0));
    t.assert_eq("out.q", Value::Undefined);

    t.mutate("x.b", Value::Number(9.0));
    assert!(t.reruns().is_empty());
    t.assert_eq("out.q", Value::Undefined);

    // Flipping the discriminant retires the old arm.
    t.mutate("x.k", Value::string("b"));
    t.assert_eq("out.q", Value::Number(9.0));
    t.mutate("x.a", Value::Number(5.0));
    assert!(t.reruns().is_empty());
    t.assert_eq("out.p", Value::Number(1.0));
}

#[test]
fn the_default_arm_follows_its_inputs() {
    // switch (x.k) { case "a": out.p = x.a; break; default: out.d = x.b; }
    let program = switch_on_key(vec![
        case(
            Some("a"),
            vec![
                build::member_assign_stmt(build::path(&["out", "p"]), build::path(&["x", "a"])),
                build::break_(None),
            ],
        ),
        case(
            None,
            vec![build::member_assign_stmt(
                build::path(&["out", "d"]),
                build::path(&["x", "b"]),
            )],
        ),
    ]);
    let t = TestProgram::run(&program, globals("z"));
    t.assert_eq("out.p", Value::Undefined);
    t.assert_eq("out.d", Value::Number(2.0));

    t.mutate("x.b", Value::Number(9.0));
    t.assert_eq("out.d", Value::Number(9.0));
}
