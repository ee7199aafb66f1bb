//! Refs recorded under a branch only fire while that branch is taken.

use reflex::ast::build;
use reflex::testing::TestProgram;
use reflex::value::Value;

fn branching() -> reflex::ast::Program {
    // if (x.flag) { out.t = x.a } else { out.f = x.b }
    build::program(vec![build::if_(
        build::path(&["x", "flag"]),
        build::block(vec![build::member_assign_stmt(
            build::path(&["out", "t"]),
            build::path(&["x", "a"]),
        )]),
        Some(build::block(vec![build::member_assign_stmt(
            build::path(&["out", "f"]),
            build::path(&["x", "b"]),
        )])),
    )])
}

fn globals(flag: bool) -> Value {
    Value::object([
        (
            "x",
            Value::object([
                ("flag", Value::Bool(flag)),
                ("a", Value::Number(1.0)),
                ("b", Value::Number(2.0)),
            ]),
        ),
        ("out", Value::object([] as [(&str, Value); 0])),
    ])
}

#[test]
fn cold_run_takes_one_arm() {
    let t = TestProgram::run(&branching(), globals(true));
    t.assert_eq("out.t", Value::Number(1.0));
    t.assert_eq("out.f", Value::Undefined);
}

#[test]
fn the_untaken_arm_ignores_its_inputs() {
    let t = TestProgram::run(&branching(), globals(true));

    t.mutate("x.b", Value::Number(9.0));
    assert!(t.reruns().is_empty());
    t.assert_eq("out.f", Value::Undefined);

    t.mutate("x.a", Value::Number(5.0));
    assert_eq!(t.reruns().len(), 1);
    t.assert_eq("out.t", Value::Number(5.0));
}

#[test]
fn flipping_the_test_switches_the_live_arm() {
    let t = TestProgram::run(&branching(), globals(true));

    t.mutate("x.flag", Value::Bool(false));
    t.assert_eq("out.f", Value::Number(2.0));

    // The then-arm is gone now.
    t.mutate("x.a", Value::Number(5.0));
    assert!(t.reruns().is_empty());

    t.mutate("x.b", Value::Number(9.0));
    t.assert_eq("out.f", Value::Number(9.0));
}
