//! Per-key loop instances re-run independently; appended keys spawn
//! instances without re-running the whole loop.

use reflex::ast::{BinaryOp, DeclKind, build};
use reflex::testing::TestProgram;
use reflex::value::Value;

fn doubler() -> reflex::ast::Program {
    // for (const k in list) { out[k] = list[k] * 2 }
    build::program(vec![build::for_in(
        DeclKind::Const,
        "k",
        build::ident("list"),
        build::block(vec![build::member_assign_stmt(
            build::index(build::ident("out"), build::ident("k")),
            build::binary(
                BinaryOp::Mul,
                build::index(build::ident("list"), build::ident("k")),
                build::num(2.0),
            ),
        )]),
    )])
}

fn globals() -> Value {
    Value::object([
        (
            "list",
            Value::array([Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
        ),
        ("out", Value::object([] as [(&str, Value); 0])),
    ])
}

#[test]
fn cold_run_visits_every_key() {
    let t = TestProgram::run(&doubler(), globals());
    t.assert_eq("out.0", Value::Number(2.0));
    t.assert_eq("out.1", Value::Number(4.0));
    t.assert_eq("out.2", Value::Number(6.0));
}

#[test]
fn an_element_change_reruns_only_its_instance() {
    let t = TestProgram::run(&doubler(), globals());

    // Poison a sibling output; a whole-loop rerun would repair it.
    t.globals().set_path(&["out", "0"], Value::Number(0.0));

    t.mutate("list.1", Value::Number(10.0));
    t.assert_eq("out.1", Value::Number(20.0));
    t.assert_eq("out.0", Value::Number(0.0));
}

#[test]
fn an_appended_key_gets_its_own_instance() {
    let t = TestProgram::run(&doubler(), globals());
    t.globals().set_path(&["out", "0"], Value::Number(0.0));

    t.mutate("list.3", Value::Number(7.0));
    t.assert_eq("out.3", Value::Number(14.0));
    t.assert_eq("out.0", Value::Number(0.0));

    // The spawned instance is a normal one afterwards.
    t.mutate("list.3", Value::Number(8.0));
    t.assert_eq("out.3", Value::Number(16.0));
}

#[test]
fn a_container_level_change_reruns_the_whole_loop() {
    let t = TestProgram::run(&doubler(), globals());
    t.globals().set_path(&["out", "0"], Value::Number(0.0));

    t.notify(&["list"]);
    t.assert_eq("out.0", Value::Number(2.0));
    t.assert_eq("out.2", Value::Number(6.0));
}
