//! A break raised inside a re-run instance escalates to the loop that
//! owns it instead of leaking into unrelated instances.

use reflex::ast::{BinaryOp, DeclKind, build};
use reflex::testing::TestProgram;
use reflex::value::Value;

fn capped_scan() -> reflex::ast::Program {
    // for (const v of list) { if (v > x.cap) { break } out.last = v }
    build::program(vec![build::for_of(
        DeclKind::Const,
        "v",
        build::ident("list"),
        build::block(vec![
            build::if_(
                build::binary(BinaryOp::Gt, build::ident("v"), build::path(&["x", "cap"])),
                build::block(vec![build::break_(None)]),
                None,
            ),
            build::member_assign_stmt(build::path(&["out", "last"]), build::ident("v")),
        ]),
    )])
}

fn globals(cap: f64) -> Value {
    Value::object([
        (
            "list",
            Value::array([Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
        ),
        ("x", Value::object([("cap", Value::Number(cap))])),
        ("out", Value::object([] as [(&str, Value); 0])),
    ])
}

#[test]
fn cold_run_without_a_break_scans_everything() {
    let t = TestProgram::run(&capped_scan(), globals(10.0));
    t.assert_eq("out.last", Value::Number(3.0));
}

#[test]
fn cold_run_stops_at_the_cap() {
    let t = TestProgram::run(&capped_scan(), globals(1.0));
    t.assert_eq("out.last", Value::Number(1.0));
}

#[test]
fn a_break_raised_by_a_rerun_reruns_the_owning_loop() {
    let t = TestProgram::run(&capped_scan(), globals(10.0));
    t.assert_eq("out.last", Value::Number(3.0));

    // Lowering the cap makes the second element break out.
    t.mutate("x.cap", Value::Number(1.0));
    t.assert_eq("out.last", Value::Number(1.0));
}

#[test]
fn the_owning_loop_reruns_from_its_first_key() {
    let t = TestProgram::run(&capped_scan(), globals(10.0));

    // The break now belongs at the third element; the rerun must still
    // visit the first two instead of stopping at the front.
    t.mutate("x.cap", Value::Number(2.0));
    t.assert_eq("out.last", Value::Number(2.0));
}

#[test]
fn clearing_a_break_restores_the_tail_of_the_loop() {
    let t = TestProgram::run(&capped_scan(), globals(10.0));
    t.mutate("x.cap", Value::Number(1.0));
    t.assert_eq("out.last", Value::Number(1.0));

    t.mutate("x.cap", Value::Number(10.0));
    t.assert_eq("out.last", Value::Number(3.0));
}
