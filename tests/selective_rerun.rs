//! Changed paths re-run only the statements that read them.

use reflex::ast::build;
use reflex::testing::TestProgram;
use reflex::value::Value;

fn copy_two_fields() -> reflex::ast::Program {
    // out.a = x.a; out.b = x.b;
    build::program(vec![
        build::member_assign_stmt(build::path(&["out", "a"]), build::path(&["x", "a"])),
        build::member_assign_stmt(build::path(&["out", "b"]), build::path(&["x", "b"])),
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
fn cold_run_copies_both_fields() {
    let t = TestProgram::run(&copy_two_fields(), globals());
    t.assert_eq("out.a", Value::Number(1.0));
    t.assert_eq("out.b", Value::Number(2.0));
}

#[test]
fn only_the_reading_statement_reruns() {
    let t = TestProgram::run(&copy_two_fields(), globals());

    t.mutate("x.a", Value::Number(10.0));
    t.assert_eq("out.a", Value::Number(10.0));
    t.assert_eq("out.b", Value::Number(2.0));
    assert_eq!(t.reruns().len(), 1);

    t.mutate("x.b", Value::Number(20.0));
    t.assert_eq("out.b", Value::Number(20.0));
    assert_eq!(t.reruns().len(), 1);
}

#[test]
fn duplicate_paths_in_one_batch_rerun_once() {
    let t = TestProgram::run(&copy_two_fields(), globals());

    t.globals().set_path(&["x", "a"], Value::Number(7.0));
    t.notify(&["x.a", "x.a"]);
    t.assert_eq("out.a", Value::Number(7.0));
    assert_eq!(t.reruns().len(), 1);
}

#[test]
fn unmatched_paths_rerun_nothing() {
    let t = TestProgram::run(&copy_two_fields(), globals());

    t.mutate("x.c", Value::Number(99.0));
    assert!(t.reruns().is_empty());
    t.assert_eq("out.a", Value::Number(1.0));
    t.assert_eq("out.b", Value::Number(2.0));
}

#[test]
fn a_coarse_path_reaches_every_reader_underneath() {
    let t = TestProgram::run(&copy_two_fields(), globals());

    t.globals().set_path(&["x", "a"], Value::Number(3.0));
    t.globals().set_path(&["x", "b"], Value::Number(4.0));
    t.notify(&["x"]);
    t.assert_eq("out.a", Value::Number(3.0));
    t.assert_eq("out.b", Value::Number(4.0));
    assert_eq!(t.reruns().len(), 2);
}
